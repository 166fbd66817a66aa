//! Canonical cache key construction.
//!
//! Isolation invariant: two tenants requesting identical `(path, params)`
//! must never collide into the same entry. The tenant id seeds the hash
//! rather than merely being concatenated into it, so the entire key space
//! is partitioned per tenant before `path`/`params` are even considered.

use std::collections::BTreeMap;
use std::hash::Hasher;
use twox_hash::XxHash64;

/// An opaque, hashed cache key. Two calls with the same tenant/path/params
/// (regardless of param ordering or null values) produce the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey(pub u64);

/// Build the canonical key for `(tenantId, path, params)`.
///
/// `params` may be given in any order and may contain `None` values, which
/// are dropped before hashing -- `{a: 1, b: null}` and `{a: 1}` hash to the
/// same key, matching the "omit null/undefined" canonicalization rule.
pub fn cache_key(tenant_id: &str, path: &str, params: &[(&str, Option<&str>)]) -> CacheKey {
    let canonical: BTreeMap<&str, &str> = params
        .iter()
        .filter_map(|(k, v)| v.map(|v| (*k, v)))
        .collect();
    let params_json = serde_json::to_string(&canonical).unwrap_or_default();

    let tenant_seed = {
        let mut hasher = XxHash64::with_seed(0);
        hasher.write(tenant_id.as_bytes());
        hasher.finish()
    };

    let mut hasher = XxHash64::with_seed(tenant_seed);
    hasher.write(path.as_bytes());
    hasher.write(params_json.as_bytes());
    CacheKey(hasher.finish())
}

/// Route classes drive which TTL an entry gets; see `CacheConfig`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    /// Write-adjacent reads: short TTL, likely to be invalidated soon anyway.
    WriteAdjacent,
    /// Ordinary reads: medium TTL.
    Read,
    /// Tenant/config-level reads: long TTL, changes rarely.
    Config,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_tenant_path_params_same_key_regardless_of_order() {
        let a = cache_key("t1", "/rows", &[("sheet", Some("S")), ("limit", Some("10"))]);
        let b = cache_key("t1", "/rows", &[("limit", Some("10")), ("sheet", Some("S"))]);
        assert_eq!(a, b);
    }

    #[test]
    fn null_params_are_dropped() {
        let a = cache_key("t1", "/rows", &[("sheet", Some("S")), ("cursor", None)]);
        let b = cache_key("t1", "/rows", &[("sheet", Some("S"))]);
        assert_eq!(a, b);
    }

    #[test]
    fn different_tenants_never_collide() {
        let a = cache_key("t1", "/rows", &[("sheet", Some("S"))]);
        let b = cache_key("t2", "/rows", &[("sheet", Some("S"))]);
        assert_ne!(a, b);
    }
}
