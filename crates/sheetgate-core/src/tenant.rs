//! Tenant Registry.
//!
//! Authoritative mapping `tenantId -> {sheetRef, plan, enabled}`. The
//! registry has no dependencies on any other SheetGate component; the Pool,
//! Batch Coordinator, and Cache all resolve through it by `tenantId` only.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SheetGateError};

/// Subscription tier; influences default rate-limit budgets in `sheetgate-pool`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Starter,
    Pro,
    Growth,
    Enterprise,
}

impl std::str::FromStr for Plan {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "starter" => Ok(Plan::Starter),
            "pro" => Ok(Plan::Pro),
            "growth" => Ok(Plan::Growth),
            "enterprise" => Ok(Plan::Enterprise),
            other => Err(format!("unrecognized plan: {other}")),
        }
    }
}

/// A tenant known to SheetGate.
///
/// Invariant: exactly one `sheet_ref` per tenant. Tenants with
/// `enabled = false` must never produce outbound traffic; callers are
/// expected to check `enabled` themselves (the registry does not hide
/// disabled tenants from `resolve`, since admin tooling needs to see them).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub sheet_ref: String,
    pub name: String,
    pub plan: Plan,
    pub enabled: bool,
}

/// Attributes accepted by `addOrUpdate`. All fields besides `id` are
/// optional so partial updates don't clobber the rest of the record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TenantAttrs {
    pub sheet_ref: Option<String>,
    pub name: Option<String>,
    pub plan: Option<Plan>,
    pub enabled: Option<bool>,
}

/// In-memory tenant registry backed by a concurrent map.
///
/// Loaded at startup from a configuration source (inline map or file, see
/// `RegistryConfig`), then mutated by administrative writes at runtime.
#[derive(Clone, Default)]
pub struct TenantRegistry {
    tenants: Arc<DashMap<String, Tenant>>,
}

impl TenantRegistry {
    pub fn new() -> Self {
        Self {
            tenants: Arc::new(DashMap::new()),
        }
    }

    /// Build a registry pre-populated from an inline `{tenantId: sheetRef}`-style
    /// seed map, all tenants defaulting to plan `starter` and `enabled = true`.
    pub fn from_seed(seed: HashMap<String, String>) -> Self {
        let registry = Self::new();
        for (id, sheet_ref) in seed {
            let name = id.clone();
            registry.tenants.insert(
                id.clone(),
                Tenant {
                    id,
                    sheet_ref,
                    name,
                    plan: Plan::Starter,
                    enabled: true,
                },
            );
        }
        registry
    }

    /// Resolve a tenant id. Absent a registry entry, `TenantUnknown` MUST
    /// surface -- callers must never silently fall back to another tenant.
    pub fn resolve(&self, tenant_id: &str) -> Result<Tenant> {
        self.tenants
            .get(tenant_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| SheetGateError::TenantUnknown(tenant_id.to_string()))
    }

    /// Idempotent upsert. Creates the tenant with defaults when absent;
    /// merges only the provided fields when present.
    pub fn add_or_update(&self, tenant_id: &str, attrs: TenantAttrs) -> Result<Tenant> {
        let mut entry = self
            .tenants
            .entry(tenant_id.to_string())
            .or_insert_with(|| Tenant {
                id: tenant_id.to_string(),
                sheet_ref: attrs.sheet_ref.clone().unwrap_or_default(),
                name: attrs.name.clone().unwrap_or_else(|| tenant_id.to_string()),
                plan: attrs.plan.unwrap_or(Plan::Starter),
                enabled: attrs.enabled.unwrap_or(true),
            });

        if let Some(sheet_ref) = attrs.sheet_ref {
            entry.sheet_ref = sheet_ref;
        }
        if let Some(name) = attrs.name {
            entry.name = name;
        }
        if let Some(plan) = attrs.plan {
            entry.plan = plan;
        }
        if let Some(enabled) = attrs.enabled {
            entry.enabled = enabled;
        }

        if entry.sheet_ref.is_empty() {
            return Err(SheetGateError::InvariantViolation(format!(
                "tenant {tenant_id} has no sheet_ref"
            )));
        }

        Ok(entry.value().clone())
    }

    /// Remove a tenant. Returns the removed record, if any, so the caller
    /// (typically the API layer) can drive the cascading cleanup described
    /// in the data model: invalidate all tenant-scoped cache entries and
    /// close tenant-scoped connections.
    pub fn remove(&self, tenant_id: &str) -> Option<Tenant> {
        self.tenants.remove(tenant_id).map(|(_, tenant)| tenant)
    }

    /// Enumerate all known tenants, e.g. for warm-up or scheduling.
    pub fn list(&self) -> Vec<Tenant> {
        self.tenants.iter().map(|e| e.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tenants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed() -> TenantRegistry {
        let mut map = HashMap::new();
        map.insert("t1".to_string(), "sheet-1".to_string());
        TenantRegistry::from_seed(map)
    }

    #[test]
    fn resolve_known_tenant() {
        let registry = seed();
        let tenant = registry.resolve("t1").unwrap();
        assert_eq!(tenant.sheet_ref, "sheet-1");
        assert!(tenant.enabled);
    }

    #[test]
    fn resolve_unknown_tenant_surfaces_error_not_fallback() {
        let registry = seed();
        let err = registry.resolve("ghost").unwrap_err();
        assert_eq!(err.code(), "tenant-unknown");
    }

    #[test]
    fn add_or_update_is_idempotent_upsert() {
        let registry = TenantRegistry::new();
        let attrs = TenantAttrs {
            sheet_ref: Some("sheet-a".into()),
            name: Some("Acme".into()),
            plan: Some(Plan::Pro),
            enabled: Some(true),
        };
        let created = registry.add_or_update("acme", attrs.clone()).unwrap();
        assert_eq!(created.sheet_ref, "sheet-a");

        let updated = registry
            .add_or_update(
                "acme",
                TenantAttrs {
                    enabled: Some(false),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.sheet_ref, "sheet-a");
        assert!(!updated.enabled);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_returns_the_deleted_tenant() {
        let registry = seed();
        let removed = registry.remove("t1").unwrap();
        assert_eq!(removed.id, "t1");
        assert!(registry.resolve("t1").is_err());
    }

    #[test]
    fn list_enumerates_all_tenants() {
        let registry = seed();
        registry
            .add_or_update(
                "t2",
                TenantAttrs {
                    sheet_ref: Some("sheet-2".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        let mut ids: Vec<_> = registry.list().into_iter().map(|t| t.id).collect();
        ids.sort();
        assert_eq!(ids, vec!["t1", "t2"]);
    }
}
