//! HMAC request signing for mutating admin endpoints.
//!
//! Canonical string: `"{METHOD}:{tenantId}:{action}:{nonce}"`, signed with
//! HMAC-SHA256 over the admin signing key and hex-encoded. Comparison is
//! timing-safe so response latency can't leak how many signature bytes
//! matched.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Holds the shared signing secret. Cloneable so it can live on `AppState`.
#[derive(Clone)]
pub struct SigningKey(Vec<u8>);

impl SigningKey {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self(secret.into())
    }

    pub fn from_env() -> Option<Self> {
        std::env::var("SHEETGATE_ADMIN_SIGNING_KEY")
            .ok()
            .filter(|s| !s.is_empty())
            .map(|s| Self::new(s.into_bytes()))
    }

    fn canonical(method: &str, tenant_id: &str, action: &str, nonce: &str) -> String {
        format!("{method}:{tenant_id}:{action}:{nonce}")
    }

    pub fn sign(&self, method: &str, tenant_id: &str, action: &str, nonce: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(&self.0).expect("HMAC accepts keys of any length");
        mac.update(Self::canonical(method, tenant_id, action, nonce).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Verify a caller-supplied hex signature against the expected one,
    /// using a constant-time comparison over the decoded bytes.
    pub fn verify(
        &self,
        method: &str,
        tenant_id: &str,
        action: &str,
        nonce: &str,
        signature_hex: &str,
    ) -> bool {
        let Ok(given) = hex::decode(signature_hex) else {
            return false;
        };
        let mut mac =
            HmacSha256::new_from_slice(&self.0).expect("HMAC accepts keys of any length");
        mac.update(Self::canonical(method, tenant_id, action, nonce).as_bytes());
        let expected = mac.finalize().into_bytes();
        given.as_slice().ct_eq(expected.as_slice()).into()
    }
}
