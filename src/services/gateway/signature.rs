use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::{config::GatewayConfig, errors::ServiceError};

use super::SignatureVerifier;

type HmacSha256 = Hmac<Sha256>;

/// Checks payment signatures locally: hex HMAC-SHA256 of
/// `"{session_id}|{payment_id}"` under the shared secret.
#[derive(Clone)]
pub struct HmacSignatureVerifier {
    secret: String,
}

impl std::fmt::Debug for HmacSignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacSignatureVerifier").finish_non_exhaustive()
    }
}

impl HmacSignatureVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn from_config(config: &GatewayConfig) -> Result<Self, ServiceError> {
        config
            .signature_secret
            .as_deref()
            .filter(|secret| !secret.is_empty())
            .map(Self::new)
            .ok_or_else(|| ServiceError::ConfigError("gateway.signature_secret is not set".into()))
    }

    pub fn sign(&self, session_id: &str, payment_id: &str) -> Result<String, ServiceError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| ServiceError::InternalError(e.to_string()))?;
        mac.update(format!("{session_id}|{payment_id}").as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

#[async_trait]
impl SignatureVerifier for HmacSignatureVerifier {
    async fn verify(
        &self,
        session_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<bool, ServiceError> {
        let expected = self.sign(session_id, payment_id)?;
        Ok(constant_time_eq(&expected, &signature.to_ascii_lowercase()))
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}
