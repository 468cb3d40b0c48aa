//! Shared access signature token signing.

use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;

use super::SharedAccessKey;
use crate::error::QueueError;

#[cfg(test)]
#[path = "sas_tests.rs"]
mod tests;

type HmacSha256 = Hmac<Sha256>;

/// Signs resource URIs into `SharedAccessSignature` tokens.
///
/// The signing process:
/// 1. `sr` = lowercase(percent-encode(lowercase(uri)))
/// 2. string to sign = `sr` + `"\n"` + expiry (unix seconds)
/// 3. `sig` = percent-encode(base64(HMAC-SHA256(key, string to sign)))
/// 4. token = `SharedAccessSignature sr=..&sig=..&se=..&skn=..`
#[derive(Clone)]
pub struct SasTokenGenerator {
    key_name: String,
    key: SharedAccessKey,
}

impl SasTokenGenerator {
    /// Create generator for the named shared access policy
    pub fn new(key_name: impl Into<String>, key: SharedAccessKey) -> Self {
        Self {
            key_name: key_name.into(),
            key,
        }
    }

    /// Name of the shared access policy (`skn`)
    pub fn key_name(&self) -> &str {
        &self.key_name
    }

    /// Sign `resource_uri` with a token expiring at `expires_at` (unix seconds)
    ///
    /// # Errors
    ///
    /// Returns `QueueError::AuthSigningFailure` if the MAC cannot be initialised.
    pub fn generate(&self, resource_uri: &str, expires_at: i64) -> Result<String, QueueError> {
        let target_uri = urlencoding::encode(&resource_uri.to_lowercase()).to_lowercase();
        let string_to_sign = format!("{}\n{}", target_uri, expires_at);

        let signature = self.sign(string_to_sign.as_bytes())?;
        let signature = urlencoding::encode(&STANDARD.encode(signature)).into_owned();

        Ok(format!(
            "SharedAccessSignature sr={}&sig={}&se={}&skn={}",
            target_uri, signature, expires_at, self.key_name
        ))
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, QueueError> {
        let mut mac = HmacSha256::new_from_slice(self.key.as_bytes()).map_err(|e| {
            QueueError::AuthSigningFailure {
                message: format!("Invalid signing key: {}", e),
            }
        })?;
        mac.update(data);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

impl fmt::Debug for SasTokenGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SasTokenGenerator")
            .field("key_name", &self.key_name)
            .field("key", &self.key)
            .finish()
    }
}
