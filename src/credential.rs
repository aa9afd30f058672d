//! API credential handling
//!
//! Credentials pair an opaque API key with the helpdesk domain it belongs
//! to. The key is a secret: `Debug` output redacts it and nothing in this
//! crate logs it.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

/// Credential errors
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// The stored ciphertext could not be decrypted
    #[error("credential decryption failed: {0}")]
    DecryptionFailed(String),

    /// The credential is structurally unusable (empty key or domain)
    #[error("invalid credential: {0}")]
    Invalid(String),
}

/// Decrypts at-rest API keys.
///
/// The encryption scheme itself lives outside this crate; a failure here is
/// fatal to the whole operation and is never retried.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Decrypt an opaque ciphertext into a plaintext API key.
    async fn decrypt(&self, ciphertext: &str) -> Result<String, CredentialError>;
}

/// API key plus the helpdesk domain it authenticates against.
#[derive(Clone)]
pub struct Credential {
    api_key: String,
    domain: String,
}

impl Credential {
    /// Create a credential from a plaintext API key and domain.
    pub fn new(api_key: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            domain: domain.into(),
        }
    }

    /// Create a credential by decrypting a stored ciphertext.
    pub async fn from_encrypted(
        source: &dyn CredentialSource,
        ciphertext: &str,
        domain: impl Into<String>,
    ) -> Result<Self, CredentialError> {
        let api_key = source.decrypt(ciphertext).await?;
        if api_key.is_empty() {
            return Err(CredentialError::Invalid(
                "decrypted API key is empty".to_string(),
            ));
        }
        Ok(Self::new(api_key, domain))
    }

    /// The helpdesk domain this credential authenticates against.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Basic auth header value for the upstream API.
    ///
    /// The upstream expects `apiKey:X` base64-encoded; the password slot is
    /// a literal placeholder.
    pub fn basic_auth(&self) -> String {
        let encoded = BASE64.encode(format!("{}:X", self.api_key));
        format!("Basic {encoded}")
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("api_key", &"<redacted>")
            .field("domain", &self.domain)
            .finish()
    }
}
