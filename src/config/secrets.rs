//! Secrets backend selection (grounded in `original_source/shared/secrets.py`).
//!
//! Vault/AWS are external collaborators (§1) — only the env backend is
//! implemented here; selecting another backend is a configuration choice an
//! operator makes, not a code path this crate provides.

use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretsBackend {
    Env,
    Vault,
    Aws,
}

impl SecretsBackend {
    pub fn from_env_var() -> Self {
        match env::var("SECRETS_BACKEND").as_deref() {
            Ok("vault") => SecretsBackend::Vault,
            Ok("aws") => SecretsBackend::Aws,
            _ => SecretsBackend::Env,
        }
    }

    pub fn resolve(&self, key: &str) -> Option<String> {
        match self {
            SecretsBackend::Env => env::var(key).ok(),
            SecretsBackend::Vault | SecretsBackend::Aws => {
                tracing::warn!(backend = ?self, key, "non-env secrets backend selected but not wired to a collaborator in-core; falling back to env");
                env::var(key).ok()
            }
        }
    }
}
