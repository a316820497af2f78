use std::env;
use std::fmt;

use crate::error::{GenerateError, Result};

pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    CommandLine,
    Environment,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CommandLine => f.write_str("command line"),
            Self::Environment => f.write_str(API_KEY_ENV),
        }
    }
}

/// An API key plus where it came from. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    secret: String,
    source: CredentialSource,
}

impl Credential {
    pub fn new(secret: impl Into<String>, source: CredentialSource) -> Result<Self> {
        let secret = secret.into().trim().to_string();
        if secret.is_empty() {
            return Err(GenerateError::MissingCredential);
        }
        Ok(Self { secret, source })
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("secret", &"<redacted>")
            .field("source", &self.source)
            .finish()
    }
}

/// Explicit value first, then `lookup(GEMINI_API_KEY)`, else `MissingCredential`.
/// Blank values count as absent at both steps.
pub fn resolve_credential<F>(explicit: Option<&str>, lookup: F) -> Result<Credential>
where
    F: FnOnce(&str) -> Option<String>,
{
    if let Some(value) = explicit.filter(|value| !value.trim().is_empty()) {
        return Credential::new(value, CredentialSource::CommandLine);
    }
    match lookup(API_KEY_ENV).filter(|value| !value.trim().is_empty()) {
        Some(value) => Credential::new(value, CredentialSource::Environment),
        None => Err(GenerateError::MissingCredential),
    }
}

pub fn resolve_credential_from_env(explicit: Option<&str>) -> Result<Credential> {
    resolve_credential(explicit, |key| env::var(key).ok())
}
