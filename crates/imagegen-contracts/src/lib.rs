pub mod credentials;
pub mod error;
pub mod request;

pub use credentials::{
    resolve_credential, resolve_credential_from_env, Credential, CredentialSource, API_KEY_ENV,
};
pub use error::{GenerateError, Result};
pub use request::{GenerationRequest, TargetSize, DEFAULT_SIZE, MAX_DIMENSION};
