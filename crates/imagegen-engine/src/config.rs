use std::env;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-image";

/// Upper bound on one upstream call, headers and body included.
pub const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(60);

/// Which upstream method the model is served by. Also decides how the key is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointVariant {
    /// `:generateContent`, key in the `x-goog-api-key` header.
    GenerateContent,
    /// `:predict`, key in the `key` query parameter.
    Predict,
}

impl EndpointVariant {
    pub fn for_model(model: &str) -> Self {
        let name = model.trim().trim_start_matches("models/").to_ascii_lowercase();
        if name.starts_with("imagen") {
            Self::Predict
        } else {
            Self::GenerateContent
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            Self::GenerateContent => "generateContent",
            Self::Predict => "predict",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_base: String,
    pub model: String,
    pub variant: EndpointVariant,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_API_BASE, DEFAULT_MODEL)
    }
}

impl ClientConfig {
    pub fn new(api_base: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            api_base: normalize_base(&api_base.into()),
            variant: EndpointVariant::for_model(&model),
            model,
        }
    }

    /// Reads `GEMINI_API_BASE` and `GEMINI_IMAGE_MODEL`; blank values fall back to defaults.
    pub fn from_env() -> Self {
        Self::new(
            non_empty_env("GEMINI_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            non_empty_env("GEMINI_IMAGE_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        )
    }

    pub fn with_model(self, model: impl Into<String>) -> Self {
        Self::new(self.api_base, model)
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = normalize_base(&api_base.into());
        self
    }

    pub fn endpoint(&self) -> String {
        let trimmed = self.model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:{}", self.api_base, model_path, self.variant.method())
    }
}

fn normalize_base(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
