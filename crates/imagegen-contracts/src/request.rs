use std::fmt;
use std::str::FromStr;

use crate::credentials::Credential;
use crate::error::{GenerateError, Result};

/// Largest accepted width or height, in pixels.
pub const MAX_DIMENSION: u32 = 4096;

pub const DEFAULT_SIZE: &str = "1024x1024";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetSize {
    pub width: u32,
    pub height: u32,
}

impl TargetSize {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if !(1..=MAX_DIMENSION).contains(&width) || !(1..=MAX_DIMENSION).contains(&height) {
            return Err(GenerateError::InvalidSizeFormat {
                input: format!("{width}x{height}"),
            });
        }
        Ok(Self { width, height })
    }

    /// Parses `WIDTHxHEIGHT`, e.g. `1024x1024`. The separator may be `x` or `X`.
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = || GenerateError::InvalidSizeFormat {
            input: raw.to_string(),
        };
        let trimmed = raw.trim();
        let (w, h) = trimmed.split_once(['x', 'X']).ok_or_else(invalid)?;
        let width = parse_dimension(w).ok_or_else(invalid)?;
        let height = parse_dimension(h).ok_or_else(invalid)?;
        Ok(Self { width, height })
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

fn parse_dimension(raw: &str) -> Option<u32> {
    let raw = raw.trim();
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse::<u32>()
        .ok()
        .filter(|value| (1..=MAX_DIMENSION).contains(value))
}

impl Default for TargetSize {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 1024,
        }
    }
}

impl FromStr for TargetSize {
    type Err = GenerateError;

    fn from_str(raw: &str) -> Result<Self> {
        Self::parse(raw)
    }
}

impl fmt::Display for TargetSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// One prompt, one target size, one credential. Validated on construction.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    prompt: String,
    size: TargetSize,
    credential: Credential,
    normalize: bool,
}

impl GenerationRequest {
    pub fn new(
        prompt: impl Into<String>,
        size: TargetSize,
        credential: Credential,
    ) -> Result<Self> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(GenerateError::EmptyPrompt);
        }
        Ok(Self {
            prompt,
            size,
            credential,
            normalize: true,
        })
    }

    /// When disabled, the upstream image is returned as decoded, at whatever size it came back.
    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn size(&self) -> TargetSize {
        self.size
    }

    pub fn target_width(&self) -> u32 {
        self.size.width
    }

    pub fn target_height(&self) -> u32 {
        self.size.height
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn normalize(&self) -> bool {
        self.normalize
    }

    /// The prompt with the resolution hint the upstream model sees.
    pub fn annotated_prompt(&self) -> String {
        format!(
            "{} (generate at {} resolution)",
            self.prompt.trim(),
            self.size
        )
    }
}
