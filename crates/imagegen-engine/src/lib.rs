pub mod cancel;
pub mod client;
pub mod config;
pub mod extract;
pub mod normalize;
pub mod payload;

pub use cancel::CancelSignal;
pub use client::ImageRequestClient;
pub use config::{ClientConfig, EndpointVariant, DEFAULT_API_BASE, DEFAULT_MODEL, UPSTREAM_TIMEOUT};
pub use extract::{classify, decode_payload, extract, Extraction};
pub use normalize::{normalize, NormalizePlan, ASPECT_TOLERANCE};
pub use payload::{NormalizedImage, RawImagePayload};
