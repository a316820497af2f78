use std::error::Error as StdError;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use imagegen_contracts::{GenerateError, GenerationRequest, Result, TargetSize};
use log::{debug, info};
use reqwest::blocking::{Client as HttpClient, RequestBuilder};
use serde_json::{json, Value};

use crate::cancel::CancelSignal;
use crate::config::{ClientConfig, EndpointVariant, UPSTREAM_TIMEOUT};
use crate::extract::{decode_payload, extract};
use crate::normalize::normalize;
use crate::payload::NormalizedImage;

const API_KEY_HEADER: &str = "x-goog-api-key";
const CANCEL_POLL: Duration = Duration::from_millis(50);

const GENERATE_CONTENT_RATIOS: [(&str, f64); 10] = [
    ("1:1", 1.0),
    ("2:3", 2.0 / 3.0),
    ("3:2", 3.0 / 2.0),
    ("3:4", 3.0 / 4.0),
    ("4:3", 4.0 / 3.0),
    ("4:5", 4.0 / 5.0),
    ("5:4", 5.0 / 4.0),
    ("9:16", 9.0 / 16.0),
    ("16:9", 16.0 / 9.0),
    ("21:9", 21.0 / 9.0),
];

const PREDICT_RATIOS: [(&str, f64); 5] = [
    ("1:1", 1.0),
    ("3:4", 3.0 / 4.0),
    ("4:3", 4.0 / 3.0),
    ("9:16", 9.0 / 16.0),
    ("16:9", 16.0 / 9.0),
];

/// Sends one prompt upstream and turns the response into an image of the requested size.
///
/// The underlying HTTP transport is created with the client and released when it is dropped.
/// It may be reused for any number of sequential calls.
pub struct ImageRequestClient {
    config: ClientConfig,
    http: HttpClient,
}

impl ImageRequestClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::with_timeout(config, UPSTREAM_TIMEOUT)
    }

    fn with_timeout(config: ClientConfig, timeout: Duration) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(upstream_error)?;
        Ok(Self { config, http })
    }

    pub fn request_image(&self, request: &GenerationRequest) -> Result<NormalizedImage> {
        self.request_image_with_cancel(request, &CancelSignal::new())
    }

    pub fn request_image_with_cancel(
        &self,
        request: &GenerationRequest,
        cancel: &CancelSignal,
    ) -> Result<NormalizedImage> {
        let body = self.fetch_body(request, cancel)?;
        let encoded = extract(&body)?;
        let payload = decode_payload(&encoded)?;
        debug!(
            "decoded {} upstream image bytes ({:?})",
            payload.bytes().len(),
            payload.format()
        );
        if !request.normalize() {
            return NormalizedImage::passthrough(payload);
        }
        normalize(&payload, request.target_width(), request.target_height())
    }

    /// JSON body for the configured endpoint variant.
    pub fn build_payload(&self, request: &GenerationRequest) -> Value {
        let prompt = request.annotated_prompt();
        match self.config.variant {
            EndpointVariant::GenerateContent => json!({
                "contents": [{
                    "role": "user",
                    "parts": [{ "text": prompt }],
                }],
                "generationConfig": {
                    "responseModalities": ["IMAGE"],
                    "imageConfig": {
                        "aspectRatio":
                            nearest_aspect_ratio(request.size(), &GENERATE_CONTENT_RATIOS),
                    },
                },
            }),
            EndpointVariant::Predict => json!({
                "instances": [{ "prompt": prompt }],
                "parameters": {
                    "sampleCount": 1,
                    "aspectRatio": nearest_aspect_ratio(request.size(), &PREDICT_RATIOS),
                },
            }),
        }
    }

    fn prepare(&self, request: &GenerationRequest, endpoint: &str) -> RequestBuilder {
        let secret = request.credential().secret();
        let builder = self.http.post(endpoint).json(&self.build_payload(request));
        match self.config.variant {
            EndpointVariant::GenerateContent => builder.header(API_KEY_HEADER, secret),
            EndpointVariant::Predict => builder.query(&[("key", secret)]),
        }
    }

    // The blocking call runs on a worker so the caller can keep watching `cancel`.
    // A cancelled worker is abandoned; the transport timeout bounds how long it lingers.
    fn fetch_body(&self, request: &GenerationRequest, cancel: &CancelSignal) -> Result<String> {
        if cancel.is_cancelled() {
            return Err(GenerateError::Cancelled);
        }
        let endpoint = self.config.endpoint();
        debug!("POST {endpoint}");
        let builder = self.prepare(request, &endpoint);

        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("imagegen-upstream".to_string())
            .spawn(move || {
                let _ = tx.send(read_response(builder));
            })
            .map_err(|err| GenerateError::Transport {
                reason: format!("upstream worker spawn failed: {err}"),
            })?;

        loop {
            if cancel.is_cancelled() {
                info!("upstream request cancelled");
                return Err(GenerateError::Cancelled);
            }
            match rx.recv_timeout(CANCEL_POLL) {
                Ok(result) => return result,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(GenerateError::Transport {
                        reason: "upstream worker exited without a response".to_string(),
                    })
                }
            }
        }
    }
}

fn read_response(builder: RequestBuilder) -> Result<String> {
    let response = builder.send().map_err(upstream_error)?;
    let status = response.status();
    info!("upstream responded {status}");
    if !status.is_success() {
        return Err(GenerateError::UpstreamRequestFailed {
            status: status.as_u16(),
            body: response.text().unwrap_or_default(),
        });
    }
    response.text().map_err(upstream_error)
}

fn upstream_error(err: reqwest::Error) -> GenerateError {
    if err.is_timeout() {
        return GenerateError::UpstreamTimeout;
    }
    GenerateError::Transport {
        reason: error_chain_text(&err),
    }
}

fn error_chain_text(err: &(dyn StdError + 'static)) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut current = Some(err);
    while let Some(cause) = current {
        let text = cause.to_string();
        let trimmed = text.trim();
        if !trimmed.is_empty() && parts.last().map(String::as_str) != Some(trimmed) {
            parts.push(trimmed.to_string());
        }
        current = cause.source();
    }
    parts.join(" | caused by: ")
}

fn nearest_aspect_ratio(size: TargetSize, candidates: &[(&'static str, f64)]) -> &'static str {
    let target = size.aspect_ratio();
    let mut best_key = "1:1";
    let mut best_delta = f64::MAX;
    for &(key, ratio) in candidates {
        let delta = (ratio - target).abs();
        if delta < best_delta {
            best_key = key;
            best_delta = delta;
        }
    }
    best_key
}
