use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use imagegen_contracts::{GenerateError, Result};
use log::debug;
use serde::Deserialize;
use serde_json::Value;

use crate::payload::RawImagePayload;

/// Key literals tried by the raw scan, in order.
const RAW_MARKERS: [&str; 3] = ["\"data\"", "\"bytesBase64Encoded\"", "\"imageBytes\""];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    NotFound,
    Found(String),
}

// generateContent: candidates[].content.parts[].inlineData.data
#[derive(Debug, Deserialize)]
struct ContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default, rename = "inlineData", alias = "inline_data")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
struct InlineData {
    #[serde(default)]
    data: String,
}

// predict / generateImages: generatedImages[].bytesBase64Encoded
#[derive(Debug, Deserialize)]
struct GeneratedImagesResponse {
    #[serde(default, rename = "generatedImages", alias = "predictions")]
    generated_images: Vec<GeneratedImage>,
}

#[derive(Debug, Deserialize)]
struct GeneratedImage {
    #[serde(
        default,
        rename = "bytesBase64Encoded",
        alias = "bytes_base64_encoded"
    )]
    bytes_base64_encoded: Option<String>,
}

impl ContentResponse {
    fn first_image(self) -> Option<String> {
        self.candidates
            .into_iter()
            .filter_map(|candidate| candidate.content)
            .flat_map(|content| content.parts)
            .filter_map(|part| part.inline_data)
            .map(|inline| inline.data)
            .find(|data| !data.is_empty())
    }
}

impl GeneratedImagesResponse {
    fn first_image(self) -> Option<String> {
        self.generated_images
            .into_iter()
            .filter_map(|image| image.bytes_base64_encoded)
            .find(|data| !data.is_empty())
    }
}

/// Returns the base64 image string embedded in `body`.
pub fn extract(body: &str) -> Result<String> {
    match classify(body)? {
        Extraction::Found(encoded) => Ok(encoded),
        Extraction::NotFound => Err(GenerateError::MissingPayload),
    }
}

/// Structured decode of both known schemas, then a raw scan of the text.
/// Only an unterminated raw value is an error here.
pub fn classify(body: &str) -> Result<Extraction> {
    if let Ok(document) = serde_json::from_str::<Value>(body) {
        if let Some(found) = ContentResponse::deserialize(&document)
            .ok()
            .and_then(ContentResponse::first_image)
        {
            debug!("image payload found in candidates[].content.parts[]");
            return Ok(Extraction::Found(found));
        }
        if let Some(found) = GeneratedImagesResponse::deserialize(&document)
            .ok()
            .and_then(GeneratedImagesResponse::first_image)
        {
            debug!("image payload found in generatedImages[]");
            return Ok(Extraction::Found(found));
        }
    }

    for marker in RAW_MARKERS {
        if let Some(found) = scan_marker(body, marker)? {
            debug!("image payload found by raw scan for {marker}");
            return Ok(Extraction::Found(unescape_json_base64(&found)));
        }
    }
    Ok(Extraction::NotFound)
}

fn scan_marker(body: &str, marker: &str) -> Result<Option<String>> {
    let bytes = body.as_bytes();
    let mut from = 0;
    while let Some(offset) = body[from..].find(marker) {
        let after_key = from + offset + marker.len();
        from = after_key;
        let Some(value_start) = string_value_start(bytes, after_key) else {
            continue;
        };
        let Some(value_end) = closing_quote(bytes, value_start) else {
            return Err(GenerateError::MalformedPayload {
                reason: format!("unterminated {marker} value"),
            });
        };
        if value_end == value_start {
            from = value_end + 1;
            continue;
        }
        return Ok(Some(body[value_start..value_end].to_string()));
    }
    Ok(None)
}

/// Index just past the opening quote of `: "`, if the key is followed by a string.
fn string_value_start(bytes: &[u8], mut idx: usize) -> Option<usize> {
    idx = skip_whitespace(bytes, idx);
    if bytes.get(idx) != Some(&b':') {
        return None;
    }
    idx = skip_whitespace(bytes, idx + 1);
    if bytes.get(idx) != Some(&b'"') {
        return None;
    }
    Some(idx + 1)
}

fn skip_whitespace(bytes: &[u8], mut idx: usize) -> usize {
    while bytes.get(idx).is_some_and(u8::is_ascii_whitespace) {
        idx += 1;
    }
    idx
}

fn closing_quote(bytes: &[u8], start: usize) -> Option<usize> {
    let mut escaped = false;
    for (offset, byte) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match byte {
            b'\\' => escaped = true,
            b'"' => return Some(start + offset),
            _ => {}
        }
    }
    None
}

// Raw-scanned values may still carry JSON escapes such as `\/` or `\n`.
fn unescape_json_base64(raw: &str) -> String {
    raw.replace("\\/", "/")
        .replace("\\n", "")
        .replace("\\r", "")
}

/// Base64-decodes an extracted payload. ASCII whitespace inside the payload is ignored.
pub fn decode_payload(encoded: &str) -> Result<RawImagePayload> {
    let compact: String = encoded
        .chars()
        .filter(|ch| !ch.is_ascii_whitespace())
        .collect();
    let bytes = BASE64
        .decode(compact.as_bytes())
        .map_err(|err| GenerateError::MalformedPayload {
            reason: format!("invalid base64: {err}"),
        })?;
    Ok(RawImagePayload::new(bytes))
}

#[cfg(test)]
mod tests {
    use imagegen_contracts::GenerateError;
    use serde_json::json;

    use super::{classify, decode_payload, extract, Extraction};

    #[test]
    fn raw_scan_finds_data_value() {
        assert_eq!(extract("...\"data\": \"QUJD\"...").unwrap(), "QUJD");
    }

    #[test]
    fn no_marker_is_missing_payload() {
        assert!(matches!(
            extract("no marker here"),
            Err(GenerateError::MissingPayload)
        ));
    }

    #[test]
    fn unterminated_value_is_malformed() {
        assert!(matches!(
            extract("\"data\": \"unterminated"),
            Err(GenerateError::MalformedPayload { .. })
        ));
    }

    #[test]
    fn structured_candidates_schema() {
        let body = json!({
            "candidates": [{
                "content": {
                    "parts": [
                        {"text": "here you go"},
                        {"inlineData": {"mimeType": "image/png", "data": "UE5H"}}
                    ]
                }
            }]
        })
        .to_string();
        assert_eq!(extract(&body).unwrap(), "UE5H");
    }

    #[test]
    fn structured_snake_case_inline_data() {
        let body = json!({
            "candidates": [{"content": {"parts": [{"inline_data": {"data": "c25ha2U="}}]}}]
        })
        .to_string();
        assert_eq!(extract(&body).unwrap(), "c25ha2U=");
    }

    #[test]
    fn structured_generated_images_schema() {
        let body = json!({
            "generatedImages": [{"bytesBase64Encoded": "RkxBVA=="}]
        })
        .to_string();
        assert_eq!(extract(&body).unwrap(), "RkxBVA==");

        let body = json!({
            "predictions": [{"bytesBase64Encoded": "UFJFRA==", "mimeType": "image/png"}]
        })
        .to_string();
        assert_eq!(extract(&body).unwrap(), "UFJFRA==");
    }

    #[test]
    fn candidates_without_image_fall_through_to_missing() {
        let body = json!({
            "candidates": [{"content": {"parts": [{"text": "I cannot draw that"}]}}],
            "usageMetadata": {"totalTokenCount": 12}
        })
        .to_string();
        assert_eq!(classify(&body).unwrap(), Extraction::NotFound);
    }

    #[test]
    fn schema_drift_falls_back_to_raw_scan() {
        // `candidates` as an object breaks the typed decode.
        let body = r#"{"candidates": {"weird": {"data": "RFJJRlQ="}}}"#;
        assert_eq!(extract(body).unwrap(), "RFJJRlQ=");
    }

    #[test]
    fn raw_scan_skips_non_string_data_keys() {
        let body = r#"{"data": 42, "nested": {"data" : "T0s="}"#;
        assert_eq!(extract(body).unwrap(), "T0s=");
    }

    #[test]
    fn raw_scan_honours_escaped_quotes_and_slashes() {
        let body = r#"prefix "data":"ab\/cd\"ef" suffix"#;
        assert_eq!(extract(body).unwrap(), "ab/cd\\\"ef");
    }

    #[test]
    fn empty_inline_data_is_missing_payload() {
        let body = concat!(
            r#"{"candidates":[{"content":{"parts":[{"inlineData":"#,
            r#"{"mimeType":"image/png","data":""}}]}}]}"#
        );
        assert_eq!(classify(body).unwrap(), Extraction::NotFound);
        assert!(matches!(extract(body), Err(GenerateError::MissingPayload)));
    }

    #[test]
    fn raw_scan_skips_empty_values() {
        let body = r#"garbage "data": "", then "data": "T0s=""#;
        assert_eq!(extract(body).unwrap(), "T0s=");
    }

    #[test]
    fn raw_scan_tries_alternate_keys() {
        let body = r#"not json {"bytesBase64Encoded": "QUxU"}"#;
        assert_eq!(extract(body).unwrap(), "QUxU");
    }

    #[test]
    fn decode_payload_ignores_line_breaks() {
        let payload = decode_payload("QU\nJD\r\n").unwrap();
        assert_eq!(payload.bytes(), b"ABC");
    }

    #[test]
    fn decode_payload_rejects_invalid_base64() {
        assert!(matches!(
            decode_payload("!!!not-base64!!!"),
            Err(GenerateError::MalformedPayload { .. })
        ));
    }
}
