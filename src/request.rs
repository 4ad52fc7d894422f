//! JSON request / response shapes around [`Pipeline`].
//!
//! The request carries a base64 image, optionally as a data URI. The response
//! is either `{"image": "data:image/png;base64,..."}` or `{"error": "..."}`;
//! nothing, not even a panic inside the pipeline, escapes as anything else.

use std::panic::{self, AssertUnwindSafe};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PipelineError;
use crate::pipeline::Pipeline;

const DATA_URI_MARKER: &str = "base64,";
const PNG_DATA_URI_PREFIX: &str = "data:image/png;base64,";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProcessRequest {
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProcessResponse {
    Success { image: String },
    Failure { error: String },
}

impl ProcessResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Run one request to completion
pub fn handle_request(pipeline: &Pipeline, request: &Value) -> ProcessResponse {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| process(pipeline, request)));

    match outcome {
        Ok(Ok(png)) => ProcessResponse::Success {
            image: to_data_uri(&png),
        },
        Ok(Err(err)) => {
            tracing::error!("Error processing image: {err}");
            ProcessResponse::Failure {
                error: err.to_string(),
            }
        }
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!("Pipeline panicked: {reason}");
            ProcessResponse::Failure {
                error: format!("internal error: {reason}"),
            }
        }
    }
}

fn process(pipeline: &Pipeline, request: &Value) -> Result<Vec<u8>, PipelineError> {
    let request = ProcessRequest::deserialize(request)
        .map_err(|e| PipelineError::Input(format!("malformed request: {e}")))?;

    let image = request
        .image
        .filter(|payload| !payload.is_empty())
        .ok_or_else(|| PipelineError::Input("No image data provided".into()))?;

    let bytes = decode_payload(&image)?;
    pipeline.process_image_bytes(&bytes)
}

/// Base64-decode a payload, dropping any `...base64,` data URI prefix
///
/// ASCII whitespace (line wrapping) inside the payload is ignored.
pub fn decode_payload(payload: &str) -> Result<Vec<u8>, PipelineError> {
    let encoded = match payload.split_once(DATA_URI_MARKER) {
        Some((_, rest)) => rest,
        None => payload,
    };

    let compact: String = encoded
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();

    STANDARD
        .decode(compact)
        .map_err(|e| PipelineError::Input(format!("invalid base64 payload: {e}")))
}

/// Wrap PNG bytes in a `data:image/png;base64,` URI
pub fn to_data_uri(png: &[u8]) -> String {
    format!("{PNG_DATA_URI_PREFIX}{}", STANDARD.encode(png))
}
