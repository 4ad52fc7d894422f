use thiserror::Error;

/// Errors surfaced by the etch pipeline.
///
/// Every variant ends up as the `error` field of a response; none of them
/// is ever swallowed into an empty image.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Missing or malformed request payload, or bytes that are not an image
    #[error("invalid input: {0}")]
    Input(String),

    /// Both segmentation strategies failed
    #[error("segmentation failed: {0}")]
    Segmentation(String),

    /// Two buffers that must line up have different sizes
    #[error("dimension mismatch in {stage}: expected {expected:?}, got {actual:?}")]
    Dimension {
        stage: &'static str,
        expected: (u32, u32),
        actual: (u32, u32),
    },

    /// Output serialization failed
    #[error("failed to encode output: {0}")]
    Encoding(String),
}

impl PipelineError {
    pub(crate) fn dimension(stage: &'static str, expected: (u32, u32), actual: (u32, u32)) -> Self {
        Self::Dimension {
            stage,
            expected,
            actual,
        }
    }
}

/// Fail fast unless both sizes agree.
pub(crate) fn ensure_same_size(
    stage: &'static str,
    expected: (u32, u32),
    actual: (u32, u32),
) -> Result<(), PipelineError> {
    if expected == actual {
        Ok(())
    } else {
        Err(PipelineError::dimension(stage, expected, actual))
    }
}
