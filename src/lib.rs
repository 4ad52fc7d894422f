//! Deep-etch sticker effect: cut the subject out of a photo, posterize it and
//! put a white stroke around the silhouette.
//!
//! ```text
//! bytes -> SegmentationProvider -> RGBA cutout -> stylize -> PNG
//!                                   |- build_hard_mask -> synthesize_outline -|
//!                                   |- restyle ------------------------------ |-> composite_over
//! ```

pub mod config;
pub mod effects;
pub mod error;
pub mod pipeline;
pub mod request;
pub mod segmentation;

pub use config::{MattingConfig, PipelineConfig};
pub use error::PipelineError;
pub use pipeline::Pipeline;
pub use request::{handle_request, ProcessRequest, ProcessResponse};
