pub mod matting;
mod preprocess;
mod provider;
pub mod types;
mod u2net;

pub use preprocess::Preprocessor;
pub use provider::{CutoutStrategy, GenericStrategy, RefinedStrategy, SegmentationProvider};
pub use types::{Matte, SegmentationModel};
pub use u2net::U2Net;

use std::path::Path;
use std::sync::Arc;

use crate::config::MattingConfig;

/// Create the default provider: subject-specialized U2-Net first, general U2-Net as fallback
///
/// Models are loaded lazily, so this never touches the filesystem.
pub fn create_default_provider(
    primary_model: impl AsRef<Path>,
    fallback_model: impl AsRef<Path>,
    matting: MattingConfig,
) -> SegmentationProvider {
    let primary = Arc::new(U2Net::new("u2net_human_seg", primary_model));
    let fallback = Arc::new(U2Net::new("u2net", fallback_model));
    SegmentationProvider::from_models(primary, fallback, matting)
}
