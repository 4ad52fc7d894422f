use anyhow::Result;
use image::{GrayImage, RgbImage};

/// Foreground confidence: 0 = background, 255 = foreground
/// Dimensions match the input frame dimensions
pub type Matte = GrayImage;

/// Trait for segmentation models
/// Allows swapping between different backends (U2-Net variants, test doubles, ...)
///
/// Implementations are shared between concurrent requests, so `segment`
/// takes `&self`; any mutable session state must be guarded internally.
pub trait SegmentationModel: Send + Sync {
    /// Process a frame and return a soft matte at the frame's resolution
    fn segment(&self, frame: &RgbImage) -> Result<Matte>;

    /// Short identifier used in logs and error messages
    fn name(&self) -> &str;

    /// Load any backing resources ahead of the first frame
    ///
    /// Models without such resources have nothing to do.
    fn preload(&self) -> Result<()> {
        Ok(())
    }

    /// Get the model's preferred input dimensions
    ///
    /// Returns (width, height)
    fn input_size(&self) -> (u32, u32);
}
