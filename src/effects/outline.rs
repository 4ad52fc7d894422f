use image::{GrayImage, Luma, Rgba, RgbaImage};
use imageproc::distance_transform::Norm;
use imageproc::morphology::dilate;

use crate::error::{ensure_same_size, PipelineError};

/// Build the white stroke layer that sits behind the subject
///
/// The stroke is the band the dilated mask adds around `hard_mask`; every
/// pixel is white, with alpha 255 inside the band and 0 elsewhere.
///
/// Dilation is a square max filter of side `2 * dilation_radius + 1`.
/// Samples outside the canvas count as 0, so nothing wraps past the edge.
pub fn synthesize_outline(
    hard_mask: &GrayImage,
    dilation_radius: u8,
    size: (u32, u32),
) -> Result<RgbaImage, PipelineError> {
    let _span = tracing::debug_span!("outline", dilation_radius).entered();

    ensure_same_size("outline", size, hard_mask.dimensions())?;

    let dilated = dilate(hard_mask, Norm::LInf, dilation_radius);
    let ring = outline_ring(&dilated, hard_mask)?;

    let (width, height) = size;
    Ok(RgbaImage::from_fn(width, height, |x, y| {
        Rgba([255, 255, 255, ring.get_pixel(x, y)[0]])
    }))
}

/// Per-pixel `dilated - mask`, saturating at 0
pub fn outline_ring(dilated: &GrayImage, mask: &GrayImage) -> Result<GrayImage, PipelineError> {
    ensure_same_size("outline_ring", dilated.dimensions(), mask.dimensions())?;

    let (width, height) = mask.dimensions();
    Ok(GrayImage::from_fn(width, height, |x, y| {
        Luma([dilated.get_pixel(x, y)[0].saturating_sub(mask.get_pixel(x, y)[0])])
    }))
}
