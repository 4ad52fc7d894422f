//! Pixel stages of the etch look. Every function here is pure and returns
//! a freshly allocated buffer.

mod composite;
mod mask;
mod outline;
mod tone;

pub use composite::{composite_over, decode_png, encode_png};
pub use mask::{alpha_channel, build_hard_mask};
pub use outline::{outline_ring, synthesize_outline};
pub use tone::{attach_alpha, auto_contrast, luma, posterize, restyle};

use image::RgbaImage;

use crate::config::PipelineConfig;
use crate::error::PipelineError;

/// Posterize the cutout and put a white stroke behind it
pub fn stylize(cutout: &RgbaImage, config: &PipelineConfig) -> Result<RgbaImage, PipelineError> {
    let alpha = alpha_channel(cutout);
    let hard_mask = build_hard_mask(&alpha, config.mask_threshold);

    let foreground = restyle(cutout, config.posterize_bits, config.contrast_cutoff)?;
    let outline = synthesize_outline(&hard_mask, config.dilation_radius, cutout.dimensions())?;

    composite_over(&outline, &foreground)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn subject_keeps_soft_alpha_and_gains_white_ring() {
        let cutout = RgbaImage::from_fn(40, 40, |x, y| {
            if (10..30).contains(&x) && (10..30).contains(&y) {
                Rgba([(x * 8) as u8, 90, (y * 8) as u8, 255])
            } else if x == 30 && (10..30).contains(&y) {
                // Soft edge just below the threshold: background for the mask
                Rgba([50, 50, 50, 8])
            } else {
                Rgba([0, 0, 0, 0])
            }
        });

        let out = stylize(&cutout, &PipelineConfig::default()).unwrap();

        // Subject body is opaque gray
        let body = out.get_pixel(20, 20);
        assert_eq!(body[3], 255);
        assert!(body[0] == body[1] && body[1] == body[2]);

        // Ring just outside the subject is white
        assert_eq!(out.get_pixel(6, 20).0, [255, 255, 255, 255]);
        assert_eq!(out.get_pixel(33, 20).0, [255, 255, 255, 255]);

        // Beyond the ring stays transparent
        assert_eq!(out.get_pixel(5, 20)[3], 0);
        assert_eq!(out.get_pixel(1, 1)[3], 0);
        assert_eq!(out.get_pixel(35, 20)[3], 0);
    }
}
