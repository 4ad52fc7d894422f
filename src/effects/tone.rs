use image::{GrayImage, Luma, Rgba, RgbaImage};
use imageproc::map::map_subpixels;

use super::mask::alpha_channel;
use crate::error::{ensure_same_size, PipelineError};

/// Recolor the subject as a high-contrast posterized grayscale
///
/// Steps:
/// 1. BT.601 luma
/// 2. Auto-contrast with `contrast_cutoff` percent clipped at each end
/// 3. Posterize to `posterize_bits` significant bits
/// 4. Re-attach the image's own (soft) alpha
pub fn restyle(
    image: &RgbaImage,
    posterize_bits: u8,
    contrast_cutoff: u8,
) -> Result<RgbaImage, PipelineError> {
    let _span = tracing::debug_span!("restyle", posterize_bits, contrast_cutoff).entered();

    let gray = luma(image);
    let contrasted = auto_contrast(&gray, contrast_cutoff);
    let poster = posterize(&contrasted, posterize_bits);

    attach_alpha(&poster, &alpha_channel(image))
}

/// Perceptual grayscale using ITU-R BT.601 weights in 16.16 fixed point
pub fn luma(image: &RgbaImage) -> GrayImage {
    let (width, height) = image.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        let p = image.get_pixel(x, y);
        Luma([luma_of(p[0], p[1], p[2])])
    })
}

fn luma_of(r: u8, g: u8, b: u8) -> u8 {
    // 0.299, 0.587, 0.114 scaled by 65536; the weights sum to exactly 65536
    let weighted = 19595 * r as u32 + 38470 * g as u32 + 7471 * b as u32;
    ((weighted + 0x8000) >> 16) as u8
}

/// Stretch the histogram so the remaining range spans [0, 255]
///
/// `cutoff` percent of all samples are discarded from the dark end and from
/// the light end before the range is measured. A histogram that collapses to
/// a single value leaves the image untouched.
pub fn auto_contrast(gray: &GrayImage, cutoff: u8) -> GrayImage {
    let lut = contrast_lut(gray, cutoff);
    apply_lut(gray, &lut)
}

fn contrast_lut(gray: &GrayImage, cutoff: u8) -> [u8; 256] {
    let mut histogram = [0u64; 256];
    for &v in gray.as_raw() {
        histogram[v as usize] += 1;
    }

    let total: u64 = histogram.iter().sum();
    let cut = total * u64::from(cutoff.min(100)) / 100;
    clip_histogram(&mut histogram, cut, 0..256);
    clip_histogram(&mut histogram, cut, (0..256).rev());

    let lo = histogram.iter().position(|&c| c > 0);
    let hi = histogram.iter().rposition(|&c| c > 0);

    let mut lut = [0u8; 256];
    match (lo, hi) {
        (Some(lo), Some(hi)) if hi > lo => {
            let scale = 255.0 / (hi - lo) as f64;
            let offset = -(lo as f64) * scale;
            for (v, slot) in lut.iter_mut().enumerate() {
                *slot = (v as f64 * scale + offset).trunc().clamp(0.0, 255.0) as u8;
            }
        }
        _ => {
            for (v, slot) in lut.iter_mut().enumerate() {
                *slot = v as u8;
            }
        }
    }
    lut
}

/// Remove `cut` samples from the histogram, visiting bins in `order`
fn clip_histogram(histogram: &mut [u64; 256], mut cut: u64, order: impl Iterator<Item = usize>) {
    for bin in order {
        if cut == 0 {
            break;
        }
        let removed = cut.min(histogram[bin]);
        histogram[bin] -= removed;
        cut -= removed;
    }
}

/// Keep only the top `bits` bits of every sample
///
/// Produces `2^bits` evenly spaced levels starting at 0. More than 8 bits is
/// treated as 8, zero bits collapses everything to 0.
pub fn posterize(gray: &GrayImage, bits: u8) -> GrayImage {
    let mask = (0xFFu16 << (8 - bits.min(8))) as u8;
    let mut lut = [0u8; 256];
    for (v, slot) in lut.iter_mut().enumerate() {
        *slot = v as u8 & mask;
    }
    apply_lut(gray, &lut)
}

fn apply_lut(gray: &GrayImage, lut: &[u8; 256]) -> GrayImage {
    map_subpixels(gray, |v| lut[v as usize])
}

/// Expand a grayscale plane to RGBA, taking alpha from `alpha`
pub fn attach_alpha(gray: &GrayImage, alpha: &GrayImage) -> Result<RgbaImage, PipelineError> {
    ensure_same_size("attach_alpha", gray.dimensions(), alpha.dimensions())?;

    let (width, height) = gray.dimensions();
    Ok(RgbaImage::from_fn(width, height, |x, y| {
        let v = gray.get_pixel(x, y)[0];
        Rgba([v, v, v, alpha.get_pixel(x, y)[0]])
    }))
}
