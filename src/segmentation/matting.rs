//! Turning a soft matte into an RGBA cutout.
//!
//! Two flavors exist. The naive cutout fades the original colors toward
//! transparent black by the matte. The refined cutout cleans the mask up,
//! derives a trimap from it, pins the definite regions to fully opaque or
//! fully transparent and re-estimates the foreground colors with
//! Blur-Fusion x2 so translucent edges do not carry the old background.

use image::{GrayImage, ImageBuffer, Luma, Rgb, Rgba, RgbImage, RgbaImage};
use imageproc::distance_transform::Norm;
use imageproc::filter::{gaussian_blur_f32, separable_filter_equal};
use imageproc::map::{blue_channel, green_channel, map_pixels, map_subpixels, red_channel};
use imageproc::morphology::{erode, open};

use super::types::Matte;
use crate::config::MattingConfig;

/// Trimap label for pixels that are certainly background
pub const TRIMAP_BACKGROUND: u8 = 0;
/// Trimap label for pixels whose coverage is left to the matte
pub const TRIMAP_UNKNOWN: u8 = 128;
/// Trimap label for pixels that are certainly foreground
pub const TRIMAP_FOREGROUND: u8 = 255;

const BLUR_FUSION_RADII: [u32; 2] = [90, 6];
const EPSILON: f32 = 1e-5;

/// Single channel in [0, 1]
type Plane = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Original colors scaled by the matte, alpha = matte
pub fn naive_cutout(frame: &RgbImage, matte: &Matte) -> RgbaImage {
    let (width, height) = frame.dimensions();
    RgbaImage::from_fn(width, height, |x, y| {
        let p = frame.get_pixel(x, y);
        let m = matte.get_pixel(x, y)[0] as u32;
        let scale = |c: u8| ((c as u32 * m + 127) / 255) as u8;
        Rgba([scale(p[0]), scale(p[1]), scale(p[2]), m as u8])
    })
}

/// Edge-refined cutout used by the subject-specialized strategy
pub fn refined_cutout(frame: &RgbImage, matte: &Matte, config: &MattingConfig) -> RgbaImage {
    let _span = tracing::debug_span!("refine").entered();

    let mask = if config.post_process_mask {
        post_process_mask(matte)
    } else {
        matte.clone()
    };

    let trimap = build_trimap(
        &mask,
        config.foreground_threshold,
        config.background_threshold,
        config.erode_size,
    );
    let alpha = refine_alpha(matte, &trimap);
    let foreground = estimate_foreground(frame, &alpha);

    let (width, height) = frame.dimensions();
    RgbaImage::from_fn(width, height, |x, y| {
        let f = foreground.get_pixel(x, y);
        Rgba([f[0], f[1], f[2], alpha.get_pixel(x, y)[0]])
    })
}

/// Smooth a raw model mask
///
/// The matte is cut at 127 first, then the binary mask is opened with a 3x3
/// cross, blurred (sigma 2) and cut again at 127.
pub fn post_process_mask(matte: &Matte) -> GrayImage {
    let binary = map_subpixels(matte, |v| if v > 127 { 255u8 } else { 0 });
    let opened = open(&binary, Norm::L1, 1);
    let blurred = gaussian_blur_f32(&opened, 2.0);
    map_subpixels(&blurred, |v| if v < 127 { 0u8 } else { 255 })
}

/// Label every pixel as definite foreground, definite background or unknown
///
/// Both seeds are eroded by a square of side about `erode_size` so the
/// unknown band straddles the silhouette edge.
pub fn build_trimap(
    mask: &GrayImage,
    foreground_threshold: u8,
    background_threshold: u8,
    erode_size: u32,
) -> GrayImage {
    let radius = (erode_size / 2).min(u8::MAX as u32) as u8;

    let seed = |keep: &dyn Fn(u8) -> bool| {
        let raw = GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
            Luma([if keep(mask.get_pixel(x, y)[0]) { 255 } else { 0 }])
        });
        if radius == 0 {
            raw
        } else {
            erode(&raw, Norm::LInf, radius)
        }
    };

    let foreground = seed(&|v| v > foreground_threshold);
    let background = seed(&|v| v < background_threshold);

    GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        let label = if foreground.get_pixel(x, y)[0] > 0 {
            TRIMAP_FOREGROUND
        } else if background.get_pixel(x, y)[0] > 0 {
            TRIMAP_BACKGROUND
        } else {
            TRIMAP_UNKNOWN
        };
        Luma([label])
    })
}

/// Pin definite regions, keep the matte's soft value in the unknown band
pub fn refine_alpha(matte: &Matte, trimap: &GrayImage) -> GrayImage {
    GrayImage::from_fn(matte.width(), matte.height(), |x, y| {
        let value = match trimap.get_pixel(x, y)[0] {
            TRIMAP_FOREGROUND => 255,
            TRIMAP_BACKGROUND => 0,
            _ => matte.get_pixel(x, y)[0],
        };
        Luma([value])
    })
}

/// Blur-Fusion x2 foreground color estimation (radius 90, then 6)
pub fn estimate_foreground(frame: &RgbImage, alpha: &GrayImage) -> RgbImage {
    let [large, small] = BLUR_FUSION_RADII;
    let a = unit_plane(alpha);
    let blurred_a = [box_mean(&a, large), box_mean(&a, small)];

    let refined = [red_channel(frame), green_channel(frame), blue_channel(frame)].map(|channel| {
        let image = unit_plane(&channel);
        let (first, blurred_b) = blur_fusion_step(&image, &image, &image, &a, &blurred_a[0], large);
        let (foreground, _) = blur_fusion_step(&image, &first, &blurred_b, &a, &blurred_a[1], small);
        foreground
    });

    let (width, height) = frame.dimensions();
    RgbImage::from_fn(width, height, |x, y| {
        let byte = |plane: &Plane| (plane.get_pixel(x, y)[0] * 255.0).round().clamp(0.0, 255.0) as u8;
        Rgb([byte(&refined[0]), byte(&refined[1]), byte(&refined[2])])
    })
}

/// One Blur-Fusion pass over a single channel, returns (F, blurred B)
fn blur_fusion_step(
    image: &Plane,
    f: &Plane,
    b: &Plane,
    a: &Plane,
    blurred_a: &Plane,
    radius: u32,
) -> (Plane, Plane) {
    let weight = |x: u32, y: u32| a.get_pixel(x, y)[0];

    let fa = map_pixels(f, |x, y, p| Luma([p[0] * weight(x, y)]));
    let blurred_fa = box_mean(&fa, radius);
    let b1a = map_pixels(b, |x, y, p| Luma([p[0] * (1.0 - weight(x, y))]));
    let blurred_b1a = box_mean(&b1a, radius);

    let blurred_b = map_pixels(&blurred_b1a, |x, y, p| {
        Luma([p[0] / ((1.0 - blurred_a.get_pixel(x, y)[0]) + EPSILON)])
    });

    let foreground = map_pixels(image, |x, y, p| {
        let alpha = weight(x, y);
        let bf = blurred_fa.get_pixel(x, y)[0] / (blurred_a.get_pixel(x, y)[0] + EPSILON);
        let bb = blurred_b.get_pixel(x, y)[0];
        Luma([(bf + alpha * (p[0] - alpha * bf - (1.0 - alpha) * bb)).clamp(0.0, 1.0)])
    });

    (foreground, blurred_b)
}

/// Mean over a (2r+1)-square window; edge samples are repeated past the border
fn box_mean(plane: &Plane, radius: u32) -> Plane {
    let side = 2 * radius as usize + 1;
    separable_filter_equal(plane, &vec![1.0 / side as f32; side])
}

fn unit_plane(plane: &GrayImage) -> Plane {
    map_subpixels(plane, |v| v as f32 / 255.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disc_matte(size: u32, radius: f32) -> Matte {
        let c = size as f32 / 2.0;
        GrayImage::from_fn(size, size, |x, y| {
            let d = ((x as f32 - c).powi(2) + (y as f32 - c).powi(2)).sqrt();
            Luma([if d < radius { 255 } else { 0 }])
        })
    }

    #[test]
    fn naive_cutout_scales_colors_by_matte() {
        let frame = RgbImage::from_pixel(3, 1, Rgb([200, 100, 50]));
        let matte = GrayImage::from_raw(3, 1, vec![0, 128, 255]).unwrap();
        let cutout = naive_cutout(&frame, &matte);

        assert_eq!(cutout.get_pixel(0, 0).0, [0, 0, 0, 0]);
        assert_eq!(cutout.get_pixel(1, 0).0, [100, 50, 25, 128]);
        assert_eq!(cutout.get_pixel(2, 0).0, [200, 100, 50, 255]);
    }

    #[test]
    fn trimap_has_unknown_band_at_edge() {
        let mask = disc_matte(64, 20.0);
        let trimap = build_trimap(&mask, 240, 10, 10);

        assert_eq!(trimap.get_pixel(32, 32)[0], TRIMAP_FOREGROUND);
        assert_eq!(trimap.get_pixel(0, 0)[0], TRIMAP_BACKGROUND);
        // On the silhouette edge
        assert_eq!(trimap.get_pixel(32 + 20, 32)[0], TRIMAP_UNKNOWN);
        assert_eq!(trimap.get_pixel(32 + 19, 32)[0], TRIMAP_UNKNOWN);
    }

    #[test]
    fn trimap_without_erosion_follows_thresholds() {
        let mask = GrayImage::from_raw(3, 1, vec![5, 128, 250]).unwrap();
        let trimap = build_trimap(&mask, 240, 10, 0);
        assert_eq!(
            trimap.as_raw(),
            &vec![TRIMAP_BACKGROUND, TRIMAP_UNKNOWN, TRIMAP_FOREGROUND]
        );
    }

    #[test]
    fn refined_alpha_keeps_soft_values_only_in_unknown_band() {
        let matte = GrayImage::from_raw(3, 1, vec![30, 90, 200]).unwrap();
        let trimap = GrayImage::from_raw(
            3,
            1,
            vec![TRIMAP_BACKGROUND, TRIMAP_UNKNOWN, TRIMAP_FOREGROUND],
        )
        .unwrap();
        assert_eq!(refine_alpha(&matte, &trimap).as_raw(), &vec![0, 90, 255]);
    }

    #[test]
    fn opaque_alpha_keeps_original_colors() {
        let frame = RgbImage::from_fn(16, 9, |x, y| Rgb([(x * 15) as u8, (y * 28) as u8, 77]));
        let alpha = GrayImage::from_pixel(16, 9, Luma([255]));
        assert_eq!(estimate_foreground(&frame, &alpha), frame);
    }

    #[test]
    fn soft_edges_keep_uniform_color() {
        let frame = RgbImage::from_pixel(64, 16, Rgb([180, 40, 90]));
        let alpha = GrayImage::from_fn(64, 16, |x, _| Luma([(x.saturating_sub(16) * 8).min(255) as u8]));
        let foreground = estimate_foreground(&frame, &alpha);

        for (x, y, p) in foreground.enumerate_pixels() {
            if alpha.get_pixel(x, y)[0] == 0 {
                continue;
            }
            for (got, want) in p.0.iter().zip([180u8, 40, 90]) {
                assert!(got.abs_diff(want) <= 1, "({x}, {y}): {:?}", p.0);
            }
        }
    }

    #[test]
    fn box_mean_averages_square_window() {
        let step = Plane::from_raw(4, 1, vec![0.0, 0.0, 1.0, 1.0]).unwrap();
        let out = box_mean(&step, 1);
        let expected = [0.0, 1.0 / 3.0, 2.0 / 3.0, 1.0];
        for (got, want) in out.as_raw().iter().zip(expected) {
            assert!((got - want).abs() < 1e-5, "{:?}", out.as_raw());
        }

        let flat = Plane::from_pixel(9, 7, Luma([0.25]));
        assert!(box_mean(&flat, 90).as_raw().iter().all(|v| (v - 0.25).abs() < 1e-5));
    }

    #[test]
    fn post_processing_removes_specks() {
        let mut matte = disc_matte(48, 14.0);
        matte.put_pixel(2, 2, Luma([255]));
        let cleaned = post_process_mask(&matte);

        assert_eq!(cleaned.get_pixel(2, 2)[0], 0);
        assert_eq!(cleaned.get_pixel(24, 24)[0], 255);
        assert!(cleaned.as_raw().iter().all(|&v| v == 0 || v == 255));
    }

    #[test]
    fn faint_matte_is_dropped_before_opening() {
        let faint = GrayImage::from_fn(48, 48, |x, y| {
            let inside = (12..36).contains(&x) && (12..36).contains(&y);
            Luma([if inside { 126 } else { 0 }])
        });
        assert!(post_process_mask(&faint).as_raw().iter().all(|&v| v == 0));

        let solid = map_subpixels(&faint, |v| if v > 0 { 128u8 } else { 0 });
        let cleaned = post_process_mask(&solid);
        assert_eq!(cleaned.get_pixel(24, 24)[0], 255);
        assert_eq!(cleaned.get_pixel(2, 2)[0], 0);
    }

    #[test]
    fn refined_cutout_is_opaque_inside_and_clear_outside() {
        let frame = RgbImage::from_pixel(64, 64, Rgb([180, 40, 90]));
        let matte = disc_matte(64, 20.0);
        let cutout = refined_cutout(&frame, &matte, &MattingConfig::default());

        assert_eq!(cutout.get_pixel(32, 32)[3], 255);
        assert_eq!(cutout.get_pixel(1, 1)[3], 0);
        assert_eq!(&cutout.get_pixel(32, 32).0[..3], &[180, 40, 90]);
    }
}
