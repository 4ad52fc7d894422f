use image::{GrayImage, Luma, RgbaImage};
use imageproc::map::map_subpixels;

/// Pull the alpha plane out of an RGBA image
pub fn alpha_channel(image: &RgbaImage) -> GrayImage {
    let (width, height) = image.dimensions();
    GrayImage::from_fn(width, height, |x, y| Luma([image.get_pixel(x, y)[3]]))
}

/// Threshold a soft alpha plane into a hard 0/255 mask
///
/// Values strictly above `threshold` become 255, everything else 0.
pub fn build_hard_mask(alpha: &GrayImage, threshold: u8) -> GrayImage {
    let _span = tracing::debug_span!("hard_mask", threshold).entered();

    map_subpixels(alpha, |a| u8::from(a > threshold) * 255)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use proptest::prelude::*;

    #[test]
    fn threshold_is_exclusive() {
        let alpha = GrayImage::from_raw(4, 1, vec![0, 10, 11, 255]).unwrap();
        let mask = build_hard_mask(&alpha, 10);
        assert_eq!(mask.as_raw(), &vec![0, 0, 255, 255]);
    }

    #[test]
    fn zero_threshold_keeps_any_coverage() {
        let alpha = GrayImage::from_raw(3, 1, vec![0, 1, 128]).unwrap();
        let mask = build_hard_mask(&alpha, 0);
        assert_eq!(mask.as_raw(), &vec![0, 255, 255]);
    }

    #[test]
    fn mask_keeps_pixel_positions() {
        let mut alpha = GrayImage::new(5, 3);
        alpha.put_pixel(4, 0, Luma([200]));
        alpha.put_pixel(0, 2, Luma([11]));
        let mask = build_hard_mask(&alpha, 10);

        assert_eq!(mask.dimensions(), (5, 3));
        assert_eq!(mask.get_pixel(4, 0)[0], 255);
        assert_eq!(mask.get_pixel(0, 2)[0], 255);
        assert_eq!(mask.pixels().filter(|p| p[0] == 255).count(), 2);
    }

    #[test]
    fn alpha_channel_reads_fourth_component() {
        let mut image = RgbaImage::new(2, 1);
        image.put_pixel(0, 0, Rgba([1, 2, 3, 4]));
        image.put_pixel(1, 0, Rgba([9, 9, 9, 200]));
        assert_eq!(alpha_channel(&image).as_raw(), &vec![4, 200]);
    }

    proptest! {
        #[test]
        fn hard_mask_is_binary(
            data in proptest::collection::vec(any::<u8>(), 64),
            threshold in any::<u8>(),
        ) {
            let alpha = GrayImage::from_raw(8, 8, data).unwrap();
            let mask = build_hard_mask(&alpha, threshold);
            prop_assert!(mask.as_raw().iter().all(|&v| v == 0 || v == 255));
        }
    }
}
