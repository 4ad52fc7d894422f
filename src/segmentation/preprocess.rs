use anyhow::{bail, Result};
use image::{imageops, GrayImage, RgbImage};
use ndarray::{Array4, ArrayViewD, Axis};

const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Preprocessor for converting RGB images to U2-Net input tensors
pub struct Preprocessor {
    target_width: u32,
    target_height: u32,
}

impl Preprocessor {
    pub fn new(target_width: u32, target_height: u32) -> Self {
        Self {
            target_width,
            target_height,
        }
    }

    /// Preprocess an RGB image into a normalized NCHW tensor
    ///
    /// Steps:
    /// 1. Resize to target dimensions
    /// 2. Scale by the brightest sample so values land in [0, 1]
    /// 3. Normalize with ImageNet mean / std
    /// 4. Transpose from HWC to NCHW format
    ///
    /// Returns: Array4<f32> with shape [1, 3, height, width]
    pub fn preprocess(&self, image: &RgbImage) -> Array4<f32> {
        let _span = tracing::debug_span!("preprocess").entered();

        let resized = if image.dimensions() != (self.target_width, self.target_height) {
            imageops::resize(
                image,
                self.target_width,
                self.target_height,
                imageops::FilterType::Lanczos3,
            )
        } else {
            image.clone()
        };

        let peak = resized.as_raw().iter().copied().max().unwrap_or(0) as f32;
        let scale = 1.0 / peak.max(1e-6);

        let (width, height) = resized.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                let value = pixel[c] as f32 * scale;
                tensor[[0, c, y as usize, x as usize]] = (value - MEAN[c]) / STD[c];
            }
        }

        tensor
    }

    /// Turn the raw prediction into a matte at the frame's resolution
    ///
    /// # Arguments
    /// * `prediction` - Model output, shape [1, C, H, W]; channel 0 is used
    /// * `target_width` - Desired output width
    /// * `target_height` - Desired output height
    ///
    /// The prediction is min-max normalized first; a constant prediction
    /// becomes an all-background matte.
    pub fn postprocess_matte(
        prediction: ArrayViewD<'_, f32>,
        target_width: u32,
        target_height: u32,
    ) -> Result<GrayImage> {
        let _span = tracing::debug_span!("postprocess").entered();

        if prediction.ndim() != 4 || prediction.shape()[0] == 0 || prediction.shape()[1] == 0 {
            bail!("Expected a 4-D prediction, got shape {:?}", prediction.shape());
        }
        let plane = prediction
            .index_axis_move(Axis(0), 0)
            .index_axis_move(Axis(0), 0);
        let (matte_height, matte_width) = (plane.shape()[0], plane.shape()[1]);

        let min = plane.iter().copied().fold(f32::INFINITY, f32::min);
        let max = plane.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let range = max - min;

        let data: Vec<u8> = plane
            .iter()
            .map(|&v| {
                let norm = if range > 0.0 { (v - min) / range } else { 0.0 };
                (norm * 255.0).clamp(0.0, 255.0) as u8
            })
            .collect();

        let Some(matte) = GrayImage::from_raw(matte_width as u32, matte_height as u32, data) else {
            bail!("Prediction plane does not fit a {matte_width}x{matte_height} image");
        };

        if matte.dimensions() == (target_width, target_height) {
            return Ok(matte);
        }

        Ok(imageops::resize(
            &matte,
            target_width,
            target_height,
            imageops::FilterType::Lanczos3,
        ))
    }
}
