use std::io::Cursor;
use std::time::Instant;

use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageError, ImageReader, RgbImage, RgbaImage};

use crate::config::PipelineConfig;
use crate::effects::{encode_png, stylize};
use crate::error::PipelineError;
use crate::segmentation::SegmentationProvider;

/// Photo in, etched sticker out
///
/// Holds only read-only state; one instance serves any number of concurrent
/// requests.
pub struct Pipeline {
    provider: SegmentationProvider,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(provider: SegmentationProvider, config: PipelineConfig) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Decode any supported image format, process it and return PNG bytes
    pub fn process_image_bytes(&self, bytes: &[u8]) -> Result<Vec<u8>, PipelineError> {
        let start = Instant::now();

        let frame = decode_input(bytes)?;
        let decode_ms = start.elapsed().as_secs_f64() * 1000.0;

        let styled = self.process_frame(&frame)?;
        let process_ms = start.elapsed().as_secs_f64() * 1000.0 - decode_ms;

        let png = encode_png(&styled)?;
        let total_ms = start.elapsed().as_secs_f64() * 1000.0;

        tracing::info!(
            "Processed {}x{}: decode={:.1}ms, process={:.1}ms, encode={:.1}ms, total={:.1}ms",
            frame.width(),
            frame.height(),
            decode_ms,
            process_ms,
            total_ms - decode_ms - process_ms,
            total_ms
        );

        Ok(png)
    }

    /// Segment and stylize an already decoded frame
    pub fn process_frame(&self, frame: &RgbImage) -> Result<RgbaImage, PipelineError> {
        let cutout = self.provider.segment(frame)?;
        stylize(&cutout, &self.config)
    }
}

fn decode_input(bytes: &[u8]) -> Result<RgbImage, PipelineError> {
    let _span = tracing::debug_span!("decode", len = bytes.len()).entered();

    if bytes.is_empty() {
        return Err(PipelineError::Input("image payload is empty".into()));
    }

    let mut decoder = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| PipelineError::Input(format!("unreadable image data: {e}")))?
        .into_decoder()
        .map_err(unreadable)?;

    // Phone cameras store rotation as EXIF metadata instead of rotating pixels
    let orientation = decoder.orientation().unwrap_or_else(|e| {
        tracing::warn!("Ignoring unreadable orientation metadata: {e}");
        Orientation::NoTransforms
    });

    let mut image = DynamicImage::from_decoder(decoder).map_err(unreadable)?;
    image.apply_orientation(orientation);
    Ok(image.to_rgb8())
}

fn unreadable(err: ImageError) -> PipelineError {
    PipelineError::Input(format!("unreadable image data: {err}"))
}
