use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};

use crate::error::{ensure_same_size, PipelineError};

/// Porter-Duff "over": `front` on top of `back`
pub fn composite_over(back: &RgbaImage, front: &RgbaImage) -> Result<RgbaImage, PipelineError> {
    let _span = tracing::debug_span!("composite").entered();

    ensure_same_size("composite", back.dimensions(), front.dimensions())?;

    let (width, height) = front.dimensions();
    Ok(RgbaImage::from_fn(width, height, |x, y| {
        over(back.get_pixel(x, y), front.get_pixel(x, y))
    }))
}

fn over(back: &Rgba<u8>, front: &Rgba<u8>) -> Rgba<u8> {
    let fa = front[3] as f32 / 255.0;
    let ba = back[3] as f32 / 255.0;
    let out_a = fa + ba * (1.0 - fa);

    if out_a <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let back_weight = ba * (1.0 - fa);
    let mut out = [0u8; 4];
    for c in 0..3 {
        let value = (front[c] as f32 * fa + back[c] as f32 * back_weight) / out_a;
        out[c] = to_u8(value);
    }
    out[3] = to_u8(out_a * 255.0);
    Rgba(out)
}

fn to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// Serialize to PNG, keeping the alpha channel
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, PipelineError> {
    let _span = tracing::debug_span!("encode_png").entered();

    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(image.clone())
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(|e| PipelineError::Encoding(e.to_string()))?;
    Ok(buffer.into_inner())
}

/// Decode PNG bytes back into RGBA
pub fn decode_png(bytes: &[u8]) -> Result<RgbaImage, PipelineError> {
    image::load_from_memory_with_format(bytes, ImageFormat::Png)
        .map(|image| image.to_rgba8())
        .map_err(|e| PipelineError::Input(format!("not a PNG image: {e}")))
}
