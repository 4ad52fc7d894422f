use super::preprocess::Preprocessor;
use super::types::{Matte, SegmentationModel};
use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

/// U2-Net salient object segmentation model
///
/// The ONNX session is created on the first `segment` call and then reused
/// by every later request. Inference is serialized through a mutex because
/// running a session needs exclusive access.
pub struct U2Net {
    name: String,
    model_path: PathBuf,
    preprocessor: Preprocessor,
    width: u32,
    height: u32,
    session: OnceLock<Mutex<Session>>,
}

impl U2Net {
    /// Describe a U2-Net model stored in an ONNX file
    ///
    /// Nothing is loaded until the first frame is segmented (or `preload`
    /// is called).
    ///
    /// # Arguments
    /// * `name` - Identifier used in logs, e.g. `u2net_human_seg`
    /// * `model_path` - Path to the ONNX model file
    ///
    /// # Default Configuration
    /// - Input size: 320x320, the resolution U2-Net was trained at
    pub fn new<P: AsRef<Path>>(name: impl Into<String>, model_path: P) -> Self {
        let width = 320;
        let height = 320;

        Self {
            name: name.into(),
            model_path: model_path.as_ref().to_path_buf(),
            preprocessor: Preprocessor::new(width, height),
            width,
            height,
            session: OnceLock::new(),
        }
    }

    fn session(&self) -> Result<&Mutex<Session>> {
        if let Some(session) = self.session.get() {
            return Ok(session);
        }

        let session = Self::load(&self.model_path)?;
        // A concurrent first request may have won the race; keep whichever landed first
        Ok(self.session.get_or_init(|| Mutex::new(session)))
    }

    fn load(path: &Path) -> Result<Session> {
        tracing::info!("Loading U2-Net model from {}", path.display());

        let session = Session::builder()
            .map_err(ort_error)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(ort_error)?
            .with_intra_threads(4)
            .map_err(ort_error)?
            .commit_from_file(path)
            .map_err(ort_error)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        tracing::info!("U2-Net model loaded successfully");

        Ok(session)
    }
}

fn ort_error<E: Display>(err: E) -> anyhow::Error {
    anyhow!("onnxruntime: {err}")
}

impl SegmentationModel for U2Net {
    fn segment(&self, frame: &RgbImage) -> Result<Matte> {
        let _span = tracing::debug_span!("u2net_segment", model = %self.name).entered();

        let session = self.session()?;

        // Preprocess frame to NCHW tensor
        let input_tensor = self.preprocessor.preprocess(frame);
        let input = Tensor::from_array(input_tensor).map_err(ort_error)?;

        let mut session = session
            .lock()
            .map_err(|_| anyhow!("Session for {} was poisoned by a panic", self.name))?;

        // Run inference
        let _infer_span = tracing::debug_span!("inference").entered();
        let outputs = session
            .run(ort::inputs![input])
            .map_err(ort_error)
            .context("Failed to run inference")?;
        drop(_infer_span);

        // The fused side output d0 comes first; the rest are deep supervision maps
        let prediction = outputs[0].try_extract_array::<f32>().map_err(ort_error)?;

        let (frame_width, frame_height) = frame.dimensions();
        Preprocessor::postprocess_matte(prediction, frame_width, frame_height)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn preload(&self) -> Result<()> {
        self.session().map(|_| ())
    }

    fn input_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_training_resolution() {
        let model = U2Net::new("u2net", "models/u2net.onnx");
        assert_eq!(model.input_size(), (320, 320));
        assert_eq!(model.name(), "u2net");
    }

    #[test]
    fn missing_model_file_is_an_error() {
        let model = U2Net::new("u2net", "/nonexistent/deepetch/u2net.onnx");
        let frame = RgbImage::new(8, 8);
        assert!(model.segment(&frame).is_err());
    }

    #[test]
    fn preload_reports_missing_model_file() {
        let model = U2Net::new("u2net_human_seg", "/nonexistent/deepetch/u2net_human_seg.onnx");
        assert!(model.preload().is_err());
        assert!(model.session.get().is_none());
    }
}
