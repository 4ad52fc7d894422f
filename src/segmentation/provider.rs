use std::sync::Arc;

use anyhow::{bail, Result};
use image::{RgbImage, RgbaImage};

use super::matting::{naive_cutout, refined_cutout};
use super::types::{Matte, SegmentationModel};
use crate::config::MattingConfig;
use crate::error::PipelineError;

/// One way of producing an RGBA cutout whose alpha is foreground confidence
pub trait CutoutStrategy: Send + Sync {
    fn cutout(&self, frame: &RgbImage) -> Result<RgbaImage>;

    fn describe(&self) -> String;
}

/// Subject-specialized model with mask cleanup and edge refinement
pub struct RefinedStrategy {
    model: Arc<dyn SegmentationModel>,
    matting: MattingConfig,
}

impl RefinedStrategy {
    pub fn new(model: Arc<dyn SegmentationModel>, matting: MattingConfig) -> Self {
        Self { model, matting }
    }
}

/// Run `model` on `frame`, rejecting mattes that do not cover the frame
fn segment_frame(model: &dyn SegmentationModel, frame: &RgbImage) -> Result<Matte> {
    let matte = model.segment(frame)?;
    if matte.dimensions() != frame.dimensions() {
        bail!(
            "{} returned a {:?} matte for a {:?} frame",
            model.name(),
            matte.dimensions(),
            frame.dimensions()
        );
    }
    Ok(matte)
}

impl CutoutStrategy for RefinedStrategy {
    fn cutout(&self, frame: &RgbImage) -> Result<RgbaImage> {
        let matte = segment_frame(self.model.as_ref(), frame)?;
        Ok(refined_cutout(frame, &matte, &self.matting))
    }

    fn describe(&self) -> String {
        format!("refined ({})", self.model.name())
    }
}

/// General-purpose model, plain matte cutout
pub struct GenericStrategy {
    model: Arc<dyn SegmentationModel>,
}

impl GenericStrategy {
    pub fn new(model: Arc<dyn SegmentationModel>) -> Self {
        Self { model }
    }
}

impl CutoutStrategy for GenericStrategy {
    fn cutout(&self, frame: &RgbImage) -> Result<RgbaImage> {
        let matte = segment_frame(self.model.as_ref(), frame)?;
        Ok(naive_cutout(frame, &matte))
    }

    fn describe(&self) -> String {
        format!("generic ({})", self.model.name())
    }
}

/// Refined strategy first, generic strategy only when the first one fails
pub struct SegmentationProvider {
    primary: RefinedStrategy,
    fallback: GenericStrategy,
}

impl SegmentationProvider {
    pub fn new(primary: RefinedStrategy, fallback: GenericStrategy) -> Self {
        Self { primary, fallback }
    }

    /// Build both strategies from their models
    pub fn from_models(
        primary: Arc<dyn SegmentationModel>,
        fallback: Arc<dyn SegmentationModel>,
        matting: MattingConfig,
    ) -> Self {
        Self::new(
            RefinedStrategy::new(primary, matting),
            GenericStrategy::new(fallback),
        )
    }

    /// Load both models up front, returns how many are ready
    ///
    /// A model that fails to load is only logged; requests still go through
    /// the usual fallback order and report the failure there.
    pub fn preload(&self) -> usize {
        [&self.primary.model, &self.fallback.model]
            .into_iter()
            .filter(|model| match model.preload() {
                Ok(()) => true,
                Err(err) => {
                    tracing::warn!("Could not preload {}: {err:#}", model.name());
                    false
                }
            })
            .count()
    }

    /// Cut the subject out of `frame`
    ///
    /// Errors only when both strategies fail; the message carries both causes.
    pub fn segment(&self, frame: &RgbImage) -> Result<RgbaImage, PipelineError> {
        let _span = tracing::debug_span!("segment").entered();

        let primary_err = match self.primary.cutout(frame) {
            Ok(cutout) => return Ok(cutout),
            Err(err) => err,
        };
        tracing::warn!(
            "Segmentation with {} failed, falling back: {:#}",
            self.primary.describe(),
            primary_err
        );

        self.fallback.cutout(frame).map_err(|fallback_err| {
            PipelineError::Segmentation(format!(
                "{}: {primary_err:#}; {}: {fallback_err:#}",
                self.primary.describe(),
                self.fallback.describe()
            ))
        })
    }
}
