/// Parameters of the styling stages, fixed for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Soft alpha at or below this value counts as background
    pub mask_threshold: u8,
    /// Radius of the square max filter used for the outline (side = 2r + 1)
    pub dilation_radius: u8,
    /// Percentage of samples clipped at each end of the luma histogram
    pub contrast_cutoff: u8,
    /// Significant bits kept per channel when posterizing
    pub posterize_bits: u8,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mask_threshold: 10,
            dilation_radius: 4,
            contrast_cutoff: 5,
            posterize_bits: 4,
        }
    }
}

/// Edge refinement settings, used only by the refined segmentation strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MattingConfig {
    /// Matte values above this seed the definite foreground
    pub foreground_threshold: u8,
    /// Matte values below this seed the definite background
    pub background_threshold: u8,
    /// Side of the square used to erode both trimap seeds
    pub erode_size: u32,
    /// Open, blur and re-threshold the raw model mask before refinement
    pub post_process_mask: bool,
}

impl Default for MattingConfig {
    fn default() -> Self {
        Self {
            foreground_threshold: 240,
            background_threshold: 10,
            erode_size: 10,
            post_process_mask: true,
        }
    }
}
