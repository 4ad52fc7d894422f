use anyhow::{bail, Context, Result};
use clap::Parser;
use deepetch::segmentation;
use deepetch::{handle_request, MattingConfig, Pipeline, PipelineConfig};
use std::io::Read;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Image file to process directly
    #[arg(short, long, conflicts_with = "request")]
    input: Option<PathBuf>,

    /// Where to write the PNG produced from --input
    #[arg(short, long, requires = "input")]
    output: Option<PathBuf>,

    /// JSON request file ({"image": "<base64>"}), or "-" for stdin.
    /// The JSON response is printed to stdout
    #[arg(short, long)]
    request: Option<String>,

    /// Subject-specialized segmentation model (ONNX file)
    #[arg(long, default_value = "models/u2net_human_seg.onnx")]
    primary_model: PathBuf,

    /// General segmentation model used when the primary one fails (ONNX file)
    #[arg(long, default_value = "models/u2net.onnx")]
    fallback_model: PathBuf,

    /// Alpha at or below this value is background for the outline mask
    #[arg(long, default_value_t = 10)]
    mask_threshold: u8,

    /// Outline width in pixels (square max filter radius)
    #[arg(long, default_value_t = 4)]
    dilation_radius: u8,

    /// Percent of the histogram clipped at each end before stretching contrast
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u8).range(0..=100))]
    contrast_cutoff: u8,

    /// Bits kept per channel when posterizing
    #[arg(long, default_value_t = 4, value_parser = clap::value_parser!(u8).range(1..=8))]
    posterize_bits: u8,

    /// Matte values above this seed the definite foreground during edge refinement
    #[arg(long, default_value_t = 240)]
    foreground_threshold: u8,

    /// Matte values below this seed the definite background during edge refinement
    #[arg(long, default_value_t = 10)]
    background_threshold: u8,

    /// Erosion size applied to both refinement seeds
    #[arg(long, default_value_t = 10)]
    erode_size: u32,

    /// Skip the open / blur / threshold cleanup of the primary model's mask
    #[arg(long)]
    no_post_process: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

impl Args {
    fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            mask_threshold: self.mask_threshold,
            dilation_radius: self.dilation_radius,
            contrast_cutoff: self.contrast_cutoff,
            posterize_bits: self.posterize_bits,
        }
    }

    fn matting_config(&self) -> MattingConfig {
        MattingConfig {
            foreground_threshold: self.foreground_threshold,
            background_threshold: self.background_threshold,
            erode_size: self.erode_size,
            post_process_mask: !self.no_post_process,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    // stdout carries JSON responses, so logs go to stderr
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("deepetch starting");
    tracing::info!("Primary model: {}", args.primary_model.display());
    tracing::info!("Fallback model: {}", args.fallback_model.display());

    let config = args.pipeline_config();
    tracing::debug!("Pipeline config: {:?}", config);

    let provider = segmentation::create_default_provider(
        &args.primary_model,
        &args.fallback_model,
        args.matting_config(),
    );
    // Load models now so the first request does not pay for it
    let ready = provider.preload();
    tracing::info!("{ready} of 2 segmentation models loaded");

    let pipeline = Pipeline::new(provider, config);

    match (&args.input, &args.request) {
        (Some(input), _) => run_file(&pipeline, input, args.output.clone()),
        (None, Some(request)) => run_request(&pipeline, request),
        (None, None) => bail!("Nothing to do: pass --input <image> or --request <json|->"),
    }
}

fn run_file(pipeline: &Pipeline, input: &Path, output: Option<PathBuf>) -> Result<()> {
    let bytes = std::fs::read(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;

    let png = pipeline
        .process_image_bytes(&bytes)
        .with_context(|| format!("Failed to process {}", input.display()))?;

    let output = output.unwrap_or_else(|| {
        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("out");
        input.with_file_name(format!("{stem}_etched.png"))
    });

    std::fs::write(&output, png)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    tracing::info!("Wrote {}", output.display());

    Ok(())
}

fn run_request(pipeline: &Pipeline, source: &str) -> Result<()> {
    let raw = if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read request from stdin")?;
        buf
    } else {
        std::fs::read_to_string(source)
            .with_context(|| format!("Failed to read request from {source}"))?
    };

    // Unparseable JSON is still answered with an error object
    let request = serde_json::from_str(&raw).unwrap_or_else(|e| {
        tracing::warn!("Request is not valid JSON: {e}");
        serde_json::Value::Null
    });

    let response = handle_request(pipeline, &request);
    println!(
        "{}",
        serde_json::to_string(&response).context("Failed to serialize response")?
    );

    Ok(())
}
