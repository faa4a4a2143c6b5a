use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::Parser;

use blanket_core::anonymization::domain::anonymization_method::AnonymizationMethod;
use blanket_core::anonymization::domain::anonymizer::Anonymizer;
use blanket_core::anonymization::infrastructure::anonymizer_cache::AnonymizerCache;
use blanket_core::anonymization::infrastructure::anonymizer_registry::AnonymizerRegistry;
use blanket_core::detection::domain::detection_stage::DetectionStage;
use blanket_core::detection::infrastructure::json_detection_source::JsonDetectionSource;
use blanket_core::pipeline::anonymize_image_use_case::AnonymizeImageUseCase;
use blanket_core::pipeline::anonymize_video_use_case::AnonymizeVideoUseCase;
use blanket_core::pipeline::batch_anonymize_use_case::BatchAnonymizeUseCase;
use blanket_core::pipeline::pipeline_logger::{LogPipelineLogger, PipelineLogger};
use blanket_core::pipeline::pipeline_options::PipelineOptions;
use blanket_core::settings::main_settings::{LoggingSettings, MainSettings};
use blanket_core::settings::paths;
use blanket_core::shared::constants::{is_image_path, MAIN_SETTINGS_FILE_NAME};
use blanket_core::shared::error::BlanketResult;
use blanket_core::video::infrastructure::ffmpeg_writer::FfmpegWriter;
use blanket_core::video::infrastructure::image_file_writer::ImageFileWriter;

/// Face anonymization for images and videos.
#[derive(Parser)]
#[command(name = "blanket")]
struct Cli {
    /// Input image, video or folder (defaults to the configured input folder).
    input: Option<PathBuf>,

    /// Output file, or output folder for folder input (defaults to the
    /// configured output folder).
    output: Option<PathBuf>,

    /// Anonymization method, e.g. black_box, gaussian_blur, pixelation,
    /// stable_diffusion, facefusion, stable_diffusion_conditioned_facefusion.
    #[arg(long)]
    method: Option<AnonymizationMethod>,

    /// Precomputed detections JSON, or a folder with one `<stem>.json` per
    /// input file.
    #[arg(long)]
    detections: Option<PathBuf>,

    /// Clockwise quarter turns that bring the input upright.
    #[arg(long, allow_hyphen_values = true)]
    rotation: Option<i32>,

    /// Main settings JSON (defaults to main_settings.json in the config folder).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Configuration folder holding main settings and anonymizer parameters.
    #[arg(long)]
    config_folder: Option<PathBuf>,

    /// Restrict saved outputs to the current user.
    #[arg(long)]
    restrict_access: bool,

    /// Replace frames without detections by black frames.
    #[arg(long)]
    blacken_without_detections: bool,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config_folder = cli.config_folder.clone().unwrap_or_else(paths::config_folder);
    let settings_path = cli
        .settings
        .clone()
        .unwrap_or_else(|| config_folder.join(MAIN_SETTINGS_FILE_NAME));
    let settings = apply_overrides(MainSettings::load(&settings_path)?, &cli);
    init_logging(&settings.logging_settings);
    log::debug!("Settings loaded from {}", settings_path.display());

    let input = cli
        .input
        .clone()
        .or_else(|| settings.input_settings.input_folder.clone())
        .ok_or("no input given and no input_folder configured")?;

    let method = settings.module_settings.anonymizer_name;
    let parameters_folder = paths::anonymizer_parameters_folder_in(&config_folder);
    let cache = AnonymizerCache::new(AnonymizerRegistry::with_defaults(parameters_folder));
    let anonymizer = cache.get(method)?;

    let options = PipelineOptions::from_settings(&settings);
    let rotation = settings.input_settings.clockwise_rotation_index;
    let mut logger = LogPipelineLogger::from_settings(&settings.logging_settings);

    let result = if input.is_dir() {
        let output = output_path(&cli, &settings, None)?;
        run_batch(
            anonymizer,
            &input,
            &output,
            cli.detections.clone(),
            options,
            rotation,
            &mut logger,
        )
    } else {
        let output = output_path(&cli, &settings, Some(&input))?;
        run_single(
            anonymizer,
            &input,
            &output,
            cli.detections.as_deref(),
            options,
            rotation,
            &mut logger,
        )
    };
    logger.summary();
    result
}

fn apply_overrides(mut settings: MainSettings, cli: &Cli) -> MainSettings {
    if let Some(method) = cli.method {
        settings.module_settings.anonymizer_name = method;
    }
    if let Some(rotation) = cli.rotation {
        settings.input_settings.clockwise_rotation_index = rotation;
    }
    if cli.restrict_access {
        settings.input_settings.restrict_access_to_saved = true;
    }
    if cli.blacken_without_detections {
        settings.anonymization_settings.blacken_without_detections = true;
    }
    settings
}

fn init_logging(settings: &LoggingSettings) {
    let env = env_logger::Env::default().default_filter_or(settings.console_log_level.as_str());
    env_logger::Builder::from_env(env).init();
}

/// Explicit output, else the configured output folder (joined with the
/// input's file name for single files).
fn output_path(
    cli: &Cli,
    settings: &MainSettings,
    input_file: Option<&Path>,
) -> Result<PathBuf, Box<dyn std::error::Error>> {
    if let Some(output) = &cli.output {
        return Ok(output.clone());
    }
    let folder = settings
        .input_settings
        .output_folder
        .clone()
        .ok_or("no output given and no output_folder configured")?;
    match input_file.and_then(Path::file_name) {
        Some(name) => Ok(folder.join(name)),
        None => Ok(folder),
    }
}

/// Detections for `input`: the JSON file itself, or `<stem>.json` inside a
/// detections folder. Without detections the stage is empty.
fn detection_stage(detections: Option<&Path>, input: &Path) -> BlanketResult<DetectionStage> {
    let Some(detections) = detections else {
        return Ok(DetectionStage::empty());
    };
    let file = if detections.is_dir() {
        let stem = input.file_stem().unwrap_or_default().to_string_lossy();
        detections.join(format!("{stem}.json"))
    } else {
        detections.to_path_buf()
    };
    let source = JsonDetectionSource::from_path(&file)?;
    Ok(DetectionStage::new(
        Some(Box::new(source.clone())),
        Some(Box::new(source)),
    ))
}

fn run_single(
    anonymizer: Arc<dyn Anonymizer>,
    input: &Path,
    output: &Path,
    detections: Option<&Path>,
    options: PipelineOptions,
    rotation: i32,
    logger: &mut dyn PipelineLogger,
) -> Result<(), Box<dyn std::error::Error>> {
    let detection = detection_stage(detections, input)?;
    if is_image_path(input) {
        let mut use_case = AnonymizeImageUseCase::new(
            anonymizer,
            detection,
            Box::new(ImageFileWriter::new()),
            options,
        );
        use_case.execute_path(input, output, rotation, logger)?;
    } else {
        let mut use_case = AnonymizeVideoUseCase::new(
            anonymizer,
            detection,
            Box::new(FfmpegWriter::new()),
            options,
            None,
        );
        use_case.execute_path(input, output, rotation, logger)?;
    }
    log::info!("Output written to {}", output.display());
    Ok(())
}

fn run_batch(
    anonymizer: Arc<dyn Anonymizer>,
    input: &Path,
    output: &Path,
    detections: Option<PathBuf>,
    options: PipelineOptions,
    rotation: i32,
    logger: &mut dyn PipelineLogger,
) -> Result<(), Box<dyn std::error::Error>> {
    let use_case = BatchAnonymizeUseCase::new(
        anonymizer,
        Box::new(move |path: &Path| detection_stage(detections.as_deref(), path)),
        options,
        rotation,
    );
    let report = use_case.execute(input, output, logger)?;
    for (path, reason) in &report.failed {
        eprintln!("  {}: {reason}", path.display());
    }
    if report.is_success() {
        Ok(())
    } else {
        Err(format!("{} of {} files failed", report.failed.len(), report.total()).into())
    }
}
