use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::anonymization::domain::anonymization_method::AnonymizationMethod;
use crate::anonymization::domain::anonymizer::{Anonymizer, VideoJob};
use crate::anonymization::domain::anonymizer_settings::AnonymizerSettings;
use crate::anonymization::domain::clip_synthesizer::ClipSynthesizer;
use crate::detection::domain::detection_stage::Requirements;
use crate::detection::domain::face_detection::FaceDetection;
use crate::shared::error::{BlanketError, BlanketResult};
use crate::video::domain::image_primitive::ImagePrimitive;
use crate::video::domain::video_primitive::VideoPrimitive;

use super::process_runner::{ProcessCommand, ProcessRunner, SystemProcessRunner};

const DEFAULT_LAUNCHER: [&str; 3] = ["bash", "run_facefusion.sh", "facefusion.py"];
const DEFAULT_WORKING_DIRECTORY: &str = "../../facefusion";
const DEFAULT_ARGUMENTS: &[&str] = &[
    "--face-detector-model",
    "yoloface",
    "--face-detector-score",
    "0.25",
    "--face-landmarker-score",
    "0.15",
    "--face-selector-mode",
    "reference",
    "--face-mask-types",
    "box",
    "occlusion",
    "region",
    "--face-mask-blur",
    "0.60",
    "--output-image-quality",
    "100",
    "--output-video-preset",
    "medium",
    "--skip-audio",
    "--processors",
    "face_swapper",
    "--face-swapper-pixel-boost",
    "512x512",
    "--execution-providers",
    "cuda",
    "--execution-thread-count",
    "1",
    "--log-level",
    "debug",
];

/// Whole-clip face swapping through an external FaceFusion installation.
pub struct FacefusionAnonymizer {
    settings: AnonymizerSettings,
    launcher: Vec<String>,
    working_directory: Option<PathBuf>,
    arguments: Vec<String>,
    timeout: Option<Duration>,
    source_image: Option<PathBuf>,
    runner: Arc<dyn ProcessRunner>,
}

impl FacefusionAnonymizer {
    pub fn new(settings: AnonymizerSettings) -> BlanketResult<Self> {
        Self::with_runner(settings, Arc::new(SystemProcessRunner))
    }

    pub fn with_runner(
        settings: AnonymizerSettings,
        runner: Arc<dyn ProcessRunner>,
    ) -> BlanketResult<Self> {
        let launcher: Vec<String> = settings.extra_or(
            "launcher",
            DEFAULT_LAUNCHER.iter().map(|s| s.to_string()).collect(),
        )?;
        if launcher.is_empty() {
            return Err(BlanketError::Configuration(
                "facefusion launcher must name a program".into(),
            ));
        }
        let working_directory = settings
            .extra::<PathBuf>("working_directory")?
            .or_else(|| Some(PathBuf::from(DEFAULT_WORKING_DIRECTORY)));
        let arguments = settings.extra_or(
            "arguments",
            DEFAULT_ARGUMENTS.iter().map(|s| s.to_string()).collect(),
        )?;
        let timeout = settings
            .extra::<u64>("timeout_seconds")?
            .map(Duration::from_secs);
        let source_image = settings.extra::<PathBuf>("source_image")?;

        Ok(Self {
            settings,
            launcher,
            working_directory,
            arguments,
            timeout,
            source_image,
            runner,
        })
    }

    /// Launcher, the headless-run subcommand with its paths, then the extra arguments.
    pub fn command(&self, source: &Path, target: &Path, output: &Path) -> ProcessCommand {
        let (program, launcher_args) = match self.launcher.split_first() {
            Some((program, rest)) => (program.as_str(), rest),
            None => (DEFAULT_LAUNCHER[0], &[][..]),
        };
        ProcessCommand::new(program)
            .args(launcher_args)
            .arg("headless-run")
            .args([
                OsStr::new("-s"),
                source.as_os_str(),
                OsStr::new("-t"),
                target.as_os_str(),
                OsStr::new("-o"),
                output.as_os_str(),
            ])
            .args(&self.arguments)
            .working_dir(self.working_directory.clone())
            .timeout(self.timeout)
    }
}

impl ClipSynthesizer for FacefusionAnonymizer {
    fn synthesize(
        &self,
        reference_image: &Path,
        target_video: &Path,
        output: &Path,
    ) -> BlanketResult<VideoPrimitive> {
        let command = self.command(
            &absolute(reference_image),
            &absolute(target_video),
            &absolute(output),
        );
        let outcome = self.runner.run(&command)?;
        if !outcome.success {
            return Err(BlanketError::external(
                format!(
                    "facefusion exited with {}",
                    outcome
                        .code
                        .map_or_else(|| "a signal".to_string(), |c| format!("code {c}"))
                ),
                false,
            ));
        }
        if !output.exists() {
            return Err(BlanketError::external(
                format!("facefusion reported success but {} was not written", output.display()),
                false,
            ));
        }
        Ok(VideoPrimitive::new(output, 0))
    }
}

impl Anonymizer for FacefusionAnonymizer {
    fn method(&self) -> AnonymizationMethod {
        AnonymizationMethod::Facefusion
    }

    fn settings(&self) -> &AnonymizerSettings {
        &self.settings
    }

    fn intrinsic_requirements(&self) -> Requirements {
        Requirements::NONE
    }

    fn anonymize_image(
        &self,
        _image: &ImagePrimitive,
        _faces: &[FaceDetection],
    ) -> BlanketResult<ImagePrimitive> {
        Err(BlanketError::Unsupported("facefusion image anonymization".into()))
    }

    fn anonymize_video(
        &self,
        video: &mut VideoPrimitive,
        output: &Path,
        job: &mut VideoJob<'_>,
    ) -> BlanketResult<VideoPrimitive> {
        let source = self.source_image.as_deref().ok_or_else(|| {
            BlanketError::Configuration("facefusion needs 'source_image' to anonymize a video".into())
        })?;
        job.logger
            .info(&format!("Synthesizing {} with facefusion", video.path().display()));
        video.release();
        self.synthesize(source, video.path(), output)
    }
}

/// The external tool runs in its own working directory, so paths are made absolute.
fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anonymization::infrastructure::process_runner::ProcessOutcome;
    use crate::detection::domain::detection_stage::DetectionStage;
    use crate::pipeline::pipeline_logger::NullPipelineLogger;
    use crate::shared::frame::Frame;
    use crate::shared::video_metadata::VideoMetadata;
    use crate::video::domain::video_writer::VideoWriter;
    use serde_json::json;
    use std::sync::atomic::AtomicBool;
    use std::sync::Mutex;

    // --- Stubs ---

    /// Records commands and optionally writes the `-o` file like the real tool.
    struct RecordingRunner {
        commands: Mutex<Vec<ProcessCommand>>,
        outcome: ProcessOutcome,
        write_output: bool,
    }

    impl RecordingRunner {
        fn new(success: bool, write_output: bool) -> Arc<Self> {
            Arc::new(Self {
                commands: Mutex::new(Vec::new()),
                outcome: ProcessOutcome {
                    success,
                    code: Some(if success { 0 } else { 1 }),
                },
                write_output,
            })
        }
    }

    impl ProcessRunner for RecordingRunner {
        fn run(&self, command: &ProcessCommand) -> BlanketResult<ProcessOutcome> {
            self.commands.lock().unwrap().push(command.clone());
            if self.write_output {
                let pos = command.args.iter().position(|a| a == "-o").unwrap();
                std::fs::write(&command.args[pos + 1], b"video").unwrap();
            }
            Ok(self.outcome)
        }
    }

    struct NoopWriter;

    impl VideoWriter for NoopWriter {
        fn open(&mut self, _: &Path, _: &VideoMetadata) -> Result<(), Box<dyn std::error::Error>> {
            Ok(())
        }
        fn write(&mut self, _: &Frame) -> Result<(), Box<dyn std::error::Error>> {
            Ok(())
        }
        fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
            Ok(())
        }
    }

    fn args_of(command: &ProcessCommand) -> Vec<String> {
        command
            .args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    // --- Tests ---

    #[test]
    fn test_default_command_line() {
        let anonymizer = FacefusionAnonymizer::with_runner(
            AnonymizerSettings::default(),
            RecordingRunner::new(true, false),
        )
        .unwrap();
        let command = anonymizer.command(
            Path::new("/data/ref.png"),
            Path::new("/data/in.mp4"),
            Path::new("/data/out.mp4"),
        );

        assert_eq!(command.program, "bash");
        let args = args_of(&command);
        assert_eq!(
            &args[..8],
            &[
                "run_facefusion.sh",
                "facefusion.py",
                "headless-run",
                "-s",
                "/data/ref.png",
                "-t",
                "/data/in.mp4",
                "-o"
            ]
        );
        assert_eq!(args[8], "/data/out.mp4");
        assert_eq!(args.len(), 9 + DEFAULT_ARGUMENTS.len());
        assert!(args.contains(&"--skip-audio".to_string()));
        assert_eq!(command.working_dir, Some(PathBuf::from("../../facefusion")));
        assert_eq!(command.timeout, None);
    }

    #[test]
    fn test_settings_override_launcher_and_arguments() {
        let settings = AnonymizerSettings::default()
            .with_extra("launcher", json!(["python3", "facefusion.py"]))
            .with_extra("arguments", json!(["--execution-providers", "cpu"]))
            .with_extra("working_directory", json!("/opt/facefusion"))
            .with_extra("timeout_seconds", json!(3600));
        let anonymizer =
            FacefusionAnonymizer::with_runner(settings, RecordingRunner::new(true, false)).unwrap();
        let command = anonymizer.command(Path::new("s"), Path::new("t"), Path::new("o"));

        assert_eq!(command.program, "python3");
        assert_eq!(
            args_of(&command),
            vec!["facefusion.py", "headless-run", "-s", "s", "-t", "t", "-o", "o", "--execution-providers", "cpu"]
        );
        assert_eq!(command.working_dir, Some(PathBuf::from("/opt/facefusion")));
        assert_eq!(command.timeout, Some(Duration::from_secs(3600)));
    }

    #[test]
    fn test_empty_launcher_rejected() {
        let settings = AnonymizerSettings::default().with_extra("launcher", json!([]));
        assert!(matches!(
            FacefusionAnonymizer::with_runner(settings, RecordingRunner::new(true, false)),
            Err(BlanketError::Configuration(_))
        ));
    }

    #[test]
    fn test_synthesize_success_returns_output_video() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RecordingRunner::new(true, true);
        let anonymizer =
            FacefusionAnonymizer::with_runner(AnonymizerSettings::default(), runner.clone()).unwrap();
        let output = dir.path().join("out.mp4");

        let video = anonymizer
            .synthesize(&dir.path().join("ref.png"), &dir.path().join("in.mp4"), &output)
            .unwrap();

        assert_eq!(video.path(), output.as_path());
        assert_eq!(video.clockwise_rotation_index(), 0);
        assert_eq!(runner.commands.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_non_zero_exit_is_permanent_failure() {
        let dir = tempfile::tempdir().unwrap();
        let anonymizer = FacefusionAnonymizer::with_runner(
            AnonymizerSettings::default(),
            RecordingRunner::new(false, false),
        )
        .unwrap();
        let err = anonymizer
            .synthesize(Path::new("ref.png"), Path::new("in.mp4"), &dir.path().join("out.mp4"))
            .unwrap_err();
        assert!(matches!(err, BlanketError::ExternalService { retryable: false, .. }));
        assert!(err.to_string().contains("code 1"));
    }

    #[test]
    fn test_missing_output_after_success_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let anonymizer = FacefusionAnonymizer::with_runner(
            AnonymizerSettings::default(),
            RecordingRunner::new(true, false),
        )
        .unwrap();
        let err = anonymizer
            .synthesize(Path::new("ref.png"), Path::new("in.mp4"), &dir.path().join("out.mp4"))
            .unwrap_err();
        assert!(matches!(err, BlanketError::ExternalService { .. }));
    }

    #[test]
    fn test_image_path_is_unsupported() {
        let anonymizer = FacefusionAnonymizer::with_runner(
            AnonymizerSettings::default(),
            RecordingRunner::new(true, false),
        )
        .unwrap();
        let image = ImagePrimitive::new(Frame::black(2, 2, 3, 0), 0, None);
        let err = anonymizer.anonymize_image(&image, &[]).unwrap_err();
        assert!(matches!(err, BlanketError::Unsupported(_)));
        assert!(!err.is_retryable());
        assert_eq!(anonymizer.requirements(), Requirements::NONE);
    }

    #[test]
    fn test_video_path_uses_configured_source_image() {
        let dir = tempfile::tempdir().unwrap();
        let settings = AnonymizerSettings::default()
            .with_extra("source_image", json!(dir.path().join("face.png")));
        let runner = RecordingRunner::new(true, true);
        let anonymizer = FacefusionAnonymizer::with_runner(settings, runner.clone()).unwrap();

        let mut video = VideoPrimitive::new(dir.path().join("in.mp4"), 0);
        let mut detection = DetectionStage::empty();
        let mut writer = NoopWriter;
        let mut logger = NullPipelineLogger;
        let cancelled = AtomicBool::new(false);
        let mut job = VideoJob {
            detection: &mut detection,
            writer: &mut writer,
            logger: &mut logger,
            cancelled: &cancelled,
            blacken_without_detections: false,
        };

        anonymizer
            .anonymize_video(&mut video, &dir.path().join("out.mp4"), &mut job)
            .unwrap();

        let commands = runner.commands.lock().unwrap();
        let args = args_of(&commands[0]);
        let s = args.iter().position(|a| a == "-s").unwrap();
        assert!(args[s + 1].ends_with("face.png"));
    }

    #[test]
    fn test_video_path_without_source_image_is_configuration_error() {
        let anonymizer = FacefusionAnonymizer::with_runner(
            AnonymizerSettings::default(),
            RecordingRunner::new(true, true),
        )
        .unwrap();
        let mut video = VideoPrimitive::new("in.mp4", 0);
        let mut detection = DetectionStage::empty();
        let mut writer = NoopWriter;
        let mut logger = NullPipelineLogger;
        let cancelled = AtomicBool::new(false);
        let mut job = VideoJob {
            detection: &mut detection,
            writer: &mut writer,
            logger: &mut logger,
            cancelled: &cancelled,
            blacken_without_detections: false,
        };
        let err = anonymizer
            .anonymize_video(&mut video, Path::new("out.mp4"), &mut job)
            .unwrap_err();
        assert!(matches!(err, BlanketError::Configuration(_)));
    }
}
