//! FFmpeg-based transcode engine.

use async_trait::async_trait;
use regex_lite::Regex;
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::config::FfmpegConfig;
use super::error::EngineError;
use super::process::{check_tool, output_size, spawn_error, stderr_tail};
use super::traits::Engine;
use super::types::{MediaInfo, StepJob, StepOutput, StepProgress};
use crate::catalog::{category_of, Category, EngineKind, Format};

/// FFmpeg-based engine for video and audio transitions.
///
/// Besides plain transcodes it covers the cross-category hops the bridge
/// table routes through ffmpeg: a still frame out of a video, the audio
/// track of a video, and a video made from an audio track over a solid
/// color canvas.
pub struct FfmpegEngine {
    config: FfmpegConfig,
}

/// Shape of a transition, derived from the categories on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    /// Same category, re-encode or remux.
    Transcode,
    /// Video to a single image.
    StillFrame,
    /// Video to its audio track.
    ExtractAudio,
    /// Audio to a video with a generated picture.
    AudioToVideo,
}

impl FfmpegEngine {
    /// Creates a new FFmpeg engine with the given configuration.
    pub fn new(config: FfmpegConfig) -> Self {
        Self { config }
    }

    /// Creates an engine with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(FfmpegConfig::default())
    }

    fn transition(source: &Format, target: &Format) -> Result<Transition, EngineError> {
        let unsupported = || EngineError::UnsupportedConversion {
            from: source.clone(),
            to: target.clone(),
        };
        let from = category_of(source).ok_or_else(unsupported)?;
        let to = category_of(target).ok_or_else(unsupported)?;

        match (from, to) {
            (Category::Video, Category::Video) | (Category::Audio, Category::Audio) => {
                Ok(Transition::Transcode)
            }
            (Category::Video, Category::Image) => Ok(Transition::StillFrame),
            (Category::Video, Category::Audio) => Ok(Transition::ExtractAudio),
            (Category::Audio, Category::Video) => Ok(Transition::AudioToVideo),
            _ => Err(unsupported()),
        }
    }

    /// Builds ffmpeg arguments for one step.
    fn build_args(&self, job: &StepJob) -> Result<Vec<String>, EngineError> {
        let transition = Self::transition(&job.source_format, &job.target_format)?;
        let input = job.input_path.to_string_lossy().to_string();

        let mut args = vec!["-y".to_string()];

        // Decoder options go before the video input they apply to
        if let Some(hwaccel) = self.config.hwaccel {
            if category_of(&job.source_format) == Some(Category::Video) {
                args.extend(hwaccel.input_args().iter().map(|a| a.to_string()));
            }
        }

        match transition {
            Transition::AudioToVideo => {
                args.extend([
                    "-f".to_string(),
                    "lavfi".to_string(),
                    "-i".to_string(),
                    format!("color=c=black:s={}:r=25", self.config.canvas_size),
                    "-i".to_string(),
                    input,
                    "-map".to_string(),
                    "0:v".to_string(),
                    "-map".to_string(),
                    "1:a".to_string(),
                    "-shortest".to_string(),
                    "-pix_fmt".to_string(),
                    "yuv420p".to_string(),
                ]);
            }
            Transition::StillFrame => {
                args.extend([
                    "-i".to_string(),
                    input,
                    "-frames:v".to_string(),
                    "1".to_string(),
                ]);
            }
            Transition::ExtractAudio => {
                args.extend(["-i".to_string(), input, "-vn".to_string()]);
            }
            Transition::Transcode => {
                args.extend(["-i".to_string(), input]);
                if category_of(&job.target_format) == Some(Category::Audio) {
                    args.push("-vn".to_string());
                }
            }
        }

        // Log level and progress
        args.extend([
            "-loglevel".to_string(),
            self.config.log_level.clone(),
            "-progress".to_string(),
            "pipe:2".to_string(),
            "-nostats".to_string(),
        ]);

        args.extend(self.config.extra_args.iter().cloned());

        args.push(job.output_path.to_string_lossy().to_string());

        Ok(args)
    }

    /// Probes a media file with ffprobe.
    pub async fn probe(&self, path: &Path) -> Result<MediaInfo, EngineError> {
        if !path.exists() {
            return Err(EngineError::InputNotFound {
                path: path.to_path_buf(),
            });
        }

        let output = Command::new(&self.config.ffprobe_path)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| spawn_error("ffprobe", &self.config.ffprobe_path, e))?;

        if !output.status.success() {
            return Err(EngineError::probe_failed(format!(
                "ffprobe failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Self::parse_probe_output(path, &stdout)
    }

    /// Parses ffprobe JSON output into MediaInfo.
    fn parse_probe_output(path: &Path, output: &str) -> Result<MediaInfo, EngineError> {
        #[derive(Deserialize)]
        struct ProbeOutput {
            format: ProbeFormat,
            #[serde(default)]
            streams: Vec<ProbeStream>,
        }

        #[derive(Deserialize)]
        struct ProbeFormat {
            format_name: String,
            duration: Option<String>,
        }

        #[derive(Deserialize)]
        struct ProbeStream {
            codec_type: String,
        }

        let probe: ProbeOutput = serde_json::from_str(output).map_err(|e| {
            EngineError::probe_failed(format!("Failed to parse ffprobe output: {}", e))
        })?;

        let duration_secs = probe
            .format
            .duration
            .as_ref()
            .and_then(|d| d.parse::<f64>().ok())
            .unwrap_or(0.0);

        let format_name = probe
            .format
            .format_name
            .split(',')
            .next()
            .unwrap_or("unknown");

        Ok(MediaInfo {
            path: path.to_path_buf(),
            format: format_name.to_string(),
            duration_secs,
            has_video: probe.streams.iter().any(|s| s.codec_type == "video"),
            has_audio: probe.streams.iter().any(|s| s.codec_type == "audio"),
        })
    }

    async fn run_ffmpeg(
        &self,
        job: &StepJob,
        progress_tx: &mpsc::Sender<StepProgress>,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        let args = self.build_args(job)?;

        // Duration drives the local fraction; without it progress stays at 0.
        let duration_secs = match self.probe(&job.input_path).await {
            Ok(info) => Some(info.duration_secs).filter(|d| *d > 0.0),
            Err(EngineError::InputNotFound { path }) => {
                return Err(EngineError::InputNotFound { path })
            }
            Err(e) => {
                debug!(job_id = %job.job_id, error = %e, "Probe failed, progress unavailable");
                None
            }
        };

        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        debug!(job_id = %job.job_id, ?args, "Running ffmpeg");

        let mut child = Command::new(&self.config.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error("ffmpeg", &self.config.ffmpeg_path, e))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::conversion_failed("ffmpeg stderr not captured", None))?;
        let mut reader = BufReader::new(stderr).lines();

        let time_regex = Regex::new(r"^out_time_ms=(\d+)").ok();
        let progress_interval = Duration::from_millis(self.config.progress_interval_ms);
        let mut last_progress_send: Option<Instant> = None;
        let mut error_output = String::new();

        let deadline = tokio::time::sleep(Duration::from_secs(self.config.timeout_secs));
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    let _ = child.kill().await;
                    return Err(EngineError::Cancelled);
                }
                _ = &mut deadline => {
                    let _ = child.kill().await;
                    return Err(EngineError::Timeout {
                        timeout_secs: self.config.timeout_secs,
                    });
                }
                line = reader.next_line() => {
                    let line = match line {
                        Ok(Some(line)) => line,
                        Ok(None) => break,
                        Err(e) => return Err(EngineError::Io(e)),
                    };

                    if line.contains("Error") || line.contains("error") {
                        error_output.push_str(&line);
                        error_output.push('\n');
                    }

                    let Some(seconds) = time_regex
                        .as_ref()
                        .and_then(|re| parse_out_time_secs(re, &line))
                    else {
                        continue;
                    };
                    let Some(duration) = duration_secs else {
                        continue;
                    };

                    let due = last_progress_send
                        .map(|t| t.elapsed() >= progress_interval)
                        .unwrap_or(true);
                    if due {
                        let fraction = local_fraction(seconds, duration);
                        // Non-blocking send
                        let _ = progress_tx.try_send(StepProgress::new(&job.job_id, fraction));
                        last_progress_send = Some(Instant::now());
                    }
                }
            }
        }

        let status = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                return Err(EngineError::Cancelled);
            }
            _ = &mut deadline => {
                let _ = child.kill().await;
                return Err(EngineError::Timeout {
                    timeout_secs: self.config.timeout_secs,
                });
            }
            status = child.wait() => status?,
        };

        if !status.success() {
            return Err(EngineError::conversion_failed(
                format!("FFmpeg exited with code: {:?}", status.code()),
                stderr_tail(&error_output),
            ));
        }

        Ok(())
    }
}

/// Extracts the encoded position in seconds from an `out_time_ms=` line.
///
/// Despite its name the field carries microseconds.
pub(crate) fn parse_out_time_secs(re: &Regex, line: &str) -> Option<f64> {
    let caps = re.captures(line.trim())?;
    let micros = caps.get(1)?.as_str().parse::<f64>().ok()?;
    Some(micros / 1_000_000.0)
}

/// Local completion fraction for a position within a known duration.
pub(crate) fn local_fraction(position_secs: f64, duration_secs: f64) -> f32 {
    if duration_secs <= 0.0 {
        return 0.0;
    }
    (position_secs / duration_secs).clamp(0.0, 1.0) as f32
}

#[async_trait]
impl Engine for FfmpegEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Transcode
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn run(
        &self,
        job: StepJob,
        progress_tx: mpsc::Sender<StepProgress>,
        cancel: CancellationToken,
    ) -> Result<StepOutput, EngineError> {
        let start = Instant::now();

        if !job.input_path.exists() {
            return Err(EngineError::InputNotFound {
                path: job.input_path.clone(),
            });
        }

        let _ = progress_tx.try_send(StepProgress::new(&job.job_id, 0.0));

        if let Err(e) = self.run_ffmpeg(&job, &progress_tx, &cancel).await {
            if !e.is_cancelled() {
                warn!(job_id = %job.job_id, error = %e, "FFmpeg step failed");
            }
            return Err(e);
        }

        let output_size_bytes = output_size(&job.output_path).await?;
        let _ = progress_tx.try_send(StepProgress::new(&job.job_id, 1.0));

        Ok(StepOutput {
            job_id: job.job_id,
            output_path: job.output_path,
            output_size_bytes,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn validate(&self) -> Result<(), EngineError> {
        check_tool("ffmpeg", &self.config.ffmpeg_path, "-version").await?;
        check_tool("ffprobe", &self.config.ffprobe_path, "-version").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::HwAccel;
    use std::path::PathBuf;

    fn job(from: &str, to: &str) -> StepJob {
        StepJob {
            job_id: "job-1".to_string(),
            input_path: PathBuf::from(format!("/input.{from}")),
            output_path: PathBuf::from(format!("/output.{to}")),
            source_format: Format::new(from),
            target_format: Format::new(to),
        }
    }

    fn has_pair(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2).any(|w| w[0] == flag && w[1] == value)
    }

    #[test]
    fn test_build_args_transcode_video() {
        let engine = FfmpegEngine::with_defaults();
        let args = engine.build_args(&job("mkv", "mp4")).unwrap();

        assert_eq!(args[0], "-y");
        assert!(has_pair(&args, "-i", "/input.mkv"));
        assert!(has_pair(&args, "-progress", "pipe:2"));
        assert!(has_pair(&args, "-loglevel", "warning"));
        assert!(!args.contains(&"-vn".to_string()));
        assert_eq!(args.last().unwrap(), "/output.mp4");
    }

    #[test]
    fn test_build_args_still_frame() {
        let engine = FfmpegEngine::with_defaults();
        let args = engine.build_args(&job("mp4", "jpg")).unwrap();

        assert!(has_pair(&args, "-frames:v", "1"));
        assert_eq!(args.last().unwrap(), "/output.jpg");
    }

    #[test]
    fn test_build_args_audio_output_drops_video() {
        let engine = FfmpegEngine::with_defaults();

        let extract = engine.build_args(&job("mp4", "wav")).unwrap();
        assert!(extract.contains(&"-vn".to_string()));

        let audio = engine.build_args(&job("flac", "mp3")).unwrap();
        assert!(audio.contains(&"-vn".to_string()));
    }

    #[test]
    fn test_build_args_audio_to_video_uses_canvas() {
        let mut config = FfmpegConfig::default();
        config.canvas_size = "640x360".to_string();
        let engine = FfmpegEngine::new(config);
        let args = engine.build_args(&job("mp3", "mp4")).unwrap();

        assert!(has_pair(&args, "-f", "lavfi"));
        assert!(has_pair(&args, "-i", "color=c=black:s=640x360:r=25"));
        assert!(has_pair(&args, "-i", "/input.mp3"));
        assert!(args.contains(&"-shortest".to_string()));
    }

    #[test]
    fn test_build_args_extra_args_before_output() {
        let mut config = FfmpegConfig::default();
        config.extra_args = vec!["-threads".to_string(), "2".to_string()];
        let engine = FfmpegEngine::new(config);
        let args = engine.build_args(&job("wav", "flac")).unwrap();

        let n = args.len();
        assert_eq!(&args[n - 3..n - 1], &["-threads", "2"]);
    }

    #[test]
    fn test_build_args_hwaccel_on_video_input() {
        let mut config = FfmpegConfig::default();
        config.hwaccel = Some(HwAccel::Amd);
        let engine = FfmpegEngine::new(config);

        let video = engine.build_args(&job("mkv", "mp4")).unwrap();
        let hw = video.iter().position(|a| a == "-hwaccel").unwrap();
        let input = video.iter().position(|a| a == "-i").unwrap();
        assert_eq!(video[hw + 1], "amf");
        assert!(hw < input);

        let audio = engine.build_args(&job("flac", "mp3")).unwrap();
        assert!(!audio.contains(&"-hwaccel".to_string()));
    }

    #[test]
    fn test_build_args_rejects_foreign_categories() {
        let engine = FfmpegEngine::with_defaults();
        for (from, to) in [("png", "jpg"), ("mp3", "jpg"), ("mp4", "pdf"), ("xyz", "mp4")] {
            let err = engine.build_args(&job(from, to)).unwrap_err();
            assert!(
                matches!(err, EngineError::UnsupportedConversion { .. }),
                "{from} -> {to}"
            );
        }
    }

    #[test]
    fn test_parse_out_time() {
        let re = Regex::new(r"^out_time_ms=(\d+)").unwrap();
        assert_eq!(parse_out_time_secs(&re, "out_time_ms=2500000"), Some(2.5));
        assert_eq!(parse_out_time_secs(&re, "out_time_ms=N/A"), None);
        assert_eq!(parse_out_time_secs(&re, "out_time=00:00:02.500000"), None);
        assert_eq!(parse_out_time_secs(&re, "progress=continue"), None);
    }

    #[test]
    fn test_local_fraction() {
        assert_eq!(local_fraction(5.0, 10.0), 0.5);
        assert_eq!(local_fraction(12.0, 10.0), 1.0);
        assert_eq!(local_fraction(3.0, 0.0), 0.0);
    }

    #[test]
    fn test_parse_probe_output() {
        let json = r#"{
            "format": {
                "filename": "test.mkv",
                "format_name": "matroska,webm",
                "duration": "7200.0",
                "size": "5000000000"
            },
            "streams": [
                { "codec_type": "video", "codec_name": "h264" },
                { "codec_type": "audio", "codec_name": "aac" }
            ]
        }"#;

        let info = FfmpegEngine::parse_probe_output(Path::new("test.mkv"), json).unwrap();
        assert_eq!(info.format, "matroska");
        assert!((info.duration_secs - 7200.0).abs() < 0.01);
        assert!(info.has_video);
        assert!(info.has_audio);
    }

    #[test]
    fn test_parse_probe_output_audio_only() {
        let json = r#"{
            "format": { "format_name": "flac" },
            "streams": [{ "codec_type": "audio" }]
        }"#;

        let info = FfmpegEngine::parse_probe_output(Path::new("a.flac"), json).unwrap();
        assert_eq!(info.duration_secs, 0.0);
        assert!(!info.has_video);
        assert!(info.has_audio);
    }

    #[test]
    fn test_parse_probe_output_invalid() {
        let err = FfmpegEngine::parse_probe_output(Path::new("x"), "not json").unwrap_err();
        assert!(matches!(err, EngineError::ProbeFailed { .. }));
    }

    #[tokio::test]
    async fn test_run_missing_input() {
        let engine = FfmpegEngine::with_defaults();
        let (tx, _rx) = mpsc::channel(4);
        let mut job = job("mp4", "mkv");
        job.input_path = PathBuf::from("/nonexistent/input.mp4");

        let err = engine
            .run(job, tx, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InputNotFound { .. }));
    }
}
