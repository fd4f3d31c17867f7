//! # FFmpeg Toolkit
//!
//! Production [`MediaDecoder`] and [`SegmentEncoder`] backed by the `ffprobe`
//! and `ffmpeg` binaries.
//!
//! ## How a run uses it:
//! 1. **Decode**: the upload is copied to a scratch file and `ffprobe` reports
//!    its duration and whether it carries an audio stream
//! 2. **Encode**: each segment spawns its own `ffmpeg` process that seeks into
//!    the scratch copy and writes the window to a per-segment scratch file
//!
//! Encoder output goes to a seekable file rather than a pipe because the MP4
//! family of muxers cannot finalize a non-seekable stream.
//!
//! ## Binary Resolution:
//! Paths are resolved once at startup into an immutable [`MediaToolchain`]
//! and injected here; nothing reads or mutates process-wide state afterwards.

use crate::config::MediaConfig;
use crate::pipeline::format::TargetFormat;
use crate::pipeline::media::{AudioTimeline, EncodedChunk, MediaDecoder, MediaError, SegmentEncoder};
use crate::pipeline::scratch::ScratchSpace;
use crate::pipeline::segmenter::Segment;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;

/// Longest stderr excerpt carried inside a [`MediaError::ToolFailed`].
const MAX_STDERR_CHARS: usize = 500;

/// Locations of the media binaries, fixed for the life of the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaToolchain {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl MediaToolchain {
    /// Resolve binary paths for the host OS.
    pub fn resolve(config: &MediaConfig) -> Self {
        Self::resolve_for_os(config, std::env::consts::OS)
    }

    /// Resolve binary paths as if running on `os`.
    ///
    /// ## Priority (per binary):
    /// 1. Explicit path from configuration
    /// 2. The bundled copy in `bin_dir`, except on macOS where the
    ///    system-installed toolkit is preferred
    /// 3. The bare binary name, looked up on `PATH`
    pub fn resolve_for_os(config: &MediaConfig, os: &str) -> Self {
        let pick = |explicit: &Option<String>, name: &str| -> PathBuf {
            if let Some(path) = explicit.as_deref().filter(|p| !p.is_empty()) {
                return PathBuf::from(path);
            }
            if os != "macos" {
                let bundled = Path::new(&config.bin_dir).join(name);
                if bundled.is_file() {
                    return bundled;
                }
            }
            PathBuf::from(name)
        };

        Self {
            ffmpeg: pick(&config.ffmpeg_path, "ffmpeg"),
            ffprobe: pick(&config.ffprobe_path, "ffprobe"),
        }
    }

    /// Run `-version` on both binaries so a missing toolkit shows up at
    /// startup instead of on the first upload.
    pub async fn probe_versions(&self) -> Result<(), MediaError> {
        for binary in [&self.ffmpeg, &self.ffprobe] {
            let output = Command::new(binary).arg("-version").output().await?;
            check_status(binary, &output)?;
        }
        Ok(())
    }
}

/// `ffprobe`/`ffmpeg` implementation of both media traits.
#[derive(Debug, Clone)]
pub struct FfmpegToolkit {
    toolchain: MediaToolchain,
    scratch: ScratchSpace,
}

impl FfmpegToolkit {
    pub fn new(toolchain: MediaToolchain, scratch: ScratchSpace) -> Self {
        Self { toolchain, scratch }
    }
}

#[async_trait]
impl MediaDecoder for FfmpegToolkit {
    async fn decode(
        &self,
        bytes: &[u8],
        format_hint: Option<&str>,
    ) -> Result<AudioTimeline, MediaError> {
        let suffix = format_hint.map(|ext| format!(".{}", ext)).unwrap_or_default();
        let source = self.scratch.write("upload-", &suffix, bytes)?;

        let output = Command::new(&self.toolchain.ffprobe)
            .args(["-v", "error", "-show_entries", "format=duration:stream=codec_type", "-of", "json"])
            .arg(source.path())
            .kill_on_drop(true)
            .output()
            .await?;
        check_status(&self.toolchain.ffprobe, &output)?;

        let duration_ms = parse_probe_output(&output.stdout)?;
        tracing::debug!(
            duration_ms,
            bytes = bytes.len(),
            format_hint = format_hint.unwrap_or("none"),
            "Probed uploaded audio"
        );

        Ok(AudioTimeline::new(duration_ms).with_source(source))
    }
}

#[async_trait]
impl SegmentEncoder for FfmpegToolkit {
    async fn encode(
        &self,
        timeline: &AudioTimeline,
        segment: &Segment,
        format: TargetFormat,
    ) -> Result<EncodedChunk, MediaError> {
        let input = timeline.source_path().ok_or(MediaError::MissingSource)?;
        let output_file = self.scratch.create(
            &format!("chunk-{:03}-", segment.index),
            &format!(".{}", format.extension()),
        )?;

        let output = Command::new(&self.toolchain.ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-y"])
            .arg("-ss")
            .arg(format_seconds(segment.start_ms))
            .arg("-t")
            .arg(format_seconds(segment.duration_ms()))
            .arg("-i")
            .arg(input)
            .arg("-vn")
            .args(format.codec_args())
            .args(["-f", format.muxer()])
            .arg(output_file.path())
            .kill_on_drop(true)
            .output()
            .await?;
        check_status(&self.toolchain.ffmpeg, &output)?;

        let bytes = tokio::fs::read(output_file.path()).await?;
        if bytes.is_empty() {
            return Err(MediaError::Unreadable(format!(
                "encoder produced no output for segment {}",
                segment.index
            )));
        }

        Ok(EncodedChunk {
            index: segment.index,
            format,
            bytes,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Extract the audio duration (ms) from `ffprobe -of json` output.
fn parse_probe_output(stdout: &[u8]) -> Result<u64, MediaError> {
    let probe: ProbeOutput = serde_json::from_slice(stdout)
        .map_err(|e| MediaError::Unreadable(format!("unparseable probe output: {}", e)))?;

    if !probe
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"))
    {
        return Err(MediaError::Unreadable("no audio stream found".to_string()));
    }

    let raw = probe
        .format
        .and_then(|f| f.duration)
        .ok_or_else(|| MediaError::Unreadable("container reports no duration".to_string()))?;

    let seconds: f64 = raw
        .trim()
        .parse()
        .map_err(|_| MediaError::Unreadable(format!("invalid duration '{}'", raw)))?;
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(MediaError::Unreadable(format!("invalid duration '{}'", raw)));
    }

    Ok((seconds * 1000.0).round() as u64)
}

/// Milliseconds as an ffmpeg time argument, e.g. `600.000`.
fn format_seconds(ms: u64) -> String {
    format!("{}.{:03}", ms / 1000, ms % 1000)
}

fn check_status(binary: &Path, output: &Output) -> Result<(), MediaError> {
    if output.status.success() {
        return Ok(());
    }

    let stderr: String = String::from_utf8_lossy(&output.stderr)
        .trim()
        .chars()
        .take(MAX_STDERR_CHARS)
        .collect();

    Err(MediaError::ToolFailed {
        tool: binary.display().to_string(),
        status: output.status.to_string(),
        stderr,
    })
}
