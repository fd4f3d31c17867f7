//! # Media Toolkit Boundary
//!
//! Traits for the two places the pipeline touches the media toolkit: turning
//! an upload into a sliceable timeline, and rendering one window of that
//! timeline into a transportable buffer.
//!
//! ## Implementations:
//! - **FfmpegToolkit** (`pipeline::ffmpeg`): production, shells out to
//!   `ffprobe`/`ffmpeg`
//! - Test doubles in the orchestrator tests

use crate::pipeline::format::TargetFormat;
use crate::pipeline::scratch::ScratchFile;
use crate::pipeline::segmenter::Segment;
use async_trait::async_trait;
use std::path::Path;

/// Failures reported by the media toolkit.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("scratch file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{tool} exited with {status}: {stderr}")]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("could not read media: {0}")]
    Unreadable(String),

    #[error("timeline has no materialized source to slice")]
    MissingSource,
}

/// Decoded view of one upload.
///
/// Owned by a single run and shared read-only between that run's units.
/// The scratch copy of the upload, when there is one, lives exactly as long
/// as the timeline.
#[derive(Debug)]
pub struct AudioTimeline {
    duration_ms: u64,
    source: Option<ScratchFile>,
}

impl AudioTimeline {
    pub fn new(duration_ms: u64) -> Self {
        Self {
            duration_ms,
            source: None,
        }
    }

    /// Attach the on-disk copy the toolkit slices segments from.
    pub fn with_source(mut self, source: ScratchFile) -> Self {
        self.source = Some(source);
        self
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source.as_ref().map(|s| s.path())
    }
}

/// One segment rendered into the target container/codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedChunk {
    pub index: usize,
    pub format: TargetFormat,
    pub bytes: Vec<u8>,
}

impl EncodedChunk {
    /// Name the chunk is uploaded under, e.g. `chunk_003.mp3`.
    pub fn file_name(&self) -> String {
        format!("chunk_{:03}.{}", self.index, self.format.extension())
    }

    pub fn media_type(&self) -> &'static str {
        self.format.media_type()
    }
}

/// Decodes an uploaded byte buffer into an [`AudioTimeline`].
#[async_trait]
pub trait MediaDecoder: Send + Sync {
    async fn decode(
        &self,
        bytes: &[u8],
        format_hint: Option<&str>,
    ) -> Result<AudioTimeline, MediaError>;
}

/// Renders one segment of a timeline into an [`EncodedChunk`].
///
/// Implementations must not share mutable state between calls: the
/// orchestrator encodes several segments of the same timeline at once.
#[async_trait]
pub trait SegmentEncoder: Send + Sync {
    async fn encode(
        &self,
        timeline: &AudioTimeline,
        segment: &Segment,
        format: TargetFormat,
    ) -> Result<EncodedChunk, MediaError>;
}
