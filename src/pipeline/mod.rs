//! # Pipeline Module
//!
//! Turns one uploaded audio file into one transcript by cutting it into
//! fixed windows and transcribing the windows concurrently.
//!
//! ## Components:
//! - **segmenter**: pure window arithmetic over a duration
//! - **format**: target container whitelist and unknown-extension policy
//! - **scratch**: tracked temporary files, deleted on drop
//! - **media**: decoder/encoder traits and the data they exchange
//! - **ffmpeg**: `ffprobe`/`ffmpeg` backed implementation of the media traits
//! - **orchestrator**: the run itself (bounded fan-out, fail-fast, ordered join)
//! - **error**: run failures tagged with stage and segment

pub mod error;
pub mod ffmpeg;
pub mod format;
pub mod media;
pub mod orchestrator;
pub mod scratch;
pub mod segmenter;

pub use error::PipelineError;
pub use ffmpeg::{FfmpegToolkit, MediaToolchain};
pub use format::{FormatPolicy, TargetFormat};
pub use media::EncodedChunk;
pub use orchestrator::{Pipeline, PipelineSettings};
pub use scratch::ScratchSpace;
