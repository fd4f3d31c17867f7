//! # Target Format Policy
//!
//! Decides which container/codec each segment is re-encoded into before it is
//! sent to the transcription provider.
//!
//! ## Resolution Rules:
//! - The upload's filename extension is matched (case-insensitively) against
//!   the formats the provider accepts
//! - A recognized extension is kept, avoiding a needless codec change
//! - An unrecognized or missing extension follows the deployment's
//!   [`FormatPolicy`]: fall back to one fixed format, or reject the upload

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Formats the transcription providers accept, and therefore the only ones
/// segments are encoded into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    Mp3,
    Mp4,
    Mpeg,
    Mpga,
    M4a,
    Wav,
    Webm,
}

/// Bitrate used whenever segments are encoded to MP3.
pub const MP3_BITRATE: &str = "128k";

impl TargetFormat {
    pub const ALL: [TargetFormat; 7] = [
        TargetFormat::Mp3,
        TargetFormat::Mp4,
        TargetFormat::Mpeg,
        TargetFormat::Mpga,
        TargetFormat::M4a,
        TargetFormat::Wav,
        TargetFormat::Webm,
    ];

    /// Match a bare extension (no leading dot) against the whitelist.
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        Self::ALL.into_iter().find(|f| f.extension() == ext)
    }

    /// File extension used when naming encoded chunks.
    pub fn extension(&self) -> &'static str {
        match self {
            TargetFormat::Mp3 => "mp3",
            TargetFormat::Mp4 => "mp4",
            TargetFormat::Mpeg => "mpeg",
            TargetFormat::Mpga => "mpga",
            TargetFormat::M4a => "m4a",
            TargetFormat::Wav => "wav",
            TargetFormat::Webm => "webm",
        }
    }

    /// MIME type declared to the provider for chunks in this format.
    pub fn media_type(&self) -> &'static str {
        match self {
            TargetFormat::Mp3 | TargetFormat::Mpeg | TargetFormat::Mpga => "audio/mpeg",
            TargetFormat::Mp4 | TargetFormat::M4a => "audio/mp4",
            TargetFormat::Wav => "audio/wav",
            TargetFormat::Webm => "audio/webm",
        }
    }

    /// ffmpeg muxer name (`-f`) for this format.
    ///
    /// `mpeg`/`mpga` are MPEG audio streams, so they share the mp3 muxer;
    /// `m4a` is written by the `ipod` muxer.
    pub fn muxer(&self) -> &'static str {
        match self {
            TargetFormat::Mp3 | TargetFormat::Mpeg | TargetFormat::Mpga => "mp3",
            TargetFormat::Mp4 => "mp4",
            TargetFormat::M4a => "ipod",
            TargetFormat::Wav => "wav",
            TargetFormat::Webm => "webm",
        }
    }

    /// Extra encoder arguments. Only MP3 pins a bitrate; everything else uses
    /// the container's default codec settings.
    pub fn codec_args(&self) -> Vec<&'static str> {
        match self {
            TargetFormat::Mp3 => vec!["-codec:a", "libmp3lame", "-b:a", MP3_BITRATE],
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for TargetFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s).ok_or_else(|| {
            format!(
                "'{}' is not a supported format (expected one of: {})",
                s,
                Self::ALL.map(|f| f.extension()).join(", ")
            )
        })
    }
}

/// What to do with uploads whose extension is not whitelisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatPolicy {
    /// Re-encode every segment into this format.
    Fallback(TargetFormat),
    /// Refuse the upload before any decoding happens.
    Reject,
}

impl Default for FormatPolicy {
    fn default() -> Self {
        FormatPolicy::Fallback(TargetFormat::Mp3)
    }
}

impl FormatPolicy {
    /// Resolve the target format for an upload.
    ///
    /// ## Returns:
    /// - **Ok(format)**: whitelisted extension, or the fallback format
    /// - **Err(extension)**: the offending extension (empty when the filename
    ///   has none) under [`FormatPolicy::Reject`]
    pub fn resolve(&self, filename: &str) -> Result<TargetFormat, String> {
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        if let Some(format) = TargetFormat::from_extension(&ext) {
            return Ok(format);
        }

        match self {
            FormatPolicy::Fallback(format) => Ok(*format),
            FormatPolicy::Reject => Err(ext),
        }
    }
}
