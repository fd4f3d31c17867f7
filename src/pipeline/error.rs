use crate::pipeline::media::MediaError;
use crate::transcription::ProviderError;
use serde::Serialize;
use std::fmt;

/// Where in a run a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Input,
    Format,
    Decode,
    Encode,
    Transcribe,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Input => "input",
            Stage::Format => "format",
            Stage::Decode => "decode",
            Stage::Encode => "encode",
            Stage::Transcribe => "transcribe",
        };
        f.write_str(name)
    }
}

/// Terminal failure of a pipeline run.
///
/// Every variant knows its [`Stage`]; unit failures also carry the index of
/// the segment that failed.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("uploaded file is empty")]
    EmptyInput,

    #[error("unsupported audio format '{extension}'")]
    UnsupportedFormat { extension: String },

    #[error("could not decode audio: {0}")]
    Decode(#[source] MediaError),

    #[error("could not encode segment {segment_index}: {source}")]
    Encode {
        segment_index: usize,
        #[source]
        source: MediaError,
    },

    #[error("transcription of segment {segment_index} failed: {source}")]
    Provider {
        segment_index: usize,
        #[source]
        source: ProviderError,
    },
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::EmptyInput => Stage::Input,
            PipelineError::UnsupportedFormat { .. } => Stage::Format,
            PipelineError::Decode(_) => Stage::Decode,
            PipelineError::Encode { .. } => Stage::Encode,
            PipelineError::Provider { .. } => Stage::Transcribe,
        }
    }

    pub fn segment_index(&self) -> Option<usize> {
        match self {
            PipelineError::Encode { segment_index, .. }
            | PipelineError::Provider { segment_index, .. } => Some(*segment_index),
            _ => None,
        }
    }

    /// True when the upload is rejected before any media work (4xx). Decode,
    /// encode and provider failures are server-side (5xx).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PipelineError::EmptyInput | PipelineError::UnsupportedFormat { .. }
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            PipelineError::Provider {
                source: ProviderError::Timeout(_),
                ..
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_stage_and_index() {
        let err = PipelineError::Provider {
            segment_index: 4,
            source: ProviderError::Request("connection reset".to_string()),
        };
        assert_eq!(err.stage(), Stage::Transcribe);
        assert_eq!(err.segment_index(), Some(4));
        assert!(!err.is_client_error());
        assert!(err.to_string().contains("segment 4"));

        assert_eq!(PipelineError::EmptyInput.stage(), Stage::Input);
        assert_eq!(PipelineError::EmptyInput.segment_index(), None);
    }

    #[test]
    fn test_client_error_classification() {
        assert!(PipelineError::EmptyInput.is_client_error());
        assert!(PipelineError::UnsupportedFormat { extension: "ogg".into() }.is_client_error());
        assert!(!PipelineError::Decode(MediaError::Unreadable("junk".into())).is_client_error());
        assert!(!PipelineError::Encode {
            segment_index: 0,
            source: MediaError::MissingSource,
        }
        .is_client_error());
    }

    #[test]
    fn test_timeout_detection() {
        let err = PipelineError::Provider {
            segment_index: 0,
            source: ProviderError::Timeout(Duration::from_secs(1)),
        };
        assert!(err.is_timeout());
        assert!(!PipelineError::EmptyInput.is_timeout());
    }
}
