//! # Pipeline Orchestrator
//!
//! Drives one upload through decode → segment → encode → transcribe → join.
//!
//! ## Run Lifecycle:
//! 1. **Created**: input validated, target format resolved
//! 2. **Decoding**: media toolkit builds the timeline
//! 3. **Segmenting**: windows computed
//! 4. **Dispatching**: one unit (encode then transcribe) per window, at most
//!    `concurrency_cap` in flight
//! 5. **Joining**: texts concatenated in window order
//! 6. **Done** or **Failed**: both terminal, nothing is retried
//!
//! ## Failure Policy:
//! The first unit failure ends the run. The remaining units are cancelled by
//! dropping their futures, which also drops (and so deletes) whatever scratch
//! files they held. A partial transcript is never returned.

use crate::pipeline::error::PipelineError;
use crate::pipeline::format::{FormatPolicy, TargetFormat};
use crate::pipeline::media::{AudioTimeline, EncodedChunk, MediaDecoder, SegmentEncoder};
use crate::pipeline::segmenter::{self, Segment, DEFAULT_WINDOW_MS};
use crate::transcription::{ProviderError, TranscriptionClient};
use futures_util::stream::{self, StreamExt, TryStreamExt};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Tunables consumed by the orchestrator.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Nominal window length in milliseconds.
    pub window_ms: u64,
    /// Maximum units in flight per run.
    pub concurrency_cap: usize,
    /// Upper bound on a single transcription call.
    pub unit_timeout: Duration,
    pub format_policy: FormatPolicy,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            window_ms: DEFAULT_WINDOW_MS,
            concurrency_cap: 3,
            unit_timeout: Duration::from_secs(300),
            format_policy: FormatPolicy::default(),
        }
    }
}

/// States a run moves through; see the module docs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Created,
    Decoding,
    Segmenting,
    Dispatching,
    Joining,
    Done,
    Failed,
}

/// Per-run bookkeeping: id, current state, and elapsed time for logs.
struct RunTracker {
    id: Uuid,
    kind: &'static str,
    state: RunState,
    started: Instant,
}

impl RunTracker {
    fn new(kind: &'static str) -> Self {
        let tracker = Self {
            id: Uuid::new_v4(),
            kind,
            state: RunState::Created,
            started: Instant::now(),
        };
        tracing::debug!(run_id = %tracker.id, kind, "Run created");
        tracker
    }

    fn advance(&mut self, next: RunState) {
        tracing::debug!(
            run_id = %self.id,
            kind = self.kind,
            from = ?self.state,
            to = ?next,
            "Run state transition"
        );
        self.state = next;
    }

    fn finish<T>(&mut self, result: &Result<T, PipelineError>) {
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        match result {
            Ok(_) => {
                self.advance(RunState::Done);
                tracing::info!(run_id = %self.id, kind = self.kind, elapsed_ms, "Run completed");
            }
            Err(e) => {
                self.advance(RunState::Failed);
                tracing::warn!(
                    run_id = %self.id,
                    kind = self.kind,
                    elapsed_ms,
                    stage = %e.stage(),
                    segment_index = ?e.segment_index(),
                    error = %e,
                    "Run failed"
                );
            }
        }
    }
}

/// Everything a run needs once the upload has been decoded.
struct PreparedRun {
    timeline: AudioTimeline,
    format: TargetFormat,
    segments: Vec<Segment>,
}

/// The chunked transcription pipeline, parameterized by its collaborators.
pub struct Pipeline {
    decoder: Arc<dyn MediaDecoder>,
    encoder: Arc<dyn SegmentEncoder>,
    client: Arc<dyn TranscriptionClient>,
    settings: PipelineSettings,
    /// Segments transcribed successfully, across all runs.
    segments_transcribed: AtomicU64,
}

impl Pipeline {
    pub fn new(
        decoder: Arc<dyn MediaDecoder>,
        encoder: Arc<dyn SegmentEncoder>,
        client: Arc<dyn TranscriptionClient>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            decoder,
            encoder,
            client,
            settings,
            segments_transcribed: AtomicU64::new(0),
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn provider_name(&self) -> &str {
        self.client.name()
    }

    pub fn segments_transcribed(&self) -> u64 {
        self.segments_transcribed.load(Ordering::Relaxed)
    }

    /// Transcribe an upload end to end.
    ///
    /// ## Returns:
    /// - **Ok(text)**: per-segment texts in window order, single-space joined
    ///   and trimmed; `""` when the audio has zero length
    /// - **Err(PipelineError)**: the first failure observed
    pub async fn run(&self, bytes: &[u8], filename: &str) -> Result<String, PipelineError> {
        let mut tracker = RunTracker::new("transcribe");
        let result = self.run_inner(bytes, filename, &mut tracker).await;
        tracker.finish(&result);
        result
    }

    /// Decode, segment and encode an upload without transcribing it.
    ///
    /// Chunks come back in window order. Encoding runs under the same
    /// concurrency cap as [`Pipeline::run`].
    pub async fn split(
        &self,
        bytes: &[u8],
        filename: &str,
    ) -> Result<Vec<EncodedChunk>, PipelineError> {
        let mut tracker = RunTracker::new("split");
        let result = self.split_inner(bytes, filename, &mut tracker).await;
        tracker.finish(&result);
        result
    }

    async fn run_inner(
        &self,
        bytes: &[u8],
        filename: &str,
        tracker: &mut RunTracker,
    ) -> Result<String, PipelineError> {
        let prepared = self.prepare(bytes, filename, tracker).await?;
        if prepared.segments.is_empty() {
            return Ok(String::new());
        }

        tracker.advance(RunState::Dispatching);
        tracing::info!(
            run_id = %tracker.id,
            segments = prepared.segments.len(),
            format = %prepared.format,
            provider = self.client.name(),
            "Dispatching transcription units"
        );

        let timeline = &prepared.timeline;
        let format = prepared.format;
        let mut slots: Vec<Option<String>> = vec![None; prepared.segments.len()];

        let mut units = stream::iter(&prepared.segments)
            .map(|segment| self.transcribe_unit(timeline, segment, format))
            .buffer_unordered(self.settings.concurrency_cap);

        while let Some(outcome) = units.next().await {
            // An early return drops `units`, cancelling everything still in flight.
            let (index, text) = outcome?;
            slots[index] = Some(text);
        }

        tracker.advance(RunState::Joining);
        Ok(join_transcripts(slots))
    }

    async fn split_inner(
        &self,
        bytes: &[u8],
        filename: &str,
        tracker: &mut RunTracker,
    ) -> Result<Vec<EncodedChunk>, PipelineError> {
        let prepared = self.prepare(bytes, filename, tracker).await?;
        tracker.advance(RunState::Dispatching);

        let timeline = &prepared.timeline;
        let format = prepared.format;
        let chunks: Vec<EncodedChunk> = stream::iter(&prepared.segments)
            .map(|segment| self.encode_unit(timeline, segment, format))
            .buffered(self.settings.concurrency_cap)
            .try_collect()
            .await?;

        tracker.advance(RunState::Joining);
        Ok(chunks)
    }

    /// Validate, resolve the format, decode and segment.
    async fn prepare(
        &self,
        bytes: &[u8],
        filename: &str,
        tracker: &mut RunTracker,
    ) -> Result<PreparedRun, PipelineError> {
        if bytes.is_empty() {
            return Err(PipelineError::EmptyInput);
        }

        let format = self
            .settings
            .format_policy
            .resolve(filename)
            .map_err(|extension| PipelineError::UnsupportedFormat { extension })?;

        tracker.advance(RunState::Decoding);
        let hint = format_hint(filename);
        let timeline = self
            .decoder
            .decode(bytes, hint.as_deref())
            .await
            .map_err(PipelineError::Decode)?;

        tracker.advance(RunState::Segmenting);
        let segments = segmenter::segment(timeline.duration_ms(), self.settings.window_ms);
        tracing::debug!(
            run_id = %tracker.id,
            duration_ms = timeline.duration_ms(),
            window_ms = self.settings.window_ms,
            segments = segments.len(),
            "Timeline segmented"
        );

        Ok(PreparedRun {
            timeline,
            format,
            segments,
        })
    }

    async fn encode_unit(
        &self,
        timeline: &AudioTimeline,
        segment: &Segment,
        format: TargetFormat,
    ) -> Result<EncodedChunk, PipelineError> {
        self.encoder
            .encode(timeline, segment, format)
            .await
            .map_err(|source| PipelineError::Encode {
                segment_index: segment.index,
                source,
            })
    }

    /// One unit of work. The encoded chunk is dropped when this returns,
    /// whatever the outcome.
    async fn transcribe_unit(
        &self,
        timeline: &AudioTimeline,
        segment: &Segment,
        format: TargetFormat,
    ) -> Result<(usize, String), PipelineError> {
        let chunk = self.encode_unit(timeline, segment, format).await?;

        let started = Instant::now();
        let timeout = self.settings.unit_timeout;
        let text = match tokio::time::timeout(timeout, self.client.transcribe(&chunk)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(timeout)),
        }
        .map_err(|source| PipelineError::Provider {
            segment_index: segment.index,
            source,
        })?;
        self.segments_transcribed.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            segment_index = segment.index,
            start_ms = segment.start_ms,
            end_ms = segment.end_ms,
            chunk_bytes = chunk.bytes.len(),
            chars = text.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Segment transcribed"
        );

        Ok((segment.index, text))
    }
}

/// Concatenate per-segment texts in index order.
fn join_transcripts(slots: Vec<Option<String>>) -> String {
    debug_assert!(slots.iter().all(Option::is_some), "every slot is filled before joining");
    slots
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

/// Lower-cased extension of the declared filename, passed to the decoder as
/// a probing hint. Anything but plain alphanumerics is dropped.
fn format_hint(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| e.to_ascii_lowercase())
}
