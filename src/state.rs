//! # Application State
//!
//! Shared state handed to every request handler through `web::Data`.
//!
//! ## What lives here:
//! - **config**: the validated configuration, immutable after startup
//! - **pipeline**: the one orchestrator every request runs through
//! - **toolchain**: resolved `ffmpeg`/`ffprobe` paths, reported by health checks
//! - **scratch**: the toolkit's scratch space, so live temp files can be reported
//! - **metrics**: request and run counters behind an `RwLock`
//!
//! Cloning `AppState` only clones `Arc`s, so each actix worker gets a cheap
//! handle onto the same data.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use crate::config::AppConfig;
use crate::pipeline::{MediaToolchain, Pipeline, PipelineError, ScratchSpace};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub pipeline: Arc<Pipeline>,
    pub toolchain: MediaToolchain,
    pub scratch: ScratchSpace,
    pub metrics: Arc<RwLock<AppMetrics>>,
    pub start_time: Instant,
}

/// Counters collected while the server runs.
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    pub request_count: u64,
    pub error_count: u64,
    /// Pipeline runs currently in progress.
    pub active_runs: u32,
    pub runs: RunMetrics,
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Pipeline run outcomes, split and transcribe runs together.
#[derive(Debug, Default, Clone)]
pub struct RunMetrics {
    pub started: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Failures broken down by stage ("decode", "transcribe", ...).
    pub failed_by_stage: HashMap<String, u64>,
}

#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        pipeline: Pipeline,
        toolchain: MediaToolchain,
        scratch: ScratchSpace,
    ) -> Self {
        Self {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
            toolchain,
            scratch,
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
        }
    }

    // Counters stay meaningful after a panicking writer, so poisoning is ignored.
    fn metrics_read(&self) -> RwLockReadGuard<'_, AppMetrics> {
        self.metrics.read().unwrap_or_else(|e| e.into_inner())
    }

    fn metrics_write(&self) -> RwLockWriteGuard<'_, AppMetrics> {
        self.metrics.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn increment_request_count(&self) {
        self.metrics_write().request_count += 1;
    }

    pub fn increment_error_count(&self) {
        self.metrics_write().error_count += 1;
    }

    /// Record one request against its endpoint.
    ///
    /// ## Parameters:
    /// - `endpoint`: "METHOD /path" key
    /// - `duration_ms`: time spent producing the response
    /// - `is_error`: whether the response status was 4xx/5xx
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics_write();
        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();

        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;
        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Mark a pipeline run as started. The returned guard must be finished
    /// with the run's outcome; dropping it unfinished counts as a failure.
    pub fn begin_run(&self) -> RunGuard<'_> {
        let mut metrics = self.metrics_write();
        metrics.active_runs += 1;
        metrics.runs.started += 1;
        RunGuard {
            state: self,
            finished: false,
        }
    }

    fn end_run(&self, failed_stage: Option<String>) {
        let mut metrics = self.metrics_write();
        metrics.active_runs = metrics.active_runs.saturating_sub(1);
        match failed_stage {
            None => metrics.runs.succeeded += 1,
            Some(stage) => {
                metrics.runs.failed += 1;
                *metrics.runs.failed_by_stage.entry(stage).or_default() += 1;
            }
        }
    }

    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.metrics_read().clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

/// Tracks one pipeline run in [`AppMetrics`].
///
/// A handler future dropped mid-run (client disconnect) still releases its
/// `active_runs` slot through `Drop`.
pub struct RunGuard<'a> {
    state: &'a AppState,
    finished: bool,
}

impl RunGuard<'_> {
    pub fn finish<T>(mut self, result: &Result<T, PipelineError>) {
        self.finished = true;
        let failed_stage = result.as_ref().err().map(|e| e.stage().to_string());
        self.state.end_run(failed_stage);
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.state.end_run(Some("cancelled".to_string()));
        }
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::pipeline::media::{AudioTimeline, EncodedChunk, MediaDecoder, MediaError, SegmentEncoder};
    use crate::pipeline::segmenter::Segment;
    use crate::pipeline::{PipelineSettings, TargetFormat};
    use crate::transcription::{ProviderError, TranscriptionClient};
    use async_trait::async_trait;

    /// Media double: every upload decodes to `duration_ms`, unless its bytes
    /// start with `b"junk"`. Chunks carry their index as text.
    pub struct StubMedia {
        pub duration_ms: u64,
    }

    #[async_trait]
    impl MediaDecoder for StubMedia {
        async fn decode(
            &self,
            bytes: &[u8],
            _format_hint: Option<&str>,
        ) -> Result<AudioTimeline, MediaError> {
            if bytes.starts_with(b"junk") {
                return Err(MediaError::Unreadable("no audio stream".to_string()));
            }
            Ok(AudioTimeline::new(self.duration_ms))
        }
    }

    #[async_trait]
    impl SegmentEncoder for StubMedia {
        async fn encode(
            &self,
            _timeline: &AudioTimeline,
            segment: &Segment,
            format: TargetFormat,
        ) -> Result<EncodedChunk, MediaError> {
            Ok(EncodedChunk {
                index: segment.index,
                format,
                bytes: format!("segment-{}", segment.index).into_bytes(),
            })
        }
    }

    /// Provider double: `chunk{i}` for every chunk, or a 500 at `fail_at`.
    pub struct StubClient {
        pub fail_at: Option<usize>,
    }

    #[async_trait]
    impl TranscriptionClient for StubClient {
        fn name(&self) -> &str {
            "stub"
        }

        async fn transcribe(&self, chunk: &EncodedChunk) -> Result<String, ProviderError> {
            if self.fail_at == Some(chunk.index) {
                return Err(ProviderError::Status {
                    status: 500,
                    body: "upstream down".to_string(),
                });
            }
            Ok(format!("chunk{}", chunk.index))
        }
    }

    /// State wired to the stubs above.
    pub fn stub_state(duration_ms: u64, window_ms: u64, fail_at: Option<usize>) -> AppState {
        let config = AppConfig::default();
        let media = Arc::new(StubMedia { duration_ms });
        let settings = PipelineSettings {
            window_ms,
            ..PipelineSettings::default()
        };
        let pipeline = Pipeline::new(media.clone(), media, Arc::new(StubClient { fail_at }), settings);
        let toolchain = MediaToolchain::resolve(&config.media);
        AppState::new(config, pipeline, toolchain, ScratchSpace::new())
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::stub_state;
    use super::*;

    #[test]
    fn test_endpoint_metrics() {
        let state = stub_state(0, 1_000, None);
        state.record_endpoint_request("POST /api/v1/transcribe", 30, false);
        state.record_endpoint_request("POST /api/v1/transcribe", 10, true);

        let snapshot = state.get_metrics_snapshot();
        let metric = &snapshot.endpoint_metrics["POST /api/v1/transcribe"];
        assert_eq!(metric.request_count, 2);
        assert_eq!(metric.average_duration_ms(), 20.0);
        assert_eq!(metric.error_rate(), 0.5);
    }

    #[test]
    fn test_run_guard_records_outcomes() {
        let state = stub_state(0, 1_000, None);

        let guard = state.begin_run();
        assert_eq!(state.get_metrics_snapshot().active_runs, 1);
        guard.finish(&Ok::<_, PipelineError>(()));

        let guard = state.begin_run();
        guard.finish(&Err::<(), _>(PipelineError::EmptyInput));

        drop(state.begin_run());

        let snapshot = state.get_metrics_snapshot();
        assert_eq!(snapshot.active_runs, 0);
        assert_eq!(snapshot.runs.started, 3);
        assert_eq!(snapshot.runs.succeeded, 1);
        assert_eq!(snapshot.runs.failed, 2);
        assert_eq!(snapshot.runs.failed_by_stage["input"], 1);
        assert_eq!(snapshot.runs.failed_by_stage["cancelled"], 1);
    }
}
