//! # Configuration Management
//!
//! Loads the service configuration from layered sources:
//! - Default values (built into the code)
//! - TOML configuration file (config.toml, optional)
//! - Environment variables (APP_ prefix, `__` between nested keys)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. `HOST`, `PORT` and `OPENAI_API_KEY` (deployment platform conventions)
//! 2. Environment variables (`APP_SERVER__PORT`, `APP_PIPELINE__CONCURRENCY_CAP`, ...)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)
//!
//! ## Sections:
//! - **server**: bind address and upload size limit
//! - **pipeline**: window length, concurrency cap, unit timeout, format policy
//! - **media**: where to find `ffmpeg`/`ffprobe` and where to put scratch files
//! - **provider**: which transcription service to call and how

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::pipeline::{FormatPolicy, PipelineSettings, TargetFormat};
use crate::transcription::ProviderKind;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub pipeline: PipelineConfig,
    pub media: MediaConfig,
    pub provider: ProviderConfig,
}

/// Server-specific configuration settings.
///
/// ## Fields:
/// - `host`: IP address or hostname to bind to ("127.0.0.1", "0.0.0.0")
/// - `port`: TCP port to listen on
/// - `max_upload_bytes`: largest accepted audio upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
}

/// Chunking and dispatch settings for each run.
///
/// ## Fields:
/// - `window_ms`: nominal segment length (10 minutes by default)
/// - `concurrency_cap`: units in flight per run
/// - `unit_timeout_secs`: upper bound on one provider call
/// - `unknown_format_policy`: `"fallback"` or `"reject"`
/// - `fallback_format`: format used by the fallback policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub window_ms: u64,
    pub concurrency_cap: usize,
    pub unit_timeout_secs: u64,
    pub unknown_format_policy: String,
    pub fallback_format: String,
}

/// Media toolkit location.
///
/// Explicit paths win; otherwise binaries bundled in `bin_dir` are used on
/// every platform but macOS, which falls back to whatever is on `PATH`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    pub ffmpeg_path: Option<String>,
    pub ffprobe_path: Option<String>,
    pub bin_dir: String,
    /// Scratch directory; the system temp dir when unset.
    pub scratch_dir: Option<String>,
}

/// Transcription provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// `"openai"` or `"azure"`.
    pub kind: String,
    pub api_key: Option<String>,
    /// Overrides the provider's default API root. Required for azure.
    pub base_url: Option<String>,
    pub model: String,
    pub language: Option<String>,
    pub azure_deployment: Option<String>,
    pub azure_api_version: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                max_upload_bytes: 200 * 1024 * 1024,
            },
            pipeline: PipelineConfig {
                window_ms: crate::pipeline::segmenter::DEFAULT_WINDOW_MS,
                concurrency_cap: 3,
                unit_timeout_secs: 300,
                unknown_format_policy: "fallback".to_string(),
                fallback_format: "mp3".to_string(),
            },
            media: MediaConfig {
                ffmpeg_path: None,
                ffprobe_path: None,
                bin_dir: "bin".to_string(),
                scratch_dir: None,
            },
            provider: ProviderConfig {
                kind: "openai".to_string(),
                api_key: None,
                base_url: None,
                model: "whisper-1".to_string(),
                language: None,
                azure_deployment: None,
                azure_api_version: "2024-06-01".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from all sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__PORT=3000`: override server port
    /// - `APP_PIPELINE__CONCURRENCY_CAP=5`: more units in flight
    /// - `APP_PROVIDER__KIND=azure`: switch provider
    /// - `PORT=3000`, `HOST=0.0.0.0`: deployment platform overrides
    /// - `OPENAI_API_KEY=sk-...`: used when `provider.api_key` is unset
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            // Single underscores appear inside field names, so nesting uses "__".
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let mut config: AppConfig = settings.build()?.try_deserialize()?;

        if config.provider.api_key.as_deref().map_or(true, str::is_empty) {
            if let Ok(key) = env::var("OPENAI_API_KEY") {
                config.provider.api_key = Some(key);
            }
        }

        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Server port is not 0 and uploads may be at least one byte
    /// - Window, concurrency cap and unit timeout are all positive
    /// - Format policy and fallback format are recognized
    /// - Provider kind is recognized
    ///
    /// The provider API key is checked when the client is built, not here.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.server.max_upload_bytes == 0 {
            return Err(anyhow::anyhow!("Max upload size must be greater than 0"));
        }

        if self.pipeline.window_ms == 0 {
            return Err(anyhow::anyhow!("Segment window must be greater than 0"));
        }

        if self.pipeline.concurrency_cap == 0 {
            return Err(anyhow::anyhow!("Concurrency cap must be greater than 0"));
        }

        if self.pipeline.unit_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Unit timeout must be greater than 0"));
        }

        self.format_policy()?;

        self.provider
            .kind
            .parse::<ProviderKind>()
            .map_err(|e| anyhow::anyhow!(e))?;

        Ok(())
    }

    /// Interpret `pipeline.unknown_format_policy` and `pipeline.fallback_format`.
    pub fn format_policy(&self) -> Result<FormatPolicy> {
        match self.pipeline.unknown_format_policy.to_ascii_lowercase().as_str() {
            "fallback" => {
                let format: TargetFormat = self
                    .pipeline
                    .fallback_format
                    .parse()
                    .map_err(|e: String| anyhow::anyhow!("Invalid fallback format: {}", e))?;
                Ok(FormatPolicy::Fallback(format))
            }
            "reject" => Ok(FormatPolicy::Reject),
            other => Err(anyhow::anyhow!(
                "Unknown format policy '{}' (expected fallback or reject)",
                other
            )),
        }
    }

    /// Settings handed to the orchestrator.
    pub fn pipeline_settings(&self) -> Result<PipelineSettings> {
        Ok(PipelineSettings {
            window_ms: self.pipeline.window_ms,
            concurrency_cap: self.pipeline.concurrency_cap,
            unit_timeout: Duration::from_secs(self.pipeline.unit_timeout_secs),
            format_policy: self.format_policy()?,
        })
    }

    /// Copy safe to expose over HTTP: the API key is masked.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.provider.api_key.is_some() {
            config.provider.api_key = Some("***".to_string());
        }
        config
    }
}
