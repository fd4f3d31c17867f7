//! # Chunk Scribe
//!
//! HTTP service that transcribes long audio recordings by cutting them into
//! fixed-length windows, transcribing the windows concurrently against a
//! speech-to-text provider, and joining the results in order.
//!
//! ## Startup Sequence:
//! 1. Load `.env`, initialize tracing
//! 2. Load and validate configuration
//! 3. Resolve the `ffmpeg`/`ffprobe` toolchain and check it runs
//! 4. Build the provider client and the pipeline
//! 5. Serve until SIGINT/SIGTERM, then stop gracefully

mod config;
mod error;
mod handlers;
mod health;
mod middleware;
mod pipeline;
mod state;
mod transcription;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpRequest, HttpResponse, HttpServer};
use anyhow::{Context, Result};
use config::AppConfig;
use error::AppError;
use pipeline::{FfmpegToolkit, MediaToolchain, Pipeline, ScratchSpace};
use state::AppState;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load().context("Failed to load configuration")?;
    config.validate()?;

    info!("Starting {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    info!(
        host = %config.server.host,
        port = config.server.port,
        window_ms = config.pipeline.window_ms,
        concurrency_cap = config.pipeline.concurrency_cap,
        provider = %config.provider.kind,
        "Configuration loaded"
    );

    let toolchain = MediaToolchain::resolve(&config.media);
    info!(
        ffmpeg = %toolchain.ffmpeg.display(),
        ffprobe = %toolchain.ffprobe.display(),
        "Media toolchain resolved"
    );
    // A missing toolchain is reported but not fatal; uploads will fail at decode.
    if let Err(e) = toolchain.probe_versions().await {
        warn!(error = %e, "Media toolchain check failed");
    }

    let scratch = match &config.media.scratch_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create scratch directory {}", dir))?;
            ScratchSpace::in_dir(dir)
        }
        None => ScratchSpace::new(),
    };

    let client = transcription::create_client(&config.provider)
        .context("Failed to create transcription client")?;
    let toolkit = Arc::new(FfmpegToolkit::new(toolchain.clone(), scratch.clone()));
    let pipeline = Pipeline::new(
        toolkit.clone(),
        toolkit,
        client,
        config.pipeline_settings()?,
    );

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let app_state = web::Data::new(AppState::new(config, pipeline, toolchain, scratch));

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(app_state.clone())
            .wrap(cors)
            .wrap(Logger::default())
            .wrap(middleware::MetricsMiddleware)
            .wrap(middleware::RequestLogging)
            .service(
                web::scope("/api/v1")
                    .route("/transcribe", web::post().to(handlers::transcribe_audio))
                    .route("/split", web::post().to(handlers::split_audio))
                    .route("/health", web::get().to(health::health_check))
                    .route("/metrics", web::get().to(health::detailed_metrics))
                    .route("/config", web::get().to(handlers::get_config)),
            )
            .route("/health", web::get().to(health::health_check))
            .default_service(web::to(not_found))
    })
    .bind(&bind_addr)
    .with_context(|| format!("Failed to bind {}", bind_addr))?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

async fn not_found(req: HttpRequest) -> Result<HttpResponse, AppError> {
    Err(AppError::NotFound(format!("No route for {} {}", req.method(), req.path())))
}

fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chunk_scribe=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .context("Failed to initialize tracing")?;

    Ok(())
}

/// Resolves on SIGINT (Ctrl+C) or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received SIGINT");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received SIGTERM");
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
