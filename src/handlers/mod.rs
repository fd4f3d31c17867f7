//! # HTTP Handlers
//!
//! ## Endpoints:
//! - **transcribe**: `POST /api/v1/transcribe`, audio upload in, transcript out
//! - **split**: `POST /api/v1/split`, audio upload in, base64 chunks out
//! - **config**: `GET /api/v1/config`, effective configuration
//!
//! Health and metrics live in [`crate::health`].

pub mod config;
pub mod split;
pub mod transcribe;
pub mod upload;

pub use config::get_config;
pub use split::split_audio;
pub use transcribe::transcribe_audio;
