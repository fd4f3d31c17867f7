use actix_multipart::Multipart;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Serialize;

use super::upload::read_audio_upload;
use crate::error::AppResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct TranscriptResponse {
    pub transcript: String,
}

/// Transcribe an uploaded audio file.
///
/// ## Endpoint: `POST /api/v1/transcribe`
///
/// ## Request:
/// Multipart form data with the audio file in field `audioFile`
///
/// ## Response:
/// ```json
/// { "transcript": "first window text second window text" }
/// ```
///
/// Failures use the standard error envelope; see [`crate::error`].
pub async fn transcribe_audio(
    req: HttpRequest,
    payload: Multipart,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let upload = read_audio_upload(&req, payload, state.config.server.max_upload_bytes).await?;

    let run = state.begin_run();
    let result = state.pipeline.run(&upload.bytes, &upload.filename).await;
    run.finish(&result);

    Ok(HttpResponse::Ok().json(TranscriptResponse {
        transcript: result?,
    }))
}
