//! Multipart upload extraction shared by the transcribe and split endpoints.

use actix_multipart::{Field, Multipart};
use actix_web::{HttpMessage, HttpRequest};
use futures_util::stream::StreamExt;

use crate::error::AppError;

/// Form field carrying the audio file.
pub const AUDIO_FIELD: &str = "audioFile";

/// Filename assumed when the upload does not declare one.
pub const DEFAULT_FILENAME: &str = "input.mp3";

/// An uploaded audio file, fully buffered.
#[derive(Debug)]
pub struct AudioUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Read the `audioFile` field out of a multipart request.
///
/// ## Parameters:
/// - `req`: used to check the Content-Type before touching the body
/// - `payload`: the multipart stream
/// - `max_bytes`: uploads larger than this are rejected while streaming
///
/// ## Returns:
/// - **Ok(AudioUpload)**: bytes and declared filename (`input.mp3` if none)
/// - **Err(AppError::BadRequest)**: not multipart, malformed, missing the
///   field, or too large
///
/// An empty file is returned as-is; the pipeline rejects it.
pub async fn read_audio_upload(
    req: &HttpRequest,
    mut payload: Multipart,
    max_bytes: usize,
) -> Result<AudioUpload, AppError> {
    if req.content_type() != "multipart/form-data" {
        return Err(AppError::BadRequest(
            "Content-Type must be multipart/form-data".to_string(),
        ));
    }

    let mut upload: Option<AudioUpload> = None;

    while let Some(item) = payload.next().await {
        let field = item.map_err(|e| AppError::BadRequest(format!("Multipart error: {}", e)))?;

        let (name, filename) = match field.content_disposition() {
            Some(cd) => (
                cd.get_name().unwrap_or_default().to_string(),
                cd.get_filename().map(str::to_string),
            ),
            None => continue,
        };

        if name != AUDIO_FIELD || upload.is_some() {
            drain(field).await?;
            continue;
        }

        let filename = filename
            .filter(|f| !f.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_FILENAME.to_string());
        let bytes = read_field(field, max_bytes).await?;

        tracing::debug!(filename = %filename, bytes = bytes.len(), "Audio upload received");
        upload = Some(AudioUpload { filename, bytes });
    }

    upload.ok_or_else(|| {
        AppError::BadRequest(format!("No audio file provided in field '{}'", AUDIO_FIELD))
    })
}

async fn read_field(mut field: Field, max_bytes: usize) -> Result<Vec<u8>, AppError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(|e| AppError::BadRequest(format!("Upload error: {}", e)))?;
        if bytes.len() + chunk.len() > max_bytes {
            return Err(AppError::BadRequest(format!(
                "File too large (max: {} bytes)",
                max_bytes
            )));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

async fn drain(mut field: Field) -> Result<(), AppError> {
    while let Some(chunk) = field.next().await {
        chunk.map_err(|e| AppError::BadRequest(format!("Multipart error: {}", e)))?;
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use actix_web::{test, web, App, HttpResponse};
    use serde_json::json;

    async fn echo_upload(req: HttpRequest, payload: Multipart) -> Result<HttpResponse, AppError> {
        let upload = read_audio_upload(&req, payload, 16).await?;
        Ok(HttpResponse::Ok().json(json!({
            "filename": upload.filename,
            "len": upload.bytes.len()
        })))
    }

    async fn call(content_type: &str, body: Vec<u8>) -> (u16, serde_json::Value) {
        let app = test::init_service(App::new().route("/", web::post().to(echo_upload))).await;
        let req = test::TestRequest::post()
            .uri("/")
            .insert_header(("content-type", content_type))
            .set_payload(body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        let status = resp.status().as_u16();
        let body: serde_json::Value = test::read_body_json(resp).await;
        (status, body)
    }

    #[actix_web::test]
    async fn test_reads_named_field() {
        let body = multipart_body(AUDIO_FIELD, Some("talk.wav"), b"abc");
        let (status, json) = call(&multipart_content_type(), body).await;
        assert_eq!(status, 200);
        assert_eq!(json["filename"], "talk.wav");
        assert_eq!(json["len"], 3);
    }

    #[actix_web::test]
    async fn test_missing_filename_defaults_to_mp3() {
        let body = multipart_body(AUDIO_FIELD, None, b"abc");
        let (_, json) = call(&multipart_content_type(), body).await;
        assert_eq!(json["filename"], DEFAULT_FILENAME);
    }

    #[actix_web::test]
    async fn test_wrong_field_is_rejected() {
        let body = multipart_body("file", Some("talk.wav"), b"abc");
        let (status, json) = call(&multipart_content_type(), body).await;
        assert_eq!(status, 400);
        assert_eq!(json["error"]["type"], "bad_request");
    }

    #[actix_web::test]
    async fn test_non_multipart_is_rejected() {
        let (status, json) = call("application/json", b"{}".to_vec()).await;
        assert_eq!(status, 400);
        assert!(json["error"]["message"].as_str().unwrap().contains("multipart/form-data"));
    }

    #[actix_web::test]
    async fn test_oversized_upload_is_rejected() {
        let body = multipart_body(AUDIO_FIELD, Some("big.mp3"), &[7u8; 64]);
        let (status, json) = call(&multipart_content_type(), body).await;
        assert_eq!(status, 400);
        assert!(json["error"]["message"].as_str().unwrap().contains("too large"));
    }
}
