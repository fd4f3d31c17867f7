use actix_multipart::Multipart;
use actix_web::{web, HttpRequest, HttpResponse};
use base64::{engine::general_purpose, Engine as _};
use serde::Serialize;

use super::upload::read_audio_upload;
use crate::error::AppResult;
use crate::pipeline::EncodedChunk;
use crate::state::AppState;

/// One encoded window, as returned by the split endpoint.
#[derive(Debug, Serialize)]
pub struct ChunkPayload {
    pub name: String,
    pub mime: &'static str,
    /// Base64 (standard alphabet) of the encoded bytes.
    pub data: String,
}

impl From<&EncodedChunk> for ChunkPayload {
    fn from(chunk: &EncodedChunk) -> Self {
        Self {
            name: chunk.file_name(),
            mime: chunk.media_type(),
            data: general_purpose::STANDARD.encode(&chunk.bytes),
        }
    }
}

/// Split an upload into encoded windows without transcribing it.
///
/// ## Endpoint: `POST /api/v1/split`
///
/// ## Response:
/// ```json
/// [{ "name": "chunk_000.mp3", "mime": "audio/mpeg", "data": "<base64>" }]
/// ```
pub async fn split_audio(
    req: HttpRequest,
    payload: Multipart,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let upload = read_audio_upload(&req, payload, state.config.server.max_upload_bytes).await?;

    let run = state.begin_run();
    let result = state.pipeline.split(&upload.bytes, &upload.filename).await;
    run.finish(&result);

    let chunks: Vec<ChunkPayload> = result?.iter().map(ChunkPayload::from).collect();
    Ok(HttpResponse::Ok().json(chunks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::upload::test_support::{multipart_body, multipart_content_type};
    use crate::handlers::upload::AUDIO_FIELD;
    use crate::state::test_support::stub_state;
    use actix_web::{test, App};

    async fn post(state: AppState, filename: &str) -> (u16, serde_json::Value) {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/api/v1/split", web::post().to(split_audio)),
        )
        .await;
        let req = test::TestRequest::post()
            .uri("/api/v1/split")
            .insert_header(("content-type", multipart_content_type()))
            .set_payload(multipart_body(AUDIO_FIELD, Some(filename), b"audio"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        let status = resp.status().as_u16();
        (status, test::read_body_json(resp).await)
    }

    #[actix_web::test]
    async fn test_chunks_named_and_encoded_in_order() {
        let (status, json) = post(stub_state(2_500, 1_000, None), "memo.wav").await;
        assert_eq!(status, 200);

        let chunks = json.as_array().unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0]["name"], "chunk_000.wav");
        assert_eq!(chunks[2]["name"], "chunk_002.wav");
        assert_eq!(chunks[1]["mime"], "audio/wav");

        let decoded = general_purpose::STANDARD
            .decode(chunks[1]["data"].as_str().unwrap())
            .unwrap();
        assert_eq!(decoded, b"segment-1");
    }

    #[actix_web::test]
    async fn test_unknown_extension_falls_back_to_mp3() {
        let (_, json) = post(stub_state(500, 1_000, None), "voice.ogg").await;
        assert_eq!(json[0]["name"], "chunk_000.mp3");
        assert_eq!(json[0]["mime"], "audio/mpeg");
    }

    #[actix_web::test]
    async fn test_split_never_calls_provider() {
        // The stub provider would fail segment 0 if it were called.
        let (status, json) = post(stub_state(500, 1_000, Some(0)), "voice.mp3").await;
        assert_eq!(status, 200);
        assert_eq!(json.as_array().unwrap().len(), 1);
    }
}
