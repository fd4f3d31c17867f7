use async_trait::async_trait;
use reqwest::multipart;

use super::{parse_transcription_body, status_error, ProviderError, TranscriptionClient};
use crate::pipeline::media::EncodedChunk;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI `/audio/transcriptions` client.
pub struct OpenAiWhisperClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    language: Option<String>,
}

impl OpenAiWhisperClient {
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        model: String,
        language: Option<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model,
            language,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/audio/transcriptions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl TranscriptionClient for OpenAiWhisperClient {
    fn name(&self) -> &str {
        "openai"
    }

    async fn transcribe(&self, chunk: &EncodedChunk) -> Result<String, ProviderError> {
        let file_part = multipart::Part::bytes(chunk.bytes.clone())
            .file_name(chunk.file_name())
            .mime_str(chunk.media_type())
            .map_err(|e| ProviderError::Request(format!("mime: {}", e)))?;

        let mut form = multipart::Form::new()
            .text("model", self.model.clone())
            .text("response_format", "json")
            .part("file", file_part);
        if let Some(language) = &self.language {
            form = form.text("language", language.clone());
        }

        tracing::debug!(
            model = %self.model,
            segment_index = chunk.index,
            bytes = chunk.bytes.len(),
            "Sending chunk to OpenAI Whisper API"
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Request(format!("body: {}", e)))?;
        parse_transcription_body(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::format::TargetFormat;
    use actix_multipart::Multipart;
    use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
    use futures_util::StreamExt;
    use serde_json::json;

    /// Fake provider: echoes back the uploaded file name and the model field,
    /// or 401s when the bearer token is wrong.
    async fn fake_transcriptions(req: HttpRequest, mut payload: Multipart) -> HttpResponse {
        let mut model = String::new();
        let mut file_name = String::new();
        let mut file_len = 0;
        while let Some(Ok(mut field)) = payload.next().await {
            let (name, filename) = match field.content_disposition() {
                Some(cd) => (
                    cd.get_name().unwrap_or_default().to_string(),
                    cd.get_filename().unwrap_or_default().to_string(),
                ),
                None => continue,
            };
            if name == "file" {
                file_name = filename;
            }
            let mut data = Vec::new();
            while let Some(Ok(bytes)) = field.next().await {
                data.extend_from_slice(&bytes);
            }
            match name.as_str() {
                "model" => model = String::from_utf8_lossy(&data).to_string(),
                "file" => file_len = data.len(),
                _ => {}
            }
        }

        let authorized = req
            .headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            == Some("Bearer sk-test");
        if !authorized {
            return HttpResponse::Unauthorized().json(json!({"error": "bad key"}));
        }

        HttpResponse::Ok().json(json!({ "text": format!("{} {} {}", model, file_name, file_len) }))
    }

    async fn start_fake_provider() -> String {
        let server = HttpServer::new(|| {
            App::new().route("/v1/audio/transcriptions", web::post().to(fake_transcriptions))
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .unwrap();
        let addr = server.addrs()[0];
        actix_web::rt::spawn(server.run());
        format!("http://{}/v1", addr)
    }

    fn chunk() -> EncodedChunk {
        EncodedChunk {
            index: 2,
            format: TargetFormat::Mp3,
            bytes: vec![0u8; 64],
        }
    }

    #[test]
    fn test_endpoint_building() {
        let client = OpenAiWhisperClient::new(
            "k".to_string(),
            Some("http://localhost:9000/v1/".to_string()),
            "whisper-1".to_string(),
            None,
        );
        assert_eq!(client.endpoint(), "http://localhost:9000/v1/audio/transcriptions");

        let default = OpenAiWhisperClient::new("k".to_string(), None, "whisper-1".to_string(), None);
        assert_eq!(default.endpoint(), "https://api.openai.com/v1/audio/transcriptions");
    }

    #[actix_web::test]
    async fn test_transcribe_against_fake_provider() {
        let base_url = start_fake_provider().await;
        let client = OpenAiWhisperClient::new(
            "sk-test".to_string(),
            Some(base_url),
            "whisper-1".to_string(),
            None,
        );

        let text = client.transcribe(&chunk()).await.unwrap();
        assert_eq!(text, "whisper-1 chunk_002.mp3 64");
    }

    #[actix_web::test]
    async fn test_non_success_status_is_reported() {
        let base_url = start_fake_provider().await;
        let client = OpenAiWhisperClient::new(
            "wrong".to_string(),
            Some(base_url),
            "whisper-1".to_string(),
            None,
        );

        match client.transcribe(&chunk()).await {
            Err(ProviderError::Status { status, body }) => {
                assert_eq!(status, 401);
                assert!(body.contains("bad key"));
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[actix_web::test]
    async fn test_unreachable_provider_is_a_request_error() {
        let client = OpenAiWhisperClient::new(
            "sk-test".to_string(),
            Some("http://127.0.0.1:9/v1".to_string()),
            "whisper-1".to_string(),
            None,
        );
        assert!(matches!(
            client.transcribe(&chunk()).await,
            Err(ProviderError::Request(_))
        ));
    }
}
