use async_trait::async_trait;
use reqwest::multipart;

use super::{parse_transcription_body, status_error, ProviderError, TranscriptionClient};
use crate::pipeline::media::EncodedChunk;

/// Azure OpenAI Whisper deployment client.
pub struct AzureWhisperClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl AzureWhisperClient {
    pub fn new(base_url: &str, deployment: &str, api_key: &str, api_version: &str) -> Self {
        let endpoint = format!(
            "{}/openai/deployments/{}/audio/transcriptions?api-version={}",
            base_url.trim_end_matches('/'),
            deployment,
            api_version,
        );
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl TranscriptionClient for AzureWhisperClient {
    fn name(&self) -> &str {
        "azure"
    }

    async fn transcribe(&self, chunk: &EncodedChunk) -> Result<String, ProviderError> {
        let file_part = multipart::Part::bytes(chunk.bytes.clone())
            .file_name(chunk.file_name())
            .mime_str(chunk.media_type())
            .map_err(|e| ProviderError::Request(format!("mime: {}", e)))?;

        let form = multipart::Form::new()
            .text("response_format", "json")
            .part("file", file_part);

        tracing::debug!(
            endpoint = %self.endpoint,
            segment_index = chunk.index,
            "Sending chunk to Azure OpenAI Whisper"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header("api-key", &self.api_key)
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

    /// Fake deployment: replies with the deployment, api version and the
    /// form field names it received, or 401s on a wrong `api-key`.
    async fn fake_deployment(
        req: HttpRequest,
        deployment: web::Path<String>,
        mut payload: Multipart,
    ) -> HttpResponse {
        let mut fields = Vec::new();
        while let Some(Ok(mut field)) = payload.next().await {
            if let Some(name) = field.content_disposition().and_then(|cd| cd.get_name()) {
                fields.push(name.to_string());
            }
            while let Some(Ok(_)) = field.next().await {}
        }

        if req.headers().get("api-key").and_then(|v| v.to_str().ok()) != Some("az-key") {
            return HttpResponse::Unauthorized().json(json!({"error": "invalid api-key"}));
        }
        if req.headers().contains_key("authorization") {
            return HttpResponse::BadRequest().json(json!({"error": "unexpected bearer token"}));
        }

        let version = req
            .query_string()
            .strip_prefix("api-version=")
            .unwrap_or("none")
            .to_string();
        fields.sort();
        HttpResponse::Ok().json(json!({
            "text": format!("{} {} {}", deployment.into_inner(), version, fields.join(","))
        }))
    }

    async fn start_fake_azure() -> String {
        let server = HttpServer::new(|| {
            App::new().route(
                "/openai/deployments/{deployment}/audio/transcriptions",
                web::post().to(fake_deployment),
            )
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .unwrap();
        let addr = server.addrs()[0];
        actix_web::rt::spawn(server.run());
        format!("http://{}", addr)
    }

    fn chunk() -> EncodedChunk {
        EncodedChunk {
            index: 0,
            format: TargetFormat::Wav,
            bytes: vec![1u8; 32],
        }
    }

    #[test]
    fn test_endpoint_includes_deployment_and_version() {
        let client = AzureWhisperClient::new(
            "https://contoso.openai.azure.com/",
            "whisper",
            "key",
            "2024-06-01",
        );
        assert_eq!(
            client.endpoint,
            "https://contoso.openai.azure.com/openai/deployments/whisper/audio/transcriptions?api-version=2024-06-01"
        );
    }

    #[actix_web::test]
    async fn test_sends_api_key_and_model_less_form() {
        let base_url = start_fake_azure().await;
        let client = AzureWhisperClient::new(&base_url, "whisper", "az-key", "2024-06-01");

        let text = client.transcribe(&chunk()).await.unwrap();
        assert_eq!(text, "whisper 2024-06-01 file,response_format");
    }

    #[actix_web::test]
    async fn test_wrong_key_is_status_error() {
        let base_url = start_fake_azure().await;
        let client = AzureWhisperClient::new(&base_url, "whisper", "stale", "2024-06-01");

        match client.transcribe(&chunk()).await {
            Err(ProviderError::Status { status, body }) => {
                assert_eq!(status, 401);
                assert!(body.contains("invalid api-key"));
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }
}
