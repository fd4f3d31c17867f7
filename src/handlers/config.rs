use crate::{error::AppResult, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

/// Effective configuration, with the provider API key masked.
///
/// ## Endpoint: `GET /api/v1/config`
///
/// Configuration is fixed at startup; there is no update endpoint.
pub async fn get_config(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": state.config.redacted(),
        "toolchain": state.toolchain
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::stub_state;
    use actix_web::{test, App};

    #[actix_web::test]
    async fn test_config_never_echoes_api_key() {
        let mut state = stub_state(0, 1_000, None);
        let mut config = (*state.config).clone();
        config.provider.api_key = Some("sk-live-secret".to_string());
        state.config = std::sync::Arc::new(config);

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/api/v1/config", web::get().to(get_config)),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/v1/config").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let body = test::read_body(resp).await;
        let text = String::from_utf8_lossy(&body);
        assert!(!text.contains("sk-live-secret"));

        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["config"]["pipeline"]["concurrency_cap"], 3);
        assert_eq!(json["config"]["provider"]["kind"], "openai");
    }
}
