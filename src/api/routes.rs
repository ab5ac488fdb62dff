use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use tracing::{error, info};
use uuid::Uuid;

use super::types::*;
use super::AppState;
use crate::config::DEFAULT_MAX_LENGTH;
use crate::model::ModelSlot;
use crate::prompts::{
    build_portfolio_prompt, build_token_prompt, PortfolioAnalysisRequest, TokenAnalysisRequest,
};

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/analyze", post(analyze))
        .route("/portfolio-analyze", post(portfolio_analyze))
        .route("/token-analyze", post(token_analyze))
        .with_state(state)
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let health = state.service.health();
    Json(HealthResponse {
        status: "healthy".to_string(),
        model_loaded: health.model_loaded,
        fallback_loaded: health.fallback_loaded,
        cuda_available: health.cuda_available,
    })
}

async fn analyze(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let request_id = Uuid::new_v4();

    let prompt = match request.prompt.as_deref() {
        Some(p) if !p.is_empty() => p,
        _ => return Err(ApiError::bad_request("Prompt is required")),
    };

    info!(
        "[{}] Analyzing prompt (length: {}, max_length: {}, fallback requested: {})",
        request_id,
        prompt.len(),
        request.max_length,
        request.use_fallback
    );

    let outcome = state
        .service
        .try_primary_then_fallback(prompt, request.max_length)
        .await
        .map_err(|e| {
            error!("[{}] Analysis failed: {}", request_id, e);
            ApiError::from(e)
        })?;

    info!("[{}] Served by {} model", request_id, outcome.slot);

    Ok(Json(AnalyzeResponse {
        result: outcome.text,
        model_used: outcome.model_used,
        success: true,
    }))
}

async fn portfolio_analyze(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<PortfolioAnalysisRequest>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let request_id = Uuid::new_v4();
    info!(
        "[{}] Portfolio analysis: {} holdings",
        request_id,
        request.holdings.len()
    );

    let prompt = build_portfolio_prompt(&request);
    run_analysis(&state, request_id, "Portfolio", &prompt).await
}

async fn token_analyze(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<TokenAnalysisRequest>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let request_id = Uuid::new_v4();
    info!(
        "[{}] Token analysis: {}",
        request_id,
        request.symbol.as_deref().unwrap_or("N/A")
    );

    let prompt = build_token_prompt(&request);
    run_analysis(&state, request_id, "Token", &prompt).await
}

/// Primary model only; these endpoints do not retry on the fallback.
async fn run_analysis(
    state: &AppState,
    request_id: Uuid,
    kind: &str,
    prompt: &str,
) -> Result<Json<AnalysisResponse>, ApiError> {
    match state
        .service
        .generate(ModelSlot::Primary, prompt, DEFAULT_MAX_LENGTH)
        .await
    {
        Ok(outcome) => Ok(Json(AnalysisResponse {
            analysis: outcome.text,
            model_used: outcome.model_used,
            success: true,
        })),
        Err(e) => {
            error!("[{}] {} analysis failed: {}", request_id, kind, e);
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::tests::{fallback, primary, MockBackend};
    use crate::service::InferenceService;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn router(service: InferenceService) -> Router {
        create_router(Arc::new(AppState { service }))
    }

    async fn send(app: Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health_without_models() {
        let app = router(InferenceService::with_backends(None, None, false));
        let (status, body) = send(app, "GET", "/health", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "status": "healthy",
                "model_loaded": false,
                "fallback_loaded": false,
                "cuda_available": false
            })
        );
    }

    #[tokio::test]
    async fn test_analyze_requires_prompt() {
        for payload in [r#"{}"#, r#"{"prompt": ""}"#, r#"{"prompt": null}"#] {
            let app = router(InferenceService::with_backends(
                primary(MockBackend::replying("unused")),
                None,
                false,
            ));
            let (status, body) = send(app, "POST", "/analyze", Some(payload)).await;

            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error"], "Prompt is required");
            assert_eq!(body["success"], false);
        }
    }

    #[tokio::test]
    async fn test_analyze_without_models_fails() {
        let app = router(InferenceService::with_backends(None, None, false));
        let (status, body) =
            send(app, "POST", "/analyze", Some(r#"{"prompt": "Is ETH oversold?"}"#)).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("Both primary and fallback"));
    }

    #[tokio::test]
    async fn test_analyze_uses_primary() {
        let app = router(InferenceService::with_backends(
            primary(MockBackend::replying("Bullish")),
            fallback(MockBackend::replying("unused")),
            false,
        ));
        let (status, body) = send(
            app,
            "POST",
            "/analyze",
            Some(r#"{"prompt": "Is ETH oversold?", "use_fallback": true}"#),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"result": "Bullish", "model_used": "finma-7b-full", "success": true})
        );
    }

    #[tokio::test]
    async fn test_analyze_falls_back_on_primary_failure() {
        let app = router(InferenceService::with_backends(
            primary(MockBackend::failing("device lost")),
            fallback(MockBackend::replying("Neutral")),
            false,
        ));
        let (status, body) =
            send(app, "POST", "/analyze", Some(r#"{"prompt": "Is ETH oversold?"}"#)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["model_used"], "mistral-7b");
        assert_eq!(body["result"], "Neutral");
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn test_malformed_body_is_server_error() {
        let app = router(InferenceService::with_backends(None, None, false));
        let (status, body) = send(app, "POST", "/analyze", Some("not json")).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_token_analyze_builds_prompt() {
        let backend = MockBackend::replying("Hold with moderate confidence");
        let app = router(InferenceService::with_backends(
            primary(backend.clone()),
            None,
            false,
        ));
        let payload = r#"{"symbol":"BTC","price":50000,"change_24h":2.5,"volume":1000000000,
                          "market_cap":1000000000000,"technical_data":{"rsi":65}}"#;
        let (status, body) = send(app, "POST", "/token-analyze", Some(payload)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "analysis": "Hold with moderate confidence",
                "model_used": "finma-7b-full",
                "success": true
            })
        );

        let prompts = backend.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        for needle in ["BTC", "$50,000.00", "+2.50%", "RSI: 65"] {
            assert!(prompts[0].contains(needle), "prompt missing {}", needle);
        }
    }

    #[tokio::test]
    async fn test_portfolio_analyze_does_not_fall_back() {
        let backup = MockBackend::replying("unused");
        let app = router(InferenceService::with_backends(
            primary(MockBackend::failing("generation exploded")),
            fallback(backup.clone()),
            false,
        ));
        let payload = json!({
            "holdings": [{"symbol": "ETH", "value": 4000, "allocation": 40}],
            "total_value": 10000,
            "market_data": {"btc_price": 60000}
        })
        .to_string();
        let (status, body) = send(app, "POST", "/portfolio-analyze", Some(&payload)).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("generation exploded"));
        assert_eq!(backup.calls(), 0);
    }

    #[tokio::test]
    async fn test_portfolio_analyze_success() {
        let backend = MockBackend::replying("Diversify");
        let app = router(InferenceService::with_backends(
            primary(backend.clone()),
            None,
            false,
        ));
        let payload = json!({
            "holdings": [{"symbol": "ETH", "value": 4000, "allocation": 40}],
            "total_value": 10000,
            "market_data": {}
        })
        .to_string();
        let (status, body) = send(app, "POST", "/portfolio-analyze", Some(&payload)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["analysis"], "Diversify");
        assert_eq!(body["model_used"], "finma-7b-full");
        assert!(backend.prompts.lock().unwrap()[0].contains("- ETH: $4,000.00 (40.0%)"));
    }
}
