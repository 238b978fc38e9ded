use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

use crate::state::AppState;

const PROXY_PREFIX: &str = "/api/quiz-proxy";

/// Maps an incoming relay URI onto the fixed upstream questions endpoint,
/// keeping the path suffix and query string verbatim.
fn upstream_url(base_url: &str, uri: &Uri) -> String {
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("");
    let suffix = path_and_query.strip_prefix(PROXY_PREFIX).unwrap_or("");
    format!("{}/api/v1/questions{}", base_url, suffix)
}

/// Content type to forward alongside a relayed body, when the incoming
/// request declared one.
fn forwarded_content_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Stateless relay to the keyed quiz API: forwards any method and path
/// suffix, injecting the server-held key as a request header, and streams the
/// upstream status and body back verbatim.
///
/// Without a configured key nothing is forwarded; the relay answers with a
/// fixed server error instead.
pub async fn quiz_proxy_handler(
    State(app_state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let api_key = app_state
        .settings
        .providers
        .quiz_api_key
        .clone()
        .filter(|key| !key.is_empty());

    let Some(api_key) = api_key else {
        tracing::error!("Relay invoked without a configured quiz API key");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "Server not configured: missing quiz API key" })),
        )
            .into_response();
    };

    let target = upstream_url(&app_state.settings.providers.quiz_api_url, &uri);
    tracing::debug!(http.method = %method, upstream.url = %target, "Relaying request upstream");

    let upstream_method = reqwest::Method::from_bytes(method.as_str().as_bytes())
        .unwrap_or(reqwest::Method::GET);

    let mut upstream_request = app_state
        .http
        .request(upstream_method, &target)
        .header("X-Api-Key", api_key)
        .header("Accept", "application/json");
    if let Some(content_type) = forwarded_content_type(&headers) {
        upstream_request = upstream_request.header("Content-Type", content_type);
    }

    let result = upstream_request.body(body.to_vec()).send().await;

    match result {
        Ok(upstream) => {
            let status = StatusCode::from_u16(upstream.status().as_u16())
                .unwrap_or(StatusCode::BAD_GATEWAY);
            let body_text = upstream.text().await.unwrap_or_default();
            (
                status,
                [(header::CONTENT_TYPE, "application/json")],
                body_text,
            )
                .into_response()
        }
        Err(e) => {
            tracing::warn!(error = %e, "Relay upstream fetch failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": "Proxy fetch failed", "detail": e.to_string() })),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::AcquisitionChain;
    use crate::config::{
        AppSettings, PoolConfig, PoolSourceType, ProvidersConfig, ServerConfig, SessionConfig,
        StorageConfig,
    };
    use crate::content::LocalPoolCache;
    use crate::scores::HighscoreStore;
    use crate::session::SessionManagerHandle;
    use std::sync::Arc;

    fn settings_without_key() -> AppSettings {
        AppSettings {
            server: ServerConfig {
                port: 0,
                cors_origins: vec![],
            },
            providers: ProvidersConfig {
                open_trivia_url: "http://127.0.0.1:9".to_string(),
                quiz_api_url: "http://127.0.0.1:9".to_string(),
                quiz_api_key: None,
                quickstart_category: Some("18".to_string()),
                request_timeout_secs: 1,
            },
            pool: PoolConfig {
                source_type: PoolSourceType::Bundled,
                file_path: None,
                http_url: None,
            },
            session: SessionConfig {
                question_seconds: 20,
                advance_delay_ms: 1400,
                max_remote_amount: 30,
                finished_ttl_secs: 300,
            },
            storage: StorageConfig {
                data_dir: std::env::temp_dir()
                    .join("quizdeck-proxy-test")
                    .display()
                    .to_string(),
            },
        }
    }

    async fn app_state(settings: AppSettings) -> AppState {
        let settings = Arc::new(settings);
        let pool = Arc::new(
            LocalPoolCache::new(settings.pool.clone())
                .await
                .expect("bundled pool loads"),
        );
        AppState {
            sessions: SessionManagerHandle::new(8, settings.session.clone()),
            acquisition: Arc::new(AcquisitionChain::from_settings(
                &settings.providers,
                &settings.session,
                Arc::clone(&pool),
            )),
            pool,
            scores: Arc::new(HighscoreStore::new(&settings.storage.data_dir)),
            settings,
            http: reqwest::Client::new(),
        }
    }

    #[test]
    fn upstream_url_keeps_suffix_and_query() {
        let base = "https://quizapi.example";
        let bare: Uri = "/api/quiz-proxy".parse().unwrap();
        let with_query: Uri = "/api/quiz-proxy?limit=10&category=Linux".parse().unwrap();
        let with_path: Uri = "/api/quiz-proxy/tags?limit=5".parse().unwrap();

        assert_eq!(
            upstream_url(base, &bare),
            "https://quizapi.example/api/v1/questions"
        );
        assert_eq!(
            upstream_url(base, &with_query),
            "https://quizapi.example/api/v1/questions?limit=10&category=Linux"
        );
        assert_eq!(
            upstream_url(base, &with_path),
            "https://quizapi.example/api/v1/questions/tags?limit=5"
        );
    }

    #[test]
    fn forwarded_content_type_follows_the_incoming_header() {
        let mut headers = HeaderMap::new();
        assert!(forwarded_content_type(&headers).is_none());

        headers.insert(header::CONTENT_TYPE, "application/json".parse().unwrap());
        assert_eq!(
            forwarded_content_type(&headers).as_deref(),
            Some("application/json")
        );
    }

    #[tokio::test]
    async fn relay_without_key_answers_server_error_and_never_forwards() {
        let state = app_state(settings_without_key()).await;
        let response = quiz_proxy_handler(
            State(state),
            Method::GET,
            "/api/quiz-proxy?limit=10".parse().unwrap(),
            HeaderMap::new(),
            Bytes::new(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json.get("error").is_some());
    }

    #[tokio::test]
    async fn relay_with_unreachable_upstream_answers_gateway_error() {
        let mut settings = settings_without_key();
        settings.providers.quiz_api_key = Some("test-key".to_string());
        let state = app_state(settings).await;

        let response = quiz_proxy_handler(
            State(state),
            Method::GET,
            "/api/quiz-proxy?limit=10".parse().unwrap(),
            HeaderMap::new(),
            Bytes::new(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json.get("error").is_some());
        assert!(json.get("detail").is_some());
    }
}
