//! HTTP API
//!
//! - `POST /api/indexer/event`: webhook của indexer, đưa minter mới vào pipeline
//! - `GET  /api/indexer/health`
//! - `GET  /api/gem/top?limit=N`
//! - `POST /api/webhooks`: đăng ký webhook (cần `X-API-Key` nếu có cấu hình)
//! - `GET  /metrics`

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use warp::http::StatusCode;
use warp::Filter;

use crate::chain_adapters::indexer::INDEXER_SOURCE;
use crate::chain_adapters::IndexerWebhookPayload;
use crate::metric;
use crate::notifications::WebhookDispatcher;
use crate::tradelogic::{GemPipeline, GemScanner};
use crate::types::WebhookSubscription;

const MAX_BODY_BYTES: u64 = 64 * 1024;
const DEFAULT_TOP_LIMIT: usize = 10;

/// Handles the routes need
pub struct ApiState {
    pub pipeline: Arc<GemPipeline>,
    pub scanner: Arc<GemScanner>,
    pub webhooks: Arc<WebhookDispatcher>,
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TopQuery {
    limit: Option<usize>,
}

type JsonReply = warp::reply::WithStatus<warp::reply::Json>;

fn reply(body: Value, status: StatusCode) -> JsonReply {
    warp::reply::with_status(warp::reply::json(&body), status)
}

fn with_state(state: Arc<ApiState>) -> impl Filter<Extract = (Arc<ApiState>,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// All API routes
pub fn routes(
    state: Arc<ApiState>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let indexer_event = warp::path!("api" / "indexer" / "event")
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(handle_indexer_event);

    let indexer_health = warp::path!("api" / "indexer" / "health")
        .and(warp::get())
        .map(|| {
            reply(
                json!({
                    "status": "ok",
                    "service": "hypersniper-bot",
                    "ready_for_indexer": true,
                }),
                StatusCode::OK,
            )
        });

    let gem_top = warp::path!("api" / "gem" / "top")
        .and(warp::get())
        .and(warp::query::<TopQuery>())
        .and(with_state(state.clone()))
        .and_then(handle_gem_top);

    let register_webhook = warp::path!("api" / "webhooks")
        .and(warp::post())
        .and(warp::header::optional::<String>("x-api-key"))
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with_state(state))
        .and_then(handle_register_webhook);

    let metrics = warp::path!("metrics").and(warp::get()).map(|| match metric::render() {
        Some(page) => warp::reply::with_status(page, StatusCode::OK),
        None => warp::reply::with_status("metrics disabled".to_string(), StatusCode::NOT_FOUND),
    });

    indexer_event
        .or(indexer_health)
        .or(gem_top)
        .or(register_webhook)
        .or(metrics)
}

async fn handle_indexer_event(body: Value, state: Arc<ApiState>) -> Result<JsonReply, Infallible> {
    let payload: IndexerWebhookPayload = match serde_json::from_value(body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Malformed indexer payload: {}", e);
            return Ok(reply(
                json!({"status": "error", "reason": format!("invalid payload: {}", e)}),
                StatusCode::BAD_REQUEST,
            ));
        }
    };

    if !payload.is_minter_deployed() {
        debug!("Ignoring indexer event {}", payload.event);
        return Ok(reply(
            json!({"status": "ignored", "reason": "unknown_event"}),
            StatusCode::OK,
        ));
    }

    let address = payload.minter_address.clone();
    let Some(event) = payload.into_minter_event() else {
        return Ok(reply(
            json!({"status": "ignored", "reason": "unknown_event"}),
            StatusCode::OK,
        ));
    };
    info!("📥 Minter {} ({}) received from {}", event.label(), address, INDEXER_SOURCE);

    match state.pipeline.process_event(&event).await {
        Ok(signal) => Ok(reply(
            json!({
                "status": "processed",
                "address": address,
                "accepted": signal.is_some(),
            }),
            StatusCode::OK,
        )),
        Err(e) => {
            error!("Failed to process indexer event {}: {}", address, e);
            Ok(reply(
                json!({"status": "error", "reason": e.to_string()}),
                StatusCode::OK,
            ))
        }
    }
}

async fn handle_gem_top(query: TopQuery, state: Arc<ApiState>) -> Result<JsonReply, Infallible> {
    let limit = query.limit.unwrap_or(DEFAULT_TOP_LIMIT);
    let tokens: Vec<_> = state
        .scanner
        .get_top(limit)
        .await
        .iter()
        .map(|signal| signal.as_payload())
        .collect();
    Ok(reply(json!({ "tokens": tokens }), StatusCode::OK))
}

async fn handle_register_webhook(
    api_key: Option<String>,
    subscription: WebhookSubscription,
    state: Arc<ApiState>,
) -> Result<JsonReply, Infallible> {
    if let Some(expected) = state.api_key.as_deref() {
        if api_key.as_deref() != Some(expected) {
            return Ok(reply(
                json!({"status": "error", "reason": "unauthorized"}),
                StatusCode::UNAUTHORIZED,
            ));
        }
    }

    match state.webhooks.register(subscription).await {
        Ok(()) => Ok(reply(json!({"status": "ok"}), StatusCode::CREATED)),
        Err(e) => Ok(reply(
            json!({"status": "error", "reason": e.to_string()}),
            StatusCode::BAD_REQUEST,
        )),
    }
}

/// Bind the API on `0.0.0.0:port` and serve until shutdown
pub async fn serve(state: Arc<ApiState>, port: u16, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST", "OPTIONS"])
        .allow_headers(vec!["Content-Type", "X-API-Key"]);

    let signal = async move {
        loop {
            if shutdown.changed().await.is_err() || *shutdown.borrow() {
                break;
            }
        }
    };

    let (addr, server): (SocketAddr, _) = warp::serve(routes(state).with(cors))
        .try_bind_with_graceful_shutdown(([0, 0, 0, 0], port), signal)?;

    info!("API server listening on {}", addr);
    server.await;
    info!("API server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analys::SafetyChecker;
    use crate::cache::InMemoryCache;
    use crate::chain_adapters::ton_adapter::MockOnChainReader;
    use crate::config::{GemScannerConfig, SecurityConfig};
    use crate::errors::SniperError;

    fn state(api_key: Option<&str>) -> Arc<ApiState> {
        let mut reader = MockOnChainReader::new();
        reader
            .expect_read_contract_data()
            .returning(|_| Err(SniperError::UpstreamUnavailable("rpc down".into())));
        let cache = Arc::new(InMemoryCache::new(100));
        let checker = Arc::new(SafetyChecker::new(
            Arc::new(reader),
            cache.clone(),
            SecurityConfig::default(),
            30,
        ));
        let scanner = Arc::new(GemScanner::new(GemScannerConfig::default(), cache));
        Arc::new(ApiState {
            pipeline: Arc::new(GemPipeline::new(checker, scanner.clone())),
            scanner,
            webhooks: Arc::new(WebhookDispatcher::new(500)),
            api_key: api_key.map(str::to_string),
        })
    }

    fn json_body(bytes: &[u8]) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[tokio::test]
    async fn test_indexer_health() {
        let resp = warp::test::request()
            .method("GET")
            .path("/api/indexer/health")
            .reply(&routes(state(None)))
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp.body());
        assert_eq!(body["service"], "hypersniper-bot");
        assert_eq!(body["ready_for_indexer"], true);
    }

    #[tokio::test]
    async fn test_indexer_event_dispatch() {
        let api = routes(state(None));

        let resp = warp::test::request()
            .method("POST")
            .path("/api/indexer/event")
            .json(&json!({"event": "jetton_wallet_created", "minter_address": "EQx"}))
            .reply(&api)
            .await;
        let body = json_body(resp.body());
        assert_eq!(body["status"], "ignored");
        assert_eq!(body["reason"], "unknown_event");

        let resp = warp::test::request()
            .method("POST")
            .path("/api/indexer/event")
            .json(&json!({
                "event": "jetton_minter_deployed",
                "minter_address": "EQminter",
                "jetton": {"symbol": "NEW", "total_supply": "1000"},
                "admin": {"address": "EQadmin"},
            }))
            .reply(&api)
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp.body());
        assert_eq!(body["status"], "processed");
        assert_eq!(body["address"], "EQminter");
        assert_eq!(body["accepted"], false);

        let resp = warp::test::request()
            .method("POST")
            .path("/api/indexer/event")
            .json(&json!({"minter_address": "EQminter"}))
            .reply(&api)
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_gem_top_empty() {
        let resp = warp::test::request()
            .method("GET")
            .path("/api/gem/top?limit=3")
            .reply(&routes(state(None)))
            .await;
        let body = json_body(resp.body());
        assert_eq!(body["tokens"], json!([]));
    }

    #[tokio::test]
    async fn test_register_webhook_requires_key() {
        let state = state(Some("s3cret"));
        let api = routes(state.clone());
        let subscription = json!({"subscriber_id": "42", "callback_url": "https://example.org/hook"});

        let resp = warp::test::request()
            .method("POST")
            .path("/api/webhooks")
            .json(&subscription)
            .reply(&api)
            .await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = warp::test::request()
            .method("POST")
            .path("/api/webhooks")
            .header("x-api-key", "s3cret")
            .json(&subscription)
            .reply(&api)
            .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(state.webhooks.list().await.len(), 1);

        let resp = warp::test::request()
            .method("POST")
            .path("/api/webhooks")
            .header("x-api-key", "s3cret")
            .json(&json!({"subscriber_id": "43", "callback_url": "mailto:x"}))
            .reply(&api)
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
