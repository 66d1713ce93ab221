// src/proxy/server.rs
// =============================================================================
// The inbound HTTP surface:
//   GET /_cache_stats   -> {cached_responses, live_fallback, origin}
//   GET /<any>?<query>  -> proxied fetch through the gateway
// Anything that is not a GET gets 405.
// =============================================================================

use crate::error::ArchiveError;
use crate::proxy::{CacheStats, Gateway, GatewayResponse};
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub fn router(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .route("/_cache_stats", get(cache_stats))
        .fallback(proxy_get)
        .layer(TraceLayer::new_for_http())
        .with_state(gateway)
}

/// Binds `addr` and serves until Ctrl-C.
pub async fn serve(gateway: Arc<Gateway>, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("gateway listening on {}", addr);

    axum::serve(listener, router(gateway))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("cannot listen for Ctrl-C: {}", e);
            }
            info!("shutting down");
        })
        .await?;
    Ok(())
}

async fn cache_stats(State(gateway): State<Arc<Gateway>>) -> Result<Json<CacheStats>, ArchiveError> {
    Ok(Json(gateway.stats()?))
}

async fn proxy_get(State(gateway): State<Arc<Gateway>>, method: Method, uri: Uri) -> Response {
    if method != Method::GET {
        return (StatusCode::METHOD_NOT_ALLOWED, "Only GET is proxied").into_response();
    }

    match gateway.get(uri.path(), uri.query()).await {
        Ok(response) => into_http(response),
        Err(e) => e.into_response(),
    }
}

fn into_http(response: GatewayResponse) -> Response {
    let GatewayResponse {
        status,
        headers,
        body,
    } = response;

    let mut http = Response::new(Body::from(body));
    *http.status_mut() = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);

    let out = http.headers_mut();
    for (name, value) in headers.iter() {
        // Upstream headers that are not valid HTTP tokens are dropped
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            out.append(name, value);
        }
    }
    http
}

impl ArchiveError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ArchiveError::ForbiddenHost(_) => StatusCode::FORBIDDEN,
            ArchiveError::CacheMiss(_) => StatusCode::NOT_FOUND,
            ArchiveError::Upstream { .. } | ArchiveError::GatewayUnreachable(_) => {
                StatusCode::BAD_GATEWAY
            }
            ArchiveError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ArchiveError::InvalidUrl { .. } => StatusCode::BAD_REQUEST,
            ArchiveError::Extraction(_) | ArchiveError::Storage(_) | ArchiveError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ArchiveError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("{}", self);
        }
        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheStore, HeaderList};
    use crate::config::GatewaySettings;
    use tempfile::TempDir;

    // Serves the router on an ephemeral port and returns its base URL
    async fn spawn(gateway: Gateway) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(Arc::new(gateway))).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn offline_gateway(dir: &TempDir) -> Gateway {
        let settings =
            GatewaySettings::new("https://example.com", None, "http://localhost:5003", dir.path(), false)
                .unwrap();
        Gateway::new(settings).unwrap()
    }

    #[tokio::test]
    async fn test_cache_stats_endpoint() {
        let dir = TempDir::new().unwrap();
        let gateway = offline_gateway(&dir);
        CacheStore::open(dir.path())
            .unwrap()
            .put("GET", "https://example.com/", 200, &HeaderList::new(), b"home")
            .unwrap();
        let base = spawn(gateway).await;

        let stats: serde_json::Value = reqwest::get(format!("{}/_cache_stats", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(stats["cached_responses"], 1);
        assert_eq!(stats["live_fallback"], false);
        assert_eq!(stats["origin"], "https://example.com");
    }

    #[tokio::test]
    async fn test_proxied_hit_and_miss() {
        let dir = TempDir::new().unwrap();
        let gateway = offline_gateway(&dir);
        let mut headers = HeaderList::new();
        headers.push("Content-Type", "text/css");
        CacheStore::open(dir.path())
            .unwrap()
            .put(
                "GET",
                "https://example.com/site.css?v=2",
                200,
                &headers,
                b"body{background:url(https://example.com/bg.png)}",
            )
            .unwrap();
        let base = spawn(gateway).await;

        let hit = reqwest::get(format!("{}/site.css?v=2", base)).await.unwrap();
        assert_eq!(hit.status().as_u16(), 200);
        assert_eq!(
            hit.text().await.unwrap(),
            "body{background:url(http://localhost:5003/bg.png)}"
        );

        let miss = reqwest::get(format!("{}/site.css?v=3", base)).await.unwrap();
        assert_eq!(miss.status().as_u16(), 404);
    }

    #[tokio::test]
    async fn test_non_get_is_rejected() {
        let dir = TempDir::new().unwrap();
        let base = spawn(offline_gateway(&dir)).await;
        let response = reqwest::Client::new()
            .post(format!("{}/form", base))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 405);
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            ArchiveError::ForbiddenHost("x".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(ArchiveError::CacheMiss("x".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ArchiveError::UpstreamTimeout("x".into()).status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }
}
