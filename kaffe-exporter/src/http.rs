//! Scrape endpoint.
//!
//! Serves the rendered registry on the configured path, plus `/health` for
//! liveness and `/ready`, which answers 200 once any observer metric is
//! registered.

use std::net::SocketAddr;

use axum::Router;
use axum::extract::State;
use axum::http::{Method, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::registry::SharedRegistry;

const OPENMETRICS_CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// Routes for the scrape endpoint. Browser dashboards may read but not write.
fn router(registry: SharedRegistry, metrics_path: &str) -> Router {
    Router::new()
        .route(metrics_path, get(scrape))
        .route("/health", get(|| async { "healthy\n" }))
        .route("/ready", get(ready))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET]),
        )
        .with_state(registry)
}

async fn scrape(State(registry): State<SharedRegistry>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, OPENMETRICS_CONTENT_TYPE)],
        registry.render(),
    )
}

async fn ready(State(registry): State<SharedRegistry>) -> impl IntoResponse {
    if registry.is_empty() {
        (StatusCode::SERVICE_UNAVAILABLE, "no observer metrics registered\n")
    } else {
        (StatusCode::OK, "ready\n")
    }
}

/// Serves one registry until the supervisor starts draining.
pub struct HttpServer {
    registry: SharedRegistry,
    addr: SocketAddr,
    path: String,
}

impl HttpServer {
    pub fn new(registry: SharedRegistry, addr: SocketAddr, path: String) -> Self {
        Self {
            registry,
            addr,
            path,
        }
    }

    /// Bind and serve until `shutdown` turns `true` or its sender is gone.
    ///
    /// A bind failure is returned so the caller can treat it as fatal.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind metrics endpoint {}: {}", self.addr, e))?;

        info!(addr = %self.addr, path = %self.path, "Serving metrics");

        axum::serve(listener, router(self.registry, &self.path))
            .with_graceful_shutdown(async move {
                let _ = shutdown.wait_for(|stop| *stop).await;
            })
            .await
            .map_err(|e| anyhow::anyhow!("Metrics endpoint failed: {}", e))?;

        info!("Metrics endpoint stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{MetricDescriptor, MetricRegistry};
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn make_registry(descriptors: &[&MetricDescriptor]) -> SharedRegistry {
        let mut registry = MetricRegistry::new();
        for descriptor in descriptors {
            registry.register(descriptor).unwrap();
        }
        Arc::new(registry)
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let descriptor = MetricDescriptor::gauge("kaffe_power_on", "Brewer power state");
        descriptor.set(1.0);
        let router = router(make_registry(&[&descriptor]), "/metrics");

        let response = router
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let content_type = response.headers().get("content-type").unwrap();
        assert!(
            content_type
                .to_str()
                .unwrap()
                .contains("application/openmetrics-text")
        );

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.contains("kaffe_power_on 1.0"));
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let router = router(make_registry(&[]), "/metrics");

        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_ready_endpoint_not_ready() {
        let router = router(make_registry(&[]), "/metrics");

        let response = router
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_ready_endpoint_ready() {
        let descriptor = MetricDescriptor::gauge("kaffe_plate_mode", "Plate mode");
        let router = router(make_registry(&[&descriptor]), "/metrics");

        let response = router
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_custom_metrics_path() {
        let router = router(make_registry(&[]), "/prometheus/metrics");

        let response = router
            .clone()
            .oneshot(
                Request::get("/prometheus/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_cross_origin_scrape_allowed() {
        let router = router(make_registry(&[]), "/metrics");

        let response = router
            .oneshot(
                Request::get("/metrics")
                    .header("origin", "http://dashboard.local")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );
    }
}
