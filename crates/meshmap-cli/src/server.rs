//! HTTP transport for the explorer
//!
//! Routes:
//! - `GET /healthz`
//! - `GET /api/graph?namespace=<ns>`
//! - `GET /api/graph/{namespace}`
//! - `GET /api/routes?namespace=<ns>`
//! - `GET /api/routes/{namespace}`

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tracing::info;

use meshmap_graph::{GraphResponse, RoutesResponse};

use crate::explorer::Explorer;
use crate::loader::ResourceLoader;
use crate::Result;

#[derive(Debug, Default, Deserialize)]
struct GraphQuery {
    namespace: Option<String>,
}

/// Router over a shared explorer
pub fn graph_router<L: ResourceLoader + 'static>(explorer: Arc<Explorer<L>>) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/api/graph", get(graph_query_handler::<L>))
        .route("/api/graph/{namespace}", get(graph_path_handler::<L>))
        .route("/api/routes", get(routes_query_handler::<L>))
        .route("/api/routes/{namespace}", get(routes_path_handler::<L>))
        .with_state(explorer)
}

async fn graph_query_handler<L: ResourceLoader + 'static>(
    State(explorer): State<Arc<Explorer<L>>>,
    Query(query): Query<GraphQuery>,
) -> Result<Json<Arc<GraphResponse>>> {
    let graph = explorer.build_graph(query.namespace.as_deref()).await?;
    Ok(Json(graph))
}

async fn graph_path_handler<L: ResourceLoader + 'static>(
    State(explorer): State<Arc<Explorer<L>>>,
    Path(namespace): Path<String>,
) -> Result<Json<Arc<GraphResponse>>> {
    let graph = explorer.build_graph(Some(&namespace)).await?;
    Ok(Json(graph))
}

async fn routes_query_handler<L: ResourceLoader + 'static>(
    State(explorer): State<Arc<Explorer<L>>>,
    Query(query): Query<GraphQuery>,
) -> Result<Json<RoutesResponse>> {
    let routes = explorer.build_routes(query.namespace.as_deref()).await?;
    Ok(Json(routes))
}

async fn routes_path_handler<L: ResourceLoader + 'static>(
    State(explorer): State<Arc<Explorer<L>>>,
    Path(namespace): Path<String>,
) -> Result<Json<RoutesResponse>> {
    let routes = explorer.build_routes(Some(&namespace)).await?;
    Ok(Json(routes))
}

/// Serve until Ctrl-C
pub async fn serve<L: ResourceLoader + 'static>(
    explorer: Arc<Explorer<L>>,
    addr: SocketAddr,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        addr = %addr,
        namespace = %explorer.config().namespace,
        cache_enabled = explorer.cache().is_enabled(),
        "Starting graph explorer"
    );

    axum::serve(listener, graph_router(explorer))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Graph explorer stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // No signal handler available; serve until the process is killed
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use meshmap_common::ResourceSnapshot;

    use crate::config::ExplorerConfig;
    use crate::loader::MockResourceLoader;

    const REVIEWS: &str = r#"
apiVersion: v1
kind: Service
metadata:
  name: reviews
spec:
  selector:
    app: reviews
---
apiVersion: networking.istio.io/v1beta1
kind: VirtualService
metadata:
  name: reviews
spec:
  hosts: [reviews]
  http:
  - route:
    - destination:
        host: reviews
"#;

    fn router_with(loader: MockResourceLoader) -> Router {
        let config = ExplorerConfig {
            namespace: "bookinfo".to_string(),
            ..Default::default()
        };
        graph_router(Arc::new(Explorer::new(loader, config)))
    }

    fn manifest_loader() -> MockResourceLoader {
        let mut loader = MockResourceLoader::new();
        loader
            .expect_load()
            .returning(|namespace, _| ResourceSnapshot::from_manifests(namespace, REVIEWS));
        loader
    }

    async fn get_json(router: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .expect("request building should succeed");
        let response = router
            .oneshot(request)
            .await
            .expect("request should succeed");
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("body reading should succeed");
        let json = serde_json::from_slice(&body).expect("response should be JSON");
        (status, json)
    }

    #[tokio::test]
    async fn test_healthz() {
        let request = Request::builder()
            .uri("/healthz")
            .body(Body::empty())
            .expect("request building should succeed");
        let response = router_with(MockResourceLoader::new())
            .oneshot(request)
            .await
            .expect("request should succeed");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_graph_defaults_to_configured_namespace() {
        let (status, json) = get_json(router_with(manifest_loader()), "/api/graph").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["namespace"], "bookinfo");
        assert_eq!(json["edges"].as_array().map(Vec::len), Some(1));
        assert!(json["generatedAt"].is_string());
    }

    #[tokio::test]
    async fn test_graph_query_and_path_parameters() {
        let (status, json) = get_json(
            router_with(manifest_loader()),
            "/api/graph?namespace=reviews-ns",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["namespace"], "reviews-ns");

        let (status, json) = get_json(router_with(manifest_loader()), "/api/graph/ratings").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["namespace"], "ratings");
    }

    #[tokio::test]
    async fn test_routes_grouped_by_virtual_service() {
        let (status, json) = get_json(router_with(manifest_loader()), "/api/routes").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["namespace"], "bookinfo");
        assert_eq!(json["routes"][0]["id"], "virtualService:bookinfo/reviews");
        assert_eq!(json["routes"][0]["hosts"][0], "reviews.bookinfo.svc.cluster.local");
        assert_eq!(json["routes"][0]["edges"][0]["rules"][0], "HTTP route 0");

        let (status, json) = get_json(router_with(manifest_loader()), "/api/routes/ratings").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["namespace"], "ratings");
        assert_eq!(json["routes"][0]["namespace"], "ratings");
    }

    #[tokio::test]
    async fn test_load_failure_is_bad_gateway() {
        let mut loader = MockResourceLoader::new();
        loader
            .expect_load()
            .returning(|namespace, _| Err(meshmap_common::Error::load(namespace, "timed out")));

        let (status, json) = get_json(router_with(loader), "/api/graph/payments").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(json["namespace"], "payments");
        assert!(json["error"].as_str().unwrap_or_default().contains("timed out"));
    }
}
