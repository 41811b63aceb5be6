//! HTTP endpoint: `POST /create-pdf` turns a page's images into a download.

use crate::config::HarvestConfig;
use crate::error::HarvestError;
use crate::harvest::Harvester;
use crate::pipeline::fetch::ImageFetcher;
use crate::pipeline::render::PageRenderer;
use crate::pipeline::request::RenderRequest;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::Semaphore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Filename offered to the client in `Content-Disposition`.
pub const DOWNLOAD_FILENAME: &str = "generated.pdf";

/// Default cap on simultaneous rendering sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 2;

/// Shared application state.
pub struct AppState<R, F> {
    harvester: Harvester<R, F>,
    sessions: Semaphore,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePdfBody {
    #[serde(default)]
    pub target_url: Option<String>,
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
}

impl IntoResponse for HarvestError {
    fn into_response(self) -> Response {
        let status = match &self {
            HarvestError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            HarvestError::NoImagesFound { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            warn!("Request rejected: {}", self);
        }

        let body = ErrorResponse {
            error: self.kind(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Build the router around an existing harvester.
pub fn router<R, F>(harvester: Harvester<R, F>, max_sessions: usize) -> Router
where
    R: PageRenderer + 'static,
    F: ImageFetcher + 'static,
{
    let state = Arc::new(AppState {
        harvester,
        sessions: Semaphore::new(max_sessions.max(1)),
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/create-pdf", post(create_pdf::<R, F>))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind `addr` and serve until Ctrl-C or SIGTERM.
pub async fn serve(
    config: &HarvestConfig,
    addr: SocketAddr,
    max_sessions: usize,
) -> Result<(), HarvestError> {
    let app = router(Harvester::from_config(config)?, max_sessions);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| HarvestError::Internal(format!("Failed to bind {}: {}", addr, e)))?;
    info!(
        "scrape2pdf v{} listening on {} ({} concurrent sessions)",
        env!("CARGO_PKG_VERSION"),
        addr,
        max_sessions.max(1)
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| HarvestError::Internal(format!("Server error: {}", e)))?;

    info!("Server shutdown complete");
    Ok(())
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn create_pdf<R, F>(
    State(state): State<Arc<AppState<R, F>>>,
    body: Result<Json<CreatePdfBody>, JsonRejection>,
) -> Result<Response, HarvestError>
where
    R: PageRenderer + 'static,
    F: ImageFetcher + 'static,
{
    let target_url = match body {
        Ok(Json(body)) => body.target_url.unwrap_or_default(),
        Err(rejection) => {
            return Err(HarvestError::InvalidRequest {
                reason: format!("URL is required ({})", rejection.body_text()),
            })
        }
    };
    let request = RenderRequest::new(&target_url)?;

    let _permit = state
        .sessions
        .acquire()
        .await
        .map_err(|_| HarvestError::Internal("Server is shutting down".into()))?;
    info!("Creating PDF for {}", request.as_str());

    let output = state.harvester.run(&request).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={}", DOWNLOAD_FILENAME),
            ),
        ],
        output.pdf,
    )
        .into_response())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FetchError, RenderError};
    use crate::harvest::tests::{FakeFetcher, FakeRenderer, Route};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn app(renderer: FakeRenderer, fetcher: FakeFetcher) -> Router {
        router(
            Harvester::new(renderer, fetcher, HarvestConfig::default()),
            DEFAULT_MAX_SESSIONS,
        )
    }

    fn post_json(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/create-pdf")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn error_body(resp: Response) -> serde_json::Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn missing_url_is_bad_request() {
        for body in [r#"{}"#, r#"{"targetUrl":""}"#, r#"{"targetUrl":"gallery.html"}"#] {
            let resp = app(FakeRenderer::with(&[]), FakeFetcher::default())
                .oneshot(post_json(body))
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{body}");
            let json = error_body(resp).await;
            assert_eq!(json["error"], "invalid_request");
        }
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request() {
        let resp = app(FakeRenderer::with(&[]), FakeFetcher::default())
            .oneshot(post_json("not json"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn empty_page_is_not_found() {
        let resp = app(FakeRenderer::with(&[]), FakeFetcher::default())
            .oneshot(post_json(r#"{"targetUrl":"https://example.com/empty"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let json = error_body(resp).await;
        assert_eq!(json["error"], "no_images_found");
        assert!(json["message"].as_str().unwrap().contains("No images found"));
    }

    #[tokio::test]
    async fn all_fetches_failed_is_server_error() {
        let fetcher = FakeFetcher::default().route(
            "https://cdn/a.webp",
            0,
            Route::Fail(FetchError::UnsupportedFormat {
                url: "https://cdn/a.webp".into(),
                content_type: "image/webp".into(),
            }),
        );
        let resp = app(FakeRenderer::with(&["https://cdn/a.webp"]), fetcher)
            .oneshot(post_json(r#"{"targetUrl":"https://example.com/blocked"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = error_body(resp).await;
        assert_eq!(json["error"], "all_fetches_failed");
        assert!(json["message"]
            .as_str()
            .unwrap()
            .contains("Could not fetch valid images"));
    }

    #[tokio::test]
    async fn navigation_timeout_is_server_error() {
        let renderer = FakeRenderer {
            page: Err(RenderError::NavigationTimeout {
                url: "https://example.com/slow".into(),
                secs: 180,
            }),
        };
        let resp = app(renderer, FakeFetcher::default())
            .oneshot(post_json(r#"{"targetUrl":"https://example.com/slow"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error_body(resp).await["error"], "navigation_timeout");
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let resp = app(FakeRenderer::with(&[]), FakeFetcher::default())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(error_body(resp).await["status"], "ok");
    }
}
