//! HTTP server for layout parsing.

use crate::config::ServerConfig;
use crate::engine::{
    ErrorResponse, ParseRequest, ParseResponse, ServerError, build_pipeline, request_bytes,
};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use oar_layout::core::LayoutError;
use oar_layout::pipeline::LayoutPipeline;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Largest accepted request body.
const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Application state shared across handlers
struct AppState {
    pipeline: Arc<LayoutPipeline>,
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// Run the HTTP server
pub async fn run_server(
    config: ServerConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Initializing layout pipeline...");
    let options = config.pipeline.clone();
    let pipeline = tokio::task::spawn_blocking(move || build_pipeline(&options)).await??;
    info!("Layout pipeline initialized successfully");

    let state = Arc::new(AppState {
        pipeline: Arc::new(pipeline),
    });

    // Configure CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/parse/image", post(parse_image_handler))
        .route("/api/v1/parse", post(api_parse_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::clone(&state));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| format!("Invalid address: {}", e))?;

    info!("Server listening on http://{}", addr);
    info!("Endpoints:");
    info!("  GET  /health        - Health check");
    info!("  POST /parse/image   - Parse a raw image body");
    info!("  POST /api/v1/parse  - Parse {{url}} or {{image_base64}}");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The pipeline owns blocking HTTP clients, which may not be dropped on the runtime.
    tokio::task::spawn_blocking(move || drop(state)).await?;
    info!("Server shutdown complete");
    Ok(())
}

/// Health check endpoint
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Parses an image sent as the raw request body
async fn parse_image_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    info!(request_id = %request_id, bytes = body.len(), "Processing raw image request");
    parse(state, request_id, body.to_vec()).await
}

/// Parses an image given by URL or inline base64
async fn api_parse_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ParseRequest>, JsonRejection>,
) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();

    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            warn!(request_id = %request_id, error = %rejection, "Rejected request body");
            return error_response(StatusCode::BAD_REQUEST, request_id, rejection.body_text());
        }
    };
    info!(
        request_id = %request_id,
        url = request.url.as_deref().unwrap_or("<inline>"),
        "Processing parse request"
    );

    match request_bytes(request).await {
        Ok(bytes) => parse(state, request_id, bytes).await,
        Err(e) => {
            error!(request_id = %request_id, error = %e, "Failed to read input");
            error_response(status_for(&e), request_id, e)
        }
    }
}

async fn parse(state: Arc<AppState>, request_id: String, bytes: Vec<u8>) -> Response {
    let start = Instant::now();
    let pipeline = Arc::clone(&state.pipeline);
    let source_id = request_id.clone();

    let result =
        tokio::task::spawn_blocking(move || pipeline.process_bytes(source_id, &bytes)).await;

    let document = match result {
        Ok(Ok(document)) => document,
        Ok(Err(e)) => {
            let e = ServerError::from(e);
            error!(request_id = %request_id, error = %e, "Layout parsing failed");
            return error_response(status_for(&e), request_id, e);
        }
        Err(e) => {
            error!(request_id = %request_id, error = %e, "Layout worker panicked");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, request_id, e);
        }
    };

    let total_ms = start.elapsed().as_secs_f64() * 1000.0;
    info!(
        request_id = %request_id,
        nodes = document.nodes().count(),
        complete = document.is_complete(),
        total_ms,
        "Layout parsing completed"
    );

    (
        StatusCode::OK,
        Json(ParseResponse::new(request_id, document, total_ms)),
    )
        .into_response()
}

fn status_for(error: &ServerError) -> StatusCode {
    match error {
        ServerError::BadRequest(_) | ServerError::Download(_) => StatusCode::BAD_REQUEST,
        ServerError::Layout(e) => match e {
            LayoutError::MalformedInput { .. } | LayoutError::ImageLoad(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            LayoutError::NoUsableDetections { .. }
            | LayoutError::ModelUnavailable { .. }
            | LayoutError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        },
    }
}

fn error_response(status: StatusCode, request_id: String, error: impl ToString) -> Response {
    (status, Json(ErrorResponse::new(request_id, error))).into_response()
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let malformed = ServerError::from(LayoutError::malformed_input("not an image"));
        assert_eq!(status_for(&malformed), StatusCode::UNPROCESSABLE_ENTITY);

        let cancelled = ServerError::from(LayoutError::Cancelled);
        assert_eq!(status_for(&cancelled), StatusCode::SERVICE_UNAVAILABLE);

        let unavailable = ServerError::from(LayoutError::model_unavailable("layout", "missing"));
        assert_eq!(status_for(&unavailable), StatusCode::SERVICE_UNAVAILABLE);

        let config = ServerError::from(LayoutError::config_error_detailed("pipeline", "bad"));
        assert_eq!(status_for(&config), StatusCode::INTERNAL_SERVER_ERROR);

        let bad = ServerError::BadRequest("missing url".to_string());
        assert_eq!(status_for(&bad), StatusCode::BAD_REQUEST);
    }
}
