//! HTTP surface.
//!
//! JSON endpoints under `/talks` (and the `/items` alias) plus a static
//! file fallback for everything else.

mod handlers;

use crate::config::ServerConfig;
use crate::error::{Result, ServiceError};
use crate::service::Service;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

#[derive(Clone)]
pub(crate) struct AppState {
    service: Service,
}

/// Build the router. Paths the API does not claim are served from
/// `public_dir`.
pub fn router(service: Service, public_dir: impl AsRef<Path>) -> Router {
    let state = AppState { service };

    let mut app = Router::new().route("/health", get(handlers::health));
    for prefix in ["/talks", "/items"] {
        app = app
            .route(prefix, get(handlers::list_items))
            .route(
                &format!("{prefix}/{{key}}"),
                get(handlers::get_item)
                    .put(handlers::put_item)
                    .delete(handlers::delete_item),
            )
            .route(
                &format!("{prefix}/{{key}}/comments"),
                post(handlers::post_comment),
            );
    }

    app.fallback_service(ServeDir::new(public_dir.as_ref()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until `shutdown` is cancelled.
///
/// On shutdown every parked poll is answered with an empty change set so
/// that graceful shutdown does not wait out the poll timeout.
pub async fn run(config: &ServerConfig, service: Service, shutdown: CancellationToken) -> Result<()> {
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ServiceError::Config(format!("failed to bind {addr}: {e}")))?;

    info!(addr = %addr, public_dir = ?config.public_dir, "HTTP server listening");

    let app = router(service.clone(), &config.public_dir);
    let signal = async move {
        shutdown.cancelled().await;
        let released = service.release_all();
        info!(released, "shutting down HTTP server");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(signal)
        .await?;

    Ok(())
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServiceError::MalformedBody(_)
            | ServiceError::ValidationFailure(_)
            | ServiceError::InvalidParameter(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Io(_) | ServiceError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if self.is_client_error() {
            debug!(status = status.as_u16(), "request rejected: {}", self);
        } else {
            error!("HTTP error: {}", self);
        }

        (status, self.to_string()).into_response()
    }
}
