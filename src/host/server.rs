//! HTTP endpoint serving configuration resources to remote clients.
//!
//! `GET /{name}` returns the raw bytes of a resource with a content type taken
//! from its extension, or an empty 404 when the resource does not exist.
//! `GET /` lists the available resource names as JSON.

use crate::error::ConfigError;
use crate::host::ConfigurationService;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Build the router serving resources from `service`'s storage provider.
pub fn router(service: Arc<ConfigurationService>) -> Router {
    Router::new()
        .route("/", get(list_handler))
        .route("/*name", get(resource_handler))
        .with_state(service)
}

/// Serve resources on `listener` until `shutdown` is cancelled.
///
/// # Errors
///
/// Returns an error if the server fails while accepting connections.
pub async fn serve(
    listener: TcpListener,
    service: Arc<ConfigurationService>,
    shutdown: CancellationToken,
) -> crate::error::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Configuration endpoint listening on http://{}", addr);
    }

    axum::serve(listener, router(service))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

/// Content type for a resource, from its extension.
pub fn content_type_for(name: &str) -> &'static str {
    match name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()) {
        Some(ext) if ext == "json" => "application/json",
        Some(ext) if ext == "yaml" || ext == "yml" => "application/yaml",
        Some(ext) if ext == "toml" => "application/toml",
        _ => "application/octet-stream",
    }
}

async fn list_handler(State(service): State<Arc<ConfigurationService>>) -> Response {
    match service.storage().list_paths().await {
        Ok(paths) => Json(paths).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to list resources");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn resource_handler(
    Path(name): Path<String>,
    State(service): State<Arc<ConfigurationService>>,
) -> Response {
    match service.storage().get_configuration(&name).await {
        Ok(content) => {
            debug!(resource = %name, bytes = content.len(), "Serving resource");
            ([(header::CONTENT_TYPE, content_type_for(&name))], content).into_response()
        }
        Err(ConfigError::NotFound(_)) => {
            debug!(resource = %name, "Resource not found");
            StatusCode::NOT_FOUND.into_response()
        }
        Err(e) => {
            error!(resource = %name, error = %e, "Failed to read resource");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
