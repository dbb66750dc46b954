//! Local preview of a rendered dashboard directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{Path as AxumPath, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[derive(Clone)]
pub struct PreviewState {
    pub root: PathBuf,
}

pub fn preview_app(root: impl Into<PathBuf>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/{file}", get(asset_handler))
        .with_state(Arc::new(PreviewState { root: root.into() }))
}

pub async fn serve_preview(root: PathBuf, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .with_context(|| format!("binding preview server to port {port}"))?;
    info!(
        addr = %listener.local_addr()?,
        root = %root.display(),
        "serving dashboard preview"
    );
    axum::serve(listener, preview_app(root)).await?;
    Ok(())
}

async fn index_handler(State(state): State<Arc<PreviewState>>) -> Response {
    serve_file(&state.root, "index.html").await
}

async fn asset_handler(
    State(state): State<Arc<PreviewState>>,
    AxumPath(file): AxumPath<String>,
) -> Response {
    serve_file(&state.root, &file).await
}

/// Only plain file names directly inside the root are served.
fn is_servable(name: &str) -> bool {
    !name.is_empty() && !name.starts_with('.') && !name.contains(['/', '\\'])
}

pub fn content_type_for(name: &str) -> &'static str {
    match Path::new(name).extension().and_then(|e| e.to_str()) {
        Some("html") => "text/html; charset=utf-8",
        Some("svg") => "image/svg+xml",
        Some("csv") => "text/csv; charset=utf-8",
        Some("json") => "application/json",
        Some("parquet") => "application/vnd.apache.parquet",
        _ => "application/octet-stream",
    }
}

async fn serve_file(root: &Path, name: &str) -> Response {
    if !is_servable(name) {
        return not_found();
    }
    match tokio::fs::read(root.join(name)).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, content_type_for(name))], bytes).into_response(),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => not_found(),
        Err(err) => {
            warn!(file = name, error = %err, "preview read failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(format!("Server error: {err}")),
            )
                .into_response()
        }
    }
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Html("Not found".to_string())).into_response()
}
