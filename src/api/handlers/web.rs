//! Browser front end and the catch-all fallback.

use axum::http::Uri;
use axum::routing::{MethodRouter, get_service};
use tower_http::services::ServeFile;

use crate::app_state::AppState;
use crate::error::ServerError;

/// `GET /` — Serves the chat page from the configured index file.
///
/// Methods other than `GET` and `HEAD` are answered with `405`.
pub fn index_service(state: &AppState) -> MethodRouter<AppState> {
    get_service(ServeFile::new(state.index_path.as_path()))
}

/// Fallback for every unmatched path.
pub async fn not_found(uri: Uri) -> ServerError {
    ServerError::NotFound(uri.path().to_string())
}
