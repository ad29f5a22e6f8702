//! Axum WebSocket upgrade handler.

use std::net::SocketAddr;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::http::header::ORIGIN;
use axum::response::IntoResponse;

use super::connection::{Connection, ConnectionSettings};
use crate::app_state::AppState;
use crate::error::ServerError;

/// Transport read buffer size in bytes.
pub const READ_BUFFER_SIZE: usize = 1024;

/// Transport write buffer size in bytes.
pub const WRITE_BUFFER_SIZE: usize = 1024;

/// Frame size ceiling handed to the transport.
///
/// Twice the message limit, so a frame slightly over the limit still reaches
/// the inbound duty and is refused there as
/// [`ConnectionError::MessageTooLarge`](crate::error::ConnectionError).
/// Anything larger is cut off by the transport itself.
#[must_use]
pub const fn transport_message_limit(settings: &ConnectionSettings) -> usize {
    settings.max_message_size.saturating_mul(2)
}

/// `GET /ws` — Upgrade HTTP connection to WebSocket.
///
/// # Errors
///
/// Returns [`ServerError::OriginRejected`] if the `Origin` header is
/// missing or not on the configured allow-list.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ServerError> {
    let origin = headers.get(ORIGIN).and_then(|value| value.to_str().ok());
    if !state.origin_policy.allows(origin) {
        let origin = origin.unwrap_or("<none>").to_string();
        tracing::warn!(%remote_addr, %origin, "websocket upgrade refused");
        return Err(ServerError::OriginRejected(origin));
    }

    let settings = state.connection_settings;
    let connection = Connection::new(remote_addr, state.hub.clone());

    Ok(ws
        .read_buffer_size(READ_BUFFER_SIZE)
        .write_buffer_size(WRITE_BUFFER_SIZE)
        .max_message_size(transport_message_limit(&settings))
        .max_frame_size(transport_message_limit(&settings))
        .on_failed_upgrade(move |err| {
            tracing::warn!(%remote_addr, error = %err, "websocket upgrade failed");
        })
        .on_upgrade(move |socket| connection.run(socket, settings)))
}
