//! HTTP server bootstrap shared by the binary and the integration tests.

use std::future::Future;
use std::net::SocketAddr;

use tokio::net::TcpListener;

use crate::api;
use crate::app_state::AppState;

/// Serves the broadcaster on `listener` until `shutdown` resolves.
///
/// Peer addresses are exposed to handlers through `ConnectInfo` so each
/// connection can be labelled in logs.
///
/// # Errors
///
/// Returns the I/O error that stopped the accept loop.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = api::build_router(state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}
