//! Router composition, listener binding, and the serve loop.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::app_state::AppState;
use crate::config::ServerConfig;
use crate::error::RelayError;
use crate::ws::handler::ws_handler;

/// Builds the complete router: `/health` plus the registration path.
pub fn build_router(state: AppState) -> Router {
    let path = state.config.path.clone();
    Router::new()
        .merge(api::build_router())
        .route(&path, get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds the listen address.
///
/// # Errors
///
/// Returns [`RelayError::ListenFailure`] if the address cannot be bound.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener, RelayError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| RelayError::ListenFailure { addr, source })
}

/// Serves the relay on `listener` until the listener fails or `shutdown`
/// completes.
///
/// On shutdown every registered connection is unregistered and closed.
///
/// # Errors
///
/// Returns [`RelayError::ListenFailure`] if accepting connections fails.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<(), RelayError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener
        .local_addr()
        .map_err(|source| RelayError::ListenFailure {
            addr: state.config.listen_addr,
            source,
        })?;
    let registry = Arc::clone(state.registry());
    let app = build_router(state);

    tracing::info!(%addr, "server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown.await;
        let closed = registry.close_all().await;
        tracing::info!(closed, "shutting down, closed registered connections");
    })
    .await
    .map_err(|source| RelayError::ListenFailure { addr, source })
}

/// Binds `config.listen_addr` and serves until the listener fails or
/// `shutdown` completes.
///
/// # Errors
///
/// Returns [`RelayError::ListenFailure`] if binding or accepting fails.
pub async fn run<F>(config: ServerConfig, shutdown: F) -> Result<(), RelayError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = bind(config.listen_addr).await?;
    tracing::info!(
        addr = %config.listen_addr,
        path = %config.path,
        public = config.is_public(),
        "starting chat relay"
    );
    serve(listener, AppState::new(config), shutdown).await
}
