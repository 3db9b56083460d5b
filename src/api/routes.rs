//! Route table for the RPC surface.

use axum::routing::post;
use axum::Router;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::EngineHandle;

/// Build the router. One POST per named bridge function.
pub fn create_router(handle: EngineHandle) -> Router {
    Router::new()
        .route("/rpc/init", post(handlers::init))
        .route("/rpc/shutdown", post(handlers::shutdown))
        .route("/rpc/is_initialized", post(handlers::is_initialized))
        .route("/rpc/world_snapshot", post(handlers::world_snapshot))
        .route(
            "/rpc/get_pending_commands",
            post(handlers::get_pending_commands),
        )
        .route("/rpc/admin_command", post(handlers::admin_command))
        .route("/rpc/test_connection", post(handlers::test_connection))
        .route("/rpc/get_token_stats", post(handlers::get_token_stats))
        .layer(TraceLayer::new_for_http())
        .with_state(handle)
}
