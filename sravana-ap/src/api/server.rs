//! HTTP server setup and routing

use crate::error::{Error, Result};
use crate::playback::Player;
use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub player: Arc<Player>,
    pub port: u16,
}

/// Build the router with every control endpoint
pub fn create_router(ctx: AppContext) -> Router {
    use super::handlers;

    Router::new()
        .route("/health", get(handlers::health))
        .route("/build_info", get(handlers::build_info))

        // Session lifecycle
        .route("/session/open", post(handlers::open_session))
        .route("/session/close", post(handlers::close_session))

        // Transport
        .route("/playback/state", get(handlers::get_state))
        .route("/playback/play", post(handlers::play))
        .route("/playback/pause", post(handlers::pause))
        .route("/playback/toggle", post(handlers::toggle))
        .route("/playback/seek", post(handlers::seek))
        .route("/playback/skip", post(handlers::skip))
        .route("/playback/chapter", post(handlers::go_to_chapter))
        .route("/playback/next_chapter", post(handlers::next_chapter))
        .route("/playback/previous_chapter", post(handlers::previous_chapter))
        .route("/playback/volume", post(handlers::set_volume))
        .route("/playback/mute", post(handlers::set_mute))
        .route("/playback/rate", post(handlers::set_rate))

        // Sleep timer
        .route(
            "/sleep_timer",
            get(handlers::get_sleep_timer)
                .post(handlers::arm_sleep_timer)
                .delete(handlers::cancel_sleep_timer),
        )

        // Ambient sound
        .route("/ambient", get(handlers::get_ambient).post(handlers::select_ambient))
        .route("/ambient/profiles", get(handlers::list_ambient_profiles))
        .route("/ambient/volume", post(handlers::set_ambient_volume))
        .route("/ambient/chime", post(handlers::chime))

        .route("/input/key", post(handlers::key_press))

        // SSE event stream
        .route("/events", get(super::sse::event_stream))

        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve the API until `shutdown` resolves
pub async fn run<F>(ctx: AppContext, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = SocketAddr::from(([0, 0, 0, 0], ctx.port));
    let app = create_router(ctx);

    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))?;

    Ok(())
}
