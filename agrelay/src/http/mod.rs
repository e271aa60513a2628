// Module: http
// Websocket signaling endpoint plus the small JSON surface around it.

pub mod dev;
pub mod error;
pub mod stats;
pub mod websocket;

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use agrelay_sfu::{Error, Result, SfuRegistry};

pub use error::{AppError, AppResult};

/// Environment variable holding the symmetric token key.
pub const TOKEN_KEY_ENV: &str = "AG_WEBRTC_SFU_KEY";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SfuRegistry>,
}

/// Key fetcher for token validation. The hint is unused in the
/// single-key deployment model; it is carried through so keyed-per-hint
/// deployments only have to swap this function.
pub fn token_key(_hint: &str) -> Result<String> {
    std::env::var(TOKEN_KEY_ENV)
        .map_err(|_| Error::Authentication(format!("{TOKEN_KEY_ENV} is not set")))
}

/// Create the HTTP router with all routes
pub fn create_router(registry: Arc<SfuRegistry>, dev_mode: bool) -> Router {
    let state = AppState { registry };

    let mut router = Router::new()
        .route("/websocket", get(websocket::websocket_handler))
        .route("/get.stats", get(stats::get_stats));

    if dev_mode {
        tracing::info!("dev mode is on");
        router = router
            .route("/", get(dev::index))
            .route("/get.token", get(dev::get_token));
    }

    router
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use agrelay_sfu::SfuConfig;

    #[tokio::test]
    async fn router_builds_with_and_without_dev_routes() {
        let registry = SfuRegistry::new(SfuConfig::default());
        let _ = create_router(Arc::clone(&registry), false);
        let _ = create_router(registry, true);
    }
}
