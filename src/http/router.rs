//! Router configuration for the HTTP API.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers;
use super::state::AppState;

/// Create the application router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let announce = Router::new()
        .route("/station", post(handlers::announce_station))
        .route("/promo", post(handlers::announce_promo))
        .route("/safety", post(handlers::announce_safety))
        .route("/stop", post(handlers::stop_announcement));

    let api = Router::new()
        .route(
            "/schedule",
            get(handlers::get_schedule)
                .post(handlers::update_schedule)
                .put(handlers::update_schedule),
        )
        .route("/scheduler/status", get(handlers::scheduler_status))
        .route("/status", get(handlers::status))
        .route("/config", get(handlers::config))
        .route(
            "/audio/volume",
            get(handlers::get_volume).post(handlers::set_volume),
        )
        .route("/audio/test", post(handlers::test_audio))
        .route("/queue/status", get(handlers::queue_status))
        .route("/queue/history", get(handlers::queue_history))
        .nest("/announce", announce);

    Router::new()
        .route("/scheduler_status", get(handlers::scheduler_status))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annunciator::Annunciator;
    use crate::config::Settings;
    use crate::player::NullOutput;
    use std::sync::Arc;

    #[test]
    fn router_builds() {
        let dir = tempfile::tempdir().unwrap();
        let annunciator =
            Annunciator::with_output(Settings::with_base_dir(dir.path()), Arc::new(NullOutput::default()))
                .unwrap();
        let _router = create_router(AppState::new(Arc::new(annunciator)));
    }
}
