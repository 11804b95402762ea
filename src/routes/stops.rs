use crate::commands;
use crate::state::AppState;
use axum::{
    routing::{get, patch},
    Router,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/stops",
            get(commands::stops::list_stops).post(commands::stops::open_stop),
        )
        .route("/api/stops/:id/close", patch(commands::stops::close_stop))
        .route(
            "/api/stops/:id/resolve",
            patch(commands::stops::resolve_stop),
        )
}
