use crate::commands;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/stop-reasons",
            get(commands::stop_reasons::list_stop_reasons)
                .post(commands::stop_reasons::create_stop_reason),
        )
        .route(
            "/api/stop-reasons/reorder",
            post(commands::stop_reasons::reorder_stop_reasons),
        )
        .route(
            "/api/stop-reasons/:id",
            get(commands::stop_reasons::get_stop_reason)
                .put(commands::stop_reasons::update_stop_reason)
                .patch(commands::stop_reasons::set_stop_reason_active)
                .delete(commands::stop_reasons::delete_stop_reason),
        )
}
