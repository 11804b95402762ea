use crate::commands;
use crate::state::AppState;
use axum::{
    routing::{get, put},
    Router,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/settings", get(commands::settings::list_settings))
        .route(
            "/api/settings/general",
            put(commands::settings::update_general_settings),
        )
        .route(
            "/api/settings/alert",
            put(commands::settings::update_alert_settings),
        )
        .route(
            "/api/settings/defaults",
            put(commands::settings::update_default_settings),
        )
        .route(
            "/api/settings/shifts",
            get(commands::shifts::list_shifts).post(commands::shifts::create_shift),
        )
        .route(
            "/api/settings/shifts/:id",
            put(commands::shifts::update_shift)
                .patch(commands::shifts::set_shift_active)
                .delete(commands::shifts::delete_shift),
        )
}
