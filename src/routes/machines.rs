use crate::commands;
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/machines",
            get(commands::machines::list_machines).post(commands::machines::create_machine),
        )
        .route(
            "/api/machines/:id",
            get(commands::machines::get_machine)
                .put(commands::machines::update_machine)
                .delete(commands::machines::delete_machine),
        )
}
