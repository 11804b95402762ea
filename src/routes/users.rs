use crate::commands;
use crate::state::AppState;
use axum::{
    routing::{get, patch},
    Router,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/users",
            get(commands::users::list_users).post(commands::users::create_user),
        )
        .route(
            "/api/users/:id",
            get(commands::users::get_user)
                .put(commands::users::update_user)
                .delete(commands::users::delete_user),
        )
        .route(
            "/api/users/:id/password",
            patch(commands::users::change_password),
        )
}
