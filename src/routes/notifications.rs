use crate::commands;
use crate::state::AppState;
use axum::{
    routing::{delete, get, patch},
    Router,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/notifications",
            get(commands::notifications::list_notifications),
        )
        .route(
            "/api/notifications/unread-count",
            get(commands::notifications::unread_count),
        )
        .route(
            "/api/notifications/:id",
            delete(commands::notifications::delete_notification),
        )
        .route(
            "/api/notifications/:id/read",
            patch(commands::notifications::mark_read),
        )
}
