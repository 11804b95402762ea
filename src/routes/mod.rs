use crate::state::AppState;
use axum::Router;

pub mod analytics;
pub mod auth;
pub mod machines;
pub mod notifications;
pub mod settings;
pub mod stop_reasons;
pub mod stops;
pub mod users;

pub fn create_router() -> Router<AppState> {
    Router::new()
        .merge(auth::router())
        .merge(users::router())
        .merge(machines::router())
        .merge(stops::router())
        .merge(stop_reasons::router())
        .merge(settings::router())
        .merge(notifications::router())
        .merge(analytics::router())
}
