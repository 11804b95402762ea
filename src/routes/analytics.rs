use crate::commands;
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/analytics/kpi", get(commands::analytics::kpi))
        .route("/api/analytics/oee", get(commands::analytics::oee))
        .route("/api/analytics/downtime", get(commands::analytics::downtime))
        .route(
            "/api/analytics/production",
            get(commands::analytics::production),
        )
        .route(
            "/api/analytics/utilization",
            get(commands::analytics::utilization),
        )
        .route(
            "/api/analytics/top-reasons",
            get(commands::analytics::top_reasons),
        )
        .route("/api/analytics/shifts", get(commands::analytics::shifts))
}
