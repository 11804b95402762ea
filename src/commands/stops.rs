use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;

use crate::commands::RangeQuery;
use crate::db::{self, Stop, StopDetail};
use crate::error::{ShopfloorError, ShopfloorResult};
use crate::middleware::auth::Claims;
use crate::state::AppState;

pub async fn list_stops(
    State(state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> ShopfloorResult<Json<Vec<StopDetail>>> {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);

    let stops = sqlx::query_as::<_, StopDetail>(
        "SELECT s.id, s.machine_id, s.reason_id, s.job_id, s.operator_id,
                s.start_time, s.end_time, s.duration, s.is_resolved,
                s.resolution_note, s.is_tool_change, s.actual_tool_change_time,
                r.reason_code, r.reason_text, r.category, u.name AS operator_name
         FROM stops s
         JOIN stop_reasons r ON r.id = s.reason_id
         LEFT JOIN users u ON u.id = s.operator_id
         WHERE ($1::int IS NULL OR s.machine_id = $1)
         ORDER BY s.start_time DESC
         LIMIT $2",
    )
    .bind(query.machine_id)
    .bind(limit)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(stops))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenStopRequest {
    pub machine_id: i32,
    pub reason_id: i32,
    pub job_id: Option<i32>,
    pub is_tool_change: Option<bool>,
}

pub async fn open_stop(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<OpenStopRequest>,
) -> ShopfloorResult<Json<Stop>> {
    let reason: Option<(String,)> =
        sqlx::query_as("SELECT reason_text FROM stop_reasons WHERE id = $1 AND is_active = TRUE")
            .bind(payload.reason_id)
            .fetch_optional(&state.pool)
            .await?;
    let Some((reason_text,)) = reason else {
        return Err(ShopfloorError::Validation(
            "Unknown or inactive stop reason".to_string(),
        ));
    };

    let stop = sqlx::query_as::<_, Stop>(
        "INSERT INTO stops (machine_id, reason_id, job_id, operator_id, is_tool_change)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING *",
    )
    .bind(payload.machine_id)
    .bind(payload.reason_id)
    .bind(payload.job_id)
    .bind(claims.user_id)
    .bind(payload.is_tool_change.unwrap_or(false))
    .fetch_one(&state.pool)
    .await?;

    db::record_event(
        &state.pool,
        payload.machine_id,
        "STOP_OPENED",
        "WARNING",
        &format!("Stop opened: {}", reason_text),
    )
    .await?;

    Ok(Json(stop))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseStopRequest {
    pub actual_tool_change_time: Option<i32>,
}

pub async fn close_stop(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<CloseStopRequest>,
) -> ShopfloorResult<Json<Stop>> {
    // The open check rides on the UPDATE itself, so two racing closes cannot
    // both succeed and double-count the downtime.
    let stop = sqlx::query_as::<_, Stop>(
        "UPDATE stops
         SET end_time = NOW(),
             duration = EXTRACT(EPOCH FROM NOW() - start_time)::int,
             actual_tool_change_time = $2
         WHERE id = $1 AND end_time IS NULL
         RETURNING *",
    )
    .bind(id)
    .bind(payload.actual_tool_change_time)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ShopfloorError::NotFound("Open stop not found".to_string()))?;

    // Fold the finished stop into the machine's lifetime downtime counter.
    sqlx::query("UPDATE machines SET total_downtime = total_downtime + $1 WHERE id = $2")
        .bind(stop.duration.unwrap_or(0) as i64)
        .bind(stop.machine_id)
        .execute(&state.pool)
        .await?;

    db::record_event(
        &state.pool,
        stop.machine_id,
        "STOP_CLOSED",
        "INFO",
        &format!("Stop closed after {}s", stop.duration.unwrap_or(0)),
    )
    .await?;

    Ok(Json(stop))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveStopRequest {
    pub resolution_note: Option<String>,
}

pub async fn resolve_stop(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i32>,
    Json(payload): Json<ResolveStopRequest>,
) -> ShopfloorResult<Json<Stop>> {
    let stop = sqlx::query_as::<_, Stop>(
        "UPDATE stops
         SET is_resolved = TRUE, resolved_by = $2, resolution_note = $3
         WHERE id = $1
         RETURNING *",
    )
    .bind(id)
    .bind(claims.user_id)
    .bind(&payload.resolution_note)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ShopfloorError::NotFound("Stop not found".to_string()))?;

    Ok(Json(stop))
}
