use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::db::{self, Shift};
use crate::error::{ShopfloorError, ShopfloorResult};
use crate::middleware::auth::{Claims, Role};
use crate::state::AppState;

fn validate_time_of_day(raw: &str) -> ShopfloorResult<()> {
    let ok = matches!(raw.split(':').collect::<Vec<_>>().as_slice(), [h, m]
        if h.parse::<u32>().map(|h| h < 24).unwrap_or(false)
        && m.parse::<u32>().map(|m| m < 60).unwrap_or(false));
    if ok {
        Ok(())
    } else {
        Err(ShopfloorError::Validation(format!(
            "Invalid time of day (expected HH:MM): {}",
            raw
        )))
    }
}

pub async fn list_shifts(State(state): State<AppState>) -> ShopfloorResult<Json<Vec<Shift>>> {
    let shifts = sqlx::query_as::<_, Shift>("SELECT * FROM shifts ORDER BY sort_order ASC")
        .fetch_all(&state.pool)
        .await?;
    Ok(Json(shifts))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftRequest {
    pub name: String,
    pub start_time: String,
    pub end_time: String,
    pub color: Option<String>,
}

pub async fn create_shift(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<ShiftRequest>,
) -> ShopfloorResult<Json<Shift>> {
    claims.require(Role::Admin)?;

    if payload.name.trim().is_empty() {
        return Err(ShopfloorError::Validation(
            "Missing required fields".to_string(),
        ));
    }
    validate_time_of_day(&payload.start_time)?;
    validate_time_of_day(&payload.end_time)?;

    let max_order: Option<i32> = sqlx::query_scalar("SELECT MAX(sort_order) FROM shifts")
        .fetch_one(&state.pool)
        .await?;

    let shift = sqlx::query_as::<_, Shift>(
        "INSERT INTO shifts (name, start_time, end_time, color, sort_order)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING *",
    )
    .bind(&payload.name)
    .bind(&payload.start_time)
    .bind(&payload.end_time)
    .bind(payload.color.as_deref().unwrap_or("#3b82f6"))
    .bind(max_order.unwrap_or(0) + 1)
    .fetch_one(&state.pool)
    .await?;

    db::record_audit(
        &state.pool,
        Some(claims.user_id),
        "CREATE",
        "shift",
        Some(shift.id.to_string()),
    )
    .await;

    Ok(Json(shift))
}

pub async fn update_shift(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i32>,
    Json(payload): Json<ShiftRequest>,
) -> ShopfloorResult<Json<Shift>> {
    claims.require(Role::Admin)?;
    validate_time_of_day(&payload.start_time)?;
    validate_time_of_day(&payload.end_time)?;

    let shift = sqlx::query_as::<_, Shift>(
        "UPDATE shifts SET name = $1, start_time = $2, end_time = $3, color = COALESCE($4, color)
         WHERE id = $5
         RETURNING *",
    )
    .bind(&payload.name)
    .bind(&payload.start_time)
    .bind(&payload.end_time)
    .bind(&payload.color)
    .bind(id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ShopfloorError::NotFound("Shift not found".to_string()))?;

    Ok(Json(shift))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetActiveRequest {
    pub is_active: bool,
}

pub async fn set_shift_active(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i32>,
    Json(payload): Json<SetActiveRequest>,
) -> ShopfloorResult<Json<Shift>> {
    claims.require(Role::Admin)?;

    let shift =
        sqlx::query_as::<_, Shift>("UPDATE shifts SET is_active = $1 WHERE id = $2 RETURNING *")
            .bind(payload.is_active)
            .bind(id)
            .fetch_optional(&state.pool)
            .await?
            .ok_or_else(|| ShopfloorError::NotFound("Shift not found".to_string()))?;

    Ok(Json(shift))
}

pub async fn delete_shift(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i32>,
) -> ShopfloorResult<Json<Value>> {
    claims.require(Role::Admin)?;

    let result = sqlx::query("DELETE FROM shifts WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ShopfloorError::NotFound("Shift not found".to_string()));
    }

    Ok(Json(json!({ "success": true })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_times() {
        assert!(validate_time_of_day("00:00").is_ok());
        assert!(validate_time_of_day("23:59").is_ok());
        assert!(validate_time_of_day("06:30").is_ok());
    }

    #[test]
    fn rejects_malformed_times() {
        assert!(validate_time_of_day("24:00").is_err());
        assert!(validate_time_of_day("12:60").is_err());
        assert!(validate_time_of_day("noon").is_err());
        assert!(validate_time_of_day("12").is_err());
        assert!(validate_time_of_day("").is_err());
    }
}
