use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::db::{self, StopReason, StopReasonWithCount};
use crate::error::{ShopfloorError, ShopfloorResult};
use crate::middleware::auth::{Claims, Role};
use crate::state::AppState;

const STOP_CATEGORIES: [&str; 8] = [
    "SAFETY",
    "MECHANICAL",
    "MATERIAL",
    "QUALITY",
    "SETUP",
    "MAINTENANCE",
    "OPERATOR",
    "OTHER",
];

fn validate_category(category: &str) -> ShopfloorResult<()> {
    if STOP_CATEGORIES.contains(&category) {
        Ok(())
    } else {
        Err(ShopfloorError::Validation(format!(
            "Unknown stop category: {}",
            category
        )))
    }
}

fn validate_detection_type(detection_type: &str) -> ShopfloorResult<()> {
    match detection_type {
        "AUTOMATIC" | "MANUAL" => Ok(()),
        other => Err(ShopfloorError::Validation(format!(
            "Unknown detection type: {}",
            other
        ))),
    }
}

const REASON_WITH_COUNT_COLUMNS: &str =
    "r.id, r.reason_code, r.reason_text, r.category, r.detection_type,
     r.standard_duration, r.icon, r.sort_order, r.is_active,
     (SELECT COUNT(*) FROM stops s WHERE s.reason_id = r.id) AS stop_count,
     r.created_at, r.updated_at";

pub async fn list_stop_reasons(
    State(state): State<AppState>,
) -> ShopfloorResult<Json<Vec<StopReasonWithCount>>> {
    let reasons = sqlx::query_as::<_, StopReasonWithCount>(&format!(
        "SELECT {} FROM stop_reasons r ORDER BY r.sort_order ASC",
        REASON_WITH_COUNT_COLUMNS
    ))
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(reasons))
}

pub async fn get_stop_reason(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ShopfloorResult<Json<StopReasonWithCount>> {
    let reason = sqlx::query_as::<_, StopReasonWithCount>(&format!(
        "SELECT {} FROM stop_reasons r WHERE r.id = $1",
        REASON_WITH_COUNT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ShopfloorError::NotFound("Stop reason not found".to_string()))?;
    Ok(Json(reason))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopReasonRequest {
    pub reason_code: String,
    pub reason_text: String,
    pub category: String,
    pub detection_type: String,
    pub standard_duration: Option<i32>,
    pub icon: Option<String>,
}

pub async fn create_stop_reason(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<StopReasonRequest>,
) -> ShopfloorResult<Json<StopReason>> {
    claims.require(Role::Supervisor)?;

    if payload.reason_code.trim().is_empty() || payload.reason_text.trim().is_empty() {
        return Err(ShopfloorError::Validation(
            "Reason code and text are required".to_string(),
        ));
    }
    validate_category(&payload.category)?;
    validate_detection_type(&payload.detection_type)?;

    // New reasons go to the end of the display order.
    let max_order: Option<i32> = sqlx::query_scalar("SELECT MAX(sort_order) FROM stop_reasons")
        .fetch_one(&state.pool)
        .await?;

    let reason = sqlx::query_as::<_, StopReason>(
        "INSERT INTO stop_reasons
             (reason_code, reason_text, category, detection_type, standard_duration, icon, sort_order)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         RETURNING *",
    )
    .bind(&payload.reason_code)
    .bind(&payload.reason_text)
    .bind(&payload.category)
    .bind(&payload.detection_type)
    .bind(payload.standard_duration)
    .bind(&payload.icon)
    .bind(max_order.unwrap_or(0) + 1)
    .fetch_one(&state.pool)
    .await?;

    db::record_audit(
        &state.pool,
        Some(claims.user_id),
        "CREATE",
        "stop_reason",
        Some(reason.id.to_string()),
    )
    .await;

    Ok(Json(reason))
}

pub async fn update_stop_reason(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i32>,
    Json(payload): Json<StopReasonRequest>,
) -> ShopfloorResult<Json<StopReason>> {
    claims.require(Role::Supervisor)?;
    validate_category(&payload.category)?;
    validate_detection_type(&payload.detection_type)?;

    let reason = sqlx::query_as::<_, StopReason>(
        "UPDATE stop_reasons
         SET reason_code = $1, reason_text = $2, category = $3, detection_type = $4,
             standard_duration = $5, icon = $6, updated_at = NOW()
         WHERE id = $7
         RETURNING *",
    )
    .bind(&payload.reason_code)
    .bind(&payload.reason_text)
    .bind(&payload.category)
    .bind(&payload.detection_type)
    .bind(payload.standard_duration)
    .bind(&payload.icon)
    .bind(id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ShopfloorError::NotFound("Stop reason not found".to_string()))?;

    db::record_audit(
        &state.pool,
        Some(claims.user_id),
        "UPDATE",
        "stop_reason",
        Some(id.to_string()),
    )
    .await;

    Ok(Json(reason))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetActiveRequest {
    pub is_active: bool,
}

pub async fn set_stop_reason_active(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i32>,
    Json(payload): Json<SetActiveRequest>,
) -> ShopfloorResult<Json<StopReason>> {
    claims.require(Role::Supervisor)?;

    let reason = sqlx::query_as::<_, StopReason>(
        "UPDATE stop_reasons SET is_active = $1, updated_at = NOW() WHERE id = $2 RETURNING *",
    )
    .bind(payload.is_active)
    .bind(id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ShopfloorError::NotFound("Stop reason not found".to_string()))?;

    Ok(Json(reason))
}

/// Reasons referenced by any stop cannot be deleted, only deactivated.
pub async fn delete_stop_reason(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i32>,
) -> ShopfloorResult<Json<Value>> {
    claims.require(Role::Admin)?;

    let stop_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM stops WHERE reason_id = $1")
        .bind(id)
        .fetch_one(&state.pool)
        .await?;
    if stop_count.0 > 0 {
        return Err(ShopfloorError::Validation(
            "Cannot delete stop reason that is in use. Please deactivate it instead.".to_string(),
        ));
    }

    let result = sqlx::query("DELETE FROM stop_reasons WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ShopfloorError::NotFound(
            "Stop reason not found".to_string(),
        ));
    }

    db::record_audit(
        &state.pool,
        Some(claims.user_id),
        "DELETE",
        "stop_reason",
        Some(id.to_string()),
    )
    .await;

    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderItem {
    pub id: i32,
    pub sort_order: i32,
}

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub items: Vec<ReorderItem>,
}

/// All sort-order updates run inside one transaction: a failure partway
/// rolls everything back and leaves the previous ordering untouched.
pub async fn reorder_stop_reasons(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<ReorderRequest>,
) -> ShopfloorResult<Json<Value>> {
    claims.require(Role::Supervisor)?;

    let mut tx = state.pool.begin().await?;
    for item in &payload.items {
        sqlx::query("UPDATE stop_reasons SET sort_order = $1, updated_at = NOW() WHERE id = $2")
            .bind(item.sort_order)
            .bind(item.id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    db::record_audit(
        &state.pool,
        Some(claims.user_id),
        "REORDER",
        "stop_reason",
        None,
    )
    .await;

    Ok(Json(json!({ "success": true })))
}
