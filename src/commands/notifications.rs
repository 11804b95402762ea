use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::db::Notification;
use crate::error::{ShopfloorError, ShopfloorResult};
use crate::middleware::auth::Claims;
use crate::services::notifier;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
}

pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ListQuery>,
) -> ShopfloorResult<Json<Vec<Notification>>> {
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let notifications =
        notifier::get_user_notifications(&state.pool, claims.user_id, limit).await?;
    Ok(Json(notifications))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ShopfloorResult<Json<Value>> {
    let count = notifier::get_unread_count(&state.pool, claims.user_id).await?;
    Ok(Json(json!({ "count": count })))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ShopfloorResult<Json<Value>> {
    notifier::mark_as_read(&state.pool, id).await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn delete_notification(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i32>,
) -> ShopfloorResult<Json<Value>> {
    if !notifier::delete_for_user(&state.pool, id, claims.user_id).await? {
        return Err(ShopfloorError::NotFound(
            "Notification not found".to_string(),
        ));
    }
    Ok(Json(json!({ "success": true })))
}
