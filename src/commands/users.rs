use axum::{
    extract::{Path, State},
    Extension, Json,
};
use bcrypt::{hash, verify, DEFAULT_COST};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::db::{self, User, UserSummary};
use crate::error::{ShopfloorError, ShopfloorResult};
use crate::middleware::auth::{Claims, Role};
use crate::state::AppState;

const USER_SUMMARY_COLUMNS: &str =
    "u.id, u.name, u.email, u.role, u.phone, u.telegram_id, u.is_active,
     (SELECT COUNT(*) FROM stops s WHERE s.operator_id = u.id) AS stop_count,
     u.created_at, u.updated_at";

pub async fn list_users(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ShopfloorResult<Json<Vec<UserSummary>>> {
    claims.require(Role::Supervisor)?;

    let users = sqlx::query_as::<_, UserSummary>(&format!(
        "SELECT {} FROM users u ORDER BY u.created_at DESC",
        USER_SUMMARY_COLUMNS
    ))
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(users))
}

pub async fn get_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i32>,
) -> ShopfloorResult<Json<UserSummary>> {
    claims.require(Role::Supervisor)?;

    let user = sqlx::query_as::<_, UserSummary>(&format!(
        "SELECT {} FROM users u WHERE u.id = $1",
        USER_SUMMARY_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ShopfloorError::NotFound("User not found".to_string()))?;

    Ok(Json(user))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: String,
    pub phone: Option<String>,
    pub telegram_id: Option<String>,
}

pub async fn create_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateUserRequest>,
) -> ShopfloorResult<Json<Value>> {
    claims.require(Role::Admin)?;

    if payload.name.trim().is_empty()
        || payload.email.trim().is_empty()
        || payload.password.is_empty()
    {
        return Err(ShopfloorError::Validation(
            "Missing required fields".to_string(),
        ));
    }
    if Role::parse(&payload.role).is_none() {
        return Err(ShopfloorError::Validation("Unknown role".to_string()));
    }

    let existing: Option<(i32,)> = sqlx::query_as("SELECT id FROM users WHERE email = $1")
        .bind(&payload.email)
        .fetch_optional(&state.pool)
        .await?;
    if existing.is_some() {
        return Err(ShopfloorError::Validation(
            "Email already exists".to_string(),
        ));
    }

    let hashed = hash(&payload.password, DEFAULT_COST)?;

    let id: i32 = sqlx::query_scalar(
        "INSERT INTO users (name, email, password_hash, role, phone, telegram_id)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING id",
    )
    .bind(&payload.name)
    .bind(&payload.email)
    .bind(hashed)
    .bind(&payload.role)
    .bind(&payload.phone)
    .bind(&payload.telegram_id)
    .fetch_one(&state.pool)
    .await?;

    db::record_audit(
        &state.pool,
        Some(claims.user_id),
        "CREATE",
        "user",
        Some(id.to_string()),
    )
    .await;

    Ok(Json(json!({ "id": id })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub name: String,
    pub email: String,
    pub role: String,
    pub phone: Option<String>,
    pub telegram_id: Option<String>,
    pub is_active: Option<bool>,
}

pub async fn update_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateUserRequest>,
) -> ShopfloorResult<Json<Value>> {
    claims.require(Role::Admin)?;

    if Role::parse(&payload.role).is_none() {
        return Err(ShopfloorError::Validation("Unknown role".to_string()));
    }

    let duplicate: Option<(i32,)> =
        sqlx::query_as("SELECT id FROM users WHERE email = $1 AND id != $2")
            .bind(&payload.email)
            .bind(id)
            .fetch_optional(&state.pool)
            .await?;
    if duplicate.is_some() {
        return Err(ShopfloorError::Validation(
            "Email already exists".to_string(),
        ));
    }

    let result = sqlx::query(
        "UPDATE users
         SET name = $1, email = $2, role = $3, phone = $4, telegram_id = $5,
             is_active = COALESCE($6, is_active), updated_at = NOW()
         WHERE id = $7",
    )
    .bind(&payload.name)
    .bind(&payload.email)
    .bind(&payload.role)
    .bind(&payload.phone)
    .bind(&payload.telegram_id)
    .bind(payload.is_active)
    .bind(id)
    .execute(&state.pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ShopfloorError::NotFound("User not found".to_string()));
    }

    db::record_audit(
        &state.pool,
        Some(claims.user_id),
        "UPDATE",
        "user",
        Some(id.to_string()),
    )
    .await;

    Ok(Json(json!({ "success": true })))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i32>,
) -> ShopfloorResult<Json<Value>> {
    claims.require(Role::Admin)?;

    if claims.user_id == id {
        return Err(ShopfloorError::Validation(
            "Cannot delete your own account".to_string(),
        ));
    }

    let stop_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM stops WHERE operator_id = $1")
        .bind(id)
        .fetch_one(&state.pool)
        .await?;
    if stop_count.0 > 0 {
        return Err(ShopfloorError::Validation(
            "Cannot delete user with recorded stops. Please reassign stops first.".to_string(),
        ));
    }

    let result = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ShopfloorError::NotFound("User not found".to_string()));
    }

    db::record_audit(
        &state.pool,
        Some(claims.user_id),
        "DELETE",
        "user",
        Some(id.to_string()),
    )
    .await;

    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub new_password: String,
    pub current_password: Option<String>,
}

/// Admins may set anyone's password; everyone else only their own, and only
/// with the current password verified.
pub async fn change_password(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i32>,
    Json(payload): Json<ChangePasswordRequest>,
) -> ShopfloorResult<Json<Value>> {
    if payload.new_password.len() < 6 {
        return Err(ShopfloorError::Validation(
            "Password must be at least 6 characters".to_string(),
        ));
    }

    let is_self = claims.user_id == id;
    if !is_self {
        claims.require(Role::Admin)?;
    }

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| ShopfloorError::NotFound("User not found".to_string()))?;

    if is_self && claims.role() < Role::Admin {
        let current = payload.current_password.as_deref().ok_or_else(|| {
            ShopfloorError::Validation("Current password is required".to_string())
        })?;
        if !verify(current, &user.password_hash)? {
            return Err(ShopfloorError::Auth(
                "Current password is incorrect".to_string(),
            ));
        }
    }

    let hashed = hash(&payload.new_password, DEFAULT_COST)?;
    sqlx::query("UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2")
        .bind(hashed)
        .bind(id)
        .execute(&state.pool)
        .await?;

    db::record_audit(
        &state.pool,
        Some(claims.user_id),
        "CHANGE_PASSWORD",
        "user",
        Some(id.to_string()),
    )
    .await;

    Ok(Json(json!({ "success": true })))
}
