use axum::{
    extract::State,
    http::header,
    response::{AppendHeaders, IntoResponse},
    Extension, Json,
};
use bcrypt::verify;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::db::{self, User};
use crate::error::{ShopfloorError, ShopfloorResult};
use crate::middleware::auth::{issue_token, Claims};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub role: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub user: SessionUser,
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ShopfloorResult<impl IntoResponse> {
    if payload.email.trim().is_empty() || payload.password.trim().is_empty() {
        return Err(ShopfloorError::Validation(
            "Email and password are required".to_string(),
        ));
    }

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(&payload.email)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| ShopfloorError::Auth("Invalid credentials".to_string()))?;

    if !user.is_active {
        return Err(ShopfloorError::Auth("Account is deactivated".to_string()));
    }

    if !verify(&payload.password, &user.password_hash)? {
        return Err(ShopfloorError::Auth("Invalid credentials".to_string()));
    }

    let token = issue_token(user.id, &user.email, &user.name, &user.role)?;

    db::record_audit(
        &state.pool,
        Some(user.id),
        "LOGIN",
        "user",
        Some(user.id.to_string()),
    )
    .await;

    let cookie = format!(
        "token={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        token,
        12 * 3600
    );

    Ok((
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        Json(LoginResponse {
            token,
            user: SessionUser {
                id: user.id,
                name: user.name,
                email: user.email,
                role: user.role,
            },
        }),
    ))
}

pub async fn logout() -> impl IntoResponse {
    let cookie = "token=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0".to_string();
    (
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        Json(json!({ "success": true })),
    )
}

pub async fn me(Extension(claims): Extension<Claims>) -> Json<SessionUser> {
    Json(SessionUser {
        id: claims.user_id,
        name: claims.name.clone(),
        email: claims.sub.clone(),
        role: claims.role.clone(),
    })
}

pub async fn ping() -> &'static str {
    "pong"
}
