use axum::{
    extract::{Query, State},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::db::{self, DbPool, Setting};
use crate::error::ShopfloorResult;
use crate::middleware::auth::{Claims, Role};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SettingsQuery {
    pub category: Option<String>,
}

pub async fn list_settings(
    State(state): State<AppState>,
    Query(query): Query<SettingsQuery>,
) -> ShopfloorResult<Json<Vec<Setting>>> {
    let settings = sqlx::query_as::<_, Setting>(
        "SELECT * FROM settings
         WHERE ($1::text IS NULL OR category = $1)
         ORDER BY category, key",
    )
    .bind(query.category)
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(settings))
}

async fn upsert_setting(
    pool: &DbPool,
    key: &str,
    value: &str,
    data_type: &str,
    category: &str,
    is_public: bool,
    updated_by: i32,
) -> ShopfloorResult<()> {
    sqlx::query(
        "INSERT INTO settings (key, value, data_type, category, is_public, updated_by)
         VALUES ($1, $2, $3, $4, $5, $6)
         ON CONFLICT (key)
         DO UPDATE SET value = $2, updated_by = $6, updated_at = NOW()",
    )
    .bind(key)
    .bind(value)
    .bind(data_type)
    .bind(category)
    .bind(is_public)
    .bind(updated_by)
    .execute(pool)
    .await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertSettingsRequest {
    pub alert_downtime_threshold: i64,
    pub alert_critical_downtime: i64,
    pub alert_tool_change_overrun: i64,
    pub enable_email_alerts: bool,
    pub enable_telegram_alerts: bool,
}

pub async fn update_alert_settings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<AlertSettingsRequest>,
) -> ShopfloorResult<Json<Value>> {
    claims.require(Role::Admin)?;

    let updates = [
        (
            "alertDowntimeThreshold",
            payload.alert_downtime_threshold.to_string(),
            "NUMBER",
        ),
        (
            "alertCriticalDowntime",
            payload.alert_critical_downtime.to_string(),
            "NUMBER",
        ),
        (
            "alertToolChangeOverrun",
            payload.alert_tool_change_overrun.to_string(),
            "NUMBER",
        ),
        (
            "enableEmailAlerts",
            payload.enable_email_alerts.to_string(),
            "BOOLEAN",
        ),
        (
            "enableTelegramAlerts",
            payload.enable_telegram_alerts.to_string(),
            "BOOLEAN",
        ),
    ];

    for (key, value, data_type) in updates {
        upsert_setting(
            &state.pool,
            key,
            &value,
            data_type,
            "ALERTS",
            false,
            claims.user_id,
        )
        .await?;
    }

    db::record_audit(
        &state.pool,
        Some(claims.user_id),
        "UPDATE",
        "settings",
        Some("ALERTS".to_string()),
    )
    .await;

    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneralSettingsRequest {
    pub company_name: String,
    pub timezone: String,
    pub date_format: Option<String>,
    pub time_format: Option<String>,
    pub language: Option<String>,
}

pub async fn update_general_settings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<GeneralSettingsRequest>,
) -> ShopfloorResult<Json<Value>> {
    claims.require(Role::Admin)?;

    let updates = [
        ("companyName", Some(payload.company_name)),
        ("timezone", Some(payload.timezone)),
        ("dateFormat", payload.date_format),
        ("timeFormat", payload.time_format),
        ("language", payload.language),
    ];

    for (key, value) in updates {
        if let Some(value) = value {
            upsert_setting(
                &state.pool,
                key,
                &value,
                "STRING",
                "GENERAL",
                true,
                claims.user_id,
            )
            .await?;
        }
    }

    db::record_audit(
        &state.pool,
        Some(claims.user_id),
        "UPDATE",
        "settings",
        Some("GENERAL".to_string()),
    )
    .await;

    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultSettingsRequest {
    pub default_cycle_time: Option<f64>,
    pub default_shift_target: Option<i64>,
    pub oee_target: Option<f64>,
}

pub async fn update_default_settings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<DefaultSettingsRequest>,
) -> ShopfloorResult<Json<Value>> {
    claims.require(Role::Admin)?;

    let updates = [
        (
            "defaultCycleTime",
            payload.default_cycle_time.map(|v| v.to_string()),
        ),
        (
            "defaultShiftTarget",
            payload.default_shift_target.map(|v| v.to_string()),
        ),
        ("oeeTarget", payload.oee_target.map(|v| v.to_string())),
    ];

    for (key, value) in updates {
        if let Some(value) = value {
            upsert_setting(
                &state.pool,
                key,
                &value,
                "NUMBER",
                "DEFAULTS",
                false,
                claims.user_id,
            )
            .await?;
        }
    }

    db::record_audit(
        &state.pool,
        Some(claims.user_id),
        "UPDATE",
        "settings",
        Some("DEFAULTS".to_string()),
    )
    .await;

    Ok(Json(json!({ "success": true })))
}
