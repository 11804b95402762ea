use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::{FromRow, Pool, Postgres};
use std::str::FromStr;

use crate::error::{ShopfloorError, ShopfloorResult};

pub type DbPool = Pool<Postgres>;

pub async fn init_pool_with_options(opts: PgConnectOptions) -> ShopfloorResult<DbPool> {
    // connect_lazy_with returns the pool immediately without validating the connection.
    Ok(PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .idle_timeout(std::time::Duration::from_secs(120))
        .max_lifetime(std::time::Duration::from_secs(300))
        .connect_lazy_with(opts))
}

pub async fn init_pool(database_url: &str) -> ShopfloorResult<DbPool> {
    let opts = PgConnectOptions::from_str(database_url)
        .map_err(|e| ShopfloorError::Internal(format!("Invalid DB URL: {}", e)))?
        .ssl_mode(PgSslMode::Disable);

    init_pool_with_options(opts).await
}

pub async fn init_database(pool: &DbPool) -> ShopfloorResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    ensure_seeds(pool).await?;
    tracing::info!("Database ready");
    Ok(())
}

/// Idempotent seed pass: a default admin account, the baseline stop-reason
/// taxonomy, the three standard shifts and the alert thresholds.
async fn ensure_seeds(pool: &DbPool) -> ShopfloorResult<()> {
    let admin_email =
        std::env::var("ADMIN_EMAIL").unwrap_or_else(|_| "admin@shopfloor.local".to_string());

    let admin_exists: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE role = 'ADMIN'")
        .fetch_one(pool)
        .await?;
    if admin_exists.0 == 0 {
        let password = std::env::var("ADMIN_PASSWORD").unwrap_or_else(|_| "admin123".to_string());
        let hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)?;
        sqlx::query(
            "INSERT INTO users (name, email, password_hash, role) VALUES ('Admin', $1, $2, 'ADMIN')
             ON CONFLICT (email) DO NOTHING",
        )
        .bind(&admin_email)
        .bind(hash)
        .execute(pool)
        .await?;
        tracing::info!("Seeded default admin account {}", admin_email);
    }

    let reason_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM stop_reasons")
        .fetch_one(pool)
        .await?;
    if reason_count.0 == 0 {
        let reasons: &[(&str, &str, &str, &str, Option<i32>)] = &[
            ("R01", "Tool Change", "SETUP", "AUTOMATIC", Some(180)),
            ("R02", "Material Loading", "MATERIAL", "MANUAL", None),
            ("R03", "Material Shortage", "MATERIAL", "MANUAL", None),
            ("R04", "Machine Breakdown", "MECHANICAL", "AUTOMATIC", None),
            ("R05", "Coolant Issue", "MECHANICAL", "MANUAL", None),
            ("R06", "Quality Check", "QUALITY", "MANUAL", Some(300)),
            ("R07", "Planned Maintenance", "MAINTENANCE", "MANUAL", None),
            ("R08", "Operator Break", "OPERATOR", "MANUAL", None),
        ];
        for (i, (code, text, category, detection, duration)) in reasons.iter().enumerate() {
            sqlx::query(
                "INSERT INTO stop_reasons (reason_code, reason_text, category, detection_type, standard_duration, sort_order)
                 VALUES ($1, $2, $3, $4, $5, $6) ON CONFLICT (reason_code) DO NOTHING",
            )
            .bind(code)
            .bind(text)
            .bind(category)
            .bind(detection)
            .bind(duration)
            .bind((i + 1) as i32)
            .execute(pool)
            .await?;
        }
    }

    let shift_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM shifts")
        .fetch_one(pool)
        .await?;
    if shift_count.0 == 0 {
        let shifts = [
            ("Morning", "06:00", "14:00", "#22c55e", 1),
            ("Evening", "14:00", "22:00", "#3b82f6", 2),
            ("Night", "22:00", "06:00", "#8b5cf6", 3),
        ];
        for (name, start, end, color, order) in shifts {
            sqlx::query(
                "INSERT INTO shifts (name, start_time, end_time, color, sort_order)
                 VALUES ($1, $2, $3, $4, $5) ON CONFLICT (name) DO NOTHING",
            )
            .bind(name)
            .bind(start)
            .bind(end)
            .bind(color)
            .bind(order)
            .execute(pool)
            .await?;
        }
    }

    let defaults = [
        ("alertDowntimeThreshold", "300", "NUMBER", "ALERTS"),
        ("alertCriticalDowntime", "900", "NUMBER", "ALERTS"),
        ("alertToolChangeOverrun", "180", "NUMBER", "ALERTS"),
        ("enableEmailAlerts", "false", "BOOLEAN", "ALERTS"),
        ("enableTelegramAlerts", "false", "BOOLEAN", "ALERTS"),
        ("companyName", "Shopfloor", "STRING", "GENERAL"),
        ("timezone", "UTC", "STRING", "GENERAL"),
    ];
    for (key, value, data_type, category) in defaults {
        sqlx::query(
            "INSERT INTO settings (key, value, data_type, category)
             VALUES ($1, $2, $3, $4) ON CONFLICT (key) DO NOTHING",
        )
        .bind(key)
        .bind(value)
        .bind(data_type)
        .bind(category)
        .execute(pool)
        .await?;
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Row models
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i32,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub phone: Option<String>,
    pub telegram_id: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// User row as returned by the API: no password hash, stop count included.
#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub role: String,
    pub phone: Option<String>,
    pub telegram_id: Option<String>,
    pub is_active: bool,
    pub stop_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Machine {
    pub id: i32,
    pub name: String,
    pub model: Option<String>,
    pub controller: Option<String>,
    pub serial_number: Option<String>,
    pub manufacturer: Option<String>,
    pub ip_address: Option<String>,
    pub opc_port: Option<i32>,
    pub location: Option<String>,
    pub status: String,
    pub is_active: bool,
    pub install_date: Option<NaiveDate>,
    pub warranty_expiry: Option<NaiveDate>,
    pub last_maintenance: Option<DateTime<Utc>>,
    pub total_runtime: i64,
    pub total_cycles: i64,
    pub total_downtime: i64,
    pub average_oee: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: i32,
    pub machine_id: i32,
    pub job_number: Option<String>,
    pub part_name: Option<String>,
    pub target_quantity: i32,
    pub cycle_count: i32,
    pub good_parts: i32,
    pub rejected_parts: i32,
    pub insert_time: Option<f64>,
    pub actual_cycle_time: Option<f64>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub is_completed: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StopReason {
    pub id: i32,
    pub reason_code: String,
    pub reason_text: String,
    pub category: String,
    pub detection_type: String,
    pub standard_duration: Option<i32>,
    pub icon: Option<String>,
    pub sort_order: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StopReasonWithCount {
    pub id: i32,
    pub reason_code: String,
    pub reason_text: String,
    pub category: String,
    pub detection_type: String,
    pub standard_duration: Option<i32>,
    pub icon: Option<String>,
    pub sort_order: i32,
    pub is_active: bool,
    pub stop_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Stop {
    pub id: i32,
    pub machine_id: i32,
    pub reason_id: i32,
    pub job_id: Option<i32>,
    pub operator_id: Option<i32>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration: Option<i32>,
    pub is_resolved: bool,
    pub resolved_by: Option<i32>,
    pub resolution_note: Option<String>,
    pub is_tool_change: bool,
    pub actual_tool_change_time: Option<i32>,
    pub created_at: DateTime<Utc>,
}

/// Stop joined with its reason, as consumed by the analytics aggregations.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StopWithReason {
    pub id: i32,
    pub machine_id: i32,
    pub reason_id: i32,
    pub start_time: DateTime<Utc>,
    pub duration: Option<i32>,
    pub reason_code: String,
    pub reason_text: String,
    pub category: String,
}

/// Stop as listed on the machine detail page and the stop log.
#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StopDetail {
    pub id: i32,
    pub machine_id: i32,
    pub reason_id: i32,
    pub job_id: Option<i32>,
    pub operator_id: Option<i32>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration: Option<i32>,
    pub is_resolved: bool,
    pub resolution_note: Option<String>,
    pub is_tool_change: bool,
    pub actual_tool_change_time: Option<i32>,
    pub reason_code: String,
    pub reason_text: String,
    pub category: String,
    pub operator_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: i32,
    pub machine_id: i32,
    pub event_type: String,
    pub severity: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Setting {
    pub id: i32,
    pub key: String,
    pub value: String,
    pub data_type: String,
    pub category: String,
    pub is_public: bool,
    pub updated_by: Option<i32>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Shift {
    pub id: i32,
    pub name: String,
    pub start_time: String,
    pub end_time: String,
    pub color: String,
    pub sort_order: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i32,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub kind: String,
    pub channel: String,
    pub recipient: String,
    pub title: String,
    pub message: String,
    pub data: Option<serde_json::Value>,
    pub status: String,
    pub retry_count: i32,
    pub error_reason: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Append an audit trail row. Failures are logged, never propagated; the
/// audited operation must not fail because bookkeeping did.
pub async fn record_audit(
    pool: &DbPool,
    user_id: Option<i32>,
    action: &str,
    entity: &str,
    entity_id: Option<String>,
) {
    let res = sqlx::query(
        "INSERT INTO audit_logs (user_id, action, entity, entity_id) VALUES ($1, $2, $3, $4)",
    )
    .bind(user_id)
    .bind(action)
    .bind(entity)
    .bind(entity_id)
    .execute(pool)
    .await;
    if let Err(e) = res {
        tracing::warn!("Failed to write audit log for {} {}: {}", action, entity, e);
    }
}

/// Append a machine event row (stop opened/closed, status changes).
pub async fn record_event(
    pool: &DbPool,
    machine_id: i32,
    event_type: &str,
    severity: &str,
    message: &str,
) -> ShopfloorResult<()> {
    sqlx::query(
        "INSERT INTO events (machine_id, event_type, severity, message) VALUES ($1, $2, $3, $4)",
    )
    .bind(machine_id)
    .bind(event_type)
    .bind(severity)
    .bind(message)
    .execute(pool)
    .await?;
    Ok(())
}
