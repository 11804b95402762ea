use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::FromRow;

use crate::db::DbPool;
use crate::error::ShopfloorResult;
use crate::services::notifier::{self, CreateNotification};

#[derive(Debug, Clone)]
pub struct AlertSettings {
    pub downtime_threshold_secs: i64,
    pub critical_downtime_secs: i64,
    pub tool_change_overrun_secs: i64,
    pub email_enabled: bool,
    pub telegram_enabled: bool,
}

impl Default for AlertSettings {
    fn default() -> Self {
        AlertSettings {
            downtime_threshold_secs: 300,
            critical_downtime_secs: 900,
            tool_change_overrun_secs: 180,
            email_enabled: false,
            telegram_enabled: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Critical,
}

impl Severity {
    fn title(&self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL Machine Downtime",
            Severity::Warning => "WARNING Machine Downtime",
        }
    }
}

/// Classify an open stop's elapsed downtime against the configured
/// thresholds. `None` means no alert tier reached yet.
pub fn classify_downtime(elapsed_secs: i64, settings: &AlertSettings) -> Option<Severity> {
    if elapsed_secs >= settings.critical_downtime_secs {
        Some(Severity::Critical)
    } else if elapsed_secs >= settings.downtime_threshold_secs {
        Some(Severity::Warning)
    } else {
        None
    }
}

/// Overrun of a finished tool change beyond its standard duration. The alert
/// fires when the overrun exceeds the configured tolerance.
pub fn tool_change_overrun(
    actual_secs: i32,
    standard_secs: Option<i32>,
    settings: &AlertSettings,
) -> Option<i64> {
    let overrun = actual_secs as i64 - standard_secs.unwrap_or(180) as i64;
    (overrun > settings.tool_change_overrun_secs).then_some(overrun)
}

pub async fn get_alert_settings(pool: &DbPool) -> ShopfloorResult<AlertSettings> {
    let rows: Vec<(String, String)> =
        sqlx::query_as("SELECT key, value FROM settings WHERE category = 'ALERTS'")
            .fetch_all(pool)
            .await?;

    let mut settings = AlertSettings::default();
    for (key, value) in rows {
        match key.as_str() {
            "alertDowntimeThreshold" => {
                settings.downtime_threshold_secs =
                    value.parse().unwrap_or(settings.downtime_threshold_secs)
            }
            "alertCriticalDowntime" => {
                settings.critical_downtime_secs =
                    value.parse().unwrap_or(settings.critical_downtime_secs)
            }
            "alertToolChangeOverrun" => {
                settings.tool_change_overrun_secs =
                    value.parse().unwrap_or(settings.tool_change_overrun_secs)
            }
            "enableEmailAlerts" => settings.email_enabled = value == "true",
            "enableTelegramAlerts" => settings.telegram_enabled = value == "true",
            _ => {}
        }
    }
    Ok(settings)
}

#[derive(Debug, FromRow)]
struct OpenStopRow {
    id: i32,
    machine_id: i32,
    machine_name: String,
    reason_text: String,
    start_time: DateTime<Utc>,
    operator_name: Option<String>,
}

#[derive(Debug, FromRow)]
struct RecipientRow {
    id: i32,
    email: Option<String>,
    telegram_id: Option<String>,
}

async fn get_alert_recipients(pool: &DbPool) -> ShopfloorResult<Vec<RecipientRow>> {
    let rows = sqlx::query_as::<_, RecipientRow>(
        "SELECT id, email, telegram_id FROM users
         WHERE role IN ('ADMIN', 'SUPERVISOR') AND is_active = TRUE",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Scan open unresolved stops and emit downtime alerts per reached tier.
/// Alerts are re-emitted on every poll for a still-open stop: there is no
/// suppression across cycles. Known duplicate-send behavior, kept as-is.
pub async fn check_downtime_alerts(pool: &DbPool) -> ShopfloorResult<()> {
    let settings = get_alert_settings(pool).await?;

    if !settings.email_enabled && !settings.telegram_enabled {
        return Ok(());
    }

    let open_stops = sqlx::query_as::<_, OpenStopRow>(
        "SELECT s.id, s.machine_id, m.name AS machine_name, r.reason_text,
                s.start_time, u.name AS operator_name
         FROM stops s
         JOIN machines m ON m.id = s.machine_id
         JOIN stop_reasons r ON r.id = s.reason_id
         LEFT JOIN users u ON u.id = s.operator_id
         WHERE s.end_time IS NULL AND s.is_resolved = FALSE",
    )
    .fetch_all(pool)
    .await?;

    let now = Utc::now();
    for stop in open_stops {
        let elapsed = (now - stop.start_time).num_seconds();
        if let Some(severity) = classify_downtime(elapsed, &settings) {
            send_downtime_alert(pool, &stop, elapsed, severity, &settings).await?;
        }
    }

    Ok(())
}

async fn send_downtime_alert(
    pool: &DbPool,
    stop: &OpenStopRow,
    elapsed_secs: i64,
    severity: Severity,
    settings: &AlertSettings,
) -> ShopfloorResult<()> {
    let title = severity.title().to_string();
    let message = format!(
        "Machine: {}\nReason: {}\nDuration: {} minutes\nOperator: {}",
        stop.machine_name,
        stop.reason_text,
        elapsed_secs / 60,
        stop.operator_name.as_deref().unwrap_or("Unknown"),
    );
    let data = json!({ "stopId": stop.id, "machineId": stop.machine_id });

    for user in get_alert_recipients(pool).await? {
        notifier::create(
            pool,
            CreateNotification {
                kind: "STOP_ALERT",
                channel: "IN_APP",
                recipient: user.id.to_string(),
                title: title.clone(),
                message: message.clone(),
                data: Some(data.clone()),
            },
        )
        .await?;

        if settings.email_enabled {
            if let Some(email) = &user.email {
                notifier::create(
                    pool,
                    CreateNotification {
                        kind: "STOP_ALERT",
                        channel: "EMAIL",
                        recipient: email.clone(),
                        title: title.clone(),
                        message: message.clone(),
                        data: None,
                    },
                )
                .await?;
            }
        }

        if settings.telegram_enabled {
            if let Some(telegram_id) = &user.telegram_id {
                notifier::create(
                    pool,
                    CreateNotification {
                        kind: "STOP_ALERT",
                        channel: "TELEGRAM",
                        recipient: telegram_id.clone(),
                        title: title.clone(),
                        message: message.clone(),
                        data: None,
                    },
                )
                .await?;
            }
        }
    }

    Ok(())
}

#[derive(Debug, FromRow)]
struct ToolChangeRow {
    id: i32,
    machine_id: i32,
    machine_name: String,
    standard_duration: Option<i32>,
    actual_tool_change_time: Option<i32>,
}

/// Scan tool-change stops closed within the last hour for overruns beyond
/// standard duration plus the configured tolerance.
pub async fn check_tool_change_overruns(pool: &DbPool) -> ShopfloorResult<()> {
    let settings = get_alert_settings(pool).await?;

    let recent = sqlx::query_as::<_, ToolChangeRow>(
        "SELECT s.id, s.machine_id, m.name AS machine_name,
                r.standard_duration, s.actual_tool_change_time
         FROM stops s
         JOIN machines m ON m.id = s.machine_id
         JOIN stop_reasons r ON r.id = s.reason_id
         WHERE s.is_tool_change = TRUE
           AND s.end_time IS NOT NULL
           AND s.created_at >= NOW() - INTERVAL '1 hour'",
    )
    .fetch_all(pool)
    .await?;

    for stop in recent {
        let Some(actual) = stop.actual_tool_change_time else {
            continue;
        };
        if let Some(overrun) = tool_change_overrun(actual, stop.standard_duration, &settings) {
            let title = "Tool Change Overrun".to_string();
            let message = format!(
                "Machine: {}\nExpected: {}s\nActual: {}s\nOverrun: {}s",
                stop.machine_name,
                stop.standard_duration.unwrap_or(180),
                actual,
                overrun,
            );
            let data = json!({ "stopId": stop.id, "machineId": stop.machine_id });

            for user in get_alert_recipients(pool).await? {
                notifier::create(
                    pool,
                    CreateNotification {
                        kind: "TOOL_CHANGE_OVERRUN",
                        channel: "IN_APP",
                        recipient: user.id.to_string(),
                        title: title.clone(),
                        message: message.clone(),
                        data: Some(data.clone()),
                    },
                )
                .await?;
            }
        }
    }

    Ok(())
}
