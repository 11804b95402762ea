use serde_json::json;

use crate::db::{DbPool, Notification};
use crate::error::{ShopfloorError, ShopfloorResult};

pub const MAX_RETRIES: i32 = 3;
const BATCH_SIZE: i64 = 50;

pub struct CreateNotification<'a> {
    pub kind: &'a str,
    pub channel: &'a str,
    pub recipient: String,
    pub title: String,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

pub async fn create(pool: &DbPool, params: CreateNotification<'_>) -> ShopfloorResult<i32> {
    let id: i32 = sqlx::query_scalar(
        "INSERT INTO notifications (type, channel, recipient, title, message, data, status)
         VALUES ($1, $2, $3, $4, $5, $6, 'PENDING')
         RETURNING id",
    )
    .bind(params.kind)
    .bind(params.channel)
    .bind(params.recipient)
    .bind(params.title)
    .bind(params.message)
    .bind(params.data)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

/// A notification may be dispatched while it has retries left and has not
/// been delivered. FAILED rows get re-attempted on the next poll cycle until
/// they hit the retry cap.
pub fn is_dispatchable(notification: &Notification) -> bool {
    (notification.status == "PENDING" || notification.status == "FAILED")
        && notification.retry_count < MAX_RETRIES
}

/// Dispatch a batch of pending notifications. Failures mark the row FAILED
/// and bump its retry counter; the next poll cycle picks it up again (no
/// backoff scheduling).
pub async fn process_pending(pool: &DbPool) -> ShopfloorResult<usize> {
    let pending = sqlx::query_as::<_, Notification>(
        "SELECT * FROM notifications
         WHERE status IN ('PENDING', 'FAILED') AND retry_count < $1
         ORDER BY created_at ASC
         LIMIT $2",
    )
    .bind(MAX_RETRIES)
    .bind(BATCH_SIZE)
    .fetch_all(pool)
    .await?;

    let mut sent = 0;
    for notification in pending {
        if !is_dispatchable(&notification) {
            continue;
        }

        let result = match notification.channel.as_str() {
            // Already persisted; in-app delivery is just the row itself.
            "IN_APP" => Ok(()),
            "EMAIL" => send_email(&notification).await,
            "TELEGRAM" => send_telegram(&notification).await,
            other => Err(ShopfloorError::Internal(format!(
                "Unknown notification channel: {}",
                other
            ))),
        };

        match result {
            Ok(()) => {
                mark_sent(pool, notification.id).await?;
                sent += 1;
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to dispatch notification {} over {}: {}",
                    notification.id,
                    notification.channel,
                    e
                );
                mark_failed(pool, notification.id, &e.to_string()).await?;
            }
        }
    }

    Ok(sent)
}

async fn send_email(notification: &Notification) -> ShopfloorResult<()> {
    // TODO: wire an actual mail provider; until then log and treat as sent.
    tracing::info!(
        "Email to {}: {}",
        notification.recipient,
        notification.title
    );
    Ok(())
}

async fn send_telegram(notification: &Notification) -> ShopfloorResult<()> {
    let bot_token = std::env::var("TELEGRAM_BOT_TOKEN")
        .map_err(|_| ShopfloorError::Internal("Telegram bot token not configured".to_string()))?;

    let url = format!("https://api.telegram.org/bot{}/sendMessage", bot_token);
    let body = json!({
        "chat_id": notification.recipient,
        "text": format!("*{}*\n\n{}", notification.title, notification.message),
        "parse_mode": "Markdown",
    });

    let response = reqwest::Client::new().post(&url).json(&body).send().await?;
    if !response.status().is_success() {
        return Err(ShopfloorError::Internal(format!(
            "Telegram API returned {}",
            response.status()
        )));
    }
    Ok(())
}

async fn mark_sent(pool: &DbPool, id: i32) -> ShopfloorResult<()> {
    sqlx::query("UPDATE notifications SET status = 'SENT', sent_at = NOW() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

async fn mark_failed(pool: &DbPool, id: i32, error: &str) -> ShopfloorResult<()> {
    sqlx::query(
        "UPDATE notifications
         SET status = 'FAILED', failed_at = NOW(), error_reason = $2,
             retry_count = retry_count + 1
         WHERE id = $1",
    )
    .bind(id)
    .bind(error)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_user_notifications(
    pool: &DbPool,
    user_id: i32,
    limit: i64,
) -> ShopfloorResult<Vec<Notification>> {
    let rows = sqlx::query_as::<_, Notification>(
        "SELECT * FROM notifications
         WHERE recipient = $1 AND channel = 'IN_APP'
         ORDER BY created_at DESC
         LIMIT $2",
    )
    .bind(user_id.to_string())
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn get_unread_count(pool: &DbPool, user_id: i32) -> ShopfloorResult<i64> {
    let count: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM notifications
         WHERE recipient = $1 AND channel = 'IN_APP' AND status = 'PENDING'",
    )
    .bind(user_id.to_string())
    .fetch_one(pool)
    .await?;
    Ok(count.0)
}

/// Delete a notification, scoped to its recipient: users can only remove
/// their own rows. Returns whether a row was removed.
pub async fn delete_for_user(pool: &DbPool, id: i32, user_id: i32) -> ShopfloorResult<bool> {
    let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND recipient = $2")
        .bind(id)
        .bind(user_id.to_string())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn mark_as_read(pool: &DbPool, id: i32) -> ShopfloorResult<()> {
    sqlx::query("UPDATE notifications SET status = 'SENT' WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn notification(status: &str, retry_count: i32) -> Notification {
        Notification {
            id: 1,
            kind: "STOP_ALERT".to_string(),
            channel: "EMAIL".to_string(),
            recipient: "ops@example.com".to_string(),
            title: "t".to_string(),
            message: "m".to_string(),
            data: None,
            status: status.to_string(),
            retry_count,
            error_reason: None,
            sent_at: None,
            failed_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn pending_under_cap_is_dispatchable() {
        assert!(is_dispatchable(&notification("PENDING", 0)));
        assert!(is_dispatchable(&notification("PENDING", 2)));
    }

    #[test]
    fn retry_cap_is_never_reattempted() {
        assert!(!is_dispatchable(&notification("PENDING", MAX_RETRIES)));
        assert!(!is_dispatchable(&notification("PENDING", MAX_RETRIES + 5)));
    }

    #[test]
    fn failed_under_cap_retries_but_sent_does_not() {
        assert!(is_dispatchable(&notification("FAILED", 1)));
        assert!(!is_dispatchable(&notification("FAILED", MAX_RETRIES)));
        assert!(!is_dispatchable(&notification("SENT", 0)));
    }
}
