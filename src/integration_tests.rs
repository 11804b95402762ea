#[cfg(test)]
mod tests {
    use axum::extract::{Path, State};
    use axum::{Extension, Json};

    use crate::commands::machines::{self, MachineRequest};
    use crate::commands::notifications;
    use crate::commands::stop_reasons::{self, ReorderItem, ReorderRequest};
    use crate::commands::stops::{self, CloseStopRequest, OpenStopRequest};
    use crate::db::{self, DbPool};
    use crate::error::ShopfloorError;
    use crate::middleware::auth::Claims;
    use crate::services::notifier;
    use crate::state::AppState;

    async fn setup_test_db() -> DbPool {
        dotenvy::dotenv().ok();
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = db::init_pool(&database_url)
            .await
            .expect("Failed to create pool");
        db::init_database(&pool)
            .await
            .expect("Failed to initialize database");
        pool
    }

    fn admin_claims(user_id: i32) -> Claims {
        Claims {
            sub: "it-admin@example.com".to_string(),
            user_id,
            name: "IT Admin".to_string(),
            role: "ADMIN".to_string(),
            exp: usize::MAX,
        }
    }

    async fn create_test_user(pool: &DbPool, email: &str) -> i32 {
        sqlx::query_scalar(
            "INSERT INTO users (name, email, password_hash, role)
             VALUES ('IT User', $1, 'x', 'ADMIN')
             ON CONFLICT (email) DO UPDATE SET name = EXCLUDED.name
             RETURNING id",
        )
        .bind(email)
        .fetch_one(pool)
        .await
        .expect("Failed to create test user")
    }

    async fn create_test_machine(pool: &DbPool, name: &str) -> i32 {
        sqlx::query_scalar(
            "INSERT INTO machines (name, status) VALUES ($1, 'RUNNING')
             ON CONFLICT (name) DO UPDATE SET status = EXCLUDED.status
             RETURNING id",
        )
        .bind(name)
        .fetch_one(pool)
        .await
        .expect("Failed to create test machine")
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn seeded_reference_data_present() {
        let pool = setup_test_db().await;

        let (category,): (String,) =
            sqlx::query_as("SELECT category FROM stop_reasons WHERE reason_code = 'R01'")
                .fetch_one(&pool)
                .await
                .expect("seeded tool change reason missing");
        assert_eq!(category, "SETUP");

        let (shift_count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM shifts")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert!(shift_count >= 3);

        let (alert_keys,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM settings WHERE category = 'ALERTS'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert!(alert_keys >= 5);
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn stop_lifecycle_bumps_machine_downtime() {
        let pool = setup_test_db().await;
        let state = AppState { pool: pool.clone() };

        let user_id = create_test_user(&pool, "it-stop-lifecycle@example.com").await;
        let machine_id = create_test_machine(&pool, "IT Lifecycle Machine").await;
        let (reason_id,): (i32,) =
            sqlx::query_as("SELECT id FROM stop_reasons WHERE reason_code = 'R01'")
                .fetch_one(&pool)
                .await
                .unwrap();

        let (downtime_before,): (i64,) =
            sqlx::query_as("SELECT total_downtime FROM machines WHERE id = $1")
                .bind(machine_id)
                .fetch_one(&pool)
                .await
                .unwrap();

        let opened = stops::open_stop(
            State(state.clone()),
            Extension(admin_claims(user_id)),
            Json(OpenStopRequest {
                machine_id,
                reason_id,
                job_id: None,
                is_tool_change: Some(true),
            }),
        )
        .await
        .expect("open_stop failed");
        let stop_id = opened.0.id;
        assert!(opened.0.end_time.is_none());

        let closed = stops::close_stop(
            State(state.clone()),
            Path(stop_id),
            Json(CloseStopRequest {
                actual_tool_change_time: Some(200),
            }),
        )
        .await
        .expect("close_stop failed");
        assert!(closed.0.end_time.is_some());
        let duration = closed.0.duration.expect("duration should be set");
        assert!(duration >= 0);

        let (downtime_after,): (i64,) =
            sqlx::query_as("SELECT total_downtime FROM machines WHERE id = $1")
                .bind(machine_id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(downtime_after, downtime_before + duration as i64);

        // A closed stop cannot be closed again, and the downtime counter must
        // not be bumped a second time.
        let reclose = stops::close_stop(
            State(state),
            Path(stop_id),
            Json(CloseStopRequest {
                actual_tool_change_time: None,
            }),
        )
        .await;
        assert!(matches!(reclose, Err(ShopfloorError::NotFound(_))));

        let (downtime_final,): (i64,) =
            sqlx::query_as("SELECT total_downtime FROM machines WHERE id = $1")
                .bind(machine_id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(downtime_final, downtime_after);

        let _ = sqlx::query("DELETE FROM stops WHERE id = $1")
            .bind(stop_id)
            .execute(&pool)
            .await;
        let _ = sqlx::query("DELETE FROM events WHERE machine_id = $1")
            .bind(machine_id)
            .execute(&pool)
            .await;
        let _ = sqlx::query("DELETE FROM machines WHERE id = $1")
            .bind(machine_id)
            .execute(&pool)
            .await;
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn in_use_stop_reason_cannot_be_deleted() {
        let pool = setup_test_db().await;
        let state = AppState { pool: pool.clone() };

        let user_id = create_test_user(&pool, "it-reason-guard@example.com").await;
        let machine_id = create_test_machine(&pool, "IT Guard Machine").await;
        let reason_id: i32 = sqlx::query_scalar(
            "INSERT INTO stop_reasons (reason_code, reason_text, category)
             VALUES ('IT01', 'Integration guard reason', 'OTHER')
             ON CONFLICT (reason_code) DO UPDATE SET reason_text = EXCLUDED.reason_text
             RETURNING id",
        )
        .fetch_one(&pool)
        .await
        .unwrap();

        let stop_id: i32 = sqlx::query_scalar(
            "INSERT INTO stops (machine_id, reason_id, operator_id, end_time, duration)
             VALUES ($1, $2, $3, NOW(), 60)
             RETURNING id",
        )
        .bind(machine_id)
        .bind(reason_id)
        .bind(user_id)
        .fetch_one(&pool)
        .await
        .unwrap();

        let result = stop_reasons::delete_stop_reason(
            State(state.clone()),
            Extension(admin_claims(user_id)),
            Path(reason_id),
        )
        .await;
        assert!(matches!(result, Err(ShopfloorError::Validation(_))));

        // Once the referencing stop is gone the delete goes through.
        let _ = sqlx::query("DELETE FROM stops WHERE id = $1")
            .bind(stop_id)
            .execute(&pool)
            .await;
        let result = stop_reasons::delete_stop_reason(
            State(state),
            Extension(admin_claims(user_id)),
            Path(reason_id),
        )
        .await;
        assert!(result.is_ok(), "delete after cleanup failed: {:?}", result.err());

        let _ = sqlx::query("DELETE FROM machines WHERE id = $1")
            .bind(machine_id)
            .execute(&pool)
            .await;
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn reorder_applies_all_rows_or_none() {
        let pool = setup_test_db().await;
        let state = AppState { pool: pool.clone() };
        let user_id = create_test_user(&pool, "it-reorder@example.com").await;

        let before: Vec<(i32, i32)> =
            sqlx::query_as("SELECT id, sort_order FROM stop_reasons ORDER BY id")
                .fetch_all(&pool)
                .await
                .unwrap();
        assert!(before.len() >= 2);

        // A transaction dropped without commit must leave every row unchanged.
        {
            let mut tx = pool.begin().await.unwrap();
            sqlx::query("UPDATE stop_reasons SET sort_order = 9999 WHERE id = $1")
                .bind(before[0].0)
                .execute(&mut *tx)
                .await
                .unwrap();
            drop(tx);
        }
        let (untouched,): (i32,) =
            sqlx::query_as("SELECT sort_order FROM stop_reasons WHERE id = $1")
                .bind(before[0].0)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(untouched, before[0].1);

        // The handler commits every row of a valid reorder.
        let reversed: Vec<ReorderItem> = before
            .iter()
            .rev()
            .enumerate()
            .map(|(i, (id, _))| ReorderItem {
                id: *id,
                sort_order: (i + 1) as i32,
            })
            .collect();
        stop_reasons::reorder_stop_reasons(
            State(state.clone()),
            Extension(admin_claims(user_id)),
            Json(ReorderRequest {
                items: reversed.clone(),
            }),
        )
        .await
        .expect("reorder failed");

        for item in &reversed {
            let (order,): (i32,) =
                sqlx::query_as("SELECT sort_order FROM stop_reasons WHERE id = $1")
                    .bind(item.id)
                    .fetch_one(&pool)
                    .await
                    .unwrap();
            assert_eq!(order, item.sort_order);
        }

        // Restore the seeded ordering.
        let restore: Vec<ReorderItem> = before
            .iter()
            .map(|(id, order)| ReorderItem {
                id: *id,
                sort_order: *order,
            })
            .collect();
        stop_reasons::reorder_stop_reasons(
            State(state),
            Extension(admin_claims(user_id)),
            Json(ReorderRequest { items: restore }),
        )
        .await
        .expect("restore reorder failed");
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn failed_notification_stops_retrying_at_cap() {
        let pool = setup_test_db().await;
        std::env::remove_var("TELEGRAM_BOT_TOKEN");

        let id = notifier::create(
            &pool,
            notifier::CreateNotification {
                kind: "STOP_ALERT",
                channel: "TELEGRAM",
                recipient: "12345".to_string(),
                title: "Integration retry test".to_string(),
                message: "m".to_string(),
                data: None,
            },
        )
        .await
        .expect("create notification failed");

        // Without a bot token every dispatch attempt fails; the retry counter
        // climbs to the cap and then the row is left alone.
        for _ in 0..notifier::MAX_RETRIES + 2 {
            notifier::process_pending(&pool)
                .await
                .expect("process_pending failed");
        }

        let (status, retry_count): (String, i32) =
            sqlx::query_as("SELECT status, retry_count FROM notifications WHERE id = $1")
                .bind(id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(status, "FAILED");
        assert_eq!(retry_count, notifier::MAX_RETRIES);

        let _ = sqlx::query("DELETE FROM notifications WHERE id = $1")
            .bind(id)
            .execute(&pool)
            .await;
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn machine_update_without_status_keeps_current() {
        let pool = setup_test_db().await;
        let state = AppState { pool: pool.clone() };

        let user_id = create_test_user(&pool, "it-machine-status@example.com").await;
        let machine_id = create_test_machine(&pool, "IT Status Machine").await;

        let updated = machines::update_machine(
            State(state),
            Extension(admin_claims(user_id)),
            Path(machine_id),
            Json(MachineRequest {
                name: "IT Status Machine".to_string(),
                model: Some("M-200".to_string()),
                controller: None,
                serial_number: None,
                manufacturer: None,
                ip_address: None,
                opc_port: None,
                location: None,
                status: None,
            }),
        )
        .await
        .expect("update_machine failed");
        assert_eq!(updated.0.status, "RUNNING");

        // No status change, no STATUS_CHANGE event.
        let (event_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM events
             WHERE machine_id = $1 AND event_type = 'STATUS_CHANGE'",
        )
        .bind(machine_id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(event_count, 0);

        let _ = sqlx::query("DELETE FROM machines WHERE id = $1")
            .bind(machine_id)
            .execute(&pool)
            .await;
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn notification_delete_is_scoped_to_recipient() {
        let pool = setup_test_db().await;
        let state = AppState { pool: pool.clone() };

        let owner_id = create_test_user(&pool, "it-notif-owner@example.com").await;
        let other_id = create_test_user(&pool, "it-notif-other@example.com").await;

        let id = notifier::create(
            &pool,
            notifier::CreateNotification {
                kind: "STOP_ALERT",
                channel: "IN_APP",
                recipient: owner_id.to_string(),
                title: "Scoped delete test".to_string(),
                message: "m".to_string(),
                data: None,
            },
        )
        .await
        .expect("create notification failed");

        // Another user cannot delete it and the row survives.
        let result = notifications::delete_notification(
            State(state.clone()),
            Extension(admin_claims(other_id)),
            Path(id),
        )
        .await;
        assert!(matches!(result, Err(ShopfloorError::NotFound(_))));

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM notifications WHERE id = $1")
            .bind(id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);

        // The recipient can.
        notifications::delete_notification(
            State(state),
            Extension(admin_claims(owner_id)),
            Path(id),
        )
        .await
        .expect("owner delete failed");

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM notifications WHERE id = $1")
            .bind(id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
