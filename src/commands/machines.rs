use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::db::{self, Event, Job, Machine, StopDetail};
use crate::error::{ShopfloorError, ShopfloorResult};
use crate::middleware::auth::{Claims, Role};
use crate::state::AppState;

pub async fn list_machines(State(state): State<AppState>) -> ShopfloorResult<Json<Vec<Machine>>> {
    let machines = sqlx::query_as::<_, Machine>("SELECT * FROM machines ORDER BY name ASC")
        .fetch_all(&state.pool)
        .await?;
    Ok(Json(machines))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineDetail {
    #[serde(flatten)]
    pub machine: Machine,
    pub current_job: Option<Job>,
    pub jobs: Vec<Job>,
    pub stops: Vec<StopDetail>,
    pub events: Vec<Event>,
}

pub async fn get_machine(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ShopfloorResult<Json<MachineDetail>> {
    let machine = sqlx::query_as::<_, Machine>("SELECT * FROM machines WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| ShopfloorError::NotFound("Machine not found".to_string()))?;

    let jobs = sqlx::query_as::<_, Job>(
        "SELECT * FROM jobs WHERE machine_id = $1 ORDER BY start_time DESC LIMIT 10",
    )
    .bind(id)
    .fetch_all(&state.pool)
    .await?;

    // At most one current job: the latest uncompleted one by start time.
    let current_job = sqlx::query_as::<_, Job>(
        "SELECT * FROM jobs WHERE machine_id = $1 AND is_completed = FALSE
         ORDER BY start_time DESC LIMIT 1",
    )
    .bind(id)
    .fetch_optional(&state.pool)
    .await?;

    let stops = sqlx::query_as::<_, StopDetail>(
        "SELECT s.id, s.machine_id, s.reason_id, s.job_id, s.operator_id,
                s.start_time, s.end_time, s.duration, s.is_resolved,
                s.resolution_note, s.is_tool_change, s.actual_tool_change_time,
                r.reason_code, r.reason_text, r.category, u.name AS operator_name
         FROM stops s
         JOIN stop_reasons r ON r.id = s.reason_id
         LEFT JOIN users u ON u.id = s.operator_id
         WHERE s.machine_id = $1
         ORDER BY s.start_time DESC LIMIT 10",
    )
    .bind(id)
    .fetch_all(&state.pool)
    .await?;

    let events = sqlx::query_as::<_, Event>(
        "SELECT * FROM events WHERE machine_id = $1 ORDER BY created_at DESC LIMIT 10",
    )
    .bind(id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(MachineDetail {
        machine,
        current_job,
        jobs,
        stops,
        events,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineRequest {
    pub name: String,
    pub model: Option<String>,
    pub controller: Option<String>,
    pub serial_number: Option<String>,
    pub manufacturer: Option<String>,
    pub ip_address: Option<String>,
    pub opc_port: Option<i32>,
    pub location: Option<String>,
    pub status: Option<String>,
}

const MACHINE_STATUSES: [&str; 6] = ["RUNNING", "IDLE", "ERROR", "OFFLINE", "MAINTENANCE", "ONLINE"];

fn validate_status(status: &str) -> ShopfloorResult<()> {
    if MACHINE_STATUSES.contains(&status) {
        Ok(())
    } else {
        Err(ShopfloorError::Validation(format!(
            "Unknown machine status: {}",
            status
        )))
    }
}

pub async fn create_machine(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<MachineRequest>,
) -> ShopfloorResult<Json<Machine>> {
    claims.require(Role::Admin)?;

    if payload.name.trim().is_empty() {
        return Err(ShopfloorError::Validation(
            "Machine name is required".to_string(),
        ));
    }
    let status = payload.status.as_deref().unwrap_or("OFFLINE");
    validate_status(status)?;

    let machine = sqlx::query_as::<_, Machine>(
        "INSERT INTO machines (name, model, controller, serial_number, manufacturer,
                               ip_address, opc_port, location, status)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
         RETURNING *",
    )
    .bind(&payload.name)
    .bind(&payload.model)
    .bind(&payload.controller)
    .bind(&payload.serial_number)
    .bind(&payload.manufacturer)
    .bind(&payload.ip_address)
    .bind(payload.opc_port)
    .bind(&payload.location)
    .bind(status)
    .fetch_one(&state.pool)
    .await?;

    db::record_audit(
        &state.pool,
        Some(claims.user_id),
        "CREATE",
        "machine",
        Some(machine.id.to_string()),
    )
    .await;

    Ok(Json(machine))
}

pub async fn update_machine(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i32>,
    Json(payload): Json<MachineRequest>,
) -> ShopfloorResult<Json<Machine>> {
    claims.require(Role::Supervisor)?;

    let previous = sqlx::query_as::<_, Machine>("SELECT * FROM machines WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| ShopfloorError::NotFound("Machine not found".to_string()))?;

    // An omitted status keeps the current one rather than resetting it.
    let status = payload.status.as_deref().unwrap_or(&previous.status);
    validate_status(status)?;

    let machine = sqlx::query_as::<_, Machine>(
        "UPDATE machines
         SET name = $1, model = $2, controller = $3, serial_number = $4,
             manufacturer = $5, ip_address = $6, opc_port = $7, location = $8,
             status = $9, updated_at = NOW()
         WHERE id = $10
         RETURNING *",
    )
    .bind(&payload.name)
    .bind(&payload.model)
    .bind(&payload.controller)
    .bind(&payload.serial_number)
    .bind(&payload.manufacturer)
    .bind(&payload.ip_address)
    .bind(payload.opc_port)
    .bind(&payload.location)
    .bind(status)
    .bind(id)
    .fetch_one(&state.pool)
    .await?;

    if previous.status != machine.status {
        db::record_event(
            &state.pool,
            id,
            "STATUS_CHANGE",
            "INFO",
            &format!("Status changed from {} to {}", previous.status, machine.status),
        )
        .await?;
    }

    db::record_audit(
        &state.pool,
        Some(claims.user_id),
        "UPDATE",
        "machine",
        Some(id.to_string()),
    )
    .await;

    Ok(Json(machine))
}

/// Dependent rows are removed explicitly inside a single transaction, so a
/// failed delete leaves the machine and its history intact.
pub async fn delete_machine(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i32>,
) -> ShopfloorResult<Json<Value>> {
    claims.require(Role::Admin)?;

    let mut tx = state.pool.begin().await?;

    sqlx::query("DELETE FROM stops WHERE machine_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM jobs WHERE machine_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM events WHERE machine_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM maintenance_logs WHERE machine_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let result = sqlx::query("DELETE FROM machines WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ShopfloorError::NotFound("Machine not found".to_string()));
    }

    tx.commit().await?;

    db::record_audit(
        &state.pool,
        Some(claims.user_id),
        "DELETE",
        "machine",
        Some(id.to_string()),
    )
    .await;

    Ok(Json(json!({ "success": true })))
}
