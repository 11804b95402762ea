use axum::{
    extract::{Query, State},
    Json,
};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::commands::RangeQuery;
use crate::db::Machine;
use crate::error::{ShopfloorError, ShopfloorResult};
use crate::services::analytics::{
    self, CategoryBreakdown, MachineUtilization, OeeMetrics, ProductionSummary, ReasonSummary,
    ShiftPerformance,
};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiResponse {
    pub oee: f64,
    pub availability: f64,
    pub performance: f64,
    pub quality: f64,
    pub total_downtime: f64,
    pub stop_count: usize,
    pub good_parts: i64,
    pub rejected_parts: i64,
}

impl From<OeeMetrics> for KpiResponse {
    fn from(m: OeeMetrics) -> Self {
        KpiResponse {
            oee: m.oee,
            availability: m.availability,
            performance: m.performance,
            quality: m.quality,
            total_downtime: m.downtime_hours,
            stop_count: m.stop_count,
            good_parts: m.good_parts,
            rejected_parts: m.rejected_parts,
        }
    }
}

/// Headline KPI card. With a `machineId` filter this is that machine's OEE;
/// without one the OEE components are averaged across all active machines
/// and the production totals merged.
pub async fn kpi(
    State(state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> ShopfloorResult<Json<KpiResponse>> {
    let (start, end) = query.required_range()?;

    if let Some(machine_id) = query.machine_id {
        let metrics = analytics::calculate_oee(&state.pool, machine_id, start, end).await?;
        return Ok(Json(metrics.into()));
    }

    let machines =
        sqlx::query_as::<_, Machine>("SELECT * FROM machines WHERE is_active = TRUE")
            .fetch_all(&state.pool)
            .await?;

    let mut total_oee = 0.0;
    let mut total_availability = 0.0;
    let mut total_performance = 0.0;
    let mut total_quality = 0.0;
    let mut total_downtime = 0.0;
    let mut total_stops = 0;

    for machine in &machines {
        let m = analytics::calculate_oee(&state.pool, machine.id, start, end).await?;
        total_oee += m.oee;
        total_availability += m.availability;
        total_performance += m.performance;
        total_quality += m.quality;
        total_downtime += m.downtime_hours;
        total_stops += m.stop_count;
    }

    let machine_count = machines.len().max(1) as f64;

    let jobs = analytics::fetch_jobs(&state.pool, None, start, end).await?;
    let production = analytics::production_summary(&jobs);

    Ok(Json(KpiResponse {
        oee: total_oee / machine_count,
        availability: total_availability / machine_count,
        performance: total_performance / machine_count,
        quality: total_quality / machine_count,
        total_downtime,
        stop_count: total_stops,
        good_parts: production.good_parts,
        rejected_parts: production.rejected_parts,
    }))
}

pub async fn oee(
    State(state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> ShopfloorResult<Json<OeeMetrics>> {
    let (start, end) = query.required_range()?;
    let machine_id = query
        .machine_id
        .ok_or_else(|| ShopfloorError::Validation("machineId is required".to_string()))?;

    let metrics = analytics::calculate_oee(&state.pool, machine_id, start, end).await?;
    Ok(Json(metrics))
}

pub async fn downtime(
    State(state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> ShopfloorResult<Json<BTreeMap<String, CategoryBreakdown>>> {
    let (start, end) = query.required_range()?;
    let stops = analytics::fetch_stops(&state.pool, query.machine_id, start, end).await?;
    Ok(Json(analytics::downtime_by_category(&stops)))
}

pub async fn production(
    State(state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> ShopfloorResult<Json<ProductionSummary>> {
    let (start, end) = query.required_range()?;
    let jobs = analytics::fetch_jobs(&state.pool, query.machine_id, start, end).await?;
    Ok(Json(analytics::production_summary(&jobs)))
}

pub async fn utilization(
    State(state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> ShopfloorResult<Json<Vec<MachineUtilization>>> {
    let (start, end) = query.required_range()?;
    let rows = analytics::get_machine_utilization(&state.pool, start, end).await?;
    Ok(Json(rows))
}

pub async fn top_reasons(
    State(state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> ShopfloorResult<Json<Vec<ReasonSummary>>> {
    let (start, end) = query.required_range()?;
    let limit = query.limit.unwrap_or(10).clamp(1, 100) as usize;
    let stops = analytics::fetch_stops(&state.pool, query.machine_id, start, end).await?;
    Ok(Json(analytics::top_stop_reasons(&stops, limit)))
}

pub async fn shifts(
    State(state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> ShopfloorResult<Json<Vec<ShiftPerformance>>> {
    let (start, end) = query.required_range()?;
    let rows =
        analytics::get_shift_performance(&state.pool, query.machine_id, start, end).await?;
    Ok(Json(rows))
}
