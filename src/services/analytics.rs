use chrono::{DateTime, Timelike, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::db::{DbPool, Job, Shift, StopWithReason};
use crate::error::ShopfloorResult;

/// Stop categories treated as planned downtime. Stops with these reasons
/// count toward total downtime but not toward availability loss.
const PLANNED_CATEGORIES: [&str; 2] = ["SETUP", "MAINTENANCE"];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OeeMetrics {
    pub oee: f64,
    pub availability: f64,
    pub performance: f64,
    pub quality: f64,
    pub total_hours: f64,
    pub downtime_hours: f64,
    pub planned_production_time: f64,
    pub total_parts: i64,
    pub good_parts: i64,
    pub rejected_parts: i64,
    pub stop_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasonBreakdown {
    pub reason_id: i32,
    pub reason_text: String,
    pub count: u32,
    pub total_duration: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryBreakdown {
    pub count: u32,
    pub total_duration: i64,
    pub reasons: Vec<ReasonBreakdown>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasonSummary {
    pub reason_id: i32,
    pub reason_code: String,
    pub reason_text: String,
    pub category: String,
    pub count: u32,
    pub total_duration: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductionSummary {
    pub total_jobs: usize,
    pub completed_jobs: usize,
    pub active_jobs: usize,
    pub total_parts: i64,
    pub produced_parts: i64,
    pub good_parts: i64,
    pub rejected_parts: i64,
    pub avg_cycle_time: f64,
    pub completion_rate: f64,
    pub yield_rate: f64,
    pub rejection_rate: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineUtilization {
    pub machine_id: i32,
    pub machine_name: String,
    pub total_hours: f64,
    pub downtime_hours: f64,
    pub utilization_rate: f64,
    pub stop_count: i64,
    pub job_count: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftPerformance {
    pub shift_id: i32,
    pub shift_name: String,
    pub stop_count: usize,
    pub total_downtime: i64,
    pub downtime_hours: f64,
}

fn window_hours(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_milliseconds() as f64 / 3_600_000.0
}

fn sum_duration(stops: &[StopWithReason]) -> i64 {
    stops.iter().map(|s| s.duration.unwrap_or(0) as i64).sum()
}

pub fn is_planned_category(category: &str) -> bool {
    PLANNED_CATEGORIES.contains(&category)
}

/// OEE over a time window. Availability is zero when no production time is
/// planned, and is deliberately NOT floored at zero when unplanned downtime
/// exceeds planned production time; the reported components are capped at
/// 100 only from above.
pub fn compute_oee(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    stops: &[StopWithReason],
    jobs: &[Job],
) -> OeeMetrics {
    let total_hours = window_hours(start, end);

    let downtime_hours = sum_duration(stops) as f64 / 3600.0;
    let planned_production_time = total_hours - downtime_hours;

    let unplanned_secs: i64 = stops
        .iter()
        .filter(|s| !is_planned_category(&s.category))
        .map(|s| s.duration.unwrap_or(0) as i64)
        .sum();
    let unplanned_downtime_hours = unplanned_secs as f64 / 3600.0;

    let availability = if planned_production_time > 0.0 {
        (planned_production_time - unplanned_downtime_hours) / planned_production_time * 100.0
    } else {
        0.0
    };

    let good_parts: i64 = jobs.iter().map(|j| j.good_parts as i64).sum();
    let rejected_parts: i64 = jobs.iter().map(|j| j.rejected_parts as i64).sum();
    let total_parts = good_parts + rejected_parts;

    let (avg_cycle_time, avg_insert_time) = if jobs.is_empty() {
        (0.0, 0.0)
    } else {
        let n = jobs.len() as f64;
        (
            jobs.iter().map(|j| j.actual_cycle_time.unwrap_or(0.0)).sum::<f64>() / n,
            jobs.iter().map(|j| j.insert_time.unwrap_or(0.0)).sum::<f64>() / n,
        )
    };

    let performance = if avg_cycle_time > 0.0 && avg_insert_time > 0.0 {
        avg_insert_time / avg_cycle_time * 100.0
    } else {
        100.0
    };

    let quality = if total_parts > 0 {
        good_parts as f64 / total_parts as f64 * 100.0
    } else {
        100.0
    };

    let oee = availability * performance * quality / 10_000.0;

    OeeMetrics {
        oee: oee.min(100.0),
        availability: availability.min(100.0),
        performance: performance.min(100.0),
        quality: quality.min(100.0),
        total_hours,
        downtime_hours,
        planned_production_time,
        total_parts,
        good_parts,
        rejected_parts,
        stop_count: stops.len(),
    }
}

pub fn downtime_by_category(stops: &[StopWithReason]) -> BTreeMap<String, CategoryBreakdown> {
    let mut breakdown: BTreeMap<String, CategoryBreakdown> = BTreeMap::new();

    for stop in stops {
        let duration = stop.duration.unwrap_or(0) as i64;
        let entry = breakdown
            .entry(stop.category.clone())
            .or_insert_with(|| CategoryBreakdown {
                count: 0,
                total_duration: 0,
                reasons: Vec::new(),
            });
        entry.count += 1;
        entry.total_duration += duration;

        match entry.reasons.iter_mut().find(|r| r.reason_id == stop.reason_id) {
            Some(reason) => {
                reason.count += 1;
                reason.total_duration += duration;
            }
            None => entry.reasons.push(ReasonBreakdown {
                reason_id: stop.reason_id,
                reason_text: stop.reason_text.clone(),
                count: 1,
                total_duration: duration,
            }),
        }
    }

    breakdown
}

pub fn top_stop_reasons(stops: &[StopWithReason], limit: usize) -> Vec<ReasonSummary> {
    let mut by_reason: BTreeMap<i32, ReasonSummary> = BTreeMap::new();

    for stop in stops {
        let entry = by_reason
            .entry(stop.reason_id)
            .or_insert_with(|| ReasonSummary {
                reason_id: stop.reason_id,
                reason_code: stop.reason_code.clone(),
                reason_text: stop.reason_text.clone(),
                category: stop.category.clone(),
                count: 0,
                total_duration: 0,
            });
        entry.count += 1;
        entry.total_duration += stop.duration.unwrap_or(0) as i64;
    }

    let mut summaries: Vec<ReasonSummary> = by_reason.into_values().collect();
    summaries.sort_by(|a, b| b.total_duration.cmp(&a.total_duration));
    summaries.truncate(limit);
    summaries
}

pub fn production_summary(jobs: &[Job]) -> ProductionSummary {
    let total_jobs = jobs.len();
    let completed_jobs = jobs.iter().filter(|j| j.is_completed).count();
    let active_jobs = jobs
        .iter()
        .filter(|j| !j.is_completed && j.end_time.is_none())
        .count();

    let total_parts: i64 = jobs.iter().map(|j| j.target_quantity as i64).sum();
    let good_parts: i64 = jobs.iter().map(|j| j.good_parts as i64).sum();
    let rejected_parts: i64 = jobs.iter().map(|j| j.rejected_parts as i64).sum();
    let produced_parts = good_parts + rejected_parts;

    let avg_cycle_time = if total_jobs > 0 {
        jobs.iter().map(|j| j.actual_cycle_time.unwrap_or(0.0)).sum::<f64>() / total_jobs as f64
    } else {
        0.0
    };

    ProductionSummary {
        total_jobs,
        completed_jobs,
        active_jobs,
        total_parts,
        produced_parts,
        good_parts,
        rejected_parts,
        avg_cycle_time,
        completion_rate: if total_jobs > 0 {
            completed_jobs as f64 / total_jobs as f64 * 100.0
        } else {
            0.0
        },
        yield_rate: if produced_parts > 0 {
            good_parts as f64 / produced_parts as f64 * 100.0
        } else {
            0.0
        },
        rejection_rate: if produced_parts > 0 {
            rejected_parts as f64 / produced_parts as f64 * 100.0
        } else {
            0.0
        },
    }
}

fn parse_shift_hour(time_of_day: &str) -> u32 {
    time_of_day
        .split(':')
        .next()
        .and_then(|h| h.parse().ok())
        .unwrap_or(0)
}

/// A stop belongs to a shift when its start HOUR falls in the shift's
/// [startHour, endHour) window. Overnight shifts (startHour > endHour) wrap
/// around midnight.
pub fn stop_in_shift(stop_hour: u32, shift_start: u32, shift_end: u32) -> bool {
    if shift_start < shift_end {
        stop_hour >= shift_start && stop_hour < shift_end
    } else {
        stop_hour >= shift_start || stop_hour < shift_end
    }
}

pub fn shift_performance(shifts: &[Shift], stops: &[StopWithReason]) -> Vec<ShiftPerformance> {
    shifts
        .iter()
        .map(|shift| {
            let start_hour = parse_shift_hour(&shift.start_time);
            let end_hour = parse_shift_hour(&shift.end_time);

            let shift_stops: Vec<&StopWithReason> = stops
                .iter()
                .filter(|s| stop_in_shift(s.start_time.hour(), start_hour, end_hour))
                .collect();

            let total_downtime: i64 = shift_stops
                .iter()
                .map(|s| s.duration.unwrap_or(0) as i64)
                .sum();

            ShiftPerformance {
                shift_id: shift.id,
                shift_name: shift.name.clone(),
                stop_count: shift_stops.len(),
                total_downtime,
                downtime_hours: total_downtime as f64 / 3600.0,
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Fetch wrappers: each request aggregates fresh rows, no caching.
// ---------------------------------------------------------------------------

pub async fn fetch_stops(
    pool: &DbPool,
    machine_id: Option<i32>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> ShopfloorResult<Vec<StopWithReason>> {
    let rows = sqlx::query_as::<_, StopWithReason>(
        "SELECT s.id, s.machine_id, s.reason_id, s.start_time, s.duration,
                r.reason_code, r.reason_text, r.category
         FROM stops s
         JOIN stop_reasons r ON r.id = s.reason_id
         WHERE s.start_time >= $1 AND s.start_time <= $2
           AND ($3::int IS NULL OR s.machine_id = $3)
         ORDER BY s.start_time ASC",
    )
    .bind(start)
    .bind(end)
    .bind(machine_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn fetch_jobs(
    pool: &DbPool,
    machine_id: Option<i32>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> ShopfloorResult<Vec<Job>> {
    let rows = sqlx::query_as::<_, Job>(
        "SELECT * FROM jobs
         WHERE start_time >= $1 AND start_time <= $2
           AND ($3::int IS NULL OR machine_id = $3)
         ORDER BY start_time ASC",
    )
    .bind(start)
    .bind(end)
    .bind(machine_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn calculate_oee(
    pool: &DbPool,
    machine_id: i32,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> ShopfloorResult<OeeMetrics> {
    let stops = fetch_stops(pool, Some(machine_id), start, end).await?;
    let jobs = fetch_jobs(pool, Some(machine_id), start, end).await?;
    Ok(compute_oee(start, end, &stops, &jobs))
}

pub async fn get_machine_utilization(
    pool: &DbPool,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> ShopfloorResult<Vec<MachineUtilization>> {
    #[derive(sqlx::FromRow)]
    struct UtilizationRow {
        id: i32,
        name: String,
        downtime: i64,
        stop_count: i64,
        job_count: i64,
    }

    let rows = sqlx::query_as::<_, UtilizationRow>(
        "SELECT m.id, m.name,
                COALESCE((SELECT SUM(s.duration) FROM stops s
                          WHERE s.machine_id = m.id
                            AND s.start_time >= $1 AND s.start_time <= $2), 0)::bigint AS downtime,
                (SELECT COUNT(*) FROM stops s
                 WHERE s.machine_id = m.id
                   AND s.start_time >= $1 AND s.start_time <= $2) AS stop_count,
                (SELECT COUNT(*) FROM jobs j
                 WHERE j.machine_id = m.id
                   AND j.start_time >= $1 AND j.start_time <= $2) AS job_count
         FROM machines m
         WHERE m.is_active = TRUE
         ORDER BY m.name ASC",
    )
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    let total_hours = window_hours(start, end);

    Ok(rows
        .into_iter()
        .map(|row| {
            let downtime_hours = row.downtime as f64 / 3600.0;
            let utilization_rate = if total_hours > 0.0 {
                (total_hours - downtime_hours) / total_hours * 100.0
            } else {
                0.0
            };
            MachineUtilization {
                machine_id: row.id,
                machine_name: row.name,
                total_hours,
                downtime_hours,
                utilization_rate: utilization_rate.min(100.0),
                stop_count: row.stop_count,
                job_count: row.job_count,
            }
        })
        .collect())
}

pub async fn get_shift_performance(
    pool: &DbPool,
    machine_id: Option<i32>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> ShopfloorResult<Vec<ShiftPerformance>> {
    let shifts = sqlx::query_as::<_, Shift>(
        "SELECT * FROM shifts WHERE is_active = TRUE ORDER BY sort_order ASC",
    )
    .fetch_all(pool)
    .await?;

    let stops = fetch_stops(pool, machine_id, start, end).await?;
    Ok(shift_performance(&shifts, &stops))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 3, 2, 18, 0, 0).unwrap();
        (start, end)
    }

    fn stop(id: i32, category: &str, duration: i32, hour: u32) -> StopWithReason {
        StopWithReason {
            id,
            machine_id: 1,
            reason_id: id,
            start_time: Utc.with_ymd_and_hms(2026, 3, 2, hour, 15, 0).unwrap(),
            duration: Some(duration),
            reason_code: format!("R{:02}", id),
            reason_text: format!("Reason {}", id),
            category: category.to_string(),
        }
    }

    fn job(good: i32, rejected: i32, insert: f64, cycle: f64) -> Job {
        Job {
            id: 1,
            machine_id: 1,
            job_number: None,
            part_name: None,
            target_quantity: good + rejected,
            cycle_count: good + rejected,
            good_parts: good,
            rejected_parts: rejected,
            insert_time: Some(insert),
            actual_cycle_time: Some(cycle),
            start_time: Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap(),
            end_time: None,
            is_completed: false,
            created_at: Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap(),
        }
    }

    #[test]
    fn oee_worked_example() {
        // 10h window, one 1800s MECHANICAL stop, 90 good / 10 rejected parts,
        // ideal cycle 120s vs actual 150s.
        let (start, end) = window();
        let stops = vec![stop(1, "MECHANICAL", 1800, 9)];
        let jobs = vec![job(90, 10, 120.0, 150.0)];

        let m = compute_oee(start, end, &stops, &jobs);

        assert!((m.downtime_hours - 0.5).abs() < 1e-9);
        assert!((m.quality - 90.0).abs() < 1e-9);
        assert!((m.performance - 80.0).abs() < 1e-9);
        assert!((m.availability - (9.5 - 0.5) / 9.5 * 100.0).abs() < 1e-9);
        assert!((m.oee - 68.21).abs() < 0.01);
    }

    #[test]
    fn oee_equals_component_product() {
        let (start, end) = window();
        let stops = vec![
            stop(1, "MECHANICAL", 900, 9),
            stop(2, "SETUP", 600, 10),
            stop(3, "QUALITY", 300, 12),
        ];
        let jobs = vec![job(45, 5, 100.0, 110.0), job(30, 2, 90.0, 95.0)];

        let m = compute_oee(start, end, &stops, &jobs);
        let product = m.availability * m.performance * m.quality / 10_000.0;
        assert!((m.oee - product).abs() < 1e-9);
    }

    #[test]
    fn planned_categories_excluded_from_unplanned_downtime() {
        let (start, end) = window();
        // Only SETUP and MAINTENANCE stops: availability loss must be zero.
        let stops = vec![stop(1, "SETUP", 1800, 9), stop(2, "MAINTENANCE", 3600, 11)];

        let m = compute_oee(start, end, &stops, &[]);

        assert!((m.downtime_hours - 1.5).abs() < 1e-9);
        assert!((m.availability - 100.0).abs() < 1e-9);
    }

    #[test]
    fn availability_zero_when_no_planned_time_remains() {
        let (start, end) = window();
        // 10h of SETUP downtime wipes out the whole window.
        let stops = vec![stop(1, "SETUP", 36_000, 9)];
        let m = compute_oee(start, end, &stops, &[]);
        assert_eq!(m.availability, 0.0);
        assert_eq!(m.oee, 0.0);
    }

    #[test]
    fn availability_goes_negative_when_unplanned_exceeds_planned() {
        // 9h unplanned downtime against a 10h window leaves 1h of planned
        // time; the formula yields a negative availability and that is what
        // gets reported (no floor at zero).
        let (start, end) = window();
        let stops = vec![stop(1, "MECHANICAL", 32_400, 9)];
        let m = compute_oee(start, end, &stops, &[]);
        assert!(m.availability < 0.0);
    }

    #[test]
    fn performance_and_quality_default_to_100() {
        let (start, end) = window();
        let m = compute_oee(start, end, &[], &[]);
        assert!((m.performance - 100.0).abs() < 1e-9);
        assert!((m.quality - 100.0).abs() < 1e-9);
        assert!((m.availability - 100.0).abs() < 1e-9);
    }

    #[test]
    fn downtime_groups_by_category_and_reason() {
        let stops = vec![
            stop(1, "MECHANICAL", 600, 9),
            stop(1, "MECHANICAL", 300, 10),
            stop(2, "MATERIAL", 120, 11),
        ];
        let breakdown = downtime_by_category(&stops);

        let mech = &breakdown["MECHANICAL"];
        assert_eq!(mech.count, 2);
        assert_eq!(mech.total_duration, 900);
        assert_eq!(mech.reasons.len(), 1);
        assert_eq!(mech.reasons[0].count, 2);

        assert_eq!(breakdown["MATERIAL"].total_duration, 120);
    }

    #[test]
    fn top_reasons_sorted_by_duration_and_limited() {
        let stops = vec![
            stop(1, "MECHANICAL", 100, 9),
            stop(2, "MATERIAL", 500, 10),
            stop(3, "QUALITY", 300, 11),
        ];
        let top = top_stop_reasons(&stops, 2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].reason_id, 2);
        assert_eq!(top[1].reason_id, 3);
    }

    #[test]
    fn production_summary_rates() {
        let mut completed = job(90, 10, 100.0, 120.0);
        completed.is_completed = true;
        let jobs = vec![completed, job(40, 0, 100.0, 100.0)];

        let s = production_summary(&jobs);
        assert_eq!(s.total_jobs, 2);
        assert_eq!(s.completed_jobs, 1);
        assert_eq!(s.active_jobs, 1);
        assert_eq!(s.produced_parts, 140);
        assert!((s.completion_rate - 50.0).abs() < 1e-9);
        assert!((s.yield_rate - 130.0 / 140.0 * 100.0).abs() < 1e-9);
        assert!((s.rejection_rate - 10.0 / 140.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn empty_production_summary_has_zero_rates() {
        let s = production_summary(&[]);
        assert_eq!(s.completion_rate, 0.0);
        assert_eq!(s.yield_rate, 0.0);
        assert_eq!(s.rejection_rate, 0.0);
    }

    #[test]
    fn day_shift_window_is_half_open() {
        assert!(stop_in_shift(6, 6, 14));
        assert!(stop_in_shift(13, 6, 14));
        assert!(!stop_in_shift(14, 6, 14));
        assert!(!stop_in_shift(5, 6, 14));
    }

    #[test]
    fn overnight_shift_wraps_around_midnight() {
        assert!(stop_in_shift(23, 22, 6));
        assert!(stop_in_shift(3, 22, 6));
        assert!(stop_in_shift(22, 22, 6));
        assert!(!stop_in_shift(6, 22, 6));
        assert!(!stop_in_shift(12, 22, 6));
    }

    #[test]
    fn shift_performance_buckets_stops() {
        let shifts = vec![
            Shift {
                id: 1,
                name: "Morning".to_string(),
                start_time: "06:00".to_string(),
                end_time: "14:00".to_string(),
                color: "#fff".to_string(),
                sort_order: 1,
                is_active: true,
                created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            },
            Shift {
                id: 2,
                name: "Night".to_string(),
                start_time: "22:00".to_string(),
                end_time: "06:00".to_string(),
                color: "#000".to_string(),
                sort_order: 2,
                is_active: true,
                created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            },
        ];
        let stops = vec![
            stop(1, "MECHANICAL", 600, 9),
            stop(2, "MECHANICAL", 300, 23),
            stop(3, "MATERIAL", 120, 2),
        ];

        let perf = shift_performance(&shifts, &stops);
        assert_eq!(perf[0].stop_count, 1);
        assert_eq!(perf[0].total_downtime, 600);
        assert_eq!(perf[1].stop_count, 2);
        assert_eq!(perf[1].total_downtime, 420);
    }
}
