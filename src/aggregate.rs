//! Metrics aggregation: latest value per metric type and bounded trend series.
//!
//! Everything here is a pure function over borrowed observations. Fetching
//! the observations is the caller's job.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, NaiveDate, Utc};

use crate::models::{
    ActivitySummary, LearningActivityRecord, MetricObservation, MetricTrend, TrendPoint,
};

pub const DEFAULT_TREND_WINDOW: i64 = 7;
pub const DEFAULT_LABEL_FORMAT: &str = "%b %-d";

pub type LatestMetricsSnapshot = BTreeMap<String, MetricObservation>;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AggregateError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Keeps the observation with the latest `calculation_date` per metric type.
///
/// An entry is only replaced by a strictly later date, so the first one seen
/// wins a tie and an observation without a usable date never displaces one
/// that has it.
pub fn latest_by_type(observations: &[MetricObservation]) -> LatestMetricsSnapshot {
    let mut latest = LatestMetricsSnapshot::new();

    for observation in observations {
        match latest.get_mut(&observation.metric_type) {
            None => {
                latest.insert(observation.metric_type.clone(), observation.clone());
            }
            Some(current) => {
                // Option orders None below every Some.
                if observation.calculation_date > current.calculation_date {
                    *current = observation.clone();
                }
            }
        }
    }

    latest
}

/// Chart series for one metric type: the `window_size` most recent
/// observations, oldest first.
pub fn trend(
    observations: &[MetricObservation],
    metric_type: &str,
    window_size: i64,
    label_format: &str,
) -> Result<Vec<TrendPoint>, AggregateError> {
    if window_size < 0 {
        return Err(AggregateError::InvalidArgument(format!(
            "window size must be non-negative, got {window_size}"
        )));
    }
    validate_label_format(label_format)?;
    let window = usize::try_from(window_size).unwrap_or(usize::MAX);

    let mut matching: Vec<&MetricObservation> = observations
        .iter()
        .filter(|observation| observation.metric_type == metric_type)
        .collect();
    // Stable, so input already sorted newest-first keeps its order.
    matching.sort_by(|a, b| b.calculation_date.cmp(&a.calculation_date));
    matching.truncate(window);

    Ok(matching
        .into_iter()
        .rev()
        .map(|observation| TrendPoint {
            label: format_label(observation.calculation_date, label_format),
            value: observation.value,
        })
        .collect())
}

/// One trend per metric type present in the input, ordered by metric type.
pub fn trends_by_type(
    observations: &[MetricObservation],
    window_size: i64,
    label_format: &str,
) -> Result<Vec<MetricTrend>, AggregateError> {
    validate_label_format(label_format)?;
    let mut metric_types: Vec<&str> = observations
        .iter()
        .map(|observation| observation.metric_type.as_str())
        .collect();
    metric_types.sort_unstable();
    metric_types.dedup();

    metric_types
        .into_iter()
        .map(|metric_type| {
            Ok(MetricTrend {
                metric_type: metric_type.to_string(),
                points: trend(observations, metric_type, window_size, label_format)?,
            })
        })
        .collect()
}

/// Rejects strftime patterns chrono cannot render.
pub fn validate_label_format(label_format: &str) -> Result<(), AggregateError> {
    if StrftimeItems::new(label_format).any(|item| matches!(item, Item::Error)) {
        return Err(AggregateError::InvalidArgument(format!(
            "unsupported label format {label_format:?}"
        )));
    }
    Ok(())
}

/// Falls back to an ISO date when `label_format` cannot be rendered.
pub fn format_label(date: Option<DateTime<Utc>>, label_format: &str) -> String {
    let Some(date) = date else {
        return "unknown".to_string();
    };

    let mut label = String::new();
    if write!(label, "{}", date.format(label_format)).is_err() {
        return date.format("%Y-%m-%d").to_string();
    }
    label
}

pub fn summarize_activity(records: &[LearningActivityRecord]) -> Vec<ActivitySummary> {
    let mut map: HashMap<&'static str, ActivitySummary> = HashMap::new();

    for record in records {
        let kind = record.event.kind();
        let entry = map.entry(kind).or_insert_with(|| ActivitySummary {
            kind: kind.to_string(),
            count: 0,
            total_duration_seconds: 0,
            last_seen: record.timestamp,
        });

        entry.count += 1;
        entry.total_duration_seconds += u64::from(record.event.duration_seconds().unwrap_or(0));
        if record.timestamp > entry.last_seen {
            entry.last_seen = record.timestamp;
        }
    }

    let mut summaries: Vec<ActivitySummary> = map.into_values().collect();
    summaries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.kind.cmp(&b.kind)));
    summaries
}

/// Event counts per calendar day (UTC), oldest day first.
pub fn activity_by_day(records: &[LearningActivityRecord]) -> Vec<(NaiveDate, usize)> {
    let mut days: BTreeMap<NaiveDate, usize> = BTreeMap::new();

    for record in records {
        *days.entry(record.timestamp.date_naive()).or_default() += 1;
    }

    days.into_iter().collect()
}
