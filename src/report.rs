use std::fmt::Write;

use crate::dashboard::Dashboard;
use crate::models::TrendPoint;

const SPARK_BARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Single-line bar rendering of a trend, scaled to its own min and max.
pub fn sparkline(points: &[TrendPoint]) -> String {
    let min = points.iter().map(|p| p.value).fold(f64::INFINITY, f64::min);
    let max = points.iter().map(|p| p.value).fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;

    points
        .iter()
        .map(|point| {
            if span <= f64::EPSILON {
                return SPARK_BARS[SPARK_BARS.len() / 2];
            }
            let scaled = ((point.value - min) / span * (SPARK_BARS.len() - 1) as f64).round();
            SPARK_BARS[scaled as usize]
        })
        .collect()
}

pub fn build_report(dashboard: &Dashboard, label_format: &str) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Learning Dashboard");
    let _ = writeln!(
        output,
        "Generated for {} in {}",
        dashboard.key.subject_id, dashboard.key.scope_id
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Latest Metrics");

    if dashboard.latest.is_empty() {
        let _ = writeln!(output, "No metrics recorded yet.");
    } else {
        for (metric_type, observation) in dashboard.latest.iter() {
            let _ = writeln!(
                output,
                "- {}: {:.1} (as of {})",
                metric_type,
                observation.value,
                crate::aggregate::format_label(observation.calculation_date, label_format)
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Trends");

    if dashboard.trends.is_empty() {
        let _ = writeln!(output, "No trend data available.");
    } else {
        for trend in dashboard.trends.iter() {
            let series = trend
                .points
                .iter()
                .map(|point| format!("{} {:.1}", point.label, point.value))
                .collect::<Vec<_>>()
                .join(", ");
            let _ = writeln!(
                output,
                "- {} {}: {}",
                trend.metric_type,
                sparkline(&trend.points),
                series
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Activity Mix");

    if dashboard.activity.is_empty() {
        let _ = writeln!(output, "No activity recorded for this class.");
    } else {
        for summary in dashboard.activity.iter() {
            let _ = write!(
                output,
                "- {}: {} events, last on {}",
                summary.kind,
                summary.count,
                summary.last_seen.format("%Y-%m-%d")
            );
            if summary.total_duration_seconds > 0 {
                let _ = write!(
                    output,
                    " ({} min total)",
                    summary.total_duration_seconds / 60
                );
            }
            let _ = writeln!(output);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Daily Activity");

    if dashboard.activity_by_day.is_empty() {
        let _ = writeln!(output, "No activity recorded for this class.");
    } else {
        for (day, count) in dashboard.activity_by_day.iter() {
            let _ = writeln!(output, "- {}: {}", day, count);
        }
    }

    output
}
