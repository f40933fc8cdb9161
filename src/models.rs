use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// One recorded measurement of a metric for a student within a class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricObservation {
    pub id: Uuid,
    pub metric_type: String,
    #[serde(default, deserialize_with = "deserialize_lenient_value")]
    pub value: f64,
    #[serde(default, deserialize_with = "deserialize_lenient_date")]
    pub calculation_date: Option<DateTime<Utc>>,
    pub scope_id: String,
    pub subject_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub label: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricTrend {
    pub metric_type: String,
    pub points: Vec<TrendPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActivityEvent {
    LessonViewed {
        lesson_id: String,
        duration_seconds: u32,
    },
    AssignmentSubmitted {
        assignment_id: String,
        on_time: bool,
    },
    QuizCompleted {
        quiz_id: String,
        score: f64,
        max_score: f64,
    },
    ResourceOpened {
        resource_id: String,
    },
    DiscussionPosted {
        thread_id: String,
        word_count: u32,
    },
}

impl ActivityEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ActivityEvent::LessonViewed { .. } => "lesson_viewed",
            ActivityEvent::AssignmentSubmitted { .. } => "assignment_submitted",
            ActivityEvent::QuizCompleted { .. } => "quiz_completed",
            ActivityEvent::ResourceOpened { .. } => "resource_opened",
            ActivityEvent::DiscussionPosted { .. } => "discussion_posted",
        }
    }

    /// Time spent, for the event kinds that carry one.
    pub fn duration_seconds(&self) -> Option<u32> {
        match self {
            ActivityEvent::LessonViewed {
                duration_seconds, ..
            } => Some(*duration_seconds),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningActivityRecord {
    pub id: Uuid,
    pub subject_id: String,
    pub scope_id: String,
    pub timestamp: DateTime<Utc>,
    pub event: ActivityEvent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActivitySummary {
    pub kind: String,
    pub count: usize,
    pub total_duration_seconds: u64,
    pub last_seen: DateTime<Utc>,
}

/// Parses the date shapes the portal emits. Anything else yields `None`.
pub fn parse_calculation_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }

    if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(parsed.and_utc());
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Numbers and numeric strings pass through; everything else becomes 0.
pub fn coerce_value(raw: &serde_json::Value) -> f64 {
    let value = match raw {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match value {
        Some(v) if v.is_finite() => v,
        _ => {
            tracing::warn!(raw = %raw, "non-numeric metric value coerced to 0");
            0.0
        }
    }
}

pub fn deserialize_lenient_value<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    Ok(coerce_value(&raw))
}

pub fn deserialize_lenient_date<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    let parsed = match &raw {
        serde_json::Value::String(s) => parse_calculation_date(s),
        _ => None,
    };

    if parsed.is_none() && !raw.is_null() {
        tracing::warn!(raw = %raw, "unparseable calculation date treated as earliest");
    }

    Ok(parsed)
}
