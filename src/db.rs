use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{ActivityEvent, LearningActivityRecord, MetricObservation};
use crate::source::{CacheKey, MetricsSource};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let metrics = vec![
        ("seed-m-001", "student-001", "class-algebra-1", "engagement", 62.0, "2026-01-26T15:00:00Z"),
        ("seed-m-002", "student-001", "class-algebra-1", "engagement", 71.0, "2026-02-02T15:00:00Z"),
        ("seed-m-003", "student-001", "class-algebra-1", "engagement", 68.0, "2026-02-09T15:00:00Z"),
        ("seed-m-004", "student-001", "class-algebra-1", "comprehension", 74.0, "2026-01-26T15:00:00Z"),
        ("seed-m-005", "student-001", "class-algebra-1", "comprehension", 81.0, "2026-02-09T15:00:00Z"),
        ("seed-m-006", "student-001", "class-algebra-1", "participation", 9.0, "2026-02-09T15:00:00Z"),
        ("seed-m-007", "student-001", "class-algebra-1", "progress", 35.0, "2026-01-26T15:00:00Z"),
        ("seed-m-008", "student-001", "class-algebra-1", "progress", 48.0, "2026-02-02T15:00:00Z"),
        ("seed-m-009", "student-001", "class-algebra-1", "progress", 57.0, "2026-02-09T15:00:00Z"),
        ("seed-m-010", "student-002", "class-algebra-1", "engagement", 88.0, "2026-02-09T15:00:00Z"),
    ];

    for (source_key, subject_id, scope_id, metric_type, value, calculated_at) in metrics {
        let calculated_at: DateTime<Utc> = calculated_at.parse().context("invalid seed date")?;
        insert_metric(
            pool,
            source_key,
            subject_id,
            scope_id,
            metric_type,
            value,
            Some(calculated_at),
        )
        .await?;
    }

    for record in seed_activity()? {
        insert_activity(pool, &record).await?;
    }

    Ok(())
}

/// Fixed ids and timestamps so repeated seeding inserts nothing new.
fn seed_activity() -> anyhow::Result<Vec<LearningActivityRecord>> {
    let events = vec![
        (
            "5b0f3c1e-7a52-4c4e-9a1d-0f6f2f7e9a01",
            "2026-02-03T16:20:00Z",
            ActivityEvent::LessonViewed {
                lesson_id: "linear-equations-1".to_string(),
                duration_seconds: 840,
            },
        ),
        (
            "5b0f3c1e-7a52-4c4e-9a1d-0f6f2f7e9a02",
            "2026-02-05T17:05:00Z",
            ActivityEvent::QuizCompleted {
                quiz_id: "linear-equations-quiz".to_string(),
                score: 8.0,
                max_score: 10.0,
            },
        ),
        (
            "5b0f3c1e-7a52-4c4e-9a1d-0f6f2f7e9a03",
            "2026-02-08T20:45:00Z",
            ActivityEvent::AssignmentSubmitted {
                assignment_id: "homework-4".to_string(),
                on_time: true,
            },
        ),
    ];

    let mut records = Vec::with_capacity(events.len());
    for (id, occurred_at, event) in events {
        records.push(LearningActivityRecord {
            id: Uuid::parse_str(id)?,
            subject_id: "student-001".to_string(),
            scope_id: "class-algebra-1".to_string(),
            timestamp: occurred_at
                .parse::<DateTime<Utc>>()
                .context("invalid seed timestamp")?,
            event,
        });
    }

    Ok(records)
}

async fn insert_activity(pool: &PgPool, record: &LearningActivityRecord) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO learning_metrics.activity_records
        (id, subject_id, scope_id, activity_type, occurred_at, payload)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(record.id)
    .bind(&record.subject_id)
    .bind(&record.scope_id)
    .bind(record.event.kind())
    .bind(record.timestamp)
    .bind(Json(&record.event))
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

async fn insert_metric(
    pool: &PgPool,
    source_key: &str,
    subject_id: &str,
    scope_id: &str,
    metric_type: &str,
    value: f64,
    calculated_at: Option<DateTime<Utc>>,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO learning_metrics.performance_metrics
        (id, subject_id, scope_id, metric_type, value, calculation_date, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(subject_id)
    .bind(scope_id)
    .bind(metric_type)
    .bind(value)
    .bind(calculated_at)
    .bind(source_key)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

#[derive(Debug, serde::Deserialize)]
struct MetricCsvRow {
    subject_id: String,
    scope_id: String,
    metric_type: String,
    #[serde(default, deserialize_with = "crate::models::deserialize_lenient_value")]
    value: f64,
    #[serde(default, deserialize_with = "crate::models::deserialize_lenient_date")]
    calculation_date: Option<DateTime<Utc>>,
    source_key: Option<String>,
}

fn read_metric_rows<R: std::io::Read>(input: R) -> anyhow::Result<Vec<MetricCsvRow>> {
    let mut reader = csv::Reader::from_reader(input);
    let mut rows = Vec::new();

    for (index, result) in reader.deserialize::<MetricCsvRow>().enumerate() {
        let row = result.with_context(|| format!("invalid csv row {}", index + 1))?;
        rows.push(row);
    }

    Ok(rows)
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let rows = read_metric_rows(file)?;
    let mut inserted = 0usize;

    for row in rows {
        let source_key = row
            .source_key
            .filter(|key| !key.trim().is_empty())
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        let was_inserted = insert_metric(
            pool,
            &source_key,
            &row.subject_id,
            &row.scope_id,
            &row.metric_type,
            row.value,
            row.calculation_date,
        )
        .await?;

        if was_inserted {
            inserted += 1;
        }
    }

    Ok(inserted)
}

/// Postgres-backed `MetricsSource`. Reads are capped at the configured
/// limits and ordered newest first.
#[derive(Clone)]
pub struct PgSource {
    pool: PgPool,
    metrics_limit: i64,
    activity_limit: i64,
}

impl PgSource {
    pub fn new(pool: PgPool, metrics_limit: i64, activity_limit: i64) -> Self {
        Self {
            pool,
            metrics_limit,
            activity_limit,
        }
    }
}

#[async_trait]
impl MetricsSource for PgSource {
    async fn fetch_metrics(&self, key: &CacheKey) -> anyhow::Result<Vec<MetricObservation>> {
        let rows = sqlx::query(
            r#"
            SELECT id, subject_id, scope_id, metric_type, value, calculation_date
            FROM learning_metrics.performance_metrics
            WHERE subject_id = $1 AND scope_id = $2
            ORDER BY calculation_date DESC NULLS LAST
            LIMIT $3
            "#,
        )
        .bind(&key.subject_id)
        .bind(&key.scope_id)
        .bind(self.metrics_limit)
        .fetch_all(&self.pool)
        .await?;

        let mut metrics = Vec::with_capacity(rows.len());
        for row in rows {
            let value: Option<f64> = row.get("value");
            metrics.push(MetricObservation {
                id: row.get("id"),
                metric_type: row.get("metric_type"),
                value: value.filter(|v| v.is_finite()).unwrap_or(0.0),
                calculation_date: row.get("calculation_date"),
                scope_id: row.get("scope_id"),
                subject_id: row.get("subject_id"),
            });
        }

        Ok(metrics)
    }

    async fn fetch_activity(&self, key: &CacheKey) -> anyhow::Result<Vec<LearningActivityRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, subject_id, scope_id, occurred_at, payload
            FROM learning_metrics.activity_records
            WHERE subject_id = $1 AND scope_id = $2
            ORDER BY occurred_at DESC
            LIMIT $3
            "#,
        )
        .bind(&key.subject_id)
        .bind(&key.scope_id)
        .bind(self.activity_limit)
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let id: Uuid = row.get("id");
            match row.try_get::<Json<ActivityEvent>, _>("payload") {
                Ok(Json(event)) => records.push(LearningActivityRecord {
                    id,
                    subject_id: row.get("subject_id"),
                    scope_id: row.get("scope_id"),
                    timestamp: row.get("occurred_at"),
                    event,
                }),
                Err(err) => {
                    tracing::warn!(%id, error = %err, "skipping activity record with unreadable payload");
                }
            }
        }

        Ok(records)
    }

    async fn record_activity(
        &self,
        key: &CacheKey,
        event: ActivityEvent,
    ) -> anyhow::Result<LearningActivityRecord> {
        let record = LearningActivityRecord {
            id: Uuid::new_v4(),
            subject_id: key.subject_id.clone(),
            scope_id: key.scope_id.clone(),
            timestamp: Utc::now(),
            event,
        };

        insert_activity(&self.pool, &record).await?;

        tracing::debug!(id = %record.id, kind = record.event.kind(), "activity recorded");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn csv_rows_tolerate_bad_values_and_dates() {
        let input = "\
subject_id,scope_id,metric_type,value,calculation_date,source_key
student-001,class-1,engagement,72.5,2024-01-03,row-1
student-001,class-1,engagement,n/a,2024-01-04T10:00:00Z,
student-001,class-1,progress,40,sometime,row-3
";

        let rows = read_metric_rows(input.as_bytes()).unwrap();
        assert_eq!(rows.len(), 3);

        assert_eq!(rows[0].value, 72.5);
        assert_eq!(
            rows[0].calculation_date,
            Some(Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap())
        );
        assert_eq!(rows[0].source_key.as_deref(), Some("row-1"));

        assert_eq!(rows[1].value, 0.0);
        assert_eq!(
            rows[1].calculation_date,
            Some(Utc.with_ymd_and_hms(2024, 1, 4, 10, 0, 0).unwrap())
        );

        assert_eq!(rows[2].metric_type, "progress");
        assert_eq!(rows[2].value, 40.0);
        assert_eq!(rows[2].calculation_date, None);
    }

    #[test]
    fn csv_without_value_column_imports_zeroes() {
        let input = "\
subject_id,scope_id,metric_type,calculation_date
student-001,class-1,participation,2024-01-03
";

        let rows = read_metric_rows(input.as_bytes()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, 0.0);
        assert_eq!(rows[0].source_key, None);
    }

    #[test]
    fn seeded_activity_is_stable_between_runs() {
        let first = seed_activity().unwrap();
        let second = seed_activity().unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
        let ids: std::collections::HashSet<Uuid> = first.iter().map(|r| r.id).collect();
        assert_eq!(ids.len(), 3);
        assert_eq!(
            first[0].timestamp,
            Utc.with_ymd_and_hms(2026, 2, 3, 16, 20, 0).unwrap()
        );
    }

    #[test]
    fn csv_missing_columns_are_reported() {
        let input = "subject_id,scope_id\nstudent-001,class-1\n";
        let err = read_metric_rows(input.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("invalid csv row 1"));
    }
}
