use async_trait::async_trait;

use crate::models::{ActivityEvent, LearningActivityRecord, MetricObservation};

/// Identifies one student's dashboard within one class.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub subject_id: String,
    pub scope_id: String,
}

impl CacheKey {
    pub fn new(subject_id: impl Into<String>, scope_id: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            scope_id: scope_id.into(),
        }
    }
}

/// Backend query layer the dashboard reads from and records activity into.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Most recent performance metrics for the key, newest first.
    async fn fetch_metrics(&self, key: &CacheKey) -> anyhow::Result<Vec<MetricObservation>>;

    /// Most recent activity records for the key, newest first.
    async fn fetch_activity(&self, key: &CacheKey) -> anyhow::Result<Vec<LearningActivityRecord>>;

    async fn record_activity(
        &self,
        key: &CacheKey,
        event: ActivityEvent,
    ) -> anyhow::Result<LearningActivityRecord>;
}
