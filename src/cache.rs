//! Caller-owned cache of fetched dashboard rows.
//!
//! Entries are keyed by `(subject_id, scope_id)` and live until the owner
//! invalidates them. Any write for a key must be followed by `invalidate`.

use std::collections::HashMap;

use crate::models::{LearningActivityRecord, MetricObservation};
use crate::source::{CacheKey, MetricsSource};

#[derive(Debug, Clone, Default)]
pub struct CachedRows {
    pub metrics: Vec<MetricObservation>,
    pub activity: Vec<LearningActivityRecord>,
}

#[derive(Debug, Default)]
pub struct MetricsCache {
    entries: HashMap<CacheKey, CachedRows>,
}

impl MetricsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached rows for `key`, fetching from `source` on a miss.
    pub async fn get_or_fetch<S>(&mut self, source: &S, key: &CacheKey) -> anyhow::Result<&CachedRows>
    where
        S: MetricsSource + ?Sized,
    {
        if !self.entries.contains_key(key) {
            tracing::debug!(subject = %key.subject_id, scope = %key.scope_id, "cache miss");
            let metrics = source.fetch_metrics(key).await?;
            let activity = source.fetch_activity(key).await?;
            self.entries
                .insert(key.clone(), CachedRows { metrics, activity });
        }

        Ok(&self.entries[key])
    }

    /// Drops the entry for `key`. Returns whether one was present.
    pub fn invalidate(&mut self, key: &CacheKey) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{parse_calculation_date, ActivityEvent};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use uuid::Uuid;

    /// In-memory source that counts fetches.
    #[derive(Default)]
    pub(crate) struct MemorySource {
        pub metrics: Mutex<Vec<MetricObservation>>,
        pub activity: Mutex<Vec<LearningActivityRecord>>,
        pub fetches: AtomicUsize,
    }

    impl MemorySource {
        pub(crate) fn with_metrics(metrics: Vec<MetricObservation>) -> Self {
            Self {
                metrics: Mutex::new(metrics),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl MetricsSource for MemorySource {
        async fn fetch_metrics(&self, key: &CacheKey) -> anyhow::Result<Vec<MetricObservation>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .metrics
                .lock()
                .unwrap()
                .iter()
                .filter(|m| m.subject_id == key.subject_id && m.scope_id == key.scope_id)
                .cloned()
                .collect())
        }

        async fn fetch_activity(
            &self,
            key: &CacheKey,
        ) -> anyhow::Result<Vec<LearningActivityRecord>> {
            let mut records: Vec<LearningActivityRecord> = self
                .activity
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.subject_id == key.subject_id && r.scope_id == key.scope_id)
                .cloned()
                .collect();
            records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
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
            self.activity.lock().unwrap().push(record.clone());
            Ok(record)
        }
    }

    pub(crate) fn observation(subject: &str, scope: &str, metric_type: &str, date: &str, value: f64) -> MetricObservation {
        MetricObservation {
            id: Uuid::new_v4(),
            metric_type: metric_type.to_string(),
            value,
            calculation_date: parse_calculation_date(date),
            scope_id: scope.to_string(),
            subject_id: subject.to_string(),
        }
    }

    #[tokio::test]
    async fn second_read_is_served_from_cache() {
        let source = MemorySource::with_metrics(vec![observation(
            "student-001",
            "class-1",
            "engagement",
            "2024-01-01",
            50.0,
        )]);
        let key = CacheKey::new("student-001", "class-1");
        let mut cache = MetricsCache::new();

        let first = cache.get_or_fetch(&source, &key).await.unwrap().metrics.len();
        let second = cache.get_or_fetch(&source, &key).await.unwrap().metrics.len();

        assert_eq!(first, 1);
        assert_eq!(second, 1);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn keys_are_isolated_and_invalidation_refetches() {
        let source = MemorySource::with_metrics(vec![
            observation("student-001", "class-1", "engagement", "2024-01-01", 50.0),
            observation("student-002", "class-1", "engagement", "2024-01-01", 90.0),
        ]);
        let first_key = CacheKey::new("student-001", "class-1");
        let other_key = CacheKey::new("student-002", "class-1");
        let mut cache = MetricsCache::new();

        cache.get_or_fetch(&source, &first_key).await.unwrap();
        let other = cache.get_or_fetch(&source, &other_key).await.unwrap();
        assert_eq!(other.metrics[0].value, 90.0);
        assert_eq!(cache.len(), 2);

        assert!(cache.invalidate(&first_key));
        assert!(!cache.invalidate(&first_key));
        assert!(!cache.contains(&first_key));
        assert!(cache.contains(&other_key));

        cache.get_or_fetch(&source, &first_key).await.unwrap();
        assert_eq!(source.fetches.load(Ordering::SeqCst), 3);

        cache.clear();
        assert!(cache.is_empty());
    }
}
