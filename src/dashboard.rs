use chrono::NaiveDate;

use crate::aggregate::{self, LatestMetricsSnapshot};
use crate::cache::MetricsCache;
use crate::config::DashboardSettings;
use crate::models::{ActivityEvent, ActivitySummary, LearningActivityRecord, MetricTrend, TrendPoint};
use crate::source::{CacheKey, MetricsSource};

#[derive(Debug, Clone)]
pub struct Dashboard {
    pub key: CacheKey,
    pub latest: LatestMetricsSnapshot,
    pub trends: Vec<MetricTrend>,
    pub activity: Vec<ActivitySummary>,
    pub activity_by_day: Vec<(NaiveDate, usize)>,
}

pub struct DashboardService<S> {
    source: S,
    cache: MetricsCache,
    settings: DashboardSettings,
}

impl<S: MetricsSource> DashboardService<S> {
    pub fn new(source: S, cache: MetricsCache, settings: DashboardSettings) -> Self {
        Self {
            source,
            cache,
            settings,
        }
    }

    pub async fn latest(&mut self, key: &CacheKey) -> anyhow::Result<LatestMetricsSnapshot> {
        let rows = self.cache.get_or_fetch(&self.source, key).await?;
        Ok(aggregate::latest_by_type(&rows.metrics))
    }

    pub async fn trend(
        &mut self,
        key: &CacheKey,
        metric_type: &str,
        window_size: Option<i64>,
    ) -> anyhow::Result<Vec<TrendPoint>> {
        let window_size = window_size.unwrap_or(self.settings.trend_window);
        let rows = self.cache.get_or_fetch(&self.source, key).await?;
        let points = aggregate::trend(
            &rows.metrics,
            metric_type,
            window_size,
            &self.settings.label_format,
        )?;
        Ok(points)
    }

    pub async fn dashboard(&mut self, key: &CacheKey) -> anyhow::Result<Dashboard> {
        let rows = self.cache.get_or_fetch(&self.source, key).await?;
        let latest = aggregate::latest_by_type(&rows.metrics);
        let trends = aggregate::trends_by_type(
            &rows.metrics,
            self.settings.trend_window,
            &self.settings.label_format,
        )?;

        tracing::info!(
            subject = %key.subject_id,
            scope = %key.scope_id,
            metrics = rows.metrics.len(),
            activity = rows.activity.len(),
            "dashboard assembled"
        );

        Ok(Dashboard {
            key: key.clone(),
            latest,
            trends,
            activity: aggregate::summarize_activity(&rows.activity),
            activity_by_day: aggregate::activity_by_day(&rows.activity),
        })
    }

    /// Records an event and drops the cached rows it makes stale.
    pub async fn record_activity(
        &mut self,
        key: &CacheKey,
        event: ActivityEvent,
    ) -> anyhow::Result<LearningActivityRecord> {
        let record = self.source.record_activity(key, event).await?;
        self.cache.invalidate(key);
        Ok(record)
    }

    pub fn cache(&self) -> &MetricsCache {
        &self.cache
    }
}
