use anyhow::Context;
use serde::Deserialize;

use crate::aggregate::{validate_label_format, DEFAULT_LABEL_FORMAT, DEFAULT_TREND_WINDOW};

pub const CONFIG_FILE: &str = "config/learning-metrics";
pub const ENV_PREFIX: &str = "LEARNING_METRICS";

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub dashboard: DashboardSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardSettings {
    pub metrics_limit: i64,
    pub activity_limit: i64,
    pub trend_window: i64,
    pub label_format: String,
}

fn builder() -> anyhow::Result<config::ConfigBuilder<config::builder::DefaultState>> {
    Ok(config::Config::builder()
        .set_default("database.max_connections", 5)?
        .set_default("dashboard.metrics_limit", 30)?
        .set_default("dashboard.activity_limit", 100)?
        .set_default("dashboard.trend_window", DEFAULT_TREND_WINDOW)?
        .set_default("dashboard.label_format", DEFAULT_LABEL_FORMAT)?)
}

/// Defaults, then `config/learning-metrics.*`, then `LEARNING_METRICS__*`
/// variables, then `DATABASE_URL`.
pub fn load_settings() -> anyhow::Result<Settings> {
    let settings = builder()?
        .add_source(config::File::with_name(CONFIG_FILE).required(false))
        .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
        .set_override_option("database.url", std::env::var("DATABASE_URL").ok())?
        .build()?;

    finish(settings)
}

fn finish(settings: config::Config) -> anyhow::Result<Settings> {
    let settings: Settings = settings
        .try_deserialize()
        .context("invalid learning-metrics settings")?;

    validate_label_format(&settings.dashboard.label_format)
        .context("invalid dashboard.label_format")?;

    Ok(settings)
}

#[cfg(test)]
fn settings_from_toml(toml: &str) -> anyhow::Result<Settings> {
    let settings = builder()?
        .add_source(config::File::from_str(toml, config::FileFormat::Toml))
        .build()?;
    finish(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_everything_but_the_url() {
        let settings = settings_from_toml(
            r#"
            [database]
            url = "postgres://localhost/learning"
            "#,
        )
        .unwrap();

        assert_eq!(settings.database.max_connections, 5);
        assert_eq!(settings.dashboard.metrics_limit, 30);
        assert_eq!(settings.dashboard.activity_limit, 100);
        assert_eq!(settings.dashboard.trend_window, 7);
        assert_eq!(settings.dashboard.label_format, "%b %-d");
    }

    #[test]
    fn file_values_override_defaults() {
        let settings = settings_from_toml(
            r#"
            [database]
            url = "postgres://localhost/learning"
            max_connections = 12

            [dashboard]
            trend_window = 14
            label_format = "%Y-%m-%d"
            "#,
        )
        .unwrap();

        assert_eq!(settings.database.max_connections, 12);
        assert_eq!(settings.dashboard.trend_window, 14);
        assert_eq!(settings.dashboard.label_format, "%Y-%m-%d");
        assert_eq!(settings.dashboard.metrics_limit, 30);
    }

    #[test]
    fn missing_database_url_is_an_error() {
        let err = settings_from_toml("").unwrap_err();
        assert!(format!("{err:#}").contains("url"));
    }

    #[test]
    fn bad_value_types_are_not_reported_as_a_missing_url() {
        let err = settings_from_toml(
            r#"
            [database]
            url = "postgres://localhost/learning"

            [dashboard]
            trend_window = "weekly"
            "#,
        )
        .unwrap_err();

        let message = format!("{err:#}");
        assert!(message.contains("invalid learning-metrics settings"));
        assert!(!message.contains("DATABASE_URL"));
    }

    #[test]
    fn unrenderable_label_format_is_rejected_at_load() {
        let err = settings_from_toml(
            r#"
            [database]
            url = "postgres://localhost/learning"

            [dashboard]
            label_format = "%Q"
            "#,
        )
        .unwrap_err();

        assert!(format!("{err:#}").contains("invalid dashboard.label_format"));
    }
}
