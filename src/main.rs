use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

use learning_metrics::cache::MetricsCache;
use learning_metrics::config::load_settings;
use learning_metrics::dashboard::DashboardService;
use learning_metrics::db::{self, PgSource};
use learning_metrics::models::ActivityEvent;
use learning_metrics::report;
use learning_metrics::source::CacheKey;

#[derive(Parser)]
#[command(name = "learning-metrics")]
#[command(about = "Learning metrics and activity dashboards for class portals", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Target {
    /// Student the dashboard belongs to
    #[arg(long)]
    subject: String,
    /// Class the dashboard belongs to
    #[arg(long)]
    scope: String,
}

impl Target {
    fn key(&self) -> CacheKey {
        CacheKey::new(self.subject.as_str(), self.scope.as_str())
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import performance metrics from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Show the latest value of every metric type
    Latest {
        #[command(flatten)]
        target: Target,
    },
    /// Show the trend series for one metric type
    Trend {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        metric: String,
        #[arg(long, allow_negative_numbers = true)]
        window: Option<i64>,
    },
    /// Record a learning activity event given as JSON
    Record {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        event: String,
    },
    /// Generate a markdown dashboard report
    Report {
        #[command(flatten)]
        target: Target,
        #[arg(long, default_value = "dashboard.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = load_settings()?;

    let pool = PgPoolOptions::new()
        .max_connections(settings.database.max_connections)
        .connect(&settings.database.url)
        .await
        .context("failed to connect to Postgres")?;

    let source = PgSource::new(
        pool.clone(),
        settings.dashboard.metrics_limit,
        settings.dashboard.activity_limit,
    );
    let label_format = settings.dashboard.label_format.clone();
    let mut service = DashboardService::new(source, MetricsCache::new(), settings.dashboard);

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} metrics from {}.", csv.display());
        }
        Commands::Latest { target } => {
            let latest = service.latest(&target.key()).await?;

            if latest.is_empty() {
                println!("No metrics recorded for {} in {}.", target.subject, target.scope);
                return Ok(());
            }

            println!("Latest metrics for {} in {}:", target.subject, target.scope);
            for (metric_type, observation) in latest.iter() {
                println!(
                    "- {}: {:.1} (as of {})",
                    metric_type,
                    observation.value,
                    learning_metrics::aggregate::format_label(
                        observation.calculation_date,
                        &label_format
                    )
                );
            }
        }
        Commands::Trend {
            target,
            metric,
            window,
        } => {
            let points = service.trend(&target.key(), &metric, window).await?;

            if points.is_empty() {
                println!("No {metric} observations for {} in {}.", target.subject, target.scope);
                return Ok(());
            }

            println!("{} {}", metric, report::sparkline(&points));
            for point in points.iter() {
                println!("- {}: {:.1}", point.label, point.value);
            }
        }
        Commands::Record { target, event } => {
            let event: ActivityEvent =
                serde_json::from_str(&event).context("event must be a tagged activity JSON object")?;
            let record = service.record_activity(&target.key(), event).await?;
            println!(
                "Recorded {} for {} in {} ({}).",
                record.event.kind(),
                record.subject_id,
                record.scope_id,
                record.id
            );
        }
        Commands::Report { target, out } => {
            let dashboard = service.dashboard(&target.key()).await?;
            let report = report::build_report(&dashboard, &label_format);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
