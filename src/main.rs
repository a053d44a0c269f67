use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use student_analytics::cache::RedisCache;
use student_analytics::config::AppConfig;
use student_analytics::db::{self, PgStore};
use student_analytics::events::RedisPublisher;
use student_analytics::http::{self, AppState};
use student_analytics::{import, AnalyticsOrchestrator, CallContext};

#[derive(Parser)]
#[command(name = "student-analytics")]
#[command(about = "Student activity analytics service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Run the HTTP API
    Serve,
    /// Submit student logs from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Show analytics for a student, requesting analysis if none exist
    Analytics {
        #[arg(long)]
        student_id: i64,
    },
    /// Request a fresh analysis for a student
    Trigger {
        #[arg(long)]
        student_id: i64,
    },
    /// List recent logs for a student
    Logs {
        #[arg(long)]
        student_id: i64,
        #[arg(long, default_value_t = 30)]
        since_days: i64,
    },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

fn build_orchestrator(pool: PgPool, config: &AppConfig) -> anyhow::Result<AnalyticsOrchestrator> {
    let store = PgStore::new(pool).with_call_budget(config.call_timeout);
    let cache = RedisCache::new(&config.redis_url)
        .context("invalid REDIS_URL")?
        .with_call_budget(config.call_timeout);
    let publisher = RedisPublisher::new(&config.redis_url)
        .context("invalid REDIS_URL")?
        .with_call_budget(config.call_timeout);
    Ok(AnalyticsOrchestrator::new(
        Arc::new(store),
        Arc::new(cache),
        Arc::new(publisher),
    ))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to install ctrl-c handler; serving until killed");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = AppConfig::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;

    let ctx = CallContext::with_timeout(config.call_timeout * 4);

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Serve => {
            let orchestrator = build_orchestrator(pool, &config)?;
            let app = http::router(AppState::new(orchestrator, config.call_timeout));
            let listener = tokio::net::TcpListener::bind(config.http_addr)
                .await
                .context("failed to bind HTTP listener")?;
            tracing::info!(addr = %config.http_addr, "student analytics listening");
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await
                .context("server terminated with error")?;
        }
        Commands::Import { csv } => {
            let file = std::fs::File::open(&csv)
                .with_context(|| format!("failed to open {}", csv.display()))?;
            let orchestrator = build_orchestrator(pool, &config)?;
            let summary =
                import::import_csv(&orchestrator, &CallContext::background(), file).await?;
            println!(
                "Recorded {} logs from {} ({} rejected, {} not announced).",
                summary.recorded,
                csv.display(),
                summary.rejected,
                summary.unannounced
            );
        }
        Commands::Analytics { student_id } => {
            let orchestrator = build_orchestrator(pool, &config)?;
            let view = orchestrator.get_analytics(&ctx, student_id).await?;
            let pending = view.is_pending();
            let analytics = view.into_inner();
            if pending {
                println!("Analysis requested for student {student_id}; check back shortly.");
                return Ok(());
            }
            println!(
                "Student {} ({}) engagement {} success {:.0}% as of {}",
                analytics.student_id,
                analytics.cluster_group,
                analytics.engagement_score,
                analytics.success_rate * 100.0,
                analytics.analyzed_at
            );
            let mut topics: Vec<_> = analytics.topic_efficiency.iter().collect();
            topics.sort_by(|a, b| a.0.cmp(b.0));
            for (topic, efficiency) in topics {
                println!("  {topic}: {efficiency:.2}");
            }
            for recommendation in &analytics.recommendations {
                println!("- {recommendation}");
            }
        }
        Commands::Trigger { student_id } => {
            let orchestrator = build_orchestrator(pool, &config)?;
            orchestrator.trigger_analysis(&ctx, student_id).await?;
            println!("Analysis requested for student {student_id}.");
        }
        Commands::Logs {
            student_id,
            since_days,
        } => {
            let to = Utc::now();
            let from = to - Duration::days(since_days.max(1));
            let orchestrator = build_orchestrator(pool, &config)?;
            let logs = orchestrator
                .list_student_logs(&ctx, student_id, from, to)
                .await?;

            if logs.is_empty() {
                println!("No logs found for this window.");
                return Ok(());
            }

            for log in &logs {
                let when = log
                    .timestamp
                    .map(|ts| ts.to_rfc3339())
                    .unwrap_or_default();
                println!(
                    "- {} {} on {} ({}s, correct: {})",
                    when, log.action_type, log.material_id, log.time_spent_sec, log.correct
                );
            }
        }
    }

    Ok(())
}
