use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use chrono::{Local, Utc};
use clap::{Parser, Subcommand};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};
use uuid::Uuid;

mod auth;
mod config;
mod db;
mod error;
mod extract;
mod identity;
mod models;
mod records;
mod report;
mod risk;
mod routes;
mod server;
mod state;
mod store;
mod trainer;

use config::{Config, DatabaseConfig};
use identity::SupabaseAuth;
use models::{Profile, Role};
use state::AppState;
use store::{MemoryStore, Store};

#[derive(Parser)]
#[command(name = "dropout-risk-tracker")]
#[command(about = "Student dropout risk tracker API and classifier trainer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Keep records in process memory instead of Postgres
        #[arg(long)]
        in_memory: bool,
    },
    /// Create or upgrade the database schema
    InitDb,
    /// Load sample students, attendance and marks
    Seed,
    /// Import students from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Generate a markdown risk report
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Grant the admin role to an existing profile
    Promote {
        #[arg(long)]
        user_id: Uuid,
    },
    /// Write a synthetic training dataset
    GenerateData {
        #[arg(long, default_value = "data/raw/student_data.csv")]
        out: PathBuf,
        #[arg(long, default_value_t = 5000)]
        samples: usize,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
    /// Train the risk classifier and save its artifacts
    Train {
        #[arg(long, default_value = "data/raw/student_data.csv")]
        data: PathBuf,
        #[arg(long, default_value = "models")]
        models_dir: PathBuf,
        #[arg(long, default_value_t = 100)]
        trees: usize,
        #[arg(long, default_value_t = 10)]
        max_depth: usize,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
}

async fn connect(config: &DatabaseConfig) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await
        .context("failed to connect to Postgres")
}

async fn pg_store() -> anyhow::Result<db::PgStore> {
    let pool = connect(&DatabaseConfig::load()?).await?;
    Ok(db::PgStore::new(pool))
}

async fn serve(in_memory: bool) -> anyhow::Result<()> {
    let config = Config::load(!in_memory)?;
    let identity = Arc::new(SupabaseAuth::new(config.supabase.clone()));

    let store: Arc<dyn Store> = match &config.database {
        Some(database) => Arc::new(db::PgStore::new(connect(database).await?)),
        None => {
            warn!("Using the in-memory store, records are lost on shutdown");
            Arc::new(MemoryStore::new())
        }
    };

    server::start_server(AppState::new(identity, store), config.port, &config.cors_origins).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { in_memory } => serve(in_memory).await?,
        Commands::InitDb => {
            let pool = connect(&DatabaseConfig::load()?).await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let store = pg_store().await?;
            let inserted = db::seed(&store).await?;
            println!("Seeded {inserted} students.");
        }
        Commands::Import { csv } => {
            let store = pg_store().await?;
            let summary = db::import_csv(&store, &csv).await?;
            println!(
                "Inserted {} students from {} ({} already present, {} rejected).",
                summary.inserted,
                csv.display(),
                summary.skipped,
                summary.rejected
            );
        }
        Commands::Report { out } => {
            let store = pg_store().await?;
            let students = store.list_students(false).await?;
            let predictions = store.recent_predictions(5).await?;
            let report = report::build_report(Local::now().date_naive(), &students, &predictions);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Promote { user_id } => {
            let store = pg_store().await?;
            let profile = store
                .get_profile(user_id)
                .await?
                .with_context(|| format!("no profile for user {user_id}"))?;
            let promoted = store
                .upsert_profile(&Profile {
                    role: Role::Admin,
                    updated_at: Utc::now(),
                    ..profile
                })
                .await?;
            info!(user_id = %promoted.id, "granted admin role");
            println!("{} is now an admin.", promoted.email);
        }
        Commands::GenerateData { out, samples, seed } => {
            if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            let dataset = trainer::dataset::generate(samples, seed);
            dataset.write_csv(&out)?;

            let mut counts = [0usize; trainer::RISK_CLASSES];
            for label in &dataset.labels {
                counts[*label] += 1;
            }
            println!(
                "Wrote {samples} samples to {} (low {}, medium {}, high {}).",
                out.display(),
                counts[0],
                counts[1],
                counts[2]
            );
        }
        Commands::Train {
            data,
            models_dir,
            trees,
            max_depth,
            seed,
        } => {
            let options = trainer::TrainingOptions {
                trees,
                max_depth,
                seed,
                ..Default::default()
            };
            let outcome =
                tokio::task::spawn_blocking(move || trainer::train(&data, &models_dir, &options))
                    .await
                    .context("training task failed")??;

            println!(
                "Trained on {} rows, evaluated on {}.\n",
                outcome.train_rows, outcome.test_rows
            );
            println!("{}", outcome.evaluation);
            println!("Model saved to {}.", outcome.artifacts.model.display());
            println!(
                "Preprocessor saved to {}.",
                outcome.artifacts.preprocessor.display()
            );
            println!(
                "Latest pointers: {}, {}.",
                outcome.artifacts.latest_model.display(),
                outcome.artifacts.latest_preprocessor.display()
            );
        }
    }

    Ok(())
}
