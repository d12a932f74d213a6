//! Command-line interface
//!
//! `serve` starts the HTTP API, `train` runs a full session locally against a
//! CSV file and prints the leaderboard, `algorithms` lists the catalogue.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use colored::*;

use crate::artifacts::MemoryArtifactStore;
use crate::config::Settings;
use crate::data::load_csv;
use crate::session::{SessionStatus, SessionStore, TrainingScheduler};
use crate::training::{Algorithm, ProblemType, TrainingConfig};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString { s.truecolor(100, 210, 120) }
fn bad(s: &str) -> ColoredString { s.truecolor(230, 110, 110) }

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn step_fail(msg: &str) {
    println!("  {} {}", bad("✗"), msg);
}

fn step_run(msg: &str) {
    println!("  {} {}...", accent("›"), msg);
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn kv(key: &str, val: &str) {
    println!("  {:<16} {}", muted(key), val.white());
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "automl")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Train, rank and serve tabular models")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API
    Serve {
        /// Server port (defaults to API_PORT or 8000)
        #[arg(short, long)]
        port: Option<u16>,

        /// Server host (defaults to API_HOST or 0.0.0.0)
        #[arg(long)]
        host: Option<String>,
    },

    /// Train every selected algorithm on a CSV file and print the leaderboard
    Train {
        /// Input CSV file
        #[arg(short, long)]
        data: PathBuf,

        /// Target column (omit for clustering)
        #[arg(short, long)]
        target: Option<String>,

        /// classification, regression or clustering
        #[arg(long, default_value = "classification")]
        problem_type: String,

        /// Comma-separated algorithm names; all applicable ones when omitted
        #[arg(short, long, value_delimiter = ',')]
        algorithms: Vec<String>,

        /// Comma-separated feature columns; every non-target column when omitted
        #[arg(short, long, value_delimiter = ',')]
        features: Vec<String>,

        /// Held-out fraction
        #[arg(long, default_value = "0.2")]
        test_size: f64,

        /// Number of cross-validation folds
        #[arg(long, default_value = "5")]
        cv_folds: usize,

        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Worker pool size
        #[arg(short, long)]
        workers: Option<usize>,

        /// Stop waiting after this many seconds
        #[arg(long, default_value = "3600")]
        timeout_secs: u64,

        /// Write the finished session as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the algorithm catalogue
    Algorithms {
        /// Only this problem type
        problem_type: Option<String>,
    },
}

/// Options of the `train` command
pub struct TrainArgs {
    pub data: PathBuf,
    pub target: Option<String>,
    pub problem_type: String,
    pub algorithms: Vec<String>,
    pub features: Vec<String>,
    pub test_size: f64,
    pub cv_folds: usize,
    pub seed: u64,
    pub workers: Option<usize>,
    pub timeout: Duration,
    pub output: Option<PathBuf>,
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub async fn cmd_serve(host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let mut settings = Settings::default();
    if let Some(host) = host {
        settings.host = host;
    }
    if let Some(port) = port {
        settings.port = port;
    }
    crate::server::run_server(settings).await
}

pub fn cmd_train(args: TrainArgs) -> anyhow::Result<()> {
    section("Train");

    let problem_type: ProblemType = args.problem_type.parse()?;
    let algorithms: Vec<Algorithm> = if args.algorithms.is_empty() {
        Algorithm::ALL
            .iter()
            .copied()
            .filter(|a| a.problem_type() == problem_type)
            .collect()
    } else {
        args.algorithms
            .iter()
            .map(|a| a.trim().parse())
            .collect::<crate::error::Result<_>>()?
    };

    step_run(&format!("Loading {}", args.data.display()));
    let start = Instant::now();
    let data = Arc::new(load_csv(&args.data)?);
    step_ok(&format!(
        "{} rows × {} cols in {:.2?}",
        data.n_rows(),
        data.n_cols(),
        start.elapsed()
    ));

    let mut config = TrainingConfig::new(args.data.display().to_string(), problem_type)
        .with_algorithms(algorithms)
        .with_features(args.features)
        .with_test_size(args.test_size)
        .with_cv_folds(args.cv_folds)
        .with_random_state(args.seed);
    if let Some(target) = args.target {
        config = config.with_target(target);
    }

    let mut settings = Settings::default();
    if let Some(workers) = args.workers {
        settings = settings.with_max_workers(workers);
    }
    let artifacts = Arc::new(MemoryArtifactStore::new());
    let sessions = Arc::new(SessionStore::new(artifacts.clone()));
    let scheduler = TrainingScheduler::new(&settings, Arc::clone(&sessions), artifacts)?;

    let session_id = scheduler.submit(config, data)?;
    step_run(&format!(
        "Training on {} workers (session {})",
        scheduler.max_workers(),
        accent(&session_id)
    ));

    // Report models as they finish
    let deadline = Instant::now() + args.timeout;
    let mut reported = 0;
    let snapshot = loop {
        let snapshot = sessions.get_snapshot(&session_id)?;
        for name in snapshot.completed_models.iter().skip(reported) {
            step_ok(name);
        }
        reported = snapshot.completed_models.len();
        if snapshot.status.is_terminal() || Instant::now() >= deadline {
            break snapshot;
        }
        std::thread::sleep(Duration::from_millis(100));
    };

    let session = sessions.get_full(&session_id)?;
    for (model, error) in &session.failures {
        step_fail(&format!("{}: {}", model, error));
    }

    match snapshot.status {
        SessionStatus::Completed => {
            let metric = problem_type.primary_metric();
            section("Leaderboard");
            println!(
                "  {:<4} {:<28} {:>10} {:>10} {:>9}",
                muted("#"),
                muted("model"),
                muted(metric),
                muted("cv mean"),
                muted("time")
            );
            for (rank, result) in session.leaderboard().iter().enumerate() {
                let score = result.metrics.get(metric).copied().unwrap_or(f64::NAN);
                let line = format!(
                    "{:<4} {:<28} {:>10.4} {:>10.4} {:>8.2}s",
                    rank + 1,
                    result.model_name,
                    score,
                    result.cv_mean,
                    result.training_time
                );
                if rank == 0 {
                    println!("  {}", line.white().bold());
                } else {
                    println!("  {}", line);
                }
            }
            println!();
            kv("Best model", session.best_model.as_deref().unwrap_or("-"));
        }
        SessionStatus::Failed => {
            section("Failed");
            println!("  {}", bad(session.error.as_deref().unwrap_or("unknown error")));
        }
        status => {
            section("Timed out");
            kv("Status", status.as_str());
            kv("Completed", &format!("{}/{}", snapshot.completed_models.len(), snapshot.total_models));
        }
    }

    if let Some(path) = args.output.as_deref() {
        export_session(path, &serde_json::to_value(&session)?)?;
        kv("Saved", &path.display().to_string());
    }
    println!();

    if snapshot.status == SessionStatus::Failed {
        anyhow::bail!("training session failed");
    }
    Ok(())
}

fn export_session(path: &Path, session: &serde_json::Value) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_vec_pretty(session)?)?;
    Ok(())
}

pub fn cmd_algorithms(problem_type: Option<&str>) -> anyhow::Result<()> {
    let types = match problem_type {
        Some(p) => vec![p.parse::<ProblemType>()?],
        None => vec![ProblemType::Classification, ProblemType::Regression, ProblemType::Clustering],
    };
    for problem_type in types {
        section(&format!("{} algorithms", problem_type));
        for spec in Algorithm::catalogue(problem_type) {
            println!("  {:<28} {}", accent(spec.name), dim(spec.description));
        }
    }
    println!();
    Ok(())
}
