use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use plagiarism::analyzer::MossAnalyzer;
use plagiarism::gate::DbLockStore;
use plagiarism::progress::TracingNotifier;
use plagiarism::store::{DbStore, PlagiarismStore};
use plagiarism::vcs::GitCli;
use plagiarism::{CheckOptions, PlagiarismDetectionService, PlagiarismError, ServiceSettings};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use util::config;
use util::logging::init_logging;

#[derive(Parser, Debug)]
#[command(name = "plagiarism", about = "Run plagiarism checks on exercises")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check one exercise and store the result
    Check {
        #[arg(long)]
        exercise: i64,
        /// Similarity threshold in percent
        #[arg(long, default_value_t = 50.0)]
        threshold: f32,
        /// Minimum submission score in percent (0 = no filter)
        #[arg(long, default_value_t = 0)]
        min_score: u32,
        /// Minimum size: tokens for code, words for text (0 = no filter)
        #[arg(long, default_value_t = 0)]
        min_size: u32,
        /// Write the result as JSON to this file
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Apply database migrations
    Migrate,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _log_guard = init_logging(&config::log_file(), &config::log_level());
    let cli = Cli::parse();

    let outcome = match cli.command {
        Command::Migrate => migrate().await,
        Command::Check {
            exercise,
            threshold,
            min_score,
            min_size,
            out,
        } => {
            let options = CheckOptions {
                similarity_threshold: threshold,
                minimum_score: min_score,
                minimum_size: min_size,
            };
            check(exercise, options, out).await
        }
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<PlagiarismError>() {
                Some(pe) if pe.is_user_facing() => eprintln!("{pe}"),
                _ => eprintln!("Error: {e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

async fn migrate() -> Result<()> {
    let url = db::database_url(&config::database_path());
    migration::runner::run_all_migrations(&url)
        .await
        .context("applying migrations")
}

async fn check(exercise_id: i64, options: CheckOptions, out: Option<PathBuf>) -> Result<()> {
    let conn = db::connect().await.context("connecting to database")?;
    let store = Arc::new(DbStore::new(conn.clone()));

    let service = PlagiarismDetectionService::new(
        store.clone(),
        Arc::new(DbLockStore::from_config(conn)),
        Arc::new(GitCli::from_config()),
        Arc::new(MossAnalyzer::from_config()),
        Arc::new(TracingNotifier),
        ServiceSettings::from_config(),
    );

    let outcome = service.check(exercise_id, options).await;
    // Nothing else will run in this process; remove downloads right away.
    service.shutdown().await;

    let report = match outcome {
        Ok(report) => report,
        Err(e @ PlagiarismError::InsufficientData { .. }) => {
            store
                .save_result(&plagiarism::PlagiarismResult::empty(exercise_id))
                .await?;
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };

    store.save_result(&report.result).await?;

    println!(
        "Exercise {exercise_id}: {} comparison(s) at or above {}% in {} ms",
        report.result.comparisons.len(),
        options.similarity_threshold,
        report.result.duration_ms
    );
    for c in report.result.comparisons.iter().take(10) {
        println!(
            "  {:>6.1}%  submission {} <-> submission {}",
            c.similarity, c.submission_a, c.submission_b
        );
    }
    for w in &report.warnings {
        println!("  warning [{:?}] {}: {}", w.kind, w.subject, w.message);
    }
    if let Ok(cleanup) = report.cleanup.await {
        for w in cleanup.warnings {
            println!("  warning [{:?}] {}: {}", w.kind, w.subject, w.message);
        }
    }

    if let Some(path) = out {
        util::paths::ensure_parent_dir(&path)?;
        let json = serde_json::to_string_pretty(&report.result)?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        println!("Result written to {}", path.display());
    }
    Ok(())
}
