//! Feeds conversations flagged for training back into the vector store.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use rag_agent_backend::core::config::AppPaths;
use rag_agent_backend::core::logging;
use rag_agent_backend::feedback::TrainingReport;
use rag_agent_backend::history::ConversationStore;
use rag_agent_backend::state::AppState;

const ANALYTICS_DAYS: u32 = 7;

#[derive(Debug, Parser)]
#[command(name = "rag-train", about = "Vectorize conversations flagged for training")]
struct Args {
    /// Maximum conversations per batch (defaults to `training.batch_limit`).
    #[arg(long)]
    limit: Option<usize>,

    /// Keep running, one batch per interval.
    #[arg(long)]
    continuous: bool,

    /// Seconds between batches in continuous mode (defaults to
    /// `training.interval_secs`).
    #[arg(long)]
    interval: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let paths = Arc::new(AppPaths::new());
    logging::init(&paths, "train.log");
    let state = AppState::initialize(paths)
        .await
        .context("Failed to initialize application state")?;

    let training = &state.settings.training;
    let limit = args.limit.unwrap_or(training.batch_limit).max(1);
    let interval = Duration::from_secs(args.interval.unwrap_or(training.interval_secs).max(1));
    let error_backoff = Duration::from_secs(training.error_backoff_secs);

    if !args.continuous {
        let report = state
            .training
            .process_training_queue(limit)
            .await
            .context("Training batch failed")?;
        print_summary(state.conversations.as_ref(), &report).await;
        return Ok(());
    }

    tracing::info!(limit, interval_secs = interval.as_secs(), "Continuous training started");
    let conversations = state.conversations.clone();
    state
        .training
        .run_continuous(limit, interval, error_backoff, |report| {
            let conversations = conversations.clone();
            async move { print_summary(conversations.as_ref(), &report).await }
        })
        .await;
    Ok(())
}

async fn print_summary(conversations: &dyn ConversationStore, report: &TrainingReport) {
    println!(
        "{} document(s) re-injected ({} examined, {} already present, {} skipped, {} failed, {} abandoned)",
        report.documents_created,
        report.examined,
        report.already_present,
        report.skipped,
        report.failed,
        report.abandoned
    );

    match conversations.analytics(ANALYTICS_DAYS).await {
        Ok(summary) => {
            let avg = summary
                .avg_feedback_score
                .map(|score| format!("{:.2}", score))
                .unwrap_or_else(|| "n/a".to_string());
            println!(
                "Last {} days: {} conversation(s), average score {}, {} flagged",
                summary.days, summary.total_conversations, avg, summary.flagged_count
            );
        }
        Err(err) => tracing::warn!("Failed to load analytics: {}", err),
    }
}
