use clap::Subcommand;
use serde::Serialize;
use stepcharity_core::{CoreError, HistorySummary, StepHistoryItem};

use super::context::AppContext;
use super::{print_json, CmdResult};

#[derive(Subcommand)]
pub enum SyncAction {
    /// Upsert today's steps
    Today,
    /// Backfill recent days and upsert each one
    History {
        /// Number of days including today (at most 7)
        #[arg(long)]
        days: Option<usize>,
    },
}

#[derive(Serialize)]
struct HistorySync {
    synced: Vec<StepHistoryItem>,
    summary: HistorySummary,
}

pub async fn run(action: SyncAction) -> CmdResult {
    let ctx = AppContext::load()?;
    let session = ctx.session().await?;

    match action {
        SyncAction::Today => {
            let result = ctx.tracker.sync_today(&session).await?;
            print_json(&result)?;
            if let Some(error) = result.error {
                return Err(CoreError::Custom(format!("sync failed: {error}")).into());
            }
        }
        SyncAction::History { days } => {
            let days = days.unwrap_or(ctx.config.tracking.history_days);
            let synced = ctx.tracker.sync_history(&session, days).await?;
            let summary = HistorySummary::from_items(&synced);
            print_json(&HistorySync { synced, summary })?;
        }
    }
    Ok(())
}
