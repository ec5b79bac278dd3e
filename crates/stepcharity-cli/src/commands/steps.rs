use std::time::Duration;

use clap::Subcommand;
use serde::Serialize;
use stepcharity_core::{
    CapabilityGate, DaySteps, HistoryBackfill, HistorySummary, StepHistoryItem, TodaySnapshot,
    TrackerEvent,
};

use super::context::AppContext;
use super::{print_json, CmdResult};

#[derive(Subcommand)]
pub enum StepsAction {
    /// Steps walked since local midnight
    Today,
    /// Per-day steps for recent days, oldest first
    History {
        /// Number of days including today (at most 7)
        #[arg(long)]
        days: Option<usize>,
    },
    /// Stream today's steps as JSON lines until interrupted
    Watch {
        /// Do not write updates to the ledger
        #[arg(long)]
        no_sync: bool,
        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<u64>,
    },
}

#[derive(Serialize)]
#[serde(untagged)]
enum HistoryView {
    Evaluated {
        days: Vec<StepHistoryItem>,
        summary: HistorySummary,
    },
    Raw {
        days: Vec<DaySteps>,
    },
}

pub async fn run(action: StepsAction) -> CmdResult {
    let ctx = AppContext::load()?;
    CapabilityGate::new(ctx.engine.sensor().clone())
        .authorize()
        .await?;

    match action {
        StepsAction::Today => {
            let snapshot: TodaySnapshot = ctx.engine.snapshot().await;
            print_json(&snapshot)?;
        }
        StepsAction::History { days } => {
            let days = days.unwrap_or(ctx.config.tracking.history_days);
            let backfill =
                HistoryBackfill::new(ctx.engine.sensor().clone(), ctx.engine.clock().clone());
            let history = backfill.last_n_days(days).await;

            let view = match ctx.ledger().fetch_global_settings().await {
                Ok(Some(settings)) => {
                    let items: Vec<_> = history
                        .into_iter()
                        .map(|day| StepHistoryItem::evaluate(day, &settings))
                        .collect();
                    HistoryView::Evaluated {
                        summary: HistorySummary::from_items(&items),
                        days: items,
                    }
                }
                Ok(None) => HistoryView::Raw { days: history },
                Err(e) => {
                    tracing::warn!(error = %e, "could not load goal settings, printing raw history");
                    HistoryView::Raw { days: history }
                }
            };
            print_json(&view)?;
        }
        StepsAction::Watch { no_sync, duration } => {
            let session = if no_sync {
                None
            } else {
                Some(ctx.session().await?)
            };
            let mut events = ctx.tracker.events();
            ctx.tracker
                .start(session, ctx.config.tracking.poll_interval())
                .await?;

            let deadline = async {
                match duration {
                    Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::pin!(deadline);

            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Ok(event) => print_event(&event)?,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(skipped = n, "event output lagging");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    },
                    _ = tokio::signal::ctrl_c() => break,
                    _ = &mut deadline => break,
                }
            }

            ctx.tracker.stop().await;
            while let Ok(event) = events.try_recv() {
                print_event(&event)?;
            }
        }
    }
    Ok(())
}

fn print_event(event: &TrackerEvent) -> CmdResult {
    println!("{}", serde_json::to_string(event)?);
    Ok(())
}
