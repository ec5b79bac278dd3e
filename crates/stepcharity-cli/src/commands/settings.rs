use clap::Subcommand;
use stepcharity_core::{GlobalSettings, ValidationError};

use super::context::AppContext;
use super::{print_json, CmdResult};

#[derive(Subcommand)]
pub enum SettingsAction {
    /// Print the program goal settings
    Show,
    /// Set the program goal settings (local backend only)
    Set {
        /// Daily step goal
        #[arg(long)]
        goal: u64,
        /// Charity amount earned per achieved goal
        #[arg(long)]
        charity: f64,
    },
}

pub async fn run(action: SettingsAction) -> CmdResult {
    let ctx = AppContext::load()?;
    match action {
        SettingsAction::Show => print_json(&ctx.ledger().fetch_global_settings().await?),
        SettingsAction::Set { goal, charity } => {
            if goal == 0 {
                return Err(ValidationError::invalid("goal", "must be greater than 0").into());
            }
            if !charity.is_finite() || charity < 0.0 {
                return Err(ValidationError::invalid("charity", "must be a non-negative amount").into());
            }
            let settings = GlobalSettings {
                daily_step_goal: goal,
                charity_amount_per_goal: charity,
            };
            ctx.local_ledger()?.set_global_settings(&settings)?;
            print_json(&settings)
        }
    }
}
