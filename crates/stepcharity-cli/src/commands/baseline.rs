use clap::Subcommand;
use serde_json::json;

use super::context::AppContext;
use super::{print_json, CmdResult};

#[derive(Subcommand)]
pub enum BaselineAction {
    /// Print the stored baseline record
    Show,
    /// Clear the stored baseline; the next reading captures a new one
    Reset,
}

pub async fn run(action: BaselineAction) -> CmdResult {
    let ctx = AppContext::load()?;
    match action {
        BaselineAction::Show => {
            let record = ctx.engine.stored_baseline().await?;
            print_json(&record)?;
        }
        BaselineAction::Reset => {
            ctx.engine.reset_baseline().await?;
            print_json(&json!({ "reset": true }))?;
        }
    }
    Ok(())
}
