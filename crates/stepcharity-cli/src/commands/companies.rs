use clap::Subcommand;

use super::context::AppContext;
use super::{print_json, CmdResult};

#[derive(Subcommand)]
pub enum CompaniesAction {
    /// List companies by name
    List,
    /// Add a company (local backend only)
    Add {
        /// Company name
        name: String,
    },
}

pub async fn run(action: CompaniesAction) -> CmdResult {
    let ctx = AppContext::load()?;
    match action {
        CompaniesAction::List => print_json(&ctx.ledger().fetch_companies().await?),
        CompaniesAction::Add { name } => print_json(&ctx.local_ledger()?.add_company(&name)?),
    }
}
