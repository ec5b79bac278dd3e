use super::context::AppContext;
use super::{print_json, CmdResult};

pub async fn run() -> CmdResult {
    let ctx = AppContext::load()?;
    let session = ctx.session().await?;
    let dashboard = ctx.tracker.dashboard(&session).await?;
    print_json(&dashboard)
}
