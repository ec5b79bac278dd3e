use super::context::AppContext;
use super::{print_json, CmdResult};

pub async fn run() -> CmdResult {
    let ctx = AppContext::load()?;
    print_json(&ctx.engine.diagnose().await)
}
