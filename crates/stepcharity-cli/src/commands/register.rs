use clap::Args;
use stepcharity_core::RegistrationForm;

use super::context::AppContext;
use super::{print_json, CmdResult};

#[derive(Args)]
pub struct RegisterArgs {
    /// Employee ID (7 characters, starting with K)
    #[arg(long)]
    employee_id: String,
    /// Company name
    #[arg(long)]
    company: String,
    /// Display name
    #[arg(long)]
    name: String,
}

pub async fn run(args: RegisterArgs) -> CmdResult {
    let form = RegistrationForm {
        employee_id: args.employee_id,
        company: args.company,
        profile_name: args.name,
    };
    form.validate()?;

    let ctx = AppContext::load()?;
    let employee = ctx.tracker.register(&form).await?;
    print_json(&employee)
}
