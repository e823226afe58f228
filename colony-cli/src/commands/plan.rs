use crate::commands::render;
use crate::output;

use clap::Args;
use color_eyre::Result;
use colony_service::{Colony, UserVariables};
use tokio_util::sync::CancellationToken;

#[derive(Args)]
pub struct PlanArgs {
    /// Modules to plan (default: every module)
    pub modules: Vec<String>,

    /// Initialise module state locally instead of using remote state
    #[arg(long)]
    pub detach: bool,
}

pub async fn execute(
    colony: &Colony,
    args: &PlanArgs,
    variables: &UserVariables,
    cancel: CancellationToken,
) -> Result<i32> {
    let streams = colony.plan(&args.modules, variables, args.detach, cancel)?;

    let subject = if args.modules.is_empty() {
        format!("{} modules", colony.modules().len())
    } else {
        args.modules.join(", ")
    };
    output::status("Planning", &subject);
    if args.detach {
        output::dim("  using local state");
    }

    let summary = render::render(streams).await;
    render::print_summary(&summary);
    Ok(summary.exit_code())
}
