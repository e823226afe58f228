use crate::commands::render;
use crate::output;

use clap::Args;
use color_eyre::Result;
use colony_service::{Colony, UserVariables};
use tokio_util::sync::CancellationToken;

#[derive(Args)]
pub struct ApplyArgs {
    /// Modules to apply; without any, the whole colony is applied in dependency order
    pub modules: Vec<String>,
}

pub async fn execute(
    colony: &Colony,
    args: &ApplyArgs,
    variables: &UserVariables,
    cancel: CancellationToken,
) -> Result<i32> {
    let streams = colony.apply(&args.modules, variables, cancel)?;

    if args.modules.is_empty() {
        output::status("Applying", &format!("{} modules", colony.modules().len()));
    } else {
        output::status("Applying", &args.modules.join(", "));
        output::warning("selected modules are applied without dependency ordering");
    }

    let summary = render::render(streams).await;
    render::print_summary(&summary);
    Ok(summary.exit_code())
}
