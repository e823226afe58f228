mod commands;
mod flags;
mod output;

use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser, Subcommand};
use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use colony_service::utils::discover_config_file;
use colony_service::{command_line_flags, Colony, ColonyConfig, ConfigParser, UserVariables, VariableFlag};
use commands::apply::ApplyArgs;
use commands::plan::PlanArgs;
use commands::session::SessionArgs;

use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::Level;

#[derive(Parser)]
#[command(name = "colony")]
#[command(about = "Plan and apply colonies of interdependent Terraform modules", long_about = None)]
#[command(version)]
struct Cli {
    /// Colony config file (default: nearest colony.yaml or colony.yml)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log progress of the orchestration
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log everything, including each subprocess
    #[arg(long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan modules concurrently
    Plan(PlanArgs),
    /// Apply modules in dependency order
    Apply(ApplyArgs),
    /// Print the dependency batches as JSON
    Graph,
    /// Manage sessions
    Session(SessionArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let code = match run().await {
        Ok(code) => code,
        Err(e) => {
            output::error(&format!("{e:#}"));
            1
        }
    };
    std::process::exit(code);
}

async fn run() -> Result<i32> {
    let args: Vec<String> = std::env::args().collect();
    let globals = flags::scan_global_args(&args);
    init_tracing(globals.verbose, globals.trace);

    let config = load_config(globals.config)?;
    let variable_flags = match &config {
        Some(config) => command_line_flags(config)?,
        None => Vec::new(),
    };

    let matches = Cli::command()
        .mut_subcommand("plan", |cmd| flags::register(cmd, &variable_flags))
        .mut_subcommand("apply", |cmd| flags::register(cmd, &variable_flags))
        .get_matches_from(&args);
    let cli = Cli::from_arg_matches(&matches)?;
    let variables = subcommand_variables(&matches, &variable_flags);

    let config = config.ok_or_else(|| {
        eyre!("no colony config found; pass --config or add colony.yaml to this directory")
    })?;
    let colony = Colony::builder(config).build().await?;

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    match cli.command {
        Commands::Plan(args) => commands::plan::execute(&colony, &args, &variables, cancel).await,
        Commands::Apply(args) => commands::apply::execute(&colony, &args, &variables, cancel).await,
        Commands::Graph => commands::graph::execute(&colony),
        Commands::Session(args) => commands::session::execute(&colony, &args),
    }
}

fn init_tracing(verbose: bool, trace: bool) {
    let level = if trace {
        Level::TRACE
    } else if verbose {
        Level::INFO
    } else {
        Level::WARN
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Explicit path wins; otherwise search upwards from the working directory
fn load_config(explicit: Option<PathBuf>) -> Result<Option<ColonyConfig>> {
    let path = match explicit.or_else(discover_config_file) {
        Some(path) => path,
        None => return Ok(None),
    };
    let config = ConfigParser::from_file(&path)
        .wrap_err_with(|| format!("failed to load {}", path.display()))?;
    tracing::info!(
        path = %path.display(),
        modules = ?config.module_names(),
        "using colony config"
    );
    Ok(Some(config))
}

fn subcommand_variables(matches: &ArgMatches, variable_flags: &[VariableFlag]) -> UserVariables {
    match matches.subcommand() {
        Some(("plan", sub)) | Some(("apply", sub)) => flags::user_variables(sub, variable_flags),
        _ => UserVariables::none(),
    }
}

fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            output::warning("interrupted; waiting for running modules to stop");
            cancel.cancel();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_plan_with_variable_flags() {
        let variable_flags = vec![VariableFlag {
            flag: "region".to_string(),
            variable: "region".to_string(),
            allowed_values: vec![],
            required: true,
            modules: vec!["net".to_string()],
        }];
        let matches = Cli::command()
            .mut_subcommand("plan", |cmd| flags::register(cmd, &variable_flags))
            .try_get_matches_from(["colony", "plan", "net", "--detach", "--region", "eu"])
            .unwrap();
        let cli = Cli::from_arg_matches(&matches).unwrap();

        match cli.command {
            Commands::Plan(args) => {
                assert_eq!(args.modules, vec!["net"]);
                assert!(args.detach);
            }
            _ => panic!("expected plan"),
        }
        let vars = subcommand_variables(&matches, &variable_flags);
        assert_eq!(vars.get("region"), Some("eu"));
    }

    #[test]
    fn test_graph_has_no_variables() {
        let matches = Cli::command()
            .try_get_matches_from(["colony", "graph"])
            .unwrap();
        assert!(subcommand_variables(&matches, &[]).is_empty());
    }

    #[test]
    fn test_parse_session_unlock() {
        let matches = Cli::command()
            .try_get_matches_from(["colony", "session", "unlock"])
            .unwrap();
        let cli = Cli::from_arg_matches(&matches).unwrap();

        match cli.command {
            Commands::Session(args) => assert!(matches!(
                args.command,
                commands::session::SessionCommands::Unlock { id: None }
            )),
            _ => panic!("expected session"),
        }
    }

    #[test]
    fn test_load_explicit_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("colony.yaml");
        std::fs::write(&path, "modules:\n  - name: net\n    source: ./net\n").unwrap();

        let config = load_config(Some(path)).unwrap().unwrap();
        assert_eq!(config.module_names(), vec!["net"]);
    }
}
