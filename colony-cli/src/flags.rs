// Dynamic variable flags and the lenient pre-scan of global options

use clap::builder::PossibleValuesParser;
use clap::{Arg, ArgMatches, Command};
use colony_service::{UserVariables, VariableFlag};

use std::path::PathBuf;

/// Global options needed before the full command line can be parsed
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GlobalArgs {
    pub config: Option<PathBuf>,
    pub verbose: bool,
    pub trace: bool,
}

/// Pick out `--config`, `--verbose` and `--trace` without knowing the
/// variable flags yet. Anything unrecognised is left for clap.
pub fn scan_global_args<I, S>(args: I) -> GlobalArgs
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut globals = GlobalArgs::default();
    let mut args = args.into_iter().skip(1);

    while let Some(arg) = args.next() {
        let arg = arg.as_ref();
        match arg {
            "--" => break,
            "-c" | "--config" => {
                if let Some(value) = args.next() {
                    globals.config = Some(PathBuf::from(value.as_ref()));
                }
            }
            "-v" | "--verbose" => globals.verbose = true,
            "--trace" => globals.trace = true,
            _ => {
                if let Some(value) = arg.strip_prefix("--config=") {
                    globals.config = Some(PathBuf::from(value));
                }
            }
        }
    }
    globals
}

fn arg_id(flag: &VariableFlag) -> String {
    format!("var:{}", flag.flag)
}

/// Register one `--<flag> VALUE` argument per variable flag
pub fn register(mut command: Command, flags: &[VariableFlag]) -> Command {
    for flag in flags {
        let mut help = format!("Set '{}' for {}", flag.variable, flag.modules.join(", "));
        if flag.required {
            help.push_str(" [required]");
        }

        let mut arg = Arg::new(arg_id(flag))
            .long(flag.flag.clone())
            .value_name("VALUE")
            .help(help)
            .help_heading("Variables");
        if !flag.allowed_values.is_empty() {
            arg = arg.value_parser(PossibleValuesParser::new(flag.allowed_values.clone()));
        }
        command = command.arg(arg);
    }
    command
}

/// Collect the variable values given on the command line
pub fn user_variables(matches: &ArgMatches, flags: &[VariableFlag]) -> UserVariables {
    flags
        .iter()
        .fold(UserVariables::none(), |vars, flag| {
            match matches.get_one::<String>(&arg_id(flag)) {
                Some(value) => vars.with(flag.variable.clone(), value.clone()),
                None => vars,
            }
        })
}
