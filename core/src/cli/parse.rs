//! Argument parsing for the `skv` binary.
//!
//! Hand-rolled to keep the binary free of a parser dependency. Flags may
//! appear anywhere after the subcommand.

use std::path::PathBuf;

/// What the binary was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Run scripts in order. An empty list means "read stdin".
    Run { scripts: Vec<String> },
    /// Lex and analyze a script without running it.
    Check { script: String },
    /// Print the store after any import.
    Dump,
    Help,
}

/// Flags shared by every subcommand.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    pub config: Option<PathBuf>,
    pub import: Option<PathBuf>,
    pub json: bool,
    pub verbose: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub action: Action,
    pub options: Options,
}

pub const USAGE: &str = "\
Usage: skv <command> [flags]

Commands:
  run [SCRIPT...]   run scripts (stdin when none given)
  check SCRIPT      validate a script without running it
  dump              print the store contents
  help              show this message

Flags:
  --config FILE     YAML store configuration (default: $SKV_CONFIG)
  --import FILE     load key=value lines before running
  --json            machine-readable output
  --verbose         debug logging on stderr";

/// Parse CLI arguments, without the program name.
pub fn parse_args(args: &[&str]) -> Result<Invocation, String> {
    if args.is_empty() {
        return Err("No command specified. Run 'skv help' for usage.".into());
    }

    let mut options = Options::default();
    let mut positional: Vec<String> = Vec::new();
    let rest = &args[1..];
    let mut i = 0;
    while i < rest.len() {
        match rest[i] {
            "--config" => {
                i += 1;
                options.config = Some(PathBuf::from(take_arg(rest, i, "--config")?));
            }
            "--import" => {
                i += 1;
                options.import = Some(PathBuf::from(take_arg(rest, i, "--import")?));
            }
            "--json" => options.json = true,
            "--verbose" | "-v" => options.verbose = true,
            flag if flag.starts_with("--") => {
                return Err(format!("Unknown flag: '{}'", flag));
            }
            other => positional.push(other.to_string()),
        }
        i += 1;
    }

    let action = match args[0] {
        "run" => Action::Run {
            scripts: positional,
        },
        "check" => match positional.as_slice() {
            [script] => Action::Check {
                script: script.clone(),
            },
            _ => return Err("Usage: skv check <script>".into()),
        },
        "dump" if positional.is_empty() => Action::Dump,
        "dump" => return Err("Usage: skv dump [flags]".into()),
        "help" | "--help" | "-h" => Action::Help,
        other => return Err(format!("Unknown command: '{}'", other)),
    };
    Ok(Invocation { action, options })
}

fn take_arg(args: &[&str], i: usize, flag: &str) -> Result<String, String> {
    args.get(i)
        .map(|s| s.to_string())
        .ok_or_else(|| format!("{} requires a value", flag))
}

/// Parse `key=value` lines for bulk import.
///
/// Blank lines and lines starting with `#` are skipped. Values are taken
/// verbatim after the first `=`.
pub fn parse_import(content: &str) -> Result<Vec<(String, String)>, String> {
    let mut entries = Vec::new();
    for (n, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match line.split_once('=') {
            Some((key, value)) => entries.push((key.trim().to_string(), value.to_string())),
            None => return Err(format!("line {}: expected key=value", n + 1)),
        }
    }
    Ok(entries)
}
