//! SKV CLI: run command scripts against a configured scoped store.
//!
//! # Usage
//!
//! ```text
//! skv run --config store.yaml "set env:limit to 10; inc env:limit 5;"
//! skv check --config store.yaml "set query:mode truthy"
//! echo "clear env:a;" | skv run --import seed.txt
//! skv dump --import seed.txt --json
//! ```

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process;

use scopekv_core::cli::{parse_args, parse_import, Action, Invocation, USAGE};
use scopekv_core::dsl::{ScriptReport, StatementStatus};
use scopekv_core::{ConflictPolicy, Engine, StoreConfig};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Exit code when a script or check reports failures.
const EXIT_FAILURES: i32 = 2;

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let arg_refs: Vec<&str> = args[1..].iter().map(|s| s.as_str()).collect();

    let invocation = match parse_args(&arg_refs) {
        Ok(inv) => inv,
        Err(e) => {
            eprintln!("skv: {}", e);
            process::exit(1);
        }
    };

    if invocation.action == Action::Help {
        println!("{}", USAGE);
        return;
    }

    init_logging(invocation.options.verbose);

    match execute(&invocation) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("skv: {}", e);
            process::exit(1);
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var("SKV_CONFIG").ok().map(PathBuf::from))
}

/// Load the configuration and apply `--import`, if given.
fn build_engine(invocation: &Invocation) -> Result<Engine, String> {
    let path = resolve_config_path(invocation.options.config.as_deref())
        .ok_or("no configuration: pass --config FILE or set SKV_CONFIG")?;
    let config = StoreConfig::load(&path).map_err(|e| format!("{}: {}", path.display(), e))?;
    let mut engine = Engine::new(config).map_err(|e| e.to_string())?;

    if let Some(import) = &invocation.options.import {
        let content = std::fs::read_to_string(import)
            .map_err(|e| format!("{}: {}", import.display(), e))?;
        let entries = parse_import(&content).map_err(|e| format!("{}: {}", import.display(), e))?;
        engine
            .store_mut()
            .import_raw(entries, ConflictPolicy::Overwrite)
            .map_err(|e| format!("{}: {}", import.display(), e))?;
    }
    Ok(engine)
}

/// Run the requested action and return the process exit code.
fn execute(invocation: &Invocation) -> Result<i32, String> {
    let mut engine = build_engine(invocation)?;
    let json = invocation.options.json;

    match &invocation.action {
        Action::Run { scripts } => {
            let scripts = if scripts.is_empty() {
                vec![read_stdin()?]
            } else {
                scripts.clone()
            };
            let reports: Vec<ScriptReport> =
                scripts.iter().map(|s| engine.run_script(s)).collect();
            let store = engine.store().export_raw();

            if json {
                let out = serde_json::json!({ "reports": reports, "store": store });
                println!("{}", out);
            } else {
                for report in &reports {
                    print!("{}", format_report(report));
                }
                print!("{}", format_store(&store));
            }
            Ok(if reports.iter().all(ScriptReport::succeeded) {
                0
            } else {
                EXIT_FAILURES
            })
        }
        Action::Check { script } => {
            let prepared = engine.prepare(script);
            let errors = prepared.errors();
            if json {
                let errors: Vec<_> = errors
                    .iter()
                    .map(|(index, e)| serde_json::json!({ "index": index, "error": e.to_string() }))
                    .collect();
                let out = serde_json::json!({ "statements": prepared.len(), "errors": errors });
                println!("{}", out);
            } else if errors.is_empty() {
                println!("ok: {} statement(s)", prepared.len());
            } else {
                for (index, e) in &errors {
                    println!("[{}] {}", index, e);
                }
            }
            Ok(if errors.is_empty() { 0 } else { EXIT_FAILURES })
        }
        Action::Dump => {
            let store = engine.store().export_raw();
            if json {
                println!("{}", serde_json::json!(store));
            } else {
                print!("{}", format_store(&store));
            }
            Ok(0)
        }
        Action::Help => {
            println!("{}", USAGE);
            Ok(0)
        }
    }
}

fn read_stdin() -> Result<String, String> {
    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .map_err(|e| format!("reading stdin: {}", e))?;
    Ok(buf)
}

fn format_report(report: &ScriptReport) -> String {
    let mut out = String::new();
    for outcome in &report.outcomes {
        let line = match &outcome.status {
            StatementStatus::Applied { value: Some(v), .. } => {
                format!("[{}] ok      {} => {}", outcome.index, outcome.text, v)
            }
            StatementStatus::Applied { value: None, .. } => {
                format!("[{}] ok      {}", outcome.index, outcome.text)
            }
            StatementStatus::Failed { error } => {
                format!("[{}] FAILED  {}: {}", outcome.index, outcome.text, error)
            }
            StatementStatus::NotRun => format!("[{}] skipped {}", outcome.index, outcome.text),
        };
        out.push_str(&line);
        out.push('\n');
    }
    if let Some(id) = &report.auto_savepoint {
        out.push_str(&format!("savepoint {}\n", id));
    }
    out.push_str(&format!("status: {:?}\n", report.status()));
    out
}

fn format_store(store: &BTreeMap<String, String>) -> String {
    store
        .iter()
        .map(|(k, v)| format!("{} = {}\n", k, v))
        .collect()
}
