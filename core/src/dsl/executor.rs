//! Script preparation and execution.
//!
//! `PreparedScript::prepare` lexes and analyzes every statement up front, so
//! the caller can tell whether a script will change anything before running
//! it. `execute` then applies the surviving commands in source order and
//! records one outcome per statement.

use serde::Serialize;
use tracing::{debug, info};

use crate::dsl::analyzer::Analyzer;
use crate::dsl::command::{Command, CommandKind, Operand};
use crate::dsl::lexer::lex_script;
use crate::error::{Result, SemanticError, StoreError};
use crate::namespace::key::Key;
use crate::namespace::store::Store;
use crate::snapshot::history::Source;
use crate::types::config::QueryErrorPolicy;

// ---------------------------------------------------------------------------
// Prepared scripts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct PreparedStatement {
    pub index: usize,
    pub text: String,
    pub command: std::result::Result<Command, StoreError>,
}

/// A script after lexing and analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedScript {
    pub statements: Vec<PreparedStatement>,
}

impl PreparedScript {
    pub fn prepare(script: &str, analyzer: &Analyzer) -> Self {
        let statements = lex_script(script)
            .into_iter()
            .map(|stmt| {
                let command = match &stmt.tokens {
                    Ok(tokens) => analyzer.analyze(tokens).map_err(StoreError::from),
                    Err(e) => Err(StoreError::from(e.clone())),
                };
                PreparedStatement {
                    index: stmt.index,
                    text: stmt.text,
                    command,
                }
            })
            .collect();
        PreparedScript { statements }
    }

    /// True when no statement can change the store.
    pub fn is_noop(&self) -> bool {
        self.statements.iter().all(|s| s.command.is_err())
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Statements rejected before execution.
    pub fn errors(&self) -> Vec<(usize, &StoreError)> {
        self.statements
            .iter()
            .filter_map(|s| s.command.as_ref().err().map(|e| (s.index, e)))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StatementStatus {
    /// `value` is the key's value afterwards; `None` when it was cleared.
    Applied { key: Key, value: Option<String> },
    Failed {
        #[serde(serialize_with = "error_text")]
        error: StoreError,
    },
    NotRun,
}

fn error_text<S: serde::Serializer>(error: &StoreError, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatementOutcome {
    pub index: usize,
    pub text: String,
    #[serde(flatten)]
    pub status: StatementStatus,
}

impl StatementOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self.status, StatementStatus::Applied { .. })
    }

    pub fn error(&self) -> Option<&StoreError> {
        match &self.status {
            StatementStatus::Failed { error } => Some(error),
            _ => None,
        }
    }
}

/// Overall result of a script run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScriptStatus {
    Completed,
    CompletedWithSkips { skipped: usize },
    CompletedWithErrors { failed: usize },
    /// Stopped at the statement with this index.
    Aborted { at: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScriptReport {
    pub policy: QueryErrorPolicy,
    pub outcomes: Vec<StatementOutcome>,
    /// Id of the savepoint taken before the run, if any.
    pub auto_savepoint: Option<String>,
}

impl ScriptReport {
    pub fn status(&self) -> ScriptStatus {
        let failed = self.failures().len();
        if failed == 0 {
            return ScriptStatus::Completed;
        }
        match self.policy {
            QueryErrorPolicy::AbortRemaining => {
                let at = self
                    .outcomes
                    .iter()
                    .find(|o| o.error().is_some())
                    .map(|o| o.index)
                    .unwrap_or_default();
                ScriptStatus::Aborted { at }
            }
            QueryErrorPolicy::SkipAndContinue => ScriptStatus::CompletedWithSkips { skipped: failed },
            QueryErrorPolicy::CollectAndReportAll => ScriptStatus::CompletedWithErrors { failed },
        }
    }

    /// Skipped failures still count as success.
    pub fn succeeded(&self) -> bool {
        matches!(
            self.status(),
            ScriptStatus::Completed | ScriptStatus::CompletedWithSkips { .. }
        )
    }

    pub fn failures(&self) -> Vec<&StatementOutcome> {
        self.outcomes.iter().filter(|o| o.error().is_some()).collect()
    }

    pub fn applied_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded()).count()
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Run `script` against `store`. Mutations are attributed to `Source::Query`.
///
/// Applied statements are never rolled back; `policy` only decides whether
/// statements after a failure run.
pub fn execute(store: &mut Store, script: &PreparedScript, policy: QueryErrorPolicy) -> ScriptReport {
    let previous = store.swap_source(Source::Query);
    let mut outcomes = Vec::with_capacity(script.len());
    let mut aborted = false;

    for stmt in &script.statements {
        let status = if aborted {
            StatementStatus::NotRun
        } else {
            let result = match &stmt.command {
                Ok(command) => apply(store, command),
                Err(e) => Err(e.clone()),
            };
            match result {
                Ok(status) => status,
                Err(error) => {
                    debug!(index = stmt.index, statement = %stmt.text, %error, "statement failed");
                    aborted = policy == QueryErrorPolicy::AbortRemaining;
                    StatementStatus::Failed { error }
                }
            }
        };
        outcomes.push(StatementOutcome {
            index: stmt.index,
            text: stmt.text.clone(),
            status,
        });
    }

    store.swap_source(previous);
    let report = ScriptReport {
        policy,
        outcomes,
        auto_savepoint: None,
    };
    info!(
        statements = report.outcomes.len(),
        applied = report.applied_count(),
        status = ?report.status(),
        "script executed"
    );
    report
}

/// Apply one validated command through the store's typed API.
fn apply(store: &mut Store, command: &Command) -> Result<StatementStatus> {
    let key = &command.key;
    let value = match (command.kind, &command.operand) {
        (CommandKind::Clear, _) => {
            store.clear(key)?;
            None
        }
        (CommandKind::Set, Some(operand)) => {
            let raw = operand.to_raw();
            store.set(key, raw.clone())?;
            Some(raw)
        }
        (CommandKind::Inc, Some(Operand::Number(n))) => Some(store.increment(key, *n)?),
        (CommandKind::Dec, Some(Operand::Number(n))) => Some(store.decrement(key, *n)?),
        (CommandKind::ListAppend, Some(operand)) => Some(store.list_append(key, operand.to_raw())?),
        (CommandKind::SetAppend, Some(operand)) => Some(store.set_append(key, operand.to_raw())?),
        (kind, _) => {
            return Err(StoreError::Semantic(SemanticError::ArityError {
                command: kind.to_string(),
                expected: "an operand".into(),
                found: 0,
            }))
        }
    };
    Ok(StatementStatus::Applied {
        key: key.clone(),
        value,
    })
}
