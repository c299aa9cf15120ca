//! Validated commands produced by the analyzer.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::codec::Number;
use crate::namespace::key::Key;

/// Every command the language knows about.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Set,
    Inc,
    Dec,
    Clear,
    ListAppend,
    SetAppend,
}

impl CommandKind {
    pub const ALL: [CommandKind; 6] = [
        CommandKind::Set,
        CommandKind::Inc,
        CommandKind::Dec,
        CommandKind::Clear,
        CommandKind::ListAppend,
        CommandKind::SetAppend,
    ];

    /// Spelling in scripts.
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Set => "set",
            CommandKind::Inc => "inc",
            CommandKind::Dec => "dec",
            CommandKind::Clear => "clear",
            CommandKind::ListAppend => "list append",
            CommandKind::SetAppend => "set append",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved operand: a number or a literal translated through the enum map.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Number(Number),
    Literal(String),
}

impl Operand {
    /// Raw string written to the store.
    pub fn to_raw(&self) -> String {
        match self {
            Operand::Number(n) => n.render(),
            Operand::Literal(s) => s.clone(),
        }
    }
}

/// A statement that passed semantic analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub kind: CommandKind,
    pub key: Key,
    pub operand: Option<Operand>,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.key)?;
        if let Some(op) = &self.operand {
            write!(f, " {}", op.to_raw())?;
        }
        Ok(())
    }
}
