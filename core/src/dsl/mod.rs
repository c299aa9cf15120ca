//! Command language: lexer, analyzer and executor.

pub mod analyzer;
pub mod command;
pub mod executor;
pub mod lexer;

pub use analyzer::Analyzer;
pub use command::{Command, CommandKind, Operand};
pub use executor::{
    execute, PreparedScript, PreparedStatement, ScriptReport, ScriptStatus, StatementOutcome,
    StatementStatus,
};
pub use lexer::{lex_script, Keyword, LexedStatement, Token, TokenKind};
