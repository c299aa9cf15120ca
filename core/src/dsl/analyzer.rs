//! Semantic analysis of one tokenized statement.
//!
//! Checks run in a fixed order: command, key, arity, operand type. The first
//! failing check decides the reported error. The analyzer only reads its
//! configuration; it never touches a store.

use std::collections::BTreeMap;

use crate::codec::Number;
use crate::dsl::command::{Command, CommandKind, Operand};
use crate::dsl::lexer::{Keyword, Token, TokenKind};
use crate::error::{ConfigError, KeyError, SemanticError};
use crate::namespace::key::KeyValidator;
use crate::types::config::{CompoundKind, StoreConfig};

/// Validates statements against one store configuration.
#[derive(Debug, Clone)]
pub struct Analyzer {
    keys: KeyValidator,
    config: StoreConfig,
    /// Enum tokens, lowercased when matching is case-insensitive.
    enums: BTreeMap<String, String>,
}

impl Analyzer {
    pub fn from_config(config: &StoreConfig) -> Result<Self, ConfigError> {
        let enums = config
            .enum_map
            .iter()
            .map(|(token, literal)| {
                let token = if config.enum_case_sensitive {
                    token.clone()
                } else {
                    token.to_lowercase()
                };
                (token, literal.clone())
            })
            .collect();
        Ok(Analyzer {
            keys: KeyValidator::from_config(config)?,
            config: config.clone(),
            enums,
        })
    }

    /// Turn one statement's tokens into a validated command.
    pub fn analyze(&self, tokens: &[Token]) -> Result<Command, SemanticError> {
        let tokens: Vec<&TokenKind> = tokens
            .iter()
            .map(|t| &t.kind)
            .filter(|k| **k != TokenKind::Terminator)
            .collect();

        let (kind, rest) = self.command(&tokens)?;

        let (key_token, operands) = match rest.split_first() {
            Some(split) => split,
            None => {
                return Err(SemanticError::ArityError {
                    command: kind.to_string(),
                    expected: "a key".into(),
                    found: 0,
                })
            }
        };
        let key = match key_token {
            TokenKind::Key(raw) => self.keys.parse(raw).map_err(|e| match e {
                KeyError::UnknownScope(scope) => SemanticError::UnknownScope(scope),
                _ => SemanticError::InvalidKey(raw.clone()),
            })?,
            other => return Err(SemanticError::InvalidKey(other.to_string())),
        };

        match kind {
            CommandKind::Clear => {
                expect_arity(kind, "no operands", operands, 0)?;
                Ok(Command {
                    kind,
                    key,
                    operand: None,
                })
            }
            CommandKind::Inc | CommandKind::Dec => {
                expect_arity(kind, "one number", operands, 1)?;
                let number = match operands[0] {
                    TokenKind::Number(text) => Number::parse(text),
                    _ => None,
                };
                match number {
                    Some(n) => Ok(Command {
                        kind,
                        key,
                        operand: Some(Operand::Number(n)),
                    }),
                    None => Err(type_mismatch(kind, "a number", operands[0])),
                }
            }
            CommandKind::Set => {
                let explicit = matches!(operands.first(), Some(TokenKind::Keyword(Keyword::To)));
                let operands = if explicit { &operands[1..] } else { operands };
                expect_arity(kind, "one value", operands, 1)?;
                let operand = self.value(kind, operands[0])?;

                // `set K V` appends when K holds a compound value.
                let kind = match (explicit, self.config.compound_kind_for(&key)) {
                    (false, Some(CompoundKind::List)) => CommandKind::ListAppend,
                    (false, Some(CompoundKind::Set)) => CommandKind::SetAppend,
                    _ => CommandKind::Set,
                };
                self.ensure_enabled(kind)?;
                Ok(Command {
                    kind,
                    key,
                    operand: Some(operand),
                })
            }
            CommandKind::ListAppend | CommandKind::SetAppend => {
                expect_arity(kind, "one value", operands, 1)?;
                let operand = self.value(kind, operands[0])?;
                Ok(Command {
                    kind,
                    key,
                    operand: Some(operand),
                })
            }
        }
    }

    /// Recognize the command keyword(s) and return the remaining tokens.
    fn command<'a, 't>(
        &self,
        tokens: &'a [&'t TokenKind],
    ) -> Result<(CommandKind, &'a [&'t TokenKind]), SemanticError> {
        let append_follows = matches!(tokens.get(1), Some(TokenKind::Keyword(Keyword::Append)));
        let (kind, consumed) = match tokens.first() {
            Some(TokenKind::Keyword(Keyword::Set)) if append_follows => (CommandKind::SetAppend, 2),
            Some(TokenKind::Keyword(Keyword::List)) if append_follows => (CommandKind::ListAppend, 2),
            Some(TokenKind::Keyword(Keyword::Set)) => (CommandKind::Set, 1),
            Some(TokenKind::Keyword(Keyword::Inc)) => (CommandKind::Inc, 1),
            Some(TokenKind::Keyword(Keyword::Dec)) => (CommandKind::Dec, 1),
            Some(TokenKind::Keyword(Keyword::Clear)) => (CommandKind::Clear, 1),
            Some(other) => return Err(SemanticError::UnknownCommand(other.to_string())),
            None => return Err(SemanticError::UnknownCommand(String::new())),
        };
        // Plain `set` is checked after compound inference.
        if kind != CommandKind::Set {
            self.ensure_enabled(kind)?;
        }
        Ok((kind, &tokens[consumed..]))
    }

    fn ensure_enabled(&self, kind: CommandKind) -> Result<(), SemanticError> {
        if self.config.enabled_commands.contains(&kind) {
            Ok(())
        } else {
            Err(SemanticError::UnknownCommand(kind.to_string()))
        }
    }

    /// A value operand: a number, or an identifier present in the enum map.
    fn value(&self, kind: CommandKind, token: &TokenKind) -> Result<Operand, SemanticError> {
        match token {
            TokenKind::Number(text) => Ok(match Number::parse(text) {
                Some(n) => Operand::Number(n),
                // Out of i64 range: stored as written.
                None => Operand::Literal(text.clone()),
            }),
            TokenKind::Ident(word) => self
                .resolve_enum(word)
                .map(|literal| Operand::Literal(literal.to_string()))
                .ok_or_else(|| SemanticError::UnknownEnum(word.clone())),
            other => Err(type_mismatch(kind, "a number or enum token", other)),
        }
    }

    pub fn resolve_enum(&self, token: &str) -> Option<&str> {
        let found = if self.config.enum_case_sensitive {
            self.enums.get(token)
        } else {
            self.enums.get(&token.to_lowercase())
        };
        found.map(String::as_str)
    }
}

fn expect_arity(
    kind: CommandKind,
    expected: &str,
    operands: &[&TokenKind],
    count: usize,
) -> Result<(), SemanticError> {
    if operands.len() == count {
        Ok(())
    } else {
        Err(SemanticError::ArityError {
            command: kind.to_string(),
            expected: expected.into(),
            found: operands.len(),
        })
    }
}

fn type_mismatch(kind: CommandKind, expected: &str, found: &TokenKind) -> SemanticError {
    SemanticError::TypeMismatch {
        command: kind.to_string(),
        expected: expected.into(),
        found: found.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::lexer::lex_script;

    fn config() -> StoreConfig {
        StoreConfig::new(["env", "query"])
            .with_enum("truthy", "T")
            .with_enum("falsy", "F")
    }

    fn analyze_with(config: &StoreConfig, statement: &str) -> Result<Command, SemanticError> {
        let analyzer = Analyzer::from_config(config).unwrap();
        let lexed = lex_script(statement);
        analyzer.analyze(lexed[0].tokens.as_ref().unwrap())
    }

    fn analyze(statement: &str) -> Result<Command, SemanticError> {
        analyze_with(&config(), statement)
    }

    #[test]
    fn set_with_to() {
        let cmd = analyze("set env:limit to 10;").unwrap();
        assert_eq!(cmd.kind, CommandKind::Set);
        assert_eq!(cmd.key.to_string(), "env:limit");
        assert_eq!(cmd.operand, Some(Operand::Number(Number::Int(10))));
    }

    #[test]
    fn set_without_to_on_plain_key() {
        let cmd = analyze("set env:limit 10;").unwrap();
        assert_eq!(cmd.kind, CommandKind::Set);
    }

    #[test]
    fn inc_dec_clear_and_appends() {
        assert_eq!(analyze("inc env:a 5").unwrap().kind, CommandKind::Inc);
        assert_eq!(
            analyze("dec env:a 0.5").unwrap().operand,
            Some(Operand::Number(Number::Float(0.5)))
        );
        let clear = analyze("clear env:a").unwrap();
        assert_eq!(clear.kind, CommandKind::Clear);
        assert_eq!(clear.operand, None);
        assert_eq!(analyze("list append env:l 1").unwrap().kind, CommandKind::ListAppend);
        assert_eq!(analyze("set append env:s truthy").unwrap().kind, CommandKind::SetAppend);
    }

    #[test]
    fn unknown_command() {
        assert_eq!(
            analyze("drop env:a;"),
            Err(SemanticError::UnknownCommand("drop".into()))
        );
        assert_eq!(
            analyze("list env:a 1;"),
            Err(SemanticError::UnknownCommand("list".into()))
        );
        assert_eq!(
            analyze("to env:a 1;"),
            Err(SemanticError::UnknownCommand("to".into()))
        );
    }

    #[test]
    fn disabled_command_is_unknown() {
        let cfg = config().with_commands([CommandKind::Set, CommandKind::Clear]);
        assert_eq!(
            analyze_with(&cfg, "inc env:a 1"),
            Err(SemanticError::UnknownCommand("inc".into()))
        );
        assert!(analyze_with(&cfg, "clear env:a").is_ok());
    }

    #[test]
    fn key_errors() {
        assert_eq!(
            analyze("set prod:a to 1"),
            Err(SemanticError::UnknownScope("prod".into()))
        );
        assert_eq!(
            analyze("set env: to 1"),
            Err(SemanticError::InvalidKey("env:".into()))
        );
        assert_eq!(
            analyze("set limit to 1"),
            Err(SemanticError::InvalidKey("limit".into()))
        );
        assert!(matches!(
            analyze("clear"),
            Err(SemanticError::ArityError { found: 0, .. })
        ));
    }

    #[test]
    fn key_checked_before_arity() {
        assert_eq!(
            analyze("inc prod:a"),
            Err(SemanticError::UnknownScope("prod".into()))
        );
    }

    #[test]
    fn arity_errors() {
        assert_eq!(
            analyze("clear env:a 1"),
            Err(SemanticError::ArityError {
                command: "clear".into(),
                expected: "no operands".into(),
                found: 1
            })
        );
        assert!(matches!(analyze("inc env:a"), Err(SemanticError::ArityError { .. })));
        assert!(matches!(analyze("inc env:a 1 2"), Err(SemanticError::ArityError { found: 2, .. })));
        assert!(matches!(analyze("set env:a to"), Err(SemanticError::ArityError { found: 0, .. })));
        assert!(matches!(analyze("set env:a"), Err(SemanticError::ArityError { .. })));
    }

    #[test]
    fn type_errors() {
        assert_eq!(
            analyze("inc env:a truthy"),
            Err(SemanticError::TypeMismatch {
                command: "inc".into(),
                expected: "a number".into(),
                found: "truthy".into()
            })
        );
        assert!(matches!(
            analyze("set env:a to env:b"),
            Err(SemanticError::TypeMismatch { .. })
        ));
        assert!(matches!(
            analyze("set env:a to clear"),
            Err(SemanticError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn enum_resolution_is_case_sensitive_by_default() {
        let cmd = analyze("set query:mode truthy;").unwrap();
        assert_eq!(cmd.operand, Some(Operand::Literal("T".into())));
        assert_eq!(
            analyze("set query:mode Truthy;"),
            Err(SemanticError::UnknownEnum("Truthy".into()))
        );
        assert_eq!(
            analyze("set query:mode blue;"),
            Err(SemanticError::UnknownEnum("blue".into()))
        );
    }

    #[test]
    fn enum_resolution_case_insensitive() {
        let cfg = config().with_enum_case_sensitive(false);
        let cmd = analyze_with(&cfg, "set query:mode TRUTHY;").unwrap();
        assert_eq!(cmd.operand, Some(Operand::Literal("T".into())));
    }

    #[test]
    fn compound_key_infers_append() {
        let cfg = config()
            .with_compound_key("env:tags", CompoundKind::Set)
            .with_compound_key("query:*", CompoundKind::List);
        assert_eq!(
            analyze_with(&cfg, "set env:tags truthy").unwrap().kind,
            CommandKind::SetAppend
        );
        assert_eq!(
            analyze_with(&cfg, "set query:log 1").unwrap().kind,
            CommandKind::ListAppend
        );
        assert_eq!(
            analyze_with(&cfg, "set env:tags to truthy").unwrap().kind,
            CommandKind::Set
        );
        assert_eq!(
            analyze_with(&cfg, "set env:other 1").unwrap().kind,
            CommandKind::Set
        );
    }

    #[test]
    fn numbers_are_canonicalized() {
        let cmd = analyze("set env:a to -0.50").unwrap();
        assert_eq!(cmd.operand.unwrap().to_raw(), "-0.5");
        let big = analyze("set env:a to 99999999999999999999").unwrap();
        assert_eq!(big.operand.unwrap().to_raw(), "99999999999999999999");
    }
}
