//! Tokenizer for command scripts.
//!
//! A script is a `;`-separated sequence of statements such as
//! `set env:limit to 10; inc env:limit 5;`. The token grammar is closed:
//! keywords, `scope:name` keys, numbers (`-?digits(.digits)?`) and bare
//! identifiers. Quotes, operators and any other character are rejected, so
//! free text can never reach the store.
//!
//! Statements are split on `;` before tokenizing, so a bad character in one
//! statement does not prevent the next from being tokenized. Positions are
//! character offsets into the whole script.

use std::fmt;

use serde::Serialize;

use crate::error::LexError;

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Keyword {
    Set,
    Inc,
    Dec,
    Clear,
    List,
    Append,
    To,
}

impl Keyword {
    /// Keywords are lowercase and matched exactly.
    pub fn from_word(word: &str) -> Option<Keyword> {
        match word {
            "set" => Some(Keyword::Set),
            "inc" => Some(Keyword::Inc),
            "dec" => Some(Keyword::Dec),
            "clear" => Some(Keyword::Clear),
            "list" => Some(Keyword::List),
            "append" => Some(Keyword::Append),
            "to" => Some(Keyword::To),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Keyword::Set => "set",
            Keyword::Inc => "inc",
            Keyword::Dec => "dec",
            Keyword::Clear => "clear",
            Keyword::List => "list",
            Keyword::Append => "append",
            Keyword::To => "to",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum TokenKind {
    Keyword(Keyword),
    /// `scope:name`, not yet validated against any configuration.
    Key(String),
    Number(String),
    /// Bare identifier, a candidate enum token.
    Ident(String),
    Terminator,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Keyword(k) => f.write_str(k.as_str()),
            TokenKind::Key(s) | TokenKind::Number(s) | TokenKind::Ident(s) => f.write_str(s),
            TokenKind::Terminator => f.write_str(";"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    pub position: usize,
}

/// One statement of a script with its tokens or the first lexing failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexedStatement {
    pub index: usize,
    /// Offset of the statement's first character in the script.
    pub position: usize,
    /// Statement source, trimmed, without the terminator.
    pub text: String,
    pub tokens: Result<Vec<Token>, LexError>,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Split `script` into statements and tokenize each one.
///
/// Whitespace-only statements are dropped. A final statement without `;`
/// is accepted.
pub fn lex_script(script: &str) -> Vec<LexedStatement> {
    let chars: Vec<char> = script.chars().collect();
    let mut statements = Vec::new();
    let mut start = 0;

    for i in 0..=chars.len() {
        let at_end = i == chars.len();
        if !at_end && chars[i] != ';' {
            continue;
        }
        let segment = &chars[start..i];
        if segment.iter().any(|c| !c.is_whitespace()) {
            let text: String = segment.iter().collect();
            statements.push(LexedStatement {
                index: statements.len(),
                position: start,
                text: text.trim().to_string(),
                tokens: tokenize(segment, start, !at_end),
            });
        }
        start = i + 1;
    }

    statements
}

// ---------------------------------------------------------------------------
// Internal scanner
// ---------------------------------------------------------------------------

fn tokenize(chars: &[char], offset: usize, terminated: bool) -> Result<Vec<Token>, LexError> {
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let start = i;
        let kind = if is_word_start(c) {
            i = scan_word(chars, i);
            if i < chars.len() && chars[i] == ':' {
                i = scan_word(chars, i + 1);
                TokenKind::Key(chars[start..i].iter().collect())
            } else {
                let word: String = chars[start..i].iter().collect();
                match Keyword::from_word(&word) {
                    Some(k) => TokenKind::Keyword(k),
                    None => TokenKind::Ident(word),
                }
            }
        } else if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) {
            i = scan_number(chars, i, offset)?;
            TokenKind::Number(chars[start..i].iter().collect())
        } else {
            return Err(error_at(chars, i, offset));
        };

        // Tokens must be separated by whitespace.
        if i < chars.len() && !chars[i].is_whitespace() {
            return Err(error_at(chars, i, offset));
        }
        tokens.push(Token {
            kind,
            position: offset + start,
        });
    }

    if terminated {
        tokens.push(Token {
            kind: TokenKind::Terminator,
            position: offset + chars.len(),
        });
    }
    Ok(tokens)
}

fn is_word_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn scan_word(chars: &[char], mut i: usize) -> usize {
    while i < chars.len() && is_word_char(chars[i]) {
        i += 1;
    }
    i
}

fn scan_digits(chars: &[char], mut i: usize) -> usize {
    while i < chars.len() && chars[i].is_ascii_digit() {
        i += 1;
    }
    i
}

fn scan_number(chars: &[char], mut i: usize, offset: usize) -> Result<usize, LexError> {
    if chars[i] == '-' {
        i += 1;
    }
    i = scan_digits(chars, i);
    if i < chars.len() && chars[i] == '.' {
        let frac = scan_digits(chars, i + 1);
        if frac == i + 1 {
            return Err(error_at(chars, i, offset));
        }
        i = frac;
    }
    Ok(i)
}

fn error_at(chars: &[char], i: usize, offset: usize) -> LexError {
    LexError {
        position: offset + i,
        character: chars[i],
    }
}
