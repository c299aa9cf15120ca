//! Command-line front end support shared with the `skv` binary.

pub mod parse;

pub use parse::{parse_args, parse_import, Action, Invocation, Options, USAGE};
