//! Scalar coercion between raw strings and `bool`, `i64`, `f64`.
//!
//! Canonical encodings:
//! - bool: the first configured true/false literal
//! - i64: base 10, no leading `+`
//! - f64: shortest round-trip form, always with a fractional part
//!   (`15.0`, `0.1`), non-finite values as `NaN`, `inf`, `-inf`
//!
//! Decoding never narrows: `"1.5"` is not an integer. Integer literals are
//! accepted as doubles since every one of them is also a decimal literal.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::CoercionError;
use crate::types::config::{BoolLiterals, FailureStrategy, TypedDefaults};

// ---------------------------------------------------------------------------
// Number
// ---------------------------------------------------------------------------

/// A numeric operand: integer when written without a fractional part.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    /// Parse a literal, choosing integer arithmetic unless the text has a
    /// fractional representation.
    pub fn parse(raw: &str) -> Option<Number> {
        if has_fractional_repr(raw) {
            raw.parse::<f64>().ok().map(Number::Float)
        } else {
            raw.parse::<i64>().ok().map(Number::Int)
        }
    }

    pub fn checked_neg(self) -> Option<Number> {
        match self {
            Number::Int(i) => i.checked_neg().map(Number::Int),
            Number::Float(f) => Some(Number::Float(-f)),
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    /// Canonical text for this number.
    pub fn render(self) -> String {
        match self {
            Number::Int(i) => i.to_string(),
            Number::Float(f) => format_double(f),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<i64> for Number {
    fn from(i: i64) -> Self {
        Number::Int(i)
    }
}

impl From<i32> for Number {
    fn from(i: i32) -> Self {
        Number::Int(i64::from(i))
    }
}

impl From<f64> for Number {
    fn from(f: f64) -> Self {
        Number::Float(f)
    }
}

fn has_fractional_repr(raw: &str) -> bool {
    let lower = raw.to_ascii_lowercase();
    lower.contains('.') || lower.contains('e') || lower.contains("inf") || lower.contains("nan")
}

fn is_integer_literal(raw: &str) -> bool {
    let digits = raw.strip_prefix('-').unwrap_or(raw);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Render a double in the canonical form.
pub fn format_double(f: f64) -> String {
    if f.is_nan() {
        return "NaN".into();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf".into() } else { "-inf".into() };
    }
    let s = f.to_string();
    if s.contains('.') {
        s
    } else {
        format!("{}.0", s)
    }
}

// ---------------------------------------------------------------------------
// Decoded
// ---------------------------------------------------------------------------

/// Outcome of a typed read under a non-throwing failure strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded<T> {
    /// The raw value decoded cleanly.
    Value(T),
    /// Decoding failed and the configured default was substituted.
    Fallback(T),
    /// Decoding failed under `ReturnFailureMarker`.
    Failed(CoercionError),
}

impl<T> Decoded<T> {
    /// The decoded or substituted value, `None` for the failure marker.
    pub fn value(self) -> Option<T> {
        match self {
            Decoded::Value(v) | Decoded::Fallback(v) => Some(v),
            Decoded::Failed(_) => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Decoded::Failed(_))
    }
}

// ---------------------------------------------------------------------------
// TypedValue
// ---------------------------------------------------------------------------

/// A scalar type the codec can read from and write to a raw string.
pub trait TypedValue: Sized {
    const TYPE_NAME: &'static str;

    fn decode(raw: &str, codec: &ValueCodec) -> Result<Self, CoercionError>;

    fn encode(&self, codec: &ValueCodec) -> String;

    fn fallback(defaults: &TypedDefaults) -> Self;
}

impl TypedValue for bool {
    const TYPE_NAME: &'static str = "bool";

    fn decode(raw: &str, codec: &ValueCodec) -> Result<Self, CoercionError> {
        let lits = &codec.bools;
        if lits.true_literals.iter().any(|t| t == raw) {
            Ok(true)
        } else if lits.false_literals.iter().any(|f| f == raw) {
            Ok(false)
        } else {
            Err(CoercionError::NotBool(raw.to_string()))
        }
    }

    fn encode(&self, codec: &ValueCodec) -> String {
        let lits = if *self {
            &codec.bools.true_literals
        } else {
            &codec.bools.false_literals
        };
        lits.first()
            .cloned()
            .unwrap_or_else(|| self.to_string())
    }

    fn fallback(defaults: &TypedDefaults) -> Self {
        defaults.bool_value
    }
}

impl TypedValue for i64 {
    const TYPE_NAME: &'static str = "int";

    fn decode(raw: &str, _codec: &ValueCodec) -> Result<Self, CoercionError> {
        raw.parse::<i64>()
            .map_err(|_| CoercionError::NotInt(raw.to_string()))
    }

    fn encode(&self, _codec: &ValueCodec) -> String {
        self.to_string()
    }

    fn fallback(defaults: &TypedDefaults) -> Self {
        defaults.int_value
    }
}

impl TypedValue for f64 {
    const TYPE_NAME: &'static str = "double";

    fn decode(raw: &str, _codec: &ValueCodec) -> Result<Self, CoercionError> {
        raw.parse::<f64>()
            .map_err(|_| CoercionError::NotDouble(raw.to_string()))
    }

    fn encode(&self, _codec: &ValueCodec) -> String {
        format_double(*self)
    }

    fn fallback(defaults: &TypedDefaults) -> Self {
        defaults.double_value
    }
}

// ---------------------------------------------------------------------------
// ValueCodec
// ---------------------------------------------------------------------------

/// Stateless scalar codec configured once per store.
#[derive(Debug, Clone)]
pub struct ValueCodec {
    strategy: FailureStrategy,
    defaults: TypedDefaults,
    bools: BoolLiterals,
}

impl ValueCodec {
    pub fn new(strategy: FailureStrategy, defaults: TypedDefaults, bools: BoolLiterals) -> Self {
        ValueCodec {
            strategy,
            defaults,
            bools,
        }
    }

    pub fn strategy(&self) -> FailureStrategy {
        self.strategy
    }

    /// Decode `raw` as `T`, applying the failure strategy on error.
    pub fn decode_as<T: TypedValue>(&self, raw: &str) -> Result<Decoded<T>, CoercionError> {
        match T::decode(raw, self) {
            Ok(v) => Ok(Decoded::Value(v)),
            Err(err) => match self.strategy {
                FailureStrategy::Throw => Err(err),
                FailureStrategy::LogAndReturnDefault => {
                    warn!(raw, target_type = T::TYPE_NAME, error = %err, "decode failed, using default");
                    Ok(Decoded::Fallback(T::fallback(&self.defaults)))
                }
                FailureStrategy::ReturnFailureMarker => Ok(Decoded::Failed(err)),
            },
        }
    }

    pub fn encode<T: TypedValue>(&self, value: &T) -> String {
        value.encode(self)
    }

    /// Add `delta` to the numeric value held in `raw`.
    ///
    /// Integer arithmetic is used only when both sides are integers.
    pub fn transform_numeric(&self, raw: &str, delta: Number) -> Result<String, CoercionError> {
        let current = match Number::parse(raw) {
            Some(n) => n,
            // Integer text outside the i64 range is a number, just not one
            // integer arithmetic can hold.
            None if is_integer_literal(raw) => {
                return Err(CoercionError::Overflow {
                    raw: raw.to_string(),
                    delta: delta.render(),
                })
            }
            None => return Err(CoercionError::NotNumeric(raw.to_string())),
        };
        let result = match (current, delta) {
            (Number::Int(a), Number::Int(b)) => {
                Number::Int(a.checked_add(b).ok_or_else(|| CoercionError::Overflow {
                    raw: raw.to_string(),
                    delta: delta.render(),
                })?)
            }
            (a, b) => Number::Float(a.as_f64() + b.as_f64()),
        };
        Ok(result.render())
    }
}

impl Default for ValueCodec {
    fn default() -> Self {
        ValueCodec::new(
            FailureStrategy::default(),
            TypedDefaults::default(),
            BoolLiterals::default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec(strategy: FailureStrategy) -> ValueCodec {
        ValueCodec::new(strategy, TypedDefaults::default(), BoolLiterals::default())
    }

    #[test]
    fn bool_round_trip() {
        let c = ValueCodec::default();
        for v in [true, false] {
            let raw = c.encode(&v);
            assert_eq!(c.decode_as::<bool>(&raw).unwrap(), Decoded::Value(v));
        }
    }

    #[test]
    fn int_round_trip() {
        let c = ValueCodec::default();
        for v in [0i64, 15, -42, i64::MAX, i64::MIN] {
            let raw = c.encode(&v);
            assert_eq!(c.decode_as::<i64>(&raw).unwrap(), Decoded::Value(v));
        }
    }

    #[test]
    fn double_round_trip() {
        let c = ValueCodec::default();
        for v in [0.0f64, 15.0, -2.5, 0.1, 1e300, 1e-7, f64::INFINITY, f64::NEG_INFINITY] {
            let raw = c.encode(&v);
            assert_eq!(c.decode_as::<f64>(&raw).unwrap(), Decoded::Value(v), "raw {}", raw);
        }
    }

    #[test]
    fn double_canonical_format() {
        assert_eq!(format_double(15.0), "15.0");
        assert_eq!(format_double(0.1), "0.1");
        assert_eq!(format_double(-3.0), "-3.0");
        assert_eq!(format_double(f64::NAN), "NaN");
        assert_eq!(format_double(f64::NEG_INFINITY), "-inf");
    }

    #[test]
    fn configured_bool_literals() {
        let c = ValueCodec::new(
            FailureStrategy::Throw,
            TypedDefaults::default(),
            BoolLiterals {
                true_literals: vec!["yes".into(), "on".into()],
                false_literals: vec!["no".into(), "off".into()],
            },
        );
        assert_eq!(c.decode_as::<bool>("on").unwrap(), Decoded::Value(true));
        assert_eq!(c.decode_as::<bool>("off").unwrap(), Decoded::Value(false));
        assert_eq!(c.encode(&true), "yes");
        assert_eq!(
            c.decode_as::<bool>("true"),
            Err(CoercionError::NotBool("true".into()))
        );
    }

    #[test]
    fn bool_literals_are_exact() {
        let c = ValueCodec::default();
        assert!(c.decode_as::<bool>("TRUE").is_err());
        assert!(c.decode_as::<bool>(" true").is_err());
    }

    #[test]
    fn no_narrowing_to_int() {
        let c = ValueCodec::default();
        assert_eq!(c.decode_as::<i64>("1.0"), Err(CoercionError::NotInt("1.0".into())));
        assert_eq!(c.decode_as::<f64>("3").unwrap(), Decoded::Value(3.0));
    }

    #[test]
    fn throw_strategy_errors() {
        let c = codec(FailureStrategy::Throw);
        assert_eq!(
            c.decode_as::<f64>("abc"),
            Err(CoercionError::NotDouble("abc".into()))
        );
    }

    #[test]
    fn default_strategy_substitutes() {
        let c = ValueCodec::new(
            FailureStrategy::LogAndReturnDefault,
            TypedDefaults {
                bool_value: true,
                int_value: -1,
                double_value: 0.5,
            },
            BoolLiterals::default(),
        );
        assert_eq!(c.decode_as::<i64>("x").unwrap(), Decoded::Fallback(-1));
        assert_eq!(c.decode_as::<bool>("x").unwrap(), Decoded::Fallback(true));
        assert_eq!(c.decode_as::<f64>("x").unwrap().value(), Some(0.5));
    }

    #[test]
    fn marker_strategy_reports_failure() {
        let c = codec(FailureStrategy::ReturnFailureMarker);
        let decoded = c.decode_as::<i64>("x").unwrap();
        assert!(decoded.is_failed());
        assert_eq!(decoded.value(), None);
    }

    #[test]
    fn transform_integer() {
        let c = ValueCodec::default();
        assert_eq!(c.transform_numeric("10", Number::Int(5)).unwrap(), "15");
        assert_eq!(c.transform_numeric("10", Number::Int(-15)).unwrap(), "-5");
    }

    #[test]
    fn transform_decimal_is_sticky() {
        let c = ValueCodec::default();
        assert_eq!(c.transform_numeric("1.5", Number::Int(1)).unwrap(), "2.5");
        assert_eq!(c.transform_numeric("1.5", Number::Float(0.5)).unwrap(), "2.0");
        assert_eq!(c.transform_numeric("2", Number::Float(0.5)).unwrap(), "2.5");
    }

    #[test]
    fn transform_not_numeric() {
        let c = ValueCodec::default();
        assert_eq!(
            c.transform_numeric("blue", Number::Int(1)),
            Err(CoercionError::NotNumeric("blue".into()))
        );
        assert!(c.transform_numeric("", Number::Int(1)).is_err());
    }

    #[test]
    fn transform_overflow() {
        let c = ValueCodec::default();
        assert!(matches!(
            c.transform_numeric(&i64::MAX.to_string(), Number::Int(1)),
            Err(CoercionError::Overflow { .. })
        ));
    }

    #[test]
    fn transform_integer_text_beyond_i64() {
        let c = ValueCodec::default();
        assert!(matches!(
            c.transform_numeric("99999999999999999999", Number::Int(1)),
            Err(CoercionError::Overflow { ref raw, .. }) if raw == "99999999999999999999"
        ));
        assert!(matches!(
            c.transform_numeric("-99999999999999999999", Number::Int(1)),
            Err(CoercionError::Overflow { .. })
        ));
        assert_eq!(
            c.transform_numeric("-", Number::Int(1)),
            Err(CoercionError::NotNumeric("-".into()))
        );
    }

    #[test]
    fn number_parse_selects_kind() {
        assert_eq!(Number::parse("10"), Some(Number::Int(10)));
        assert_eq!(Number::parse("-0.5"), Some(Number::Float(-0.5)));
        assert_eq!(Number::parse("1e3"), Some(Number::Float(1000.0)));
        assert_eq!(Number::parse("ten"), None);
        assert_eq!(Number::Int(i64::MIN).checked_neg(), None);
    }
}
