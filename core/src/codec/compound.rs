//! List and set serialization strategies.
//!
//! A compound value is stored as one raw string. The strategy is fixed when
//! the store is built: either a delimiter-separated form with an optional
//! escape character, or a JSON array of strings.

use std::collections::HashSet;
use std::fmt;

use crate::error::CoercionError;
use crate::types::config::CompoundSerialization;

/// Encoding capability for list and set values.
pub trait CompoundCodec: fmt::Debug + Send + Sync {
    fn encode_list(&self, items: &[String]) -> Result<String, CoercionError>;

    fn decode_list(&self, raw: &str) -> Result<Vec<String>, CoercionError>;

    /// Encode after dropping duplicates, keeping first-seen order.
    fn encode_set(&self, items: &[String]) -> Result<String, CoercionError> {
        self.encode_list(&dedupe(items))
    }

    fn decode_set(&self, raw: &str) -> Result<Vec<String>, CoercionError> {
        Ok(dedupe(&self.decode_list(raw)?))
    }
}

/// Drop repeated items, keeping the first occurrence of each.
pub fn dedupe(items: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .iter()
        .filter(|item| seen.insert(item.as_str()))
        .cloned()
        .collect()
}

/// Build the codec selected by the configuration.
pub fn compound_codec(serialization: &CompoundSerialization) -> Box<dyn CompoundCodec> {
    match serialization {
        CompoundSerialization::Delimited { delimiter, escape } => Box::new(DelimitedCodec {
            delimiter: *delimiter,
            escape: *escape,
        }),
        CompoundSerialization::JsonArray => Box::new(JsonArrayCodec),
    }
}

// ---------------------------------------------------------------------------
// Delimited
// ---------------------------------------------------------------------------

/// `a,b,c` style encoding.
///
/// With an escape character, delimiters and escapes inside items are
/// prefixed by the escape. Without one, an item containing the delimiter
/// is rejected with `NotCompound`. The empty string always decodes to the empty list, so a list
/// holding a single empty item does not survive a round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelimitedCodec {
    pub delimiter: char,
    pub escape: Option<char>,
}

impl CompoundCodec for DelimitedCodec {
    fn encode_list(&self, items: &[String]) -> Result<String, CoercionError> {
        let mut out = String::new();
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                out.push(self.delimiter);
            }
            for c in item.chars() {
                match self.escape {
                    Some(esc) if c == esc || c == self.delimiter => out.push(esc),
                    None if c == self.delimiter => {
                        return Err(CoercionError::NotCompound {
                            raw: item.clone(),
                            reason: format!("item contains delimiter '{}'", self.delimiter),
                        })
                    }
                    _ => {}
                }
                out.push(c);
            }
        }
        Ok(out)
    }

    fn decode_list(&self, raw: &str) -> Result<Vec<String>, CoercionError> {
        if raw.is_empty() {
            return Ok(Vec::new());
        }
        let mut items = Vec::new();
        let mut current = String::new();
        let mut chars = raw.chars();
        while let Some(c) = chars.next() {
            if Some(c) == self.escape {
                match chars.next() {
                    Some(next) => current.push(next),
                    None => {
                        return Err(CoercionError::NotCompound {
                            raw: raw.to_string(),
                            reason: "dangling escape character".into(),
                        })
                    }
                }
            } else if c == self.delimiter {
                items.push(std::mem::take(&mut current));
            } else {
                current.push(c);
            }
        }
        items.push(current);
        Ok(items)
    }
}

// ---------------------------------------------------------------------------
// JSON array
// ---------------------------------------------------------------------------

/// `["a","b"]` style encoding.
///
/// Numbers and booleans inside an array decode to their JSON text; nested
/// arrays, objects and nulls are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsonArrayCodec;

impl CompoundCodec for JsonArrayCodec {
    fn encode_list(&self, items: &[String]) -> Result<String, CoercionError> {
        serde_json::to_string(items).map_err(|e| CoercionError::NotCompound {
            raw: format!("{:?}", items),
            reason: e.to_string(),
        })
    }

    fn decode_list(&self, raw: &str) -> Result<Vec<String>, CoercionError> {
        if raw.is_empty() {
            return Ok(Vec::new());
        }
        let not_compound = |reason: String| CoercionError::NotCompound {
            raw: raw.to_string(),
            reason,
        };
        let values: Vec<serde_json::Value> =
            serde_json::from_str(raw).map_err(|e| not_compound(e.to_string()))?;
        values
            .into_iter()
            .map(|v| match v {
                serde_json::Value::String(s) => Ok(s),
                serde_json::Value::Number(n) => Ok(n.to_string()),
                serde_json::Value::Bool(b) => Ok(b.to_string()),
                other => Err(not_compound(format!("unsupported element {}", other))),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn comma(escape: Option<char>) -> DelimitedCodec {
        DelimitedCodec {
            delimiter: ',',
            escape,
        }
    }

    #[test]
    fn delimited_basic() {
        let c = comma(None);
        assert_eq!(c.encode_list(&strings(&["a", "b", "c"])).unwrap(), "a,b,c");
        assert_eq!(c.decode_list("a,b,c").unwrap(), strings(&["a", "b", "c"]));
    }

    #[test]
    fn delimited_empty_string_is_empty_list() {
        assert!(comma(None).decode_list("").unwrap().is_empty());
        assert_eq!(comma(None).encode_list(&[]).unwrap(), "");
    }

    #[test]
    fn delimited_escapes_delimiter_and_escape() {
        let c = comma(Some('\\'));
        let items = strings(&["a,b", "c\\d", "e"]);
        let raw = c.encode_list(&items).unwrap();
        assert_eq!(raw, "a\\,b,c\\\\d,e");
        assert_eq!(c.decode_list(&raw).unwrap(), items);
    }

    #[test]
    fn unescaped_delimiter_in_item_rejected() {
        let err = comma(None).encode_list(&strings(&["ok", "a,b"])).unwrap_err();
        assert!(matches!(err, CoercionError::NotCompound { ref raw, .. } if raw == "a,b"));
        assert!(comma(None).encode_set(&strings(&["a,b"])).is_err());
    }

    #[test]
    fn delimited_dangling_escape() {
        assert!(matches!(
            comma(Some('\\')).decode_list("a\\"),
            Err(CoercionError::NotCompound { .. })
        ));
    }

    #[test]
    fn delimited_keeps_empty_inner_items() {
        assert_eq!(comma(None).decode_list("a,,b").unwrap(), strings(&["a", "", "b"]));
    }

    #[test]
    fn json_array_round_trip() {
        let c = JsonArrayCodec;
        let items = strings(&["blue", "with \"quotes\"", "a,b"]);
        let raw = c.encode_list(&items).unwrap();
        assert_eq!(c.decode_list(&raw).unwrap(), items);
    }

    #[test]
    fn json_array_scalars_become_text() {
        assert_eq!(
            JsonArrayCodec.decode_list(r#"["a", 1, 2.5, true]"#).unwrap(),
            strings(&["a", "1", "2.5", "true"])
        );
    }

    #[test]
    fn json_array_rejects_objects_and_garbage() {
        assert!(JsonArrayCodec.decode_list(r#"[{"a":1}]"#).is_err());
        assert!(JsonArrayCodec.decode_list("not json").is_err());
        assert!(JsonArrayCodec.decode_list("{}").is_err());
    }

    #[test]
    fn set_encoding_dedupes_in_order() {
        for codec in [
            compound_codec(&CompoundSerialization::JsonArray),
            compound_codec(&CompoundSerialization::default()),
        ] {
            let raw = codec.encode_set(&strings(&["b", "a", "b", "c", "a"])).unwrap();
            assert_eq!(codec.decode_set(&raw).unwrap(), strings(&["b", "a", "c"]));
        }
    }

    #[test]
    fn decode_set_collapses_duplicates_written_as_list() {
        let c = comma(None);
        assert_eq!(c.decode_set("x,x,y").unwrap(), strings(&["x", "y"]));
    }
}
