//! Typed value codec: stateless conversions applied at the store boundary.
//!
//! Values are always stored as raw strings; `value` handles scalars and
//! numeric transforms, `compound` handles list and set encodings.

pub mod compound;
pub mod value;

pub use compound::{compound_codec, dedupe, CompoundCodec, DelimitedCodec, JsonArrayCodec};
pub use value::{format_double, Decoded, Number, TypedValue, ValueCodec};
