//! The dynamically typed CBOR value tree.
//!
//! CBOR itself is treated as a black-box codec; [`ciborium`]'s value type
//! already is the tagged variant tree {Null, Bool, Int, Float, Text, Bytes,
//! List, Map} this core needs, so it is re-exported rather than duplicated.

/// A decoded CBOR value, or a tree to encode.
pub use ciborium::value::Value as CborValue;
