//! Model types for Tablekit.
//!
//! This crate defines the value domain a backend natively stores: a row is an
//! opaque mapping from attribute name to a tagged [`Value`]. Everything above
//! this level (schemas, indexes, expressions) lives in `tablekit-core`;
//! backend-specific marshalling to native attribute representations is an
//! adapter responsibility.
#![allow(clippy::module_name_repetitions)]

pub mod row;
pub mod value;

pub use row::Row;
pub use value::Value;
