//! Tablekit core: define an entity once, persist and query it uniformly
//! across key-value and relational backends.
//!
//! The crate is organized around four pieces:
//!
//! - [`schema`]: a chain of schema versions with upgrade functions; encoding
//!   always writes the newest version, decoding lazily upgrades old rows on
//!   read.
//! - [`index`]: pure derivations from entity fields to `#`-joined key
//!   strings for the primary index and each secondary index.
//! - [`expression`]: update, condition, and key-condition compilers sharing
//!   a placeholder allocator; output is backend-safe parameterized text plus
//!   attribute maps.
//! - [`entity`]: CRUD, query, and transactional writes composed on top of a
//!   [`adapter::BackendAdapter`], maintaining per-record metadata (version
//!   tag, sequence counter, soft-delete flag).
//!
//! [`memory`] provides a reference in-memory adapter used by the test suite.
#![allow(clippy::module_name_repetitions)]

pub mod adapter;
pub mod entity;
pub mod expression;
pub mod index;
pub mod memory;
pub mod schema;

pub use adapter::{
    AdapterError, BackendAdapter, BackendError, QueryOptions, RowKey, TableRef, WriteOp,
};
pub use entity::{
    DeletePolicy, Entity, EntityBuilder, EntityError, ReadOptions, VersionedRecord, transact_write,
};
pub use expression::{
    CompiledExpression, ConditionCheck, Dialect, ExpressionError, KeyCondition, SortPredicate,
    UpdatePatch,
};
pub use index::{IndexDefinition, IndexError, KeyDerivation, KeySegment};
pub use memory::MemoryBackend;
pub use schema::{FieldKind, Shape, SchemaBuilder, SchemaCodec, SchemaError};
