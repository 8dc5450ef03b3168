//! Backend adapter boundary.
//!
//! The core consumes one adapter per backend family through
//! [`BackendAdapter`]: six operations over opaque rows. Adapters own
//! marshalling to native attribute representations, connections, and
//! retries; the core only wraps and propagates their failures. Entity/table
//! objects take an adapter as a constructor parameter (dependency
//! injection), so the same entity definition runs against any backend.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use tablekit_model::Row;

use crate::expression::CompiledExpression;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// An opaque adapter-level failure (connectivity, throttling, marshalling).
///
/// The core does not interpret or retry these; retry policy is a caller
/// concern.
#[derive(Debug, Error)]
#[error("backend error: {message}")]
pub struct BackendError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl BackendError {
    /// Creates an error from a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Attaches the underlying source error.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

/// Outcome classification for adapter operations.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The operation's condition expression evaluated to false.
    #[error("condition failed")]
    ConditionFailed,
    /// A transactional batch failed; nothing was applied.
    #[error("transaction aborted at item {index}")]
    Aborted {
        /// Zero-based index of the failing item.
        index: usize,
    },
    /// Opaque backend failure, wrapped and propagated.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

// ---------------------------------------------------------------------------
// Addressing
// ---------------------------------------------------------------------------

/// Identifies a physical table and its primary key columns.
#[derive(Debug, Clone)]
pub struct TableRef {
    /// The table name.
    pub name: String,
    /// Column holding the primary partition key string.
    pub partition_column: String,
    /// Column holding the primary sort key string, if the table has one.
    pub sort_column: Option<String>,
}

impl TableRef {
    /// Creates a partition-only table reference.
    #[must_use]
    pub fn new(name: impl Into<String>, partition_column: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partition_column: partition_column.into(),
            sort_column: None,
        }
    }

    /// Adds a sort key column.
    #[must_use]
    pub fn with_sort_column(mut self, sort_column: impl Into<String>) -> Self {
        self.sort_column = Some(sort_column.into());
        self
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// The derived primary key strings addressing one row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowKey {
    /// The partition key string.
    pub partition: String,
    /// The sort key string, if the table has a sort column.
    pub sort: Option<String>,
}

/// Options for query execution.
#[derive(Debug, Clone, Copy)]
pub struct QueryOptions {
    /// Maximum number of rows to return.
    pub limit: Option<usize>,
    /// Ascending sort-key order when `true` (the default), descending
    /// otherwise.
    pub scan_forward: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            limit: None,
            scan_forward: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Write operations
// ---------------------------------------------------------------------------

/// One member of a transactional write batch.
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Conditional put of a full row.
    Put {
        /// Target table.
        table: TableRef,
        /// The full row to store.
        row: Row,
        /// Optional precondition.
        condition: Option<CompiledExpression>,
    },
    /// Conditional update of an existing row.
    Update {
        /// Target table.
        table: TableRef,
        /// The row's primary key.
        key: RowKey,
        /// The compiled update expression.
        update: CompiledExpression,
        /// Optional precondition.
        condition: Option<CompiledExpression>,
    },
    /// Conditional row removal.
    Delete {
        /// Target table.
        table: TableRef,
        /// The row's primary key.
        key: RowKey,
        /// Optional precondition.
        condition: Option<CompiledExpression>,
    },
}

// ---------------------------------------------------------------------------
// Adapter trait
// ---------------------------------------------------------------------------

/// The six operations a backend must expose.
///
/// Single-item operations are atomic at the backend: once issued they either
/// complete or fail, with no partial completion. `transact_write` is
/// all-or-nothing across its batch.
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    /// Reads a row by primary key. Absent is `Ok(None)`, not an error.
    async fn get(&self, table: &TableRef, key: &RowKey) -> Result<Option<Row>, AdapterError>;

    /// Stores a full row, optionally guarded by a condition on the existing
    /// row (or its absence).
    async fn put(
        &self,
        table: &TableRef,
        row: Row,
        condition: Option<&CompiledExpression>,
    ) -> Result<(), AdapterError>;

    /// Applies an update expression to a row, optionally guarded by a
    /// condition.
    async fn update(
        &self,
        table: &TableRef,
        key: &RowKey,
        update: &CompiledExpression,
        condition: Option<&CompiledExpression>,
    ) -> Result<(), AdapterError>;

    /// Removes a row, optionally guarded by a condition.
    async fn delete_row(
        &self,
        table: &TableRef,
        key: &RowKey,
        condition: Option<&CompiledExpression>,
    ) -> Result<(), AdapterError>;

    /// Executes a key condition against the named index (`None` for the
    /// primary index), applying an optional row filter.
    async fn query(
        &self,
        table: &TableRef,
        index: Option<&str>,
        key_condition: &CompiledExpression,
        filter: Option<&CompiledExpression>,
        options: QueryOptions,
    ) -> Result<Vec<Row>, AdapterError>;

    /// Applies a batch of writes atomically. If any member's precondition
    /// fails, nothing is applied and the failure carries the member's index.
    async fn transact_write(&self, ops: Vec<WriteOp>) -> Result<(), AdapterError>;
}
