//! Entity persistence layer.
//!
//! An [`Entity`] binds a schema version chain, a primary index, and any
//! number of secondary indexes to one table behind a [`BackendAdapter`].
//! Stored rows carry the entity's fields plus derived index key columns and
//! three metadata columns: the schema version tag, a monotonically increasing
//! sequence counter, and a soft-delete flag. The metadata columns are owned
//! by this layer and never surfaced as entity fields.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use tablekit_model::{Row, Value};

use crate::adapter::{
    AdapterError, BackendAdapter, BackendError, QueryOptions, RowKey, TableRef, WriteOp,
};
use crate::expression::{
    CompiledExpression, ConditionCheck, Dialect, ExpressionError, KeyCondition, UpdateAction,
    UpdatePatch, apply_update, compile_condition, compile_key_condition, compile_update,
};
use crate::index::{IndexDefinition, IndexError};
use crate::schema::{SchemaCodec, SchemaError};

/// Metadata column holding the schema version tag.
pub const VERSION_COLUMN: &str = "_v";
/// Metadata column holding the sequence counter.
pub const SEQUENCE_COLUMN: &str = "_seq";
/// Metadata column holding the soft-delete flag.
pub const DELETED_COLUMN: &str = "_deleted";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from entity operations.
#[derive(Debug, Error)]
pub enum EntityError {
    /// The entity definition is incomplete or inconsistent.
    #[error("invalid entity definition: {reason}")]
    Definition {
        /// What is wrong with the definition.
        reason: String,
    },
    /// Insert targeted a primary key that already holds a record.
    #[error("record already exists")]
    AlreadyExists,
    /// Update or delete targeted an absent (or soft-deleted) record.
    #[error("record not found")]
    NotFound,
    /// The record's sequence moved past the caller's expected value.
    #[error("concurrent modification detected")]
    ConcurrencyConflict,
    /// An update would change the record's primary key.
    #[error("update changes the primary key")]
    PrimaryKeyChanged,
    /// An update addressed a metadata or index key column directly.
    #[error("update touches reserved column '{column}'")]
    ReservedColumn {
        /// The reserved column name.
        column: String,
    },
    /// A query named an index the entity does not define.
    #[error("unknown index '{name}'")]
    UnknownIndex {
        /// The requested index name.
        name: String,
    },
    /// An update action could not be applied to the current record.
    #[error("update not applicable: {reason}")]
    Patch {
        /// Why the action was rejected.
        reason: String,
    },
    /// A stored row is missing or mangles its metadata columns.
    #[error("stored row is corrupt: {reason}")]
    Corrupt {
        /// What is wrong with the row.
        reason: String,
    },
    /// A transactional batch failed; nothing was applied.
    #[error("transaction aborted at item {index}")]
    TransactionAborted {
        /// Zero-based index of the failing item.
        index: usize,
    },
    /// Schema validation or decoding failed.
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// Index key derivation failed.
    #[error(transparent)]
    Index(#[from] IndexError),
    /// Expression compilation failed.
    #[error(transparent)]
    Expression(#[from] ExpressionError),
    /// The backend failed.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Maps adapter failures in contexts where a condition failure has already
/// been ruled out or is handled by the caller.
fn adapter_err(err: AdapterError) -> EntityError {
    match err {
        AdapterError::ConditionFailed => EntityError::ConcurrencyConflict,
        AdapterError::Aborted { index } => EntityError::TransactionAborted { index },
        AdapterError::Backend(err) => EntityError::Backend(err),
    }
}

// ---------------------------------------------------------------------------
// Records and policies
// ---------------------------------------------------------------------------

/// What `delete` means for an entity. Required at construction; there is no
/// default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletePolicy {
    /// Delete removes the stored row.
    Hard,
    /// Delete flips the soft-delete flag; the row stays stored and is
    /// excluded from reads and queries by default.
    Soft,
}

/// Read behavior toggles.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOptions {
    /// Include soft-deleted records instead of treating them as absent.
    pub include_deleted: bool,
}

/// A decoded record together with its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedRecord {
    /// The latest-shape entity fields, metadata and index columns stripped.
    pub record: Row,
    /// The sequence counter value.
    pub sequence: u64,
    /// The schema version tag the record conforms to. Read-time upgrades
    /// mean this is always the chain's latest tag.
    pub version_tag: String,
    /// The soft-delete flag.
    pub deleted: bool,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for an [`Entity`].
#[derive(Debug)]
pub struct EntityBuilder {
    name: String,
    table: TableRef,
    codec: Option<SchemaCodec>,
    primary: Option<IndexDefinition>,
    secondary: Vec<IndexDefinition>,
    dialect: Dialect,
    delete_policy: Option<DeletePolicy>,
}

impl EntityBuilder {
    /// Starts a definition for the named entity stored in `table`.
    #[must_use]
    pub fn new(name: impl Into<String>, table: TableRef) -> Self {
        Self {
            name: name.into(),
            table,
            codec: None,
            primary: None,
            secondary: Vec::new(),
            dialect: Dialect::default(),
            delete_policy: None,
        }
    }

    /// Sets the schema version chain.
    #[must_use]
    pub fn schema(mut self, codec: SchemaCodec) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Sets the primary index. Its columns must match the table's key
    /// columns.
    #[must_use]
    pub fn primary_index(mut self, index: IndexDefinition) -> Self {
        self.primary = Some(index);
        self
    }

    /// Adds a secondary index.
    #[must_use]
    pub fn secondary_index(mut self, index: IndexDefinition) -> Self {
        self.secondary.push(index);
        self
    }

    /// Sets the expression dialect (defaults to key-value).
    #[must_use]
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Sets the delete policy.
    #[must_use]
    pub fn delete_policy(mut self, policy: DeletePolicy) -> Self {
        self.delete_policy = Some(policy);
        self
    }

    /// Finalizes the definition against a backend.
    ///
    /// # Errors
    ///
    /// [`EntityError::Definition`] when the schema, primary index, or delete
    /// policy is missing, or the primary index columns do not match the
    /// table's key columns.
    pub fn build(self, backend: Arc<dyn BackendAdapter>) -> Result<Entity, EntityError> {
        let missing = |what: &str| EntityError::Definition {
            reason: format!("{what} is not set"),
        };
        let codec = self.codec.ok_or_else(|| missing("schema"))?;
        let primary = self.primary.ok_or_else(|| missing("primary index"))?;
        let delete_policy = self.delete_policy.ok_or_else(|| missing("delete policy"))?;

        if primary.partition_column != self.table.partition_column
            || primary.sort_column != self.table.sort_column
        {
            return Err(EntityError::Definition {
                reason: format!(
                    "primary index columns do not match table '{}' key columns",
                    self.table.name
                ),
            });
        }

        Ok(Entity {
            name: self.name,
            table: self.table,
            backend,
            codec,
            primary,
            secondary: self.secondary,
            dialect: self.dialect,
            delete_policy,
        })
    }
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// A fully defined entity bound to one backend.
pub struct Entity {
    name: String,
    table: TableRef,
    backend: Arc<dyn BackendAdapter>,
    codec: SchemaCodec,
    primary: IndexDefinition,
    secondary: Vec<IndexDefinition>,
    dialect: Dialect,
    delete_policy: DeletePolicy,
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("name", &self.name)
            .field("table", &self.table.name)
            .field("delete_policy", &self.delete_policy)
            .finish_non_exhaustive()
    }
}

impl Entity {
    /// The entity name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    // ---- Writes ----

    /// Inserts a new record. The stored row gets sequence `1`, the latest
    /// version tag, and a cleared soft-delete flag.
    ///
    /// # Errors
    ///
    /// [`EntityError::AlreadyExists`] when a record already holds the same
    /// primary key.
    pub async fn insert(&self, record: Row) -> Result<VersionedRecord, EntityError> {
        let tag = self.codec.encode(&record)?.to_owned();
        let key = self.primary_key(&record)?;
        let stored = self.build_stored(&record, &tag, 1, false)?;

        let guard = compile_condition(
            &ConditionCheck::new().not_exists(&self.table.partition_column),
            self.dialect,
        )?;
        debug!(entity = %self.name, partition = %key.partition, "insert");
        match self.backend.put(&self.table, stored, Some(&guard)).await {
            Ok(()) => Ok(VersionedRecord {
                record,
                sequence: 1,
                version_tag: tag,
                deleted: false,
            }),
            Err(AdapterError::ConditionFailed) => Err(EntityError::AlreadyExists),
            Err(err) => Err(adapter_err(err)),
        }
    }

    /// Applies a partial update to an existing record: the current record is
    /// read, the patch merged and validated, secondary index key columns
    /// re-derived, and the sequence counter bumped.
    ///
    /// With `expected_sequence`, the write is guarded against concurrent
    /// modification.
    ///
    /// # Errors
    ///
    /// [`EntityError::NotFound`] when no live record holds the key,
    /// [`EntityError::ConcurrencyConflict`] when the sequence moved past
    /// `expected_sequence`, [`EntityError::PrimaryKeyChanged`] when the patch
    /// would alter the primary key.
    pub async fn update(
        &self,
        key_fields: &Row,
        patch: &UpdatePatch,
        expected_sequence: Option<u64>,
    ) -> Result<VersionedRecord, EntityError> {
        let prepared = self.prepare_update(key_fields, patch, expected_sequence).await?;
        debug!(entity = %self.name, partition = %prepared.key.partition, sequence = prepared.sequence, "update");
        match self
            .backend
            .update(
                &self.table,
                &prepared.key,
                &prepared.update,
                Some(&prepared.condition),
            )
            .await
        {
            Ok(()) => Ok(VersionedRecord {
                record: prepared.merged,
                sequence: prepared.sequence,
                version_tag: prepared.tag,
                deleted: false,
            }),
            Err(AdapterError::ConditionFailed) => {
                Err(self.explain_condition_failure(&prepared.key).await?)
            }
            Err(err) => Err(adapter_err(err)),
        }
    }

    /// Deletes a record according to the entity's delete policy.
    ///
    /// # Errors
    ///
    /// [`EntityError::NotFound`] when no live record holds the key,
    /// [`EntityError::ConcurrencyConflict`] when the sequence moved past
    /// `expected_sequence`.
    pub async fn delete(
        &self,
        key_fields: &Row,
        expected_sequence: Option<u64>,
    ) -> Result<(), EntityError> {
        let key = self.primary_key(key_fields)?;
        debug!(entity = %self.name, partition = %key.partition, policy = ?self.delete_policy, "delete");

        let result = match self.delete_policy {
            DeletePolicy::Hard => {
                let condition = self.write_guard(expected_sequence)?;
                self.backend
                    .delete_row(&self.table, &key, Some(&condition))
                    .await
            }
            DeletePolicy::Soft => {
                let patch = UpdatePatch::new()
                    .set(DELETED_COLUMN, true)
                    .add(SEQUENCE_COLUMN, 1_i64);
                let update = compile_update(&patch, self.dialect)?;
                let condition = self.write_guard(expected_sequence)?;
                self.backend
                    .update(&self.table, &key, &update, Some(&condition))
                    .await
            }
        };
        match result {
            Ok(()) => Ok(()),
            Err(AdapterError::ConditionFailed) => Err(self.explain_condition_failure(&key).await?),
            Err(err) => Err(adapter_err(err)),
        }
    }

    // ---- Reads ----

    /// Reads a record by its key fields.
    ///
    /// # Errors
    ///
    /// Decoding errors from the schema chain; backend failures.
    pub async fn get(&self, key_fields: &Row) -> Result<Option<VersionedRecord>, EntityError> {
        self.get_with(key_fields, ReadOptions::default()).await
    }

    /// Reads a record by its key fields with explicit read options.
    pub async fn get_with(
        &self,
        key_fields: &Row,
        options: ReadOptions,
    ) -> Result<Option<VersionedRecord>, EntityError> {
        let key = self.primary_key(key_fields)?;
        let raw = self
            .backend
            .get(&self.table, &key)
            .await
            .map_err(adapter_err)?;
        match raw {
            None => Ok(None),
            Some(raw) => self.decode_stored(raw, options.include_deleted),
        }
    }

    /// Queries an index by name (the primary index's name included) and
    /// decodes every matching record.
    ///
    /// # Errors
    ///
    /// [`EntityError::UnknownIndex`] for a name the entity does not define.
    pub async fn query(
        &self,
        index: &str,
        condition: &KeyCondition,
    ) -> Result<Vec<VersionedRecord>, EntityError> {
        self.query_with(index, condition, QueryOptions::default(), ReadOptions::default())
            .await
    }

    /// Queries an index with explicit query and read options.
    pub async fn query_with(
        &self,
        index: &str,
        condition: &KeyCondition,
        options: QueryOptions,
        read: ReadOptions,
    ) -> Result<Vec<VersionedRecord>, EntityError> {
        let (definition, index_name) = self.resolve_index(index)?;
        let compiled = compile_key_condition(definition, condition, self.dialect)?;
        let filter = if read.include_deleted {
            None
        } else {
            Some(compile_condition(
                &ConditionCheck::new().eq(DELETED_COLUMN, false),
                self.dialect,
            )?)
        };

        let rows = self
            .backend
            .query(&self.table, index_name, &compiled, filter.as_ref(), options)
            .await
            .map_err(adapter_err)?;
        debug!(entity = %self.name, index, rows = rows.len(), "query");

        let mut records = Vec::with_capacity(rows.len());
        for raw in rows {
            if let Some(record) = self.decode_stored(raw, read.include_deleted)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    // ---- Transactions ----

    /// Builds a transactional insert, with the same guard as [`insert`].
    ///
    /// [`insert`]: Entity::insert
    pub fn transact_insert(&self, record: &Row) -> Result<WriteOp, EntityError> {
        let tag = self.codec.encode(record)?.to_owned();
        let stored = self.build_stored(record, &tag, 1, false)?;
        let guard = compile_condition(
            &ConditionCheck::new().not_exists(&self.table.partition_column),
            self.dialect,
        )?;
        Ok(WriteOp::Put {
            table: self.table.clone(),
            row: stored,
            condition: Some(guard),
        })
    }

    /// Builds a transactional update, with the same pre-read, merge, and
    /// guard as [`update`].
    ///
    /// [`update`]: Entity::update
    pub async fn transact_update(
        &self,
        key_fields: &Row,
        patch: &UpdatePatch,
        expected_sequence: Option<u64>,
    ) -> Result<WriteOp, EntityError> {
        let prepared = self.prepare_update(key_fields, patch, expected_sequence).await?;
        Ok(WriteOp::Update {
            table: self.table.clone(),
            key: prepared.key,
            update: prepared.update,
            condition: Some(prepared.condition),
        })
    }

    /// Builds a transactional delete following the entity's delete policy.
    pub fn transact_delete(
        &self,
        key_fields: &Row,
        expected_sequence: Option<u64>,
    ) -> Result<WriteOp, EntityError> {
        let key = self.primary_key(key_fields)?;
        let condition = self.write_guard(expected_sequence)?;
        match self.delete_policy {
            DeletePolicy::Hard => Ok(WriteOp::Delete {
                table: self.table.clone(),
                key,
                condition: Some(condition),
            }),
            DeletePolicy::Soft => {
                let patch = UpdatePatch::new()
                    .set(DELETED_COLUMN, true)
                    .add(SEQUENCE_COLUMN, 1_i64);
                Ok(WriteOp::Update {
                    table: self.table.clone(),
                    key,
                    update: compile_update(&patch, self.dialect)?,
                    condition: Some(condition),
                })
            }
        }
    }

    // ---- Internals ----

    fn primary_key(&self, record: &Row) -> Result<RowKey, EntityError> {
        let keys = self.primary.derive(record)?;
        Ok(RowKey {
            partition: keys.partition,
            sort: keys.sort,
        })
    }

    fn resolve_index(&self, name: &str) -> Result<(&IndexDefinition, Option<&str>), EntityError> {
        if name == self.primary.name {
            return Ok((&self.primary, None));
        }
        self.secondary
            .iter()
            .find(|index| index.name == name)
            .map(|index| (index, Some(index.name.as_str())))
            .ok_or_else(|| EntityError::UnknownIndex {
                name: name.to_owned(),
            })
    }

    fn is_reserved(&self, column: &str) -> bool {
        column == VERSION_COLUMN
            || column == SEQUENCE_COLUMN
            || column == DELETED_COLUMN
            || self.primary.columns().any(|c| c == column)
            || self
                .secondary
                .iter()
                .any(|index| index.columns().any(|c| c == column))
    }

    /// Assembles the full stored row: entity fields, derived index key
    /// columns, metadata columns.
    fn build_stored(
        &self,
        record: &Row,
        tag: &str,
        sequence: u64,
        deleted: bool,
    ) -> Result<Row, EntityError> {
        let mut stored = record.clone();

        let keys = self.primary.derive(record)?;
        stored.insert(
            self.primary.partition_column.clone(),
            Value::Str(keys.partition),
        );
        if let (Some(column), Some(sort)) = (&self.primary.sort_column, keys.sort) {
            stored.insert(column.clone(), Value::Str(sort));
        }
        for index in &self.secondary {
            match index.derive(record) {
                Ok(keys) => {
                    stored.insert(index.partition_column.clone(), Value::Str(keys.partition));
                    if let (Some(column), Some(sort)) = (&index.sort_column, keys.sort) {
                        stored.insert(column.clone(), Value::Str(sort));
                    }
                }
                // A sparse index: absent dependent fields mean the record is
                // simply not in that index.
                Err(IndexError::MissingField { .. }) => {}
                Err(err) => return Err(err.into()),
            }
        }

        stored.insert(VERSION_COLUMN.to_owned(), Value::Str(tag.to_owned()));
        stored.insert(
            SEQUENCE_COLUMN.to_owned(),
            Value::Num(sequence.to_string()),
        );
        stored.insert(DELETED_COLUMN.to_owned(), Value::Bool(deleted));
        Ok(stored)
    }

    /// Decodes a stored row: metadata extracted, system columns stripped,
    /// schema upgrades applied from the recorded tag.
    fn decode_stored(
        &self,
        raw: Row,
        include_deleted: bool,
    ) -> Result<Option<VersionedRecord>, EntityError> {
        let deleted = raw
            .get(DELETED_COLUMN)
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if deleted && !include_deleted {
            return Ok(None);
        }

        let tag = raw
            .get(VERSION_COLUMN)
            .and_then(Value::as_str)
            .ok_or_else(|| EntityError::Corrupt {
                reason: format!("missing version column '{VERSION_COLUMN}'"),
            })?
            .to_owned();
        let sequence = raw
            .get(SEQUENCE_COLUMN)
            .and_then(Value::as_num)
            .and_then(|n| n.parse::<u64>().ok())
            .ok_or_else(|| EntityError::Corrupt {
                reason: format!("missing or non-numeric sequence column '{SEQUENCE_COLUMN}'"),
            })?;

        let mut fields = raw;
        fields.retain(|column, _| !self.is_reserved(column));
        let record = self.codec.decode(fields, &tag)?;

        Ok(Some(VersionedRecord {
            record,
            sequence,
            version_tag: self.codec.latest_tag().to_owned(),
            deleted,
        }))
    }

    /// The standard guard for updates and deletes: the row exists, is not
    /// soft-deleted, and optionally still holds the expected sequence.
    fn write_guard(
        &self,
        expected_sequence: Option<u64>,
    ) -> Result<CompiledExpression, EntityError> {
        let mut check = ConditionCheck::new()
            .exists(&self.table.partition_column)
            .eq(DELETED_COLUMN, false);
        if let Some(expected) = expected_sequence {
            check = check.eq(SEQUENCE_COLUMN, Value::Num(expected.to_string()));
        }
        Ok(compile_condition(&check, self.dialect)?)
    }

    /// Pre-reads, merges, and compiles everything an update needs.
    async fn prepare_update(
        &self,
        key_fields: &Row,
        patch: &UpdatePatch,
        expected_sequence: Option<u64>,
    ) -> Result<PreparedUpdate, EntityError> {
        for path in patch.touched_paths() {
            if self.is_reserved(path) {
                return Err(EntityError::ReservedColumn {
                    column: path.to_owned(),
                });
            }
        }
        // Fail fast on assigned literals before touching the backend; the
        // merged record is fully validated again below.
        let mut literals = Row::new();
        for action in patch.actions() {
            if let UpdateAction::Set { path, value } = action {
                literals.insert(path.clone(), value.clone());
            }
        }
        self.codec.decode_partial(&literals)?;

        let key = self.primary_key(key_fields)?;
        let raw = self
            .backend
            .get(&self.table, &key)
            .await
            .map_err(adapter_err)?
            .ok_or(EntityError::NotFound)?;
        let current = self
            .decode_stored(raw, true)?
            .ok_or(EntityError::NotFound)?;
        if current.deleted {
            return Err(EntityError::NotFound);
        }
        if let Some(expected) = expected_sequence {
            if current.sequence != expected {
                return Err(EntityError::ConcurrencyConflict);
            }
        }

        let mut merged = current.record.clone();
        apply_update(&mut merged, patch.actions())
            .map_err(|reason| EntityError::Patch { reason })?;
        let tag = self.codec.encode(&merged)?.to_owned();

        if self.primary_key(&merged)? != key {
            return Err(EntityError::PrimaryKeyChanged);
        }

        // Re-derive the key columns of every secondary index the patch
        // touches; an index whose dependent field went absent gets its
        // columns removed (the record leaves that index).
        let mut effective = patch.clone();
        for index in &self.secondary {
            if !index.depends_on_any(patch.touched_paths()) {
                continue;
            }
            match index.derive(&merged) {
                Ok(keys) => {
                    effective = effective.set(index.partition_column.clone(), keys.partition);
                    if let (Some(column), Some(sort)) = (&index.sort_column, keys.sort) {
                        effective = effective.set(column.clone(), sort);
                    }
                }
                Err(IndexError::MissingField { .. }) => {
                    for column in index.columns() {
                        effective = effective.remove(column);
                    }
                }
                Err(err) => return Err(err.into()),
            }
        }
        effective = effective
            .set(VERSION_COLUMN, tag.clone())
            .add(SEQUENCE_COLUMN, 1_i64);

        Ok(PreparedUpdate {
            key,
            update: compile_update(&effective, self.dialect)?,
            condition: self.write_guard(expected_sequence)?,
            merged,
            sequence: current.sequence + 1,
            tag,
        })
    }

    /// Disambiguates a condition failure by re-reading the row: absent or
    /// soft-deleted means the target is gone, anything else means a
    /// concurrent writer moved the sequence.
    async fn explain_condition_failure(&self, key: &RowKey) -> Result<EntityError, EntityError> {
        let raw = self
            .backend
            .get(&self.table, key)
            .await
            .map_err(adapter_err)?;
        let gone = match raw {
            None => true,
            Some(raw) => raw
                .get(DELETED_COLUMN)
                .and_then(Value::as_bool)
                .unwrap_or(false),
        };
        Ok(if gone {
            EntityError::NotFound
        } else {
            EntityError::ConcurrencyConflict
        })
    }
}

struct PreparedUpdate {
    key: RowKey,
    update: CompiledExpression,
    condition: CompiledExpression,
    merged: Row,
    sequence: u64,
    tag: String,
}

// ---------------------------------------------------------------------------
// Transactional execution
// ---------------------------------------------------------------------------

/// Executes a batch of entity write operations atomically. Operations may
/// target multiple entities and tables on the same backend.
///
/// # Errors
///
/// [`EntityError::TransactionAborted`] with the index of the first failing
/// member; nothing is applied in that case.
pub async fn transact_write(
    backend: &dyn BackendAdapter,
    ops: Vec<WriteOp>,
) -> Result<(), EntityError> {
    debug!(items = ops.len(), "transact write");
    backend.transact_write(ops).await.map_err(adapter_err)
}
