//! In-memory reference backend.
//!
//! Rows live in a two-level map: partition key → ordered map of sort key →
//! row. Sort keys order byte-wise, which is what makes range and prefix
//! predicates over derived `#`-joined key strings meaningful. Expressions are
//! applied through their resolved plans rather than by parsing the text.
//!
//! Concurrency: single-item operations hold a shared lock and serialize per
//! partition through the map's entry guards; a transactional batch holds the
//! exclusive lock, so it observes and produces a consistent snapshot.

use std::collections::{BTreeMap, HashSet};
use std::ops::Bound;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::debug;

use tablekit_model::{Row, Value};

use crate::adapter::{
    AdapterError, BackendAdapter, BackendError, QueryOptions, RowKey, TableRef, WriteOp,
};
use crate::expression::key_condition::prefix_successor;
use crate::expression::{
    CompiledExpression, ConditionTerm, ExprPlan, KeyPlan, SortPredicate, UpdateAction,
    apply_update, eval_condition,
};

/// Sort-key sentinel for tables without a sort column.
const NO_SORT: &str = "";

type Partitions = DashMap<String, BTreeMap<String, Row>>;

/// The in-process reference backend.
///
/// Tables are created implicitly on first write.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    tables: DashMap<String, Partitions>,
    txn_gate: RwLock<()>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read_row(&self, table: &TableRef, key: &RowKey) -> Option<Row> {
        let partitions = self.tables.get(&table.name)?;
        let partition = partitions.get(&key.partition)?;
        partition.get(sort_string(key)).cloned()
    }

    fn store(&self, table: &TableRef, key: &RowKey, row: Row) {
        let partitions = self.tables.entry(table.name.clone()).or_default();
        let mut partition = partitions.entry(key.partition.clone()).or_default();
        partition.insert(sort_string(key).to_owned(), row);
    }

    fn erase(&self, table: &TableRef, key: &RowKey) {
        if let Some(partitions) = self.tables.get(&table.name) {
            if let Some(mut partition) = partitions.get_mut(&key.partition) {
                partition.remove(sort_string(key));
            }
        }
    }
}

#[async_trait]
impl BackendAdapter for MemoryBackend {
    async fn get(&self, table: &TableRef, key: &RowKey) -> Result<Option<Row>, AdapterError> {
        let _gate = self.txn_gate.read();
        Ok(self.read_row(table, key))
    }

    async fn put(
        &self,
        table: &TableRef,
        row: Row,
        condition: Option<&CompiledExpression>,
    ) -> Result<(), AdapterError> {
        let key = extract_key(table, &row)?;
        let terms = condition.map(condition_terms).transpose()?;

        let _gate = self.txn_gate.read();
        let partitions = self.tables.entry(table.name.clone()).or_default();
        let mut partition = partitions.entry(key.partition.clone()).or_default();
        let sort = sort_string(&key).to_owned();

        if let Some(terms) = terms {
            if !eval_condition(terms, partition.get(&sort)) {
                return Err(AdapterError::ConditionFailed);
            }
        }
        debug!(table = %table, partition = %key.partition, sort = %sort, "put row");
        partition.insert(sort, row);
        Ok(())
    }

    async fn update(
        &self,
        table: &TableRef,
        key: &RowKey,
        update: &CompiledExpression,
        condition: Option<&CompiledExpression>,
    ) -> Result<(), AdapterError> {
        let actions = update_actions(update)?;
        let terms = condition.map(condition_terms).transpose()?;

        let _gate = self.txn_gate.read();
        let partitions = self.tables.entry(table.name.clone()).or_default();
        let mut partition = partitions.entry(key.partition.clone()).or_default();
        let sort = sort_string(key).to_owned();

        let existing = partition.get(&sort);
        if let Some(terms) = terms {
            if !eval_condition(terms, existing) {
                return Err(AdapterError::ConditionFailed);
            }
        }
        // Unconditioned update against an absent row upserts.
        let mut row = existing.cloned().unwrap_or_else(|| seed_row(table, key));
        apply_update(&mut row, actions).map_err(BackendError::new)?;
        debug!(table = %table, partition = %key.partition, sort = %sort, "updated row");
        partition.insert(sort, row);
        Ok(())
    }

    async fn delete_row(
        &self,
        table: &TableRef,
        key: &RowKey,
        condition: Option<&CompiledExpression>,
    ) -> Result<(), AdapterError> {
        let terms = condition.map(condition_terms).transpose()?;

        let _gate = self.txn_gate.read();
        let partitions = self.tables.entry(table.name.clone()).or_default();
        let mut partition = partitions.entry(key.partition.clone()).or_default();
        let sort = sort_string(key).to_owned();

        if let Some(terms) = terms {
            if !eval_condition(terms, partition.get(&sort)) {
                return Err(AdapterError::ConditionFailed);
            }
        }
        debug!(table = %table, partition = %key.partition, sort = %sort, "deleted row");
        partition.remove(&sort);
        Ok(())
    }

    async fn query(
        &self,
        table: &TableRef,
        _index: Option<&str>,
        key_condition: &CompiledExpression,
        filter: Option<&CompiledExpression>,
        options: QueryOptions,
    ) -> Result<Vec<Row>, AdapterError> {
        // The target index is resolved from the plan's columns, so the index
        // name is not consulted here.
        let plan = key_plan(key_condition)?;
        let filter_terms = filter.map(condition_terms).transpose()?;

        let _gate = self.txn_gate.read();
        let Some(partitions) = self.tables.get(&table.name) else {
            return Ok(Vec::new());
        };

        let mut rows = if plan.partition_column == table.partition_column {
            match partitions.get(&plan.partition) {
                None => Vec::new(),
                Some(partition) => collect_range(&partition, plan.sort.as_ref()),
            }
        } else {
            collect_by_columns(&partitions, plan)
        };

        if let Some(terms) = filter_terms {
            rows.retain(|row| eval_condition(terms, Some(row)));
        }
        if !options.scan_forward {
            rows.reverse();
        }
        if let Some(limit) = options.limit {
            rows.truncate(limit);
        }
        debug!(table = %table, partition = %plan.partition, rows = rows.len(), "query");
        Ok(rows)
    }

    async fn transact_write(&self, ops: Vec<WriteOp>) -> Result<(), AdapterError> {
        let _gate = self.txn_gate.write();

        // Every precondition is checked against the pre-batch state, and the
        // resulting rows are staged before anything is stored. Two operations
        // on the same row in one batch are rejected.
        let mut seen: HashSet<(String, RowKey)> = HashSet::new();
        let mut staged: Vec<(TableRef, RowKey, Option<Row>)> = Vec::with_capacity(ops.len());

        for (index, op) in ops.iter().enumerate() {
            let (table, key, condition) = match op {
                WriteOp::Put {
                    table,
                    row,
                    condition,
                } => (table, extract_key(table, row)?, condition.as_ref()),
                WriteOp::Update {
                    table,
                    key,
                    condition,
                    ..
                }
                | WriteOp::Delete {
                    table,
                    key,
                    condition,
                } => (table, key.clone(), condition.as_ref()),
            };
            if !seen.insert((table.name.clone(), key.clone())) {
                return Err(
                    BackendError::new("transactional batch addresses the same row twice").into(),
                );
            }

            let existing = self.read_row(table, &key);
            if let Some(condition) = condition {
                if !eval_condition(condition_terms(condition)?, existing.as_ref()) {
                    debug!(index, "transactional batch aborted");
                    return Err(AdapterError::Aborted { index });
                }
            }

            let after = match op {
                WriteOp::Put { row, .. } => Some(row.clone()),
                WriteOp::Update { update, .. } => {
                    let mut row = existing.unwrap_or_else(|| seed_row(table, &key));
                    apply_update(&mut row, update_actions(update)?).map_err(BackendError::new)?;
                    Some(row)
                }
                WriteOp::Delete { .. } => None,
            };
            staged.push((table.clone(), key, after));
        }

        debug!(items = staged.len(), "transactional batch committed");
        for (table, key, after) in staged {
            match after {
                Some(row) => self.store(&table, &key, row),
                None => self.erase(&table, &key),
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn sort_string(key: &RowKey) -> &str {
    key.sort.as_deref().unwrap_or(NO_SORT)
}

fn seed_row(table: &TableRef, key: &RowKey) -> Row {
    let mut row = Row::new();
    row.insert(
        table.partition_column.clone(),
        Value::Str(key.partition.clone()),
    );
    if let (Some(column), Some(sort)) = (&table.sort_column, &key.sort) {
        row.insert(column.clone(), Value::Str(sort.clone()));
    }
    row
}

fn extract_key(table: &TableRef, row: &Row) -> Result<RowKey, AdapterError> {
    let partition = key_column(row, &table.partition_column)?;
    let sort = table
        .sort_column
        .as_deref()
        .map(|column| key_column(row, column))
        .transpose()?;
    Ok(RowKey { partition, sort })
}

fn key_column(row: &Row, column: &str) -> Result<String, AdapterError> {
    row.get(column)
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
        .ok_or_else(|| BackendError::new(format!("row is missing key column '{column}'")).into())
}

fn condition_terms(expr: &CompiledExpression) -> Result<&[ConditionTerm], AdapterError> {
    match &expr.plan {
        ExprPlan::Condition(terms) => Ok(terms),
        _ => Err(BackendError::new("expression does not carry a condition plan").into()),
    }
}

fn update_actions(expr: &CompiledExpression) -> Result<&[UpdateAction], AdapterError> {
    match &expr.plan {
        ExprPlan::Update(actions) => Ok(actions),
        _ => Err(BackendError::new("expression does not carry an update plan").into()),
    }
}

fn key_plan(expr: &CompiledExpression) -> Result<&KeyPlan, AdapterError> {
    match &expr.plan {
        ExprPlan::Key(plan) => Ok(plan),
        _ => Err(BackendError::new("expression does not carry a key plan").into()),
    }
}

/// Collects a sort-key range from one partition, ascending.
fn collect_range(partition: &BTreeMap<String, Row>, predicate: Option<&SortPredicate>) -> Vec<Row> {
    use Bound::{Excluded, Included, Unbounded};

    let bounds: (Bound<String>, Bound<String>) = match predicate {
        None => (Unbounded, Unbounded),
        Some(SortPredicate::Eq(value)) => (Included(value.clone()), Included(value.clone())),
        Some(SortPredicate::BeginsWith(prefix)) => {
            // The successor bound narrows the scan; membership is still
            // decided by the prefix itself.
            let upper = prefix_successor(prefix).map_or(Unbounded, Excluded);
            return partition
                .range((Included(prefix.clone()), upper))
                .filter(|(sort, _)| sort.starts_with(prefix.as_str()))
                .map(|(_, row)| row.clone())
                .collect();
        }
        Some(SortPredicate::Between(low, high)) => (Included(low.clone()), Included(high.clone())),
        Some(SortPredicate::Lt(value)) => (Unbounded, Excluded(value.clone())),
        Some(SortPredicate::Le(value)) => (Unbounded, Included(value.clone())),
        Some(SortPredicate::Gt(value)) => (Excluded(value.clone()), Unbounded),
        Some(SortPredicate::Ge(value)) => (Included(value.clone()), Unbounded),
    };
    partition.range(bounds).map(|(_, row)| row.clone()).collect()
}

/// Collects rows across all partitions whose index columns match the plan,
/// ordered by the index's sort key string.
fn collect_by_columns(partitions: &Partitions, plan: &KeyPlan) -> Vec<Row> {
    let mut matched: Vec<(String, Row)> = Vec::new();
    for partition in partitions.iter() {
        for row in partition.value().values() {
            let partition_value = row.get(&plan.partition_column).and_then(Value::as_str);
            if partition_value != Some(plan.partition.as_str()) {
                continue;
            }
            let sort_value = plan
                .sort_column
                .as_deref()
                .and_then(|column| row.get(column))
                .and_then(Value::as_str)
                .unwrap_or(NO_SORT);
            if let Some(predicate) = &plan.sort {
                if !sort_matches(predicate, sort_value) {
                    continue;
                }
            }
            matched.push((sort_value.to_owned(), row.clone()));
        }
    }
    matched.sort_by(|a, b| a.0.cmp(&b.0));
    matched.into_iter().map(|(_, row)| row).collect()
}

fn sort_matches(predicate: &SortPredicate, value: &str) -> bool {
    match predicate {
        SortPredicate::Eq(expected) => value == expected,
        SortPredicate::BeginsWith(prefix) => value.starts_with(prefix.as_str()),
        SortPredicate::Between(low, high) => value >= low.as_str() && value <= high.as_str(),
        SortPredicate::Lt(bound) => value < bound.as_str(),
        SortPredicate::Le(bound) => value <= bound.as_str(),
        SortPredicate::Gt(bound) => value > bound.as_str(),
        SortPredicate::Ge(bound) => value >= bound.as_str(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
