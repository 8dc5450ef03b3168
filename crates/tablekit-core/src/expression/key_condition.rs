//! Key-condition expression compiler.
//!
//! A key condition targets one compound index: a required partition-key
//! equality plus an optional sort-key predicate. Derived key strings are
//! byte-ordered, so sort predicates compare the joined `#` strings directly.

use tablekit_model::Value;

use crate::index::IndexDefinition;

use super::builder::AttributeMapBuilder;
use super::{CompiledExpression, Dialect, ExprPlan, ExpressionError};

// ---------------------------------------------------------------------------
// Description
// ---------------------------------------------------------------------------

/// A predicate against an index's sort-key column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortPredicate {
    /// Sort key equals the given string.
    Eq(String),
    /// Sort key begins with the given prefix.
    BeginsWith(String),
    /// Sort key is between the two given strings (inclusive).
    Between(String, String),
    /// Sort key is less than the given string.
    Lt(String),
    /// Sort key is less than or equal to the given string.
    Le(String),
    /// Sort key is greater than the given string.
    Gt(String),
    /// Sort key is greater than or equal to the given string.
    Ge(String),
}

/// A key condition: partition-key equality plus an optional sort predicate.
#[derive(Debug, Clone)]
pub struct KeyCondition {
    /// The derived partition key string to match.
    pub partition: String,
    /// The optional sort-key predicate.
    pub sort: Option<SortPredicate>,
}

impl KeyCondition {
    /// Creates a partition-equality condition.
    #[must_use]
    pub fn partition(value: impl Into<String>) -> Self {
        Self {
            partition: value.into(),
            sort: None,
        }
    }

    /// Adds a sort-key predicate.
    #[must_use]
    pub fn with_sort(mut self, predicate: SortPredicate) -> Self {
        self.sort = Some(predicate);
        self
    }
}

/// The resolved form of a compiled key condition: concrete columns and the
/// predicate, for in-process adapters.
#[derive(Debug, Clone)]
pub struct KeyPlan {
    /// Column holding the partition key string.
    pub partition_column: String,
    /// The partition key string to match.
    pub partition: String,
    /// Column holding the sort key string, if any.
    pub sort_column: Option<String>,
    /// The sort predicate, if any.
    pub sort: Option<SortPredicate>,
}

// ---------------------------------------------------------------------------
// Compilation
// ---------------------------------------------------------------------------

/// Compiles a key condition against the given index.
///
/// # Errors
///
/// [`ExpressionError::NoSortComponent`] when a sort predicate targets a
/// partition-only index, [`ExpressionError::InvalidRange`] when a `Between`
/// has `low > high`.
pub fn compile_key_condition(
    index: &IndexDefinition,
    condition: &KeyCondition,
    dialect: Dialect,
) -> Result<CompiledExpression, ExpressionError> {
    if condition.sort.is_some() && !index.has_sort() {
        return Err(ExpressionError::NoSortComponent {
            index: index.name.clone(),
        });
    }
    if let Some(SortPredicate::Between(low, high)) = &condition.sort {
        if low > high {
            return Err(ExpressionError::InvalidRange {
                low: low.clone(),
                high: high.clone(),
            });
        }
    }

    let mut builder = AttributeMapBuilder::new(dialect);
    let (pk_name, pk_value) = builder.bind(
        &index.partition_column,
        Value::Str(condition.partition.clone()),
    )?;
    let mut text = format!("{pk_name} = {pk_value}");

    if let Some(predicate) = &condition.sort {
        // has_sort() was checked above.
        let sort_column = index.sort_column.as_deref().unwrap_or_default();
        text.push_str(" AND ");
        text.push_str(&render_sort(&mut builder, sort_column, predicate, dialect)?);
    }

    let plan = KeyPlan {
        partition_column: index.partition_column.clone(),
        partition: condition.partition.clone(),
        sort_column: index.sort_column.clone(),
        sort: condition.sort.clone(),
    };
    Ok(builder.finish(text, ExprPlan::Key(plan)))
}

fn render_sort(
    builder: &mut AttributeMapBuilder,
    column: &str,
    predicate: &SortPredicate,
    dialect: Dialect,
) -> Result<String, ExpressionError> {
    let rendered = match predicate {
        SortPredicate::Eq(value) => {
            let (name, ph) = builder.bind(column, Value::Str(value.clone()))?;
            format!("{name} = {ph}")
        }
        SortPredicate::BeginsWith(prefix) => match dialect {
            Dialect::KeyValue => {
                let (name, ph) = builder.bind(column, Value::Str(prefix.clone()))?;
                format!("begins_with({name}, {ph})")
            }
            // Relational stores have no begins_with; render the equivalent
            // half-open range using the prefix successor.
            Dialect::Relational => {
                let (name, low_ph) = builder.bind(column, Value::Str(prefix.clone()))?;
                match prefix_successor(prefix) {
                    Some(upper) => {
                        let upper_ph = builder.value(Value::Str(upper));
                        format!("{name} >= {low_ph} AND {name} < {upper_ph}")
                    }
                    None => format!("{name} >= {low_ph}"),
                }
            }
        },
        SortPredicate::Between(low, high) => {
            let (name, low_ph) = builder.bind(column, Value::Str(low.clone()))?;
            let high_ph = builder.value(Value::Str(high.clone()));
            format!("{name} BETWEEN {low_ph} AND {high_ph}")
        }
        SortPredicate::Lt(value) => render_compare(builder, column, "<", value)?,
        SortPredicate::Le(value) => render_compare(builder, column, "<=", value)?,
        SortPredicate::Gt(value) => render_compare(builder, column, ">", value)?,
        SortPredicate::Ge(value) => render_compare(builder, column, ">=", value)?,
    };
    Ok(rendered)
}

fn render_compare(
    builder: &mut AttributeMapBuilder,
    column: &str,
    op: &str,
    value: &str,
) -> Result<String, ExpressionError> {
    let (name, ph) = builder.bind(column, Value::Str(value.to_owned()))?;
    Ok(format!("{name} {op} {ph}"))
}

/// Computes the exclusive upper bound for a prefix scan: the prefix with its
/// last character advanced to the next scalar value, dropping trailing
/// characters that cannot be advanced. UTF-8 preserves scalar-value order
/// byte-wise, so `[prefix, successor)` covers exactly the strings starting
/// with the prefix. Returns `None` if the prefix is empty or every character
/// is `U+10FFFF`.
#[must_use]
pub fn prefix_successor(prefix: &str) -> Option<String> {
    let mut chars: Vec<char> = prefix.chars().collect();
    while let Some(last) = chars.pop() {
        if let Some(next) = scalar_successor(last) {
            chars.push(next);
            return Some(chars.into_iter().collect());
        }
    }
    None
}

fn scalar_successor(c: char) -> Option<char> {
    let mut code = c as u32 + 1;
    // Skip the surrogate gap.
    if code == 0xD800 {
        code = 0xE000;
    }
    char::from_u32(code)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::KeyDerivation;

    fn composite_index() -> IndexDefinition {
        IndexDefinition::new("primary", "pk", KeyDerivation::fields(["id"]))
            .with_sort("sk", KeyDerivation::fields(["kind"]))
    }

    fn partition_only_index() -> IndexDefinition {
        IndexDefinition::new("by-email", "gsi1pk", KeyDerivation::fields(["email"]))
    }

    #[test]
    fn test_should_compile_partition_equality() {
        let condition = KeyCondition::partition("user#1");
        let compiled =
            compile_key_condition(&composite_index(), &condition, Dialect::KeyValue).unwrap();

        assert_eq!(compiled.text, "#n0 = :v0");
        assert_eq!(compiled.names.get("#n0").map(String::as_str), Some("pk"));
        assert_eq!(
            compiled.values.get(":v0"),
            Some(&Value::Str("user#1".to_owned()))
        );
    }

    #[test]
    fn test_should_compile_begins_with_per_dialect() {
        let condition =
            KeyCondition::partition("user#1").with_sort(SortPredicate::BeginsWith("order#".into()));

        let kv = compile_key_condition(&composite_index(), &condition, Dialect::KeyValue).unwrap();
        assert_eq!(kv.text, "#n0 = :v0 AND begins_with(#n1, :v1)");

        let sql =
            compile_key_condition(&composite_index(), &condition, Dialect::Relational).unwrap();
        assert_eq!(
            sql.text,
            "\"pk\" = :v0 AND \"sk\" >= :v1 AND \"sk\" < :v2"
        );
        assert_eq!(
            sql.values.get(":v2"),
            Some(&Value::Str("order$".to_owned()))
        );
    }

    #[test]
    fn test_should_compile_between_and_comparisons() {
        let condition = KeyCondition::partition("p")
            .with_sort(SortPredicate::Between("2026-01".into(), "2026-06".into()));
        let compiled =
            compile_key_condition(&composite_index(), &condition, Dialect::KeyValue).unwrap();
        assert_eq!(compiled.text, "#n0 = :v0 AND #n1 BETWEEN :v1 AND :v2");

        let condition = KeyCondition::partition("p").with_sort(SortPredicate::Ge("2026".into()));
        let compiled =
            compile_key_condition(&composite_index(), &condition, Dialect::KeyValue).unwrap();
        assert_eq!(compiled.text, "#n0 = :v0 AND #n1 >= :v1");
    }

    #[test]
    fn test_should_fail_between_with_inverted_range() {
        let condition = KeyCondition::partition("p")
            .with_sort(SortPredicate::Between("2026-06".into(), "2026-01".into()));
        let result = compile_key_condition(&composite_index(), &condition, Dialect::KeyValue);
        assert!(matches!(result, Err(ExpressionError::InvalidRange { .. })));
    }

    #[test]
    fn test_should_fail_sort_predicate_on_partition_only_index() {
        let condition = KeyCondition::partition("p").with_sort(SortPredicate::Eq("x".into()));
        let result = compile_key_condition(&partition_only_index(), &condition, Dialect::KeyValue);
        assert!(matches!(
            result,
            Err(ExpressionError::NoSortComponent { ref index }) if index == "by-email"
        ));
    }

    #[test]
    fn test_should_compute_prefix_successor() {
        assert_eq!(prefix_successor("order#"), Some("order$".to_owned()));
        assert_eq!(prefix_successor("a"), Some("b".to_owned()));
        assert_eq!(prefix_successor(""), None);
    }

    #[test]
    fn test_should_keep_successor_tight_for_non_ascii_prefixes() {
        // The bound is the next scalar value, not a byte increment: anything
        // looser admits sort keys outside the prefix range.
        assert_eq!(prefix_successor("¿"), Some("À".to_owned()));
        assert!("¿x" < "À");
        assert!("Āz" > "À");

        // Characters that cannot be advanced carry into the previous one.
        assert_eq!(prefix_successor("a\u{10FFFF}"), Some("b".to_owned()));
        assert_eq!(prefix_successor("\u{10FFFF}"), None);
    }
}
