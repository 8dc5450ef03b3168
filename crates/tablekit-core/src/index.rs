//! Index-key derivation.
//!
//! An index key is derived from a subset of entity fields: an ordered list of
//! primitive segments joined with `#` into the stored key string. Derivations
//! must be deterministic pure functions of their dependent fields only, so
//! re-derivation after an update reproduces the same key unless a dependent
//! field changed. Purity is enforced by construction: the derive fn only ever
//! sees the dependent-field subset of the record.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::trace;

use tablekit_model::{Row, Value, row::project};

/// Separator joining derived key segments.
pub const KEY_SEPARATOR: char = '#';

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from index-key derivation.
#[derive(Debug, Error)]
pub enum IndexError {
    /// A dependent field is absent from the record.
    ///
    /// For secondary indexes the entity layer treats this as "omit the
    /// index's key columns", not as a failure; for the primary index it is
    /// always a hard error.
    #[error("index '{index}' depends on absent field '{field}'")]
    MissingField {
        /// The index name.
        index: String,
        /// The absent field.
        field: String,
    },
    /// The derive fn itself failed over present fields.
    #[error("index '{index}' derivation failed: {reason}")]
    Derivation {
        /// The index name.
        index: String,
        /// Why the derive fn rejected its input.
        reason: String,
    },
    /// The derive fn produced no segments.
    #[error("index '{index}' derivation produced no segments")]
    EmptySegments {
        /// The index name.
        index: String,
    },
}

// ---------------------------------------------------------------------------
// Segments
// ---------------------------------------------------------------------------

/// A primitive segment of a derived key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySegment {
    /// String segment.
    Str(String),
    /// Number segment (string-encoded).
    Num(String),
    /// Boolean segment.
    Bool(bool),
}

impl KeySegment {
    /// Converts a scalar [`Value`] into a segment. Composite values have no
    /// key representation.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Str(s) => Some(Self::Str(s.clone())),
            Value::Num(n) => Some(Self::Num(n.clone())),
            Value::Bool(b) => Some(Self::Bool(*b)),
            _ => None,
        }
    }
}

impl fmt::Display for KeySegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Num(n) => f.write_str(n),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for KeySegment {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<String> for KeySegment {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for KeySegment {
    fn from(n: i64) -> Self {
        Self::Num(n.to_string())
    }
}

// ---------------------------------------------------------------------------
// Derivations
// ---------------------------------------------------------------------------

type DeriveFn = Arc<dyn Fn(&Row) -> Result<Vec<KeySegment>, String> + Send + Sync>;

/// A pure mapping from a set of dependent fields to ordered key segments.
#[derive(Clone)]
pub struct KeyDerivation {
    dependent_fields: Vec<String>,
    derive: DeriveFn,
}

impl fmt::Debug for KeyDerivation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyDerivation")
            .field("dependent_fields", &self.dependent_fields)
            .finish_non_exhaustive()
    }
}

impl KeyDerivation {
    /// Creates a derivation with an explicit derive fn. The fn receives only
    /// the dependent-field subset of the record.
    pub fn new<S: Into<String>>(
        dependent_fields: impl IntoIterator<Item = S>,
        derive: impl Fn(&Row) -> Result<Vec<KeySegment>, String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            dependent_fields: dependent_fields.into_iter().map(Into::into).collect(),
            derive: Arc::new(derive),
        }
    }

    /// Creates the common derivation that takes each dependent field's scalar
    /// value as one segment, in declaration order.
    pub fn fields<S: Into<String>>(dependent_fields: impl IntoIterator<Item = S>) -> Self {
        let names: Vec<String> = dependent_fields.into_iter().map(Into::into).collect();
        let ordered = names.clone();
        Self {
            dependent_fields: names,
            derive: Arc::new(move |subset: &Row| {
                ordered
                    .iter()
                    .map(|name| {
                        let value = subset
                            .get(name)
                            .ok_or_else(|| format!("field '{name}' absent from subset"))?;
                        KeySegment::from_value(value)
                            .ok_or_else(|| format!("field '{name}' is not a scalar"))
                    })
                    .collect()
            }),
        }
    }

    /// The fields this derivation depends on.
    #[must_use]
    pub fn dependent_fields(&self) -> &[String] {
        &self.dependent_fields
    }

    fn derive(&self, index: &str, record: &Row) -> Result<String, IndexError> {
        for field in &self.dependent_fields {
            if !record.contains_key(field) {
                return Err(IndexError::MissingField {
                    index: index.to_owned(),
                    field: field.clone(),
                });
            }
        }

        let subset = project(record, &self.dependent_fields);
        let segments = (self.derive)(&subset).map_err(|reason| IndexError::Derivation {
            index: index.to_owned(),
            reason,
        })?;

        if segments.is_empty() {
            return Err(IndexError::EmptySegments {
                index: index.to_owned(),
            });
        }

        let mut out = String::new();
        for (i, segment) in segments.iter().enumerate() {
            if i > 0 {
                out.push(KEY_SEPARATOR);
            }
            out.push_str(&segment.to_string());
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Index definitions
// ---------------------------------------------------------------------------

/// A named index: a partition derivation, an optional sort derivation, and
/// the columns the derived key strings are stored in.
#[derive(Debug, Clone)]
pub struct IndexDefinition {
    /// The index name (e.g., `"primary"`, `"by-email"`).
    pub name: String,
    /// Column holding the derived partition key string.
    pub partition_column: String,
    /// Column holding the derived sort key string, if the index has a sort
    /// component.
    pub sort_column: Option<String>,
    partition: KeyDerivation,
    sort: Option<KeyDerivation>,
}

/// The derived key strings for one index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedKeys {
    /// The derived partition key string.
    pub partition: String,
    /// The derived sort key string, if the index has a sort component.
    pub sort: Option<String>,
}

impl IndexDefinition {
    /// Creates a partition-only index.
    pub fn new(
        name: impl Into<String>,
        partition_column: impl Into<String>,
        partition: KeyDerivation,
    ) -> Self {
        Self {
            name: name.into(),
            partition_column: partition_column.into(),
            sort_column: None,
            partition,
            sort: None,
        }
    }

    /// Adds a sort component.
    #[must_use]
    pub fn with_sort(mut self, sort_column: impl Into<String>, sort: KeyDerivation) -> Self {
        self.sort_column = Some(sort_column.into());
        self.sort = Some(sort);
        self
    }

    /// Returns `true` if the index has a sort component.
    #[must_use]
    pub fn has_sort(&self) -> bool {
        self.sort.is_some()
    }

    /// All fields the index depends on, partition first.
    pub fn dependent_fields(&self) -> impl Iterator<Item = &str> {
        self.partition
            .dependent_fields()
            .iter()
            .chain(self.sort.iter().flat_map(|s| s.dependent_fields().iter()))
            .map(String::as_str)
    }

    /// Returns `true` if any dependent field of this index is in `fields`.
    pub fn depends_on_any<'a>(&self, mut fields: impl Iterator<Item = &'a str>) -> bool {
        fields.any(|f| self.dependent_fields().any(|d| d == f))
    }

    /// Derives the key strings for a record.
    ///
    /// # Errors
    ///
    /// [`IndexError::MissingField`] if any dependent field is absent,
    /// [`IndexError::Derivation`] if the derive fn fails over present fields.
    pub fn derive(&self, record: &Row) -> Result<DerivedKeys, IndexError> {
        let partition = self.partition.derive(&self.name, record)?;
        let sort = self
            .sort
            .as_ref()
            .map(|s| s.derive(&self.name, record))
            .transpose()?;
        trace!(index = %self.name, %partition, sort = ?sort, "derived index keys");
        Ok(DerivedKeys { partition, sort })
    }

    /// The columns this index stores keys in, partition first.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.partition_column.as_str()).chain(self.sort_column.as_deref())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tablekit_model::row;

    fn order_index() -> IndexDefinition {
        IndexDefinition::new(
            "primary",
            "pk",
            KeyDerivation::new(["customer_id"], |subset| {
                let id = subset
                    .get("customer_id")
                    .and_then(Value::as_str)
                    .ok_or("customer_id must be a string")?;
                Ok(vec!["customer".into(), id.into()])
            }),
        )
        .with_sort("sk", KeyDerivation::fields(["order_date", "order_id"]))
    }

    #[test]
    fn test_should_join_segments_with_separator() {
        let index = order_index();
        let record = row! {
            "customer_id" => "c42",
            "order_date" => "2026-01-15",
            "order_id" => "o7",
            "note" => "unrelated",
        };

        let keys = index.derive(&record).unwrap();
        assert_eq!(keys.partition, "customer#c42");
        assert_eq!(keys.sort.as_deref(), Some("2026-01-15#o7"));
    }

    #[test]
    fn test_should_derive_deterministically_regardless_of_other_fields() {
        let index = order_index();
        let a = row! {
            "customer_id" => "c42",
            "order_date" => "2026-01-15",
            "order_id" => "o7",
            "note" => "first",
        };
        let b = row! {
            "customer_id" => "c42",
            "order_date" => "2026-01-15",
            "order_id" => "o7",
            "note" => "second",
            "extra" => 99_i64,
        };

        assert_eq!(index.derive(&a).unwrap(), index.derive(&b).unwrap());
    }

    #[test]
    fn test_should_fail_on_absent_dependent_field() {
        let index = order_index();
        let record = row! { "customer_id" => "c42", "order_date" => "2026-01-15" };

        let result = index.derive(&record);
        assert!(matches!(
            result,
            Err(IndexError::MissingField { ref field, .. }) if field == "order_id"
        ));
    }

    #[test]
    fn test_should_fail_when_derive_fn_rejects_present_fields() {
        let index = IndexDefinition::new(
            "by-score",
            "gsi1pk",
            KeyDerivation::new(["score"], |_| Err("negative score".to_owned())),
        );
        let record = row! { "score" => -1_i64 };

        let result = index.derive(&record);
        assert!(matches!(
            result,
            Err(IndexError::Derivation { ref reason, .. }) if reason == "negative score"
        ));
    }

    #[test]
    fn test_should_fail_on_empty_segments() {
        let index = IndexDefinition::new("empty", "pk", KeyDerivation::new(["a"], |_| Ok(vec![])));
        let result = index.derive(&row! { "a" => "x" });
        assert!(matches!(result, Err(IndexError::EmptySegments { .. })));
    }

    #[test]
    fn test_should_detect_dependent_field_overlap() {
        let index = order_index();
        assert!(index.depends_on_any(["order_date"].into_iter()));
        assert!(!index.depends_on_any(["note"].into_iter()));
    }

    #[test]
    fn test_should_render_non_string_segments() {
        let index = IndexDefinition::new(
            "by-flag",
            "gsi1pk",
            KeyDerivation::fields(["active", "rank"]),
        );
        let record = row! { "active" => true, "rank" => 3_i64 };
        let keys = index.derive(&record).unwrap();
        assert_eq!(keys.partition, "true#3");
    }
}
