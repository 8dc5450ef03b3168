//! Schema evolution engine.
//!
//! A record's shape changes over time while old and new rows stay mutually
//! decodable. The chain of versions is an ordered list of
//! `(tag, shape, upgrade)` tuples built once at startup: encoding always
//! writes the newest version, decoding left-folds the upgrade steps from the
//! recorded tag forward ("read-time migration"). Unknown or corrupted tags
//! are a hard decode error, never silently coerced.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use tablekit_model::{Row, Value};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from schema construction, encoding, and decoding.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Decode encountered a version tag absent from the chain.
    #[error("unknown schema version tag: {tag}")]
    UnknownVersion {
        /// The tag recorded on the stored row.
        tag: String,
    },
    /// An upgrade step rejected an otherwise well-formed prior-version record.
    #[error("upgrade to version {tag} failed: {reason}")]
    Upgrade {
        /// The version the failing step upgrades to.
        tag: String,
        /// Why the step rejected the record.
        reason: String,
        /// The record the step was given.
        record: Row,
    },
    /// A required field is absent.
    #[error("missing required field: {field}")]
    MissingField {
        /// The missing field name.
        field: String,
    },
    /// A field is not part of the schema.
    #[error("field not in schema: {field}")]
    UnknownField {
        /// The offending field name.
        field: String,
    },
    /// A field value has the wrong kind.
    #[error("field '{field}' has wrong kind: expected {expected}, got {actual}")]
    WrongKind {
        /// The field name.
        field: String,
        /// The kind the shape declares.
        expected: &'static str,
        /// The kind the value actually has.
        actual: &'static str,
    },
    /// Two versions in one chain share a tag.
    #[error("duplicate schema version tag: {tag}")]
    DuplicateVersion {
        /// The repeated tag.
        tag: String,
    },
}

// ---------------------------------------------------------------------------
// Shape
// ---------------------------------------------------------------------------

/// The kind of a field value, mirroring the [`Value`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// String field.
    Str,
    /// Number field.
    Num,
    /// Binary field.
    Bin,
    /// Boolean field.
    Bool,
    /// List field.
    List,
    /// Nested map field.
    Map,
}

impl FieldKind {
    /// Returns the kind descriptor string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Str => "S",
            Self::Num => "N",
            Self::Bin => "B",
            Self::Bool => "BOOL",
            Self::List => "L",
            Self::Map => "M",
        }
    }

    fn matches(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (Self::Str, Value::Str(_))
                | (Self::Num, Value::Num(_))
                | (Self::Bin, Value::Bin(_))
                | (Self::Bool, Value::Bool(_))
                | (Self::List, Value::List(_))
                | (Self::Map, Value::Map(_))
        )
    }
}

/// A single field declaration.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// The declared kind.
    pub kind: FieldKind,
    /// Whether the field must be present on every record.
    pub required: bool,
}

/// The structural shape of one schema version: a set of named, typed fields.
#[derive(Debug, Clone, Default)]
pub struct Shape {
    fields: BTreeMap<String, FieldSpec>,
}

impl Shape {
    /// Creates an empty shape.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a required field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.insert(
            name.into(),
            FieldSpec {
                kind,
                required: true,
            },
        );
        self
    }

    /// Declares an optional field.
    #[must_use]
    pub fn optional(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.insert(
            name.into(),
            FieldSpec {
                kind,
                required: false,
            },
        );
        self
    }

    /// Removes a field declaration, for evolutions that drop a field.
    #[must_use]
    pub fn without(mut self, name: &str) -> Self {
        self.fields.remove(name);
        self
    }

    /// Returns `true` if the shape declares the field.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Returns the declared field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Validates a full record: required fields present, kinds match,
    /// unknown fields rejected. `Null` is accepted for optional fields.
    pub fn validate(&self, row: &Row) -> Result<(), SchemaError> {
        for (name, spec) in &self.fields {
            match row.get(name) {
                Some(value) => self.check_kind(name, *spec, value)?,
                None if spec.required => {
                    return Err(SchemaError::MissingField {
                        field: name.clone(),
                    });
                }
                None => {}
            }
        }
        self.reject_unknown(row)
    }

    /// Validates only the fields present, for partial-update payloads.
    pub fn validate_partial(&self, row: &Row) -> Result<(), SchemaError> {
        for (name, value) in row {
            match self.fields.get(name) {
                Some(spec) => self.check_kind(name, *spec, value)?,
                None => {
                    return Err(SchemaError::UnknownField {
                        field: name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn check_kind(&self, name: &str, spec: FieldSpec, value: &Value) -> Result<(), SchemaError> {
        if value.is_null() && !spec.required {
            return Ok(());
        }
        if spec.kind.matches(value) {
            Ok(())
        } else {
            Err(SchemaError::WrongKind {
                field: name.to_owned(),
                expected: spec.kind.as_str(),
                actual: value.type_descriptor(),
            })
        }
    }

    fn reject_unknown(&self, row: &Row) -> Result<(), SchemaError> {
        for name in row.keys() {
            if !self.fields.contains_key(name) {
                return Err(SchemaError::UnknownField {
                    field: name.clone(),
                });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Version chain
// ---------------------------------------------------------------------------

/// An upgrade step from the previous version's decoded record to this
/// version's record. Must be total over every valid prior-version record;
/// a returned `Err` surfaces as [`SchemaError::Upgrade`].
pub type UpgradeFn = Arc<dyn Fn(&Row) -> Result<Row, String> + Send + Sync>;

struct VersionStep {
    tag: String,
    shape: Shape,
    /// `None` only for the base version.
    upgrade: Option<UpgradeFn>,
}

impl fmt::Debug for VersionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionStep")
            .field("tag", &self.tag)
            .field("shape", &self.shape)
            .finish_non_exhaustive()
    }
}

/// Builder for a schema version chain. Construction is append-only: versions
/// form a strictly ordered chain with unique tags and no cycles.
#[derive(Debug)]
pub struct SchemaBuilder {
    steps: Vec<VersionStep>,
}

impl SchemaBuilder {
    /// Starts a chain at its base version.
    #[must_use]
    pub fn make(tag: impl Into<String>, shape: Shape) -> Self {
        Self {
            steps: vec![VersionStep {
                tag: tag.into(),
                shape,
                upgrade: None,
            }],
        }
    }

    /// Appends a version with an explicitly given shape.
    #[must_use]
    pub fn evolve(
        mut self,
        tag: impl Into<String>,
        shape: Shape,
        upgrade: impl Fn(&Row) -> Result<Row, String> + Send + Sync + 'static,
    ) -> Self {
        self.steps.push(VersionStep {
            tag: tag.into(),
            shape,
            upgrade: Some(Arc::new(upgrade)),
        });
        self
    }

    /// Appends a version whose shape is derived from the previous one, for
    /// additive changes.
    #[must_use]
    pub fn evolve_extend(
        self,
        tag: impl Into<String>,
        extend: impl FnOnce(Shape) -> Shape,
        upgrade: impl Fn(&Row) -> Result<Row, String> + Send + Sync + 'static,
    ) -> Self {
        let prev = self
            .steps
            .last()
            .map(|s| s.shape.clone())
            .unwrap_or_default();
        self.evolve(tag, extend(prev), upgrade)
    }

    /// Finalizes the chain into a codec.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::DuplicateVersion`] if two versions share a tag.
    pub fn build(self) -> Result<SchemaCodec, SchemaError> {
        let mut seen = std::collections::HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.tag.as_str()) {
                return Err(SchemaError::DuplicateVersion {
                    tag: step.tag.clone(),
                });
            }
        }
        Ok(SchemaCodec { steps: self.steps })
    }
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

/// Unified decoder/encoder for the latest shape of a version chain.
#[derive(Debug)]
pub struct SchemaCodec {
    steps: Vec<VersionStep>,
}

impl SchemaCodec {
    /// The tag every encode stamps onto the record.
    #[must_use]
    pub fn latest_tag(&self) -> &str {
        // make() guarantees at least one step.
        &self.steps[self.steps.len() - 1].tag
    }

    /// The shape of the latest version.
    #[must_use]
    pub fn latest_shape(&self) -> &Shape {
        &self.steps[self.steps.len() - 1].shape
    }

    /// Validates a latest-shape record for writing, returning the tag it
    /// must be stored under.
    pub fn encode(&self, record: &Row) -> Result<&str, SchemaError> {
        self.latest_shape().validate(record)?;
        Ok(self.latest_tag())
    }

    /// Decodes a stored row recorded under `recorded_tag`, applying every
    /// upgrade step from that version to the latest exactly once, in chain
    /// order, and validating the result against the latest shape.
    pub fn decode(&self, raw: Row, recorded_tag: &str) -> Result<Row, SchemaError> {
        let position = self
            .steps
            .iter()
            .position(|s| s.tag == recorded_tag)
            .ok_or_else(|| SchemaError::UnknownVersion {
                tag: recorded_tag.to_owned(),
            })?;

        let mut record = raw;
        for step in &self.steps[position + 1..] {
            // Steps after the base always carry an upgrade fn.
            let Some(upgrade) = &step.upgrade else {
                continue;
            };
            record = upgrade(&record).map_err(|reason| SchemaError::Upgrade {
                tag: step.tag.clone(),
                reason,
                record: record.clone(),
            })?;
        }

        self.latest_shape().validate(&record)?;
        Ok(record)
    }

    /// Permissive validation for partial-update payloads: only the fields
    /// present are checked against the latest shape.
    pub fn decode_partial(&self, partial: &Row) -> Result<(), SchemaError> {
        self.latest_shape().validate_partial(partial)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
