//! Condition expression compiler.
//!
//! Conditions are an AND-conjunction of terms: field equality against an
//! expected literal, plus existence checks. They serve as write-conditions
//! (optimistic concurrency, existence assertions) and as query filters.

use tablekit_model::{Row, Value};

use super::builder::AttributeMapBuilder;
use super::{CompiledExpression, Dialect, ExprPlan, ExpressionError};

// ---------------------------------------------------------------------------
// Description
// ---------------------------------------------------------------------------

/// One conjunct of a condition.
#[derive(Debug, Clone)]
pub enum ConditionTerm {
    /// The field equals the expected literal.
    Eq {
        /// Field path.
        path: String,
        /// Expected value.
        value: Value,
    },
    /// The field is present.
    Exists {
        /// Field path.
        path: String,
    },
    /// The field is absent.
    NotExists {
        /// Field path.
        path: String,
    },
}

/// An ordered AND-conjunction of condition terms.
#[derive(Debug, Clone, Default)]
pub struct ConditionCheck {
    terms: Vec<ConditionTerm>,
}

impl ConditionCheck {
    /// Creates an empty condition.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a condition from a flat map of field → expected literal.
    pub fn from_equals<S: Into<String>>(pairs: impl IntoIterator<Item = (S, Value)>) -> Self {
        let mut check = Self::new();
        for (path, value) in pairs {
            check = check.eq(path, value);
        }
        check
    }

    /// Adds an equality term.
    #[must_use]
    pub fn eq(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.terms.push(ConditionTerm::Eq {
            path: path.into(),
            value: value.into(),
        });
        self
    }

    /// Adds an existence term.
    #[must_use]
    pub fn exists(mut self, path: impl Into<String>) -> Self {
        self.terms.push(ConditionTerm::Exists { path: path.into() });
        self
    }

    /// Adds a non-existence term.
    #[must_use]
    pub fn not_exists(mut self, path: impl Into<String>) -> Self {
        self.terms.push(ConditionTerm::NotExists { path: path.into() });
        self
    }

    /// Returns `true` if the condition has no terms.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// The terms in order.
    #[must_use]
    pub fn terms(&self) -> &[ConditionTerm] {
        &self.terms
    }
}

// ---------------------------------------------------------------------------
// Compilation
// ---------------------------------------------------------------------------

/// Compiles a condition into an AND-joined predicate.
///
/// # Errors
///
/// [`ExpressionError::EmptyCondition`] for a condition with no terms,
/// [`ExpressionError::EmptyPath`] for a term with an empty path.
pub fn compile_condition(
    check: &ConditionCheck,
    dialect: Dialect,
) -> Result<CompiledExpression, ExpressionError> {
    if check.is_empty() {
        return Err(ExpressionError::EmptyCondition);
    }

    let mut builder = AttributeMapBuilder::new(dialect);
    let mut clauses: Vec<String> = Vec::new();

    for term in &check.terms {
        match term {
            ConditionTerm::Eq { path, value } => {
                let (name, value_ph) = builder.bind(path, value.clone())?;
                clauses.push(format!("{name} = {value_ph}"));
            }
            ConditionTerm::Exists { path } => {
                let name = builder.name(path)?;
                clauses.push(match dialect {
                    Dialect::KeyValue => format!("attribute_exists({name})"),
                    Dialect::Relational => format!("{name} IS NOT NULL"),
                });
            }
            ConditionTerm::NotExists { path } => {
                let name = builder.name(path)?;
                clauses.push(match dialect {
                    Dialect::KeyValue => format!("attribute_not_exists({name})"),
                    Dialect::Relational => format!("{name} IS NULL"),
                });
            }
        }
    }

    let text = clauses.join(" AND ");
    Ok(builder.finish(text, ExprPlan::Condition(check.terms.clone())))
}

// ---------------------------------------------------------------------------
// In-process evaluation
// ---------------------------------------------------------------------------

/// Evaluates condition terms against a stored row (`None` when the item is
/// absent). This is what an in-process adapter executes instead of parsing
/// the expression text.
#[must_use]
pub fn eval_condition(terms: &[ConditionTerm], row: Option<&Row>) -> bool {
    terms.iter().all(|term| match term {
        ConditionTerm::Eq { path, value } => {
            row.and_then(|r| r.get(path)).is_some_and(|v| v == value)
        }
        ConditionTerm::Exists { path } => row.is_some_and(|r| r.contains_key(path)),
        ConditionTerm::NotExists { path } => !row.is_some_and(|r| r.contains_key(path)),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
