//! Expression compilers.
//!
//! Three sibling compilers (update, condition, key-condition) share the
//! [`AttributeMapBuilder`] placeholder allocator and produce a
//! [`CompiledExpression`]: backend-safe parameterized expression text plus
//! attribute name/value maps. Structured descriptions in, parameterized text
//! out; field paths and values never land in the text itself, which closes
//! off injection and placeholder collisions.
//!
//! Each compiled expression also carries a resolved [`ExprPlan`] so an
//! in-process adapter can apply it without re-parsing the text; remote
//! adapters ship the text and maps.

pub mod builder;
pub mod condition;
pub mod key_condition;
pub mod update;

use std::collections::HashMap;

use thiserror::Error;

use tablekit_model::Value;

pub use builder::AttributeMapBuilder;
pub use condition::{ConditionCheck, ConditionTerm, compile_condition, eval_condition};
pub use key_condition::{KeyCondition, KeyPlan, SortPredicate, compile_key_condition};
pub use update::{UpdateAction, UpdatePatch, apply_update, compile_update};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from expression compilation. No partial expression is ever
/// returned alongside one of these.
#[derive(Debug, Error)]
pub enum ExpressionError {
    /// An operation referenced an empty field path.
    #[error("operation references an empty field path")]
    EmptyPath,
    /// The update description contains no operations.
    #[error("update contains no operations")]
    EmptyUpdate,
    /// The condition description contains no terms.
    #[error("condition contains no terms")]
    EmptyCondition,
    /// A `between` predicate with `low > high`.
    #[error("invalid between range: low '{low}' > high '{high}'")]
    InvalidRange {
        /// The lower bound given.
        low: String,
        /// The upper bound given.
        high: String,
    },
    /// A sort-key predicate was supplied for a partition-only index.
    #[error("index '{index}' has no sort component")]
    NoSortComponent {
        /// The target index name.
        index: String,
    },
}

// ---------------------------------------------------------------------------
// Dialect
// ---------------------------------------------------------------------------

/// The backend family an expression is rendered for.
///
/// The key-value dialect emits `#nK` name placeholders resolved through the
/// attribute name map. The relational dialect emits quoted column
/// identifiers directly (quotes in identifiers are doubled), and only values
/// stay parameterized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    /// Key-value store with partition/sort keys.
    #[default]
    KeyValue,
    /// Relational store with equivalent derived columns.
    Relational,
}

// ---------------------------------------------------------------------------
// Compiled output
// ---------------------------------------------------------------------------

/// A resolved, structured form of a compiled expression.
///
/// Placeholders are already substituted with concrete paths and values, so
/// in-process adapters can apply the expression directly.
#[derive(Debug, Clone)]
pub enum ExprPlan {
    /// An AND-conjunction of condition terms.
    Condition(Vec<ConditionTerm>),
    /// An ordered list of update actions.
    Update(Vec<UpdateAction>),
    /// A key predicate against one index.
    Key(KeyPlan),
}

/// The output of one compilation call.
///
/// Every placeholder appearing in `text` has exactly one entry in the
/// corresponding map; placeholders are unique within one result and come
/// from a counter scoped to that compilation, so two compiled expressions
/// may only be merged after re-prefixing via [`with_namespace`].
///
/// [`with_namespace`]: CompiledExpression::with_namespace
#[derive(Debug, Clone)]
pub struct CompiledExpression {
    /// The parameterized expression text.
    pub text: String,
    /// Placeholder → real field path.
    pub names: HashMap<String, String>,
    /// Placeholder → encoded value.
    pub values: HashMap<String, Value>,
    /// Resolved structural form for in-process application.
    pub plan: ExprPlan,
}

impl CompiledExpression {
    /// Re-prefixes every placeholder with `ns`, making this expression safe
    /// to merge with another compiled expression into a single backend call.
    ///
    /// `#n3` becomes `#{ns}n3` and `:v3` becomes `:{ns}v3`; text and maps
    /// are rewritten together.
    #[must_use]
    pub fn with_namespace(self, ns: &str) -> Self {
        let mut text = self.text;

        // Longest placeholders first so ":v1" never clobbers ":v10".
        let mut keys: Vec<&String> = self.names.keys().chain(self.values.keys()).collect();
        keys.sort_by_key(|k| std::cmp::Reverse(k.len()));
        for key in keys {
            let renamed = namespaced(key, ns);
            text = text.replace(key.as_str(), &renamed);
        }

        let names = self
            .names
            .into_iter()
            .map(|(k, v)| (namespaced(&k, ns), v))
            .collect();
        let values = self
            .values
            .into_iter()
            .map(|(k, v)| (namespaced(&k, ns), v))
            .collect();

        Self {
            text,
            names,
            values,
            plan: self.plan,
        }
    }
}

fn namespaced(placeholder: &str, ns: &str) -> String {
    let (sigil, rest) = placeholder.split_at(1);
    format!("{sigil}{ns}{rest}")
}
