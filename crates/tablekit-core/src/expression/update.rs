//! Update expression compiler.
//!
//! Accepts a structured set of per-field operations and renders a single
//! `SET ...` clause (plus `REMOVE ...` in the key-value dialect). Arithmetic
//! and list concatenation read and write the same attribute, which is exactly
//! the case the non-deduplicating placeholder allocator exists for.

use tablekit_model::{Row, Value};

use super::builder::AttributeMapBuilder;
use super::{CompiledExpression, Dialect, ExprPlan, ExpressionError};

// ---------------------------------------------------------------------------
// Patch description
// ---------------------------------------------------------------------------

/// A single update operation on one field.
#[derive(Debug, Clone)]
pub enum UpdateAction {
    /// Assign a literal value.
    Set {
        /// Target field path.
        path: String,
        /// Value to assign.
        value: Value,
    },
    /// Numeric increment inside SET: `path = path + delta`.
    Add {
        /// Target field path.
        path: String,
        /// Delta to add (a number value; negative deltas subtract).
        delta: Value,
    },
    /// List concatenation: `path = list_append(path, items)`.
    Append {
        /// Target field path.
        path: String,
        /// Items appended after the existing list.
        items: Vec<Value>,
    },
    /// List concatenation the other way: `path = list_append(items, path)`.
    Prepend {
        /// Target field path.
        path: String,
        /// Items prepended before the existing list.
        items: Vec<Value>,
    },
    /// Remove the attribute.
    Remove {
        /// Target field path.
        path: String,
    },
}

impl UpdateAction {
    /// The field path this action touches.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Set { path, .. }
            | Self::Add { path, .. }
            | Self::Append { path, .. }
            | Self::Prepend { path, .. }
            | Self::Remove { path } => path,
        }
    }
}

/// An ordered set of update operations, built fluently.
#[derive(Debug, Clone, Default)]
pub struct UpdatePatch {
    ops: Vec<UpdateAction>,
}

impl UpdatePatch {
    /// Creates an empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns a literal value.
    #[must_use]
    pub fn set(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ops.push(UpdateAction::Set {
            path: path.into(),
            value: value.into(),
        });
        self
    }

    /// Adds a numeric delta to the current value.
    #[must_use]
    pub fn add(mut self, path: impl Into<String>, delta: impl Into<Value>) -> Self {
        self.ops.push(UpdateAction::Add {
            path: path.into(),
            delta: delta.into(),
        });
        self
    }

    /// Appends items to the end of a list.
    #[must_use]
    pub fn append(mut self, path: impl Into<String>, items: Vec<Value>) -> Self {
        self.ops.push(UpdateAction::Append {
            path: path.into(),
            items,
        });
        self
    }

    /// Prepends items to the front of a list.
    #[must_use]
    pub fn prepend(mut self, path: impl Into<String>, items: Vec<Value>) -> Self {
        self.ops.push(UpdateAction::Prepend {
            path: path.into(),
            items,
        });
        self
    }

    /// Removes an attribute.
    #[must_use]
    pub fn remove(mut self, path: impl Into<String>) -> Self {
        self.ops.push(UpdateAction::Remove { path: path.into() });
        self
    }

    /// Returns `true` if the patch has no operations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// The operations in order.
    #[must_use]
    pub fn actions(&self) -> &[UpdateAction] {
        &self.ops
    }

    /// The field paths touched by this patch.
    pub fn touched_paths(&self) -> impl Iterator<Item = &str> {
        self.ops.iter().map(UpdateAction::path)
    }
}

// ---------------------------------------------------------------------------
// Compilation
// ---------------------------------------------------------------------------

/// Compiles an update patch into a `SET`/`REMOVE` expression.
///
/// # Errors
///
/// [`ExpressionError::EmptyUpdate`] for a patch with no operations,
/// [`ExpressionError::EmptyPath`] for an operation with an empty path.
pub fn compile_update(
    patch: &UpdatePatch,
    dialect: Dialect,
) -> Result<CompiledExpression, ExpressionError> {
    if patch.is_empty() {
        return Err(ExpressionError::EmptyUpdate);
    }

    let mut builder = AttributeMapBuilder::new(dialect);
    let mut assignments: Vec<String> = Vec::new();
    let mut removes: Vec<String> = Vec::new();

    for action in &patch.ops {
        match action {
            UpdateAction::Set { path, value } => {
                let (name, value_ph) = builder.bind(path, value.clone())?;
                assignments.push(format!("{name} = {value_ph}"));
            }
            UpdateAction::Add { path, delta } => {
                // Written and read names are allocated independently.
                let (write, delta_ph) = builder.bind(path, delta.clone())?;
                let read = builder.name(path)?;
                assignments.push(format!("{write} = {read} + {delta_ph}"));
            }
            UpdateAction::Append { path, items } => {
                let (write, items_ph) = builder.bind(path, Value::List(items.clone()))?;
                let read = builder.name(path)?;
                assignments.push(format!("{write} = list_append({read}, {items_ph})"));
            }
            UpdateAction::Prepend { path, items } => {
                let (write, items_ph) = builder.bind(path, Value::List(items.clone()))?;
                let read = builder.name(path)?;
                assignments.push(format!("{write} = list_append({items_ph}, {read})"));
            }
            UpdateAction::Remove { path } => {
                let name = builder.name(path)?;
                match dialect {
                    // The relational dialect has no REMOVE clause; a removed
                    // column is set to NULL.
                    Dialect::Relational => assignments.push(format!("{name} = NULL")),
                    Dialect::KeyValue => removes.push(name),
                }
            }
        }
    }

    let mut text = String::new();
    if !assignments.is_empty() {
        text.push_str("SET ");
        text.push_str(&assignments.join(", "));
    }
    if !removes.is_empty() {
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str("REMOVE ");
        text.push_str(&removes.join(", "));
    }

    Ok(builder.finish(text, ExprPlan::Update(patch.ops.clone())))
}

// ---------------------------------------------------------------------------
// In-process application
// ---------------------------------------------------------------------------

/// Applies update actions to a row in place. This is what an in-process
/// adapter executes instead of parsing the expression text.
///
/// # Errors
///
/// Returns a message when an action's operand kinds do not match the stored
/// value (e.g., `Add` against a non-number).
pub fn apply_update(row: &mut Row, actions: &[UpdateAction]) -> Result<(), String> {
    for action in actions {
        match action {
            UpdateAction::Set { path, value } => {
                row.insert(path.clone(), value.clone());
            }
            UpdateAction::Add { path, delta } => {
                let delta = delta
                    .as_num()
                    .ok_or_else(|| format!("add delta for '{path}' is not a number"))?;
                let current = match row.get(path) {
                    None => "0",
                    Some(value) => value
                        .as_num()
                        .ok_or_else(|| format!("field '{path}' is not a number"))?,
                };
                let sum = add_numbers(current, delta)
                    .ok_or_else(|| format!("add on '{path}' has non-numeric operands"))?;
                row.insert(path.clone(), sum);
            }
            UpdateAction::Append { path, items } => {
                let mut list = take_list(row, path)?;
                list.extend(items.iter().cloned());
                row.insert(path.clone(), Value::List(list));
            }
            UpdateAction::Prepend { path, items } => {
                let list = take_list(row, path)?;
                let mut combined = items.clone();
                combined.extend(list);
                row.insert(path.clone(), Value::List(combined));
            }
            UpdateAction::Remove { path } => {
                row.remove(path);
            }
        }
    }
    Ok(())
}

fn take_list(row: &mut Row, path: &str) -> Result<Vec<Value>, String> {
    match row.remove(path) {
        None => Ok(Vec::new()),
        Some(Value::List(list)) => Ok(list),
        Some(other) => Err(format!(
            "field '{path}' is not a list (got {})",
            other.type_descriptor()
        )),
    }
}

/// Adds two string-encoded numbers. Integer operands stay in integer
/// arithmetic, so values beyond f64's exact range (large sequence counters
/// included) keep full precision; f64 is the fallback for fractional
/// operands.
fn add_numbers(current: &str, delta: &str) -> Option<Value> {
    if let (Ok(a), Ok(b)) = (current.parse::<i128>(), delta.parse::<i128>()) {
        return Some(Value::Num(a.checked_add(b)?.to_string()));
    }
    let a: f64 = current.parse().ok()?;
    let b: f64 = delta.parse().ok()?;
    Some(render_number(a + b))
}

/// Renders an f64 back into a string-encoded number, preferring the integer
/// form when exact.
fn render_number(n: f64) -> Value {
    #[allow(clippy::cast_possible_truncation)]
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        Value::Num((n as i64).to_string())
    } else {
        Value::Num(n.to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
