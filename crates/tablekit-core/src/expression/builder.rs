//! Placeholder allocation shared by the three compilers.

use std::collections::HashMap;

use tablekit_model::Value;

use super::{CompiledExpression, Dialect, ExprPlan, ExpressionError};

/// Stateful allocator for attribute name/value placeholders.
///
/// Created fresh per compile call; there is no process-wide counter. The
/// counter increases monotonically across all allocations in one builder, and
/// the same field path used twice gets two independent placeholders, never a
/// shared one. Deduplication would save a few bytes but invites aliasing
/// bugs when one attribute is both read and written in a single expression.
#[derive(Debug)]
pub struct AttributeMapBuilder {
    dialect: Dialect,
    counter: usize,
    names: HashMap<String, String>,
    values: HashMap<String, Value>,
}

impl AttributeMapBuilder {
    /// Creates an empty builder for the given dialect.
    #[must_use]
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            counter: 0,
            names: HashMap::new(),
            values: HashMap::new(),
        }
    }

    fn next(&mut self) -> usize {
        let n = self.counter;
        self.counter += 1;
        n
    }

    /// Renders a field path for the expression text.
    ///
    /// Key-value dialect: allocates a fresh `#nK` placeholder and records the
    /// mapping. Relational dialect: returns the quoted identifier directly
    /// (embedded quotes doubled), with no map entry.
    pub fn name(&mut self, path: &str) -> Result<String, ExpressionError> {
        if path.is_empty() {
            return Err(ExpressionError::EmptyPath);
        }
        match self.dialect {
            Dialect::KeyValue => {
                let placeholder = format!("#n{}", self.next());
                self.names.insert(placeholder.clone(), path.to_owned());
                Ok(placeholder)
            }
            Dialect::Relational => Ok(quote_ident(path)),
        }
    }

    /// Allocates a fresh `:vK` placeholder for a value.
    pub fn value(&mut self, value: Value) -> String {
        let placeholder = format!(":v{}", self.next());
        self.values.insert(placeholder.clone(), value);
        placeholder
    }

    /// Allocates a name/value pair from one counter step: `(#nK, :vK)`.
    pub fn bind(
        &mut self,
        path: &str,
        value: Value,
    ) -> Result<(String, String), ExpressionError> {
        if path.is_empty() {
            return Err(ExpressionError::EmptyPath);
        }
        let n = self.next();
        let name = match self.dialect {
            Dialect::KeyValue => {
                let placeholder = format!("#n{n}");
                self.names.insert(placeholder.clone(), path.to_owned());
                placeholder
            }
            Dialect::Relational => quote_ident(path),
        };
        let value_placeholder = format!(":v{n}");
        self.values.insert(value_placeholder.clone(), value);
        Ok((name, value_placeholder))
    }

    /// Finalizes the builder into a compiled expression.
    #[must_use]
    pub fn finish(self, text: String, plan: ExprPlan) -> CompiledExpression {
        CompiledExpression {
            text,
            names: self.names,
            values: self.values,
            plan,
        }
    }
}

fn quote_ident(path: &str) -> String {
    format!("\"{}\"", path.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_allocate_independent_placeholders_for_same_path() {
        let mut builder = AttributeMapBuilder::new(Dialect::KeyValue);
        let a = builder.name("status").unwrap();
        let b = builder.name("status").unwrap();
        assert_ne!(a, b);

        let compiled = builder.finish(String::new(), ExprPlan::Condition(vec![]));
        assert_eq!(compiled.names.len(), 2);
        assert_eq!(compiled.names.get(&a).map(String::as_str), Some("status"));
        assert_eq!(compiled.names.get(&b).map(String::as_str), Some("status"));
    }

    #[test]
    fn test_should_share_counter_between_names_and_values() {
        let mut builder = AttributeMapBuilder::new(Dialect::KeyValue);
        let n = builder.name("a").unwrap();
        let v = builder.value(Value::from(1_i64));
        assert_eq!(n, "#n0");
        assert_eq!(v, ":v1");
    }

    #[test]
    fn test_should_bind_pair_from_one_counter_step() {
        let mut builder = AttributeMapBuilder::new(Dialect::KeyValue);
        let (n, v) = builder.bind("a", Value::from(1_i64)).unwrap();
        assert_eq!(n, "#n0");
        assert_eq!(v, ":v0");
    }

    #[test]
    fn test_should_quote_relational_identifiers() {
        let mut builder = AttributeMapBuilder::new(Dialect::Relational);
        assert_eq!(builder.name("status").unwrap(), "\"status\"");
        assert_eq!(builder.name("we\"ird").unwrap(), "\"we\"\"ird\"");

        let compiled = builder.finish(String::new(), ExprPlan::Condition(vec![]));
        assert!(compiled.names.is_empty());
    }

    #[test]
    fn test_should_reject_empty_path() {
        let mut builder = AttributeMapBuilder::new(Dialect::KeyValue);
        assert!(matches!(builder.name(""), Err(ExpressionError::EmptyPath)));
    }
}
