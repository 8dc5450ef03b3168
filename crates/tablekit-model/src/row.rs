//! Row type and construction helpers.

use std::collections::HashMap;

use crate::value::Value;

/// An opaque row: a mapping from attribute name to [`Value`].
///
/// This is the unit of exchange with backend adapters. The core never assumes
/// any wire format beyond this mapping.
pub type Row = HashMap<String, Value>;

/// Build a [`Row`] from `name => value` pairs.
///
/// Values are converted with `Into<Value>`, so string and integer literals
/// work directly.
///
/// # Examples
///
/// ```
/// use tablekit_model::{Value, row};
///
/// let r = row! {
///     "name" => "Alice",
///     "age" => 30_i64,
/// };
/// assert_eq!(r.get("name"), Some(&Value::Str("Alice".to_owned())));
/// ```
#[macro_export]
macro_rules! row {
    () => {
        $crate::Row::new()
    };
    ($($name:expr => $value:expr),+ $(,)?) => {{
        let mut r = $crate::Row::new();
        $(
            r.insert(($name).to_owned(), $crate::Value::from($value));
        )+
        r
    }};
}

/// Returns the subset of `row` containing only the given field names.
///
/// Fields absent from the row are absent from the subset.
#[must_use]
pub fn project(row: &Row, fields: &[String]) -> Row {
    fields
        .iter()
        .filter_map(|f| row.get(f).map(|v| (f.clone(), v.clone())))
        .collect()
}
