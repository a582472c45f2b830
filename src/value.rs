//! Runtime values.
//!
//! Values are plain owned data: assignment copies, and lists/maps are deep
//! cloned whenever a history snapshot is taken, so no binding ever aliases
//! another.

use std::cmp::Ordering;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::RuntimeErrorKind;

type ValueResult<T> = Result<T, RuntimeErrorKind>;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Boolean(value) => *value,
            Value::Number(value) => *value != 0.0,
            Value::String(value) => !value.is_empty(),
            Value::List(values) => !values.is_empty(),
            Value::Map(entries) => !entries.is_empty(),
        }
    }

    pub fn as_number(&self, operation: &str) -> ValueResult<f64> {
        match self {
            Value::Number(value) => Ok(*value),
            other => Err(RuntimeErrorKind::InvalidArgumentType {
                operation: operation.to_string(),
                expected: "number".to_string(),
                got: other.type_name().to_string(),
            }),
        }
    }

    /// Text shown by `print` and `str()`: strings render without quotes.
    pub fn to_output(&self) -> String {
        match self {
            Value::String(value) => value.clone(),
            other => other.repr(),
        }
    }

    /// Source-like rendering used inside containers.
    pub fn repr(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Boolean(value) => value.to_string(),
            Value::Number(value) => format_number(*value),
            Value::String(value) => format!("\"{}\"", escape_string(value)),
            Value::List(values) => {
                let rendered = values.iter().map(Value::repr).collect::<Vec<_>>();
                format!("[{}]", rendered.join(", "))
            }
            Value::Map(entries) => {
                let rendered = entries
                    .iter()
                    .map(|(key, value)| format!("\"{}\": {}", escape_string(key), value.repr()))
                    .collect::<Vec<_>>();
                format!("{{{}}}", rendered.join(", "))
            }
        }
    }

    pub fn add(&self, rhs: &Value) -> ValueResult<Value> {
        match (self, rhs) {
            (Value::Number(left), Value::Number(right)) => Ok(Value::Number(left + right)),
            (Value::String(left), Value::String(right)) => Ok(Value::String(format!("{left}{right}"))),
            (Value::List(left), Value::List(right)) => {
                let mut values = left.clone();
                values.extend(right.iter().cloned());
                Ok(Value::List(values))
            }
            _ => Err(unsupported("+", self, rhs)),
        }
    }

    pub fn sub(&self, rhs: &Value) -> ValueResult<Value> {
        self.numeric("-", rhs, |left, right| Ok(left - right))
    }

    pub fn mul(&self, rhs: &Value) -> ValueResult<Value> {
        self.numeric("*", rhs, |left, right| Ok(left * right))
    }

    pub fn div(&self, rhs: &Value) -> ValueResult<Value> {
        self.numeric("/", rhs, |left, right| {
            if right == 0.0 {
                return Err(RuntimeErrorKind::DivisionByZero);
            }
            Ok(left / right)
        })
    }

    pub fn rem(&self, rhs: &Value) -> ValueResult<Value> {
        self.numeric("%", rhs, |left, right| {
            if right == 0.0 {
                return Err(RuntimeErrorKind::DivisionByZero);
            }
            // Result takes the sign of the divisor, like floor division.
            Ok(((left % right) + right) % right)
        })
    }

    pub fn negate(&self) -> ValueResult<Value> {
        match self {
            Value::Number(value) => Ok(Value::Number(-value)),
            other => Err(RuntimeErrorKind::InvalidArgumentType {
                operation: "-".to_string(),
                expected: "number".to_string(),
                got: other.type_name().to_string(),
            }),
        }
    }

    /// Ordering for `<`, `<=`, `>`, `>=`; only numbers and strings compare.
    pub fn compare(&self, operation: &str, rhs: &Value) -> ValueResult<Ordering> {
        let ordering = match (self, rhs) {
            (Value::Number(left), Value::Number(right)) => left.partial_cmp(right),
            (Value::String(left), Value::String(right)) => Some(left.cmp(right)),
            _ => None,
        };
        ordering.ok_or_else(|| unsupported(operation, self, rhs))
    }

    pub fn len(&self) -> ValueResult<usize> {
        match self {
            Value::String(value) => Ok(value.chars().count()),
            Value::List(values) => Ok(values.len()),
            Value::Map(entries) => Ok(entries.len()),
            other => Err(RuntimeErrorKind::InvalidArgumentType {
                operation: "len".to_string(),
                expected: "list, string or map".to_string(),
                got: other.type_name().to_string(),
            }),
        }
    }

    pub fn get_item(&self, index: &Value) -> ValueResult<Value> {
        match self {
            Value::List(values) => {
                let position = list_position(index, values.len())?;
                Ok(values[position].clone())
            }
            Value::String(value) => {
                let chars = value.chars().collect::<Vec<_>>();
                let position = list_position(index, chars.len())?;
                Ok(Value::String(chars[position].to_string()))
            }
            Value::Map(entries) => {
                let key = map_key(index)?;
                entries
                    .get(key)
                    .cloned()
                    .ok_or_else(|| RuntimeErrorKind::MissingKey {
                        key: key.to_string(),
                    })
            }
            other => Err(RuntimeErrorKind::NotIndexable {
                type_name: other.type_name().to_string(),
            }),
        }
    }

    pub fn set_item(&mut self, index: &Value, value: Value) -> ValueResult<()> {
        match self {
            Value::List(values) => {
                let position = list_position(index, values.len())?;
                values[position] = value;
                Ok(())
            }
            Value::Map(entries) => {
                let key = map_key(index)?;
                entries.insert(key.to_string(), value);
                Ok(())
            }
            other => Err(RuntimeErrorKind::NotIndexable {
                type_name: other.type_name().to_string(),
            }),
        }
    }

    /// Items visited by `for x in value`: list items, characters, or map keys.
    pub fn iteration_items(&self) -> ValueResult<Vec<Value>> {
        match self {
            Value::List(values) => Ok(values.clone()),
            Value::String(value) => Ok(value
                .chars()
                .map(|c| Value::String(c.to_string()))
                .collect()),
            Value::Map(entries) => Ok(entries.keys().cloned().map(Value::String).collect()),
            other => Err(RuntimeErrorKind::NotIterable {
                type_name: other.type_name().to_string(),
            }),
        }
    }

    fn numeric(
        &self,
        operation: &str,
        rhs: &Value,
        op: impl FnOnce(f64, f64) -> ValueResult<f64>,
    ) -> ValueResult<Value> {
        match (self, rhs) {
            (Value::Number(left), Value::Number(right)) => Ok(Value::Number(op(*left, *right)?)),
            _ => Err(unsupported(operation, self, rhs)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_output())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Value::List(values)
    }
}

/// Whole numbers print without a fractional part.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

pub fn escape_string(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\t' => escaped.push_str("\\t"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Resolves a list index; negative indexes count from the end.
pub(crate) fn list_position(index: &Value, len: usize) -> ValueResult<usize> {
    let Value::Number(raw) = index else {
        return Err(RuntimeErrorKind::InvalidIndex {
            got: index.type_name().to_string(),
        });
    };
    if raw.fract() != 0.0 {
        return Err(RuntimeErrorKind::InvalidIndex {
            got: format_number(*raw),
        });
    }
    let raw = *raw as i64;
    let resolved = if raw < 0 { raw + len as i64 } else { raw };
    if resolved < 0 || resolved as usize >= len {
        return Err(RuntimeErrorKind::IndexOutOfBounds { index: raw, len });
    }
    Ok(resolved as usize)
}

fn map_key(index: &Value) -> ValueResult<&str> {
    match index {
        Value::String(key) => Ok(key),
        other => Err(RuntimeErrorKind::InvalidArgumentType {
            operation: "map key".to_string(),
            expected: "string".to_string(),
            got: other.type_name().to_string(),
        }),
    }
}

fn unsupported(operation: &str, left: &Value, right: &Value) -> RuntimeErrorKind {
    RuntimeErrorKind::UnsupportedOperands {
        operation: operation.to_string(),
        left: left.type_name().to_string(),
        right: right.type_name().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_numbers_print_without_fraction() {
        assert_eq!(Value::Number(3.0).to_output(), "3");
        assert_eq!(Value::Number(2.5).to_output(), "2.5");
        assert_eq!(Value::Number(-4.0).to_output(), "-4");
    }

    #[test]
    fn containers_render_nested_values() {
        let mut entries = IndexMap::new();
        entries.insert("name".to_string(), Value::from("bot"));
        entries.insert("path".to_string(), Value::List(vec![1.0.into(), true.into()]));
        assert_eq!(
            Value::Map(entries).to_output(),
            "{\"name\": \"bot\", \"path\": [1, true]}"
        );
    }

    #[test]
    fn mixing_strings_and_numbers_is_a_type_error() {
        let error = Value::from("a").add(&Value::Number(1.0)).expect_err("type error");
        assert!(matches!(error, RuntimeErrorKind::UnsupportedOperands { .. }));
    }

    #[test]
    fn division_by_zero_is_reported() {
        assert_eq!(
            Value::Number(1.0).div(&Value::Number(0.0)),
            Err(RuntimeErrorKind::DivisionByZero)
        );
        assert_eq!(
            Value::Number(1.0).rem(&Value::Number(0.0)),
            Err(RuntimeErrorKind::DivisionByZero)
        );
    }

    #[test]
    fn modulo_follows_divisor_sign() {
        assert_eq!(Value::Number(-1.0).rem(&Value::Number(3.0)), Ok(Value::Number(2.0)));
    }

    #[test]
    fn negative_indexes_count_from_end() {
        let list = Value::List(vec![1.0.into(), 2.0.into(), 3.0.into()]);
        assert_eq!(list.get_item(&Value::Number(-1.0)), Ok(Value::Number(3.0)));
        assert!(matches!(
            list.get_item(&Value::Number(3.0)),
            Err(RuntimeErrorKind::IndexOutOfBounds { index: 3, len: 3 })
        ));
    }

    #[test]
    fn clones_do_not_alias() {
        let original = Value::List(vec![1.0.into()]);
        let mut copy = original.clone();
        copy.set_item(&Value::Number(0.0), Value::Number(9.0))
            .expect("set item");
        assert_eq!(original, Value::List(vec![1.0.into()]));
    }

    #[test]
    fn serializes_as_plain_json() {
        let value = Value::List(vec![Value::Null, 1.5.into(), "x".into()]);
        assert_eq!(
            serde_json::to_string(&value).expect("serialize"),
            "[null,1.5,\"x\"]"
        );
    }
}
