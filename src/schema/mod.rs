//! Strict validation of worker output.
//!
//! Workers return untyped JSON. Nothing reaches the aggregator until it has
//! been checked here. Validation never coerces: a missing key, a wrong
//! primitive type or an out-of-range value is an error carrying the field
//! path.

pub mod facts;
pub mod scores;

pub use facts::validate;
pub use scores::validate_scores;

use crate::error::ValidationError;
use serde_json::{Map, Value};

/// A JSON value together with its path from the document root.
#[derive(Debug, Clone)]
pub(crate) struct Node<'a> {
    value: &'a Value,
    path: String,
}

impl<'a> Node<'a> {
    pub(crate) fn root(value: &'a Value) -> Self {
        Self {
            value,
            path: String::new(),
        }
    }

    pub(crate) fn path(&self) -> &str {
        &self.path
    }

    pub(crate) fn error(&self, message: impl Into<String>) -> ValidationError {
        ValidationError::new(self.path.clone(), message)
    }

    fn type_error(&self, expected: &str) -> ValidationError {
        self.error(format!("expected {}, got {}", expected, kind_of(self.value)))
    }

    pub(crate) fn object(&self) -> Result<&'a Map<String, Value>, ValidationError> {
        self.value.as_object().ok_or_else(|| self.type_error("an object"))
    }

    /// A required key of this object.
    pub(crate) fn field(&self, key: &str) -> Result<Node<'a>, ValidationError> {
        let object = self.object()?;
        let path = self.child_path(key);

        match object.get(key) {
            Some(value) => Ok(Node { value, path }),
            None => Err(ValidationError::new(path, "required field is missing")),
        }
    }

    /// Every entry of this object, in key order.
    pub(crate) fn entries(&self) -> Result<Vec<(&'a str, Node<'a>)>, ValidationError> {
        let object = self.object()?;
        Ok(object
            .iter()
            .map(|(key, value)| {
                (
                    key.as_str(),
                    Node {
                        value,
                        path: self.child_path(key),
                    },
                )
            })
            .collect())
    }

    pub(crate) fn str(&self) -> Result<&'a str, ValidationError> {
        self.value.as_str().ok_or_else(|| self.type_error("a string"))
    }

    pub(crate) fn bool(&self) -> Result<bool, ValidationError> {
        self.value.as_bool().ok_or_else(|| self.type_error("a boolean"))
    }

    /// A non-negative integer count.
    pub(crate) fn count(&self) -> Result<u64, ValidationError> {
        if let Some(n) = self.value.as_u64() {
            return Ok(n);
        }
        match self.value.as_i64() {
            Some(n) => Err(self.error(format!("must be non-negative, got {}", n))),
            None => Err(self.type_error("a non-negative integer")),
        }
    }

    pub(crate) fn array(&self) -> Result<Vec<Node<'a>>, ValidationError> {
        let items = self.value.as_array().ok_or_else(|| self.type_error("an array"))?;
        Ok(items
            .iter()
            .enumerate()
            .map(|(i, value)| Node {
                value,
                path: format!("{}[{}]", self.path, i),
            })
            .collect())
    }

    pub(crate) fn strings(&self) -> Result<Vec<String>, ValidationError> {
        self.array()?
            .iter()
            .map(|item| item.str().map(str::to_string))
            .collect()
    }

    fn child_path(&self, key: &str) -> String {
        if self.path.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", self.path, key)
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(n) if n.is_f64() => "a float",
        Value::Number(n) if n.is_i64() && n.as_i64().is_some_and(|v| v < 0) => {
            "a negative integer"
        }
        Value::Number(_) => "an integer",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_paths_are_tracked() {
        let doc = json!({"a": {"b": [1, "x"]}});
        let root = Node::root(&doc);
        let items = root.field("a").unwrap().field("b").unwrap().array().unwrap();

        assert_eq!(items[0].count().unwrap(), 1);
        let err = items[1].count().unwrap_err();
        assert_eq!(err.path, "a.b[1]");
        assert!(err.message.contains("got a string"));
    }

    #[test]
    fn test_missing_field_reports_full_path() {
        let doc = json!({"a": {}});
        let err = Node::root(&doc).field("a").unwrap().field("c").unwrap_err();
        assert_eq!(err.path, "a.c");
        assert_eq!(err.message, "required field is missing");
    }

    #[test]
    fn test_counts_reject_negative_and_float() {
        let doc = json!({"neg": -3, "float": 2.5, "null": null});
        let root = Node::root(&doc);

        let err = root.field("neg").unwrap().count().unwrap_err();
        assert!(err.message.contains("non-negative"));
        assert!(root.field("float").unwrap().count().is_err());
        assert!(root.field("null").unwrap().count().is_err());
    }
}
