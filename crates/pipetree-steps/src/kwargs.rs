//! Typed access to step kwargs
use pipetree_core::{Mapping, Value};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum StepConfigError {
    #[error("CONFIG/MISSING: kwarg '{0}' is required")]
    Missing(String),

    #[error("CONFIG/TYPE: kwarg '{key}' must be {expected}, got {got}")]
    WrongType {
        key: String,
        expected: &'static str,
        got: String,
    },
}

pub fn required<'a>(kwargs: &'a Mapping, key: &str) -> Result<&'a Value, StepConfigError> {
    kwargs
        .get(key)
        .ok_or_else(|| StepConfigError::Missing(key.to_string()))
}

pub fn required_str<'a>(kwargs: &'a Mapping, key: &str) -> Result<&'a str, StepConfigError> {
    let value = required(kwargs, key)?;
    value.as_str().ok_or_else(|| wrong_type(key, "a string", value))
}

pub fn optional_str<'a>(kwargs: &'a Mapping, key: &str) -> Result<Option<&'a str>, StepConfigError> {
    match kwargs.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_str()
            .map(Some)
            .ok_or_else(|| wrong_type(key, "a string", value)),
    }
}

/// A list of strings; a single string is accepted as a one-element list.
pub fn string_list(kwargs: &Mapping, key: &str) -> Result<Vec<String>, StepConfigError> {
    let value = required(kwargs, key)?;
    match value {
        Value::Str(s) => Ok(vec![s.clone()]),
        Value::List(items) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| wrong_type(key, "a list of strings", value))
            })
            .collect(),
        other => Err(wrong_type(key, "a list of strings", other)),
    }
}

fn wrong_type(key: &str, expected: &'static str, got: &Value) -> StepConfigError {
    StepConfigError::WrongType {
        key: key.to_string(),
        expected,
        got: got.type_name().to_string(),
    }
}
