//! Figure documents: validation and append merging.
//!
//! A figure is an opaque JSON object owned by the chart renderer. The core
//! checks only that it is well-formed and never looks at trace or layout
//! vocabulary.
//!
//! # Append merge
//!
//! | existing          | incoming          | result                                   |
//! |-------------------|-------------------|------------------------------------------|
//! | object            | object            | keys merged recursively, new keys added  |
//! | scalar array      | scalar array      | concatenated (series points)             |
//! | container array   | container array   | merged element-wise, lengths must match  |
//! | scalar            | scalar, same kind | incoming wins                            |
//! | anything else     |                   | `IncompatibleAppend`                     |
//!
//! Empty arrays and `null` are compatible with anything of their class.

use serde::Serialize;
use serde_json::Value;

use crate::error::StoreError;

/// Maximum nesting depth accepted in a figure document.
pub const MAX_DEPTH: usize = 64;

/// A structurally valid figure document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FigureSpec(Value);

impl FigureSpec {
    /// Validate `value` and wrap it.
    pub fn from_value(value: Value) -> Result<Self, StoreError> {
        if !value.is_object() {
            return Err(StoreError::InvalidPayload(format!(
                "figure must be a JSON object, got {}",
                kind(&value)
            )));
        }
        if exceeds_depth(&value, 0) {
            return Err(StoreError::InvalidPayload(format!(
                "figure nests deeper than {MAX_DEPTH} levels"
            )));
        }
        Ok(Self(value))
    }

    /// Parse a figure from JSON text (the `json_data` wire field).
    pub fn from_json_str(text: &str) -> Result<Self, StoreError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| StoreError::InvalidPayload(format!("figure is not valid JSON: {e}")))?;
        Self::from_value(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// Merge `incoming` into a copy of `self`. `self` is never modified, so a
    /// failed merge leaves the stored figure untouched.
    pub fn append(&self, incoming: &FigureSpec) -> Result<FigureSpec, StoreError> {
        let mut merged = self.0.clone();
        merge_into(&mut merged, &incoming.0, "")?;
        Ok(FigureSpec(merged))
    }
}

fn exceeds_depth(value: &Value, depth: usize) -> bool {
    if depth >= MAX_DEPTH {
        return matches!(value, Value::Array(_) | Value::Object(_));
    }
    match value {
        Value::Array(items) => items.iter().any(|v| exceeds_depth(v, depth + 1)),
        Value::Object(map) => map.values().any(|v| exceeds_depth(v, depth + 1)),
        _ => false,
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn is_container(value: &Value) -> bool {
    matches!(value, Value::Array(_) | Value::Object(_))
}

/// JSON pointer escaping (RFC 6901).
fn child_pointer(pointer: &str, token: &str) -> String {
    format!("{pointer}/{}", token.replace('~', "~0").replace('/', "~1"))
}

fn incompatible(pointer: &str, reason: String) -> StoreError {
    StoreError::IncompatibleAppend {
        pointer: if pointer.is_empty() {
            "/".to_string()
        } else {
            pointer.to_string()
        },
        reason,
    }
}

fn merge_into(existing: &mut Value, incoming: &Value, pointer: &str) -> Result<(), StoreError> {
    match (existing, incoming) {
        (Value::Object(old), Value::Object(new)) => {
            for (key, value) in new {
                match old.get_mut(key) {
                    Some(slot) => merge_into(slot, value, &child_pointer(pointer, key))?,
                    None => {
                        old.insert(key.clone(), value.clone());
                    }
                }
            }
            Ok(())
        }
        (Value::Array(old), Value::Array(new)) => merge_arrays(old, new, pointer),
        (slot, new) => {
            if is_container(slot) || is_container(new) {
                return Err(incompatible(
                    pointer,
                    format!("cannot merge {} into {}", kind(new), kind(slot)),
                ));
            }
            if slot.is_null() || new.is_null() || kind(slot) == kind(new) {
                *slot = new.clone();
                Ok(())
            } else {
                Err(incompatible(
                    pointer,
                    format!("cannot replace {} with {}", kind(slot), kind(new)),
                ))
            }
        }
    }
}

fn merge_arrays(old: &mut Vec<Value>, new: &[Value], pointer: &str) -> Result<(), StoreError> {
    if new.is_empty() {
        return Ok(());
    }
    if old.is_empty() {
        old.extend(new.iter().cloned());
        return Ok(());
    }

    let old_series = old.iter().all(|v| !is_container(v));
    let new_series = new.iter().all(|v| !is_container(v));
    let old_nested = old.iter().all(is_container);
    let new_nested = new.iter().all(is_container);

    if old_series && new_series {
        old.extend(new.iter().cloned());
        return Ok(());
    }

    if old_nested && new_nested {
        if old.len() != new.len() {
            return Err(incompatible(
                pointer,
                format!("expected {} elements, got {}", old.len(), new.len()),
            ));
        }
        for (index, (slot, value)) in old.iter_mut().zip(new).enumerate() {
            merge_into(slot, value, &child_pointer(pointer, &index.to_string()))?;
        }
        return Ok(());
    }

    Err(incompatible(
        pointer,
        "series points and nested elements cannot be mixed".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn fig(value: Value) -> FigureSpec {
        FigureSpec::from_value(value).expect("valid figure")
    }

    #[test]
    fn root_must_be_object() {
        let err = FigureSpec::from_value(json!([1, 2, 3])).unwrap_err();
        assert!(matches!(err, StoreError::InvalidPayload(_)), "got: {err}");
        assert!(err.to_string().contains("array"));
    }

    #[test]
    fn unparseable_text_is_invalid_payload() {
        let err = FigureSpec::from_json_str("{\"data\": [").unwrap_err();
        assert!(matches!(err, StoreError::InvalidPayload(_)));
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let mut value = json!(1);
        for _ in 0..=MAX_DEPTH {
            value = json!({ "n": value });
        }
        assert!(FigureSpec::from_value(value).is_err());
    }

    #[test]
    fn scalar_series_concatenate() {
        let merged = fig(json!({"y": [0.9]})).append(&fig(json!({"y": [0.8]}))).unwrap();
        assert_eq!(merged.as_value(), &json!({"y": [0.9, 0.8]}));
    }

    #[test]
    fn traces_merge_element_wise() {
        let existing = fig(json!({
            "data": [{"x": [1], "y": [4], "name": "a"}, {"x": [1], "y": [7]}],
            "layout": {"title": {"text": "Point 1"}}
        }));
        let incoming = fig(json!({
            "data": [{"x": [2], "y": [5]}, {"x": [2], "y": [8]}],
            "layout": {"title": {"text": "Point 2"}}
        }));
        let merged = existing.append(&incoming).unwrap();
        assert_eq!(
            merged.as_value(),
            &json!({
                "data": [{"x": [1, 2], "y": [4, 5], "name": "a"}, {"x": [1, 2], "y": [7, 8]}],
                "layout": {"title": {"text": "Point 2"}}
            })
        );
    }

    #[test]
    fn trace_count_mismatch_reports_pointer() {
        let existing = fig(json!({"data": [{"y": [1]}]}));
        let incoming = fig(json!({"data": [{"y": [2]}, {"y": [3]}]}));
        let err = existing.append(&incoming).unwrap_err();
        match err {
            StoreError::IncompatibleAppend { pointer, .. } => assert_eq!(pointer, "/data"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn failed_append_leaves_stored_figure_intact() {
        let existing = fig(json!({"y": [1, 2]}));
        let before = existing.clone();
        assert!(existing.append(&fig(json!({"y": {"nested": true}}))).is_err());
        assert_eq!(existing, before);
    }

    #[test]
    fn pointer_tokens_are_escaped() {
        let existing = fig(json!({"a/b": {"c~d": 1}}));
        let err = existing.append(&fig(json!({"a/b": {"c~d": "text"}}))).unwrap_err();
        match err {
            StoreError::IncompatibleAppend { pointer, .. } => assert_eq!(pointer, "/a~1b/c~0d"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
