//! # Result Coercers
//!
//! Stateless conversions from a tagged `StoreValue` (as returned by
//! `Pipeline::take`) into the shape a caller expects.
//!
//! ## Rules
//! - `StoreValue::Nil` never coerces; every function returns `TypeMismatch`.
//! - Partial results are reported as `PipelineError::MissingField`, which
//!   carries both every missing name and the fields that were present.

use std::collections::HashMap;

use cachepipe_common::{MissingFields, PipelineError, PipelineResult, StoreValue};

/// Maps a positional reply (MGET/HMGET) onto `field_names`.
///
/// `Nil` entries and positions past the end of the reply are missing.
pub fn positional_fields(
    raw: &StoreValue,
    field_names: &[&str],
) -> PipelineResult<HashMap<String, String>> {
    let values = match raw {
        StoreValue::Sequence(values) => values,
        other => return Err(mismatch("positional_fields", "sequence", other)),
    };

    let mut result = HashMap::with_capacity(field_names.len());
    let mut missing = Vec::new();
    for (idx, name) in field_names.iter().enumerate() {
        match values.get(idx) {
            Some(value) if !value.is_nil() => {
                result.insert(name.to_string(), value.to_string());
            }
            _ => missing.push(name.to_string()),
        }
    }

    finish(result, missing)
}

/// Coerces a list reply, or any sequence of scalars, into strings.
pub fn string_sequence(raw: &StoreValue) -> PipelineResult<Vec<String>> {
    match raw {
        StoreValue::Strings(items) => Ok(items.clone()),
        StoreValue::Sequence(items) => Ok(items.iter().map(ToString::to_string).collect()),
        other => Err(mismatch("string_sequence", "sequence", other)),
    }
}

pub fn scalar_string(raw: &StoreValue) -> PipelineResult<String> {
    match raw {
        StoreValue::Str(text) | StoreValue::Status(text) => Ok(text.clone()),
        other => Err(mismatch("scalar_string", "string", other)),
    }
}

/// Parses a string value as a base-10 `i64`.
pub fn scalar_int(raw: &StoreValue) -> PipelineResult<i64> {
    let text = match raw {
        StoreValue::Str(text) | StoreValue::Status(text) => text,
        other => return Err(mismatch("scalar_int", "string", other)),
    };
    text.parse().map_err(|_| PipelineError::TypeMismatch {
        coercer: "scalar_int",
        expected: "base-10 integer",
        found: format!("{:?}", text),
    })
}

pub fn scalar_bool(raw: &StoreValue) -> PipelineResult<bool> {
    match raw {
        StoreValue::Bool(value) => Ok(*value),
        other => Err(mismatch("scalar_bool", "boolean", other)),
    }
}

/// Projects a full hash (HGETALL) onto `required` and `optional` fields.
///
/// An empty `required` list returns the whole map. Required fields that are
/// absent or empty are missing; optional fields are only copied when present
/// and non-empty.
pub fn field_map(
    raw: &StoreValue,
    required: &[&str],
    optional: &[&str],
) -> PipelineResult<HashMap<String, String>> {
    let values = match raw {
        StoreValue::Map(values) => values,
        other => return Err(mismatch("field_map", "map", other)),
    };

    if required.is_empty() {
        return Ok(values.clone());
    }

    let mut result = HashMap::with_capacity(required.len() + optional.len());
    let mut missing = Vec::new();
    for &name in required {
        match non_empty(values, name) {
            Some(value) => {
                result.insert(name.to_string(), value.to_string());
            }
            None => missing.push(name.to_string()),
        }
    }
    for &name in optional {
        if let Some(value) = non_empty(values, name) {
            result.insert(name.to_string(), value.to_string());
        }
    }

    finish(result, missing)
}

fn non_empty<'a>(values: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    values
        .get(name)
        .map(String::as_str)
        .filter(|value| !value.is_empty())
}

fn finish(
    result: HashMap<String, String>,
    missing: Vec<String>,
) -> PipelineResult<HashMap<String, String>> {
    if missing.is_empty() {
        Ok(result)
    } else {
        Err(PipelineError::MissingField(MissingFields::new(missing, result)))
    }
}

fn mismatch(coercer: &'static str, expected: &'static str, found: &StoreValue) -> PipelineError {
    PipelineError::TypeMismatch {
        coercer,
        expected,
        found: found.kind().to_string(),
    }
}
