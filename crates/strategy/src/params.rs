//! Typed reads over a flat `toml::Table` of strategy parameters and filters.
//!
//! A missing key falls back to its default; a present key of the wrong type
//! is `InvalidConfiguration`. Unknown keys are ignored.

use common::{Error, Result};
use toml::{Table, Value};

pub fn read_f64(table: &Table, key: &str, default: f64) -> Result<f64> {
    match table.get(key) {
        None => Ok(default),
        Some(Value::Float(v)) => Ok(*v),
        Some(Value::Integer(v)) => Ok(*v as f64),
        Some(other) => Err(wrong_type(key, "a number", other)),
    }
}

pub fn read_usize(table: &Table, key: &str, default: usize) -> Result<usize> {
    match table.get(key) {
        None => Ok(default),
        Some(Value::Integer(v)) if *v >= 0 => Ok(*v as usize),
        Some(other) => Err(wrong_type(key, "a non-negative integer", other)),
    }
}

pub fn read_bool(table: &Table, key: &str, default: bool) -> Result<bool> {
    match table.get(key) {
        None => Ok(default),
        Some(Value::Boolean(v)) => Ok(*v),
        Some(other) => Err(wrong_type(key, "a boolean", other)),
    }
}

pub fn read_string(table: &Table, key: &str, default: &str) -> Result<String> {
    match table.get(key) {
        None => Ok(default.to_string()),
        Some(Value::String(v)) => Ok(v.clone()),
        Some(other) => Err(wrong_type(key, "a string", other)),
    }
}

/// Fail with `InvalidConfiguration` unless `ok`.
pub fn ensure(ok: bool, msg: impl FnOnce() -> String) -> Result<()> {
    if ok {
        Ok(())
    } else {
        Err(Error::InvalidConfiguration(msg()))
    }
}

/// `base` overlaid with `changes`, used to validate a hot reload as a
/// complete parameter set.
pub fn merged(base: Table, changes: &Table) -> Table {
    let mut out = base;
    for (k, v) in changes {
        out.insert(k.clone(), v.clone());
    }
    out
}

pub fn int(v: usize) -> Value {
    Value::Integer(v as i64)
}

fn wrong_type(key: &str, expected: &str, got: &Value) -> Error {
    Error::config(format!("parameter '{key}' must be {expected}, got {got}"))
}
