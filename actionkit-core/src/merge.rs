//! # merge: recursive overlay of configuration objects
//!
//! Used by actions to lay caller options over their defaults, and by the CLI
//! to lay per-action YAML over the `defaults` section of a task file.
//!
//! Only plain objects are merged key by key. Arrays and primitives in the
//! incoming value always replace whatever the source held at that key, and an
//! incoming object replaces a non-object in the source outright (the old value
//! is discarded, not folded in).

use serde_json::{Map, Value};

/// Structural type tag of a value, used to tell plain objects apart from
/// arrays and primitives.
pub fn tag(value: &Value) -> &'static str {
    match value {
        Value::Object(_) => "Object",
        Value::Array(_) => "Array",
        Value::String(_) => "String",
        Value::Number(_) => "Number",
        Value::Bool(_) => "Boolean",
        Value::Null => "Null",
    }
}

/// Overlays `incoming` onto `source` in place and returns `source`.
///
/// A non-object `incoming` has no keys and leaves `source` untouched. A
/// non-object `source` is replaced by an empty object before an object is
/// merged into it.
pub fn merge<'a>(source: &'a mut Value, incoming: &Value) -> &'a mut Value {
    let Value::Object(incoming) = incoming else {
        return source;
    };

    if tag(source) != "Object" {
        *source = Value::Object(Map::new());
    }

    if let Value::Object(target) = source {
        for (key, value) in incoming {
            if tag(value) == "Object" {
                let slot = target.entry(key.clone()).or_insert(Value::Null);
                merge(slot, value);
            } else {
                target.insert(key.clone(), value.clone());
            }
        }
    }

    source
}

/// By-value variant of [`merge`]: clones `defaults` and overlays `overrides`.
pub fn merged(defaults: &Value, overrides: &Value) -> Value {
    let mut out = defaults.clone();
    merge(&mut out, overrides);
    out
}
