//! Utility helpers: poison-tolerant locking and tool-input accessors.

use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::{Map, Value};

/// Lock a mutex, recovering the guard if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Read a string field from a tool input object.
pub fn input_str<'a>(input: &'a Value, key: &str) -> Option<&'a str> {
    input.get(key).and_then(Value::as_str)
}

/// Return a copy of `input` with `fields` inserted.
///
/// Non-object inputs are replaced by an object holding only `fields`.
pub fn with_fields<I>(input: &Value, fields: I) -> Value
where
    I: IntoIterator<Item = (&'static str, Value)>,
{
    let mut object = match input {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    for (key, value) in fields {
        object.insert(key.to_string(), value);
    }
    Value::Object(object)
}
