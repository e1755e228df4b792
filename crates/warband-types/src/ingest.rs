//! Ingestion-boundary normalization for loosely-shaped containers.
//!
//! Collections in the world store were written by several generations of
//! subsystems: some wrote JSON arrays (sparse, with `null` holes), others
//! wrote objects keyed by id. Every container is normalized here, once,
//! into a `BTreeMap` keyed by record id. Downstream code never sees the
//! array form; writers always emit the canonical object form.
//!
//! Key precedence: an object key always wins over the record's own `id`
//! field (the key is the record's real store path). Array entries use their
//! `id` field, or get a freshly generated id when they have none.

use std::collections::{BTreeMap, BTreeSet};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::warn;

/// A record that is stored under its own id inside a container.
pub trait Keyed {
    /// The typed id of the record.
    type Key: Ord + Clone + From<String>;

    /// The record's current id.
    fn key(&self) -> &Self::Key;

    /// Overwrite the record's id.
    fn assign_key(&mut self, key: Self::Key);

    /// Generate a fresh id for a record that arrived without one.
    fn fresh_key() -> Self::Key;

    /// Whether the record's id is missing.
    fn key_is_empty(&self) -> bool;
}

/// `deserialize_with` adapter: array-or-object container into a keyed map.
pub fn keyed_map<'de, D, T>(deserializer: D) -> Result<BTreeMap<T::Key, T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Keyed,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.map_or_else(BTreeMap::new, collect_keyed))
}

/// Normalize an already-parsed JSON container into a keyed map.
///
/// Entries that fail to parse are skipped with a warning rather than
/// failing the enclosing record.
pub fn collect_keyed<T>(value: Value) -> BTreeMap<T::Key, T>
where
    T: DeserializeOwned + Keyed,
{
    partition_keyed(value).0
}

/// A container entry that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejected {
    /// Container key of the entry; `None` for array entries.
    pub key: Option<String>,
    /// The entry as stored.
    pub value: Value,
}

/// Like [`collect_keyed`], but also hands back the entries it skipped.
pub fn partition_keyed<T>(value: Value) -> (BTreeMap<T::Key, T>, Vec<Rejected>)
where
    T: DeserializeOwned + Keyed,
{
    let entries: Vec<(Option<String>, Value)> = match value {
        Value::Array(items) => items.into_iter().map(|v| (None, v)).collect(),
        Value::Object(map) => map.into_iter().map(|(k, v)| (Some(k), v)).collect(),
        Value::Null => Vec::new(),
        other => {
            warn!(found = %type_name(&other), "container is neither array nor object, ignoring");
            Vec::new()
        }
    };

    let mut out = BTreeMap::new();
    let mut rejected = Vec::new();
    for (key, entry) in entries {
        if entry.is_null() {
            continue;
        }
        match serde_json::from_value::<T>(entry.clone()) {
            Ok(mut record) => {
                if let Some(key) = key {
                    record.assign_key(T::Key::from(key));
                } else if record.key_is_empty() {
                    record.assign_key(T::fresh_key());
                }
                out.insert(record.key().clone(), record);
            }
            Err(err) => {
                warn!(key = key.as_deref().unwrap_or("<array>"), error = %err, "skipping malformed record");
                rejected.push(Rejected { key, value: entry });
            }
        }
    }
    (out, rejected)
}

/// `deserialize_with` adapter: array of ids, or object whose keys are ids,
/// into an ordered id set.
pub fn id_set<'de, D, K>(deserializer: D) -> Result<BTreeSet<K>, D::Error>
where
    D: Deserializer<'de>,
    K: Ord + From<String>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    let mut out = BTreeSet::new();
    match raw {
        Some(Value::Array(items)) => {
            for item in items {
                match item {
                    Value::String(id) if !id.is_empty() => {
                        out.insert(K::from(id));
                    }
                    Value::Null => {}
                    other => warn!(found = %type_name(&other), "skipping non-string id"),
                }
            }
        }
        Some(Value::Object(map)) => {
            for (id, flag) in map {
                if !matches!(flag, Value::Null | Value::Bool(false)) {
                    out.insert(K::from(id));
                }
            }
        }
        Some(Value::Null) | None => {}
        Some(other) => warn!(found = %type_name(&other), "id set is neither array nor object"),
    }
    Ok(out)
}

/// `deserialize_with` adapter for numeric fields that may arrive as numbers,
/// numeric strings, or negative/fractional noise. Anything unusable is `None`.
pub fn lenient_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|v| match v {
        Value::Number(n) => n
            .as_u64()
            .map(|u| u32::try_from(u).unwrap_or(u32::MAX))
            .or_else(|| n.as_f64().map(clamp_f64_to_u32)),
        Value::String(s) => s.trim().parse::<f64>().ok().map(clamp_f64_to_u32),
        _ => None,
    }))
}

/// Like [`lenient_u32`] but missing or unusable values read as `0`.
pub fn lenient_count<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_u32(deserializer)?.unwrap_or(0))
}

/// `deserialize_with` adapter for optional fields that may hold a value of
/// the wrong shape. Anything unusable reads as `None`.
pub fn lenient_opt<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.filter(|v| !v.is_null()).and_then(|v| {
        serde_json::from_value(v)
            .map_err(|err| warn!(error = %err, "unusable field value, reading as absent"))
            .ok()
    }))
}

/// Like [`lenient_opt`] but missing or unusable values read as the default.
pub fn lenient_or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    Ok(lenient_opt(deserializer)?.unwrap_or_default())
}

/// `deserialize_with` adapter for ordered logs stored either as an array or
/// as an object of push-keys (ordered by key). Malformed entries are dropped.
pub fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    let values: Vec<Value> = match raw {
        Some(Value::Array(items)) => items,
        Some(Value::Object(map)) => map.into_iter().map(|(_, v)| v).collect(),
        _ => Vec::new(),
    };
    Ok(values
        .into_iter()
        .filter(|v| !v.is_null())
        .filter_map(|v| serde_json::from_value(v).ok())
        .collect())
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn clamp_f64_to_u32(value: f64) -> u32 {
    if value.is_nan() || value <= 0.0 {
        0
    } else if value >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        value.round() as u32
    }
}

const fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
