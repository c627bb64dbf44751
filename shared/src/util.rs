//! Serde helpers for loosely typed backend payloads
//!
//! The shop backend emits ids, postcodes and coordinates either as JSON
//! numbers or as strings depending on the storage path they came from.

use serde::de::{self, Deserializer};
use serde::Deserialize;

#[derive(Deserialize)]
#[serde(untagged)]
enum Loose {
    Int(u64),
    Float(f64),
    Text(String),
    Null(()),
}

/// Accept `42` or `"42"` as an id
pub fn id_from_str_or_number<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match Loose::deserialize(deserializer)? {
        Loose::Int(v) => Ok(v),
        Loose::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("invalid id: {s}"))),
        Loose::Float(v) => Err(de::Error::custom(format!("invalid id: {v}"))),
        Loose::Null(()) => Err(de::Error::custom("missing id")),
    }
}

/// Accept a string or a number, rendering numbers as text; `null` is empty
pub fn string_from_str_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Loose::deserialize(deserializer)? {
        Loose::Int(v) => v.to_string(),
        Loose::Float(v) => v.to_string(),
        Loose::Text(s) => s,
        Loose::Null(()) => String::new(),
    })
}

/// Accept `18.52`, `"18.52"`, `""` or `null` as an optional coordinate
pub fn opt_f64_from_str_or_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Loose::deserialize(deserializer)? {
        Loose::Int(v) => Ok(Some(v as f64)),
        Loose::Float(v) => Ok(Some(v)),
        Loose::Text(s) if s.trim().is_empty() => Ok(None),
        Loose::Text(s) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("invalid coordinate: {s}"))),
        Loose::Null(()) => Ok(None),
    }
}

/// Same as [`id_from_str_or_number`] for optional ids
pub fn opt_id_from_str_or_number<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Loose::deserialize(deserializer)? {
        Loose::Int(v) => Ok(Some(v)),
        Loose::Text(s) if s.trim().is_empty() => Ok(None),
        Loose::Text(s) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("invalid id: {s}"))),
        Loose::Float(v) => Err(de::Error::custom(format!("invalid id: {v}"))),
        Loose::Null(()) => Ok(None),
    }
}
