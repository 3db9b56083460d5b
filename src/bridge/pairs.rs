//! Pair-list tree codec.
//!
//! The bridge encodes records as `[["key", value], ...]` where each value is
//! a primitive, a positional array, or another pair list. This module turns
//! that JSON shape into a navigable tree with the numeric-string coercions
//! the simulator side is known to produce ("3.5" for 3.5, "true" for true).

use serde_json::Value;

/// Errors crossing the bridge boundary.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("payload shape mismatch: {0}")]
    Shape(String),
    #[error("missing key \"{0}\"")]
    MissingKey(String),
    #[error("key \"{key}\": expected {expected}")]
    BadValue { key: String, expected: &'static str },
}

/// One node of a decoded bridge payload.
#[derive(Debug, Clone, PartialEq)]
pub enum PairValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    /// Positional array (e.g. a position triple or a waypoint list)
    List(Vec<PairValue>),
    /// Ordered key → value record; duplicate keys keep first-wins semantics
    Pairs(Vec<(String, PairValue)>),
}

impl PairValue {
    /// Decode a JSON value into the pair tree. An array is a record when
    /// every element is a `[string, value]` pair, positional otherwise.
    pub fn decode(value: &Value) -> PairValue {
        match value {
            Value::Null => PairValue::Null,
            Value::Bool(b) => PairValue::Bool(*b),
            Value::Number(n) => PairValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => PairValue::Text(s.clone()),
            Value::Array(items) => {
                let looks_like_pairs = !items.is_empty()
                    && items.iter().all(|item| {
                        matches!(item, Value::Array(pair)
                            if pair.len() == 2 && pair[0].is_string())
                    });
                if looks_like_pairs {
                    PairValue::Pairs(
                        items
                            .iter()
                            .filter_map(|item| match item {
                                Value::Array(pair) if pair.len() == 2 => Some((
                                    pair[0].as_str().unwrap_or_default().to_string(),
                                    PairValue::decode(&pair[1]),
                                )),
                                _ => None,
                            })
                            .collect(),
                    )
                } else {
                    PairValue::List(items.iter().map(PairValue::decode).collect())
                }
            }
            // JSON objects are tolerated from test harnesses even though the
            // real bridge cannot emit them
            Value::Object(map) => PairValue::Pairs(
                map.iter()
                    .map(|(k, v)| (k.clone(), PairValue::decode(v)))
                    .collect(),
            ),
        }
    }

    /// First value under `key` in a record node.
    pub fn get(&self, key: &str) -> Option<&PairValue> {
        match self {
            PairValue::Pairs(pairs) => pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Record entries in order, or an empty slice for non-records.
    pub fn entries(&self) -> &[(String, PairValue)] {
        match self {
            PairValue::Pairs(pairs) => pairs,
            _ => &[],
        }
    }

    /// Positional elements, or an empty slice for non-lists.
    pub fn items(&self) -> &[PairValue] {
        match self {
            PairValue::List(items) => items,
            _ => &[],
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PairValue::Number(n) => Some(*n),
            PairValue::Text(s) => s.trim().parse().ok(),
            PairValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        let n = self.as_f64()?;
        if n.is_finite() && n >= 0.0 {
            Some(n.round() as u32)
        } else {
            None
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PairValue::Bool(b) => Some(*b),
            PairValue::Number(n) => Some(*n != 0.0),
            PairValue::Text(s) => match s.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" => Some(true),
                "false" | "0" | "no" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PairValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// String form of a primitive, for opaque passthrough values.
    pub fn to_display_string(&self) -> String {
        match self {
            PairValue::Null => String::new(),
            PairValue::Bool(b) => b.to_string(),
            PairValue::Number(n) => n.to_string(),
            PairValue::Text(s) => s.clone(),
            PairValue::List(_) | PairValue::Pairs(_) => String::new(),
        }
    }

    /// Convert to plain JSON, turning record nodes into objects. Used when
    /// a bridge payload feeds a serde-typed config structure.
    pub fn to_object_json(&self) -> Value {
        match self {
            PairValue::Null => Value::Null,
            PairValue::Bool(b) => Value::Bool(*b),
            PairValue::Number(n) => serde_json::json!(n),
            PairValue::Text(s) => Value::String(s.clone()),
            PairValue::List(items) => {
                Value::Array(items.iter().map(PairValue::to_object_json).collect())
            }
            PairValue::Pairs(pairs) => {
                let mut map = serde_json::Map::new();
                for (k, v) in pairs {
                    map.entry(k.clone()).or_insert_with(|| v.to_object_json());
                }
                Value::Object(map)
            }
        }
    }

    /// Re-encode into the JSON shape the bridge carries.
    pub fn encode(&self) -> Value {
        match self {
            PairValue::Null => Value::Null,
            PairValue::Bool(b) => Value::Bool(*b),
            PairValue::Number(n) => serde_json::json!(n),
            PairValue::Text(s) => Value::String(s.clone()),
            PairValue::List(items) => Value::Array(items.iter().map(PairValue::encode).collect()),
            PairValue::Pairs(pairs) => Value::Array(
                pairs
                    .iter()
                    .map(|(k, v)| Value::Array(vec![Value::String(k.clone()), v.encode()]))
                    .collect(),
            ),
        }
    }
}

/// Build a pair-list JSON value for a response body.
pub fn pair_list<I>(entries: I) -> Value
where
    I: IntoIterator<Item = (&'static str, Value)>,
{
    Value::Array(
        entries
            .into_iter()
            .map(|(k, v)| Value::Array(vec![Value::String(k.to_string()), v]))
            .collect(),
    )
}
