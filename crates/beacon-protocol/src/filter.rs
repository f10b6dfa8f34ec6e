//! Subscription keys: a channel name plus the canonical form of the filter the
//! client subscribed with.
//!
//! Two filters that are equal as JSON values produce the same signature no
//! matter how the client ordered the object keys, so `{"a":1,"b":2}` and
//! `{"b":2,"a":1}` share one bucket. Integral floats are folded into integers,
//! so `{"lotId":5.0}` lands with `{"lotId":5}`. `{}`, `null` and an absent
//! filter all map to the whole-channel signature.
//!
//! Sorting comes from `serde_json::Map` itself: without the `preserve_order`
//! feature it is a `BTreeMap`, so serializing a rebuilt value emits keys in
//! order at every depth.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Canonical serialization of an opaque filter object.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterSignature(String);

impl FilterSignature {
    /// Signature of the "whole channel" bucket.
    pub fn whole_channel() -> Self {
        Self(String::new())
    }

    pub fn of(filter: &Value) -> Self {
        match filter {
            Value::Null => Self::whole_channel(),
            Value::Object(map) if map.is_empty() => Self::whole_channel(),
            other => Self(serde_json::to_string(&canonical(other)).unwrap_or_default()),
        }
    }

    pub fn is_whole_channel(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FilterSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_whole_channel() {
            f.write_str("*")
        } else {
            f.write_str(&self.0)
        }
    }
}

// Largest integer an f64 represents exactly.
const MAX_EXACT_FLOAT: f64 = 9_007_199_254_740_992.0;

/// Rebuild `value` with integral floats turned into integers.
fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, val)| (key.clone(), canonical(val)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        Value::Number(n) if n.is_f64() => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() <= MAX_EXACT_FLOAT => {
                if f < 0.0 {
                    Value::from(f as i64)
                } else {
                    Value::from(f as u64)
                }
            }
            _ => value.clone(),
        },
        other => other.clone(),
    }
}

/// Registry key: `(channel, filter signature)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubscriptionKey {
    pub channel: String,
    pub filter: FilterSignature,
}

impl SubscriptionKey {
    pub fn new(channel: impl Into<String>, filter: &Value) -> Self {
        Self {
            channel: channel.into(),
            filter: FilterSignature::of(filter),
        }
    }

    /// Key of the channel's whole-channel bucket.
    pub fn whole_channel(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            filter: FilterSignature::whole_channel(),
        }
    }

    pub fn is_whole_channel(&self) -> bool {
        self.filter.is_whole_channel()
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.channel, self.filter)
    }
}
