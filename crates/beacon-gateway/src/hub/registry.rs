use std::collections::{BTreeSet, HashMap};

use beacon_core::types::ConnId;
use beacon_protocol::filter::{FilterSignature, SubscriptionKey};
use serde::Serialize;

/// Which bucket a broadcast resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Matched {
    /// Someone subscribed with exactly the publisher's filter.
    Exact,
    /// Nobody did; the channel's unfiltered subscribers got it instead.
    WholeChannel,
    /// No subscribers at all.
    Nobody,
}

/// Debug view of one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BucketSnapshot {
    pub channel: String,
    pub filter: FilterSignature,
    pub members: Vec<ConnId>,
}

/// Fan-out index: subscription key → connections holding it.
///
/// Buckets are removed as soon as their last member leaves, so the map
/// never holds empty entries.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    buckets: HashMap<SubscriptionKey, BTreeSet<ConnId>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `id` to the bucket for `key`. Returns false if it was already there.
    pub fn insert(&mut self, key: SubscriptionKey, id: &ConnId) -> bool {
        self.buckets.entry(key).or_default().insert(id.clone())
    }

    /// Remove `id` from one bucket, pruning it if it empties.
    pub fn remove(&mut self, key: &SubscriptionKey, id: &ConnId) -> bool {
        let Some(members) = self.buckets.get_mut(key) else {
            return false;
        };
        let removed = members.remove(id);
        if members.is_empty() {
            self.buckets.remove(key);
        }
        removed
    }

    /// Remove `id` from every bucket in `keys` (the connection's own key set).
    pub fn remove_all<'a, I>(&mut self, id: &ConnId, keys: I) -> usize
    where
        I: IntoIterator<Item = &'a SubscriptionKey>,
    {
        keys.into_iter().filter(|key| self.remove(key, id)).count()
    }

    /// Targets for a broadcast on `(channel, filter)`.
    ///
    /// The exact bucket wins. Only when nobody holds the exact key does the
    /// channel's whole-channel bucket receive the event; the two are never
    /// both notified for one call.
    pub fn resolve(&self, channel: &str, filter: &FilterSignature) -> (Matched, Vec<ConnId>) {
        let exact = SubscriptionKey {
            channel: channel.to_string(),
            filter: filter.clone(),
        };
        if let Some(members) = self.buckets.get(&exact) {
            return (Matched::Exact, members.iter().cloned().collect());
        }
        if !filter.is_whole_channel() {
            let whole = SubscriptionKey::whole_channel(channel);
            if let Some(members) = self.buckets.get(&whole) {
                return (Matched::WholeChannel, members.iter().cloned().collect());
            }
        }
        (Matched::Nobody, Vec::new())
    }

    /// Distinct channel names with at least one subscriber, sorted.
    pub fn channels(&self) -> Vec<String> {
        let names: BTreeSet<&str> = self.buckets.keys().map(|k| k.channel.as_str()).collect();
        names.into_iter().map(String::from).collect()
    }

    /// Sum of bucket sizes: one per (connection, key) pair.
    pub fn total_subscriptions(&self) -> usize {
        self.buckets.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn snapshot(&self) -> Vec<BucketSnapshot> {
        let mut out: Vec<BucketSnapshot> = self
            .buckets
            .iter()
            .map(|(key, members)| BucketSnapshot {
                channel: key.channel.clone(),
                filter: key.filter.clone(),
                members: members.iter().cloned().collect(),
            })
            .collect();
        out.sort_by(|a, b| (&a.channel, &a.filter).cmp(&(&b.channel, &b.filter)));
        out
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }
}
