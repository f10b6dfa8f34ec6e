use std::collections::BTreeMap;

use beacon_core::types::CapabilitySet;

/// Result of a channel access check. Callers pattern-match this rather than
/// catching errors; a denial is a normal protocol outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AclDecision {
    Allowed,
    Denied { required: String },
}

impl AclDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AclDecision::Allowed)
    }
}

/// Static channel → required capability table.
///
/// Built once at startup. Channels missing from the table are open to any
/// authenticated connection.
#[derive(Debug, Clone, Default)]
pub struct ChannelAcl {
    required: BTreeMap<String, String>,
}

impl ChannelAcl {
    /// A table that gates nothing.
    pub fn open() -> Self {
        Self::default()
    }

    pub fn from_table(required: BTreeMap<String, String>) -> Self {
        Self { required }
    }

    pub fn with_rule(mut self, channel: impl Into<String>, capability: impl Into<String>) -> Self {
        self.required.insert(channel.into(), capability.into());
        self
    }

    /// Capability needed to subscribe to `channel`, if any.
    pub fn required_capability(&self, channel: &str) -> Option<&str> {
        self.required.get(channel).map(String::as_str)
    }

    pub fn check(&self, channel: &str, capabilities: &CapabilitySet) -> AclDecision {
        match self.required_capability(channel) {
            None => AclDecision::Allowed,
            Some(cap) if capabilities.contains(cap) => AclDecision::Allowed,
            Some(cap) => AclDecision::Denied {
                required: cap.to_string(),
            },
        }
    }

    pub fn len(&self) -> usize {
        self.required.len()
    }

    pub fn is_empty(&self) -> bool {
        self.required.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acl() -> ChannelAcl {
        ChannelAcl::open().with_rule("audit.events", "audit.view")
    }

    #[test]
    fn unknown_channel_is_open() {
        let caps = CapabilitySet::new();
        assert!(acl().check("inventory.changes", &caps).is_allowed());
    }

    #[test]
    fn gated_channel_needs_capability() {
        let none = CapabilitySet::new();
        assert_eq!(
            acl().check("audit.events", &none),
            AclDecision::Denied {
                required: "audit.view".into()
            }
        );

        let auditor: CapabilitySet = ["audit.view"].into_iter().collect();
        assert!(acl().check("audit.events", &auditor).is_allowed());
    }

    #[test]
    fn unrelated_capabilities_do_not_help() {
        let caps: CapabilitySet = ["parts.edit", "audit.export"].into_iter().collect();
        assert!(!acl().check("audit.events", &caps).is_allowed());
    }

    #[test]
    fn from_table_uses_every_row() {
        let table = BTreeMap::from([
            ("audit.events".to_string(), "audit.view".to_string()),
            ("user.activity".to_string(), "users.view".to_string()),
        ]);
        let acl = ChannelAcl::from_table(table);
        assert_eq!(acl.len(), 2);
        assert_eq!(acl.required_capability("user.activity"), Some("users.view"));
    }
}
