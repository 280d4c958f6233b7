// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Node, advertise and subscribe options.

use crate::topic;

/// Unthrottled sentinel for the messages-per-second caps.
pub const UNTHROTTLED: u64 = u64::MAX;

/// Visibility of an advertisement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Scope {
    /// Only nodes in the same process.
    Process,
    /// Only nodes on the same host.
    Host,
    /// Every node on the network.
    #[default]
    All,
}

impl Scope {
    pub(crate) fn to_wire(self) -> u8 {
        match self {
            Self::Process => 0,
            Self::Host => 1,
            Self::All => 2,
        }
    }

    pub(crate) fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Process),
            1 => Some(Self::Host),
            2 => Some(Self::All),
            _ => None,
        }
    }
}

/// Options used when a node is created.
#[derive(Debug, Clone)]
pub struct NodeOptions {
    partition: String,
    namespace: String,
}

impl Default for NodeOptions {
    fn default() -> Self {
        // IGN_PARTITION supplies the default partition name.
        let partition = std::env::var("IGN_PARTITION").unwrap_or_default();
        Self {
            partition,
            namespace: String::new(),
        }
    }
}

impl NodeOptions {
    /// Current partition name.
    pub fn partition(&self) -> &str {
        &self.partition
    }

    /// Override the partition. Returns false and leaves the options
    /// untouched when the name is invalid.
    pub fn set_partition(&mut self, partition: &str) -> bool {
        if !topic::is_valid_partition(partition) {
            return false;
        }
        self.partition = partition.to_string();
        true
    }

    /// Current namespace.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Override the namespace. Returns false and leaves the options
    /// untouched when the name is invalid.
    pub fn set_namespace(&mut self, ns: &str) -> bool {
        if !topic::is_valid_namespace(ns) {
            return false;
        }
        self.namespace = ns.to_string();
        true
    }
}

/// Options for advertising a message topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertiseMessageOptions {
    /// Advertisement visibility.
    pub scope: Scope,
    /// Publisher-side rate cap; `UNTHROTTLED` disables it.
    pub msgs_per_sec: u64,
}

impl Default for AdvertiseMessageOptions {
    fn default() -> Self {
        Self {
            scope: Scope::default(),
            msgs_per_sec: UNTHROTTLED,
        }
    }
}

impl AdvertiseMessageOptions {
    /// Whether a rate cap is configured.
    pub fn throttled(&self) -> bool {
        self.msgs_per_sec != UNTHROTTLED
    }
}

/// Options for advertising a service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdvertiseServiceOptions {
    /// Advertisement visibility.
    pub scope: Scope,
}

/// Options for subscribing to a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Subscriber-side rate cap; `UNTHROTTLED` disables it.
    pub msgs_per_sec: u64,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self {
            msgs_per_sec: UNTHROTTLED,
        }
    }
}

impl SubscribeOptions {
    /// Whether a rate cap is configured.
    pub fn throttled(&self) -> bool {
        self.msgs_per_sec != UNTHROTTLED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_options_validate_segments() {
        let mut opts = NodeOptions::default();
        assert!(opts.set_partition("p1"));
        assert!(!opts.set_partition("bad part"));
        assert_eq!(opts.partition(), "p1");

        assert!(opts.set_namespace("ns"));
        assert!(!opts.set_namespace("n s"));
        assert_eq!(opts.namespace(), "ns");
    }

    #[test]
    fn throttle_defaults_off() {
        assert!(!AdvertiseMessageOptions::default().throttled());
        assert!(!SubscribeOptions::default().throttled());
        let opts = SubscribeOptions { msgs_per_sec: 10 };
        assert!(opts.throttled());
    }

    #[test]
    fn scope_wire_roundtrip() {
        for scope in [Scope::Process, Scope::Host, Scope::All] {
            assert_eq!(Scope::from_wire(scope.to_wire()), Some(scope));
        }
        assert_eq!(Scope::from_wire(9), None);
    }
}
