// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Publisher records exchanged through discovery.
//!
//! A message publisher advertises its data and control endpoints; a
//! service publisher advertises its request endpoint and routing socket
//! id. Records are copied into the runtime's books on arrival.

use crate::options::{AdvertiseMessageOptions, AdvertiseServiceOptions, Scope};

fn utf8(frame: &[u8]) -> Option<String> {
    String::from_utf8(frame.to_vec()).ok()
}

/// Host part of a `tcp://<host>:<port>` endpoint.
pub(crate) fn endpoint_host(endpoint: &str) -> Option<&str> {
    endpoint
        .strip_prefix("tcp://")
        .and_then(|rest| rest.rsplit_once(':'))
        .map(|(host, _)| host)
}

/// Common behavior of records tracked by a discovery beacon.
pub(crate) trait DiscoveryRecord: Clone + Send + Sync + 'static {
    fn topic(&self) -> &str;
    fn process_uuid(&self) -> &str;
    fn node_uuid(&self) -> &str;
    fn scope(&self) -> Scope;
    /// Primary endpoint, used for host-scope filtering.
    fn endpoint(&self) -> &str;
    fn encode_fields(&self) -> Vec<Vec<u8>>;
    fn decode_fields(frames: &[Vec<u8>]) -> Option<Self>;
    /// Minimal record standing in for a vanished publisher. Empty topic
    /// and node mean the whole process went away.
    fn tombstone(topic: &str, process_uuid: &str, node_uuid: &str) -> Self;
}

/// Advertisement of a message topic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePublisher {
    /// Fully qualified topic.
    pub topic: String,
    /// Data endpoint of the publisher socket.
    pub addr: String,
    /// Control endpoint for remote-subscriber registration.
    pub ctrl: String,
    /// Process UUID of the advertiser.
    pub process_uuid: String,
    /// Node UUID of the advertiser.
    pub node_uuid: String,
    /// Declared payload type name.
    pub msg_type: String,
    /// Advertise options.
    pub opts: AdvertiseMessageOptions,
}

impl DiscoveryRecord for MessagePublisher {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn process_uuid(&self) -> &str {
        &self.process_uuid
    }

    fn node_uuid(&self) -> &str {
        &self.node_uuid
    }

    fn scope(&self) -> Scope {
        self.opts.scope
    }

    fn endpoint(&self) -> &str {
        &self.addr
    }

    fn encode_fields(&self) -> Vec<Vec<u8>> {
        vec![
            self.topic.clone().into_bytes(),
            self.addr.clone().into_bytes(),
            self.ctrl.clone().into_bytes(),
            self.process_uuid.clone().into_bytes(),
            self.node_uuid.clone().into_bytes(),
            self.msg_type.clone().into_bytes(),
            vec![self.opts.scope.to_wire()],
            self.opts.msgs_per_sec.to_string().into_bytes(),
        ]
    }

    fn decode_fields(frames: &[Vec<u8>]) -> Option<Self> {
        if frames.len() < 8 {
            return None;
        }
        let scope = Scope::from_wire(*frames[6].first()?)?;
        let msgs_per_sec: u64 = utf8(&frames[7])?.parse().ok()?;
        Some(Self {
            topic: utf8(&frames[0])?,
            addr: utf8(&frames[1])?,
            ctrl: utf8(&frames[2])?,
            process_uuid: utf8(&frames[3])?,
            node_uuid: utf8(&frames[4])?,
            msg_type: utf8(&frames[5])?,
            opts: AdvertiseMessageOptions {
                scope,
                msgs_per_sec,
            },
        })
    }

    fn tombstone(topic: &str, process_uuid: &str, node_uuid: &str) -> Self {
        Self {
            topic: topic.to_string(),
            process_uuid: process_uuid.to_string(),
            node_uuid: node_uuid.to_string(),
            ..Self::default()
        }
    }
}

/// Advertisement of a service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServicePublisher {
    /// Fully qualified service topic.
    pub topic: String,
    /// Request endpoint of the replier socket.
    pub addr: String,
    /// Routing identity of the replier socket.
    pub socket_id: String,
    /// Process UUID of the advertiser.
    pub process_uuid: String,
    /// Node UUID of the advertiser.
    pub node_uuid: String,
    /// Declared request type name.
    pub req_type: String,
    /// Declared response type name.
    pub rep_type: String,
    /// Advertise options.
    pub opts: AdvertiseServiceOptions,
}

impl DiscoveryRecord for ServicePublisher {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn process_uuid(&self) -> &str {
        &self.process_uuid
    }

    fn node_uuid(&self) -> &str {
        &self.node_uuid
    }

    fn scope(&self) -> Scope {
        self.opts.scope
    }

    fn endpoint(&self) -> &str {
        &self.addr
    }

    fn encode_fields(&self) -> Vec<Vec<u8>> {
        vec![
            self.topic.clone().into_bytes(),
            self.addr.clone().into_bytes(),
            self.socket_id.clone().into_bytes(),
            self.process_uuid.clone().into_bytes(),
            self.node_uuid.clone().into_bytes(),
            self.req_type.clone().into_bytes(),
            self.rep_type.clone().into_bytes(),
            vec![self.opts.scope.to_wire()],
        ]
    }

    fn decode_fields(frames: &[Vec<u8>]) -> Option<Self> {
        if frames.len() < 8 {
            return None;
        }
        let scope = Scope::from_wire(*frames[7].first()?)?;
        Some(Self {
            topic: utf8(&frames[0])?,
            addr: utf8(&frames[1])?,
            socket_id: utf8(&frames[2])?,
            process_uuid: utf8(&frames[3])?,
            node_uuid: utf8(&frames[4])?,
            req_type: utf8(&frames[5])?,
            rep_type: utf8(&frames[6])?,
            opts: AdvertiseServiceOptions { scope },
        })
    }

    fn tombstone(topic: &str, process_uuid: &str, node_uuid: &str) -> Self {
        Self {
            topic: topic.to_string(),
            process_uuid: process_uuid.to_string(),
            node_uuid: node_uuid.to_string(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_record_roundtrip() {
        let record = MessagePublisher {
            topic: "@p@/chat".into(),
            addr: "tcp://10.0.0.1:1234".into(),
            ctrl: "tcp://10.0.0.1:1235".into(),
            process_uuid: "proc".into(),
            node_uuid: "node".into(),
            msg_type: "weft.msgs.Int32".into(),
            opts: AdvertiseMessageOptions {
                scope: Scope::Host,
                msgs_per_sec: 50,
            },
        };
        let decoded = MessagePublisher::decode_fields(&record.encode_fields()).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn service_record_roundtrip() {
        let record = ServicePublisher {
            topic: "@p@/calc".into(),
            addr: "tcp://10.0.0.1:1236".into(),
            socket_id: "replier-id".into(),
            process_uuid: "proc".into(),
            node_uuid: "node".into(),
            req_type: "weft.msgs.Int32".into(),
            rep_type: "weft.msgs.Int32".into(),
            opts: AdvertiseServiceOptions { scope: Scope::All },
        };
        let decoded = ServicePublisher::decode_fields(&record.encode_fields()).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn truncated_record_is_rejected() {
        let record = ServicePublisher::tombstone("@p@/calc", "proc", "node");
        let mut frames = record.encode_fields();
        frames.pop();
        assert!(ServicePublisher::decode_fields(&frames).is_none());
    }

    #[test]
    fn endpoint_host_parses() {
        assert_eq!(endpoint_host("tcp://10.1.2.3:99"), Some("10.1.2.3"));
        assert_eq!(endpoint_host("bogus"), None);
    }
}
