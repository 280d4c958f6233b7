// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Multipart wire codec.
//!
//! All fabric traffic is multipart: an ordered list of byte frames. Inside
//! a transport message each frame is a `u32` big-endian length followed by
//! its bytes; the transport layer supplies the outer message boundary
//! (length prefix on TCP, datagram on UDP).
//!
//! Message layouts (text fields are UTF-8, no per-field length headers
//! beyond the frame structure):
//!
//! - publish:  `topic | sender-data-endpoint | payload | msg-type`
//! - control:  `topic | process-uuid | node-uuid | msg-type | event-code`
//! - request:  `topic | requester-endpoint | response-socket-id |
//!              node-uuid | request-uuid | payload | req-type | rep-type`
//! - response: `topic | node-uuid | request-uuid | payload | result-flag`
//!
//! Requests and responses travel through routed sockets: the sender
//! prepends an addressing frame that the router consumes, and the receiving
//! router substitutes the sender's identity in its place. The parsers here
//! therefore skip frame zero on routed messages.
//!
//! Parsing returns `None` as soon as an expected frame is absent; no
//! synthetic frames are substituted and the caller discards the message.

/// Frame length header size.
const FRAME_HEADER: usize = 4;

/// Control event: a remote subscriber registered with us.
pub(crate) const NEW_CONNECTION: u8 = 0;
/// Control event: a remote subscriber went away.
pub(crate) const END_CONNECTION: u8 = 1;

/// Concatenate frames into one buffer: per frame a u32 BE length + bytes.
pub(crate) fn encode_frames(frames: &[Vec<u8>]) -> Vec<u8> {
    let total: usize = frames.iter().map(|f| FRAME_HEADER + f.len()).sum();
    let mut out = Vec::with_capacity(total);
    for frame in frames {
        out.extend_from_slice(&(frame.len() as u32).to_be_bytes());
        out.extend_from_slice(frame);
    }
    out
}

/// Split a buffer produced by [`encode_frames`] back into frames.
///
/// Returns `None` on truncated or oversized frame headers.
pub(crate) fn decode_frames(mut buf: &[u8]) -> Option<Vec<Vec<u8>>> {
    let mut frames = Vec::new();
    while !buf.is_empty() {
        if buf.len() < FRAME_HEADER {
            return None;
        }
        let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        buf = &buf[FRAME_HEADER..];
        if buf.len() < len {
            return None;
        }
        frames.push(buf[..len].to_vec());
        buf = &buf[len..];
    }
    Some(frames)
}

fn utf8(frame: &[u8]) -> Option<String> {
    String::from_utf8(frame.to_vec()).ok()
}

/// A publish message: four frames on the data path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PublishMsg {
    pub topic: String,
    pub sender: String,
    pub data: Vec<u8>,
    pub msg_type: String,
}

impl PublishMsg {
    pub(crate) fn frames(&self) -> Vec<Vec<u8>> {
        vec![
            self.topic.clone().into_bytes(),
            self.sender.clone().into_bytes(),
            self.data.clone(),
            self.msg_type.clone().into_bytes(),
        ]
    }

    pub(crate) fn parse(frames: &[Vec<u8>]) -> Option<Self> {
        if frames.len() < 4 {
            return None;
        }
        Some(Self {
            topic: utf8(&frames[0])?,
            sender: utf8(&frames[1])?,
            data: frames[2].clone(),
            msg_type: utf8(&frames[3])?,
        })
    }
}

/// A control message: five frames on the control path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ControlMsg {
    pub topic: String,
    pub process_uuid: String,
    pub node_uuid: String,
    pub msg_type: String,
    pub event: u8,
}

impl ControlMsg {
    pub(crate) fn frames(&self) -> Vec<Vec<u8>> {
        vec![
            self.topic.clone().into_bytes(),
            self.process_uuid.clone().into_bytes(),
            self.node_uuid.clone().into_bytes(),
            self.msg_type.clone().into_bytes(),
            self.event.to_string().into_bytes(),
        ]
    }

    pub(crate) fn parse(frames: &[Vec<u8>]) -> Option<Self> {
        if frames.len() < 5 {
            return None;
        }
        let event: u8 = utf8(&frames[4])?.parse().ok()?;
        Some(Self {
            topic: utf8(&frames[0])?,
            process_uuid: utf8(&frames[1])?,
            node_uuid: utf8(&frames[2])?,
            msg_type: utf8(&frames[3])?,
            event,
        })
    }
}

/// A service request. Sent through the requester router addressed to the
/// responder's socket id; received behind the sender-identity frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RequestMsg {
    pub topic: String,
    /// Endpoint of the requester's response receiver.
    pub requester_addr: String,
    /// Socket id responses must be addressed to.
    pub response_id: String,
    pub node_uuid: String,
    pub request_uuid: String,
    pub data: Vec<u8>,
    pub req_type: String,
    pub rep_type: String,
}

impl RequestMsg {
    pub(crate) fn frames(&self) -> Vec<Vec<u8>> {
        vec![
            self.topic.clone().into_bytes(),
            self.requester_addr.clone().into_bytes(),
            self.response_id.clone().into_bytes(),
            self.node_uuid.clone().into_bytes(),
            self.request_uuid.clone().into_bytes(),
            self.data.clone(),
            self.req_type.clone().into_bytes(),
            self.rep_type.clone().into_bytes(),
        ]
    }

    /// Parse a routed request; `frames[0]` is the sender identity.
    pub(crate) fn parse(frames: &[Vec<u8>]) -> Option<Self> {
        if frames.len() < 9 {
            return None;
        }
        Some(Self {
            topic: utf8(&frames[1])?,
            requester_addr: utf8(&frames[2])?,
            response_id: utf8(&frames[3])?,
            node_uuid: utf8(&frames[4])?,
            request_uuid: utf8(&frames[5])?,
            data: frames[6].clone(),
            req_type: utf8(&frames[7])?,
            rep_type: utf8(&frames[8])?,
        })
    }
}

/// A service response. Sent through the replier router addressed to the
/// requester's response-receiver id; received behind the sender identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResponseMsg {
    pub topic: String,
    pub node_uuid: String,
    pub request_uuid: String,
    pub data: Vec<u8>,
    pub result: bool,
}

impl ResponseMsg {
    pub(crate) fn frames(&self) -> Vec<Vec<u8>> {
        let flag = if self.result { "1" } else { "0" };
        vec![
            self.topic.clone().into_bytes(),
            self.node_uuid.clone().into_bytes(),
            self.request_uuid.clone().into_bytes(),
            self.data.clone(),
            flag.as_bytes().to_vec(),
        ]
    }

    /// Parse a routed response; `frames[0]` is the sender identity.
    pub(crate) fn parse(frames: &[Vec<u8>]) -> Option<Self> {
        if frames.len() < 6 {
            return None;
        }
        Some(Self {
            topic: utf8(&frames[1])?,
            node_uuid: utf8(&frames[2])?,
            request_uuid: utf8(&frames[3])?,
            data: frames[4].clone(),
            result: utf8(&frames[5])? == "1",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_roundtrip() {
        let frames = vec![b"topic".to_vec(), Vec::new(), vec![0, 1, 2, 255]];
        let buf = encode_frames(&frames);
        assert_eq!(decode_frames(&buf).unwrap(), frames);
    }

    #[test]
    fn decode_rejects_truncation() {
        let buf = encode_frames(&[b"abcdef".to_vec()]);
        assert!(decode_frames(&buf[..buf.len() - 1]).is_none());
        assert!(decode_frames(&buf[..2]).is_none());
    }

    #[test]
    fn publish_roundtrip() {
        let msg = PublishMsg {
            topic: "@p@/chat".into(),
            sender: "tcp://10.0.0.1:4242".into(),
            data: vec![5, 0, 0, 0],
            msg_type: "weft.msgs.Int32".into(),
        };
        assert_eq!(PublishMsg::parse(&msg.frames()).unwrap(), msg);
    }

    #[test]
    fn publish_missing_frame_is_rejected() {
        let mut frames = PublishMsg {
            topic: "@p@/chat".into(),
            sender: "s".into(),
            data: vec![],
            msg_type: "t".into(),
        }
        .frames();
        frames.pop();
        assert!(PublishMsg::parse(&frames).is_none());
    }

    #[test]
    fn control_event_codes_are_decimal_ascii() {
        let msg = ControlMsg {
            topic: "@p@/chat".into(),
            process_uuid: "proc".into(),
            node_uuid: "node".into(),
            msg_type: "weft.msgs.Int32".into(),
            event: NEW_CONNECTION,
        };
        let frames = msg.frames();
        assert_eq!(frames[4], b"0");
        assert_eq!(ControlMsg::parse(&frames).unwrap(), msg);

        let end = ControlMsg { event: END_CONNECTION, ..msg };
        assert_eq!(end.frames()[4], b"1");
    }

    #[test]
    fn control_rejects_non_numeric_event() {
        let mut frames = ControlMsg {
            topic: "t".into(),
            process_uuid: "p".into(),
            node_uuid: "n".into(),
            msg_type: "m".into(),
            event: NEW_CONNECTION,
        }
        .frames();
        frames[4] = b"x".to_vec();
        assert!(ControlMsg::parse(&frames).is_none());
    }

    #[test]
    fn request_roundtrip_behind_identity() {
        let msg = RequestMsg {
            topic: "@p@/calc".into(),
            requester_addr: "tcp://10.0.0.2:5000".into(),
            response_id: "recv-id".into(),
            node_uuid: "node".into(),
            request_uuid: "req".into(),
            data: vec![1, 2, 3],
            req_type: "weft.msgs.Int32".into(),
            rep_type: "weft.msgs.Int32".into(),
        };
        let mut routed = vec![b"sender-identity".to_vec()];
        routed.extend(msg.frames());
        assert_eq!(RequestMsg::parse(&routed).unwrap(), msg);
        // Without the identity frame the message is short and discarded.
        assert!(RequestMsg::parse(&msg.frames()).is_none());
    }

    #[test]
    fn response_result_flag() {
        let msg = ResponseMsg {
            topic: "@p@/calc".into(),
            node_uuid: "node".into(),
            request_uuid: "req".into(),
            data: vec![9],
            result: true,
        };
        let mut routed = vec![b"sender".to_vec()];
        routed.extend(msg.frames());
        let parsed = ResponseMsg::parse(&routed).unwrap();
        assert!(parsed.result);

        let mut failed = msg.clone();
        failed.result = false;
        assert_eq!(failed.frames()[4], b"0");
    }
}
