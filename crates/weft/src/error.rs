// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for the transport fabric.
//!
//! The public facade reports failures as booleans or `Option`s; these types
//! carry the detail between internal layers and into the logs.

use std::fmt;
use std::io;

/// Result type used by the internal layers.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur inside the fabric.
#[derive(Debug)]
pub enum Error {
    /// A topic, partition or namespace failed validation.
    InvalidTopic(String),

    /// An operation referenced a topic or service that is not advertised.
    NotAdvertised(String),

    /// The discovery beacon is not running or rejected the operation.
    DiscoveryUnavailable,

    /// A socket operation failed.
    Transport(io::Error),

    /// A send was addressed to a peer identity the router does not know.
    UnknownPeer(String),

    /// Declared payload type does not match the handler or record.
    TypeMismatch {
        /// Type the caller supplied.
        supplied: String,
        /// Type the handler or record declares.
        declared: String,
    },

    /// A blocking request ran out of time.
    Timeout,

    /// An inbound message or payload could not be parsed.
    Parse(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTopic(name) => write!(f, "invalid topic name [{}]", name),
            Self::NotAdvertised(name) => write!(f, "topic [{}] is not advertised", name),
            Self::DiscoveryUnavailable => write!(f, "discovery service unavailable"),
            Self::Transport(e) => write!(f, "transport failure: {}", e),
            Self::UnknownPeer(id) => write!(f, "no route to peer identity [{}]", id),
            Self::TypeMismatch { supplied, declared } => {
                write!(f, "type mismatch: supplied [{}], declared [{}]", supplied, declared)
            }
            Self::Timeout => write!(f, "request timed out"),
            Self::Parse(what) => write!(f, "parse failure: {}", what),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Transport(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats() {
        let e = Error::InvalidTopic("bad topic".into());
        assert!(e.to_string().contains("bad topic"));

        let e = Error::TypeMismatch {
            supplied: "weft.msgs.Int32".into(),
            declared: "weft.msgs.Vector3d".into(),
        };
        let text = e.to_string();
        assert!(text.contains("weft.msgs.Int32"));
        assert!(text.contains("weft.msgs.Vector3d"));
    }

    #[test]
    fn io_error_source_preserved() {
        let e = Error::from(io::Error::new(io::ErrorKind::BrokenPipe, "gone"));
        assert!(std::error::Error::source(&e).is_some());
    }
}
