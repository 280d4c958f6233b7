// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Identifier utilities.
//!
//! Every process, node, handler and routed socket carries a UUID string.
//! Process UUIDs let peers demultiplex advertisements; handler UUIDs double
//! as request correlation ids; socket ids are the routing identities of the
//! replier and response-receiver endpoints.

use uuid::Uuid;

/// A fresh random identifier string.
pub(crate) fn fresh_uuid() -> String {
    Uuid::new_v4().to_string()
}

/// Short prefix of an identifier, for log lines.
pub(crate) fn fingerprint(uuid: &str) -> &str {
    let end = uuid.len().min(8);
    &uuid[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_uuids_are_unique() {
        let a = fresh_uuid();
        let b = fresh_uuid();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
    }

    #[test]
    fn fingerprint_truncates() {
        let id = fresh_uuid();
        assert_eq!(fingerprint(&id).len(), 8);
        assert_eq!(fingerprint("ab"), "ab");
    }
}
