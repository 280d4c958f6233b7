// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Topic name canonicalization.
//!
//! On the wire and in the registries every topic appears fully qualified:
//! `@<partition>@<namespace>/<leaf>`. The partition scopes all topics of a
//! process; the namespace and leaf come from the node. A topic that starts
//! with `/` is absolute and ignores the node's namespace.

/// Maximum length of a fully qualified name.
const MAX_NAME_LEN: usize = 65535;

fn has_illegal_chars(name: &str) -> bool {
    name.contains(char::is_whitespace) || name.contains('@') || name.contains("//")
}

/// Whether `partition` can be used as a partition name. Empty is allowed
/// (the default partition).
pub(crate) fn is_valid_partition(partition: &str) -> bool {
    partition.is_empty() || !has_illegal_chars(partition)
}

/// Whether `ns` can be used as a namespace. Empty is allowed.
pub(crate) fn is_valid_namespace(ns: &str) -> bool {
    ns.is_empty() || (!has_illegal_chars(ns) && ns != "/")
}

/// Whether `topic` can be used as a topic leaf.
pub(crate) fn is_valid_topic(topic: &str) -> bool {
    !topic.is_empty() && !has_illegal_chars(topic) && topic != "/"
}

/// Compose the fully qualified name for a topic.
///
/// Returns `None` when any segment fails validation or the result would be
/// oversized.
pub(crate) fn fully_qualified_name(
    partition: &str,
    ns: &str,
    topic: &str,
) -> Option<String> {
    if !is_valid_partition(partition) || !is_valid_namespace(ns) || !is_valid_topic(topic) {
        return None;
    }

    // Absolute topics ignore the namespace.
    let path = if topic.starts_with('/') {
        topic.to_string()
    } else if ns.is_empty() {
        format!("/{}", topic)
    } else if ns.starts_with('/') {
        format!("{}/{}", ns.trim_end_matches('/'), topic)
    } else {
        format!("/{}/{}", ns.trim_end_matches('/'), topic)
    };

    let full = format!("@{}@{}", partition, path);
    if full.len() > MAX_NAME_LEN || full.contains("//") {
        return None;
    }
    Some(full)
}

/// Strip the `@<partition>@` prefix from a fully qualified name, yielding
/// the topic as subscribers see it in delivery metadata.
pub(crate) fn strip_partition(full: &str) -> &str {
    match full.rfind('@') {
        Some(idx) => &full[idx + 1..],
        None => full,
    }
}
