// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Generic handler storage keyed topic → node UUID → handler UUID.
//!
//! The runtime serializes access through its lock; this type itself is a
//! plain map. Snapshots are cheap (`Arc` clones) so callers can drop the
//! lock before invoking anything user-supplied.

use std::collections::HashMap;
use std::sync::Arc;

/// Snapshot of all handlers for one topic: node UUID → handler UUID →
/// handler.
pub(crate) type HandlerSnapshot<H> = HashMap<String, HashMap<String, Arc<H>>>;

pub(crate) struct HandlerStorage<H: ?Sized> {
    data: HashMap<String, HandlerSnapshot<H>>,
}

impl<H: ?Sized> Default for HandlerStorage<H> {
    fn default() -> Self {
        Self {
            data: HashMap::new(),
        }
    }
}

impl<H: ?Sized> HandlerStorage<H> {
    /// Insert a handler for (topic, node, handler id), replacing any
    /// previous handler under the same key.
    pub(crate) fn add_handler(
        &mut self,
        topic: &str,
        node_uuid: &str,
        handler_uuid: &str,
        handler: Arc<H>,
    ) {
        self.data
            .entry(topic.to_string())
            .or_default()
            .entry(node_uuid.to_string())
            .or_default()
            .insert(handler_uuid.to_string(), handler);
    }

    /// Whether any handler exists for the topic.
    pub(crate) fn has_handlers_for_topic(&self, topic: &str) -> bool {
        self.data.get(topic).map(|n| !n.is_empty()).unwrap_or(false)
    }

    /// Whether the given node has a handler for the topic.
    pub(crate) fn has_handlers_for_node(&self, topic: &str, node_uuid: &str) -> bool {
        self.data
            .get(topic)
            .and_then(|nodes| nodes.get(node_uuid))
            .map(|handlers| !handlers.is_empty())
            .unwrap_or(false)
    }

    /// Snapshot every handler for the topic.
    pub(crate) fn handlers(&self, topic: &str) -> Option<HandlerSnapshot<H>> {
        self.data.get(topic).filter(|n| !n.is_empty()).cloned()
    }

    /// First handler for the topic satisfying the predicate.
    pub(crate) fn first_handler(
        &self,
        topic: &str,
        pred: impl Fn(&H) -> bool,
    ) -> Option<Arc<H>> {
        let nodes = self.data.get(topic)?;
        for handlers in nodes.values() {
            for handler in handlers.values() {
                if pred(handler) {
                    return Some(handler.clone());
                }
            }
        }
        None
    }

    /// Look up one handler by its full key.
    pub(crate) fn handler(
        &self,
        topic: &str,
        node_uuid: &str,
        handler_uuid: &str,
    ) -> Option<Arc<H>> {
        self.data
            .get(topic)?
            .get(node_uuid)?
            .get(handler_uuid)
            .cloned()
    }

    /// Remove one handler. Empty node and topic entries are pruned.
    pub(crate) fn remove_handler(
        &mut self,
        topic: &str,
        node_uuid: &str,
        handler_uuid: &str,
    ) -> bool {
        let Some(nodes) = self.data.get_mut(topic) else {
            return false;
        };
        let Some(handlers) = nodes.get_mut(node_uuid) else {
            return false;
        };
        let removed = handlers.remove(handler_uuid).is_some();
        if handlers.is_empty() {
            nodes.remove(node_uuid);
        }
        if nodes.is_empty() {
            self.data.remove(topic);
        }
        removed
    }

    /// Remove every handler a node holds for the topic.
    pub(crate) fn remove_handlers_for_node(&mut self, topic: &str, node_uuid: &str) -> bool {
        let Some(nodes) = self.data.get_mut(topic) else {
            return false;
        };
        let removed = nodes.remove(node_uuid).is_some();
        if nodes.is_empty() {
            self.data.remove(topic);
        }
        removed
    }

    /// Topics that currently have handlers.
    pub(crate) fn topics(&self) -> Vec<String> {
        self.data.keys().cloned().collect()
    }
}
