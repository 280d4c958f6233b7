// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The node facade.
//!
//! A [`Node`] lets an application talk to peers over two communication
//! styles: anonymous publish/subscribe on named topics and typed
//! request/response on named services. Many nodes share the per-process
//! runtime.
//!
//! ```no_run
//! use weft::{msgs::Int32, Node};
//!
//! fn main() -> weft::Result<()> {
//!     let node = Node::new()?;
//!     node.subscribe("/temp", |msg: &Int32, _info| {
//!         println!("got {}", msg.data);
//!     }, Default::default());
//!
//!     let publisher = node.advertise::<Int32>("/temp", Default::default());
//!     if let Some(publisher) = publisher {
//!         publisher.publish(&Int32::new(21));
//!     }
//!     Ok(())
//! }
//! ```

use std::collections::HashSet;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use crate::discovery::{MessagePublisher, ServicePublisher};
use crate::error::Result;
use crate::handlers::{
    AnyMessage, CallbackReqHandler, RawSubscriptionHandler, Throttle, TypedRepHandler,
    TypedSubscriptionHandler, Waiter, WaiterReqHandler,
};
use crate::ident::fresh_uuid;
use crate::msg::{Message, MessageInfo};
use crate::msgs::{Empty, Raw};
use crate::options::{
    AdvertiseMessageOptions, AdvertiseServiceOptions, NodeOptions, SubscribeOptions,
};
use crate::runtime::Runtime;
use crate::topic::fully_qualified_name;

/// A handle for publishing on an advertised topic.
///
/// Clones share the advertisement; when the last clone is dropped the
/// topic is unadvertised through discovery.
#[derive(Clone)]
pub struct Publisher {
    shared: Arc<PublisherShared>,
}

struct PublisherShared {
    runtime: Arc<Runtime>,
    record: MessagePublisher,
    throttle: Mutex<Throttle>,
    advertised: Weak<Mutex<HashSet<String>>>,
}

impl Publisher {
    /// Fully qualified topic this handle publishes on.
    pub fn topic(&self) -> &str {
        &self.shared.record.topic
    }

    /// Declared payload type name.
    pub fn msg_type(&self) -> &str {
        &self.shared.record.msg_type
    }

    /// Whether any subscriber, local or remote, is connected.
    pub fn has_connections(&self) -> bool {
        let runtime = &self.shared.runtime;
        runtime.has_remote_subscribers(&self.shared.record.topic)
            || runtime.has_local_subscribers(&self.shared.record.topic)
    }

    /// Publish a message.
    ///
    /// Local subscribers are served synchronously on this thread; remote
    /// delivery goes through the publisher socket. Returns false on a
    /// type mismatch or a transport failure. A message skipped by the
    /// publisher-side rate cap still counts as success.
    pub fn publish<T: Message>(&self, msg: &T) -> bool {
        let record = &self.shared.record;
        if T::TYPE_NAME != record.msg_type {
            log::error!(
                "publish on [{}] rejected: {}",
                record.topic,
                crate::Error::TypeMismatch {
                    supplied: T::TYPE_NAME.to_string(),
                    declared: record.msg_type.clone(),
                }
            );
            return false;
        }
        if !self.shared.throttle.lock().pass() {
            return true;
        }

        let data = msg.encode();
        let runtime = &self.shared.runtime;
        runtime.deliver_local(&record.topic, T::TYPE_NAME, msg, &data);
        if runtime.has_remote_subscribers(&record.topic) {
            return runtime.publish(&record.topic, &data, T::TYPE_NAME);
        }
        true
    }
}

impl Drop for PublisherShared {
    fn drop(&mut self) {
        self.runtime
            .unadvertise_msg(&self.record.topic, &self.record.node_uuid);
        if let Some(advertised) = self.advertised.upgrade() {
            advertised.lock().remove(&self.record.topic);
        }
    }
}

/// A client of the transport fabric.
pub struct Node {
    runtime: Arc<Runtime>,
    node_uuid: String,
    options: NodeOptions,
    subscribed: Mutex<HashSet<String>>,
    advertised_topics: Arc<Mutex<HashSet<String>>>,
    advertised_srvs: Mutex<HashSet<String>>,
}

impl Node {
    /// Create a node with default options.
    pub fn new() -> Result<Self> {
        Self::with_options(NodeOptions::default())
    }

    /// Create a node with explicit options.
    pub fn with_options(options: NodeOptions) -> Result<Self> {
        let runtime = Runtime::instance()?;
        Ok(Self::attach(runtime, options))
    }

    pub(crate) fn attach(runtime: Arc<Runtime>, options: NodeOptions) -> Self {
        Self {
            runtime,
            node_uuid: fresh_uuid(),
            options,
            subscribed: Mutex::new(HashSet::new()),
            advertised_topics: Arc::new(Mutex::new(HashSet::new())),
            advertised_srvs: Mutex::new(HashSet::new()),
        }
    }

    /// Options this node was created with.
    pub fn options(&self) -> &NodeOptions {
        &self.options
    }

    fn qualify(&self, topic: &str) -> Option<String> {
        fully_qualified_name(self.options.partition(), self.options.namespace(), topic)
    }

    // ===== Pub/sub =====

    /// Advertise a topic. Returns `None` when the topic is invalid,
    /// already advertised by this node, or discovery is down.
    pub fn advertise<T: Message>(
        &self,
        topic: &str,
        opts: AdvertiseMessageOptions,
    ) -> Option<Publisher> {
        let Some(full) = self.qualify(topic) else {
            log::error!("topic [{}] is not valid", topic);
            return None;
        };
        if !self.advertised_topics.lock().insert(full.clone()) {
            log::error!("topic [{}] is already advertised by this node", topic);
            return None;
        }

        let record = MessagePublisher {
            topic: full.clone(),
            addr: self.runtime.address().to_string(),
            ctrl: self.runtime.control_address().to_string(),
            process_uuid: self.runtime.process_uuid().to_string(),
            node_uuid: self.node_uuid.clone(),
            msg_type: T::TYPE_NAME.to_string(),
            opts: opts.clone(),
        };
        if !self.runtime.advertise_msg(record.clone()) {
            log::error!("error advertising topic [{}]: discovery not running", topic);
            self.advertised_topics.lock().remove(&full);
            return None;
        }

        Some(Publisher {
            shared: Arc::new(PublisherShared {
                runtime: self.runtime.clone(),
                record,
                throttle: Mutex::new(Throttle::new(opts.msgs_per_sec)),
                advertised: Arc::downgrade(&self.advertised_topics),
            }),
        })
    }

    /// Subscribe to a topic with a typed callback. The handler only sees
    /// messages whose declared type matches `T`.
    pub fn subscribe<T, F>(&self, topic: &str, cb: F, opts: SubscribeOptions) -> bool
    where
        T: Message,
        F: Fn(&T, &MessageInfo) + Send + Sync + 'static,
    {
        let Some(full) = self.qualify(topic) else {
            log::error!("topic [{}] is not valid", topic);
            return false;
        };
        let handler = Arc::new(TypedSubscriptionHandler::<T>::new(
            self.node_uuid.clone(),
            fresh_uuid(),
            opts.msgs_per_sec,
            Box::new(cb),
        ));
        self.subscribed.lock().insert(full.clone());
        self.runtime.subscribe(&full, handler)
    }

    /// Subscribe with the wildcard type: the callback receives every
    /// payload type published on the topic, undecoded.
    pub fn subscribe_any<F>(&self, topic: &str, cb: F, opts: SubscribeOptions) -> bool
    where
        F: Fn(&Raw, &MessageInfo) + Send + Sync + 'static,
    {
        let Some(full) = self.qualify(topic) else {
            log::error!("topic [{}] is not valid", topic);
            return false;
        };
        let handler = Arc::new(RawSubscriptionHandler::new(
            self.node_uuid.clone(),
            fresh_uuid(),
            opts.msgs_per_sec,
            Box::new(cb),
        ));
        self.subscribed.lock().insert(full.clone());
        self.runtime.subscribe(&full, handler)
    }

    /// Drop every subscription this node holds on the topic.
    pub fn unsubscribe(&self, topic: &str) -> bool {
        let Some(full) = self.qualify(topic) else {
            log::error!("topic [{}] is not valid", topic);
            return false;
        };
        self.subscribed.lock().remove(&full);
        self.runtime.unsubscribe(&full, &self.node_uuid)
    }

    // ===== Services =====

    /// Advertise a service. The callback fills in the response and
    /// returns the service result flag. A node holds at most one replier
    /// per topic; re-advertising replaces it.
    pub fn advertise_service<Req, Rep, F>(
        &self,
        topic: &str,
        cb: F,
        opts: AdvertiseServiceOptions,
    ) -> bool
    where
        Req: Message,
        Rep: Message,
        F: Fn(&Req, &mut Rep) -> bool + Send + Sync + 'static,
    {
        let Some(full) = self.qualify(topic) else {
            log::error!("service [{}] is not valid", topic);
            return false;
        };
        let handler = Arc::new(TypedRepHandler::<Req, Rep>::new(
            self.node_uuid.clone(),
            fresh_uuid(),
            Box::new(cb),
        ));
        let record = ServicePublisher {
            topic: full.clone(),
            addr: self.runtime.replier_address().to_string(),
            socket_id: self.runtime.replier_id().to_string(),
            process_uuid: self.runtime.process_uuid().to_string(),
            node_uuid: self.node_uuid.clone(),
            req_type: Req::TYPE_NAME.to_string(),
            rep_type: Rep::TYPE_NAME.to_string(),
            opts,
        };
        if !self.runtime.advertise_service(&full, handler, record) {
            return false;
        }
        self.advertised_srvs.lock().insert(full);
        true
    }

    /// Withdraw this node's service on the topic.
    pub fn unadvertise_service(&self, topic: &str) -> bool {
        let Some(full) = self.qualify(topic) else {
            log::error!("service [{}] is not valid", topic);
            return false;
        };
        self.advertised_srvs.lock().remove(&full);
        self.runtime.unadvertise_service(&full, &self.node_uuid)
    }

    /// Request a service without blocking. The callback runs when the
    /// response arrives: inline for a same-process replier, on the
    /// reception worker otherwise. Returns true when the request was
    /// successfully issued.
    pub fn request_async<Req, Rep, F>(&self, topic: &str, req: &Req, cb: F) -> bool
    where
        Req: Message,
        Rep: Message,
        F: Fn(&Rep, bool) + Send + Sync + 'static,
    {
        let Some(full) = self.qualify(topic) else {
            log::error!("service [{}] is not valid", topic);
            return false;
        };

        // A responder in this process short-circuits the wire.
        if let Some(replier) =
            self.runtime
                .first_local_replier(&full, Req::TYPE_NAME, Rep::TYPE_NAME)
        {
            let any: &AnyMessage = req;
            return match replier.run_local_callback(any) {
                Some((rep, result)) => match rep.downcast_ref::<Rep>() {
                    Some(rep) => {
                        cb(rep, result);
                        true
                    }
                    None => false,
                },
                None => false,
            };
        }

        let handler = Arc::new(CallbackReqHandler::<Rep>::new::<Req>(
            self.node_uuid.clone(),
            fresh_uuid(),
            req,
            Box::new(cb),
        ));
        self.runtime.start_remote_request(&full, handler)
    }

    /// Request a service and block until the response arrives or
    /// `timeout_ms` elapses.
    ///
    /// `None` means the topic failed validation, discovery was down, or
    /// the call timed out. `Some((rep, result))` means the round trip
    /// completed; `result` is the replier's own outcome, and an
    /// unparseable response payload yields `Some((default, false))`.
    pub fn request<Req, Rep>(
        &self,
        topic: &str,
        req: &Req,
        timeout_ms: u64,
    ) -> Option<(Rep, bool)>
    where
        Req: Message,
        Rep: Message,
    {
        let Some(full) = self.qualify(topic) else {
            log::error!("service [{}] is not valid", topic);
            return None;
        };

        if let Some(replier) =
            self.runtime
                .first_local_replier(&full, Req::TYPE_NAME, Rep::TYPE_NAME)
        {
            let any: &AnyMessage = req;
            let (rep, result) = replier.run_local_callback(any)?;
            return rep.downcast_ref::<Rep>().map(|rep| (rep.clone(), result));
        }

        let waiter = Waiter::new();
        let request_uuid = fresh_uuid();
        let handler = Arc::new(WaiterReqHandler::new::<Req, Rep>(
            self.node_uuid.clone(),
            request_uuid.clone(),
            req,
            waiter.clone(),
        ));
        if !self.runtime.start_remote_request(&full, handler) {
            self.runtime
                .remove_request(&full, &self.node_uuid, &request_uuid);
            return None;
        }

        match waiter.wait_timeout(Duration::from_millis(timeout_ms)) {
            Some((data, result)) => {
                if !result {
                    return Some((Rep::default(), false));
                }
                match Rep::decode(&data) {
                    Ok(rep) => Some((rep, true)),
                    Err(e) => {
                        log::error!("error parsing the response on [{}]: {}", topic, e);
                        Some((Rep::default(), false))
                    }
                }
            }
            None => {
                // Timed out (or torn down): forget the pending request so
                // the table does not grow without bound.
                log::debug!("request on [{}]: {}", topic, crate::Error::Timeout);
                self.runtime
                    .remove_request(&full, &self.node_uuid, &request_uuid);
                None
            }
        }
    }

    /// Fire-and-forget request: the responder runs the callback and no
    /// response is ever sent.
    pub fn request_oneway<Req: Message>(&self, topic: &str, req: &Req) -> bool {
        self.request_async::<Req, Empty, _>(topic, req, |_, _| {})
    }

    // ===== Introspection =====

    /// Topics this node advertises.
    pub fn advertised_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> =
            self.advertised_topics.lock().iter().cloned().collect();
        topics.sort();
        topics
    }

    /// Topics this node subscribes to, whether or not a publisher is
    /// known yet.
    pub fn subscribed_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.subscribed.lock().iter().cloned().collect();
        topics.sort();
        topics
    }

    /// Services this node advertises.
    pub fn advertised_services(&self) -> Vec<String> {
        let mut services: Vec<String> =
            self.advertised_srvs.lock().iter().cloned().collect();
        services.sort();
        services
    }

    /// Every topic currently advertised on the network. May block up to
    /// one discovery heartbeat while the beacon warms up.
    pub fn topic_list(&self) -> Vec<String> {
        self.runtime.topic_list()
    }

    /// Every service currently advertised on the network. May block up
    /// to one discovery heartbeat while the beacon warms up.
    pub fn service_list(&self) -> Vec<String> {
        self.runtime.service_list()
    }

    /// Known publishers of a topic.
    pub fn topic_info(&self, topic: &str) -> Vec<MessagePublisher> {
        match self.qualify(topic) {
            Some(full) => self.runtime.topic_info(&full),
            None => Vec::new(),
        }
    }

    /// Known responders of a service.
    pub fn service_info(&self, topic: &str) -> Vec<ServicePublisher> {
        match self.qualify(topic) {
            Some(full) => self.runtime.service_info(&full),
            None => Vec::new(),
        }
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        let subscribed: Vec<String> = self.subscribed.lock().drain().collect();
        for topic in subscribed {
            self.runtime.unsubscribe(&topic, &self.node_uuid);
        }
        let services: Vec<String> = self.advertised_srvs.lock().drain().collect();
        for topic in services {
            self.runtime.unadvertise_service(&topic, &self.node_uuid);
        }
    }
}
