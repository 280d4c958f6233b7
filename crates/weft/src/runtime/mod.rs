// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The per-process shared runtime.
//!
//! One runtime per process owns the socket set, the handler registries,
//! the two discovery beacons and the reception worker. Nodes hold a
//! shared reference to it; the singleton is created on first node
//! construction and torn down when the last node releases it.
//!
//! A single re-entrant lock serializes the registries, the connection
//! books and every socket send. Discovery callbacks re-enter the same
//! paths from the caller's thread, which is why the lock must be
//! re-entrant. User callbacks are never invoked while the lock is held:
//! every dispatch site snapshots under the lock, releases it, then runs
//! the callbacks.

mod worker;


use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use crossbeam_channel::unbounded;
use parking_lot::{Mutex, ReentrantMutex};

use crate::discovery::{
    Discovery, MessagePublisher, ServicePublisher, MSG_DISCOVERY_PORT, SRV_DISCOVERY_PORT,
};
use crate::handlers::{
    AnyMessage, HandlerStorage, RepHandler, ReqHandler, SubscriptionHandler,
};
use crate::ident::{fingerprint, fresh_uuid};
use crate::msg::{MessageInfo, GENERIC_MESSAGE_TYPE};
use crate::msgs::{Empty, Raw};
use crate::topic::strip_partition;
use crate::transport::{
    send_control, AuthGate, ControlSocket, FanOutSocket, RouterSocket, SocketRole, SubSocket,
};
use crate::wire::{
    ControlMsg, PublishMsg, RequestMsg, ResponseMsg, END_CONNECTION, NEW_CONNECTION,
};
use crate::{logging, Message};

/// Book of publisher records, used for both the data connections we hold
/// and the remote subscribers registered with us.
#[derive(Default)]
pub(crate) struct PublisherBook {
    records: Vec<MessagePublisher>,
}

impl PublisherBook {
    fn add(&mut self, record: MessagePublisher) {
        self.records.retain(|r| {
            r.topic != record.topic
                || r.process_uuid != record.process_uuid
                || r.node_uuid != record.node_uuid
        });
        self.records.push(record);
    }

    fn has_topic(&self, topic: &str) -> bool {
        self.records.iter().any(|r| r.topic == topic)
    }

    fn get(&self, topic: &str, process_uuid: &str, node_uuid: &str) -> Option<&MessagePublisher> {
        self.records.iter().find(|r| {
            r.topic == topic && r.process_uuid == process_uuid && r.node_uuid == node_uuid
        })
    }

    fn for_topic(&self, topic: &str) -> Vec<MessagePublisher> {
        self.records
            .iter()
            .filter(|r| r.topic == topic)
            .cloned()
            .collect()
    }

    fn del_by_node(&mut self, topic: &str, process_uuid: &str, node_uuid: &str) -> bool {
        let before = self.records.len();
        self.records.retain(|r| {
            r.topic != topic || r.process_uuid != process_uuid || r.node_uuid != node_uuid
        });
        self.records.len() < before
    }

    fn del_by_proc(&mut self, process_uuid: &str) {
        self.records.retain(|r| r.process_uuid != process_uuid);
    }
}

/// Mutable runtime state behind the re-entrant lock.
struct State {
    local_subscriptions: HandlerStorage<dyn SubscriptionHandler>,
    repliers: HandlerStorage<dyn RepHandler>,
    requests: HandlerStorage<dyn ReqHandler>,
    /// Remote subscribers registered through the control channel.
    remote_subscribers: PublisherBook,
    /// Remote publishers our subscriber socket is connected to.
    connections: PublisherBook,
    publisher: FanOutSocket,
    subscriber: SubSocket,
    replier: RouterSocket,
    requester: RouterSocket,
    #[allow(dead_code)]
    response_receiver: RouterSocket,
}

/// The shared runtime.
pub(crate) struct Runtime {
    process_uuid: String,
    my_address: String,
    my_control_address: String,
    my_replier_address: String,
    my_requester_address: String,
    replier_id: String,
    response_receiver_id: String,
    msg_discovery: Discovery<MessagePublisher>,
    srv_discovery: Discovery<ServicePublisher>,
    state: ReentrantMutex<RefCell<State>>,
    exit: Arc<AtomicBool>,
    worker: Mutex<Option<std::thread::JoinHandle<()>>>,
}

static INSTANCE: OnceLock<Mutex<Weak<Runtime>>> = OnceLock::new();

/// Pick the host interface address the endpoints are bound to.
fn host_addr() -> IpAddr {
    let probe = || -> io::Result<IpAddr> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect("8.8.8.8:53")?;
        Ok(socket.local_addr()?.ip())
    };
    match probe() {
        Ok(ip) if !ip.is_loopback() => ip,
        _ => IpAddr::V4(Ipv4Addr::LOCALHOST),
    }
}

impl Runtime {
    /// The process-wide runtime, created on first use and rebuilt if the
    /// previous one was fully released.
    pub(crate) fn instance() -> io::Result<Arc<Runtime>> {
        let slot = INSTANCE.get_or_init(|| Mutex::new(Weak::new()));
        let mut weak = slot.lock();
        if let Some(runtime) = weak.upgrade() {
            return Ok(runtime);
        }
        let runtime = Self::create(MSG_DISCOVERY_PORT, SRV_DISCOVERY_PORT)?;
        *weak = Arc::downgrade(&runtime);
        Ok(runtime)
    }

    /// Build a runtime with explicit discovery ports.
    pub(crate) fn create(msg_port: u16, srv_port: u16) -> io::Result<Arc<Runtime>> {
        logging::init();

        let process_uuid = fresh_uuid();
        let host = host_addr();
        let exit = Arc::new(AtomicBool::new(false));
        let (tx, rx) = unbounded();

        let credentials = AuthGate::credentials_from_env();
        let gate = credentials
            .clone()
            .map(|(username, password)| AuthGate::start(username, password));

        let publisher = FanOutSocket::bind(host, gate, exit.clone())?;
        let subscriber = SubSocket::new(credentials, tx.clone(), exit.clone());
        let control = ControlSocket::bind(host, tx.clone(), exit.clone())?;

        let replier_id = fresh_uuid();
        let response_receiver_id = fresh_uuid();
        let replier = RouterSocket::bind(
            host,
            replier_id.clone(),
            SocketRole::Request,
            tx.clone(),
            exit.clone(),
        )?;
        let response_receiver = RouterSocket::bind(
            host,
            response_receiver_id.clone(),
            SocketRole::Response,
            tx.clone(),
            exit.clone(),
        )?;
        let requester = RouterSocket::connect_only(tx, exit.clone());

        let my_address = publisher.endpoint().to_string();
        let my_control_address = control.endpoint().to_string();
        let my_replier_address = replier.endpoint().to_string();
        let my_requester_address = response_receiver.endpoint().to_string();

        let msg_discovery = Discovery::new(&process_uuid, host, msg_port);
        let srv_discovery = Discovery::new(&process_uuid, host, srv_port);

        let runtime = Arc::new(Runtime {
            process_uuid,
            my_address,
            my_control_address,
            my_replier_address,
            my_requester_address,
            replier_id,
            response_receiver_id,
            msg_discovery,
            srv_discovery,
            state: ReentrantMutex::new(RefCell::new(State {
                local_subscriptions: HandlerStorage::default(),
                repliers: HandlerStorage::default(),
                requests: HandlerStorage::default(),
                remote_subscribers: PublisherBook::default(),
                connections: PublisherBook::default(),
                publisher,
                subscriber,
                replier,
                requester,
                response_receiver,
            })),
            exit: exit.clone(),
            worker: Mutex::new(None),
        });

        log::debug!(
            "runtime up: process [{}], data [{}], control [{}], replier [{}], responses [{}]",
            fingerprint(&runtime.process_uuid),
            runtime.my_address,
            runtime.my_control_address,
            runtime.my_replier_address,
            runtime.my_requester_address,
        );

        let weak = Arc::downgrade(&runtime);
        let handle = std::thread::Builder::new()
            .name("weft-reception".to_string())
            .spawn(move || worker::run_reception_task(weak, rx, exit))?;
        *runtime.worker.lock() = Some(handle);

        let weak = Arc::downgrade(&runtime);
        runtime.msg_discovery.set_connections_cb(move |record| {
            if let Some(runtime) = weak.upgrade() {
                runtime.on_new_connection(record);
            }
        });
        let weak = Arc::downgrade(&runtime);
        runtime.msg_discovery.set_disconnections_cb(move |record| {
            if let Some(runtime) = weak.upgrade() {
                runtime.on_new_disconnection(record);
            }
        });
        let weak = Arc::downgrade(&runtime);
        runtime.srv_discovery.set_connections_cb(move |record| {
            if let Some(runtime) = weak.upgrade() {
                runtime.on_new_srv_connection(record);
            }
        });
        let weak = Arc::downgrade(&runtime);
        runtime.srv_discovery.set_disconnections_cb(move |record| {
            if let Some(runtime) = weak.upgrade() {
                runtime.on_new_srv_disconnection(record);
            }
        });

        runtime.msg_discovery.start();
        runtime.srv_discovery.start();

        Ok(runtime)
    }

    pub(crate) fn process_uuid(&self) -> &str {
        &self.process_uuid
    }

    pub(crate) fn address(&self) -> &str {
        &self.my_address
    }

    pub(crate) fn control_address(&self) -> &str {
        &self.my_control_address
    }

    pub(crate) fn replier_address(&self) -> &str {
        &self.my_replier_address
    }

    pub(crate) fn replier_id(&self) -> &str {
        &self.replier_id
    }

    // ===== Pub/sub =====

    /// Ship a serialized message to every connected remote subscriber.
    pub(crate) fn publish(&self, topic: &str, data: &[u8], msg_type: &str) -> bool {
        let msg = PublishMsg {
            topic: topic.to_string(),
            sender: self.my_address.clone(),
            data: data.to_vec(),
            msg_type: msg_type.to_string(),
        };
        let guard = self.state.lock();
        let state = guard.borrow();
        match state.publisher.send(&msg.frames()) {
            Ok(()) => true,
            Err(e) => {
                log::error!("publish on [{}] failed: {}", topic, e);
                false
            }
        }
    }

    /// Deliver a typed message to every matching local handler,
    /// synchronously on the caller's thread. `data` carries the
    /// serialized form for wildcard handlers.
    pub(crate) fn deliver_local(
        &self,
        topic: &str,
        msg_type: &str,
        msg: &AnyMessage,
        data: &[u8],
    ) {
        let handlers = {
            let guard = self.state.lock();
            let state = guard.borrow();
            state.local_subscriptions.handlers(topic)
        };
        let Some(handlers) = handlers else {
            return;
        };
        let info = MessageInfo::new(strip_partition(topic).to_string());
        let mut raw: Option<Arc<AnyMessage>> = None;
        for node in handlers.values() {
            for handler in node.values() {
                if handler.type_name() == msg_type {
                    handler.run_local(msg, &info);
                } else if handler.type_name() == GENERIC_MESSAGE_TYPE {
                    let raw = raw.get_or_insert_with(|| {
                        Arc::new(Raw {
                            msg_type: msg_type.to_string(),
                            data: data.to_vec(),
                        }) as Arc<AnyMessage>
                    });
                    handler.run_local(raw.as_ref(), &info);
                }
            }
        }
    }

    /// Whether remote subscribers are registered for the topic.
    pub(crate) fn has_remote_subscribers(&self, topic: &str) -> bool {
        let guard = self.state.lock();
        let state = guard.borrow();
        state.remote_subscribers.has_topic(topic)
    }

    /// Whether any local handler subscribes to the topic.
    pub(crate) fn has_local_subscribers(&self, topic: &str) -> bool {
        let guard = self.state.lock();
        let state = guard.borrow();
        state.local_subscriptions.has_handlers_for_topic(topic)
    }

    /// Register a subscription handler, then look for publishers.
    pub(crate) fn subscribe(&self, topic: &str, handler: Arc<dyn SubscriptionHandler>) -> bool {
        let node_uuid = handler.node_uuid().to_string();
        let handler_uuid = handler.handler_uuid().to_string();
        let guard = self.state.lock();
        {
            let mut state = guard.borrow_mut();
            state
                .local_subscriptions
                .add_handler(topic, &node_uuid, &handler_uuid, handler);
        }
        // Known publishers replay through the connection callback inline.
        self.msg_discovery.discover(topic)
    }

    /// Drop every subscription a node holds on the topic and tell the
    /// publishers we were registered with.
    pub(crate) fn unsubscribe(&self, topic: &str, node_uuid: &str) -> bool {
        let guard = self.state.lock();
        let removed = {
            let mut state = guard.borrow_mut();
            state
                .local_subscriptions
                .remove_handlers_for_node(topic, node_uuid)
        };
        let topic_now_silent = {
            let state = guard.borrow();
            !state.local_subscriptions.has_handlers_for_topic(topic)
        };
        if topic_now_silent {
            let state = guard.borrow();
            state.subscriber.remove_filter(topic);
        }
        let connections = {
            let state = guard.borrow();
            state.connections.for_topic(topic)
        };
        for connection in &connections {
            let msg = ControlMsg {
                topic: topic.to_string(),
                process_uuid: self.process_uuid.clone(),
                node_uuid: node_uuid.to_string(),
                msg_type: connection.msg_type.clone(),
                event: END_CONNECTION,
            };
            if let Err(e) = send_control(&connection.ctrl, &[msg.frames()], &self.exit) {
                log::debug!("end-connection to [{}] failed: {}", connection.ctrl, e);
            }
        }
        if !removed {
            log::debug!("unsubscribe: {}", crate::Error::NotAdvertised(topic.to_string()));
        }
        removed
    }

    /// Register a message publisher with discovery.
    pub(crate) fn advertise_msg(&self, record: MessagePublisher) -> bool {
        self.msg_discovery.advertise(record)
    }

    /// Withdraw a node's message advertisement.
    pub(crate) fn unadvertise_msg(&self, topic: &str, node_uuid: &str) -> bool {
        self.msg_discovery.unadvertise(topic, node_uuid)
    }

    // ===== Services =====

    /// Register a replier and advertise it.
    pub(crate) fn advertise_service(
        &self,
        topic: &str,
        handler: Arc<dyn RepHandler>,
        record: ServicePublisher,
    ) -> bool {
        let node_uuid = handler.node_uuid().to_string();
        let handler_uuid = handler.handler_uuid().to_string();
        {
            let guard = self.state.lock();
            let mut state = guard.borrow_mut();
            // One replier per (topic, node): re-advertising replaces it.
            state.repliers.remove_handlers_for_node(topic, &node_uuid);
            state
                .repliers
                .add_handler(topic, &node_uuid, &handler_uuid, handler);
        }
        if !self.srv_discovery.advertise(record) {
            log::error!(
                "error advertising service [{}]: discovery not running",
                topic
            );
            return false;
        }
        true
    }

    /// Remove a node's repliers and withdraw the advertisement.
    pub(crate) fn unadvertise_service(&self, topic: &str, node_uuid: &str) -> bool {
        {
            let guard = self.state.lock();
            let mut state = guard.borrow_mut();
            state.repliers.remove_handlers_for_node(topic, node_uuid);
        }
        self.srv_discovery.unadvertise(topic, node_uuid)
    }

    /// First local replier matching the type pair.
    pub(crate) fn first_local_replier(
        &self,
        topic: &str,
        req_type: &str,
        rep_type: &str,
    ) -> Option<Arc<dyn RepHandler>> {
        let guard = self.state.lock();
        let state = guard.borrow();
        state.repliers.first_handler(topic, |h| {
            h.req_type_name() == req_type && h.rep_type_name() == rep_type
        })
    }

    /// Park a pending request and either send it to a known responder or
    /// ask discovery for one. Returns false when discovery is down.
    pub(crate) fn start_remote_request(
        &self,
        topic: &str,
        handler: Arc<dyn ReqHandler>,
    ) -> bool {
        let req_type = handler.req_type_name();
        let rep_type = handler.rep_type_name();
        let node_uuid = handler.node_uuid().to_string();
        let handler_uuid = handler.handler_uuid().to_string();

        let guard = self.state.lock();
        {
            let mut state = guard.borrow_mut();
            state
                .requests
                .add_handler(topic, &node_uuid, &handler_uuid, handler);
        }

        if !self.srv_discovery.publishers(topic).is_empty() {
            self.send_pending_remote_reqs(topic, req_type, rep_type);
            true
        } else if self.srv_discovery.discover(topic) {
            true
        } else {
            log::error!(
                "error requesting [{}]: {}",
                topic,
                crate::Error::DiscoveryUnavailable
            );
            false
        }
    }

    /// Drop a pending request (timeout or failed start).
    pub(crate) fn remove_request(&self, topic: &str, node_uuid: &str, request_uuid: &str) {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        state.requests.remove_handler(topic, node_uuid, request_uuid);
    }

    /// Send every pending request for the topic whose type pair matches a
    /// known responder and whose wire send has not happened yet.
    pub(crate) fn send_pending_remote_reqs(
        &self,
        topic: &str,
        req_type: &str,
        rep_type: &str,
    ) {
        let addresses = self.srv_discovery.publishers(topic);
        if addresses.is_empty() {
            return;
        }
        let responder = addresses.values().flatten().find(|record| {
            record.req_type == req_type && record.rep_type == rep_type
        });
        let Some(responder) = responder else {
            return;
        };
        let responder_addr = responder.addr.clone();
        let responder_id = responder.socket_id.clone();
        log::debug!("responder for [{}] at [{}]", topic, responder_addr);

        let guard = self.state.lock();
        {
            let mut state = guard.borrow_mut();
            if let Err(e) = state.requester.connect(&responder_addr) {
                log::debug!("connect to responder [{}] failed: {}", responder_addr, e);
            }
        }

        let handlers = {
            let state = guard.borrow();
            state.requests.handlers(topic)
        };
        let Some(handlers) = handlers else {
            return;
        };
        for node in handlers.values() {
            for handler in node.values() {
                if handler.requested() {
                    continue;
                }
                if handler.req_type_name() != req_type || handler.rep_type_name() != rep_type
                {
                    continue;
                }
                handler.mark_requested();
                let Some(payload) = handler.payload() else {
                    continue;
                };
                let msg = RequestMsg {
                    topic: topic.to_string(),
                    requester_addr: self.my_requester_address.clone(),
                    response_id: self.response_receiver_id.clone(),
                    node_uuid: handler.node_uuid().to_string(),
                    request_uuid: handler.handler_uuid().to_string(),
                    data: payload,
                    req_type: req_type.to_string(),
                    rep_type: rep_type.to_string(),
                };
                let sent = {
                    let state = guard.borrow();
                    state.requester.send_to(&responder_id, &msg.frames())
                };
                if let Err(e) = sent {
                    log::debug!("request send on [{}] failed: {}", topic, e);
                }
                // One-way requests get no response; forget the handler.
                if rep_type == Empty::TYPE_NAME {
                    let mut state = guard.borrow_mut();
                    state.requests.remove_handler(
                        topic,
                        &msg.node_uuid,
                        &msg.request_uuid,
                    );
                }
            }
        }
    }

    // ===== Inbound dispatch (reception worker) =====

    pub(crate) fn recv_msg_update(&self, frames: &[Vec<u8>]) {
        let Some(msg) = PublishMsg::parse(frames) else {
            log::error!("{}", crate::Error::Parse("publication".to_string()));
            return;
        };
        let handlers = {
            let guard = self.state.lock();
            let state = guard.borrow();
            state.local_subscriptions.handlers(&msg.topic)
        };
        let Some(handlers) = handlers else {
            return;
        };
        let info = MessageInfo::new(strip_partition(&msg.topic).to_string());
        // Decode once per handler type family.
        let mut decoded: HashMap<&str, Option<Arc<AnyMessage>>> = HashMap::new();
        for node in handlers.values() {
            for handler in node.values() {
                let declared = handler.type_name();
                if declared != msg.msg_type && declared != GENERIC_MESSAGE_TYPE {
                    continue;
                }
                let value = decoded
                    .entry(declared)
                    .or_insert_with(|| handler.create_msg(&msg.data, &msg.msg_type));
                if let Some(value) = value {
                    handler.run_local(value.as_ref(), &info);
                }
            }
        }
    }

    pub(crate) fn recv_control_update(&self, frames: &[Vec<u8>]) {
        let Some(msg) = ControlMsg::parse(frames) else {
            log::error!("malformed control message dropped");
            return;
        };
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        match msg.event {
            NEW_CONNECTION => {
                log::debug!(
                    "remote subscriber on [{}] from process [{}]",
                    msg.topic,
                    fingerprint(&msg.process_uuid)
                );
                state.remote_subscribers.add(MessagePublisher {
                    topic: msg.topic,
                    addr: String::new(),
                    ctrl: String::new(),
                    process_uuid: msg.process_uuid,
                    node_uuid: msg.node_uuid,
                    msg_type: msg.msg_type,
                    opts: Default::default(),
                });
            }
            END_CONNECTION => {
                state.remote_subscribers.del_by_node(
                    &msg.topic,
                    &msg.process_uuid,
                    &msg.node_uuid,
                );
            }
            other => log::debug!("unknown control event [{}] dropped", other),
        }
    }

    pub(crate) fn recv_srv_request(&self, frames: &[Vec<u8>]) {
        let Some(req) = RequestMsg::parse(frames) else {
            log::error!("malformed service request dropped");
            return;
        };
        let handler = {
            let guard = self.state.lock();
            let state = guard.borrow();
            state.repliers.first_handler(&req.topic, |h| {
                h.req_type_name() == req.req_type && h.rep_type_name() == req.rep_type
            })
        };
        let Some(handler) = handler else {
            log::debug!(
                "no replier for [{}] with types [{}]/[{}]",
                req.topic,
                req.req_type,
                req.rep_type
            );
            return;
        };

        // The service callback runs without the lock.
        let Some((rep_data, result)) = handler.run_callback(&req.data) else {
            log::error!("undecodable request on [{}] dropped", req.topic);
            return;
        };

        // One-way: no response at all.
        if req.rep_type == Empty::TYPE_NAME {
            return;
        }

        let response = ResponseMsg {
            topic: req.topic.clone(),
            node_uuid: req.node_uuid,
            request_uuid: req.request_uuid,
            data: rep_data,
            result,
        };
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        if let Err(e) = state.replier.connect(&req.requester_addr) {
            log::debug!("connect to requester [{}] failed: {}", req.requester_addr, e);
        }
        if let Err(e) = state.replier.send_to(&req.response_id, &response.frames()) {
            log::debug!("response on [{}] failed: {}", req.topic, e);
        }
    }

    pub(crate) fn recv_srv_response(&self, frames: &[Vec<u8>]) {
        let Some(rep) = ResponseMsg::parse(frames) else {
            log::error!("malformed service response dropped");
            return;
        };
        let handler = {
            let guard = self.state.lock();
            let state = guard.borrow();
            state
                .requests
                .handler(&rep.topic, &rep.node_uuid, &rep.request_uuid)
        };
        let Some(handler) = handler else {
            log::debug!(
                "response on [{}] with no pending request dropped",
                rep.topic
            );
            return;
        };

        // Completion runs without the lock; it may invoke a user callback
        // or unpark a blocked caller.
        handler.notify(&rep.data, rep.result);

        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        if !state
            .requests
            .remove_handler(&rep.topic, &rep.node_uuid, &rep.request_uuid)
        {
            log::error!("error removing request handler for [{}]", rep.topic);
        }
    }

    // ===== Discovery events =====

    /// A remote message publisher appeared.
    fn on_new_connection(&self, record: &MessagePublisher) {
        if record.process_uuid == self.process_uuid {
            return;
        }
        let guard = self.state.lock();
        let interested = {
            let state = guard.borrow();
            state
                .local_subscriptions
                .has_handlers_for_topic(&record.topic)
        };
        if !interested {
            return;
        }

        {
            let mut state = guard.borrow_mut();
            state.subscriber.add_filter(&record.topic);
            if let Err(e) = state.subscriber.connect(&record.addr) {
                // The remote node might already be gone.
                log::debug!("connect to publisher [{}] failed: {}", record.addr, e);
                return;
            }
            state.connections.add(record.clone());
        }

        // Register with the publisher's control endpoint, one message per
        // matching local handler.
        let handlers = {
            let state = guard.borrow();
            state.local_subscriptions.handlers(&record.topic)
        };
        let Some(handlers) = handlers else {
            return;
        };
        let mut messages = Vec::new();
        for node in handlers.values() {
            for handler in node.values() {
                if handler.type_name() != GENERIC_MESSAGE_TYPE
                    && handler.type_name() != record.msg_type
                {
                    continue;
                }
                messages.push(
                    ControlMsg {
                        topic: record.topic.clone(),
                        process_uuid: self.process_uuid.clone(),
                        node_uuid: handler.node_uuid().to_string(),
                        msg_type: record.msg_type.clone(),
                        event: NEW_CONNECTION,
                    }
                    .frames(),
                );
            }
        }
        if messages.is_empty() {
            return;
        }
        if let Err(e) = send_control(&record.ctrl, &messages, &self.exit) {
            log::debug!("control register at [{}] failed: {}", record.ctrl, e);
        }
    }

    /// A remote message publisher (or a whole process) went away.
    fn on_new_disconnection(&self, record: &MessagePublisher) {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        if !record.topic.is_empty() && !record.node_uuid.is_empty() {
            state.remote_subscribers.del_by_node(
                &record.topic,
                &record.process_uuid,
                &record.node_uuid,
            );
            if state
                .connections
                .get(&record.topic, &record.process_uuid, &record.node_uuid)
                .is_none()
            {
                return;
            }
            state.connections.del_by_node(
                &record.topic,
                &record.process_uuid,
                &record.node_uuid,
            );
        } else {
            log::debug!(
                "process [{}] disconnected",
                fingerprint(&record.process_uuid)
            );
            state.remote_subscribers.del_by_proc(&record.process_uuid);
            state.connections.del_by_proc(&record.process_uuid);
        }
    }

    /// A remote service responder appeared.
    fn on_new_srv_connection(&self, record: &ServicePublisher) {
        let guard = self.state.lock();
        {
            let mut state = guard.borrow_mut();
            if let Err(e) = state.requester.connect(&record.addr) {
                log::debug!("connect to responder [{}] failed: {}", record.addr, e);
            }
        }
        let pending = {
            let state = guard.borrow();
            state
                .requests
                .first_handler(&record.topic, |h| {
                    h.req_type_name() == record.req_type
                        && h.rep_type_name() == record.rep_type
                })
                .is_some()
        };
        if pending {
            self.send_pending_remote_reqs(&record.topic, &record.req_type, &record.rep_type);
        }
    }

    /// A remote service responder went away.
    fn on_new_srv_disconnection(&self, record: &ServicePublisher) {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        state.requester.forget_endpoint(&record.addr);
    }

    // ===== Introspection =====

    pub(crate) fn topic_list(&self) -> Vec<String> {
        self.msg_discovery.wait_for_init();
        self.msg_discovery.topics()
    }

    pub(crate) fn service_list(&self) -> Vec<String> {
        self.srv_discovery.wait_for_init();
        self.srv_discovery.topics()
    }

    pub(crate) fn topic_info(&self, topic: &str) -> Vec<MessagePublisher> {
        self.msg_discovery
            .publishers(topic)
            .into_values()
            .flatten()
            .collect()
    }

    pub(crate) fn service_info(&self, topic: &str) -> Vec<ServicePublisher> {
        self.srv_discovery
            .publishers(topic)
            .into_values()
            .flatten()
            .collect()
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.exit.store(true, Ordering::Relaxed);

        // Unpark every blocked requester before joining the worker.
        {
            let guard = self.state.lock();
            let state = guard.borrow();
            for topic in state.requests.topics() {
                if let Some(handlers) = state.requests.handlers(&topic) {
                    for node in handlers.values() {
                        for handler in node.values() {
                            handler.close();
                        }
                    }
                }
            }
        }

        if let Some(worker) = self.worker.lock().take() {
            let _ = worker.join();
        }
    }
}
