// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Handler traits and their typed implementations.
//!
//! The registries store callbacks behind type-erased traits keyed by the
//! payload type name. Three kinds exist: subscription handlers (pub/sub
//! delivery), replier handlers (service callbacks) and request handlers
//! (pending outbound requests awaiting a response). Closure ownership is
//! collapsed to boxed `Fn`s at this boundary; the typed adapters live in
//! the node facade.

mod storage;
mod waiter;

pub(crate) use storage::HandlerStorage;
pub(crate) use waiter::Waiter;

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use std::time::Instant;

use crate::msg::{Message, MessageInfo, GENERIC_MESSAGE_TYPE};
use crate::msgs::Raw;
use crate::options::UNTHROTTLED;

/// Type-erased decoded payload.
pub(crate) type AnyMessage = dyn Any + Send + Sync;

/// Subscriber-side rate limiter state.
pub(crate) struct Throttle {
    period_us: Option<u64>,
    last: Option<Instant>,
}

impl Throttle {
    pub(crate) fn new(msgs_per_sec: u64) -> Self {
        let period_us = if msgs_per_sec == UNTHROTTLED || msgs_per_sec == 0 {
            None
        } else {
            Some(1_000_000 / msgs_per_sec.max(1))
        };
        Self {
            period_us,
            last: None,
        }
    }

    /// Whether the next message may pass the rate cap.
    pub(crate) fn pass(&mut self) -> bool {
        let period_us = match self.period_us {
            Some(period) => period,
            None => return true,
        };
        let now = Instant::now();
        match self.last {
            Some(last) if (now - last).as_micros() < u128::from(period_us) => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

/// A local subscription: declared type name plus a typed callback.
///
/// `create_msg` decodes the payload into the handler's message family so
/// the dispatcher can decode once and share the value across handlers of
/// the same family; `run_local` downcasts and invokes the callback.
pub(crate) trait SubscriptionHandler: Send + Sync {
    fn type_name(&self) -> &'static str;
    fn node_uuid(&self) -> &str;
    fn handler_uuid(&self) -> &str;
    fn create_msg(&self, data: &[u8], msg_type: &str) -> Option<Arc<AnyMessage>>;
    fn run_local(&self, msg: &AnyMessage, info: &MessageInfo) -> bool;
}

/// Typed subscription handler.
pub(crate) struct TypedSubscriptionHandler<T: Message> {
    node_uuid: String,
    handler_uuid: String,
    callback: Box<dyn Fn(&T, &MessageInfo) + Send + Sync>,
    throttle: Mutex<Throttle>,
}

impl<T: Message> TypedSubscriptionHandler<T> {
    pub(crate) fn new(
        node_uuid: String,
        handler_uuid: String,
        msgs_per_sec: u64,
        callback: Box<dyn Fn(&T, &MessageInfo) + Send + Sync>,
    ) -> Self {
        Self {
            node_uuid,
            handler_uuid,
            callback,
            throttle: Mutex::new(Throttle::new(msgs_per_sec)),
        }
    }
}

impl<T: Message> SubscriptionHandler for TypedSubscriptionHandler<T> {
    fn type_name(&self) -> &'static str {
        T::TYPE_NAME
    }

    fn node_uuid(&self) -> &str {
        &self.node_uuid
    }

    fn handler_uuid(&self) -> &str {
        &self.handler_uuid
    }

    fn create_msg(&self, data: &[u8], msg_type: &str) -> Option<Arc<AnyMessage>> {
        if msg_type != T::TYPE_NAME {
            return None;
        }
        match T::decode(data) {
            Ok(msg) => Some(Arc::new(msg)),
            Err(e) => {
                log::warn!("failed to decode [{}] payload: {}", msg_type, e);
                None
            }
        }
    }

    fn run_local(&self, msg: &AnyMessage, info: &MessageInfo) -> bool {
        let msg = match msg.downcast_ref::<T>() {
            Some(msg) => msg,
            None => return false,
        };
        if !self.throttle.lock().pass() {
            return true;
        }
        (self.callback)(msg, info);
        true
    }
}

/// Wildcard subscription handler: accepts any payload type and receives
/// the raw bytes.
pub(crate) struct RawSubscriptionHandler {
    node_uuid: String,
    handler_uuid: String,
    callback: Box<dyn Fn(&Raw, &MessageInfo) + Send + Sync>,
    throttle: Mutex<Throttle>,
}

impl RawSubscriptionHandler {
    pub(crate) fn new(
        node_uuid: String,
        handler_uuid: String,
        msgs_per_sec: u64,
        callback: Box<dyn Fn(&Raw, &MessageInfo) + Send + Sync>,
    ) -> Self {
        Self {
            node_uuid,
            handler_uuid,
            callback,
            throttle: Mutex::new(Throttle::new(msgs_per_sec)),
        }
    }
}

impl SubscriptionHandler for RawSubscriptionHandler {
    fn type_name(&self) -> &'static str {
        GENERIC_MESSAGE_TYPE
    }

    fn node_uuid(&self) -> &str {
        &self.node_uuid
    }

    fn handler_uuid(&self) -> &str {
        &self.handler_uuid
    }

    fn create_msg(&self, data: &[u8], msg_type: &str) -> Option<Arc<AnyMessage>> {
        Some(Arc::new(Raw {
            msg_type: msg_type.to_string(),
            data: data.to_vec(),
        }))
    }

    fn run_local(&self, msg: &AnyMessage, info: &MessageInfo) -> bool {
        let msg = match msg.downcast_ref::<Raw>() {
            Some(msg) => msg,
            None => return false,
        };
        if !self.throttle.lock().pass() {
            return true;
        }
        (self.callback)(msg, info);
        true
    }
}

/// A service replier: request/response type names plus the service
/// callback. `run_callback` is the wire path (serialized request in,
/// serialized response out); `run_local_callback` short-circuits
/// same-process requests without serialization.
pub(crate) trait RepHandler: Send + Sync {
    fn req_type_name(&self) -> &'static str;
    fn rep_type_name(&self) -> &'static str;
    fn node_uuid(&self) -> &str;
    fn handler_uuid(&self) -> &str;
    fn run_callback(&self, req: &[u8]) -> Option<(Vec<u8>, bool)>;
    fn run_local_callback(&self, req: &AnyMessage) -> Option<(Arc<AnyMessage>, bool)>;
}

/// Typed replier handler.
pub(crate) struct TypedRepHandler<Req: Message, Rep: Message> {
    node_uuid: String,
    handler_uuid: String,
    callback: Box<dyn Fn(&Req, &mut Rep) -> bool + Send + Sync>,
}

impl<Req: Message, Rep: Message> TypedRepHandler<Req, Rep> {
    pub(crate) fn new(
        node_uuid: String,
        handler_uuid: String,
        callback: Box<dyn Fn(&Req, &mut Rep) -> bool + Send + Sync>,
    ) -> Self {
        Self {
            node_uuid,
            handler_uuid,
            callback,
        }
    }
}

impl<Req: Message, Rep: Message> RepHandler for TypedRepHandler<Req, Rep> {
    fn req_type_name(&self) -> &'static str {
        Req::TYPE_NAME
    }

    fn rep_type_name(&self) -> &'static str {
        Rep::TYPE_NAME
    }

    fn node_uuid(&self) -> &str {
        &self.node_uuid
    }

    fn handler_uuid(&self) -> &str {
        &self.handler_uuid
    }

    fn run_callback(&self, req: &[u8]) -> Option<(Vec<u8>, bool)> {
        let req = match Req::decode(req) {
            Ok(req) => req,
            Err(e) => {
                log::warn!("failed to decode [{}] request: {}", Req::TYPE_NAME, e);
                return None;
            }
        };
        let mut rep = Rep::default();
        let result = (self.callback)(&req, &mut rep);
        Some((rep.encode(), result))
    }

    fn run_local_callback(&self, req: &AnyMessage) -> Option<(Arc<AnyMessage>, bool)> {
        let req = req.downcast_ref::<Req>()?;
        let mut rep = Rep::default();
        let result = (self.callback)(req, &mut rep);
        Some((Arc::new(rep), result))
    }
}

/// A pending outbound request.
///
/// Carries the serialized request, a `requested` flag flipped once the
/// wire send has happened, and the completion path: either an async
/// callback or a parked waiter. The handler uuid doubles as the request
/// correlation id.
pub(crate) trait ReqHandler: Send + Sync {
    fn req_type_name(&self) -> &'static str;
    fn rep_type_name(&self) -> &'static str;
    fn node_uuid(&self) -> &str;
    fn handler_uuid(&self) -> &str;
    fn requested(&self) -> bool;
    fn mark_requested(&self);
    /// Serialized request payload; `None` when serialization failed.
    fn payload(&self) -> Option<Vec<u8>>;
    /// Deliver the response.
    fn notify(&self, rep: &[u8], result: bool);
    /// Unpark any waiter at teardown.
    fn close(&self);
}

/// Pending request completed through an async callback.
pub(crate) struct CallbackReqHandler<Rep: Message> {
    req_type: &'static str,
    node_uuid: String,
    handler_uuid: String,
    payload: Vec<u8>,
    requested: AtomicBool,
    callback: Box<dyn Fn(&Rep, bool) + Send + Sync>,
}

impl<Rep: Message> CallbackReqHandler<Rep> {
    pub(crate) fn new<Req: Message>(
        node_uuid: String,
        handler_uuid: String,
        req: &Req,
        callback: Box<dyn Fn(&Rep, bool) + Send + Sync>,
    ) -> Self {
        Self {
            req_type: Req::TYPE_NAME,
            node_uuid,
            handler_uuid,
            payload: req.encode(),
            requested: AtomicBool::new(false),
            callback,
        }
    }
}

impl<Rep: Message> ReqHandler for CallbackReqHandler<Rep> {
    fn req_type_name(&self) -> &'static str {
        self.req_type
    }

    fn rep_type_name(&self) -> &'static str {
        Rep::TYPE_NAME
    }

    fn node_uuid(&self) -> &str {
        &self.node_uuid
    }

    fn handler_uuid(&self) -> &str {
        &self.handler_uuid
    }

    fn requested(&self) -> bool {
        self.requested.load(Ordering::Relaxed)
    }

    fn mark_requested(&self) {
        self.requested.store(true, Ordering::Relaxed);
    }

    fn payload(&self) -> Option<Vec<u8>> {
        Some(self.payload.clone())
    }

    fn notify(&self, rep: &[u8], result: bool) {
        match Rep::decode(rep) {
            Ok(rep) => (self.callback)(&rep, result),
            Err(e) => {
                log::warn!("failed to decode [{}] response: {}", Rep::TYPE_NAME, e);
                (self.callback)(&Rep::default(), false);
            }
        }
    }

    fn close(&self) {}
}

/// Pending request completed by unparking a blocked caller.
pub(crate) struct WaiterReqHandler {
    req_type: &'static str,
    rep_type: &'static str,
    node_uuid: String,
    handler_uuid: String,
    payload: Vec<u8>,
    requested: AtomicBool,
    waiter: Arc<Waiter>,
}

impl WaiterReqHandler {
    pub(crate) fn new<Req: Message, Rep: Message>(
        node_uuid: String,
        handler_uuid: String,
        req: &Req,
        waiter: Arc<Waiter>,
    ) -> Self {
        Self {
            req_type: Req::TYPE_NAME,
            rep_type: Rep::TYPE_NAME,
            node_uuid,
            handler_uuid,
            payload: req.encode(),
            requested: AtomicBool::new(false),
            waiter,
        }
    }
}

impl ReqHandler for WaiterReqHandler {
    fn req_type_name(&self) -> &'static str {
        self.req_type
    }

    fn rep_type_name(&self) -> &'static str {
        self.rep_type
    }

    fn node_uuid(&self) -> &str {
        &self.node_uuid
    }

    fn handler_uuid(&self) -> &str {
        &self.handler_uuid
    }

    fn requested(&self) -> bool {
        self.requested.load(Ordering::Relaxed)
    }

    fn mark_requested(&self) {
        self.requested.store(true, Ordering::Relaxed);
    }

    fn payload(&self) -> Option<Vec<u8>> {
        Some(self.payload.clone())
    }

    fn notify(&self, rep: &[u8], result: bool) {
        self.waiter.deliver(rep.to_vec(), result);
    }

    fn close(&self) {
        self.waiter.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msgs::Int32;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn typed_handler_matches_and_dispatches() {
        let count = Arc::new(AtomicU32::new(0));
        let seen = count.clone();
        let handler = TypedSubscriptionHandler::<Int32>::new(
            "node".into(),
            "handler".into(),
            UNTHROTTLED,
            Box::new(move |msg, info| {
                assert_eq!(msg.data, 42);
                assert_eq!(info.topic(), "/t");
                seen.fetch_add(1, Ordering::Relaxed);
            }),
        );

        let msg = handler
            .create_msg(&Int32::new(42).encode(), Int32::TYPE_NAME)
            .unwrap();
        let info = MessageInfo::new("/t".into());
        assert!(handler.run_local(msg.as_ref(), &info));
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn typed_handler_rejects_other_types() {
        let handler = TypedSubscriptionHandler::<Int32>::new(
            "node".into(),
            "handler".into(),
            UNTHROTTLED,
            Box::new(|_, _| panic!("must not run")),
        );
        assert!(handler.create_msg(&[], "weft.msgs.Vector3d").is_none());
    }

    #[test]
    fn raw_handler_accepts_any_type() {
        let handler = RawSubscriptionHandler::new(
            "node".into(),
            "handler".into(),
            UNTHROTTLED,
            Box::new(|msg, _| {
                assert_eq!(msg.msg_type, "weft.msgs.Int32");
            }),
        );
        let msg = handler
            .create_msg(&Int32::new(1).encode(), Int32::TYPE_NAME)
            .unwrap();
        assert!(handler.run_local(msg.as_ref(), &MessageInfo::new("/t".into())));
    }

    #[test]
    fn throttle_caps_delivery_rate() {
        let mut throttle = Throttle::new(1);
        assert!(throttle.pass());
        assert!(!throttle.pass());

        let mut unthrottled = Throttle::new(UNTHROTTLED);
        assert!(unthrottled.pass());
        assert!(unthrottled.pass());
    }

    #[test]
    fn rep_handler_runs_wire_and_local_paths() {
        let handler = TypedRepHandler::<Int32, Int32>::new(
            "node".into(),
            "handler".into(),
            Box::new(|req, rep| {
                rep.data = req.data;
                true
            }),
        );

        let (rep, result) = handler.run_callback(&Int32::new(7).encode()).unwrap();
        assert!(result);
        assert_eq!(Int32::decode(&rep).unwrap().data, 7);

        let req: Arc<AnyMessage> = Arc::new(Int32::new(9));
        let (rep, result) = handler.run_local_callback(req.as_ref()).unwrap();
        assert!(result);
        assert_eq!(rep.downcast_ref::<Int32>().unwrap().data, 9);
    }

    #[test]
    fn rep_handler_drops_undecodable_request() {
        let handler = TypedRepHandler::<Int32, Int32>::new(
            "node".into(),
            "handler".into(),
            Box::new(|_, _| panic!("must not run")),
        );
        assert!(handler.run_callback(&[1, 2]).is_none());
    }

    #[test]
    fn callback_req_handler_reports_parse_failure_as_false() {
        let outcome = Arc::new(Mutex::new(None));
        let seen = outcome.clone();
        let handler = CallbackReqHandler::<Int32>::new(
            "node".into(),
            "req".into(),
            &Int32::new(1),
            Box::new(move |rep, result| {
                *seen.lock() = Some((rep.data, result));
            }),
        );

        handler.notify(&[1, 2], true);
        assert_eq!(*outcome.lock(), Some((0, false)));

        handler.notify(&Int32::new(5).encode(), true);
        assert_eq!(*outcome.lock(), Some((5, true)));
    }

    #[test]
    fn requested_flag_flips_once() {
        let handler = WaiterReqHandler::new::<Int32, Int32>(
            "node".into(),
            "req".into(),
            &Int32::new(1),
            Waiter::new(),
        );
        assert!(!handler.requested());
        handler.mark_requested();
        assert!(handler.requested());
    }
}
