// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Same-process service dispatch: a local replier short-circuits the wire.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use weft::msgs::{Empty, Int32, StringMsg, Vector3d};
use weft::{Node, NodeOptions};

fn node(partition: &str) -> Node {
    let mut options = NodeOptions::default();
    assert!(options.set_partition(partition));
    Node::with_options(options).expect("node")
}

#[test]
fn blocking_request_uses_local_replier() {
    let node = node("srv_blocking");

    let served = Arc::new(AtomicU32::new(0));
    let count = served.clone();
    assert!(node.advertise_service(
        "/double",
        move |req: &Int32, rep: &mut Int32| {
            count.fetch_add(1, Ordering::Relaxed);
            rep.data = req.data * 2;
            true
        },
        Default::default(),
    ));

    let outcome = node.request::<Int32, Int32>("/double", &Int32::new(21), 1000);
    assert_eq!(outcome.map(|(rep, result)| (rep.data, result)), Some((42, true)));
    assert_eq!(served.load(Ordering::Relaxed), 1);
}

#[test]
fn async_request_runs_callback_inline_for_local_replier() {
    let node = node("srv_async");

    assert!(node.advertise_service(
        "/echo",
        |req: &StringMsg, rep: &mut StringMsg| {
            rep.data = req.data.clone();
            true
        },
        Default::default(),
    ));

    let replies = Arc::new(AtomicU32::new(0));
    let count = replies.clone();
    let issued = node.request_async(
        "/echo",
        &StringMsg::new("ping"),
        move |rep: &StringMsg, result| {
            assert_eq!(rep.data, "ping");
            assert!(result);
            count.fetch_add(1, Ordering::Relaxed);
        },
    );
    assert!(issued);
    // Local dispatch is synchronous.
    assert_eq!(replies.load(Ordering::Relaxed), 1);
}

#[test]
fn replier_result_flag_is_propagated() {
    let node = node("srv_result");

    assert!(node.advertise_service(
        "/fails",
        |_req: &Int32, _rep: &mut Int32| false,
        Default::default(),
    ));

    let outcome = node.request::<Int32, Int32>("/fails", &Int32::new(1), 1000);
    assert_eq!(outcome.map(|(_, result)| result), Some(false));
}

#[test]
fn type_mismatched_request_never_reaches_replier() {
    let node = node("srv_mismatch");

    let served = Arc::new(AtomicU32::new(0));
    let count = served.clone();
    assert!(node.advertise_service(
        "/typed",
        move |req: &Int32, rep: &mut Int32| {
            count.fetch_add(1, Ordering::Relaxed);
            rep.data = req.data;
            true
        },
        Default::default(),
    ));

    // Wrong request type.
    let start = Instant::now();
    let outcome = node.request::<Vector3d, Int32>("/typed", &Vector3d::default(), 300);
    assert!(outcome.is_none());
    assert!(start.elapsed() >= Duration::from_millis(300));

    // Wrong response type.
    let outcome = node.request::<Int32, Vector3d>("/typed", &Int32::new(1), 300);
    assert!(outcome.is_none());

    assert_eq!(served.load(Ordering::Relaxed), 0);
}

#[test]
fn oneway_request_runs_local_replier() {
    let node = node("srv_oneway");

    let served = Arc::new(AtomicU32::new(0));
    let count = served.clone();
    assert!(node.advertise_service(
        "/log",
        move |req: &StringMsg, _rep: &mut Empty| {
            assert_eq!(req.data, "event");
            count.fetch_add(1, Ordering::Relaxed);
            true
        },
        Default::default(),
    ));

    assert!(node.request_oneway("/log", &StringMsg::new("event")));
    assert_eq!(served.load(Ordering::Relaxed), 1);
}

#[test]
fn request_without_responder_times_out() {
    let node = node("srv_orphan");

    let start = Instant::now();
    let outcome = node.request::<Int32, Int32>("/void", &Int32::new(1), 300);
    assert!(outcome.is_none());
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(300));
    assert!(elapsed < Duration::from_secs(2));
}

#[test]
fn readvertising_replaces_the_replier() {
    let node = node("srv_replace");

    assert!(node.advertise_service(
        "/versioned",
        |_req: &Int32, rep: &mut Int32| {
            rep.data = 1;
            true
        },
        Default::default(),
    ));
    assert!(node.advertise_service(
        "/versioned",
        |_req: &Int32, rep: &mut Int32| {
            rep.data = 2;
            true
        },
        Default::default(),
    ));

    let outcome = node.request::<Int32, Int32>("/versioned", &Int32::new(0), 1000);
    assert_eq!(outcome.map(|(rep, _)| rep.data), Some(2));
}

#[test]
fn cross_node_dispatch_within_a_process() {
    let responder = node("srv_cross");
    let requester = node("srv_cross");

    assert!(responder.advertise_service(
        "/add",
        |req: &Int32, rep: &mut Int32| {
            rep.data = req.data + 10;
            true
        },
        Default::default(),
    ));

    let outcome = requester.request::<Int32, Int32>("/add", &Int32::new(1), 1000);
    assert_eq!(outcome.map(|(rep, result)| (rep.data, result)), Some((11, true)));
}

#[test]
fn unadvertise_service_stops_dispatch() {
    let node = node("srv_unadv");

    assert!(node.advertise_service(
        "/temp",
        |req: &Int32, rep: &mut Int32| {
            rep.data = req.data;
            true
        },
        Default::default(),
    ));
    assert_eq!(node.advertised_services().len(), 1);

    assert!(node.unadvertise_service("/temp"));
    assert!(node.advertised_services().is_empty());

    let outcome = node.request::<Int32, Int32>("/temp", &Int32::new(1), 300);
    assert!(outcome.is_none());
}

#[test]
fn invalid_service_names_are_rejected() {
    let node = node("srv_invalid");
    assert!(!node.advertise_service(
        "bad topic",
        |_req: &Int32, _rep: &mut Int32| true,
        Default::default(),
    ));
    assert!(!node.request_async("bad topic", &Int32::new(1), |_: &Int32, _| {}));
    assert!(node.request::<Int32, Int32>("bad topic", &Int32::new(1), 100).is_none());
    assert!(!node.unadvertise_service("bad topic"));
}
