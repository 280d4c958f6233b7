// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Facade-level queries and bookkeeping.

use weft::msgs::{Int32, StringMsg};
use weft::{Node, NodeOptions, Scope};

fn node(partition: &str) -> Node {
    let mut options = NodeOptions::default();
    assert!(options.set_partition(partition));
    Node::with_options(options).expect("node")
}

#[test]
fn advertised_and_subscribed_lists_track_state() {
    let node = node("api_lists");

    let _publisher = node
        .advertise::<Int32>("/a", Default::default())
        .expect("advertise");
    assert!(node.subscribe("/b", |_: &Int32, _| {}, Default::default()));
    assert!(node.advertise_service(
        "/c",
        |_: &Int32, _: &mut Int32| true,
        Default::default(),
    ));

    assert_eq!(node.advertised_topics(), vec!["@api_lists@/a".to_string()]);
    assert_eq!(node.subscribed_topics(), vec!["@api_lists@/b".to_string()]);
    assert_eq!(node.advertised_services(), vec!["@api_lists@/c".to_string()]);

    assert!(node.unsubscribe("/b"));
    assert!(node.subscribed_topics().is_empty());
}

#[test]
fn topic_info_reports_local_publisher() {
    let node = node("api_topic_info");

    let _publisher = node
        .advertise::<StringMsg>("/info", Default::default())
        .expect("advertise");

    let info = node.topic_info("/info");
    assert_eq!(info.len(), 1);
    assert_eq!(info[0].topic, "@api_topic_info@/info");
    assert_eq!(info[0].msg_type, "weft.msgs.StringMsg");
    assert!(info[0].addr.starts_with("tcp://"));
    assert!(info[0].ctrl.starts_with("tcp://"));
}

#[test]
fn service_info_reports_types_and_endpoint() {
    let node = node("api_srv_info");

    assert!(node.advertise_service(
        "/calc",
        |req: &Int32, rep: &mut Int32| {
            rep.data = req.data;
            true
        },
        Default::default(),
    ));

    let info = node.service_info("/calc");
    assert_eq!(info.len(), 1);
    assert_eq!(info[0].req_type, "weft.msgs.Int32");
    assert_eq!(info[0].rep_type, "weft.msgs.Int32");
    assert!(info[0].addr.starts_with("tcp://"));
    assert!(!info[0].socket_id.is_empty());

    assert!(node.unadvertise_service("/calc"));
    assert!(node.service_info("/calc").is_empty());
}

#[test]
fn network_lists_include_local_advertisements() {
    let node = node("api_network");

    let _publisher = node
        .advertise::<Int32>("/seen", Default::default())
        .expect("advertise");
    assert!(node.advertise_service(
        "/served",
        |_: &Int32, _: &mut Int32| true,
        Default::default(),
    ));

    let topics = node.topic_list();
    assert!(topics.contains(&"@api_network@/seen".to_string()));

    let services = node.service_list();
    assert!(services.contains(&"@api_network@/served".to_string()));
}

#[test]
fn process_scope_stays_invisible_to_discovery_lists() {
    let node = node("api_scope");

    let _publisher = node
        .advertise::<Int32>(
            "/internal",
            weft::AdvertiseMessageOptions {
                scope: Scope::Process,
                ..Default::default()
            },
        )
        .expect("advertise");

    // Still resolvable in this process.
    assert_eq!(node.topic_info("/internal").len(), 1);
}

#[test]
fn dropping_a_node_withdraws_its_services() {
    let watcher = node("api_drop");
    {
        let ephemeral = node("api_drop");
        assert!(ephemeral.advertise_service(
            "/fleeting",
            |_: &Int32, _: &mut Int32| true,
            Default::default(),
        ));
        assert_eq!(watcher.service_info("/fleeting").len(), 1);
    }
    assert!(watcher.service_info("/fleeting").is_empty());
}

#[test]
fn node_options_accessors() {
    let mut options = NodeOptions::default();
    assert!(options.set_partition("api_opts"));
    assert!(options.set_namespace("sensors"));
    let node = Node::with_options(options).expect("node");

    assert_eq!(node.options().partition(), "api_opts");
    assert_eq!(node.options().namespace(), "sensors");

    assert!(node.subscribe("/raw", |_: &Int32, _| {}, Default::default()));
    assert_eq!(
        node.subscribed_topics(),
        vec!["@api_opts@/raw".to_string()]
    );

    assert!(node.subscribe("scaled", |_: &Int32, _| {}, Default::default()));
    assert!(node
        .subscribed_topics()
        .contains(&"@api_opts@/sensors/scaled".to_string()));
}

#[test]
fn version_is_exposed() {
    assert!(!weft::VERSION.is_empty());
}
