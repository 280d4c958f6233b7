// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Minimal pub/sub pair in one process.
//!
//! Run with: `cargo run --example pubsub`

use std::time::Duration;

use weft::msgs::StringMsg;
use weft::Node;

fn main() -> weft::Result<()> {
    let node = Node::new()?;

    node.subscribe(
        "/chatter",
        |msg: &StringMsg, info| {
            println!("[{}] {}", info.topic(), msg.data);
        },
        Default::default(),
    );

    let publisher = node
        .advertise::<StringMsg>("/chatter", Default::default())
        .expect("advertise /chatter");

    for i in 0..5 {
        publisher.publish(&StringMsg::new(format!("hello {}", i)));
        std::thread::sleep(Duration::from_millis(500));
    }
    Ok(())
}
