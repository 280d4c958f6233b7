// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! A service responder. Pair it with the `requester` example, in the same
//! process or another one on the same network.
//!
//! Run with: `cargo run --example responder`

use std::time::Duration;

use weft::msgs::Int32;
use weft::Node;

fn main() -> weft::Result<()> {
    let node = Node::new()?;

    let ok = node.advertise_service(
        "/double",
        |req: &Int32, rep: &mut Int32| {
            rep.data = req.data * 2;
            true
        },
        Default::default(),
    );
    if !ok {
        eprintln!("failed to advertise /double");
        return Ok(());
    }

    println!("serving /double, ctrl-c to stop");
    loop {
        std::thread::sleep(Duration::from_secs(1));
    }
}
