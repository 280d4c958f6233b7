// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! A blocking service requester for the `responder` example.
//!
//! Run with: `cargo run --example requester`

use weft::msgs::Int32;
use weft::Node;

fn main() -> weft::Result<()> {
    let node = Node::new()?;

    match node.request::<Int32, Int32>("/double", &Int32::new(21), 5000) {
        Some((rep, true)) => println!("21 doubled is {}", rep.data),
        Some((_, false)) => eprintln!("the service reported a failure"),
        None => eprintln!("no response within 5 s (is the responder running?)"),
    }
    Ok(())
}
