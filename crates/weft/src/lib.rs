// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # weft: a peer-to-peer typed message fabric
//!
//! Processes exchange typed messages over two communication styles:
//! anonymous publish/subscribe on named topics, and typed
//! request/response on named services. Peers find one another through a
//! UDP discovery beacon; data and requests then flow over direct TCP
//! connections.
//!
//! ## Quick start
//!
//! ```no_run
//! use weft::{msgs::Int32, Node};
//!
//! fn main() -> weft::Result<()> {
//!     let node = Node::new()?;
//!
//!     // Pub/sub.
//!     node.subscribe("/temp", |msg: &Int32, _info| {
//!         println!("temperature: {}", msg.data);
//!     }, Default::default());
//!     let publisher = node.advertise::<Int32>("/temp", Default::default());
//!
//!     // Services.
//!     node.advertise_service("/double", |req: &Int32, rep: &mut Int32| {
//!         rep.data = req.data * 2;
//!         true
//!     }, Default::default());
//!     let reply = node.request::<Int32, Int32>("/double", &Int32::new(21), 1000);
//!     assert_eq!(reply.map(|(rep, ok)| (rep.data, ok)), Some((42, true)));
//!
//!     drop(publisher);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------+
//! |                      Application nodes                        |
//! |   advertise / subscribe / advertise_service / request        |
//! +--------------------------------------------------------------+
//! |                     Shared runtime (one per process)          |
//! |   handler registries | request correlation | reception worker |
//! +--------------------------------------------------------------+
//! |   Socket set (TCP)            |   Discovery beacons (UDP)    |
//! |   pub / sub / control /       |   advertise, query,          |
//! |   replier / requester         |   heartbeat, bye             |
//! +--------------------------------------------------------------+
//! ```
//!
//! ## Environment
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `IGN_PARTITION` | Default partition name for new nodes. |
//! | `IGN_VERBOSE` | `1` enables verbose stderr logging. |
//! | `IGNITION_TRANSPORT_USERNAME` / `IGNITION_TRANSPORT_PASSWORD` | Enable PLAIN authentication on pub/sub. |

mod discovery;
mod error;
mod handlers;
mod ident;
mod logging;
mod msg;
/// Built-in payload types.
pub mod msgs;
mod node;
mod options;
mod runtime;
mod topic;
mod transport;
mod wire;

pub use discovery::{MessagePublisher, ServicePublisher};
pub use error::{Error, Result};
pub use msg::{DecodeError, Message, MessageInfo, GENERIC_MESSAGE_TYPE};
pub use node::{Node, Publisher};
pub use options::{
    AdvertiseMessageOptions, AdvertiseServiceOptions, NodeOptions, Scope, SubscribeOptions,
    UNTHROTTLED,
};

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
