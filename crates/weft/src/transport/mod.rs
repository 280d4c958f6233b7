// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The socket set.
//!
//! Five endpoint roles over plain TCP:
//!
//! 1. publisher: fan-out listener; every local publish goes to all
//!    connected subscribers (filtering happens subscriber-side),
//! 2. subscriber: outward connections to discovered publishers with a
//!    per-topic prefix filter,
//! 3. control: listener for remote-subscriber registration messages,
//! 4. replier: routed listener with a stable socket id; sends to unknown
//!    identities fail instead of dropping silently,
//! 5. requester + response receiver: routed connect-only socket paired
//!    with a routed listener that owns the stable response id.
//!
//! Each accepted or initiated connection runs a small identity handshake
//! and then a reader thread that pushes complete multipart messages into
//! the runtime's inbound queue, tagged with the socket role. Connect-once
//! bookkeeping is per role: connecting to an endpoint twice is a no-op.

mod auth;
mod framed;
mod sockets;

pub(crate) use auth::AuthGate;
pub(crate) use sockets::{
    send_control, ControlSocket, FanOutSocket, Inbound, RouterSocket, SocketRole, SubSocket,
};
