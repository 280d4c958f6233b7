// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The five socket roles and their connection plumbing.
//!
//! Listeners run non-blocking accept loops that tick the exit flag;
//! every live connection gets a reader thread feeding the runtime's
//! inbound queue. Sends happen on the caller's thread under the runtime
//! lock. Connect-once sets live inside each socket.

use std::collections::{HashMap, HashSet};
use std::io;
use std::net::{IpAddr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;
use parking_lot::Mutex;

use super::auth::AuthGate;
use super::framed::{
    client_handshake, read_message, server_handshake, write_message, Hello, MessageDecoder,
    READ_TICK,
};
use crate::error::{Error, Result};

/// Settle time after a fresh connect, before the first send. Compensates
/// for the window in which the peer has accepted but not yet registered
/// the connection.
pub(crate) const CONNECT_SETTLE: Duration = Duration::from_millis(100);

/// Accept-loop tick between exit-flag checks.
const ACCEPT_TICK: Duration = Duration::from_millis(100);

/// TCP connect timeout for outward connections.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Which inbound path a message arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SocketRole {
    /// Data from a remote publisher.
    Sub,
    /// Remote-subscriber registration traffic.
    Control,
    /// A service request for our replier.
    Request,
    /// A service response for our response receiver.
    Response,
}

/// One complete multipart message plus the role it arrived on.
#[derive(Debug)]
pub(crate) struct Inbound {
    pub role: SocketRole,
    pub frames: Vec<Vec<u8>>,
}

/// Parse a `tcp://<host>:<port>` endpoint.
pub(crate) fn parse_endpoint(endpoint: &str) -> io::Result<SocketAddr> {
    let rest = endpoint.strip_prefix("tcp://").ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("endpoint [{}] is not tcp://", endpoint),
        )
    })?;
    rest.parse().map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("endpoint [{}] has no valid address", endpoint),
        )
    })
}

fn format_endpoint(addr: SocketAddr) -> String {
    format!("tcp://{}", addr)
}

fn prepare_stream(stream: &TcpStream) -> io::Result<()> {
    stream.set_nodelay(true)?;
    stream.set_read_timeout(Some(READ_TICK))
}

/// What a reader thread does with each decoded message.
struct ReaderConfig {
    label: String,
    /// Forward to the inbound queue with this role; `None` drains only.
    role: Option<SocketRole>,
    /// Identity frame to prepend (routed sockets).
    identity: Option<String>,
    /// Topic-prefix filters (subscriber socket).
    filters: Option<Arc<Mutex<HashSet<String>>>>,
    /// Peer table to clean up when the connection dies (routed sockets).
    peers: Option<(Arc<Mutex<HashMap<String, TcpStream>>>, String)>,
}

fn spawn_reader(
    mut stream: TcpStream,
    cfg: ReaderConfig,
    tx: Sender<Inbound>,
    exit: Arc<AtomicBool>,
) {
    let spawned = std::thread::Builder::new()
        .name(cfg.label.clone())
        .spawn(move || {
            let mut decoder = MessageDecoder::new();
            loop {
                if exit.load(Ordering::Relaxed) {
                    break;
                }
                let frames = match read_message(&mut stream, &mut decoder, &exit, None) {
                    Ok(Some(frames)) => frames,
                    Ok(None) => break,
                    Err(e) => {
                        log::debug!("{}: dropping connection: {}", cfg.label, e);
                        break;
                    }
                };
                let role = match cfg.role {
                    Some(role) => role,
                    None => continue,
                };
                if let Some(filters) = &cfg.filters {
                    let topic = frames.first().map(|f| f.as_slice()).unwrap_or(&[]);
                    let wanted = filters
                        .lock()
                        .iter()
                        .any(|f| topic.starts_with(f.as_bytes()));
                    if !wanted {
                        continue;
                    }
                }
                let mut out = Vec::with_capacity(frames.len() + 1);
                if let Some(identity) = &cfg.identity {
                    out.push(identity.clone().into_bytes());
                }
                out.extend(frames);
                if tx.send(Inbound { role, frames: out }).is_err() {
                    break;
                }
            }
            if let Some((peers, id)) = cfg.peers {
                peers.lock().remove(&id);
            }
        });
    if let Err(e) = spawned {
        log::error!("failed to spawn reader thread: {}", e);
    }
}

fn bind_listener(host: IpAddr) -> io::Result<(TcpListener, String)> {
    let listener = TcpListener::bind((host, 0))?;
    listener.set_nonblocking(true)?;
    let endpoint = format_endpoint(listener.local_addr()?);
    Ok((listener, endpoint))
}

/// Fan-out socket: the publisher side of the data path.
///
/// Subscribers connect in; every publish is written to all of them. Topic
/// filtering is the subscriber's job. When credentials are configured the
/// acceptor verifies each handshake through the auth gate.
pub(crate) struct FanOutSocket {
    endpoint: String,
    streams: Arc<Mutex<Vec<TcpStream>>>,
}

impl FanOutSocket {
    pub(crate) fn bind(
        host: IpAddr,
        gate: Option<AuthGate>,
        exit: Arc<AtomicBool>,
    ) -> io::Result<Self> {
        let (listener, endpoint) = bind_listener(host)?;
        let streams: Arc<Mutex<Vec<TcpStream>>> = Arc::new(Mutex::new(Vec::new()));

        let accepted = streams.clone();
        let spawned = std::thread::Builder::new()
            .name("weft-pub-accept".to_string())
            .spawn(move || loop {
                if exit.load(Ordering::Relaxed) {
                    break;
                }
                match listener.accept() {
                    Ok((mut stream, _)) => {
                        if prepare_stream(&stream).is_err() {
                            continue;
                        }
                        let mut decoder = MessageDecoder::new();
                        match server_handshake(
                            &mut stream,
                            &mut decoder,
                            &Hello::default(),
                            gate.as_ref(),
                            &exit,
                        ) {
                            Ok(_) => accepted.lock().push(stream),
                            Err(e) => {
                                log::debug!("publisher rejected a subscriber: {}", e)
                            }
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                        std::thread::sleep(ACCEPT_TICK);
                    }
                    Err(e) => {
                        log::warn!("publisher accept error: {}", e);
                        std::thread::sleep(ACCEPT_TICK);
                    }
                }
            });
        if let Err(e) = spawned {
            return Err(e);
        }

        Ok(Self { endpoint, streams })
    }

    pub(crate) fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Fan a multipart message out to every connected subscriber, pruning
    /// the ones whose connection has died.
    pub(crate) fn send(&self, frames: &[Vec<u8>]) -> Result<()> {
        let mut streams = self.streams.lock();
        let mut failed = false;
        streams.retain(|stream| match write_message(stream, frames) {
            Ok(()) => true,
            Err(e) => {
                log::debug!("publisher dropped a subscriber: {}", e);
                failed = true;
                false
            }
        });
        if failed && streams.is_empty() {
            return Err(Error::Transport(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "all subscriber connections failed",
            )));
        }
        Ok(())
    }
}

/// Fan-in socket: the subscriber side of the data path.
///
/// Connects outward to each discovered publisher, once per endpoint, and
/// filters inbound messages by topic prefix.
pub(crate) struct SubSocket {
    connected: HashSet<String>,
    filters: Arc<Mutex<HashSet<String>>>,
    credentials: Option<(String, String)>,
    tx: Sender<Inbound>,
    exit: Arc<AtomicBool>,
}

impl SubSocket {
    pub(crate) fn new(
        credentials: Option<(String, String)>,
        tx: Sender<Inbound>,
        exit: Arc<AtomicBool>,
    ) -> Self {
        Self {
            connected: HashSet::new(),
            filters: Arc::new(Mutex::new(HashSet::new())),
            credentials,
            tx,
            exit,
        }
    }

    /// Install a topic-prefix filter.
    pub(crate) fn add_filter(&self, topic: &str) {
        self.filters.lock().insert(topic.to_string());
    }

    /// Remove a topic-prefix filter.
    pub(crate) fn remove_filter(&self, topic: &str) {
        self.filters.lock().remove(topic);
    }

    /// Connect to a publisher's data endpoint. No-op when already
    /// connected.
    pub(crate) fn connect(&mut self, endpoint: &str) -> Result<()> {
        if self.connected.contains(endpoint) {
            return Ok(());
        }
        let addr = parse_endpoint(endpoint)?;
        let mut stream = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)?;
        prepare_stream(&stream)?;

        let mut hello = Hello::default();
        if let Some((username, password)) = &self.credentials {
            hello.username = username.clone();
            hello.password = password.clone();
        }
        let mut decoder = MessageDecoder::new();
        client_handshake(&mut stream, &mut decoder, &hello, &self.exit)?;

        spawn_reader(
            stream,
            ReaderConfig {
                label: format!("weft-sub-{}", addr.port()),
                role: Some(SocketRole::Sub),
                identity: None,
                filters: Some(self.filters.clone()),
                peers: None,
            },
            self.tx.clone(),
            self.exit.clone(),
        );

        self.connected.insert(endpoint.to_string());
        std::thread::sleep(CONNECT_SETTLE);
        Ok(())
    }
}

/// Control listener: receives new-connection / end-connection messages
/// from remote subscribers registering with our publisher.
pub(crate) struct ControlSocket {
    endpoint: String,
}

impl ControlSocket {
    pub(crate) fn bind(
        host: IpAddr,
        tx: Sender<Inbound>,
        exit: Arc<AtomicBool>,
    ) -> io::Result<Self> {
        let (listener, endpoint) = bind_listener(host)?;

        let spawned = std::thread::Builder::new()
            .name("weft-ctrl-accept".to_string())
            .spawn(move || {
                let mut serial = 0u32;
                loop {
                    if exit.load(Ordering::Relaxed) {
                        break;
                    }
                    match listener.accept() {
                        Ok((mut stream, _)) => {
                            if prepare_stream(&stream).is_err() {
                                continue;
                            }
                            let mut decoder = MessageDecoder::new();
                            if server_handshake(
                                &mut stream,
                                &mut decoder,
                                &Hello::default(),
                                None,
                                &exit,
                            )
                            .is_err()
                            {
                                continue;
                            }
                            serial = serial.wrapping_add(1);
                            spawn_reader(
                                stream,
                                ReaderConfig {
                                    label: format!("weft-ctrl-{}", serial),
                                    role: Some(SocketRole::Control),
                                    identity: None,
                                    filters: None,
                                    peers: None,
                                },
                                tx.clone(),
                                exit.clone(),
                            );
                        }
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                            std::thread::sleep(ACCEPT_TICK);
                        }
                        Err(e) => {
                            log::warn!("control accept error: {}", e);
                            std::thread::sleep(ACCEPT_TICK);
                        }
                    }
                }
            });
        spawned?;

        Ok(Self { endpoint })
    }

    pub(crate) fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Routed socket: a peer table keyed by announced socket identity.
///
/// Used in three places: the replier (bound, stable id, receives requests
/// and sends responses), the response receiver (bound, stable id, receives
/// responses) and the requester (connect-only, sends requests). A send to
/// an identity that is not connected fails instead of dropping silently.
pub(crate) struct RouterSocket {
    socket_id: String,
    endpoint: String,
    peers: Arc<Mutex<HashMap<String, TcpStream>>>,
    connected: HashSet<String>,
    inbound_role: Option<SocketRole>,
    tx: Sender<Inbound>,
    exit: Arc<AtomicBool>,
}

impl RouterSocket {
    /// Bind a routed listener with a stable identity. Messages read from
    /// accepted connections are forwarded with `role`.
    pub(crate) fn bind(
        host: IpAddr,
        socket_id: String,
        role: SocketRole,
        tx: Sender<Inbound>,
        exit: Arc<AtomicBool>,
    ) -> io::Result<Self> {
        let (listener, endpoint) = bind_listener(host)?;
        let peers: Arc<Mutex<HashMap<String, TcpStream>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let accept_peers = peers.clone();
        let accept_tx = tx.clone();
        let accept_exit = exit.clone();
        let own_hello = Hello::with_id(&socket_id);
        let label = format!("weft-router-{}", listener.local_addr()?.port());
        let spawned = std::thread::Builder::new().name(label.clone()).spawn(move || {
            let mut serial = 0u32;
            loop {
                if accept_exit.load(Ordering::Relaxed) {
                    break;
                }
                match listener.accept() {
                    Ok((mut stream, _)) => {
                        if prepare_stream(&stream).is_err() {
                            continue;
                        }
                        let mut decoder = MessageDecoder::new();
                        let peer = match server_handshake(
                            &mut stream,
                            &mut decoder,
                            &own_hello,
                            None,
                            &accept_exit,
                        ) {
                            Ok(peer) => peer,
                            Err(e) => {
                                log::debug!("{}: handshake failed: {}", label, e);
                                continue;
                            }
                        };
                        let cleanup = if peer.socket_id.is_empty() {
                            None
                        } else {
                            match stream.try_clone() {
                                Ok(clone) => {
                                    accept_peers
                                        .lock()
                                        .insert(peer.socket_id.clone(), clone);
                                    Some((accept_peers.clone(), peer.socket_id.clone()))
                                }
                                Err(_) => None,
                            }
                        };
                        serial = serial.wrapping_add(1);
                        spawn_reader(
                            stream,
                            ReaderConfig {
                                label: format!("{}-{}", label, serial),
                                role: Some(role),
                                identity: Some(peer.socket_id),
                                filters: None,
                                peers: cleanup,
                            },
                            accept_tx.clone(),
                            accept_exit.clone(),
                        );
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                        std::thread::sleep(ACCEPT_TICK);
                    }
                    Err(e) => {
                        log::warn!("{}: accept error: {}", label, e);
                        std::thread::sleep(ACCEPT_TICK);
                    }
                }
            }
        });
        spawned?;

        Ok(Self {
            socket_id,
            endpoint,
            peers,
            connected: HashSet::new(),
            inbound_role: Some(role),
            tx,
            exit,
        })
    }

    /// A connect-only routed socket (the requester). It announces no
    /// stable identity and never receives; replies flow to the response
    /// receiver instead.
    pub(crate) fn connect_only(tx: Sender<Inbound>, exit: Arc<AtomicBool>) -> Self {
        Self {
            socket_id: String::new(),
            endpoint: String::new(),
            peers: Arc::new(Mutex::new(HashMap::new())),
            connected: HashSet::new(),
            inbound_role: None,
            tx,
            exit,
        }
    }

    pub(crate) fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Connect outward to a routed peer and learn its identity. No-op when
    /// the endpoint is already in the connect-once set.
    pub(crate) fn connect(&mut self, endpoint: &str) -> Result<()> {
        if self.connected.contains(endpoint) {
            return Ok(());
        }
        let addr = parse_endpoint(endpoint)?;
        let mut stream = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)?;
        prepare_stream(&stream)?;

        let mut decoder = MessageDecoder::new();
        let peer = client_handshake(
            &mut stream,
            &mut decoder,
            &Hello::with_id(&self.socket_id),
            &self.exit,
        )?;

        let cleanup = if peer.socket_id.is_empty() {
            None
        } else {
            let clone = stream.try_clone()?;
            self.peers.lock().insert(peer.socket_id.clone(), clone);
            Some((self.peers.clone(), peer.socket_id.clone()))
        };
        spawn_reader(
            stream,
            ReaderConfig {
                label: format!("weft-router-out-{}", addr.port()),
                role: self.inbound_role,
                identity: Some(peer.socket_id),
                filters: None,
                peers: cleanup,
            },
            self.tx.clone(),
            self.exit.clone(),
        );

        self.connected.insert(endpoint.to_string());
        std::thread::sleep(CONNECT_SETTLE);
        Ok(())
    }

    /// Send a multipart message to a peer by identity. The addressing
    /// frame is consumed here; the peer's router re-prepends the sender
    /// identity on receive.
    pub(crate) fn send_to(&self, identity: &str, frames: &[Vec<u8>]) -> Result<()> {
        let mut peers = self.peers.lock();
        let stream = peers
            .get(identity)
            .ok_or_else(|| Error::UnknownPeer(identity.to_string()))?;
        if let Err(e) = write_message(stream, frames) {
            peers.remove(identity);
            return Err(Error::Transport(e));
        }
        Ok(())
    }

    /// Drop an endpoint from the connect-once set so a later connect can
    /// re-establish it.
    pub(crate) fn forget_endpoint(&mut self, endpoint: &str) {
        self.connected.remove(endpoint);
    }
}

/// Send control messages through a short-lived outward connection, the
/// dealer pattern: connect, announce an empty identity, settle, write all
/// messages, close.
pub(crate) fn send_control(
    endpoint: &str,
    messages: &[Vec<Vec<u8>>],
    exit: &AtomicBool,
) -> Result<()> {
    let addr = parse_endpoint(endpoint)?;
    let mut stream = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)?;
    prepare_stream(&stream)?;

    let mut decoder = MessageDecoder::new();
    client_handshake(&mut stream, &mut decoder, &Hello::default(), exit)?;
    std::thread::sleep(CONNECT_SETTLE);
    for frames in messages {
        write_message(&stream, frames)?;
    }
    let _ = stream.shutdown(std::net::Shutdown::Write);
    Ok(())
}
