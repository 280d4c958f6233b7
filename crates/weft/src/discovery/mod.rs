// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! UDP discovery beacons.
//!
//! Two independent beacons run per process: one for message topics, one
//! for services. Each multicasts advertisements on its own UDP port,
//! re-announces on a ~1 s heartbeat, answers queries for topics it
//! advertises, coalesces duplicates, and reports peers that fall silent
//! as gone. An intra-process shortcut delivers every outgoing datagram to
//! the other beacons of this process directly, so runtimes sharing a
//! process discover each other without relying on multicast loopback.
//!
//! Contract offered to the runtime: `advertise`, `unadvertise`,
//! `discover`, `publishers`, plus connection and disconnection callback
//! hooks. `discover` may invoke the connection callback inline on the
//! caller's thread for publishers that are already known.

mod publisher;

pub(crate) use publisher::{endpoint_host, DiscoveryRecord};
pub use publisher::{MessagePublisher, ServicePublisher};

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};

use crate::ident::fingerprint;
use crate::options::Scope;
use crate::wire;

/// Default UDP port of the message beacon.
pub(crate) const MSG_DISCOVERY_PORT: u16 = 11319;
/// Default UDP port of the service beacon.
pub(crate) const SRV_DISCOVERY_PORT: u16 = 11320;

/// Multicast group shared by all beacons.
const MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 0, 7);

/// Re-announce interval.
pub(crate) const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

/// Peers silent for longer than this are treated as gone.
const SILENCE_TIMEOUT: Duration = Duration::from_secs(3);

/// Receive-loop tick between exit-flag checks.
const RECV_TICK: Duration = Duration::from_millis(250);

/// Datagram magic.
const MAGIC: &[u8] = b"WEFT01";

const KIND_ADVERTISE: u8 = 1;
const KIND_SUBSCRIBE: u8 = 2;
const KIND_UNADVERTISE: u8 = 3;
const KIND_HEARTBEAT: u8 = 4;
const KIND_BYE: u8 = 5;

type Callback<R> = Arc<dyn Fn(&R) + Send + Sync>;

/// In-process delivery shortcut: every beacon registers a queue under its
/// port; outgoing datagrams are copied to all other local beacons on the
/// same port.
struct Bus {
    members: Mutex<HashMap<u16, Vec<(u64, Sender<Vec<u8>>)>>>,
}

static BUS: OnceLock<Bus> = OnceLock::new();
static BUS_IDS: AtomicU64 = AtomicU64::new(1);

fn bus() -> &'static Bus {
    BUS.get_or_init(|| Bus {
        members: Mutex::new(HashMap::new()),
    })
}

struct Book<R> {
    /// Our own advertisements, topic → records.
    local: HashMap<String, Vec<R>>,
    /// Remote advertisements, topic → process UUID → records.
    remote: HashMap<String, HashMap<String, Vec<R>>>,
    /// Last time each remote process was heard from.
    activity: HashMap<String, Instant>,
}

impl<R> Default for Book<R> {
    fn default() -> Self {
        Self {
            local: HashMap::new(),
            remote: HashMap::new(),
            activity: HashMap::new(),
        }
    }
}

struct Inner<R> {
    process_uuid: String,
    host: IpAddr,
    port: u16,
    bus_id: u64,
    socket: Option<UdpSocket>,
    book: Mutex<Book<R>>,
    connection_cb: Mutex<Option<Callback<R>>>,
    disconnection_cb: Mutex<Option<Callback<R>>>,
    started: AtomicBool,
    started_at: Mutex<Option<Instant>>,
    last_beat: Mutex<Option<Instant>>,
    exit: Arc<AtomicBool>,
}

/// One discovery beacon.
pub(crate) struct Discovery<R: DiscoveryRecord> {
    inner: Arc<Inner<R>>,
    threads: Vec<std::thread::JoinHandle<()>>,
}

fn open_socket(port: u16) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.bind(&SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)).into())?;
    let socket: UdpSocket = socket.into();
    socket.set_read_timeout(Some(RECV_TICK))?;
    if let Err(e) = socket.join_multicast_v4(&MULTICAST_GROUP, &Ipv4Addr::UNSPECIFIED) {
        log::warn!("discovery: multicast join failed on port {}: {}", port, e);
    }
    let _ = socket.set_multicast_loop_v4(true);
    Ok(socket)
}

impl<R: DiscoveryRecord> Discovery<R> {
    /// Create a beacon bound to `port`. The beacon stays passive until
    /// [`Discovery::start`].
    pub(crate) fn new(process_uuid: &str, host: IpAddr, port: u16) -> Self {
        let (inproc_tx, inproc_rx) = unbounded();
        let bus_id = BUS_IDS.fetch_add(1, Ordering::Relaxed);
        bus()
            .members
            .lock()
            .entry(port)
            .or_default()
            .push((bus_id, inproc_tx));

        let socket = match open_socket(port) {
            Ok(socket) => Some(socket),
            Err(e) => {
                log::warn!("discovery: UDP bind failed on port {}: {}", port, e);
                None
            }
        };

        let inner = Arc::new(Inner {
            process_uuid: process_uuid.to_string(),
            host,
            port,
            bus_id,
            socket,
            book: Mutex::new(Book::default()),
            connection_cb: Mutex::new(None),
            disconnection_cb: Mutex::new(None),
            started: AtomicBool::new(false),
            started_at: Mutex::new(None),
            last_beat: Mutex::new(None),
            exit: Arc::new(AtomicBool::new(false)),
        });

        let mut beacon = Self {
            inner,
            threads: Vec::new(),
        };
        beacon.spawn_receiver(inproc_rx);
        beacon.spawn_heartbeat();
        beacon
    }

    /// Register the connection callback.
    pub(crate) fn set_connections_cb(&self, cb: impl Fn(&R) + Send + Sync + 'static) {
        *self.inner.connection_cb.lock() = Some(Arc::new(cb));
    }

    /// Register the disconnection callback.
    pub(crate) fn set_disconnections_cb(&self, cb: impl Fn(&R) + Send + Sync + 'static) {
        *self.inner.disconnection_cb.lock() = Some(Arc::new(cb));
    }

    /// Activate the beacon.
    pub(crate) fn start(&self) {
        self.inner.started.store(true, Ordering::Relaxed);
        *self.inner.started_at.lock() = Some(Instant::now());
        *self.inner.last_beat.lock() = Some(Instant::now());
    }

    /// Block until one heartbeat has elapsed since `start`, so list
    /// queries observe at least one announcement round.
    pub(crate) fn wait_for_init(&self) {
        let started_at = *self.inner.started_at.lock();
        if let Some(started_at) = started_at {
            let elapsed = started_at.elapsed();
            if elapsed < HEARTBEAT_INTERVAL {
                std::thread::sleep(HEARTBEAT_INTERVAL - elapsed);
            }
        }
    }

    /// Advertise a record and store it for heartbeat re-announcement.
    pub(crate) fn advertise(&self, record: R) -> bool {
        if !self.inner.started.load(Ordering::Relaxed) {
            return false;
        }
        {
            let mut book = self.inner.book.lock();
            let records = book.local.entry(record.topic().to_string()).or_default();
            records.retain(|r| {
                r.node_uuid() != record.node_uuid()
                    || r.process_uuid() != record.process_uuid()
            });
            records.push(record.clone());
        }
        if record.scope() != Scope::Process {
            self.inner.broadcast_record(KIND_ADVERTISE, &record);
        }
        true
    }

    /// Withdraw every record this node holds for the topic.
    pub(crate) fn unadvertise(&self, topic: &str, node_uuid: &str) -> bool {
        if !self.inner.started.load(Ordering::Relaxed) {
            return false;
        }
        let removed: Vec<R> = {
            let mut book = self.inner.book.lock();
            let Some(records) = book.local.get_mut(topic) else {
                return true;
            };
            let (gone, kept): (Vec<R>, Vec<R>) = records
                .drain(..)
                .partition(|r| r.node_uuid() == node_uuid);
            *records = kept;
            if records.is_empty() {
                book.local.remove(topic);
            }
            gone
        };
        for record in &removed {
            if record.scope() != Scope::Process {
                self.inner.broadcast_record(KIND_UNADVERTISE, record);
            }
        }
        true
    }

    /// Ask the network for publishers of a topic. Already-known records
    /// are replayed through the connection callback inline, on the
    /// caller's thread.
    pub(crate) fn discover(&self, topic: &str) -> bool {
        if !self.inner.started.load(Ordering::Relaxed) {
            return false;
        }
        self.inner.broadcast(
            KIND_SUBSCRIBE,
            vec![topic.to_string().into_bytes()],
        );

        let known: Vec<R> = {
            let book = self.inner.book.lock();
            let mut known: Vec<R> = book
                .remote
                .get(topic)
                .map(|procs| procs.values().flatten().cloned().collect())
                .unwrap_or_default();
            if let Some(local) = book.local.get(topic) {
                known.extend(local.iter().cloned());
            }
            known
        };
        if !known.is_empty() {
            let cb = self.inner.connection_cb.lock().clone();
            if let Some(cb) = cb {
                for record in &known {
                    cb(record);
                }
            }
        }
        true
    }

    /// Every known publisher record for the topic, local and remote,
    /// keyed by process UUID.
    pub(crate) fn publishers(&self, topic: &str) -> HashMap<String, Vec<R>> {
        let book = self.inner.book.lock();
        let mut out: HashMap<String, Vec<R>> = HashMap::new();
        if let Some(procs) = book.remote.get(topic) {
            for (process_uuid, records) in procs {
                out.entry(process_uuid.clone())
                    .or_default()
                    .extend(records.iter().cloned());
            }
        }
        if let Some(local) = book.local.get(topic) {
            for record in local {
                out.entry(record.process_uuid().to_string())
                    .or_default()
                    .push(record.clone());
            }
        }
        out
    }

    /// Topics with at least one known publisher.
    pub(crate) fn topics(&self) -> Vec<String> {
        let book = self.inner.book.lock();
        let mut topics: Vec<String> = book
            .remote
            .iter()
            .filter(|(_, procs)| procs.values().any(|r| !r.is_empty()))
            .map(|(topic, _)| topic.clone())
            .chain(book.local.keys().cloned())
            .collect();
        topics.sort();
        topics.dedup();
        topics
    }

    fn spawn_receiver(&mut self, inproc_rx: Receiver<Vec<u8>>) {
        let inner = self.inner.clone();
        let exit = self.inner.exit.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("weft-disc-{}", self.inner.port))
            .spawn(move || {
                let mut buf = [0u8; 65536];
                loop {
                    if exit.load(Ordering::Relaxed) {
                        break;
                    }
                    while let Ok(datagram) = inproc_rx.try_recv() {
                        inner.handle_datagram(&datagram);
                    }
                    let Some(socket) = inner.socket.as_ref() else {
                        // No UDP socket: the in-process bus is the only
                        // source; wait for it on the channel instead.
                        match inproc_rx.recv_timeout(RECV_TICK) {
                            Ok(datagram) => inner.handle_datagram(&datagram),
                            Err(_) => continue,
                        }
                        continue;
                    };
                    match socket.recv_from(&mut buf) {
                        Ok((len, _)) => inner.handle_datagram(&buf[..len]),
                        Err(e)
                            if e.kind() == std::io::ErrorKind::WouldBlock
                                || e.kind() == std::io::ErrorKind::TimedOut => {}
                        Err(e) => {
                            log::debug!("discovery recv error: {}", e);
                        }
                    }
                }
            });
        match spawned {
            Ok(handle) => self.threads.push(handle),
            Err(e) => log::error!("failed to spawn discovery receiver: {}", e),
        }
    }

    fn spawn_heartbeat(&mut self) {
        let inner = self.inner.clone();
        let exit = self.inner.exit.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("weft-beat-{}", self.inner.port))
            .spawn(move || loop {
                if exit.load(Ordering::Relaxed) {
                    break;
                }
                std::thread::sleep(RECV_TICK);
                if !inner.started.load(Ordering::Relaxed) {
                    continue;
                }
                let due = {
                    let mut last = inner.last_beat.lock();
                    match *last {
                        Some(at) if at.elapsed() >= HEARTBEAT_INTERVAL => {
                            *last = Some(Instant::now());
                            true
                        }
                        _ => false,
                    }
                };
                if !due {
                    continue;
                }
                inner.broadcast(KIND_HEARTBEAT, Vec::new());
                let local: Vec<R> = {
                    let book = inner.book.lock();
                    book.local.values().flatten().cloned().collect()
                };
                for record in &local {
                    if record.scope() != Scope::Process {
                        inner.broadcast_record(KIND_ADVERTISE, record);
                    }
                }
                inner.purge_silent();
            });
        match spawned {
            Ok(handle) => self.threads.push(handle),
            Err(e) => log::error!("failed to spawn discovery heartbeat: {}", e),
        }
    }
}

impl<R: DiscoveryRecord> Drop for Discovery<R> {
    fn drop(&mut self) {
        if self.inner.started.load(Ordering::Relaxed) {
            self.inner.broadcast(KIND_BYE, Vec::new());
        }
        self.inner.exit.store(true, Ordering::Relaxed);
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
        let mut members = bus().members.lock();
        if let Some(list) = members.get_mut(&self.inner.port) {
            list.retain(|(id, _)| *id != self.inner.bus_id);
            if list.is_empty() {
                members.remove(&self.inner.port);
            }
        }
    }
}

impl<R: DiscoveryRecord> Inner<R> {
    fn broadcast(&self, kind: u8, mut payload: Vec<Vec<u8>>) {
        let mut frames = vec![
            MAGIC.to_vec(),
            vec![kind],
            self.process_uuid.clone().into_bytes(),
        ];
        frames.append(&mut payload);
        let datagram = wire::encode_frames(&frames);

        if let Some(socket) = &self.socket {
            if let Err(e) =
                socket.send_to(&datagram, SocketAddr::from((MULTICAST_GROUP, self.port)))
            {
                log::debug!("discovery send failed: {}", e);
            }
        }

        // Copy to the other beacons of this process.
        let members = bus().members.lock();
        if let Some(list) = members.get(&self.port) {
            for (id, tx) in list {
                if *id != self.bus_id {
                    let _ = tx.send(datagram.clone());
                }
            }
        }
    }

    fn broadcast_record(&self, kind: u8, record: &R) {
        self.broadcast(kind, record.encode_fields());
    }

    fn connection_cb(&self) -> Option<Callback<R>> {
        self.connection_cb.lock().clone()
    }

    fn disconnection_cb(&self) -> Option<Callback<R>> {
        self.disconnection_cb.lock().clone()
    }

    fn handle_datagram(&self, datagram: &[u8]) {
        let Some(frames) = wire::decode_frames(datagram) else {
            log::debug!("discovery: malformed datagram dropped");
            return;
        };
        if frames.len() < 3 || frames[0] != MAGIC {
            return;
        }
        let kind = match frames[1].first() {
            Some(kind) => *kind,
            None => return,
        };
        let Ok(sender) = String::from_utf8(frames[2].clone()) else {
            return;
        };
        if sender == self.process_uuid {
            return;
        }
        if !self.started.load(Ordering::Relaxed) {
            return;
        }

        self.book.lock().activity.insert(sender.clone(), Instant::now());

        match kind {
            KIND_ADVERTISE => self.on_advertise(&frames[3..]),
            KIND_SUBSCRIBE => self.on_subscribe(&frames[3..]),
            KIND_UNADVERTISE => self.on_unadvertise(&frames[3..]),
            KIND_HEARTBEAT => {}
            KIND_BYE => self.on_bye(&sender),
            other => log::debug!("discovery: unknown datagram kind {}", other),
        }
    }

    fn on_advertise(&self, fields: &[Vec<u8>]) {
        let Some(record) = R::decode_fields(fields) else {
            log::debug!("discovery: undecodable advertisement dropped");
            return;
        };
        if record.scope() == Scope::Host {
            let local_host = self.host.to_string();
            if endpoint_host(record.endpoint()) != Some(local_host.as_str()) {
                return;
            }
        }
        let fresh = {
            let mut book = self.book.lock();
            let records = book
                .remote
                .entry(record.topic().to_string())
                .or_default()
                .entry(record.process_uuid().to_string())
                .or_default();
            match records.iter_mut().find(|r| r.node_uuid() == record.node_uuid()) {
                Some(existing) => {
                    *existing = record.clone();
                    false
                }
                None => {
                    records.push(record.clone());
                    true
                }
            }
        };
        if fresh {
            log::debug!(
                "discovery: new publisher for [{}] from process [{}]",
                record.topic(),
                fingerprint(record.process_uuid())
            );
            if let Some(cb) = self.connection_cb() {
                cb(&record);
            }
        }
    }

    fn on_subscribe(&self, fields: &[Vec<u8>]) {
        let Some(topic) = fields.first().and_then(|f| String::from_utf8(f.clone()).ok())
        else {
            return;
        };
        let local: Vec<R> = {
            let book = self.book.lock();
            book.local.get(&topic).cloned().unwrap_or_default()
        };
        for record in &local {
            if record.scope() != Scope::Process {
                self.broadcast_record(KIND_ADVERTISE, record);
            }
        }
    }

    fn on_unadvertise(&self, fields: &[Vec<u8>]) {
        let Some(record) = R::decode_fields(fields) else {
            return;
        };
        let removed = {
            let mut book = self.book.lock();
            let mut removed = false;
            if let Some(procs) = book.remote.get_mut(record.topic()) {
                if let Some(records) = procs.get_mut(record.process_uuid()) {
                    let before = records.len();
                    records.retain(|r| r.node_uuid() != record.node_uuid());
                    removed = records.len() < before;
                    if records.is_empty() {
                        procs.remove(record.process_uuid());
                    }
                }
                if procs.is_empty() {
                    book.remote.remove(record.topic());
                }
            }
            removed
        };
        if removed {
            if let Some(cb) = self.disconnection_cb() {
                cb(&record);
            }
        }
    }

    fn on_bye(&self, process_uuid: &str) {
        let had_records = {
            let mut book = self.book.lock();
            book.activity.remove(process_uuid);
            let mut had = false;
            book.remote.retain(|_, procs| {
                had |= procs.remove(process_uuid).is_some();
                !procs.is_empty()
            });
            had
        };
        if had_records {
            log::debug!(
                "discovery: process [{}] left",
                fingerprint(process_uuid)
            );
            if let Some(cb) = self.disconnection_cb() {
                cb(&R::tombstone("", process_uuid, ""));
            }
        }
    }

    fn purge_silent(&self) {
        let silent: Vec<String> = {
            let book = self.book.lock();
            book.activity
                .iter()
                .filter(|(_, at)| at.elapsed() > SILENCE_TIMEOUT)
                .map(|(process_uuid, _)| process_uuid.clone())
                .collect()
        };
        for process_uuid in silent {
            self.on_bye(&process_uuid);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::AdvertiseServiceOptions;
    use std::sync::atomic::AtomicUsize;

    static TEST_PORT: AtomicU64 = AtomicU64::new(21000);

    fn test_port() -> u16 {
        TEST_PORT.fetch_add(1, Ordering::Relaxed) as u16
    }

    fn service_record(topic: &str, process_uuid: &str) -> ServicePublisher {
        ServicePublisher {
            topic: topic.into(),
            addr: "tcp://127.0.0.1:7000".into(),
            socket_id: "sid".into(),
            process_uuid: process_uuid.into(),
            node_uuid: "node".into(),
            req_type: "weft.msgs.Int32".into(),
            rep_type: "weft.msgs.Int32".into(),
            opts: AdvertiseServiceOptions::default(),
        }
    }

    #[test]
    fn advertisement_reaches_process_peer() {
        let port = test_port();
        let host: IpAddr = "127.0.0.1".parse().unwrap();
        let a = Discovery::<ServicePublisher>::new("proc-a", host, port);
        let b = Discovery::<ServicePublisher>::new("proc-b", host, port);

        let seen = Arc::new(AtomicUsize::new(0));
        let count = seen.clone();
        b.set_connections_cb(move |record| {
            assert_eq!(record.topic(), "@p@/calc");
            count.fetch_add(1, Ordering::Relaxed);
        });

        a.start();
        b.start();
        assert!(a.advertise(service_record("@p@/calc", "proc-a")));

        let deadline = Instant::now() + Duration::from_secs(2);
        while seen.load(Ordering::Relaxed) == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(seen.load(Ordering::Relaxed), 1);
        assert!(b.publishers("@p@/calc").contains_key("proc-a"));
    }

    #[test]
    fn duplicate_advertisements_coalesce() {
        let port = test_port();
        let host: IpAddr = "127.0.0.1".parse().unwrap();
        let a = Discovery::<ServicePublisher>::new("proc-a", host, port);
        let b = Discovery::<ServicePublisher>::new("proc-b", host, port);

        let seen = Arc::new(AtomicUsize::new(0));
        let count = seen.clone();
        b.set_connections_cb(move |_| {
            count.fetch_add(1, Ordering::Relaxed);
        });

        a.start();
        b.start();
        let record = service_record("@p@/calc", "proc-a");
        assert!(a.advertise(record.clone()));
        assert!(a.advertise(record));

        std::thread::sleep(Duration::from_millis(200));
        assert_eq!(seen.load(Ordering::Relaxed), 1);
        assert_eq!(b.publishers("@p@/calc")["proc-a"].len(), 1);
    }

    #[test]
    fn discover_replays_known_publishers_inline() {
        let port = test_port();
        let host: IpAddr = "127.0.0.1".parse().unwrap();
        let a = Discovery::<ServicePublisher>::new("proc-a", host, port);
        a.start();
        assert!(a.advertise(service_record("@p@/calc", "proc-a")));

        let seen = Arc::new(AtomicUsize::new(0));
        let count = seen.clone();
        a.set_connections_cb(move |_| {
            count.fetch_add(1, Ordering::Relaxed);
        });

        // Local records replay synchronously.
        assert!(a.discover("@p@/calc"));
        assert_eq!(seen.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn unadvertise_triggers_disconnection() {
        let port = test_port();
        let host: IpAddr = "127.0.0.1".parse().unwrap();
        let a = Discovery::<ServicePublisher>::new("proc-a", host, port);
        let b = Discovery::<ServicePublisher>::new("proc-b", host, port);

        let gone = Arc::new(AtomicUsize::new(0));
        let count = gone.clone();
        b.set_disconnections_cb(move |record| {
            assert_eq!(record.topic(), "@p@/calc");
            count.fetch_add(1, Ordering::Relaxed);
        });

        a.start();
        b.start();
        assert!(a.advertise(service_record("@p@/calc", "proc-a")));
        let deadline = Instant::now() + Duration::from_secs(2);
        while b.publishers("@p@/calc").is_empty() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }

        assert!(a.unadvertise("@p@/calc", "node"));
        let deadline = Instant::now() + Duration::from_secs(2);
        while gone.load(Ordering::Relaxed) == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(gone.load(Ordering::Relaxed), 1);
        assert!(b.publishers("@p@/calc").is_empty());
    }

    #[test]
    fn bye_purges_whole_process() {
        let port = test_port();
        let host: IpAddr = "127.0.0.1".parse().unwrap();
        let b = Discovery::<ServicePublisher>::new("proc-b", host, port);

        let gone = Arc::new(AtomicUsize::new(0));
        let count = gone.clone();
        b.set_disconnections_cb(move |record| {
            assert!(record.topic().is_empty());
            assert_eq!(record.process_uuid(), "proc-a");
            count.fetch_add(1, Ordering::Relaxed);
        });
        b.start();

        {
            let a = Discovery::<ServicePublisher>::new("proc-a", host, port);
            a.start();
            assert!(a.advertise(service_record("@p@/calc", "proc-a")));
            let deadline = Instant::now() + Duration::from_secs(2);
            while b.publishers("@p@/calc").is_empty() && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(10));
            }
            // Dropping the beacon broadcasts BYE.
        }

        let deadline = Instant::now() + Duration::from_secs(2);
        while gone.load(Ordering::Relaxed) == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(gone.load(Ordering::Relaxed), 1);
        assert!(b.publishers("@p@/calc").is_empty());
    }

    #[test]
    fn queries_are_answered_with_advertisements() {
        let port = test_port();
        let host: IpAddr = "127.0.0.1".parse().unwrap();
        let a = Discovery::<ServicePublisher>::new("proc-a", host, port);
        a.start();
        assert!(a.advertise(service_record("@p@/calc", "proc-a")));

        // b starts after a advertised, so it must learn via its query.
        let b = Discovery::<ServicePublisher>::new("proc-b", host, port);
        b.start();
        assert!(b.discover("@p@/calc"));

        let deadline = Instant::now() + Duration::from_secs(2);
        while b.publishers("@p@/calc").is_empty() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(b.publishers("@p@/calc").contains_key("proc-a"));
    }

    #[test]
    fn process_scope_stays_local() {
        let port = test_port();
        let host: IpAddr = "127.0.0.1".parse().unwrap();
        let a = Discovery::<ServicePublisher>::new("proc-a", host, port);
        let b = Discovery::<ServicePublisher>::new("proc-b", host, port);
        a.start();
        b.start();

        let mut record = service_record("@p@/private", "proc-a");
        record.opts.scope = Scope::Process;
        assert!(a.advertise(record));

        std::thread::sleep(Duration::from_millis(200));
        assert!(b.publishers("@p@/private").is_empty());
        // The advertiser itself still sees it.
        assert!(a.publishers("@p@/private").contains_key("proc-a"));
    }
}
