//! db-router-core/src/route.rs
//! One configured listener: bind targets, destination set, bounded pool of
//! active client<->backend pairs, and the client-error blacklist.

use crate::address::{AccessMode, Address, ProtocolKind};
use crate::connect::ConnectOutcome;
use crate::destination::DestinationSet;
use crate::error::RouterError;
use crate::metrics::{RouteMetrics, RouteMetricsSnapshot};
use crate::protocol::{build_classic_packet, build_extended_message, ProtocolFramer, PumpOutcome};
use crate::socket_ops::{Listener, SocketOps, TokioSocketOps};
use crate::stream::BoxedStream;
use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

/// Configuration needed to build a `Route`; validated once at construction
/// time and never mutated afterward (a `Route` cannot be reconfigured
/// while started).
pub struct RouteConfig {
    pub name: String,
    pub access_mode: AccessMode,
    pub protocol: ProtocolKind,
    pub bind_tcp: Option<Address>,
    pub bind_local_path: Option<PathBuf>,
    pub destinations: DestinationSet,
    pub max_connections: u32,
    pub connect_timeout: Duration,
    pub client_connect_timeout: Duration,
    pub net_buffer_len: usize,
    pub max_connect_errors: u64,
    /// Capability handle for binding listeners and dialing destinations.
    /// Production callers pass `Arc::new(TokioSocketOps)`; tests can pass a
    /// scripted mock instead of spinning up real loopback sockets.
    pub socket_ops: Arc<dyn SocketOps>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RouteState {
    Configured,
    Started,
    Stopping,
    Stopped,
}

/// Upper bound on how long a rejection write is allowed to block the task
/// that sends it — never the accept loop itself, which spawns it off.
const REJECTION_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

struct Blacklist {
    error_counters: HashMap<IpAddr, u64>,
    blocked: HashSet<IpAddr>,
}

impl Blacklist {
    fn new() -> Self {
        Blacklist {
            error_counters: HashMap::new(),
            blocked: HashSet::new(),
        }
    }

    fn is_blocked(&self, ip: IpAddr) -> bool {
        self.blocked.contains(&ip)
    }

    /// Returns the updated count and whether this call is what pushed the
    /// IP over the threshold.
    fn record_failure(&mut self, ip: IpAddr, threshold: u64) -> (u64, bool) {
        let count = self.error_counters.entry(ip).or_insert(0);
        *count += 1;
        let newly_blocked = *count >= threshold && !self.blocked.contains(&ip);
        if *count >= threshold {
            self.blocked.insert(ip);
        }
        (*count, newly_blocked)
    }

    fn reset(&mut self, ip: IpAddr) {
        self.error_counters.insert(ip, 0);
    }
}

pub struct Route {
    name: String,
    access_mode: AccessMode,
    protocol: ProtocolKind,
    bind_tcp: Option<Address>,
    bind_local_path: Option<PathBuf>,
    destinations: Arc<DestinationSet>,
    max_connections: u32,
    connect_timeout: Duration,
    client_connect_timeout: Duration,
    net_buffer_len: usize,
    max_connect_errors: u64,
    socket_ops: Arc<dyn SocketOps>,

    active: Arc<AtomicU32>,
    blacklist: Arc<std::sync::Mutex<Blacklist>>,
    metrics: Arc<RouteMetrics>,
    state: AsyncMutex<RouteState>,
    cancel: CancellationToken,
    listener_tasks: AsyncMutex<Vec<tokio::task::JoinHandle<()>>>,
    pair_tasks: Arc<AsyncMutex<JoinSet<()>>>,
}

impl Route {
    pub fn new(cfg: RouteConfig) -> Result<Arc<Self>, RouterError> {
        if cfg.bind_tcp.is_none() && cfg.bind_local_path.is_none() {
            return Err(RouterError::NoBindTarget(cfg.name));
        }
        Ok(Arc::new(Route {
            name: cfg.name,
            access_mode: cfg.access_mode,
            protocol: cfg.protocol,
            bind_tcp: cfg.bind_tcp,
            bind_local_path: cfg.bind_local_path,
            destinations: Arc::new(cfg.destinations),
            max_connections: cfg.max_connections,
            connect_timeout: cfg.connect_timeout,
            client_connect_timeout: cfg.client_connect_timeout,
            net_buffer_len: cfg.net_buffer_len,
            max_connect_errors: cfg.max_connect_errors,
            socket_ops: cfg.socket_ops,
            active: Arc::new(AtomicU32::new(0)),
            blacklist: Arc::new(std::sync::Mutex::new(Blacklist::new())),
            metrics: Arc::new(RouteMetrics::new()),
            state: AsyncMutex::new(RouteState::Configured),
            cancel: CancellationToken::new(),
            listener_tasks: AsyncMutex::new(Vec::new()),
            pair_tasks: Arc::new(AsyncMutex::new(JoinSet::new())),
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn active_connections(&self) -> u32 {
        self.active.load(Ordering::SeqCst)
    }

    pub fn metrics_snapshot(&self) -> RouteMetricsSnapshot {
        let blocked = self.blacklist.lock().unwrap().blocked.len();
        self.metrics.snapshot(self.active_connections(), blocked)
    }

    /// Binds every configured listener and spawns its accept loop. Fails
    /// with `RouterError::BindFailed` without having spawned anything if
    /// any listener fails to bind.
    pub async fn start(self: &Arc<Self>) -> Result<(), RouterError> {
        let mut state = self.state.lock().await;
        if *state != RouteState::Configured {
            return Err(RouterError::AlreadyStarted(self.name.clone()));
        }

        let mut tasks = Vec::new();

        if let Some(addr) = &self.bind_tcp {
            let bind_str = addr.to_string();
            let listener = self.socket_ops.bind_tcp(&bind_str).await.map_err(|source| {
                RouterError::BindFailed {
                    route: self.name.clone(),
                    addr: bind_str.clone(),
                    source,
                }
            })?;
            let route = Arc::clone(self);
            tasks.push(tokio::spawn(
                async move { route.run_accept_loop(listener).await }
                    .instrument(tracing::info_span!("route_accept", route = %route_name(&route), transport = "tcp")),
            ));
        }

        if let Some(path) = &self.bind_local_path {
            let listener = self.socket_ops.bind_unix(path).await.map_err(|source| {
                RouterError::BindFailed {
                    route: self.name.clone(),
                    addr: path.display().to_string(),
                    source,
                }
            })?;
            let route = Arc::clone(self);
            tasks.push(tokio::spawn(
                async move { route.run_accept_loop(listener).await }
                    .instrument(tracing::info_span!("route_accept", route = %route_name(&route), transport = "unix")),
            ));
        }

        *self.listener_tasks.lock().await = tasks;
        *state = RouteState::Started;
        info!(route = %self.name, "route started");
        Ok(())
    }

    /// Unblocks every accept loop, waits for them to return, then waits for
    /// every in-flight pair worker to finish. Idempotent.
    pub async fn stop(self: &Arc<Self>) {
        let mut state = self.state.lock().await;
        if *state == RouteState::Stopping || *state == RouteState::Stopped {
            return;
        }
        *state = RouteState::Stopping;
        drop(state);

        self.cancel.cancel();

        let listener_tasks = std::mem::take(&mut *self.listener_tasks.lock().await);
        for task in listener_tasks {
            let _ = task.await;
        }

        let mut pair_tasks = self.pair_tasks.lock().await;
        while pair_tasks.join_next().await.is_some() {}

        *self.state.lock().await = RouteState::Stopped;
        info!(route = %self.name, "route stopped");
    }

    async fn run_accept_loop(self: Arc<Self>, listener: Box<dyn Listener>) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer_addr)) => {
                            self.on_accept(stream, peer_addr).await;
                        }
                        Err(e) => {
                            warn!(route = %self.name, error = %e, "accept error");
                        }
                    }
                }
            }
        }
    }

    async fn on_accept(self: &Arc<Self>, client: BoxedStream, peer_addr: SocketAddr) {
        let ip = peer_addr.ip();
        let blocked = self.blacklist.lock().unwrap().is_blocked(ip);
        let at_capacity = self.active.load(Ordering::SeqCst) >= self.max_connections;

        if blocked || at_capacity {
            self.metrics
                .total_admission_rejections
                .fetch_add(1, Ordering::Relaxed);
            debug!(route = %self.name, %ip, blocked, at_capacity, "rejecting connection");
            // A rejected client that never reads its error frame must not be
            // able to stall this accept loop: the write happens on its own
            // task, bounded by a timeout, instead of being awaited here.
            let route = Arc::clone(self);
            let mut client = client;
            tokio::spawn(async move {
                let _ = tokio::time::timeout(
                    REJECTION_WRITE_TIMEOUT,
                    route.send_rejection(&mut client),
                )
                .await;
            });
            return;
        }

        self.active.fetch_add(1, Ordering::SeqCst);
        self.metrics.total_accepted.fetch_add(1, Ordering::Relaxed);

        let route = Arc::clone(self);
        let span = tracing::info_span!("route_pair", route = %self.name, %ip);
        self.pair_tasks.lock().await.spawn(
            async move { route.run_pair(client, peer_addr).await }.instrument(span),
        );
    }

    async fn run_pair(self: Arc<Self>, client: BoxedStream, peer_addr: SocketAddr) {
        let ip = peer_addr.ip();
        let bind_addr = self
            .bind_tcp
            .clone()
            .unwrap_or(Address { host: String::new(), port: 0 });

        let dest_count = self.destinations.len(self.access_mode).await.max(1);

        // `client_connect_timeout` bounds the whole handshake-phase admission
        // window: the time the client is allowed to sit waiting while we try
        // every configured destination. A client that exceeds it is treated
        // the same as one that exhausted every destination.
        let dial_all = async {
            let mut dialed: Option<(Address, BoxedStream)> = None;
            for _ in 0..dest_count {
                let Some(candidate) = self.destinations.next(self.access_mode).await else {
                    break;
                };
                if candidate == bind_addr {
                    continue;
                }
                match self.socket_ops.connect(&candidate, self.connect_timeout).await {
                    ConnectOutcome::Connected(stream) => {
                        dialed = Some((candidate, stream));
                        break;
                    }
                    ConnectOutcome::Refused(e) => {
                        debug!(route = %self.name, %ip, destination = %candidate, error = %e, "backend refused connection");
                    }
                    ConnectOutcome::Timeout => {
                        debug!(route = %self.name, %ip, destination = %candidate, "backend connect timed out");
                    }
                }
            }
            dialed
        };
        let dialed = tokio::time::timeout(self.client_connect_timeout, dial_all)
            .await
            .unwrap_or(None);

        match dialed {
            None => {
                self.metrics
                    .total_connect_failures
                    .fetch_add(1, Ordering::Relaxed);
                let (count, newly_blocked) = {
                    let mut bl = self.blacklist.lock().unwrap();
                    bl.record_failure(ip, self.max_connect_errors)
                };
                if newly_blocked {
                    warn!(route = %self.name, %ip, count, "client blocked after repeated connect failures");
                }
                let mut client = client;
                let _ = tokio::time::timeout(
                    REJECTION_WRITE_TIMEOUT,
                    self.send_rejection(&mut client),
                )
                .await;
            }
            Some((backend_addr, backend_stream)) => {
                self.blacklist.lock().unwrap().reset(ip);
                self.run_relay(client, backend_stream, peer_addr, backend_addr)
                    .await;
            }
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    async fn run_relay(
        &self,
        client: BoxedStream,
        backend: BoxedStream,
        peer_addr: SocketAddr,
        backend_addr: Address,
    ) {
        let (mut client_rd, mut client_wr) = tokio::io::split(client);
        let (mut backend_rd, mut backend_wr) = tokio::io::split(backend);

        let mut up_framer = self.new_framer();
        let mut down_framer = self.new_framer();
        let mut up_buf = vec![0u8; self.net_buffer_len];
        let mut down_buf = vec![0u8; self.net_buffer_len];

        let mut up_done = false;
        let mut down_done = false;

        loop {
            if up_done && down_done {
                break;
            }
            tokio::select! {
                res = up_framer.pump(&mut client_rd, &mut backend_wr, &mut up_buf, true), if !up_done => {
                    match res {
                        Ok(PumpOutcome::Progressed { bytes }) => {
                            self.metrics.bytes_up.fetch_add(bytes, Ordering::Relaxed);
                        }
                        Ok(PumpOutcome::Eof) => {
                            // EOF on one direction only ever stops that direction: the
                            // peer's write half is shut down, but the surviving
                            // direction keeps draining until it independently
                            // finishes (mirrors copy_bidirectional_with_metrics).
                            if !up_framer.graceful_eof_expected() {
                                debug!(%peer_addr, backend = %backend_addr, "client closed without a connection-close message");
                            }
                            up_done = true;
                            use tokio::io::AsyncWriteExt;
                            let _ = backend_wr.shutdown().await;
                        }
                        Err(e) => {
                            debug!(%peer_addr, backend = %backend_addr, error = %e, "relay error client->backend");
                            break;
                        }
                    }
                }
                res = down_framer.pump(&mut backend_rd, &mut client_wr, &mut down_buf, true), if !down_done => {
                    match res {
                        Ok(PumpOutcome::Progressed { bytes }) => {
                            self.metrics.bytes_down.fetch_add(bytes, Ordering::Relaxed);
                        }
                        Ok(PumpOutcome::Eof) => {
                            if !down_framer.graceful_eof_expected() {
                                debug!(%peer_addr, backend = %backend_addr, "backend closed without a connection-close message");
                            }
                            down_done = true;
                            use tokio::io::AsyncWriteExt;
                            let _ = client_wr.shutdown().await;
                        }
                        Err(e) => {
                            debug!(%peer_addr, backend = %backend_addr, error = %e, "relay error backend->client");
                            break;
                        }
                    }
                }
            }
        }
    }

    fn new_framer(&self) -> ProtocolFramer {
        match self.protocol {
            ProtocolKind::Classic => ProtocolFramer::new_classic(),
            ProtocolKind::Extended => ProtocolFramer::new_extended(),
        }
    }

    /// Sends a protocol-specific fatal error frame to a client that will
    /// not be proxied (blacklisted, over capacity, or every destination
    /// failed), then lets the stream drop.
    async fn send_rejection(&self, client: &mut BoxedStream) -> std::io::Result<()> {
        use tokio::io::AsyncWriteExt;
        let packet = match self.protocol {
            ProtocolKind::Classic => {
                let mut payload = vec![0xffu8];
                payload.extend_from_slice(&1040u16.to_le_bytes()); // ER_CON_COUNT_ERROR
                payload.push(b'#');
                payload.extend_from_slice(b"HY000");
                payload.extend_from_slice(b"Too many connections");
                build_classic_packet(0, &payload)
            }
            ProtocolKind::Extended => {
                build_extended_message(2, b"Fatal: connection rejected by router")
            }
        };
        client.write_all(&packet).await?;
        client.shutdown().await
    }
}

fn route_name(route: &Arc<Route>) -> String {
    route.name.clone()
}

/// Derives the short, stable name used to tag a pair worker's tracing span
/// (and, in a thread-per-connection realization, its OS thread name).
/// A pure function of its two inputs, clipped so the combined
/// `prefix:suffix` never exceeds 15 characters.
pub fn make_thread_name(route_name: &str, prefix: &str) -> String {
    const MARKER: &str = "_default_";
    let suffix = if !route_name.starts_with("routing") {
        "parse err".to_string()
    } else {
        let rest = &route_name["routing".len()..];
        match rest.strip_prefix(':') {
            Some(after_colon) => match after_colon.find(MARKER) {
                Some(idx) => after_colon[idx + MARKER.len()..].to_string(),
                None => after_colon.to_string(),
            },
            None => rest.to_string(),
        }
    };
    let full = format!("{prefix}:{suffix}");
    full.chars().take(15).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket_ops::mock::MockSocketOps;
    use tokio::net::{TcpListener, TcpStream};

    #[test]
    fn thread_name_strips_default_marker() {
        assert_eq!(
            make_thread_name("routing:test_default_x_ro", "RtS"),
            "RtS:x_ro"
        );
    }

    #[test]
    fn thread_name_empty_suffix_when_bare_routing() {
        assert_eq!(make_thread_name("routing", "RtS"), "RtS:");
    }

    #[test]
    fn thread_name_parse_err_for_non_routing_names() {
        assert_eq!(make_thread_name("", "pre"), "pre:parse err");
    }

    #[test]
    fn thread_name_clips_to_fifteen_chars() {
        assert_eq!(
            make_thread_name("routing:test_def_ult_x_ro", "RtS"),
            "RtS:test_def_ul"
        );
    }

    #[test]
    fn thread_name_is_pure() {
        let a = make_thread_name("routing:foo_default_bar", "X");
        let b = make_thread_name("routing:foo_default_bar", "X");
        assert_eq!(a, b);
    }

    async fn free_port() -> u16 {
        let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
        l.local_addr().unwrap().port()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn end_to_end_loopback_tracks_active_connections() {
        let backend_port = free_port().await;
        let backend_listener = TcpListener::bind(("127.0.0.1", backend_port)).await.unwrap();
        tokio::spawn(async move {
            loop {
                match backend_listener.accept().await {
                    Ok((mut s, _)) => {
                        tokio::spawn(async move {
                            let mut buf = [0u8; 64];
                            use tokio::io::{AsyncReadExt, AsyncWriteExt};
                            loop {
                                match s.read(&mut buf).await {
                                    Ok(0) | Err(_) => break,
                                    Ok(n) => {
                                        if s.write_all(&buf[..n]).await.is_err() {
                                            break;
                                        }
                                    }
                                }
                            }
                        });
                    }
                    Err(_) => break,
                }
            }
        });

        let route_port = free_port().await;
        let bind_addr = Address {
            host: "127.0.0.1".to_string(),
            port: route_port,
        };
        let destinations = DestinationSet::from_csv(
            &format!("127.0.0.1:{backend_port}"),
            ProtocolKind::Classic,
            &bind_addr,
        )
        .unwrap();

        let route = Route::new(RouteConfig {
            name: "routing:test_default_loopback".to_string(),
            access_mode: AccessMode::ReadWrite,
            protocol: ProtocolKind::Classic,
            bind_tcp: Some(bind_addr),
            bind_local_path: None,
            destinations,
            max_connections: 10,
            connect_timeout: Duration::from_secs(1),
            client_connect_timeout: Duration::from_secs(9),
            net_buffer_len: 4096,
            max_connect_errors: 100,
            socket_ops: Arc::new(TokioSocketOps),
        })
        .unwrap();

        route.start().await.unwrap();
        // Let the accept loop actually bind/listen before dialing it.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let c1 = TcpStream::connect(("127.0.0.1", route_port)).await.unwrap();
        let c2 = TcpStream::connect(("127.0.0.1", route_port)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(route.active_connections(), 2);

        drop(c1);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(route.active_connections(), 1);

        drop(c2);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(route.active_connections(), 0);

        route.stop().await;
        assert_eq!(route.active_connections(), 0);
    }

    fn dummy_route(protocol: ProtocolKind) -> Arc<Route> {
        let bind_addr = Address {
            host: "127.0.0.1".to_string(),
            port: 0,
        };
        let destinations = DestinationSet::from_csv(
            "127.0.0.1:1",
            protocol,
            &Address {
                host: "127.0.0.1".to_string(),
                port: 9999,
            },
        )
        .unwrap();
        Route::new(RouteConfig {
            name: "routing:test_default_relay".to_string(),
            access_mode: AccessMode::ReadWrite,
            protocol,
            bind_tcp: Some(bind_addr),
            bind_local_path: None,
            destinations,
            max_connections: 10,
            connect_timeout: Duration::from_secs(1),
            client_connect_timeout: Duration::from_secs(1),
            net_buffer_len: 4096,
            max_connect_errors: 100,
            socket_ops: Arc::new(TokioSocketOps),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn graceful_connection_close_lets_the_other_direction_keep_running() {
        use crate::protocol::build_extended_message;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let route = dummy_route(ProtocolKind::Extended);
        let (mut test_client, route_client) = tokio::io::duplex(1024);
        let (mut test_backend, route_backend) = tokio::io::duplex(1024);

        // ConnectionClose, type=3, no payload, then the client's write half
        // closes. Its read half stays open so the test can observe whether
        // the down direction keeps relaying.
        test_client.write_all(&[0x01, 0x00, 0x00, 0x00, 0x03]).await.unwrap();
        test_client.shutdown().await.unwrap();

        let peer_addr: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let backend_addr = Address {
            host: "127.0.0.1".to_string(),
            port: 1,
        };
        let relay = tokio::spawn(async move {
            route
                .run_relay(Box::new(route_client), Box::new(route_backend), peer_addr, backend_addr)
                .await;
        });

        let msg = build_extended_message(1, b"still alive");
        test_backend.write_all(&msg).await.unwrap();

        let mut buf = vec![0u8; msg.len()];
        tokio::time::timeout(Duration::from_secs(1), test_client.read_exact(&mut buf))
            .await
            .expect("down direction should still be relaying after a graceful close")
            .unwrap();
        assert_eq!(buf, msg);

        drop(test_backend);
        tokio::time::timeout(Duration::from_secs(1), relay).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn plain_eof_on_one_direction_does_not_stop_the_other() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        // Classic never sets `graceful_eof_expected`, so this exercises the
        // ordinary "client hangs up its write half mid-response" case: the
        // up direction must stop without killing the still-open down
        // direction, matching copy_bidirectional_with_metrics's
        // shutdown-the-peer-not-the-whole-pair behavior.
        let route = dummy_route(ProtocolKind::Classic);
        let (mut test_client, route_client) = tokio::io::duplex(1024);
        let (mut test_backend, route_backend) = tokio::io::duplex(1024);

        // Client closes its write half only; its read half stays open so we
        // can observe whether the backend->client direction keeps relaying.
        test_client.shutdown().await.unwrap();

        let peer_addr: SocketAddr = "127.0.0.1:4002".parse().unwrap();
        let backend_addr = Address {
            host: "127.0.0.1".to_string(),
            port: 1,
        };
        let relay = tokio::spawn(async move {
            route
                .run_relay(Box::new(route_client), Box::new(route_backend), peer_addr, backend_addr)
                .await;
        });

        let payload = build_classic_packet(0, b"still flowing after client eof");
        test_backend.write_all(&payload).await.unwrap();

        let mut buf = vec![0u8; payload.len()];
        tokio::time::timeout(Duration::from_secs(1), test_client.read_exact(&mut buf))
            .await
            .expect("down direction should keep relaying after a plain client eof")
            .unwrap();
        assert_eq!(buf, payload);

        // Now the backend goes away too; only then should the pair tear down.
        drop(test_backend);
        tokio::time::timeout(Duration::from_secs(1), relay)
            .await
            .expect("relay should finish once both directions have reached eof")
            .unwrap();
    }

    #[tokio::test]
    async fn admission_rejects_once_at_capacity() {
        let backend_port = free_port().await;
        // Nothing accepts on the backend port; connections should be
        // rejected for exceeding capacity long before a backend dial
        // would even matter, since max_connections is set to zero.
        let bind_addr = Address {
            host: "127.0.0.1".to_string(),
            port: free_port().await,
        };
        let destinations = DestinationSet::from_csv(
            &format!("127.0.0.1:{backend_port}"),
            ProtocolKind::Classic,
            &bind_addr,
        )
        .unwrap();

        let route = Route::new(RouteConfig {
            name: "routing:test_default_cap".to_string(),
            access_mode: AccessMode::ReadWrite,
            protocol: ProtocolKind::Classic,
            bind_tcp: Some(bind_addr.clone()),
            bind_local_path: None,
            destinations,
            max_connections: 0,
            connect_timeout: Duration::from_millis(200),
            client_connect_timeout: Duration::from_secs(9),
            net_buffer_len: 4096,
            max_connect_errors: 100,
            socket_ops: Arc::new(TokioSocketOps),
        })
        .unwrap();

        route.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let mut client = TcpStream::connect((bind_addr.host.as_str(), bind_addr.port))
            .await
            .unwrap();
        use tokio::io::AsyncReadExt;
        let mut buf = [0u8; 64];
        let n = client.read(&mut buf).await.unwrap();
        assert!(n > 0, "rejected client should receive an error frame");
        assert_eq!(route.metrics_snapshot().total_admission_rejections, 1);

        route.stop().await;
    }

    /// Exercises a route entirely through `MockSocketOps`: no loopback
    /// sockets, no sleep-based admission timing — the accepted connection
    /// and the backend dial are both scripted, and the pair's progress is
    /// observed by reading the relayed bytes themselves.
    #[tokio::test]
    async fn mock_socket_ops_drives_a_connection_through_the_route() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::sync::mpsc;

        let (test_client, route_client) = tokio::io::duplex(1024);
        let (mut test_backend, route_backend): (_, BoxedStream) = {
            let (a, b) = tokio::io::duplex(1024);
            (a, Box::new(b))
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let peer_addr: SocketAddr = "127.0.0.1:9100".parse().unwrap();
        tx.send((Box::new(route_client) as BoxedStream, peer_addr))
            .unwrap();

        let socket_ops = Arc::new(MockSocketOps::new(
            rx,
            vec![ConnectOutcome::Connected(route_backend)],
        ));

        let bind_addr = Address {
            host: "127.0.0.1".to_string(),
            port: 0,
        };
        let destinations = DestinationSet::from_csv(
            "127.0.0.1:1",
            ProtocolKind::Classic,
            &Address {
                host: "127.0.0.1".to_string(),
                port: 9999,
            },
        )
        .unwrap();
        let route = Route::new(RouteConfig {
            name: "routing:test_default_mock".to_string(),
            access_mode: AccessMode::ReadWrite,
            protocol: ProtocolKind::Classic,
            bind_tcp: Some(bind_addr),
            bind_local_path: None,
            destinations,
            max_connections: 10,
            connect_timeout: Duration::from_secs(1),
            client_connect_timeout: Duration::from_secs(1),
            net_buffer_len: 4096,
            max_connect_errors: 100,
            socket_ops,
        })
        .unwrap();

        route.start().await.unwrap();

        let mut test_client = test_client;
        let payload = build_classic_packet(0, b"hello from mock client");
        test_client.write_all(&payload).await.unwrap();

        let mut buf = vec![0u8; payload.len()];
        tokio::time::timeout(Duration::from_secs(1), test_backend.read_exact(&mut buf))
            .await
            .expect("mocked backend should receive the relayed bytes")
            .unwrap();
        assert_eq!(buf, payload);
        assert_eq!(route.active_connections(), 1);

        route.stop().await;
    }

    #[tokio::test]
    async fn total_accepted_is_monotonic_across_connect_disconnect_cycles() {
        let backend_port = free_port().await;
        let backend_listener = TcpListener::bind(("127.0.0.1", backend_port)).await.unwrap();
        tokio::spawn(async move {
            loop {
                match backend_listener.accept().await {
                    Ok((_s, _)) => {}
                    Err(_) => break,
                }
            }
        });

        let route_port = free_port().await;
        let bind_addr = Address {
            host: "127.0.0.1".to_string(),
            port: route_port,
        };
        let destinations = DestinationSet::from_csv(
            &format!("127.0.0.1:{backend_port}"),
            ProtocolKind::Classic,
            &bind_addr,
        )
        .unwrap();

        let route = Route::new(RouteConfig {
            name: "routing:test_default_monotonic".to_string(),
            access_mode: AccessMode::ReadWrite,
            protocol: ProtocolKind::Classic,
            bind_tcp: Some(bind_addr),
            bind_local_path: None,
            destinations,
            max_connections: 10,
            connect_timeout: Duration::from_secs(1),
            client_connect_timeout: Duration::from_secs(9),
            net_buffer_len: 4096,
            max_connect_errors: 100,
            socket_ops: Arc::new(TokioSocketOps),
        })
        .unwrap();

        route.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let mut last_total_accepted = 0;
        for cycle in 1..=5u64 {
            let client = TcpStream::connect(("127.0.0.1", route_port)).await.unwrap();
            tokio::time::sleep(Duration::from_millis(30)).await;

            let snap = route.metrics_snapshot();
            assert_eq!(snap.total_accepted, cycle);
            assert!(
                snap.total_accepted >= last_total_accepted,
                "total_accepted must never decrease across cycles"
            );
            last_total_accepted = snap.total_accepted;
            assert_eq!(route.active_connections(), 1);

            drop(client);
            tokio::time::sleep(Duration::from_millis(30)).await;
            assert_eq!(route.active_connections(), 0);
            assert_eq!(route.metrics_snapshot().total_accepted, cycle);
        }

        route.stop().await;
    }
}
