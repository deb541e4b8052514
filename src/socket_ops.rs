//! db-router-core/src/socket_ops.rs
//! The socket capability behind `Route`: binding listeners and dialing
//! destinations, abstracted so production code can supply real `tokio::net`
//! sockets and tests can supply scripted ones, per the same
//! narrow-async-trait-behind-an-`Arc` shape as `destination.rs`'s
//! `MetadataCache`.

use crate::address::Address;
use crate::connect::{self, ConnectOutcome};
use crate::stream::BoxedStream;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tokio::net::{TcpListener, UnixListener};

/// One bound listener, already stripped down to "give me the next
/// connection" — `Route`'s accept loop never needs to know whether it's
/// talking to a `TcpListener` or a Unix-domain one.
#[async_trait]
pub trait Listener: Send + Sync {
    async fn accept(&self) -> std::io::Result<(BoxedStream, SocketAddr)>;
}

#[async_trait]
impl Listener for TcpListener {
    async fn accept(&self) -> std::io::Result<(BoxedStream, SocketAddr)> {
        let (stream, addr) = TcpListener::accept(self).await?;
        let _ = stream.set_nodelay(true);
        Ok((Box::new(stream), addr))
    }
}

/// Wraps a `UnixListener` so its accepted connections carry a synthetic
/// loopback peer address (local-domain peers have no routable `SocketAddr`
/// of their own; see `RouteConfig`'s blacklist accounting).
struct UnixListenerAdapter(UnixListener);

#[async_trait]
impl Listener for UnixListenerAdapter {
    async fn accept(&self) -> std::io::Result<(BoxedStream, SocketAddr)> {
        let (stream, _addr) = self.0.accept().await?;
        let synthetic = SocketAddr::new(std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST), 0);
        Ok((Box::new(stream), synthetic))
    }
}

/// The capability interface `Route` dials and binds through. Realized once
/// by [`TokioSocketOps`] in production and once by a scripted mock in tests,
/// so a `Route`'s admission and relay logic can be exercised without real
/// loopback sockets or sleep-based timing.
#[async_trait]
pub trait SocketOps: Send + Sync {
    async fn bind_tcp(&self, addr: &str) -> std::io::Result<Box<dyn Listener>>;
    async fn bind_unix(&self, path: &Path) -> std::io::Result<Box<dyn Listener>>;
    async fn connect(&self, addr: &Address, timeout: Duration) -> ConnectOutcome;
}

pub struct TokioSocketOps;

#[async_trait]
impl SocketOps for TokioSocketOps {
    async fn bind_tcp(&self, addr: &str) -> std::io::Result<Box<dyn Listener>> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Box::new(listener))
    }

    async fn bind_unix(&self, path: &Path) -> std::io::Result<Box<dyn Listener>> {
        let _ = std::fs::remove_file(path);
        let listener = UnixListener::bind(path)?;
        Ok(Box::new(UnixListenerAdapter(listener)))
    }

    async fn connect(&self, addr: &Address, timeout: Duration) -> ConnectOutcome {
        connect::connect(addr, timeout).await
    }
}
