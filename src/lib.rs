//! db-router-core/src/lib.rs
//! Connection routing core for a stateless L4/L7 proxy in front of a
//! database server: accept/dispatch loop, per-connection byte relay,
//! outbound connect procedure, and destination selection. Configuration
//! parsing, the metadata-cache implementation, TLS, and the wire-protocol
//! authentication handshake are external collaborators the core only
//! talks to through narrow interfaces (`destination::MetadataCache`,
//! `config::RouterConfig`).

pub mod address;
pub mod config;
pub mod connect;
pub mod destination;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod protocol;
pub mod route;
pub mod router;
pub mod socket_ops;
pub mod stream;

pub use address::{AccessMode, Address, ProtocolKind};
pub use error::RouterError;
pub use router::Router;
