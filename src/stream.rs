//! db-router-core/src/stream.rs
//! A unified dynamic async stream, so the accept loop can hand a TCP or a
//! local-domain socket to the same relay code. Mirrors the teacher's
//! `AsyncStreamTrait`/`AsyncStream` indirection in `types.rs`, minus the
//! raw-fd extraction that existed there only for the FFI bridge.

use tokio::io::{AsyncRead, AsyncWrite};

pub trait DynStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> DynStream for T {}

/// A client or backend connection whose concrete transport (TCP, Unix
/// domain socket) the relay no longer needs to know.
pub type BoxedStream = Box<dyn DynStream>;
