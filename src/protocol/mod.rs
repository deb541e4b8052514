//! db-router-core/src/protocol/mod.rs
//! Per-protocol byte pumps: one bounded read, a drained write, and a running
//! packet/message boundary tracker that survives across calls.

mod classic;
mod extended;

pub use classic::{build_packet as build_classic_packet, ClassicFramer};
pub use extended::{build_message as build_extended_message, ExtendedFramer};

use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Result of one `pump` call: either some bytes were moved, or the source
/// reached EOF.
#[derive(Debug, PartialEq, Eq)]
pub enum PumpOutcome {
    Progressed { bytes: u64 },
    Eof,
}

/// The two wire protocols the router understands well enough to frame,
/// without parsing their payloads.
pub enum ProtocolFramer {
    Classic(ClassicFramer),
    Extended(ExtendedFramer),
}

impl ProtocolFramer {
    pub fn new_classic() -> Self {
        ProtocolFramer::Classic(ClassicFramer::new())
    }

    pub fn new_extended() -> Self {
        ProtocolFramer::Extended(ExtendedFramer::new())
    }

    /// True once the framer has observed a message that signals the peer
    /// intends to close gracefully (currently only the extended protocol's
    /// `ConnectionClose`). A subsequent EOF on this direction should then be
    /// treated as a clean shutdown rather than a relay error.
    pub fn graceful_eof_expected(&self) -> bool {
        match self {
            ProtocolFramer::Classic(_) => false,
            ProtocolFramer::Extended(f) => f.saw_connection_close(),
        }
    }

    /// Performs one bounded read from `from`, writes whatever was read to
    /// `to` (looping through partial and zero-length writes), and advances
    /// the framer's internal sequence/boundary state over the bytes that
    /// were actually consumed.
    ///
    /// `handshake_done` only affects the classic variant: while the
    /// handshake is still in flight the sequence counter is not advanced
    /// (the bytes are still relayed). The core never distinguishes
    /// handshake bytes from any other classic packet beyond this — it
    /// treats them as opaque framed packets, per the router's own scope —
    /// so every production call site passes `true`.
    pub async fn pump<R, W>(
        &mut self,
        from: &mut R,
        to: &mut W,
        buf: &mut [u8],
        handshake_done: bool,
    ) -> std::io::Result<PumpOutcome>
    where
        R: tokio::io::AsyncRead + Unpin,
        W: tokio::io::AsyncWrite + Unpin,
    {
        let n = from.read(buf).await?;
        if n == 0 {
            return Ok(PumpOutcome::Eof);
        }

        write_all_retrying(to, &buf[..n]).await?;

        match self {
            ProtocolFramer::Classic(f) => {
                if handshake_done {
                    f.observe(&buf[..n]);
                }
            }
            ProtocolFramer::Extended(f) => {
                f.observe(&buf[..n]);
            }
        }

        Ok(PumpOutcome::Progressed { bytes: n as u64 })
    }
}

/// Writes `data` to `to`, looping past `write` calls that return `0` — the
/// contract treats a zero-length write as "try again", not an error — and
/// past ordinary partial writes. Bounded at [`MAX_ZERO_WRITE_RETRIES`]
/// consecutive zero-length writes to avoid a busy-spin if a sink never
/// becomes writable again; a caller that hits the bound gets an `Other`
/// I/O error rather than looping forever.
const MAX_ZERO_WRITE_RETRIES: u32 = 1024;

async fn write_all_retrying<W: tokio::io::AsyncWrite + Unpin>(
    to: &mut W,
    data: &[u8],
) -> std::io::Result<()> {
    let mut offset = 0;
    let mut zero_streak = 0u32;
    while offset < data.len() {
        let n = to.write(&data[offset..]).await?;
        if n == 0 {
            zero_streak += 1;
            if zero_streak >= MAX_ZERO_WRITE_RETRIES {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "sink made no progress after repeated zero-length writes",
                ));
            }
            tokio::task::yield_now().await;
            continue;
        }
        zero_streak = 0;
        offset += n;
    }
    Ok(())
}
