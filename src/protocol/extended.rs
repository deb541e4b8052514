//! db-router-core/src/protocol/extended.rs
//! Extended wire protocol: `uint32_le length | uint8 type | payload`.

const HEADER_LEN: usize = 4;
const CONNECTION_CLOSE_TYPE: u8 = 3;

/// The five raw bytes of a `ConnectionClose` message: length=1, type=3,
/// empty payload.
pub const CONNECTION_CLOSE_BYTES: [u8; 5] = [0x01, 0x00, 0x00, 0x00, 0x03];

/// Tracks whole-message boundaries for one direction of a relay and
/// remembers whether a `ConnectionClose` was observed, which tells the
/// route that the next EOF on this direction is a graceful shutdown
/// rather than a relay failure.
pub struct ExtendedFramer {
    tail: Vec<u8>,
    connection_close_seen: bool,
}

impl ExtendedFramer {
    pub fn new() -> Self {
        ExtendedFramer {
            tail: Vec::new(),
            connection_close_seen: false,
        }
    }

    pub fn saw_connection_close(&self) -> bool {
        self.connection_close_seen
    }

    /// Feeds newly-relayed bytes into the boundary tracker. A partial
    /// trailing message is retained for the next call.
    pub fn observe(&mut self, data: &[u8]) {
        self.tail.extend_from_slice(data);
        loop {
            match complete_message(&self.tail) {
                Some((total, msg_type, payload_len)) => {
                    if msg_type == CONNECTION_CLOSE_TYPE && payload_len == 0 {
                        self.connection_close_seen = true;
                    }
                    self.tail.drain(0..total);
                }
                None => break,
            }
        }
    }
}

impl Default for ExtendedFramer {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns `(total_len, message_type, payload_len)` for the message at the
/// start of `buf`, or `None` if `buf` doesn't yet hold a complete message.
/// `length` is the number of bytes following the length prefix, i.e. one
/// type byte plus the payload.
fn complete_message(buf: &[u8]) -> Option<(usize, u8, usize)> {
    if buf.len() < HEADER_LEN + 1 {
        return None;
    }
    let length = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    let total = HEADER_LEN + length;
    if buf.len() < total || length == 0 {
        return None;
    }
    let msg_type = buf[HEADER_LEN];
    Some((total, msg_type, length - 1))
}

/// Builds an extended-protocol message with the given type and payload.
pub fn build_message(msg_type: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + 1 + payload.len());
    let length = (1 + payload.len()) as u32;
    out.extend_from_slice(&length.to_le_bytes());
    out.push(msg_type);
    out.extend_from_slice(payload);
    out
}
