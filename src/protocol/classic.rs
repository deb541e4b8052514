//! db-router-core/src/protocol/classic.rs
//! Classic wire protocol: `uint24_le length | uint8 seq | payload`.

/// Tracks the running packet-sequence counter for one direction of a
/// relay, buffering an underfilled tail across calls so a packet header
/// split across two reads is never misparsed.
pub struct ClassicFramer {
    tail: Vec<u8>,
    seq: u8,
}

const HEADER_LEN: usize = 4;

impl ClassicFramer {
    pub fn new() -> Self {
        ClassicFramer {
            tail: Vec::new(),
            seq: 0,
        }
    }

    pub fn seq(&self) -> u8 {
        self.seq
    }

    /// Feeds newly-relayed bytes into the boundary tracker and advances
    /// `seq` by one per complete packet found. Bytes belonging to a
    /// partial trailing packet are retained for the next call.
    pub fn observe(&mut self, data: &[u8]) {
        self.tail.extend_from_slice(data);
        loop {
            match complete_packet_len(&self.tail) {
                Some(total) => {
                    self.seq = self.seq.wrapping_add(1);
                    self.tail.drain(0..total);
                }
                None => break,
            }
        }
    }
}

impl Default for ClassicFramer {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns the total length (header + payload) of the packet at the start
/// of `buf` if `buf` holds at least that many bytes, else `None`.
fn complete_packet_len(buf: &[u8]) -> Option<usize> {
    if buf.len() < HEADER_LEN {
        return None;
    }
    let len = u32::from_le_bytes([buf[0], buf[1], buf[2], 0]) as usize;
    let total = HEADER_LEN + len;
    if buf.len() < total {
        return None;
    }
    Some(total)
}

/// The sequence id carried by a classic packet's header, for tests and
/// for callers that want to inspect a raw packet without running it
/// through a full framer.
pub fn packet_seq(buf: &[u8]) -> Option<u8> {
    if buf.len() < HEADER_LEN {
        return None;
    }
    Some(buf[3])
}

/// Builds a classic packet: 3-byte little-endian length, 1-byte sequence
/// id, payload.
pub fn build_packet(seq: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    let len = payload.len() as u32;
    out.extend_from_slice(&len.to_le_bytes()[..3]);
    out.push(seq);
    out.extend_from_slice(payload);
    out
}
