//! The packet-level endpoint the reliability overlay is layered on top of:
//! fragmentation of oversized sends, reassembly of fragments back into
//! whole packets, and an ack/ack-bitfield scheme piggybacked on every
//! outgoing packet so acks never need a dedicated message of their own.
//!
//! In the system this crate's design is drawn from, this piece is a
//! vendored third-party library and explicitly out of scope (§1). No such
//! crate exists in the Rust ecosystem to bind to, so this module is this
//! crate's own narrow, swappable stand-in — [`super::ReliabilityOverlay`]
//! is its only caller.

use std::collections::HashMap;

use snet_protocol::{FRAGMENT_SIZE, MAX_FRAGMENTS};

/// Fragments larger than this go out whole as a single "fragment" packet.
const FRAGMENT_ABOVE: usize = FRAGMENT_SIZE - 10;

/// `sequence(2) + fragment_id(1) + fragment_count(1) + ack(2) + ack_bits(4)`.
const HEADER_SIZE: usize = 10;

struct Reassembly {
    fragment_count: u8,
    received: u8,
    fragments: Vec<Option<Vec<u8>>>,
    total_len_hint: usize,
}

/// Packet-level fragmentation and ack bookkeeping for a single peer.
pub struct PacketEndpoint {
    local_sequence: u16,
    remote_sequence: u16,
    received_any: bool,
    /// Bit `i` set means `remote_sequence.wrapping_sub(1 + i)` was received.
    received_mask: u32,
    /// Sequences we've sent that are still outstanding.
    sent_pending: HashMap<u16, ()>,
    /// Sequences newly confirmed by the peer since the last `take_acks`.
    newly_acked: Vec<u16>,
    reassembly: HashMap<u16, Reassembly>,
}

impl PacketEndpoint {
    pub fn new() -> Self {
        Self {
            local_sequence: 0,
            remote_sequence: 0,
            received_any: false,
            received_mask: 0,
            sent_pending: HashMap::new(),
            newly_acked: Vec::new(),
            reassembly: HashMap::new(),
        }
    }

    /// Fragments `payload` as needed and invokes `emit` once per fragment
    /// with the fully-framed wire bytes. Returns the packet sequence
    /// assigned to this send — the caller's ack key.
    pub fn send(&mut self, payload: &[u8], mut emit: impl FnMut(&[u8])) -> u16 {
        let sequence = self.local_sequence;
        self.local_sequence = self.local_sequence.wrapping_add(1);
        self.sent_pending.insert(sequence, ());

        let (ack, ack_bits) = self.ack_fields();

        let chunks: Vec<&[u8]> = if payload.len() <= FRAGMENT_ABOVE {
            vec![payload]
        } else {
            payload.chunks(FRAGMENT_SIZE - HEADER_SIZE).collect()
        };
        let fragment_count = chunks.len().min(MAX_FRAGMENTS) as u8;

        for (fragment_id, chunk) in chunks.into_iter().enumerate() {
            let mut buf = Vec::with_capacity(HEADER_SIZE + chunk.len());
            buf.extend_from_slice(&sequence.to_be_bytes());
            buf.push(fragment_id as u8);
            buf.push(fragment_count);
            buf.extend_from_slice(&ack.to_be_bytes());
            buf.extend_from_slice(&ack_bits.to_be_bytes());
            buf.extend_from_slice(chunk);
            emit(&buf);
        }

        sequence
    }

    /// Feeds one received datagram in. Returns `Some((sequence, payload))`
    /// once all fragments of that sequence have arrived (immediately, for
    /// an unfragmented packet).
    pub fn receive(&mut self, packet: &[u8]) -> Option<(u16, Vec<u8>)> {
        if packet.len() < HEADER_SIZE {
            return None;
        }
        let sequence = u16::from_be_bytes([packet[0], packet[1]]);
        let fragment_id = packet[2];
        let fragment_count = packet[3];
        let ack = u16::from_be_bytes([packet[4], packet[5]]);
        let ack_bits = u32::from_be_bytes([packet[6], packet[7], packet[8], packet[9]]);
        let body = &packet[HEADER_SIZE..];

        self.apply_remote_acks(ack, ack_bits);

        let complete = if fragment_count <= 1 {
            Some(body.to_vec())
        } else {
            let entry = self.reassembly.entry(sequence).or_insert_with(|| Reassembly {
                fragment_count,
                received: 0,
                fragments: vec![None; fragment_count as usize],
                total_len_hint: 0,
            });
            let slot = entry.fragments.get_mut(fragment_id as usize)?;
            if slot.is_none() {
                *slot = Some(body.to_vec());
                entry.received += 1;
                entry.total_len_hint += body.len();
            }
            if entry.received == entry.fragment_count {
                let entry = self.reassembly.remove(&sequence).unwrap();
                let mut whole = Vec::with_capacity(entry.total_len_hint);
                for fragment in entry.fragments {
                    whole.extend_from_slice(&fragment.expect("all fragments present"));
                }
                Some(whole)
            } else {
                None
            }
        };

        if let Some(payload) = complete {
            self.mark_received(sequence);
            Some((sequence, payload))
        } else {
            None
        }
    }

    /// Drains the set of our own sequences the peer has confirmed receipt
    /// of since the last call.
    pub fn take_acks(&mut self) -> Vec<u16> {
        let acks = std::mem::take(&mut self.newly_acked);
        for seq in &acks {
            self.sent_pending.remove(seq);
        }
        acks
    }

    /// The sequence that will be assigned to the next `send` call.
    pub fn next_packet_sequence(&self) -> u16 {
        self.local_sequence
    }

    fn ack_fields(&self) -> (u16, u32) {
        if !self.received_any {
            return (0, 0);
        }
        (self.remote_sequence, self.received_mask)
    }

    fn mark_received(&mut self, sequence: u16) {
        if !self.received_any {
            self.received_any = true;
            self.remote_sequence = sequence;
            self.received_mask = 0;
            return;
        }

        let diff = sequence.wrapping_sub(self.remote_sequence) as i16;
        if diff > 0 {
            // New high-water mark: shift the mask forward, then remember
            // the old high-water mark as bit 0.
            let shift = diff as u32;
            self.received_mask = if shift >= 32 { 0 } else { (self.received_mask << shift) | (1 << (shift - 1)) };
            self.remote_sequence = sequence;
        } else if diff < 0 {
            let back = (-diff) as u32;
            if back <= 32 {
                self.received_mask |= 1 << (back - 1);
            }
        }
        // diff == 0: duplicate of the current high-water mark, nothing to do.
    }

    fn apply_remote_acks(&mut self, ack: u16, ack_bits: u32) {
        if self.sent_pending.contains_key(&ack) {
            self.newly_acked.push(ack);
        }
        for bit in 0..32u32 {
            if ack_bits & (1 << bit) != 0 {
                let seq = ack.wrapping_sub(1 + bit as u16);
                if self.sent_pending.contains_key(&seq) {
                    self.newly_acked.push(seq);
                }
            }
        }
    }
}

impl Default for PacketEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unfragmented_roundtrip() {
        let mut sender = PacketEndpoint::new();
        let mut receiver = PacketEndpoint::new();

        let mut wire = Vec::new();
        let seq = sender.send(b"hello", |frag| wire.push(frag.to_vec()));
        assert_eq!(wire.len(), 1);

        let (recv_seq, payload) = receiver.receive(&wire[0]).unwrap();
        assert_eq!(recv_seq, seq);
        assert_eq!(payload, b"hello");
    }

    #[test]
    fn fragmentation_and_reassembly() {
        let mut sender = PacketEndpoint::new();
        let mut receiver = PacketEndpoint::new();

        let payload = vec![7u8; FRAGMENT_SIZE * 3 + 17];
        let mut wire = Vec::new();
        let seq = sender.send(&payload, |frag| wire.push(frag.to_vec()));
        assert!(wire.len() > 1);

        let mut result = None;
        for frag in &wire {
            if let Some((s, p)) = receiver.receive(frag) {
                result = Some((s, p));
            }
        }
        let (recv_seq, reassembled) = result.expect("should reassemble after all fragments");
        assert_eq!(recv_seq, seq);
        assert_eq!(reassembled, payload);
    }

    #[test]
    fn ack_roundtrip_frees_sender() {
        let mut sender = PacketEndpoint::new();
        let mut receiver = PacketEndpoint::new();

        let mut wire = Vec::new();
        let seq = sender.send(b"ping", |frag| wire.push(frag.to_vec()));
        receiver.receive(&wire[0]).unwrap();

        // Receiver acks by sending anything back.
        let mut reply_wire = Vec::new();
        receiver.send(b"pong", |frag| reply_wire.push(frag.to_vec()));

        sender.receive(&reply_wire[0]);
        let acked = sender.take_acks();
        assert_eq!(acked, vec![seq]);
    }
}
