//! Message-level reliable/unreliable channel layered over the packet-level
//! [`endpoint::PacketEndpoint`]. This is the piece the design calls the
//! reliability overlay: it is what the transport façade's two backends
//! both sit behind, so "reliable" and "unreliable" mean the same thing on
//! a native socket and inside a browser datagram channel.

mod endpoint;

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use snet_protocol::{MAX_INFLIGHT, MAX_MESSAGE_SIZE};

use endpoint::PacketEndpoint;

/// Header bit marking a message as reliable; the remaining 7 bits carry the
/// message's sequence number, used by the receiver to drop duplicates and
/// reorder retransmissions.
const RELIABLE_FLAG: u8 = 0x80;
const SEQ_MASK: u8 = 0x7f;

const RECEIVE_WINDOW: usize = 2 * MAX_INFLIGHT;

/// A send that cannot be accepted right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReliabilitySendError {
    /// `MAX_INFLIGHT` reliable messages are already awaiting acknowledgement.
    WindowFull,
    /// Payload exceeds [`MAX_MESSAGE_SIZE`]. Fragmenting it anyway would
    /// produce more fragments than the wire header's `fragment_count` byte
    /// (clamped to `MAX_FRAGMENTS`) can record, so the receiver could never
    /// finish reassembling it — rejected here instead.
    Oversize,
}

/// A decoded application-level message handed up to the transport façade.
pub struct Received {
    pub reliable: bool,
    pub payload: Vec<u8>,
}

struct Inflight {
    ack_key: u16,
    fragments: Vec<Vec<u8>>,
    last_sent: Instant,
}

/// One reliability overlay instance per connected peer.
pub struct ReliabilityOverlay {
    endpoint: PacketEndpoint,
    next_out_seq: u8,
    /// The next reliable sequence the application is owed, in strict
    /// ascending order. Messages that arrive ahead of this wait in
    /// `received_window` until the gap closes.
    next_in_seq: u8,
    inflight: VecDeque<Inflight>,
    received_window: Vec<Option<Vec<u8>>>,
    resend_delay: Duration,
    processing: bool,
    deferred: Vec<(bool, Vec<u8>)>,
}

impl ReliabilityOverlay {
    pub fn new() -> Self {
        Self {
            endpoint: PacketEndpoint::new(),
            next_out_seq: 0,
            next_in_seq: 0,
            inflight: VecDeque::new(),
            received_window: vec![None; RECEIVE_WINDOW],
            resend_delay: Duration::from_secs_f64(snet_protocol::RESEND_DELAY_SECS),
            processing: false,
            deferred: Vec::new(),
        }
    }

    /// Queues a reliable message. Delivery is retried every resend delay
    /// until the peer acknowledges the underlying packet, or until
    /// [`MAX_INFLIGHT`] other reliable messages are already outstanding.
    pub fn queue_reliable(&mut self, payload: &[u8]) -> Result<(), ReliabilitySendError> {
        if payload.len() > MAX_MESSAGE_SIZE {
            return Err(ReliabilitySendError::Oversize);
        }
        // A reliable send queued but not yet flushed into `inflight` is just
        // as outstanding as one already handed to the endpoint — the window
        // check has to count both, or a caller that queues several reliable
        // sends between flushes can push arbitrarily far past `MAX_INFLIGHT`.
        let pending_reliable = self.deferred.iter().filter(|(reliable, _)| *reliable).count();
        if self.inflight.len() + pending_reliable >= MAX_INFLIGHT {
            return Err(ReliabilitySendError::WindowFull);
        }
        self.deferred.push((true, payload.to_vec()));
        Ok(())
    }

    /// Queues an unreliable message. Best-effort; never retried.
    pub fn queue_unreliable(&mut self, payload: &[u8]) -> Result<(), ReliabilitySendError> {
        if payload.len() > MAX_MESSAGE_SIZE {
            return Err(ReliabilitySendError::Oversize);
        }
        self.deferred.push((false, payload.to_vec()));
        Ok(())
    }

    /// Feeds one datagram received from the underlying transport in.
    /// Returns every application message the datagram makes deliverable —
    /// zero if it only fills a gap, one for an unreliable message or an
    /// in-order reliable one, or several at once when it closes a gap that
    /// lets a run of already-buffered out-of-order messages drain too.
    /// Reliable messages are always returned in ascending sequence order.
    pub fn receive(&mut self, packet: &[u8]) -> Vec<Received> {
        let mut out = Vec::new();
        let Some((_, reassembled)) = self.endpoint.receive(packet) else { return out };
        let Some((&header, body)) = reassembled.split_first() else { return out };
        let reliable = header & RELIABLE_FLAG != 0;
        if !reliable {
            out.push(Received { reliable: false, payload: body.to_vec() });
            return out;
        }

        let seq = header & SEQ_MASK;
        if seq == self.next_in_seq {
            out.push(Received { reliable: true, payload: body.to_vec() });
            self.next_in_seq = (self.next_in_seq + 1) & SEQ_MASK;
            loop {
                let slot = &mut self.received_window[self.next_in_seq as usize % RECEIVE_WINDOW];
                let Some(payload) = slot.take() else { break };
                out.push(Received { reliable: true, payload });
                self.next_in_seq = (self.next_in_seq + 1) & SEQ_MASK;
            }
        } else {
            // `diff` is how far ahead of `next_in_seq` this sequence sits,
            // mod 128. The sender never has more than `MAX_INFLIGHT`
            // messages outstanding, so a genuinely future message is never
            // more than that far ahead; anything farther is a retransmission
            // of one we've already delivered and must not re-buffer, or it
            // would sit in `received_window` until the ring wraps back
            // around and collides with a real future arrival at that slot.
            let diff = seq.wrapping_sub(self.next_in_seq) & SEQ_MASK;
            if diff as usize <= MAX_INFLIGHT {
                let slot = &mut self.received_window[seq as usize % RECEIVE_WINDOW];
                if slot.is_none() {
                    *slot = Some(body.to_vec());
                }
                // else: slot already holds a fragment, so this is a duplicate
                // retransmission of one we're already holding. Never overwrite.
            }
        }
        out
    }

    /// Flushes queued sends and due retransmissions to the wire, and
    /// releases any inflight records the peer has acknowledged since the
    /// last call. Call once per update tick, after all of this tick's
    /// `receive` calls, so every outgoing packet's piggybacked ack is as
    /// fresh as possible.
    pub fn flush(&mut self, wire: &mut dyn FnMut(&[u8])) {
        debug_assert!(!self.processing, "flush is not reentrant");
        self.processing = true;

        for ack_key in self.endpoint.take_acks() {
            let before = self.inflight.len();
            self.inflight.retain(|record| record.ack_key != ack_key);
            if self.inflight.len() < before {
                tracing::trace!(ack_key, "reliability overlay: inflight record acked");
            }
        }

        for (reliable, payload) in std::mem::take(&mut self.deferred) {
            let header = if reliable {
                let seq = self.next_out_seq;
                self.next_out_seq = (self.next_out_seq + 1) & SEQ_MASK;
                RELIABLE_FLAG | seq
            } else {
                0
            };
            let mut framed = Vec::with_capacity(1 + payload.len());
            framed.push(header);
            framed.extend_from_slice(&payload);

            let mut fragments = Vec::new();
            let ack_key = self.endpoint.send(&framed, |frag| fragments.push(frag.to_vec()));
            for frag in &fragments {
                wire(frag);
            }
            if reliable {
                self.inflight.push_back(Inflight { ack_key, fragments, last_sent: Instant::now() });
            }
        }

        let now = Instant::now();
        for record in &mut self.inflight {
            if now.duration_since(record.last_sent) >= self.resend_delay {
                tracing::trace!(ack_key = record.ack_key, fragments = record.fragments.len(), "reliability overlay: resending unacked message");
                for frag in &record.fragments {
                    wire(frag);
                }
                record.last_sent = now;
            }
        }

        self.processing = false;
    }
}

impl Default for ReliabilityOverlay {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(overlay: &mut ReliabilityOverlay) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        overlay.flush(&mut |frag| out.push(frag.to_vec()));
        out
    }

    #[test]
    fn reliable_message_roundtrips() {
        let mut sender = ReliabilityOverlay::new();
        let mut receiver = ReliabilityOverlay::new();

        sender.queue_reliable(b"hello").unwrap();
        let wire = drain(&mut sender);
        assert_eq!(wire.len(), 1);

        let mut received = receiver.receive(&wire[0]);
        assert_eq!(received.len(), 1);
        let received = received.remove(0);
        assert!(received.reliable);
        assert_eq!(received.payload, b"hello");
    }

    #[test]
    fn reliable_messages_deliver_in_send_order_even_when_received_out_of_order() {
        let mut sender = ReliabilityOverlay::new();
        let mut receiver = ReliabilityOverlay::new();

        sender.queue_reliable(b"hello").unwrap();
        sender.queue_reliable(b"world").unwrap();
        let wire = drain(&mut sender);
        assert_eq!(wire.len(), 2);

        // Second packet arrives first: it must be held back, not delivered.
        assert!(receiver.receive(&wire[1]).is_empty());
        // First packet arrives: both messages are now released, in order.
        let delivered = receiver.receive(&wire[0]);
        assert_eq!(delivered.len(), 2);
        assert_eq!(delivered[0].payload, b"hello");
        assert_eq!(delivered[1].payload, b"world");
    }

    #[test]
    fn sequence_wraparound_preserves_order() {
        let mut sender = ReliabilityOverlay::new();
        let mut receiver = ReliabilityOverlay::new();

        let mut delivered = Vec::new();
        for i in 0..128u32 {
            let payload = i.to_be_bytes();
            sender.queue_reliable(&payload).unwrap();
            for frag in drain(&mut sender) {
                delivered.extend(receiver.receive(&frag));
            }
            // Receiver's next outgoing packet piggybacks the ack so the
            // window never fills up mid-run.
            receiver.queue_unreliable(b"ack-carrier").unwrap();
            for frag in drain(&mut receiver) {
                sender.receive(&frag);
            }
            drain(&mut sender);
        }

        assert_eq!(delivered.len(), 128);
        for (i, received) in delivered.iter().enumerate() {
            assert_eq!(received.payload, (i as u32).to_be_bytes());
        }
        assert_eq!(receiver.next_in_seq, 0);
        assert_eq!(sender.next_out_seq, 0);
    }

    #[test]
    fn unreliable_message_has_no_inflight_record() {
        let mut sender = ReliabilityOverlay::new();
        sender.queue_unreliable(b"ping").unwrap();
        drain(&mut sender);
        assert!(sender.inflight.is_empty());
    }

    #[test]
    fn window_full_rejects_send() {
        let mut sender = ReliabilityOverlay::new();
        for _ in 0..MAX_INFLIGHT {
            sender.queue_reliable(b"x").unwrap();
        }
        // None of these have been acked yet, so the window is now full.
        assert_eq!(sender.queue_reliable(b"x"), Err(ReliabilitySendError::WindowFull));
    }

    #[test]
    fn oversize_reliable_payload_is_rejected_before_the_window_check() {
        let mut sender = ReliabilityOverlay::new();
        let oversized = vec![0u8; MAX_MESSAGE_SIZE + 1];
        assert_eq!(sender.queue_reliable(&oversized), Err(ReliabilitySendError::Oversize));
        // Rejected before ever entering the inflight window.
        assert!(sender.inflight.is_empty());
    }

    #[test]
    fn oversize_unreliable_payload_is_rejected() {
        let mut sender = ReliabilityOverlay::new();
        let oversized = vec![0u8; MAX_MESSAGE_SIZE + 1];
        assert_eq!(sender.queue_unreliable(&oversized), Err(ReliabilitySendError::Oversize));
        assert!(drain(&mut sender).is_empty());
    }

    #[test]
    fn duplicate_reliable_delivery_is_suppressed() {
        let mut sender = ReliabilityOverlay::new();
        let mut receiver = ReliabilityOverlay::new();

        sender.queue_reliable(b"once").unwrap();
        let wire = drain(&mut sender);

        assert_eq!(receiver.receive(&wire[0]).len(), 1);
        assert!(receiver.receive(&wire[0]).is_empty());
    }

    #[test]
    fn stale_retransmission_does_not_poison_a_future_arrival_at_the_same_slot() {
        let mut sender = ReliabilityOverlay::new();
        let mut receiver = ReliabilityOverlay::new();

        sender.queue_reliable(b"first").unwrap();
        let wire = drain(&mut sender);
        assert_eq!(receiver.receive(&wire[0]).len(), 1);

        // A late duplicate of the already-delivered message arrives; it must
        // be dropped outright, not buffered in `received_window`.
        assert!(receiver.receive(&wire[0]).is_empty());

        // 64 messages later a fresh message lands on the same ring slot
        // (seq 0 again, after a full wraparound) — it must still be
        // delivered, not mistaken for the stale duplicate above.
        let mut delivered = Vec::new();
        for i in 1..128u32 {
            let payload = i.to_be_bytes();
            sender.queue_reliable(&payload).unwrap();
            for frag in drain(&mut sender) {
                delivered.extend(receiver.receive(&frag));
            }
            receiver.queue_unreliable(b"ack-carrier").unwrap();
            for frag in drain(&mut receiver) {
                sender.receive(&frag);
            }
            drain(&mut sender);
        }
        assert_eq!(delivered.len(), 127);
    }

    #[test]
    fn unacked_message_is_resent_after_the_resend_delay() {
        let mut sender = ReliabilityOverlay::new();

        sender.queue_reliable(b"hello").unwrap();
        let first_send = drain(&mut sender);
        assert_eq!(first_send.len(), 1);

        // Immediately after sending, nothing new is due for resend.
        assert!(drain(&mut sender).is_empty());

        std::thread::sleep(Duration::from_millis(250));
        let resent = drain(&mut sender);
        assert_eq!(resent, first_send, "the exact fragment bytes should be replayed unchanged");
    }

    #[test]
    fn ack_clears_inflight_record() {
        let mut sender = ReliabilityOverlay::new();
        let mut receiver = ReliabilityOverlay::new();

        sender.queue_reliable(b"hello").unwrap();
        let wire = drain(&mut sender);
        assert_eq!(receiver.receive(&wire[0]).len(), 1);

        // Receiver's next outgoing packet piggybacks the ack.
        receiver.queue_unreliable(b"ack-carrier").unwrap();
        let reply = drain(&mut receiver);
        sender.receive(&reply[0]);
        drain(&mut sender);

        assert!(sender.inflight.is_empty());
    }
}
