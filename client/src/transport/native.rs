//! Native transport backend: a [`laminar`] socket. Laminar already provides
//! its own reliable/unreliable packet delivery over UDP, so the reliability
//! overlay sits out here — it exists for the browser backend's raw datagram
//! channel, not for a socket that already does this job.
//!
//! The real `cute_protocol` connect token (not vendored into this crate)
//! embeds the server's address inside bytes whose format this crate has no
//! way to reproduce. `laminar::Socket` still needs a concrete [`SocketAddr`]
//! to bind and send to, so the native `/game/join` payload is framed as
//! `<u16 BE addr_len><addr as UTF-8 text><opaque token bytes>`: this
//! crate's own narrow resolution of that gap, in the same spirit as the
//! reliability overlay standing in for the vendored packet endpoint. Only
//! the trailing token bytes are ever sent to the peer; the address prefix
//! is stripped locally before anything goes on the wire.

use std::net::{SocketAddr, UdpSocket};

use crossbeam_channel::{Receiver, Sender};
use laminar::{Packet, Socket, SocketEvent};

use crate::error::SetupError;
use crate::events::DisconnectReason;
use snet_protocol::{CONNECT_TOKEN_SIZE, NATIVE_MESSAGE_SIZE_LIMIT};

use super::{ConnectInfo, ConnectionState, Transport, TransportEvent};

/// Splits a native `/game/join` payload into the destination address and
/// the opaque token bytes to actually hand the peer. See the module doc
/// for the wire shape.
fn split_payload(payload: &[u8]) -> Result<(SocketAddr, &[u8]), SetupError> {
    if payload.len() < 2 {
        return Err(SetupError::Transport("connect payload missing address length prefix".to_string()));
    }
    let addr_len = u16::from_be_bytes([payload[0], payload[1]]) as usize;
    let rest = &payload[2..];
    if rest.len() < addr_len {
        return Err(SetupError::Transport(format!(
            "connect payload truncated: address length {addr_len} exceeds remaining {} bytes",
            rest.len()
        )));
    }
    let (addr_bytes, token) = rest.split_at(addr_len);
    let addr_str = std::str::from_utf8(addr_bytes)
        .map_err(|e| SetupError::Transport(format!("connect payload address is not UTF-8: {e}")))?;
    let peer: SocketAddr =
        addr_str.parse().map_err(|e| SetupError::Transport(format!("invalid native address {addr_str:?}: {e}")))?;
    if token.len() < CONNECT_TOKEN_SIZE {
        return Err(SetupError::Transport(format!(
            "connect token too short: got {} bytes, need at least {CONNECT_TOKEN_SIZE}",
            token.len()
        )));
    }
    Ok((peer, token))
}

pub struct NativeTransport {
    sender: Sender<Packet>,
    receiver: Receiver<SocketEvent>,
    _polling_thread: std::thread::JoinHandle<()>,
    peer: SocketAddr,
    /// Set once laminar reports a virtual connection to `peer`, i.e. once
    /// we've heard back from it at least once.
    connected: bool,
    disconnected: bool,
}

impl NativeTransport {
    pub fn connect(info: &ConnectInfo) -> Result<Self, SetupError> {
        let (peer, token) = split_payload(&info.payload)?;

        // Bind an ephemeral local port; the relay server authenticates the
        // connection using the connect token carried in the handshake, not
        // the source port.
        let local: SocketAddr = if peer.is_ipv6() { "[::]:0" } else { "0.0.0.0:0" }
            .parse()
            .expect("static loopback-family address is valid");
        let mut socket = Socket::bind(local).map_err(|e| SetupError::Transport(e.to_string()))?;
        let sender = socket.get_packet_sender();
        let receiver = socket.get_event_receiver();
        // Laminar's own polling loop is the vendored "reliable endpoint"
        // collaborator's implementation detail, same as a browser's own
        // WebTransport stack running its I/O off the main thread.
        let polling_thread = std::thread::spawn(move || socket.start_polling());

        tracing::debug!(%peer, %local, "native transport: socket bound, sending connect token");
        let mut transport = NativeTransport {
            sender,
            receiver,
            _polling_thread: polling_thread,
            peer,
            connected: false,
            disconnected: false,
        };
        transport.send(true, token);
        Ok(transport)
    }
}

impl Transport for NativeTransport {
    fn state(&self) -> ConnectionState {
        if self.disconnected {
            ConnectionState::Disconnected
        } else if self.connected {
            ConnectionState::Connected
        } else {
            ConnectionState::Connecting
        }
    }

    fn send(&mut self, reliable: bool, payload: &[u8]) -> bool {
        if payload.len() > self.max_message_size() {
            return false;
        }
        let packet = if reliable {
            Packet::reliable_ordered(self.peer, payload.to_vec(), Some(0))
        } else {
            Packet::unreliable(self.peer, payload.to_vec())
        };
        self.sender.send(packet).is_ok()
    }

    fn poll(&mut self) -> Vec<TransportEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            match event {
                SocketEvent::Packet(packet) if packet.addr() == self.peer => {
                    self.connected = true;
                    out.push(TransportEvent::Message(packet.payload().to_vec()));
                }
                SocketEvent::Connect(addr) if addr == self.peer => {
                    tracing::debug!(peer = %addr, "native transport: peer connected");
                    self.connected = true;
                }
                SocketEvent::Packet(_) | SocketEvent::Connect(_) => {}
                SocketEvent::Timeout(addr) if addr == self.peer => {
                    tracing::debug!(peer = %addr, "native transport: peer timed out");
                    self.disconnected = true;
                    out.push(TransportEvent::Disconnected(DisconnectReason::Error));
                }
                SocketEvent::Disconnect(addr) if addr == self.peer => {
                    tracing::debug!(peer = %addr, "native transport: peer disconnected");
                    self.disconnected = true;
                    out.push(TransportEvent::Disconnected(DisconnectReason::Kicked));
                }
                SocketEvent::Timeout(_) | SocketEvent::Disconnect(_) => {}
            }
        }
        out
    }

    fn max_message_size(&self) -> usize {
        NATIVE_MESSAGE_SIZE_LIMIT
    }

    fn disconnect(&mut self) {
        if !self.disconnected {
            let _ = self.sender.send(Packet::reliable_ordered(self.peer, Vec::new(), Some(1)));
            self.disconnected = true;
        }
    }
}

/// A bound UDP socket used only to pick a free ephemeral port before handing
/// the address to laminar in tests; laminar binds its own socket internally.
#[cfg(test)]
fn free_local_addr() -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").expect("bind ephemeral port");
    socket.local_addr().expect("local addr")
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a join payload in this backend's own
    /// `<u16 addr_len><addr><token>` framing.
    fn join_payload(addr: SocketAddr, token_len: usize) -> Vec<u8> {
        let addr_bytes = addr.to_string().into_bytes();
        let mut payload = Vec::with_capacity(2 + addr_bytes.len() + token_len);
        payload.extend_from_slice(&(addr_bytes.len() as u16).to_be_bytes());
        payload.extend_from_slice(&addr_bytes);
        payload.extend(std::iter::repeat(0u8).take(token_len));
        payload
    }

    #[test]
    fn oversize_send_is_rejected() {
        let addr = free_local_addr();
        let info = ConnectInfo { payload: join_payload(addr, CONNECT_TOKEN_SIZE) };
        let mut transport = NativeTransport::connect(&info).expect("connect");
        let oversized = vec![0u8; NATIVE_MESSAGE_SIZE_LIMIT + 1];
        assert!(!transport.send(true, &oversized));
    }

    #[test]
    fn undersize_connect_token_is_rejected() {
        let addr = free_local_addr();
        let info = ConnectInfo { payload: join_payload(addr, CONNECT_TOKEN_SIZE - 1) };
        assert!(NativeTransport::connect(&info).is_err());
    }

    #[test]
    fn truncated_address_prefix_is_rejected() {
        let info = ConnectInfo { payload: vec![0, 50] };
        assert!(NativeTransport::connect(&info).is_err());
    }
}
