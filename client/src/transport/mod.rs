//! The transport façade: one small API over two very different backends, so
//! the session engine never needs to know whether it's talking to a native
//! UDP-like socket or a browser's WebTransport datagram stream.

pub mod browser;
pub mod native;

use crate::error::SetupError;
use crate::events::DisconnectReason;

/// Something the transport produced since the last poll.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Message(Vec<u8>),
    Disconnected(DisconnectReason),
}

/// The three-valued connection state every backend exposes. `join_game`
/// polls this once per tick until it leaves `Connecting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
}

/// Backend-agnostic connection handle. Both backends advertise a maximum
/// single-message size; callers that exceed it get a rejected send rather
/// than silent fragmentation past what the backend can carry.
pub trait Transport {
    fn state(&self) -> ConnectionState;
    fn send(&mut self, reliable: bool, payload: &[u8]) -> bool;
    fn poll(&mut self) -> Vec<TransportEvent>;
    fn max_message_size(&self) -> usize;
    fn disconnect(&mut self);
}

/// Connects using the backend appropriate for the join token the lobby
/// handed back, and owns whichever concrete transport results.
pub enum AnyTransport {
    Native(native::NativeTransport),
    Browser(browser::BrowserTransport),
}

impl Transport for AnyTransport {
    fn state(&self) -> ConnectionState {
        match self {
            AnyTransport::Native(t) => t.state(),
            AnyTransport::Browser(t) => t.state(),
        }
    }

    fn send(&mut self, reliable: bool, payload: &[u8]) -> bool {
        match self {
            AnyTransport::Native(t) => t.send(reliable, payload),
            AnyTransport::Browser(t) => t.send(reliable, payload),
        }
    }

    fn poll(&mut self) -> Vec<TransportEvent> {
        match self {
            AnyTransport::Native(t) => t.poll(),
            AnyTransport::Browser(t) => t.poll(),
        }
    }

    fn max_message_size(&self) -> usize {
        match self {
            AnyTransport::Native(t) => t.max_message_size(),
            AnyTransport::Browser(t) => t.max_message_size(),
        }
    }

    fn disconnect(&mut self) {
        match self {
            AnyTransport::Native(t) => t.disconnect(),
            AnyTransport::Browser(t) => t.disconnect(),
        }
    }
}

/// The opaque 200 body of `POST <path>/game/join`, passed untouched from
/// the lobby task to whichever backend `join_game` selected. Neither this
/// type nor the task that produces it attaches any meaning to the bytes —
/// each backend's `connect` decides how to read its own `payload`.
pub struct ConnectInfo {
    pub payload: Vec<u8>,
}

pub fn connect_native(info: &ConnectInfo) -> Result<native::NativeTransport, SetupError> {
    native::NativeTransport::connect(info)
}

pub fn connect_browser(info: &ConnectInfo) -> Result<browser::BrowserTransport, SetupError> {
    browser::BrowserTransport::connect(info)
}
