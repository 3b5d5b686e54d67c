//! Browser transport backend: the reliability overlay running over a raw
//! datagram channel. On `wasm32` that channel is a WebTransport session's
//! datagram stream, which (like all WebTransport datagrams) offers no
//! delivery or ordering guarantee of its own — exactly what the overlay
//! exists to add. Off `wasm32` there is no WebTransport implementation to
//! link against, so this backend falls back to a loopback UDP socket
//! carrying the same unreliable-datagram contract, which is enough to
//! exercise the overlay in tests run on a desktop target.

use crate::error::SetupError;
use crate::reliability::ReliabilityOverlay;
use snet_protocol::BROWSER_MESSAGE_SIZE_LIMIT;

use super::{ConnectInfo, ConnectionState, Transport, TransportEvent};

/// The browser `/game/join` payload is bare UTF-8 text (a URL). Decoding is
/// shared by both backends; each then interprets the text its own way.
fn payload_text(info: &ConnectInfo) -> Result<&str, SetupError> {
    std::str::from_utf8(&info.payload)
        .map_err(|e| SetupError::Transport(format!("connect payload is not UTF-8 text: {e}")))
}

#[cfg(not(target_arch = "wasm32"))]
mod backend {
    use std::net::UdpSocket;

    use super::*;

    pub struct Channel {
        socket: UdpSocket,
    }

    impl Channel {
        pub fn connect(info: &ConnectInfo) -> Result<Self, SetupError> {
            let address = payload_text(info)?;
            let socket = UdpSocket::bind("127.0.0.1:0")
                .map_err(|e| SetupError::Transport(format!("bind loopback datagram socket: {e}")))?;
            socket
                .connect(address)
                .map_err(|e| SetupError::Transport(format!("connect loopback datagram socket: {e}")))?;
            socket
                .set_nonblocking(true)
                .map_err(|e| SetupError::Transport(e.to_string()))?;
            Ok(Channel { socket })
        }

        pub fn send(&self, datagram: &[u8]) {
            let _ = self.socket.send(datagram);
        }

        pub fn recv_all(&self) -> Vec<Vec<u8>> {
            let mut out = Vec::new();
            let mut buf = [0u8; 1500];
            loop {
                match self.socket.recv(&mut buf) {
                    Ok(n) => out.push(buf[..n].to_vec()),
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                    Err(_) => break,
                }
            }
            out
        }

        pub fn is_closed(&self) -> bool {
            false
        }

        /// The loopback stand-in has no handshake of its own — a bound,
        /// connected `UdpSocket` is as "connected" as this channel gets.
        pub fn is_connected(&self) -> bool {
            true
        }
    }
}

#[cfg(target_arch = "wasm32")]
mod backend {
    use std::cell::RefCell;
    use std::rc::Rc;

    use js_sys::Uint8Array;
    use wasm_bindgen::JsCast;
    use wasm_bindgen_futures::JsFuture;
    use web_sys::{
        ReadableStreamDefaultReader, WebTransport, WebTransportDatagramDuplexStream,
        WritableStreamDefaultWriter,
    };

    use super::*;

    struct Shared {
        inbox: RefCell<Vec<Vec<u8>>>,
        closed: RefCell<bool>,
        ready: RefCell<bool>,
    }

    pub struct Channel {
        transport: WebTransport,
        writer: WritableStreamDefaultWriter,
        shared: Rc<Shared>,
    }

    impl Channel {
        pub fn connect(info: &ConnectInfo) -> Result<Self, SetupError> {
            let url = payload_text(info)?;
            let transport =
                WebTransport::new(url).map_err(|e| SetupError::Transport(format!("{e:?}")))?;

            let datagrams: WebTransportDatagramDuplexStream = transport.datagrams();
            let writer: WritableStreamDefaultWriter = datagrams
                .writable()
                .get_writer()
                .map_err(|e| SetupError::Transport(format!("{e:?}")))?;
            let reader: ReadableStreamDefaultReader = datagrams
                .readable()
                .get_reader()
                .unchecked_into();

            let shared =
                Rc::new(Shared { inbox: RefCell::new(Vec::new()), closed: RefCell::new(false), ready: RefCell::new(false) });
            let task_shared = shared.clone();
            wasm_bindgen_futures::spawn_local(async move {
                loop {
                    let chunk = match JsFuture::from(reader.read()).await {
                        Ok(chunk) => chunk,
                        Err(_) => break,
                    };
                    let done = js_sys::Reflect::get(&chunk, &"done".into()).unwrap_or(wasm_bindgen::JsValue::TRUE);
                    if done.is_truthy() {
                        break;
                    }
                    if let Ok(value) = js_sys::Reflect::get(&chunk, &"value".into()) {
                        let bytes = Uint8Array::new(&value).to_vec();
                        task_shared.inbox.borrow_mut().push(bytes);
                    }
                }
                *task_shared.closed.borrow_mut() = true;
            });

            // WebTransport's handshake is async; `ready` resolves once the
            // session is actually established, which is the signal the
            // transport façade's `Connecting` -> `Connected` transition
            // waits on.
            let ready_shared = shared.clone();
            let ready_promise = transport.ready();
            wasm_bindgen_futures::spawn_local(async move {
                if JsFuture::from(ready_promise).await.is_ok() {
                    *ready_shared.ready.borrow_mut() = true;
                }
            });

            Ok(Channel { transport, writer, shared })
        }

        pub fn send(&self, datagram: &[u8]) {
            let array = Uint8Array::from(datagram);
            let _ = self.writer.write_with_chunk(&array.into());
        }

        pub fn recv_all(&self) -> Vec<Vec<u8>> {
            std::mem::take(&mut self.shared.inbox.borrow_mut())
        }

        pub fn is_closed(&self) -> bool {
            *self.shared.closed.borrow()
        }

        pub fn is_connected(&self) -> bool {
            *self.shared.ready.borrow()
        }
    }

    impl Drop for Channel {
        fn drop(&mut self) {
            self.transport.close();
        }
    }
}

use crate::events::DisconnectReason;
use backend::Channel;

pub struct BrowserTransport {
    channel: Channel,
    overlay: ReliabilityOverlay,
    disconnected: bool,
}

impl BrowserTransport {
    pub fn connect(info: &ConnectInfo) -> Result<Self, SetupError> {
        // Unlike the native backend, there is no separate token to send
        // once connected: the URL itself (path, query, or both) is the
        // browser backend's entire opaque transport config, so opening the
        // channel against it is the whole handshake.
        let channel = Channel::connect(info)?;
        tracing::debug!("browser transport: datagram channel opened");
        Ok(BrowserTransport { channel, overlay: ReliabilityOverlay::new(), disconnected: false })
    }
}

impl Transport for BrowserTransport {
    fn state(&self) -> ConnectionState {
        if self.disconnected || self.channel.is_closed() {
            ConnectionState::Disconnected
        } else if self.channel.is_connected() {
            ConnectionState::Connected
        } else {
            ConnectionState::Connecting
        }
    }

    fn send(&mut self, reliable: bool, payload: &[u8]) -> bool {
        if payload.len() > self.max_message_size() {
            return false;
        }
        let queued = if reliable { self.overlay.queue_reliable(payload) } else { self.overlay.queue_unreliable(payload) };
        if queued.is_err() {
            return false;
        }
        let channel = &self.channel;
        self.overlay.flush(&mut |frag| channel.send(frag));
        true
    }

    fn poll(&mut self) -> Vec<TransportEvent> {
        let mut out = Vec::new();
        for datagram in self.channel.recv_all() {
            for received in self.overlay.receive(&datagram) {
                out.push(TransportEvent::Message(received.payload));
            }
        }
        let channel = &self.channel;
        self.overlay.flush(&mut |frag| channel.send(frag));

        if self.channel.is_closed() && !self.disconnected {
            tracing::debug!("browser transport: datagram channel closed");
            self.disconnected = true;
            out.push(TransportEvent::Disconnected(DisconnectReason::Error));
        }
        out
    }

    fn max_message_size(&self) -> usize {
        BROWSER_MESSAGE_SIZE_LIMIT
    }

    fn disconnect(&mut self) {
        self.disconnected = true;
    }
}
