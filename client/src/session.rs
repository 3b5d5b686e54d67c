//! The type a host embeds: owns the HTTP client and its runtime, the four
//! fixed task slots, and, once a game is joined, the active transport.

use std::collections::VecDeque;
use std::thread::JoinHandle;

use bytes::Bytes;
use reqwest::Client;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::oneshot;

use snet_protocol::{
    CreateGameRequest, TransportKind, Visibility, DATA_CHANNEL_MESSAGE, DATA_CHANNEL_PLAYER_JOINED,
    DATA_CHANNEL_PLAYER_LEFT,
};

use crate::config::Config;
use crate::error::{ConfigError, OpStatus};
use crate::events::Event;
use crate::fetch::Fetch;
use crate::oauth::OAuthFlow;
use crate::task::TaskSlot;
use crate::tasks::auth::{self, LoginOutput};
use crate::tasks::lobby::{self, CreateGameOutput, JoinGameOutput, ListGamesOutput};
use crate::transport::{self, AnyTransport, Transport, TransportEvent};

/// Progress of the current (or most recently finished) login attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthorized,
    Authorizing,
    Authorized,
}

/// Which of the four lobby operations, if any, currently owns the lobby.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LobbyState {
    InLobby,
    ListingGames,
    CreatingGame,
    JoiningGame,
    JoinedGame,
}

/// Owns the bundled tokio runtime and the dedicated OS thread that drives
/// it. A `current_thread` runtime only makes progress while something is
/// parked in [`Runtime::block_on`]; since [`Session`] itself is driven
/// synchronously from the host's own frame loop, that something has to be a
/// background thread blocked on a future that never resolves until
/// [`Session`] is dropped. Every [`Fetch`](crate::fetch::Fetch) and
/// [`OAuthFlow`] spawned through the resulting [`Handle`] is polled
/// concurrently on that same thread for as long as it's outstanding.
struct RuntimeDriver {
    handle: Handle,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl RuntimeDriver {
    fn start() -> Self {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("building a current-thread tokio runtime cannot fail from valid settings");
        let handle = runtime.handle().clone();
        let (shutdown, shutdown_rx) = oneshot::channel();
        let thread = std::thread::Builder::new()
            .name("snet-client-runtime".into())
            .spawn(move || {
                let _runtime_keepalive: Runtime = runtime;
                let _ = _runtime_keepalive.block_on(shutdown_rx);
            })
            .expect("spawning the runtime driver thread cannot fail from valid settings");
        RuntimeDriver { handle, shutdown: Some(shutdown), thread: Some(thread) }
    }
}

impl Drop for RuntimeDriver {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

pub struct Session {
    config: Config,
    runtime: RuntimeDriver,
    http_client: Client,
    cookie: Option<Bytes>,

    auth_state: AuthState,
    lobby_state: LobbyState,

    auth_slot: TaskSlot<LoginOutput>,
    create_slot: TaskSlot<CreateGameOutput>,
    join_slot: TaskSlot<JoinGameOutput>,
    list_slot: TaskSlot<ListGamesOutput>,

    transport: Option<AnyTransport>,
    events: VecDeque<Event>,
}

impl Session {
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let runtime = RuntimeDriver::start();
        let http_client = Client::builder()
            .danger_accept_invalid_certs(config.insecure_tls)
            .build()
            .expect("reqwest client construction with no custom TLS material cannot fail");

        Ok(Session {
            config,
            runtime,
            http_client,
            cookie: None,
            auth_state: AuthState::Unauthorized,
            lobby_state: LobbyState::InLobby,
            auth_slot: TaskSlot::new(),
            create_slot: TaskSlot::new(),
            join_slot: TaskSlot::new(),
            list_slot: TaskSlot::new(),
            transport: None,
            events: VecDeque::new(),
        })
    }

    pub fn auth_state(&self) -> AuthState {
        self.auth_state
    }

    pub fn lobby_state(&self) -> LobbyState {
        self.lobby_state
    }

    /// The cookie most recently returned by a successful login, if any.
    pub fn cookie(&self) -> Option<&Bytes> {
        self.cookie.as_ref()
    }

    fn runtime_handle(&self) -> Handle {
        self.runtime.handle.clone()
    }

    pub fn login_with_cookie(&mut self, cookie: impl Into<Bytes>) {
        let url = format!("{}/auth/cookie", self.config.base_url());
        tracing::debug!(url = %url, "login_with_cookie: posting cookie");
        let request = self
            .http_client
            .post(url)
            .body(cookie.into())
            .build()
            .expect("static route with a byte body always builds");
        let fetch = Fetch::begin(&self.runtime_handle(), self.http_client.clone(), request);
        self.auth_state = AuthState::Authorizing;
        self.auth_slot.begin(Box::pin(auth::login_with_cookie(fetch)));
    }

    pub fn login_with_itchio(&mut self) {
        let handle = self.runtime_handle();
        let start_url = format!("{}/auth/itchio/start", self.config.base_url());
        let end_url = format!("{}/auth/itchio/end", self.config.base_url());
        tracing::debug!(start_url = %start_url, end_url = %end_url, "login_with_itchio: starting oauth flow");
        let flow = match OAuthFlow::begin(&handle, move |port| format!("{start_url}?origin=http://127.0.0.1:{port}"), end_url)
        {
            Ok(flow) => flow,
            Err(_) => {
                self.events.push_back(Event::LoginFinished { status: OpStatus::ErrIo, data: Bytes::new() });
                return;
            }
        };

        self.auth_state = AuthState::Authorizing;
        self.auth_slot.begin(Box::pin(auth::login_with_itchio(flow)));
    }

    /// Every lobby request carries the session cookie as a bearer token once
    /// one exists. A lobby call made before any successful login still goes
    /// out (consistent with `LobbyState`'s own `InLobby` starting point),
    /// just without an `Authorization` header — the relay server, not this
    /// crate, is the one that actually enforces the login requirement.
    fn bearer_cookie(&self) -> Option<String> {
        self.cookie.as_ref().map(|cookie| String::from_utf8_lossy(cookie).into_owned())
    }

    pub fn create_game(&mut self, visibility: Visibility, max_num_players: u32, data: Option<String>) {
        if self.lobby_state != LobbyState::InLobby {
            return;
        }
        let url = format!("{}/game/create", self.config.base_url());
        let mut builder = self.http_client.post(url);
        if let Some(cookie) = self.bearer_cookie() {
            builder = builder.bearer_auth(cookie);
        }
        let request = builder
            .json(&CreateGameRequest { visibility, max_num_players, data })
            .build()
            .expect("JSON-encodable request body always builds");
        let fetch = Fetch::begin(&self.runtime_handle(), self.http_client.clone(), request);
        self.lobby_state = LobbyState::CreatingGame;
        self.create_slot.begin(Box::pin(lobby::create_game(fetch)));
    }

    pub fn list_games(&mut self) {
        if self.lobby_state != LobbyState::InLobby {
            return;
        }
        let url = format!("{}/game/list", self.config.base_url());
        let mut builder = self.http_client.get(url);
        if let Some(cookie) = self.bearer_cookie() {
            builder = builder.bearer_auth(cookie);
        }
        let request = builder.build().expect("static GET request always builds");
        let fetch = Fetch::begin(&self.runtime_handle(), self.http_client.clone(), request);
        self.lobby_state = LobbyState::ListingGames;
        self.list_slot.begin(Box::pin(lobby::list_games(fetch)));
    }

    pub fn join_game(&mut self, join_token: impl Into<Bytes>, transport_kind: TransportKind) {
        if self.lobby_state != LobbyState::InLobby {
            return;
        }
        let url = format!("{}/game/join?transport={}", self.config.base_url(), transport_kind.query_value());
        tracing::debug!(url = %url, kind = ?transport_kind, "join_game: requesting transport config");
        let mut builder = self.http_client.post(url);
        if let Some(cookie) = self.bearer_cookie() {
            builder = builder.bearer_auth(cookie);
        }
        let request = builder
            .body(join_token.into())
            .build()
            .expect("static route with a byte body always builds");
        let fetch = Fetch::begin(&self.runtime_handle(), self.http_client.clone(), request);
        let connect = move |info: transport::ConnectInfo| -> Result<AnyTransport, crate::error::SetupError> {
            match transport_kind {
                TransportKind::Native => transport::connect_native(&info).map(AnyTransport::Native),
                TransportKind::Browser => transport::connect_browser(&info).map(AnyTransport::Browser),
            }
        };
        self.lobby_state = LobbyState::JoiningGame;
        self.join_slot.begin(Box::pin(lobby::join_game(fetch, connect)));
    }

    /// Tears down the active transport, if any, and returns to the lobby.
    pub fn exit_game(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.disconnect();
        }
        self.lobby_state = LobbyState::InLobby;
        self.events.push_back(Event::ExitGameFinished);
    }

    /// Sends an application message over the active transport. Returns
    /// `false` with no effect if there is no active transport, the payload
    /// exceeds the transport's advertised limit, or (for a reliable send)
    /// the reliability overlay's outstanding-message window is full.
    pub fn send(&mut self, reliable: bool, payload: &[u8]) -> bool {
        let Some(transport) = &mut self.transport else { return false };
        let mut framed = Vec::with_capacity(1 + payload.len());
        framed.push(DATA_CHANNEL_MESSAGE);
        framed.extend_from_slice(payload);
        transport.send(reliable, &framed)
    }

    /// Advances every running task slot by one step and drains the active
    /// transport. Call once per frame/tick; drain results with
    /// [`Session::next_event`] afterward.
    pub fn update(&mut self) {
        if let Some(output) = self.auth_slot.poll_once() {
            tracing::debug!(status = ?output.status, "login task finished");
            self.auth_state = if output.status == OpStatus::Ok { AuthState::Authorized } else { AuthState::Unauthorized };
            if output.status == OpStatus::Ok {
                self.cookie = Some(output.data.clone());
            }
            self.events.push_back(Event::LoginFinished { status: output.status, data: output.data });
        }

        if let Some(output) = self.create_slot.poll_once() {
            self.lobby_state = LobbyState::InLobby;
            self.events
                .push_back(Event::CreateGameFinished { status: output.status, info: output.info, error: output.error });
        }

        if let Some(output) = self.join_slot.poll_once() {
            self.handle_join_finished(output);
        }

        if let Some(output) = self.list_slot.poll_once() {
            self.lobby_state = LobbyState::InLobby;
            self.events
                .push_back(Event::ListGamesFinished { status: output.status, games: output.games, error: output.error });
        }

        let incoming = match &mut self.transport {
            Some(transport) => transport.poll(),
            None => Vec::new(),
        };
        for event in incoming {
            match event {
                TransportEvent::Message(payload) => self.decode_data_channel_message(payload),
                TransportEvent::Disconnected(reason) => {
                    self.transport = None;
                    self.lobby_state = LobbyState::InLobby;
                    self.events.push_back(Event::Disconnected { reason });
                    break;
                }
            }
        }
    }

    /// Pops the next drained event, if any, in the order it was produced.
    pub fn next_event(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    fn handle_join_finished(&mut self, output: JoinGameOutput) {
        match output.transport.filter(|_| output.status == OpStatus::Ok) {
            Some(transport) => {
                tracing::debug!("join_game: transport connected, game joined");
                self.transport = Some(transport);
                self.lobby_state = LobbyState::JoinedGame;
                self.events.push_back(Event::JoinGameFinished { status: OpStatus::Ok, error: None });
            }
            None => {
                self.lobby_state = LobbyState::InLobby;
                self.events.push_back(Event::JoinGameFinished { status: output.status, error: output.error });
            }
        }
    }

    fn decode_data_channel_message(&mut self, payload: Vec<u8>) {
        let Some((&tag, body)) = payload.split_first() else { return };
        match tag {
            DATA_CHANNEL_MESSAGE => {
                if body.len() < 2 {
                    return;
                }
                let sender = u16::from_be_bytes([body[0], body[1]]);
                self.events.push_back(Event::Message { sender, data: Bytes::from(body[2..].to_vec()) });
            }
            DATA_CHANNEL_PLAYER_JOINED => {
                if body.len() < 4 {
                    return;
                }
                let id = u16::from_be_bytes([body[0], body[1]]);
                let name_len = u16::from_be_bytes([body[2], body[3]]) as usize;
                if body.len() < 4 + name_len {
                    return;
                }
                let name = String::from_utf8_lossy(&body[4..4 + name_len]).into_owned();
                let data = Bytes::from(body[4 + name_len..].to_vec());
                self.events.push_back(Event::PlayerJoined { id, name, data });
            }
            DATA_CHANNEL_PLAYER_LEFT => {
                if body.len() < 2 {
                    return;
                }
                let id = u16::from_be_bytes([body[0], body[1]]);
                self.events.push_back(Event::PlayerLeft { id });
            }
            _ => {}
        }
    }
}
