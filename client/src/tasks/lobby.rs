//! Task bodies for the session's lobby slots: create, join, and list games.

use std::future::poll_fn;
use std::task::Poll;

use bytes::Bytes;

use snet_protocol::{CreateGameResponse, ListGamesResponse};

use crate::error::{OpStatus, SetupError};
use crate::events::GameInfo;
use crate::fetch::{Fetch, FetchStatus};
use crate::tasks::yield_once;
use crate::transport::{AnyTransport, ConnectInfo, ConnectionState, Transport};

async fn await_fetch(fetch: &mut Fetch) -> FetchStatus {
    poll_fn(|_cx| match fetch.poll() {
        FetchStatus::Pending => Poll::Pending,
        other => Poll::Ready(other),
    })
    .await
}

pub struct CreateGameOutput {
    pub status: OpStatus,
    pub info: Option<GameInfo>,
    pub error: Option<Bytes>,
}

pub async fn create_game(mut fetch: Fetch) -> CreateGameOutput {
    match await_fetch(&mut fetch).await {
        FetchStatus::Finished => {
            let body = fetch.response_body().cloned().unwrap_or_default();
            let status_code = fetch.status_code().unwrap_or(0);
            if !(200..300).contains(&status_code) {
                return CreateGameOutput { status: OpStatus::ErrRejected, info: None, error: Some(body) };
            }
            match serde_json::from_slice::<CreateGameResponse>(&body) {
                Ok(response) => CreateGameOutput {
                    status: OpStatus::Ok,
                    info: Some(GameInfo {
                        join_token: Bytes::from(response.join_token.into_bytes()),
                        creator: response.creator,
                        data: response.data,
                    }),
                    error: None,
                },
                Err(_) => CreateGameOutput { status: OpStatus::ErrIo, info: None, error: None },
            }
        }
        _ => CreateGameOutput { status: OpStatus::ErrIo, info: None, error: None },
    }
}

pub struct ListGamesOutput {
    pub status: OpStatus,
    pub games: Vec<GameInfo>,
    pub error: Option<Bytes>,
}

pub async fn list_games(mut fetch: Fetch) -> ListGamesOutput {
    match await_fetch(&mut fetch).await {
        FetchStatus::Finished => {
            let body = fetch.response_body().cloned().unwrap_or_default();
            let status_code = fetch.status_code().unwrap_or(0);
            if !(200..300).contains(&status_code) {
                return ListGamesOutput { status: OpStatus::ErrRejected, games: Vec::new(), error: Some(body) };
            }
            match serde_json::from_slice::<ListGamesResponse>(&body) {
                Ok(response) => ListGamesOutput {
                    status: OpStatus::Ok,
                    games: response
                        .games
                        .into_iter()
                        .map(|entry| GameInfo {
                            join_token: Bytes::from(entry.join_token.into_bytes()),
                            creator: entry.creator,
                            data: entry.data,
                        })
                        .collect(),
                    error: None,
                },
                Err(_) => ListGamesOutput { status: OpStatus::ErrIo, games: Vec::new(), error: None },
            }
        }
        _ => ListGamesOutput { status: OpStatus::ErrIo, games: Vec::new(), error: None },
    }
}

pub struct JoinGameOutput {
    pub status: OpStatus,
    pub error: Option<Bytes>,
    /// The transport, already past `Connecting`, ready for
    /// [`crate::Session`] to install. Only populated on [`OpStatus::Ok`].
    pub transport: Option<AnyTransport>,
}

/// Drives `POST <path>/game/join` to completion, then hands the resulting
/// connect info to `connect` (which dials the backend the caller selected)
/// and waits, one tick at a time, for the transport to leave `Connecting`
/// before reporting success.
///
/// The 200 body is never JSON — it is the opaque transport config the
/// selected backend expects (a binary connect token for native, URL text
/// for browser) — so it is passed through to `connect` untouched rather
/// than decoded here.
pub async fn join_game(
    mut fetch: Fetch,
    connect: impl FnOnce(ConnectInfo) -> Result<AnyTransport, SetupError>,
) -> JoinGameOutput {
    let connect_info = match await_fetch(&mut fetch).await {
        FetchStatus::Finished => {
            let body = fetch.response_body().cloned().unwrap_or_default();
            let status_code = fetch.status_code().unwrap_or(0);
            if !(200..300).contains(&status_code) {
                return JoinGameOutput { status: OpStatus::ErrRejected, error: Some(body), transport: None };
            }
            ConnectInfo { payload: body.to_vec() }
        }
        _ => return JoinGameOutput { status: OpStatus::ErrIo, error: None, transport: None },
    };

    let mut transport = match connect(connect_info) {
        Ok(transport) => transport,
        Err(_) => return JoinGameOutput { status: OpStatus::ErrIo, error: None, transport: None },
    };

    loop {
        match transport.state() {
            ConnectionState::Connected => {
                return JoinGameOutput { status: OpStatus::Ok, error: None, transport: Some(transport) }
            }
            ConnectionState::Disconnected => {
                return JoinGameOutput { status: OpStatus::ErrIo, error: None, transport: None }
            }
            ConnectionState::Connecting => {
                // Drain and discard any events the handshake itself
                // produces; application messages can't arrive before the
                // transport the session will install has been installed.
                transport.poll();
                yield_once().await;
            }
        }
    }
}
