//! The event sum type drained by the host via [`crate::Session::next_event`].

use bytes::Bytes;

use crate::error::OpStatus;

/// Snapshot of a created or listed game room. Owned — no lifetime tied to
/// the task that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameInfo {
    pub join_token: Bytes,
    pub creator: String,
    pub data: String,
}

/// Reason a transport was torn down, surfaced on [`Event::Disconnected`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Reserved for a transport backend that can distinguish a
    /// host-initiated close from the two reasons below. No backend in this
    /// crate makes that distinction today: [`crate::Session::exit_game`]
    /// tears the transport down locally and reports completion via
    /// [`Event::ExitGameFinished`] instead of a synthetic disconnect, so
    /// this variant is never constructed.
    Exit,
    /// The server forcibly removed this client.
    Kicked,
    /// The connection was lost (timeout, network error, ...).
    Error,
}

/// A single event drained from [`crate::Session::next_event`]. Returned by
/// value, so there is no backing memory to invalidate between calls.
#[derive(Debug, Clone)]
pub enum Event {
    /// Result of [`crate::Session::login_with_cookie`] or
    /// [`crate::Session::login_with_itchio`]. On [`OpStatus::Ok`], `data`
    /// is the new session cookie; on [`OpStatus::ErrRejected`], it is the
    /// server's rejection body.
    LoginFinished { status: OpStatus, data: Bytes },

    /// Result of [`crate::Session::create_game`]. On [`OpStatus::Ok`],
    /// `info` is populated; on [`OpStatus::ErrRejected`], `error` holds the
    /// server's body.
    CreateGameFinished {
        status: OpStatus,
        info: Option<GameInfo>,
        error: Option<Bytes>,
    },

    /// Result of [`crate::Session::list_games`].
    ListGamesFinished {
        status: OpStatus,
        games: Vec<GameInfo>,
        error: Option<Bytes>,
    },

    /// Result of [`crate::Session::join_game`].
    JoinGameFinished { status: OpStatus, error: Option<Bytes> },

    /// Result of [`crate::Session::exit_game`], emitted once the transport
    /// has actually torn down.
    ExitGameFinished,

    /// A remote participant joined the active game.
    PlayerJoined { id: u16, name: String, data: Bytes },

    /// A remote participant left the active game.
    PlayerLeft { id: u16 },

    /// An application message arrived over the active transport.
    Message { sender: u16, data: Bytes },

    /// The active transport disconnected (synthetic event, see
    /// [`crate::Session::next_event`]).
    Disconnected { reason: DisconnectReason },
}
