//! The wire contract shared between this client library and the lobby/relay
//! server it talks to: the JSON bodies exchanged over HTTPS, and the sizing
//! constants the reliability overlay and transport façade are built around.
//!
//! The server side of this contract lives outside this workspace; this
//! crate exists so the client's HTTP and reliability code has one place to
//! point at instead of repeating magic numbers and ad hoc struct literals.

use serde::{Deserialize, Serialize};

/// Maximum size of the session cookie the server may return, in bytes.
pub const MAX_COOKIE_SIZE: usize = 1024;

/// Maximum size of the `data` field accepted by the OAuth loopback callback,
/// after percent-decoding.
pub const MAX_OAUTH_DATA_SIZE: usize = 1024;

/// Minimum size of a native transport connect token. Anything shorter is
/// rejected as a malformed `/game/join` response.
///
/// The 200 body of `POST <path>/game/join` is never JSON: it is the opaque
/// transport config handed straight to the backend `join_game` dialed —
/// a binary connect token for the native backend (this crate's own
/// address-prefixed framing of it, see `client::transport::native`) or
/// bare UTF-8 URL text for the browser backend. Nothing in this crate
/// parses that body as a serde struct.
pub const CONNECT_TOKEN_SIZE: usize = 128;

/// Reliability overlay fragment size, in bytes, mirroring the underlying
/// packet endpoint's own fragment size.
pub const FRAGMENT_SIZE: usize = 1000;

/// Maximum number of fragments a single reliability overlay message may be
/// split into.
pub const MAX_FRAGMENTS: usize = 32;

/// Maximum number of unacknowledged reliable messages outstanding at once.
pub const MAX_INFLIGHT: usize = 32;

/// Delay before an unacknowledged reliable message is resent.
pub const RESEND_DELAY_SECS: f64 = 0.2;

/// Largest application payload the reliability overlay will accept for a
/// single message (`MAX_FRAGMENTS * FRAGMENT_SIZE - 1`, the `-1` being the
/// header byte).
pub const MAX_MESSAGE_SIZE: usize = MAX_FRAGMENTS * FRAGMENT_SIZE - 1;

/// Advertised message-size ceiling for the native transport backend.
pub const NATIVE_MESSAGE_SIZE_LIMIT: usize = 4400;

/// Advertised message-size ceiling for the browser transport backend.
pub const BROWSER_MESSAGE_SIZE_LIMIT: usize = 4000;

/// Visibility of a created game room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

/// Body of `POST <path>/game/create`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateGameRequest {
    pub visibility: Visibility,
    pub max_num_players: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

/// 200 response body of `POST <path>/game/create`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateGameResponse {
    pub join_token: String,
    pub creator: String,
    #[serde(default)]
    pub data: String,
}

/// A single entry in the `/game/list` response.
#[derive(Debug, Clone, Deserialize)]
pub struct GameListEntry {
    pub creator: String,
    pub join_token: String,
    #[serde(default)]
    pub data: String,
}

/// 200 response body of `GET <path>/game/list`.
#[derive(Debug, Clone, Deserialize)]
pub struct ListGamesResponse {
    pub games: Vec<GameListEntry>,
}

// Tag bytes prefixing every payload carried over a joined game's data
// channel (on top of, not to be confused with, the reliability overlay's
// own reliable/unreliable header bit). The HTTP contract in this document
// doesn't cover in-game traffic, so this multiplexing scheme is this
// crate's own resolution of that gap, modeled on the tagged-message
// control scheme a relay server in this space would use to fold
// membership changes into the same stream as application messages rather
// than opening a side channel for them.

/// An application message. Outbound, followed directly by the payload (the
/// relay knows the sender from the connection it arrived on). Inbound, the
/// relay fans messages out to every other participant and prefixes a u16
/// sender player id so they can tell who sent it.
pub const DATA_CHANNEL_MESSAGE: u8 = 0;
/// A participant joined the game. Followed by u16 player id, u16 name
/// length, name bytes, then application-defined join data.
pub const DATA_CHANNEL_PLAYER_JOINED: u8 = 1;
/// A participant left the game. Followed by u16 player id.
pub const DATA_CHANNEL_PLAYER_LEFT: u8 = 2;

/// Which transport kind a client is requesting when it joins a game,
/// appended as the `transport` query parameter on `/game/join`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Native,
    Browser,
}

impl TransportKind {
    pub fn query_value(self) -> &'static str {
        match self {
            TransportKind::Native => "cute_net",
            TransportKind::Browser => "webtransport",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_message_size_is_fragment_limit_times_max_fragments() {
        assert_eq!(MAX_MESSAGE_SIZE, 31_999);
    }

    #[test]
    fn visibility_serializes_lowercase() {
        let json = serde_json::to_string(&Visibility::Public).unwrap();
        assert_eq!(json, "\"public\"");
    }

    #[test]
    fn transport_kind_query_values() {
        assert_eq!(TransportKind::Native.query_value(), "cute_net");
        assert_eq!(TransportKind::Browser.query_value(), "webtransport");
    }
}
