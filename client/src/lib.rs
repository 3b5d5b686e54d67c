//! Client-side networking for a multiplayer game's lobby and session
//! service: authenticate, browse and create game rooms, join one, and
//! exchange reliable or unreliable messages with the other participants
//! once inside it.
//!
//! [`Session`] is the single entry point. Construct it with a [`Config`],
//! drive it once per frame with [`Session::update`], and drain
//! [`events::Event`]s with [`Session::next_event`]. Every operation
//! ([`Session::login_with_cookie`], [`Session::create_game`], ...) starts
//! work and returns immediately; its result shows up later as an event.
//! There is no threading inside this crate to synchronize with — a
//! [`Session`] is `!Send` and expects to be owned and driven from one
//! thread, the same way the host's own frame loop is.

pub mod config;
pub mod error;
pub mod events;
mod fetch;
mod oauth;
mod reliability;
mod session;
mod task;
mod tasks;
pub mod transport;

pub use config::Config;
pub use error::{ConfigError, OpStatus, SetupError};
pub use events::{DisconnectReason, Event, GameInfo};
pub use session::{AuthState, LobbyState, Session};

pub use snet_protocol::{TransportKind, Visibility};
