//! Drives a real [`Session`] against an unreachable loopback address so its
//! HTTP-backed operations fail quickly and deterministically, without a test
//! server. This exercises the bundled tokio runtime end to end: a real
//! `reqwest` request is spawned, actually polled to completion on the
//! session's background runtime thread, and its result bridged back into
//! `Session::update`'s synchronous polling loop.

use std::time::{Duration, Instant};

use snet_client::{AuthState, Config, Event, LobbyState, OpStatus, Session};
use snet_protocol::Visibility;

/// Nothing listens on loopback port 1, so the connection is refused almost
/// immediately — no DNS lookup or timeout to wait out.
fn unreachable_config() -> Config {
    let mut config = Config::new("127.0.0.1");
    config.port = 1;
    config.insecure_tls = true;
    config
}

fn drain_until(session: &mut Session, matches: impl Fn(&Event) -> bool) -> Event {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        session.update();
        while let Some(event) = session.next_event() {
            if matches(&event) {
                return event;
            }
        }
        assert!(Instant::now() < deadline, "timed out waiting for event");
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn unreachable_server_surfaces_create_game_as_io_error() {
    let mut session = Session::new(unreachable_config()).unwrap();
    session.create_game(Visibility::Public, 4, None);
    assert_eq!(session.lobby_state(), LobbyState::CreatingGame);

    let event = drain_until(&mut session, |e| matches!(e, Event::CreateGameFinished { .. }));
    let Event::CreateGameFinished { status, info, error } = event else { unreachable!() };
    assert_eq!(status, OpStatus::ErrIo);
    assert!(info.is_none());
    assert!(error.is_none());
    assert_eq!(session.lobby_state(), LobbyState::InLobby);
}

#[test]
fn create_game_is_a_no_op_while_another_lobby_operation_is_in_flight() {
    let mut session = Session::new(unreachable_config()).unwrap();
    session.list_games();
    assert_eq!(session.lobby_state(), LobbyState::ListingGames);

    session.create_game(Visibility::Public, 4, None);
    assert_eq!(session.lobby_state(), LobbyState::ListingGames);

    drain_until(&mut session, |e| matches!(e, Event::ListGamesFinished { .. }));
}

#[test]
fn login_with_cookie_surfaces_as_io_error_against_an_unreachable_host() {
    let mut session = Session::new(unreachable_config()).unwrap();
    session.login_with_cookie(b"some-cookie".to_vec());
    assert_eq!(session.auth_state(), AuthState::Authorizing);

    let event = drain_until(&mut session, |e| matches!(e, Event::LoginFinished { .. }));
    let Event::LoginFinished { status, .. } = event else { unreachable!() };
    assert_eq!(status, OpStatus::ErrIo);
    assert_eq!(session.auth_state(), AuthState::Unauthorized);
}

#[test]
fn join_game_fails_closed_when_the_join_request_itself_is_unreachable() {
    let mut session = Session::new(unreachable_config()).unwrap();
    session.join_game(b"token".to_vec(), snet_protocol::TransportKind::Native);
    assert_eq!(session.lobby_state(), LobbyState::JoiningGame);

    let event = drain_until(&mut session, |e| matches!(e, Event::JoinGameFinished { .. }));
    let Event::JoinGameFinished { status, .. } = event else { unreachable!() };
    assert_eq!(status, OpStatus::ErrIo);
    assert_eq!(session.lobby_state(), LobbyState::InLobby);
}
