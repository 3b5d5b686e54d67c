//! Drives a [`Session`] against a tiny local `axum` server to confirm the
//! lobby operations actually attach the session cookie as a bearer token
//! once a login has succeeded, and that a lobby call made before any login
//! goes out with no `Authorization` header at all rather than being
//! silently dropped.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;

use snet_client::{AuthState, Config, Event, LobbyState, Session};

#[derive(Default)]
struct Captured {
    authorization: Option<String>,
}

async fn auth_cookie(body: bytes::Bytes) -> bytes::Bytes {
    body
}

async fn list_games(State(state): State<Arc<Mutex<Captured>>>, headers: HeaderMap) -> &'static str {
    let authorization = headers.get("authorization").and_then(|v| v.to_str().ok()).map(str::to_owned);
    state.lock().unwrap().authorization = authorization;
    r#"{"games":[]}"#
}

fn start_server() -> (std::net::SocketAddr, Arc<Mutex<Captured>>, std::thread::JoinHandle<()>) {
    let captured = Arc::new(Mutex::new(Captured::default()));
    let captured_for_server = captured.clone();
    let (addr_tx, addr_rx) = std::sync::mpsc::channel();

    let thread = std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        runtime.block_on(async move {
            let app = Router::new()
                .route("/auth/cookie", post(auth_cookie))
                .route("/game/list", get(list_games))
                .with_state(captured_for_server);
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            addr_tx.send(listener.local_addr().unwrap()).unwrap();
            let _ = axum::serve(listener, app).await;
        });
    });

    let addr = addr_rx.recv().unwrap();
    (addr, captured, thread)
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
fn list_games_before_login_carries_no_authorization_header() {
    let (addr, captured, _server) = start_server();
    let mut config = Config::new(addr.ip().to_string());
    config.port = addr.port();
    // This test server is a plain `axum::serve`, with no TLS layered on —
    // `insecure_tls` is what points the client at it over `http` instead of
    // `https` (see `Config::base_url`).
    config.insecure_tls = true;
    let mut session = Session::new(config).unwrap();

    session.list_games();
    assert_eq!(session.lobby_state(), LobbyState::ListingGames);
    drain_until(&mut session, |e| matches!(e, Event::ListGamesFinished { .. }));

    assert_eq!(captured.lock().unwrap().authorization, None);
}

#[test]
fn list_games_after_login_carries_the_cookie_as_a_bearer_header() {
    let (addr, captured, _server) = start_server();
    let mut config = Config::new(addr.ip().to_string());
    config.port = addr.port();
    // This test server is a plain `axum::serve`, with no TLS layered on —
    // `insecure_tls` is what points the client at it over `http` instead of
    // `https` (see `Config::base_url`).
    config.insecure_tls = true;
    let mut session = Session::new(config).unwrap();

    session.login_with_cookie(b"my-session-cookie".to_vec());
    let event = drain_until(&mut session, |e| matches!(e, Event::LoginFinished { .. }));
    let Event::LoginFinished { status, .. } = event else { unreachable!() };
    assert_eq!(status, snet_client::OpStatus::Ok);
    assert_eq!(session.auth_state(), AuthState::Authorized);

    session.list_games();
    drain_until(&mut session, |e| matches!(e, Event::ListGamesFinished { .. }));

    assert_eq!(captured.lock().unwrap().authorization.as_deref(), Some("Bearer my-session-cookie"));
}
