//! Re-issuing an operation on a slot must cancel and drain whatever was
//! previously running there: only the latest call's result is ever
//! observable, never the superseded one's.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::routing::post;
use axum::Router;
use tokio::net::TcpListener;

use snet_client::{Config, Event, OpStatus, Session};

#[derive(Default)]
struct Seen {
    bodies: Vec<String>,
}

/// Echoes the posted cookie back as the new cookie. A deliberate delay on
/// the first request makes it overwhelmingly likely it is still in flight
/// server-side by the time the client's second call supersedes it.
async fn auth_cookie(State(seen): State<Arc<Mutex<Seen>>>, body: bytes::Bytes) -> bytes::Bytes {
    let text = String::from_utf8_lossy(&body).into_owned();
    seen.lock().unwrap().bodies.push(text.clone());
    if text == "first" {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    body
}

fn start_server() -> (std::net::SocketAddr, Arc<Mutex<Seen>>, std::thread::JoinHandle<()>) {
    let seen = Arc::new(Mutex::new(Seen::default()));
    let seen_for_server = seen.clone();
    let (addr_tx, addr_rx) = std::sync::mpsc::channel();

    let thread = std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        runtime.block_on(async move {
            let app = Router::new().route("/auth/cookie", post(auth_cookie)).with_state(seen_for_server);
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            addr_tx.send(listener.local_addr().unwrap()).unwrap();
            let _ = axum::serve(listener, app).await;
        });
    });

    let addr = addr_rx.recv().unwrap();
    (addr, seen, thread)
}

fn drain_until(session: &mut Session, matches: impl Fn(&Event) -> bool) -> Option<Event> {
    let deadline = Instant::now() + Duration::from_millis(500);
    loop {
        session.update();
        while let Some(event) = session.next_event() {
            if matches(&event) {
                return Some(event);
            }
        }
        if Instant::now() >= deadline {
            return None;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn reissuing_login_cancels_the_prior_attempt_and_only_the_latest_finishes() {
    let (addr, _seen, _server) = start_server();
    let mut config = Config::new(addr.ip().to_string());
    config.port = addr.port();
    config.insecure_tls = true;
    let mut session = Session::new(config).unwrap();

    // The first request's handler sleeps, so it is still outstanding when
    // the second call supersedes its task slot and aborts it.
    session.login_with_cookie(b"first".to_vec());
    session.login_with_cookie(b"second".to_vec());

    let event = drain_until(&mut session, |e| matches!(e, Event::LoginFinished { .. }))
        .expect("the second login should finish");
    let Event::LoginFinished { status, data } = event else { unreachable!() };
    assert_eq!(status, OpStatus::Ok);
    assert_eq!(&data[..], b"second", "only the superseding call's result is ever observable");

    // The cancelled first attempt never surfaces a LoginFinished of its own,
    // even after giving its (aborted) server-side handler time to run out.
    std::thread::sleep(Duration::from_millis(200));
    assert!(drain_until(&mut session, |e| matches!(e, Event::LoginFinished { .. })).is_none());
}
