//! OAuth sub-module: launches the system browser at the provider's
//! authorize URL and waits for it to redirect back to a loopback listener
//! this crate owns, per the standard loopback-redirect flow for installed
//! apps.
//!
//! The listener is a tiny [`axum`] app bound to `127.0.0.1:0` (an
//! OS-assigned free port, picked fresh per flow so two concurrent logins
//! never collide); the browser launch goes through the [`open`] crate. Both
//! are, like the HTTPS client, bundled third-party collaborators rather
//! than something this crate implements itself.

use std::sync::{Arc, Mutex};

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

use crate::error::SetupError;
use snet_protocol::MAX_OAUTH_DATA_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthStatus {
    Pending,
    Finished,
    Error,
}

#[derive(Clone)]
pub struct OAuthResult {
    pub success: bool,
    pub data: Bytes,
}

#[derive(Deserialize)]
struct CallbackParams {
    data: String,
    success: u8,
}

struct CallbackState {
    sender: Mutex<Option<oneshot::Sender<OAuthResult>>>,
    /// Where the user's browser is sent once the callback has been
    /// captured — the provider's own terminal page, not anything this
    /// crate serves itself.
    end_url: String,
}

async fn oauth_callback(
    State(state): State<Arc<CallbackState>>,
    Query(params): Query<CallbackParams>,
) -> Response {
    let data = urlencoding::decode(&params.data)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_default();

    if data.len() > MAX_OAUTH_DATA_SIZE - 1 {
        tracing::debug!(len = data.len(), "oauth callback data exceeds limit, rejecting");
        let sender = state.sender.lock().expect("callback state mutex poisoned").take();
        if let Some(sender) = sender {
            let _ = sender.send(OAuthResult { success: false, data: Bytes::new() });
        }
        return (StatusCode::BAD_REQUEST, "oauth callback data too large").into_response();
    }

    tracing::debug!(success = params.success != 0, "oauth callback received");
    let sender = state.sender.lock().expect("callback state mutex poisoned").take();
    if let Some(sender) = sender {
        let _ = sender.send(OAuthResult { success: params.success != 0, data: Bytes::from(data) });
    }
    Redirect::to(&state.end_url).into_response()
}

/// One in-flight authorization attempt. Dropping it tears down the loopback
/// listener even if the provider never redirects back.
pub struct OAuthFlow {
    receiver: oneshot::Receiver<OAuthResult>,
    server: tokio::task::JoinHandle<()>,
    result: Option<OAuthResult>,
    errored: bool,
}

impl OAuthFlow {
    /// Binds the loopback listener, launches the browser at
    /// `authorize_url(port)`, and returns a handle to poll for completion.
    /// Once the provider redirects back to the loopback listener, the
    /// user's browser is sent on to `end_url` — the server's own terminal
    /// page for the flow.
    pub fn begin(
        runtime: &Handle,
        authorize_url: impl FnOnce(u16) -> String,
        end_url: impl Into<String>,
    ) -> Result<Self, SetupError> {
        let (tx, rx) = oneshot::channel();
        let state = Arc::new(CallbackState { sender: Mutex::new(Some(tx)), end_url: end_url.into() });
        let app = Router::new().route("/oauth_callback", get(oauth_callback)).with_state(state);

        // Bound synchronously with a std socket, then handed to tokio via
        // `from_std`: the bundled runtime is a single `current_thread`
        // scheduler permanently driven by its own background thread (see
        // `RuntimeDriver`), so a second top-level `block_on` entry from this
        // (the host's) thread has no core to claim and would deadlock
        // against it. `TcpListener::bind` never actually touches the
        // reactor at all, so skipping the async call site entirely sidesteps
        // the question rather than relying on a cooperative core handoff.
        let std_listener =
            std::net::TcpListener::bind(("127.0.0.1", 0)).map_err(SetupError::OAuthBind)?;
        std_listener.set_nonblocking(true).map_err(SetupError::OAuthBind)?;
        let port = std_listener.local_addr().map_err(SetupError::OAuthBind)?.port();
        let listener = {
            let _enter = runtime.enter();
            TcpListener::from_std(std_listener).map_err(SetupError::OAuthBind)?
        };

        let server = runtime.spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let url = authorize_url(port);
        tracing::debug!(port, url = %url, "opening oauth authorize url in browser");
        open::that(&url).map_err(|e| SetupError::Transport(format!("failed to launch browser: {e}")))?;

        Ok(OAuthFlow { receiver: rx, server, result: None, errored: false })
    }

    pub fn poll(&mut self) -> OAuthStatus {
        if self.result.is_some() {
            return OAuthStatus::Finished;
        }
        if self.errored {
            return OAuthStatus::Error;
        }
        match self.receiver.try_recv() {
            Ok(result) => {
                self.result = Some(result);
                OAuthStatus::Finished
            }
            Err(oneshot::error::TryRecvError::Empty) => OAuthStatus::Pending,
            Err(oneshot::error::TryRecvError::Closed) => {
                self.errored = true;
                OAuthStatus::Error
            }
        }
    }

    pub fn result(&self) -> Option<&OAuthResult> {
        self.result.as_ref()
    }
}

impl Drop for OAuthFlow {
    fn drop(&mut self) {
        self.server.abort();
    }
}
