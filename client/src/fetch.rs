//! The fetch primitive: a poll-based handle over a single HTTPS request.
//!
//! `reqwest` and a small single-threaded [`tokio::runtime::Runtime`] are the
//! bundled HTTPS client. [`Session`](crate::Session) owns the runtime; a [`Fetch`] just
//! spawns one request onto it and bridges the result back through a
//! [`tokio::sync::oneshot`] channel into the synchronous `begin`/`poll`
//! contract task bodies expect.

use bytes::Bytes;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

/// The outcome of a finished request: reqwest does not treat a non-2xx
/// response as an error, so this crate does the same — a 4xx/5xx response
/// still reaches [`FetchStatus::Finished`], with the status code and body
/// left for the caller to interpret (see `OpStatus::ErrRejected`).
pub struct FetchResult {
    pub status_code: u16,
    pub body: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    Pending,
    Finished,
    Error,
}

enum State {
    Pending(oneshot::Receiver<Result<FetchResult, reqwest::Error>>),
    Finished(FetchResult),
    Error,
}

pub struct Fetch {
    state: State,
    /// Aborted on drop so a cancelled task doesn't leave the request running
    /// to completion on the runtime after nobody can observe its result.
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl Fetch {
    /// Spawns `request` onto `runtime` and returns a handle that can be
    /// polled from outside the runtime's own thread.
    pub fn begin(runtime: &Handle, client: reqwest::Client, request: reqwest::Request) -> Self {
        let method = request.method().clone();
        let url = request.url().clone();
        let (tx, rx) = oneshot::channel();
        let handle = runtime.spawn(async move {
            let outcome = match client.execute(request).await {
                Ok(response) => {
                    let status_code = response.status().as_u16();
                    tracing::debug!(%method, %url, status_code, "fetch response received");
                    response.bytes().await.map(|body| FetchResult { status_code, body })
                }
                Err(err) => {
                    tracing::debug!(%method, %url, error = %err, "fetch failed");
                    Err(err)
                }
            };
            let _ = tx.send(outcome);
        });
        Fetch { state: State::Pending(rx), handle: Some(handle) }
    }

    pub fn poll(&mut self) -> FetchStatus {
        if let State::Pending(rx) = &mut self.state {
            match rx.try_recv() {
                Ok(Ok(result)) => self.state = State::Finished(result),
                Ok(Err(_)) => self.state = State::Error,
                Err(oneshot::error::TryRecvError::Empty) => return FetchStatus::Pending,
                Err(oneshot::error::TryRecvError::Closed) => self.state = State::Error,
            }
        }
        match &self.state {
            State::Pending(_) => FetchStatus::Pending,
            State::Finished(_) => FetchStatus::Finished,
            State::Error => FetchStatus::Error,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match &self.state {
            State::Finished(result) => Some(result.status_code),
            _ => None,
        }
    }

    pub fn response_body(&self) -> Option<&Bytes> {
        match &self.state {
            State::Finished(result) => Some(&result.body),
            _ => None,
        }
    }
}

impl Drop for Fetch {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
