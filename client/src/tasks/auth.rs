//! Task bodies for the session's auth slot: cookie login and the itch.io
//! OAuth flow. [`login_with_cookie`] round-trips through the server to
//! validate (and possibly refresh) a cookie; [`login_with_itchio`] only
//! drives the OAuth loopback flow; its success payload already is the
//! session cookie, with no further server round-trip.

use std::future::poll_fn;
use std::task::Poll;

use bytes::Bytes;

use snet_protocol::MAX_COOKIE_SIZE;

use crate::error::OpStatus;
use crate::fetch::{Fetch, FetchStatus};
use crate::oauth::{OAuthFlow, OAuthStatus};

pub struct LoginOutput {
    pub status: OpStatus,
    pub data: Bytes,
}

async fn await_fetch(fetch: &mut Fetch) -> FetchStatus {
    poll_fn(|_cx| match fetch.poll() {
        FetchStatus::Pending => Poll::Pending,
        other => Poll::Ready(other),
    })
    .await
}

async fn await_oauth(flow: &mut OAuthFlow) -> OAuthStatus {
    poll_fn(|_cx| match flow.poll() {
        OAuthStatus::Pending => Poll::Pending,
        other => Poll::Ready(other),
    })
    .await
}

fn finish_from_fetch(fetch: &Fetch) -> LoginOutput {
    let body = fetch.response_body().cloned().unwrap_or_default();
    let status_code = fetch.status_code().unwrap_or(0);
    if !(200..300).contains(&status_code) {
        return LoginOutput { status: OpStatus::ErrRejected, data: body };
    }
    if body.len() > MAX_COOKIE_SIZE {
        return LoginOutput { status: OpStatus::ErrIo, data: Bytes::new() };
    }
    LoginOutput { status: OpStatus::Ok, data: body }
}

/// Drives `POST <base>/auth/cookie` with a host-supplied cookie as the
/// body.
pub async fn login_with_cookie(mut fetch: Fetch) -> LoginOutput {
    match await_fetch(&mut fetch).await {
        FetchStatus::Finished => finish_from_fetch(&fetch),
        _ => LoginOutput { status: OpStatus::ErrIo, data: Bytes::new() },
    }
}

/// Drives a loopback OAuth flow to completion. The provider's callback data
/// *is* the session cookie on success — there is no further server
/// round-trip to exchange it, unlike [`login_with_cookie`].
pub async fn login_with_itchio(mut flow: OAuthFlow) -> LoginOutput {
    let result = match await_oauth(&mut flow).await {
        OAuthStatus::Finished => flow.result().cloned(),
        _ => None,
    };
    let Some(result) = result else {
        return LoginOutput { status: OpStatus::ErrIo, data: Bytes::new() };
    };
    if !result.success {
        return LoginOutput { status: OpStatus::ErrRejected, data: result.data };
    }
    if result.data.len() > MAX_COOKIE_SIZE {
        return LoginOutput { status: OpStatus::ErrIo, data: Bytes::new() };
    }
    LoginOutput { status: OpStatus::Ok, data: result.data }
}
