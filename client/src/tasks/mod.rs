//! Task bodies run inside the session's fixed operation slots.

pub mod auth;
pub mod lobby;

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Returns `Pending` exactly once, then `Ready`. A task body awaits this to
/// hand control back to [`crate::Session::update`] for one tick without
/// blocking on any particular I/O source — used by `join_game` to wait for
/// the transport façade to leave `Connecting` one tick at a time.
pub(crate) fn yield_once() -> impl Future<Output = ()> {
    struct YieldOnce(bool);
    impl Future for YieldOnce {
        type Output = ();
        fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
            if self.0 {
                Poll::Ready(())
            } else {
                self.0 = true;
                Poll::Pending
            }
        }
    }
    YieldOnce(false)
}
