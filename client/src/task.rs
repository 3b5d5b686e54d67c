//! Cooperative single-threaded task scheduling.
//!
//! Each of the session's fixed operation slots (login, create game, join
//! game, list games) runs at most one body at a time, and that body is an
//! `async fn` rather than a hand-rolled state machine. There is no
//! executor: [`TaskSlot::poll_once`] drives the body's future exactly once
//! per [`crate::Session::update`] tick with a waker that does nothing,
//! mirroring a coroutine resumed once per frame. Nothing here ever awaits
//! an I/O readiness notification directly — the bodies poll [`crate::fetch::Fetch`]
//! and [`crate::oauth::OAuthFlow`] handles, which are themselves polled, not
//! woken.
//!
//! Cancellation needs no checked flag: starting a new task in an occupied
//! slot drops the old future outright, running all its locals' destructors
//! before the new one is ever polled, so a superseded task can never reach
//! the code path that would push a result event.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

pub type BoxedTask<T> = Pin<Box<dyn Future<Output = T>>>;

/// One fixed operation slot. Starting a new task while one is already
/// running drops it, cancelling it.
pub struct TaskSlot<T> {
    running: Option<BoxedTask<T>>,
}

impl<T> TaskSlot<T> {
    pub fn new() -> Self {
        Self { running: None }
    }

    pub fn is_busy(&self) -> bool {
        self.running.is_some()
    }

    /// Installs a new task body, dropping (cancelling) whatever was
    /// previously running in this slot.
    pub fn begin(&mut self, task: BoxedTask<T>) {
        self.running = Some(task);
    }

    /// Polls the running body once, if any. Returns its output the tick it
    /// completes; the slot is then free for the next `begin`.
    pub fn poll_once(&mut self) -> Option<T> {
        let task = self.running.as_mut()?;
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        match task.as_mut().poll(&mut cx) {
            Poll::Ready(output) => {
                self.running = None;
                Some(output)
            }
            Poll::Pending => None,
        }
    }
}

impl<T> Default for TaskSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn noop_waker() -> Waker {
    fn clone(_: *const ()) -> RawWaker {
        raw_waker()
    }
    fn no_op(_: *const ()) {}

    fn raw_waker() -> RawWaker {
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, no_op, no_op, no_op);
        RawWaker::new(std::ptr::null(), &VTABLE)
    }

    unsafe { Waker::from_raw(raw_waker()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_reports_output_once_ready() {
        let mut slot: TaskSlot<u32> = TaskSlot::new();
        assert!(!slot.is_busy());

        slot.begin(Box::pin(async { 42 }));
        assert!(slot.is_busy());
        assert_eq!(slot.poll_once(), Some(42));
        assert!(!slot.is_busy());
    }

    #[test]
    fn pending_body_stays_pending() {
        let mut slot: TaskSlot<u32> = TaskSlot::new();
        slot.begin(Box::pin(std::future::pending::<u32>()));
        assert_eq!(slot.poll_once(), None);
        assert!(slot.is_busy());
    }

    #[test]
    fn replacing_a_running_body_drops_it_and_runs_the_new_one() {
        use std::cell::Cell;
        use std::rc::Rc;

        struct MarkOnDrop(Rc<Cell<bool>>);
        impl Drop for MarkOnDrop {
            fn drop(&mut self) {
                self.0.set(true);
            }
        }

        let dropped = Rc::new(Cell::new(false));
        let guard = MarkOnDrop(dropped.clone());

        let mut slot: TaskSlot<u32> = TaskSlot::new();
        slot.begin(Box::pin(async move {
            let _guard = guard;
            std::future::pending::<u32>().await
        }));
        assert!(!dropped.get());

        slot.begin(Box::pin(async { 1 }));
        assert!(dropped.get(), "superseded task's future should be dropped, not left running");
        assert_eq!(slot.poll_once(), Some(1));
    }
}
