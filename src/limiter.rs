//! Bounded-concurrency admission gate.
//!
//! [`ConcurrencyLimit`] admits at most `capacity` tasks at once. Extra
//! submissions wait in a FIFO queue and start, in submission order, as running
//! tasks finish. A finished task hands its slot straight to the head of the
//! queue, so the running count never dips and a late submitter cannot jump
//! ahead of one that is already waiting.
//!
//! ## Why not `buffer_unordered`?
//!
//! `buffer_unordered` bounds one stream. The document pipeline submits work to
//! the gate from inside other gated tasks (each render task enqueues its own
//! processing task), and the caller collects handles long after submitting.
//! That needs a gate whose `run` returns immediately with a handle, which is
//! what this module provides.
//!
//! A `tokio::sync::Semaphore` is fair, but an `acquire_owned()` future only
//! joins its queue when first polled. Spawned tasks are polled in scheduler
//! order, so admission would not follow submission order. Here the place in
//! the queue is taken inside `run` itself.
//!
//! ```rust
//! use ocr_llm::ConcurrencyLimit;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ocr_llm::OcrError> {
//! let limit = ConcurrencyLimit::new(2)?;
//! let handles: Vec<_> = (0..5).map(|i| limit.run(async move { i * 2 })).collect();
//! let mut out = Vec::new();
//! for h in handles {
//!     out.push(h.await?);
//! }
//! assert_eq!(out, vec![0, 2, 4, 6, 8]);
//! # Ok(())
//! # }
//! ```

use crate::error::OcrError;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::trace;

/// A cloneable admission gate; clones share the same slots and queue.
#[derive(Clone)]
pub struct ConcurrencyLimit {
    inner: Arc<Inner>,
}

struct Inner {
    capacity: usize,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    running: usize,
    waiting: VecDeque<oneshot::Sender<()>>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take a slot now, or join the queue and return the ticket to wait on.
    fn admit(&self) -> Option<oneshot::Receiver<()>> {
        let mut state = self.lock();
        if state.running < self.capacity {
            state.running += 1;
            None
        } else {
            let (tx, rx) = oneshot::channel();
            state.waiting.push_back(tx);
            Some(rx)
        }
    }

    /// Hand the slot to the oldest live waiter, or give it back.
    fn release(&self) {
        let mut state = self.lock();
        while let Some(next) = state.waiting.pop_front() {
            if next.send(()).is_ok() {
                return;
            }
        }
        state.running = state.running.saturating_sub(1);
    }
}

/// Releases the slot when the task finishes, including by panic.
struct Slot {
    inner: Arc<Inner>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.inner.release();
    }
}

impl ConcurrencyLimit {
    /// Create a gate admitting at most `capacity` concurrent tasks.
    ///
    /// # Errors
    /// [`OcrError::InvalidConfig`] if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self, OcrError> {
        if capacity == 0 {
            return Err(OcrError::InvalidConfig(
                "concurrency limit capacity must be ≥ 1".into(),
            ));
        }
        Ok(Self {
            inner: Arc::new(Inner {
                capacity,
                state: Mutex::new(State::default()),
            }),
        })
    }

    /// Submit `task` and return a handle to its eventual output.
    ///
    /// Never waits: the task is queued (or started) before this returns, and
    /// the caller awaits the [`TaskHandle`] whenever it is ready to collect.
    /// Must be called from within a Tokio runtime.
    pub fn run<F, T>(&self, task: F) -> TaskHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let ticket = self.inner.admit();
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            if let Some(ticket) = ticket {
                trace!("task queued for a slot");
                // The sender is only dropped after a successful send, so the
                // receiver always resolves to Ok while this task is alive.
                let _ = ticket.await;
            }
            let _slot = Slot { inner };
            task.await
        });
        TaskHandle { handle }
    }

    /// Maximum number of tasks running at once.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Tasks currently holding a slot.
    pub fn running(&self) -> usize {
        self.inner.lock().running
    }

    /// Tasks waiting for a slot.
    pub fn queued(&self) -> usize {
        self.inner.lock().waiting.len()
    }
}

impl std::fmt::Debug for ConcurrencyLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("ConcurrencyLimit")
            .field("capacity", &self.inner.capacity)
            .field("running", &state.running)
            .field("queued", &state.waiting.len())
            .finish()
    }
}

/// Handle to a task submitted through [`ConcurrencyLimit::run`].
///
/// Resolves to the task's output, or [`OcrError::TaskFailed`] if it panicked.
/// Dropping the handle detaches the task; it still runs to completion.
#[must_use = "a TaskHandle does nothing unless awaited"]
pub struct TaskHandle<T> {
    handle: JoinHandle<T>,
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, OcrError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.handle)
            .poll(cx)
            .map(|res| res.map_err(|e| OcrError::TaskFailed(e.to_string())))
    }
}
