//! Chain completion
//!
//! Every submitted chain gets one [`CompletionSlot`]. The kernel fills it
//! exactly once; the submitter observes it through a [`Submission`], either
//! by blocking the calling thread or by polling it as a future.

use crate::accessor::{DirectSpaceAccessor, ForeignSpaceAccessor};
use crate::address_space::AddressSpace;
use crate::config::AccessValidation;
use crate::stream::Stream;
use crate::sync::lock;
use core_types::{AccessKind, ChainId};
use ipc::{ChainResults, ErrorCode};
use kernel_api::{Duration, SubmitOptions};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Condvar, Mutex, PoisonError, Weak};
use std::task::{Context, Poll, Waker};

#[derive(Debug, Default)]
struct SlotState {
    results: Option<ChainResults>,
    completed: bool,
    waker: Option<Waker>,
}

/// Where a chain's results land
#[derive(Debug, Default)]
pub(crate) struct CompletionSlot {
    state: Mutex<SlotState>,
    ready: Condvar,
}

impl CompletionSlot {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn complete(&self, results: ChainResults) {
        let waker = {
            let mut state = lock(&self.state);
            state.results = Some(results);
            state.completed = true;
            state.waker.take()
        };
        self.ready.notify_all();
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    fn is_complete(&self) -> bool {
        lock(&self.state).completed
    }
}

/// Writes the encoded results and their length into the submitter's memory
///
/// A failure here cannot be reported through the results themselves; the
/// results stay available through the [`Submission`].
pub(crate) fn deliver_to_user(
    space: &Arc<AddressSpace>,
    options: &SubmitOptions,
    results: &ChainResults,
    validation: AccessValidation,
) {
    if options.results.is_none() && options.completion_word.is_none() {
        return;
    }
    let encoded = results.encode();

    if let Some(buffer) = options.results {
        if encoded.len() as u64 <= buffer.length {
            let written = ForeignSpaceAccessor::acquire(
                space.clone(),
                buffer.address,
                encoded.len() as u64,
                AccessKind::Write,
                validation,
            )
            .and_then(|accessor| accessor.copy_in(&encoded));
            if let Err(err) = written {
                log::debug!("result buffer at {:#x} not written: {}", buffer.address, err);
            }
        } else {
            log::debug!(
                "results need {} bytes, buffer at {:#x} holds {}",
                encoded.len(),
                buffer.address,
                buffer.length
            );
        }
    }

    if let Some(address) = options.completion_word {
        let stored = DirectSpaceAccessor::<u64>::acquire(
            space.clone(),
            address,
            AccessKind::Write,
            validation,
        )
        .and_then(|word| word.store(encoded.len() as u64));
        if let Err(err) = stored {
            log::debug!("completion word at {:#x} not written: {}", address, err);
        }
    }
}

/// A chain in flight
///
/// Dropping a `Submission` does not cancel the chain; it still matches (or
/// fails) normally, the results are simply discarded.
#[derive(Debug)]
pub struct Submission {
    id: ChainId,
    slot: Arc<CompletionSlot>,
    stream: Weak<Stream>,
    lane: usize,
}

impl Submission {
    pub(crate) fn new(id: ChainId, slot: Arc<CompletionSlot>, stream: Weak<Stream>, lane: usize) -> Self {
        Self {
            id,
            slot,
            stream,
            lane,
        }
    }

    pub fn id(&self) -> ChainId {
        self.id
    }

    pub fn is_complete(&self) -> bool {
        self.slot.is_complete()
    }

    /// Returns the results if the chain has completed, or the submission back
    pub fn try_take(self) -> Result<ChainResults, Self> {
        let taken = lock(&self.slot.state).results.take();
        taken.ok_or(self)
    }

    /// Blocks the calling thread until the chain completes
    pub fn wait(self) -> ChainResults {
        let mut state = lock(&self.slot.state);
        loop {
            if let Some(results) = state.results.take() {
                return results;
            }
            state = self
                .slot
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Blocks until the chain completes or `timeout` elapses
    ///
    /// On timeout the chain is withdrawn from its lane and completes with
    /// `EndOfLane` on every action. A chain that was already matched when
    /// the timeout fired completes with its real results instead.
    pub fn wait_timeout(self, timeout: Duration) -> ChainResults {
        let deadline = std::time::Instant::now() + timeout.to_std();
        {
            let mut state = lock(&self.slot.state);
            loop {
                if let Some(results) = state.results.take() {
                    return results;
                }
                let now = std::time::Instant::now();
                if now >= deadline {
                    break;
                }
                let (guard, _) = self
                    .slot
                    .ready
                    .wait_timeout(state, deadline - now)
                    .unwrap_or_else(PoisonError::into_inner);
                state = guard;
            }
        }

        if let Some(stream) = self.stream.upgrade() {
            if let Some(chain) = stream.cancel(self.lane, self.id) {
                log::debug!("{} timed out on lane {}", self.id, self.lane);
                chain.fail(ErrorCode::EndOfLane);
            }
        }
        self.wait()
    }
}

impl Future for Submission {
    type Output = ChainResults;

    /// Polling again after `Ready` stays `Pending`
    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<ChainResults> {
        let mut state = lock(&self.slot.state);
        match state.results.take() {
            Some(results) => Poll::Ready(results),
            None => {
                state.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}
