//! Streams and lanes
//!
//! A [`Stream`] is a pair of lanes created together. Each lane keeps a FIFO
//! of chains submitted on it that have not found a partner yet. Submitting on
//! one lane pairs the new chain with the oldest chain waiting on the other
//! lane, or queues it.
//!
//! ## Lifecycle
//!
//! A [`LaneHandle`] is one reference to one lane. Each lane counts its
//! handles; when a lane's count drops to zero the lane shuts down and every
//! chain still waiting on either lane completes with `EndOfLane`, as does
//! every later submission on the surviving lane. The stream itself lives as
//! long as any handle to either lane.
//!
//! ## Locking
//!
//! One lock per stream linearizes queueing and matching. Matching runs under
//! it and may take universe and address-space locks. Completions are
//! delivered, and chains dropped, only after it is released.

use crate::audit::IpcAuditEvent;
use crate::chain::PendingChain;
use crate::matcher;
use crate::state::KernelCore;
use crate::sync::lock;
use core_types::{ChainId, StreamId};
use ipc::ErrorCode;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// Observable state of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamLifecycle {
    /// Both lanes are reachable
    Open,
    /// One lane's last reference is gone
    HalfClosed,
    /// Both lanes are gone
    Closed,
}

#[derive(Default)]
struct StreamState {
    queues: [VecDeque<PendingChain>; 2],
    shut_down: [bool; 2],
}

pub struct Stream {
    id: StreamId,
    core: Arc<KernelCore>,
    lane_refs: [AtomicUsize; 2],
    state: Mutex<StreamState>,
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl Stream {
    /// Creates a stream and returns the only reference to each lane
    pub(crate) fn create(core: &Arc<KernelCore>) -> (LaneHandle, LaneHandle) {
        let stream = Arc::new(Stream {
            id: StreamId::new(),
            core: core.clone(),
            lane_refs: [AtomicUsize::new(1), AtomicUsize::new(1)],
            state: Mutex::new(StreamState::default()),
        });
        log::debug!("created {}", stream.id);
        core.record(IpcAuditEvent::StreamCreated { stream: stream.id });

        (
            LaneHandle {
                stream: stream.clone(),
                lane: 0,
            },
            LaneHandle { stream, lane: 1 },
        )
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    fn lifecycle(&self) -> StreamLifecycle {
        let state = lock(&self.state);
        match state.shut_down {
            [false, false] => StreamLifecycle::Open,
            [true, true] => StreamLifecycle::Closed,
            _ => StreamLifecycle::HalfClosed,
        }
    }

    fn submit(&self, lane: usize, chain: PendingChain) {
        let peer = 1 - lane;
        let mut state = lock(&self.state);

        if state.shut_down[0] || state.shut_down[1] {
            drop(state);
            self.core.record(IpcAuditEvent::ChainFailed {
                stream: self.id,
                chain: chain.id(),
                error: ErrorCode::EndOfLane,
            });
            chain.fail(ErrorCode::EndOfLane);
            return;
        }

        let Some(waiting) = state.queues[peer].pop_front() else {
            let id = chain.id();
            state.queues[lane].push_back(chain);
            drop(state);
            log::trace!("{} queued on lane {} of {}", id, lane, self.id);
            self.core.record(IpcAuditEvent::ChainQueued {
                stream: self.id,
                lane,
                chain: id,
            });
            return;
        };

        let (lane0, lane1) = if lane == 0 {
            (chain, waiting)
        } else {
            (waiting, chain)
        };
        let (records0, records1) = matcher::execute(&self.core, &lane0, &lane1);
        drop(state);

        log::trace!("{} matched {} on {}", lane0.id(), lane1.id(), self.id);
        self.core.record(IpcAuditEvent::ChainMatched {
            stream: self.id,
            lane0: lane0.id(),
            lane1: lane1.id(),
        });
        lane0.complete(records0);
        lane1.complete(records1);
    }

    /// Withdraws a waiting chain; returns it if it was still queued
    pub(crate) fn cancel(&self, lane: usize, id: ChainId) -> Option<PendingChain> {
        let chain = {
            let mut state = lock(&self.state);
            let position = state.queues[lane].iter().position(|chain| chain.id() == id)?;
            state.queues[lane].remove(position)?
        };
        self.core.record(IpcAuditEvent::ChainCancelled {
            stream: self.id,
            lane,
            chain: id,
        });
        Some(chain)
    }

    fn shutdown_lane(&self, lane: usize) {
        let drained: Vec<PendingChain> = {
            let mut state = lock(&self.state);
            state.shut_down[lane] = true;
            let mut drained: Vec<PendingChain> = state.queues[0].drain(..).collect();
            drained.extend(state.queues[1].drain(..));
            drained
        };

        log::debug!("lane {} of {} shut down", lane, self.id);
        self.core.record(IpcAuditEvent::LaneShutdown {
            stream: self.id,
            lane,
        });
        for chain in drained {
            self.core.record(IpcAuditEvent::ChainFailed {
                stream: self.id,
                chain: chain.id(),
                error: ErrorCode::EndOfLane,
            });
            chain.fail(ErrorCode::EndOfLane);
        }
    }

    #[cfg(test)]
    fn queued(&self, lane: usize) -> usize {
        lock(&self.state).queues[lane].len()
    }
}

/// A counted reference to one lane of a stream
pub struct LaneHandle {
    stream: Arc<Stream>,
    lane: usize,
}

impl LaneHandle {
    pub fn stream_id(&self) -> StreamId {
        self.stream.id
    }

    /// 0 or 1
    pub fn lane(&self) -> usize {
        self.lane
    }

    /// References to this lane currently alive
    pub fn lane_refs(&self) -> usize {
        self.stream.lane_refs[self.lane].load(Ordering::Acquire)
    }

    pub fn same_lane(&self, other: &LaneHandle) -> bool {
        Arc::ptr_eq(&self.stream, &other.stream) && self.lane == other.lane
    }

    pub fn is_peer_of(&self, other: &LaneHandle) -> bool {
        Arc::ptr_eq(&self.stream, &other.stream) && self.lane != other.lane
    }

    pub fn watch(&self) -> StreamWatch {
        StreamWatch {
            stream: Arc::downgrade(&self.stream),
        }
    }

    pub fn lifecycle(&self) -> StreamLifecycle {
        self.stream.lifecycle()
    }

    pub(crate) fn submit(&self, chain: PendingChain) {
        self.stream.submit(self.lane, chain);
    }

    pub(crate) fn downgrade(&self) -> Weak<Stream> {
        Arc::downgrade(&self.stream)
    }
}

impl Clone for LaneHandle {
    fn clone(&self) -> Self {
        self.stream.lane_refs[self.lane].fetch_add(1, Ordering::AcqRel);
        Self {
            stream: self.stream.clone(),
            lane: self.lane,
        }
    }
}

impl Drop for LaneHandle {
    fn drop(&mut self) {
        if self.stream.lane_refs[self.lane].fetch_sub(1, Ordering::AcqRel) == 1 {
            self.stream.shutdown_lane(self.lane);
        }
    }
}

impl fmt::Debug for LaneHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LaneHandle")
            .field("stream", &self.stream.id)
            .field("lane", &self.lane)
            .finish()
    }
}

/// Observes a stream without keeping it alive
#[derive(Debug, Clone)]
pub struct StreamWatch {
    stream: Weak<Stream>,
}

impl StreamWatch {
    pub fn lifecycle(&self) -> StreamLifecycle {
        match self.stream.upgrade() {
            Some(stream) => stream.lifecycle(),
            None => StreamLifecycle::Closed,
        }
    }

    /// References alive to each lane
    pub fn lane_refs(&self) -> [usize; 2] {
        match self.stream.upgrade() {
            Some(stream) => [
                stream.lane_refs[0].load(Ordering::Acquire),
                stream.lane_refs[1].load(Ordering::Acquire),
            ],
            None => [0, 0],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address_space::AddressSpace;
    use crate::chain::{prepare_chain, Submitter};
    use crate::completion::{CompletionSlot, Submission};
    use crate::config::KernelConfig;
    use crate::universe::Universe;
    use core_types::{AddressSpaceId, Credentials};
    use ipc::Action;
    use kernel_api::SubmitOptions;

    fn core() -> Arc<KernelCore> {
        Arc::new(KernelCore::new(KernelConfig::default()))
    }

    fn submit(core: &Arc<KernelCore>, lane: &LaneHandle, chain: Vec<Action>) -> Submission {
        let universe = Arc::new(Universe::new(16));
        let actions = prepare_chain(&chain, &universe, 8).unwrap();
        let submitter = Submitter {
            universe,
            space: Arc::new(AddressSpace::new(AddressSpaceId::from_raw(1))),
            credentials: Credentials::ZERO,
        };
        let id = core.next_chain_id();
        let slot = Arc::new(CompletionSlot::new());
        let chain = PendingChain::new(
            id,
            actions,
            submitter,
            SubmitOptions::default(),
            core.config.access_validation,
            slot.clone(),
        );
        let submission = Submission::new(id, slot, lane.downgrade(), lane.lane());
        lane.submit(chain);
        submission
    }

    #[test]
    fn test_lane_refs_follow_clones() {
        let core = core();
        let (lane0, lane1) = Stream::create(&core);
        assert_eq!(lane0.lane_refs(), 1);
        assert!(lane0.is_peer_of(&lane1));

        let copy = lane0.clone();
        assert_eq!(lane0.lane_refs(), 2);
        assert!(copy.same_lane(&lane0));

        drop(copy);
        assert_eq!(lane0.lane_refs(), 1);
        assert_eq!(lane0.lifecycle(), StreamLifecycle::Open);
    }

    #[test]
    fn test_lifecycle_transitions() {
        let core = core();
        let (lane0, lane1) = Stream::create(&core);
        let watch = lane0.watch();

        drop(lane1);
        assert_eq!(watch.lifecycle(), StreamLifecycle::HalfClosed);
        assert_eq!(watch.lane_refs(), [1, 0]);

        drop(lane0);
        assert_eq!(watch.lifecycle(), StreamLifecycle::Closed);
    }

    #[test]
    fn test_queue_then_match() {
        let core = core();
        let (lane0, lane1) = Stream::create(&core);

        let first = submit(&core, &lane0, vec![Action::ImbueCredentials]);
        assert!(!first.is_complete());
        assert_eq!(lane0.stream.queued(0), 1);

        let second = submit(&core, &lane1, vec![Action::ExtractCredentials]);
        assert!(first.is_complete());
        assert!(second.is_complete());
        assert_eq!(lane0.stream.queued(0), 0);
        assert!(first.wait().all_succeeded());
    }

    #[test]
    fn test_shutdown_fails_waiting_and_later_chains() {
        let core = core();
        let (lane0, lane1) = Stream::create(&core);
        let waiting = submit(&core, &lane0, vec![Action::PullDescriptor, Action::RecvInline]);

        drop(lane1);
        let results = waiting.wait();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.error() == ErrorCode::EndOfLane));

        let late = submit(&core, &lane0, vec![Action::offer()]);
        assert_eq!(late.wait().error_at(0), Some(ErrorCode::EndOfLane));

        let audit = core.audit_snapshot();
        assert!(audit.has_event(|e| matches!(e, IpcAuditEvent::LaneShutdown { lane: 1, .. })));
        assert_eq!(
            audit.count_events(|e| matches!(e, IpcAuditEvent::ChainFailed { .. })),
            2
        );
    }

    #[test]
    fn test_cancel_removes_only_that_chain() {
        let core = core();
        let (lane0, lane1) = Stream::create(&core);
        let first = submit(&core, &lane0, vec![Action::ImbueCredentials]);
        let second = submit(&core, &lane0, vec![Action::ImbueCredentials]);

        let cancelled = lane0.stream.cancel(0, first.id()).unwrap();
        cancelled.fail(ErrorCode::EndOfLane);
        assert!(lane0.stream.cancel(0, first.id()).is_none());
        assert_eq!(first.wait().error_at(0), Some(ErrorCode::EndOfLane));

        let peer = submit(&core, &lane1, vec![Action::ExtractCredentials]);
        assert!(second.wait().all_succeeded());
        assert!(peer.wait().all_succeeded());
    }
}
