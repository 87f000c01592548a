//! IPC Audit Trail
//!
//! This module records stream lifecycle and matching events so tests can
//! assert on what the rendezvous engine actually did.
//!
//! ## Philosophy
//!
//! - Test-facing: This is NOT the kernel log, it's for verification
//! - Deterministic: Events are recorded in the order they happened
//! - Queryable: Tests can assert on the trail to verify ordering properties
//!
//! ## Example
//!
//! ```
//! use sim_kernel::audit::{IpcAuditEvent, IpcAuditLog};
//! use core_types::StreamId;
//! use kernel_api::Instant;
//!
//! let mut audit_log = IpcAuditLog::new();
//! audit_log.record_event(
//!     Instant::from_nanos(1000),
//!     IpcAuditEvent::StreamCreated { stream: StreamId::new() },
//! );
//! assert_eq!(audit_log.len(), 1);
//! ```

use core_types::{ChainId, StreamId};
use ipc::ErrorCode;
use kernel_api::Instant;
use serde::{Deserialize, Serialize};

/// Something the rendezvous engine did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IpcAuditEvent {
    /// A stream was created (by `create_stream` or by a handshake)
    StreamCreated { stream: StreamId },
    /// A chain found no peer chain and was queued on its lane
    ChainQueued {
        stream: StreamId,
        lane: usize,
        chain: ChainId,
    },
    /// Two chains were paired and executed
    ChainMatched {
        stream: StreamId,
        lane0: ChainId,
        lane1: ChainId,
    },
    /// A chain completed without a match
    ChainFailed {
        stream: StreamId,
        chain: ChainId,
        error: ErrorCode,
    },
    /// The last reference to a lane was dropped
    LaneShutdown { stream: StreamId, lane: usize },
    /// A waiting chain was withdrawn after its timeout
    ChainCancelled {
        stream: StreamId,
        lane: usize,
        chain: ChainId,
    },
}

impl IpcAuditEvent {
    pub fn stream(&self) -> StreamId {
        match self {
            IpcAuditEvent::StreamCreated { stream }
            | IpcAuditEvent::ChainQueued { stream, .. }
            | IpcAuditEvent::ChainMatched { stream, .. }
            | IpcAuditEvent::ChainFailed { stream, .. }
            | IpcAuditEvent::LaneShutdown { stream, .. }
            | IpcAuditEvent::ChainCancelled { stream, .. } => *stream,
        }
    }
}

/// A single audit event with timestamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpcAuditRecord {
    pub timestamp: Instant,
    pub event: IpcAuditEvent,
}

/// Chronological record of IPC events
#[derive(Debug, Default, Clone)]
pub struct IpcAuditLog {
    events: Vec<IpcAuditRecord>,
}

impl IpcAuditLog {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn record_event(&mut self, timestamp: Instant, event: IpcAuditEvent) {
        self.events.push(IpcAuditRecord { timestamp, event });
    }

    pub fn get_events(&self) -> &[IpcAuditRecord] {
        &self.events
    }

    /// Events that concern one stream, in order
    pub fn events_for_stream(&self, stream: StreamId) -> Vec<&IpcAuditEvent> {
        self.events
            .iter()
            .map(|record| &record.event)
            .filter(|event| event.stream() == stream)
            .collect()
    }

    /// Pairs of chains that were matched on a stream, in match order
    pub fn matched_pairs(&self, stream: StreamId) -> Vec<(ChainId, ChainId)> {
        self.events
            .iter()
            .filter_map(|record| match &record.event {
                IpcAuditEvent::ChainMatched {
                    stream: s,
                    lane0,
                    lane1,
                } if *s == stream => Some((*lane0, *lane1)),
                _ => None,
            })
            .collect()
    }

    pub fn count_events<F>(&self, predicate: F) -> usize
    where
        F: Fn(&IpcAuditEvent) -> bool,
    {
        self.events.iter().filter(|e| predicate(&e.event)).count()
    }

    pub fn has_event<F>(&self, predicate: F) -> bool
    where
        F: Fn(&IpcAuditEvent) -> bool,
    {
        self.events.iter().any(|e| predicate(&e.event))
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matched_pairs_filters_by_stream() {
        let mut log = IpcAuditLog::new();
        let stream = StreamId::new();
        let other = StreamId::new();
        let a = ChainId::from_raw(1);
        let b = ChainId::from_raw(2);

        log.record_event(Instant::from_nanos(1), IpcAuditEvent::StreamCreated { stream });
        log.record_event(
            Instant::from_nanos(2),
            IpcAuditEvent::ChainMatched {
                stream,
                lane0: a,
                lane1: b,
            },
        );
        log.record_event(
            Instant::from_nanos(3),
            IpcAuditEvent::ChainMatched {
                stream: other,
                lane0: b,
                lane1: a,
            },
        );

        assert_eq!(log.matched_pairs(stream), vec![(a, b)]);
        assert_eq!(log.events_for_stream(stream).len(), 2);
    }

    #[test]
    fn test_queries() {
        let mut log = IpcAuditLog::new();
        let stream = StreamId::new();
        log.record_event(
            Instant::from_nanos(5),
            IpcAuditEvent::LaneShutdown { stream, lane: 1 },
        );

        assert!(log.has_event(|e| matches!(e, IpcAuditEvent::LaneShutdown { lane: 1, .. })));
        assert_eq!(
            log.count_events(|e| matches!(e, IpcAuditEvent::StreamCreated { .. })),
            0
        );
        assert_eq!(log.get_events()[0].timestamp, Instant::from_nanos(5));

        log.clear();
        assert!(log.is_empty());
    }
}
