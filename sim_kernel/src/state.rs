//! Shared kernel state
//!
//! One [`KernelCore`] per [`SimulatedKernel`](crate::SimulatedKernel). It is
//! created once, handed to every stream and thread by `Arc`, and never torn
//! down while any of them is alive.

use crate::audit::{IpcAuditEvent, IpcAuditLog};
use crate::config::KernelConfig;
use crate::log_ring::LogRing;
use crate::sync::lock;
use core_types::{AddressSpaceId, ChainId};
use kernel_api::Instant;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug)]
pub(crate) struct KernelCore {
    pub(crate) config: KernelConfig,
    audit: Mutex<IpcAuditLog>,
    epoch: std::time::Instant,
    next_space: AtomicU64,
    next_chain: AtomicU64,
    log_ring: Arc<LogRing>,
}

impl KernelCore {
    pub(crate) fn new(config: KernelConfig) -> Self {
        let log_ring = Arc::new(LogRing::new(config.log_ring_bytes));
        Self {
            config,
            audit: Mutex::new(IpcAuditLog::new()),
            epoch: std::time::Instant::now(),
            next_space: AtomicU64::new(1),
            next_chain: AtomicU64::new(1),
            log_ring,
        }
    }

    /// Time since the kernel was created
    pub(crate) fn now(&self) -> Instant {
        let elapsed = self.epoch.elapsed().as_nanos();
        Instant::from_nanos(u64::try_from(elapsed).unwrap_or(u64::MAX))
    }

    pub(crate) fn record(&self, event: IpcAuditEvent) {
        if self.config.audit {
            let timestamp = self.now();
            lock(&self.audit).record_event(timestamp, event);
        }
    }

    pub(crate) fn audit_snapshot(&self) -> IpcAuditLog {
        lock(&self.audit).clone()
    }

    pub(crate) fn clear_audit(&self) {
        lock(&self.audit).clear();
    }

    pub(crate) fn next_space_id(&self) -> AddressSpaceId {
        AddressSpaceId::from_raw(self.next_space.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn next_chain_id(&self) -> ChainId {
        ChainId::from_raw(self.next_chain.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn log_ring(&self) -> &Arc<LogRing> {
        &self.log_ring
    }
}
