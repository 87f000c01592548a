//! # Simulated Kernel
//!
//! This crate provides an in-process implementation of the kernel API: the
//! rendezvous IPC engine, per-process handle tables, and simulated address
//! spaces for the buffers that chains copy between.
//!
//! ## Purpose
//!
//! The simulated kernel allows testing IPC behavior without hardware:
//! - Runs under `cargo test`
//! - Real concurrency: submitters are OS threads that block on completion
//! - Inspectable: universes, address spaces and the audit trail are all
//!   reachable from tests
//!
//! ## Philosophy
//!
//! **Testability is a first-class design constraint.**
//!
//! All kernel-wide state lives in one injected core created from a
//! [`KernelConfig`]. There are no ambient globals, except the optional
//! registration of the log ring as the `log` backend.
//!
//! ## Example
//!
//! ```
//! use ipc::Action;
//! use kernel_api::KernelApi;
//! use sim_kernel::SimulatedKernel;
//!
//! let kernel = SimulatedKernel::new();
//! let process = kernel.create_process();
//! let thread = kernel.create_thread(&process);
//!
//! let (lane0, lane1) = thread.create_stream().unwrap();
//! let waiting = thread.submit(lane0, vec![Action::ImbueCredentials]).unwrap();
//! let results = thread.exchange(lane1, vec![Action::ExtractCredentials]).unwrap();
//!
//! assert_eq!(results.get(0).unwrap().credentials(), Some(thread.credentials()));
//! assert!(waiting.wait().all_succeeded());
//! ```

pub mod accessor;
pub mod address_space;
pub mod audit;
mod chain;
pub mod completion;
pub mod config;
pub mod descriptor;
pub mod log_ring;
mod matcher;
pub mod object;
mod state;
pub mod stream;
mod sync;
pub mod test_utils;
pub mod universe;

pub use accessor::{transfer, DirectSpaceAccessor, ForeignSpaceAccessor, Plain};
pub use address_space::AddressSpace;
pub use audit::{IpcAuditEvent, IpcAuditLog, IpcAuditRecord};
pub use completion::Submission;
pub use config::{AccessValidation, ConfigError, KernelConfig};
pub use descriptor::{BorrowedDescriptor, UniqueDescriptor};
pub use log_ring::{LogRing, RingLogger};
pub use object::{AnyDescriptor, MemoryObject};
pub use stream::{LaneHandle, StreamLifecycle, StreamWatch};
pub use universe::Universe;

use chain::{prepare_chain, PendingChain, Submitter};
use completion::CompletionSlot;
use core_types::{Credentials, Handle, ProcessId, ThreadId};
use ipc::{Action, ChainResults};
use kernel_api::{DescriptorInfo, Instant, KernelApi, KernelError, SubmitOptions};
use state::KernelCore;
use std::sync::Arc;
use stream::Stream;

/// The simulated kernel
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct SimulatedKernel {
    core: Arc<KernelCore>,
}

impl Default for SimulatedKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SimulatedKernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedKernel")
            .field("config", &self.core.config)
            .finish_non_exhaustive()
    }
}

impl SimulatedKernel {
    /// Creates a kernel with the default configuration
    pub fn new() -> Self {
        Self {
            core: Arc::new(KernelCore::new(KernelConfig::default())),
        }
    }

    /// Creates a kernel with a validated configuration
    pub fn with_config(config: KernelConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            core: Arc::new(KernelCore::new(config)),
        })
    }

    pub fn config(&self) -> &KernelConfig {
        &self.core.config
    }

    /// Creates a process with an empty universe and address space
    pub fn create_process(&self) -> Arc<Process> {
        let process = Arc::new(Process {
            id: ProcessId::new(),
            universe: Arc::new(Universe::new(self.core.config.universe_capacity)),
            space: Arc::new(AddressSpace::new(self.core.next_space_id())),
        });
        log::debug!("created process {} with {}", process.id, process.space.id());
        process
    }

    /// Creates a thread with a fresh random credentials token
    pub fn create_thread(&self, process: &Arc<Process>) -> Thread {
        self.create_thread_with_credentials(process, Credentials::random())
    }

    pub fn create_thread_with_credentials(
        &self,
        process: &Arc<Process>,
        credentials: Credentials,
    ) -> Thread {
        Thread {
            id: ThreadId::new(),
            process: process.clone(),
            credentials,
            core: self.core.clone(),
        }
    }

    /// Snapshot of the IPC audit trail
    pub fn audit_log(&self) -> IpcAuditLog {
        self.core.audit_snapshot()
    }

    pub fn clear_audit_log(&self) {
        self.core.clear_audit();
    }

    pub fn log_ring(&self) -> Arc<LogRing> {
        self.core.log_ring().clone()
    }

    /// Registers the kernel log ring as the process-wide `log` backend
    ///
    /// Fails if another logger is already registered.
    pub fn install_logger(&self) -> Result<(), log::SetLoggerError> {
        let level = self.core.config.log_level;
        log::set_boxed_logger(Box::new(RingLogger::new(self.log_ring(), level)))?;
        log::set_max_level(level);
        Ok(())
    }

    pub fn now(&self) -> Instant {
        self.core.now()
    }
}

/// A process: one universe and one address space
#[derive(Debug)]
pub struct Process {
    id: ProcessId,
    universe: Arc<Universe>,
    space: Arc<AddressSpace>,
}

impl Process {
    pub fn id(&self) -> ProcessId {
        self.id
    }

    pub fn universe(&self) -> &Arc<Universe> {
        &self.universe
    }

    pub fn address_space(&self) -> &Arc<AddressSpace> {
        &self.space
    }
}

/// A thread of a process
///
/// Every kernel call is made through a thread; handles resolve in its
/// process's universe and buffers in its process's address space.
#[derive(Debug, Clone)]
pub struct Thread {
    id: ThreadId,
    process: Arc<Process>,
    credentials: Credentials,
    core: Arc<KernelCore>,
}

impl Thread {
    pub fn id(&self) -> ThreadId {
        self.id
    }

    pub fn process(&self) -> &Arc<Process> {
        &self.process
    }

    pub fn credentials(&self) -> Credentials {
        self.credentials
    }

    fn lane(&self, handle: Handle) -> Result<LaneHandle, KernelError> {
        match self.process.universe.get(handle)? {
            AnyDescriptor::Lane(lane) => Ok(lane),
            _ => Err(KernelError::WrongObjectType {
                handle,
                expected: "lane",
            }),
        }
    }

    fn target_universe(&self, handle: Handle) -> Result<Arc<Universe>, KernelError> {
        match self.process.universe.get(handle)? {
            AnyDescriptor::Universe(universe) => Ok(universe),
            _ => Err(KernelError::WrongObjectType {
                handle,
                expected: "universe",
            }),
        }
    }

    fn owned(&self, descriptor: AnyDescriptor) -> Result<UniqueDescriptor, KernelError> {
        UniqueDescriptor::attach(self.process.universe.clone(), descriptor)
    }
}

impl KernelApi for Thread {
    type Submission = Submission;

    fn create_stream(&self) -> Result<(Handle, Handle), KernelError> {
        let (lane0, lane1) = Stream::create(&self.core);
        let first = self.owned(AnyDescriptor::Lane(lane0))?;
        let second = self.owned(AnyDescriptor::Lane(lane1))?;
        Ok((first.release(), second.release()))
    }

    fn submit_with(
        &self,
        lane: Handle,
        chain: Vec<Action>,
        options: SubmitOptions,
    ) -> Result<Submission, KernelError> {
        if chain.is_empty() {
            return Err(KernelError::IllegalArgs("empty action chain".to_string()));
        }
        let lane = self.lane(lane)?;
        let actions = prepare_chain(
            &chain,
            &self.process.universe,
            self.core.config.max_chain_depth,
        )?;

        let id = self.core.next_chain_id();
        let slot = Arc::new(CompletionSlot::new());
        let submitter = Submitter {
            universe: self.process.universe.clone(),
            space: self.process.space.clone(),
            credentials: self.credentials,
        };
        let pending = PendingChain::new(
            id,
            actions,
            submitter,
            options,
            self.core.config.access_validation,
            slot.clone(),
        );
        let submission = Submission::new(id, slot, lane.downgrade(), lane.lane());
        lane.submit(pending);
        Ok(submission)
    }

    fn exchange(&self, lane: Handle, chain: Vec<Action>) -> Result<ChainResults, KernelError> {
        Ok(self.submit(lane, chain)?.wait())
    }

    fn create_universe(&self) -> Result<Handle, KernelError> {
        let universe = Arc::new(Universe::new(self.core.config.universe_capacity));
        self.process.universe.attach(AnyDescriptor::Universe(universe))
    }

    fn create_memory(&self, size: usize) -> Result<Handle, KernelError> {
        let memory = Arc::new(MemoryObject::new(size)?);
        self.process.universe.attach(AnyDescriptor::Memory(memory))
    }

    fn duplicate_descriptor(&self, handle: Handle) -> Result<Handle, KernelError> {
        self.process.universe.duplicate(handle)
    }

    fn transfer_descriptor(&self, handle: Handle, universe: Handle) -> Result<Handle, KernelError> {
        let target = self.target_universe(universe)?;
        self.process.universe.transfer(handle, &target)
    }

    fn close_descriptor(&self, handle: Handle) -> Result<(), KernelError> {
        self.process.universe.close(handle)
    }

    fn descriptor_info(&self, handle: Handle) -> Result<DescriptorInfo, KernelError> {
        self.process.universe.info(handle)
    }

    fn now(&self) -> Instant {
        self.core.now()
    }
}
