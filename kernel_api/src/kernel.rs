//! Kernel API trait and submission types

use crate::{Instant, KernelError};
use core_types::Handle;
use ipc::{parse_records, Action, ActionRecord, ChainResults, UserBuffer};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of object a descriptor refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DescriptorInfo {
    /// One end of a stream
    Lane,
    /// A shareable memory object
    Memory { size: usize },
    /// A handle table
    Universe,
}

impl fmt::Display for DescriptorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DescriptorInfo::Lane => write!(f, "lane"),
            DescriptorInfo::Memory { size } => write!(f, "memory({} bytes)", size),
            DescriptorInfo::Universe => write!(f, "universe"),
        }
    }
}

/// Where the kernel should report a chain's completion in user memory
///
/// Both fields are optional; the results are always available through the
/// returned submission as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SubmitOptions {
    /// Receives the encoded result stream, if it fits
    pub results: Option<UserBuffer>,
    /// Receives the total encoded length of the result stream (8 bytes, aligned)
    pub completion_word: Option<u64>,
}

impl SubmitOptions {
    pub fn with_results(mut self, buffer: UserBuffer) -> Self {
        self.results = Some(buffer);
        self
    }

    pub fn with_completion_word(mut self, address: u64) -> Self {
        self.completion_word = Some(address);
        self
    }
}

/// The kernel API trait
///
/// This is the surface one thread sees. Every handle argument is resolved in
/// the calling thread's universe, every buffer in its address space.
///
/// # Example
///
/// ```ignore
/// use ipc::Action;
/// use kernel_api::{KernelApi, KernelError};
///
/// fn ping<K: KernelApi>(kernel: &K, lane: core_types::Handle) -> Result<(), KernelError> {
///     let results = kernel.exchange(lane, vec![Action::offer(), Action::ImbueCredentials])?;
///     assert!(results.all_succeeded());
///     Ok(())
/// }
/// ```
pub trait KernelApi {
    /// Pending chain returned by submission
    type Submission;

    /// Creates a stream and returns handles to both of its lanes
    fn create_stream(&self) -> Result<(Handle, Handle), KernelError>;

    /// Submits an action chain on a lane
    ///
    /// The chain is matched against the oldest chain waiting on the peer
    /// lane, or queued until a peer chain arrives or the peer goes away.
    fn submit(&self, lane: Handle, chain: Vec<Action>) -> Result<Self::Submission, KernelError> {
        self.submit_with(lane, chain, SubmitOptions::default())
    }

    /// Submits an action chain with completion reporting options
    fn submit_with(
        &self,
        lane: Handle,
        chain: Vec<Action>,
        options: SubmitOptions,
    ) -> Result<Self::Submission, KernelError>;

    /// Submits a chain in its flat record form
    fn submit_records(
        &self,
        lane: Handle,
        records: &[ActionRecord],
        options: SubmitOptions,
    ) -> Result<Self::Submission, KernelError> {
        let chain = parse_records(records)?;
        self.submit_with(lane, chain, options)
    }

    /// Submits a chain and suspends until it completes
    fn exchange(&self, lane: Handle, chain: Vec<Action>) -> Result<ChainResults, KernelError>;

    /// Creates an empty universe and returns a handle to it
    fn create_universe(&self) -> Result<Handle, KernelError>;

    /// Creates a zero-filled memory object of `size` bytes
    fn create_memory(&self, size: usize) -> Result<Handle, KernelError>;

    /// Attaches a second reference to the same object in the caller's universe
    fn duplicate_descriptor(&self, handle: Handle) -> Result<Handle, KernelError>;

    /// Attaches a reference to the object in the universe named by `universe`
    fn transfer_descriptor(&self, handle: Handle, universe: Handle) -> Result<Handle, KernelError>;

    /// Drops the caller's reference
    fn close_descriptor(&self, handle: Handle) -> Result<(), KernelError>;

    /// Reports what kind of object a handle refers to
    fn descriptor_info(&self, handle: Handle) -> Result<DescriptorInfo, KernelError>;

    /// Current kernel time
    fn now(&self) -> Instant;
}
