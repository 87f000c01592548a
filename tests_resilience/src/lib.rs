//! Resilience Test Utilities
//!
//! This crate provides shared utilities for IPC integration tests.
//!
//! ## Test Philosophy
//!
//! - **Real threads**: Submitters block like real threads; properties are
//!   checked under actual contention
//! - **No leaked references**: Every descriptor a test creates is accounted
//!   for by reference counts
//! - **Observable ordering**: The audit trail is the witness for matching
//!   order

use core_types::{AccessError, Handle};
use ipc::UserBuffer;
use kernel_api::KernelError;
use sim_kernel::{test_utils, KernelConfig, SimulatedKernel, Thread};

/// Bootstrap helper for tests
///
/// Creates a kernel with the default configuration.
pub fn test_bootstrap() -> SimulatedKernel {
    SimulatedKernel::new()
}

/// Bootstrap helper with a custom configuration
pub fn test_bootstrap_with(config: KernelConfig) -> SimulatedKernel {
    match SimulatedKernel::with_config(config) {
        Ok(kernel) => kernel,
        Err(err) => panic!("invalid test configuration: {}", err),
    }
}

/// One side of a connected pair
#[derive(Debug, Clone)]
pub struct Peer {
    pub thread: Thread,
    pub lane: Handle,
}

/// Two threads in separate processes connected by a fresh stream
pub fn connected_threads(kernel: &SimulatedKernel) -> Result<(Peer, Peer), KernelError> {
    let (a, lane_a, b, lane_b) = test_utils::connected_threads(kernel)?;
    Ok((
        Peer {
            thread: a,
            lane: lane_a,
        },
        Peer {
            thread: b,
            lane: lane_b,
        },
    ))
}

/// Places `data` in a fresh mapping of the thread's address space
pub fn map_bytes(thread: &Thread, address: u64, data: &[u8]) -> Result<UserBuffer, AccessError> {
    test_utils::map_buffer(thread, address, data)
}

/// Maps a zeroed buffer of `length` bytes
pub fn map_empty(thread: &Thread, address: u64, length: u64) -> Result<UserBuffer, AccessError> {
    test_utils::map_zeroed(thread, address, length)
}

pub fn read_bytes(thread: &Thread, buffer: UserBuffer) -> Result<Vec<u8>, AccessError> {
    test_utils::read_buffer(thread, buffer)
}
