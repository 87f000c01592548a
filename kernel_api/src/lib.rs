//! # Kernel API
//!
//! This crate defines the interface between user-space code and the kernel.
//!
//! ## Philosophy
//!
//! The kernel provides **mechanisms**, not policies:
//! - Rendezvous IPC over streams (not buffered message queues)
//! - Capability handles (not ambient names)
//! - Explicit descriptor transfer (no inheritance)
//!
//! ## Design Goals
//!
//! 1. **Testability**: The entire API can be implemented in-process
//! 2. **Explicitness**: Handles are resolved per universe, buffers per address space
//! 3. **Batching**: A whole action chain is one submission
//!
//! ## Non-Goals
//!
//! This is NOT:
//! - A message bus (no routing, no multicast)
//! - POSIX (no fork, exec, signals, files)

pub mod error;
pub mod kernel;
pub mod time;

pub use error::KernelError;
pub use kernel::{DescriptorInfo, KernelApi, SubmitOptions};
pub use time::{Duration, Instant};
