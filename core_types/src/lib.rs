//! # Core Types
//!
//! This crate defines the fundamental types used throughout Conduit.
//!
//! ## Philosophy
//!
//! Core types are designed with these principles:
//! - **Explicit over implicit**: Handles, credentials and addresses are typed.
//! - **Type safety first**: A handle cannot be confused with a length.
//! - **No ambient authority**: Every kernel object is reached through a handle.
//!
//! ## Key Types
//!
//! - [`Handle`]: A generation-tagged index into a universe
//! - [`Credentials`]: The 16-byte identity token of a thread
//! - [`ProcessId`], [`ThreadId`], [`StreamId`]: Unique identifiers
//! - [`AddressSpaceId`]: Ordered identifier used for lock ordering
//! - [`AccessError`]: Why an access to user memory was refused

pub mod credentials;
pub mod handle;
pub mod ids;
pub mod memory;

pub use credentials::{Credentials, CREDENTIALS_LEN};
pub use handle::Handle;
pub use ids::{AddressSpaceId, ChainId, ProcessId, StreamId, ThreadId};
pub use memory::{
    page_base, page_offset, straddles_page, AccessError, AccessKind, MemoryPerms, PAGE_SIZE,
};
