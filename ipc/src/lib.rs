//! # Inter-Process Communication (IPC)
//!
//! This crate defines Conduit's rendezvous IPC vocabulary: the actions a
//! thread submits against a lane and the records it gets back.
//!
//! ## Philosophy
//!
//! - **Rendezvous, not mailboxes**: Nothing is buffered between peers beyond
//!   one queue of pending chains per lane.
//! - **Chains, not calls**: A submission is an ordered chain of actions that
//!   is matched atomically against the peer's chain.
//! - **Results are data**: Every action yields exactly one result record,
//!   even when the chain fails.
//!
//! ## Architecture
//!
//! - [`action`]: typed chain items and their kinds
//! - [`record`]: the flat submission form of a chain
//! - [`result`]: result records and their wire encoding
//! - [`error`]: per-action outcome codes

pub mod action;
pub mod error;
pub mod record;
pub mod result;

pub use action::{count_actions, result_kinds, Action, ActionKind, UserBuffer};
pub use error::ErrorCode;
pub use record::{
    flatten, parse_records, ActionRecord, ItemFlags, MarshalError, MAX_NESTING_DEPTH,
};
pub use result::{
    decode_results, encode_results, padded_len, ChainResults, DecodeError, ResultKind,
    ResultReader, ResultRecord, INLINE_ALIGN,
};
