//! Action chain items
//!
//! A chain is an ordered `Vec<Action>` submitted against one lane. The
//! peer submits its own chain on the other lane of the stream and the
//! kernel pairs them item by item:
//!
//! | This side            | Peer side                       |
//! |----------------------|---------------------------------|
//! | `Offer`              | `Accept`                        |
//! | `ImbueCredentials`   | `ExtractCredentials`            |
//! | `SendBuffer`         | `RecvBuffer` or `RecvInline`    |
//! | `PushDescriptor`     | `PullDescriptor`                |
//!
//! `Offer` and `Accept` may carry a nested chain; the nested chains are
//! matched against each other across the stream created by the handshake.

use crate::result::ResultKind;
use core_types::Handle;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A buffer in the submitting thread's address space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct UserBuffer {
    pub address: u64,
    pub length: u64,
}

impl UserBuffer {
    pub const fn new(address: u64, length: u64) -> Self {
        Self { address, length }
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

/// Discriminant of an [`Action`]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    Offer = 1,
    Accept = 2,
    ImbueCredentials = 3,
    ExtractCredentials = 4,
    SendBuffer = 5,
    RecvBuffer = 6,
    RecvInline = 7,
    PushDescriptor = 8,
    PullDescriptor = 9,
}

impl ActionKind {
    pub fn from_raw(raw: u32) -> Option<Self> {
        let kind = match raw {
            1 => ActionKind::Offer,
            2 => ActionKind::Accept,
            3 => ActionKind::ImbueCredentials,
            4 => ActionKind::ExtractCredentials,
            5 => ActionKind::SendBuffer,
            6 => ActionKind::RecvBuffer,
            7 => ActionKind::RecvInline,
            8 => ActionKind::PushDescriptor,
            9 => ActionKind::PullDescriptor,
            _ => return None,
        };
        Some(kind)
    }

    pub fn as_raw(&self) -> u32 {
        *self as u32
    }

    /// Shape of the result record this kind of action produces
    pub fn result_kind(&self) -> ResultKind {
        match self {
            ActionKind::Offer | ActionKind::Accept | ActionKind::PullDescriptor => {
                ResultKind::Handle
            }
            ActionKind::ImbueCredentials | ActionKind::SendBuffer | ActionKind::PushDescriptor => {
                ResultKind::Simple
            }
            ActionKind::ExtractCredentials => ResultKind::Credentials,
            ActionKind::RecvBuffer => ResultKind::Length,
            ActionKind::RecvInline => ResultKind::Inline,
        }
    }

    /// Whether items of this kind may carry a nested chain
    pub fn is_handshake(&self) -> bool {
        matches!(self, ActionKind::Offer | ActionKind::Accept)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// One step of an action chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Offer(Vec<Action>),
    Accept(Vec<Action>),
    ImbueCredentials,
    ExtractCredentials,
    SendBuffer(UserBuffer),
    RecvBuffer(UserBuffer),
    RecvInline,
    PushDescriptor(Handle),
    PullDescriptor,
}

impl Action {
    pub fn offer() -> Self {
        Action::Offer(Vec::new())
    }

    pub fn offer_with(nested: Vec<Action>) -> Self {
        Action::Offer(nested)
    }

    pub fn accept() -> Self {
        Action::Accept(Vec::new())
    }

    pub fn accept_with(nested: Vec<Action>) -> Self {
        Action::Accept(nested)
    }

    pub fn send_buffer(address: u64, length: u64) -> Self {
        Action::SendBuffer(UserBuffer::new(address, length))
    }

    pub fn recv_buffer(address: u64, length: u64) -> Self {
        Action::RecvBuffer(UserBuffer::new(address, length))
    }

    pub fn push_descriptor(handle: Handle) -> Self {
        Action::PushDescriptor(handle)
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Offer(_) => ActionKind::Offer,
            Action::Accept(_) => ActionKind::Accept,
            Action::ImbueCredentials => ActionKind::ImbueCredentials,
            Action::ExtractCredentials => ActionKind::ExtractCredentials,
            Action::SendBuffer(_) => ActionKind::SendBuffer,
            Action::RecvBuffer(_) => ActionKind::RecvBuffer,
            Action::RecvInline => ActionKind::RecvInline,
            Action::PushDescriptor(_) => ActionKind::PushDescriptor,
            Action::PullDescriptor => ActionKind::PullDescriptor,
        }
    }

    /// The nested chain of a handshake (empty for every other kind)
    pub fn nested(&self) -> &[Action] {
        match self {
            Action::Offer(nested) | Action::Accept(nested) => nested,
            _ => &[],
        }
    }
}

/// Number of actions in a chain, nested items included
pub fn count_actions(chain: &[Action]) -> usize {
    chain
        .iter()
        .map(|action| 1 + count_actions(action.nested()))
        .sum()
}

/// Result shapes of a chain in delivery order
///
/// A handshake's own record comes first, followed by the records of its
/// nested chain.
pub fn result_kinds(chain: &[Action]) -> Vec<ResultKind> {
    let mut kinds = Vec::with_capacity(count_actions(chain));
    push_result_kinds(chain, &mut kinds);
    kinds
}

fn push_result_kinds(chain: &[Action], kinds: &mut Vec<ResultKind>) {
    for action in chain {
        kinds.push(action.kind().result_kind());
        push_result_kinds(action.nested(), kinds);
    }
}
