//! Thread credentials
//!
//! Every thread carries a 16-byte identity token. `ImbueCredentials` hands
//! the token of the submitting thread to the peer, which receives it
//! byte-for-byte through `ExtractCredentials`. The kernel never interprets
//! the bytes.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Size of a credentials token in bytes
pub const CREDENTIALS_LEN: usize = 16;

/// A 16-byte opaque identity token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Credentials([u8; CREDENTIALS_LEN]);

impl Credentials {
    /// The all-zero token
    pub const ZERO: Credentials = Credentials([0; CREDENTIALS_LEN]);

    /// Wraps raw token bytes
    pub const fn from_bytes(bytes: [u8; CREDENTIALS_LEN]) -> Self {
        Self(bytes)
    }

    /// Generates a fresh random token
    pub fn random() -> Self {
        Self(*Uuid::new_v4().as_bytes())
    }

    /// Returns the raw token bytes
    pub const fn as_bytes(&self) -> &[u8; CREDENTIALS_LEN] {
        &self.0
    }
}

impl From<[u8; CREDENTIALS_LEN]> for Credentials {
    fn from(bytes: [u8; CREDENTIALS_LEN]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Creds(")?;
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, ")")
    }
}
