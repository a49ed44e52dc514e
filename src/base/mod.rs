//! This module contains base types that are used across Squall.

use bytes::Bytes;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

mod config;
mod error;
mod utils;

pub use config::*;
pub use error::*;
pub use utils::*;

/// An opaque byte string with a total (lexicographic) order. Every key begins
/// with a [`Ns`] byte that declares its namespace.
pub type Key = Bytes;

// These values are part of the key layout and shall never be changed.
#[repr(u8)]
#[derive(
    Debug,
    Display,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    IntoPrimitive,
    TryFromPrimitive,
)]
pub enum Ns {
    /// System records, such as transaction records.
    Record = 0,
    /// Versioned user data.
    Data = 1,
}

/// A single key or a half-open key range.
///
/// When `end_key` is absent the span denotes the single key `key`, otherwise
/// the range `[key, end_key)`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub key: Key,
    pub end_key: Option<Key>,
}

impl Span {
    /// A span covering exactly one key.
    pub fn point(key: Key) -> Self {
        Self { key, end_key: None }
    }

    /// A span covering the half-open range `[key, end_key)`.
    pub fn range(key: Key, end_key: Key) -> Self {
        Self {
            key,
            end_key: Some(end_key),
        }
    }

    /// Whether this span denotes a single key rather than a range.
    #[inline]
    pub fn is_point(&self) -> bool {
        self.end_key.is_none()
    }
}

impl std::fmt::Debug for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.end_key {
            Some(end) => write!(
                f,
                "Span({:?}..{:?})",
                PrettyBytes(&self.key),
                PrettyBytes(end)
            ),
            None => write!(f, "Span({:?})", PrettyBytes(&self.key)),
        }
    }
}

/// Caller-supplied priority for requests outside a transaction. Feeds the
/// priority tie-break when such a caller pushes a conflicting transaction.
#[derive(Debug, Display, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct UserPriority(pub f64);

impl Default for UserPriority {
    fn default() -> Self {
        Self(1.0)
    }
}
