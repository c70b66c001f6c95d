//! Tag memory and access operations.
//!
//! Operations carry only data. The RQL translator (`rql::memop`) renders
//! them into UPDATE/SELECT statements; nothing here performs I/O.

use serde::{Deserialize, Serialize};

use crate::core::tag::{LockAction, TagIdentity};

/// Protocol-specific lock request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "protocol", rename_all = "snake_case")]
pub enum LockKind {
    /// Gen2 lock: mask/action bit pairs over the five lockable regions.
    Gen2(LockAction),

    /// ISO 18000-6B lock: locks the byte at the given address.
    Iso180006b { address: u8 },
}

/// A tag operation, expressed as data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TagOp {
    /// Read `word_count` words from a memory bank.
    ///
    /// Addresses and counts are word-granular; byte-granular callers go
    /// through the reader's `*_bytes` methods, which perform the
    /// conversion before building the op.
    ReadMemory {
        bank: u32,
        word_address: u32,
        word_count: u32,
    },

    /// Write words to a memory bank.
    WriteMemory {
        bank: u32,
        word_address: u32,
        data: Vec<u8>,
    },

    /// Lock or unlock memory regions.
    Lock(LockKind),

    /// Kill the tag. The kill password clause is only rendered when the
    /// password is non-zero.
    Kill { password: u32 },

    /// Rewrite the tag's identity (EPC).
    WriteId(TagIdentity),
}

impl TagOp {
    /// Whether this op may be embedded in a read plan.
    ///
    /// Only memory reads have a row layout on the wire; everything else is
    /// a standalone command.
    pub fn embeddable(&self) -> bool {
        matches!(self, Self::ReadMemory { .. })
    }
}
