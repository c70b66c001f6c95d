//! Tag singulation filters.
//!
//! Filters narrow which tags respond to a search or tag operation. They are
//! pure data; the read-plan compiler turns them into WHERE-clause fragments
//! at the translation boundary.

use serde::{Deserialize, Serialize};

use crate::core::tag::{MemBank, TagIdentity};

/// Comparison operator for ISO 18000-6B select filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectOp {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
}

impl SelectOp {
    /// The `filter_command` code for this operator.
    pub fn command_code(&self) -> u32 {
        match self {
            Self::Equals => 0,
            Self::NotEquals => 1,
            Self::GreaterThan => 2,
            Self::LessThan => 3,
        }
    }
}

/// A tag singulation filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TagFilter {
    /// Match one tag exactly by its identity.
    Identity(TagIdentity),

    /// Gen2 select: match tags whose memory at a bit address equals a mask.
    Gen2Select {
        /// Invert the match.
        invert: bool,
        /// Memory bank the mask is compared against.
        bank: MemBank,
        /// Bit address where the comparison starts.
        bit_address: u32,
        /// Number of bits compared.
        bit_length: u16,
        /// Comparison mask bytes; empty means address/length only.
        mask: Vec<u8>,
    },

    /// ISO 18000-6B select: compare 8 data bytes at a byte address.
    ///
    /// The wire protocol fixes the comparison at 64 bits with a full
    /// `0xff` byte mask.
    Iso6bSelect {
        /// Comparison operator.
        op: SelectOp,
        /// Invert the match.
        invert: bool,
        /// Byte address the comparison starts at.
        address: u8,
        /// The 8 data bytes compared against tag memory.
        data: [u8; 8],
    },
}

impl TagFilter {
    /// Filter matching exactly one tag.
    pub fn identity(tag: TagIdentity) -> Self {
        Self::Identity(tag)
    }
}
