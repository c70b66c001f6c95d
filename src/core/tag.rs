//! Tag identity types.
//!
//! A tag is identified by its air protocol and EPC byte string. Identities
//! are immutable once constructed; equality and hashing are defined over
//! `(protocol, epc)` so that the same tag observed with different CRC or PC
//! bytes compares equal.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::core::error::{ReaderError, Result};

/// Number of CRC bytes trailing the EPC in the wire `id` field.
pub const CRC_BYTES: usize = 2;

/// Air protocols known to the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TagProtocol {
    /// EPCglobal Class 1 Generation 2 (ISO 18000-6C).
    Gen2,

    /// ISO 18000-6B.
    Iso180006b,

    /// ISO 18000-6B with NXP UCODE extensions.
    Iso180006bUcode,

    /// IPX proprietary protocol, 64 kbps link.
    Ipx64,

    /// IPX proprietary protocol, 256 kbps link.
    Ipx256,

    /// ANSI ATA automatic equipment identification.
    Ata,

    /// Protocol not known or not applicable.
    #[default]
    None,
}

impl TagProtocol {
    /// The token used for this protocol in `protocol_id` clauses and rows.
    pub fn rql_token(&self) -> &'static str {
        match self {
            Self::Gen2 => "GEN2",
            Self::Iso180006b => "ISO18000-6B",
            Self::Iso180006bUcode => "ISO18000-6B-UCODE",
            Self::Ipx64 => "IPX64",
            Self::Ipx256 => "IPX256",
            Self::Ata => "ATA",
            Self::None => "NONE",
        }
    }

    /// Resolve a wire token to a protocol.
    pub fn from_rql_token(token: &str) -> Option<Self> {
        match token {
            "GEN2" => Some(Self::Gen2),
            "ISO18000-6B" => Some(Self::Iso180006b),
            "ISO18000-6B-UCODE" => Some(Self::Iso180006bUcode),
            "IPX64" => Some(Self::Ipx64),
            "IPX256" => Some(Self::Ipx256),
            "ATA" => Some(Self::Ata),
            _ => None,
        }
    }

    /// Check an EPC length against this protocol's length rule.
    ///
    /// Plain ISO 18000-6B tags carry exactly 8 identity bytes; the other
    /// protocols accept any length.
    pub fn epc_length_ok(&self, len: usize) -> bool {
        match self {
            Self::Iso180006b => len == 8,
            _ => true,
        }
    }
}

impl fmt::Display for TagProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.rql_token())
    }
}

/// Gen2 tag memory banks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemBank {
    /// Reserved memory (kill and access passwords).
    Reserved = 0,
    /// EPC memory.
    Epc = 1,
    /// Tag identification memory.
    Tid = 2,
    /// User memory.
    User = 3,
}

impl MemBank {
    /// Bank number as used in `mem_bank` clauses.
    pub fn number(&self) -> u32 {
        *self as u32
    }

    /// Resolve a bank number.
    pub fn from_number(n: u32) -> Option<Self> {
        match n {
            0 => Some(Self::Reserved),
            1 => Some(Self::Epc),
            2 => Some(Self::Tid),
            3 => Some(Self::User),
            _ => None,
        }
    }
}

/// Gen2 lock action: a 10-bit mask selecting which memory regions the
/// action bits apply to.
///
/// Mask bits `0x3FC` cover the regions stored in the tag-identity table
/// (kill password, access password, EPC, TID); mask bits `0x3` cover user
/// memory, stored in the tag-data table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockAction {
    /// Which lock bits the action applies to.
    pub mask: u16,
    /// The lock bit values to apply.
    pub action: u16,
}

/// Mask bits addressing identity memory (kill/access passwords, EPC, TID).
pub const LOCK_MASK_ID: u16 = 0x3FC;

/// Mask bits addressing user (data) memory.
pub const LOCK_MASK_DATA: u16 = 0x3;

impl LockAction {
    /// Lock action from raw mask and action bits.
    pub fn new(mask: u16, action: u16) -> Self {
        Self { mask, action }
    }

    /// Lock EPC memory.
    pub const EPC_LOCK: LockAction = LockAction { mask: 0x030, action: 0x030 };

    /// Unlock EPC memory.
    pub const EPC_UNLOCK: LockAction = LockAction { mask: 0x030, action: 0x000 };

    /// Lock user memory.
    pub const USER_LOCK: LockAction = LockAction { mask: 0x003, action: 0x003 };

    /// Unlock user memory.
    pub const USER_UNLOCK: LockAction = LockAction { mask: 0x003, action: 0x000 };

    /// Lock the access password.
    pub const ACCESS_LOCK: LockAction = LockAction { mask: 0x0C0, action: 0x0C0 };

    /// Lock the kill password.
    pub const KILL_PASSWORD_LOCK: LockAction = LockAction { mask: 0x300, action: 0x300 };

    /// Whether this action touches identity memory.
    pub fn touches_id(&self) -> bool {
        self.mask & LOCK_MASK_ID != 0
    }

    /// Whether this action touches user (data) memory.
    pub fn touches_data(&self) -> bool {
        self.mask & LOCK_MASK_DATA != 0
    }
}

/// Immutable tag identity.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct TagIdentity {
    /// Air protocol the tag was singulated under.
    pub protocol: TagProtocol,

    /// EPC bytes.
    epc: Vec<u8>,

    /// CRC bytes from the wire row, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    crc: Option<Vec<u8>>,

    /// Protocol control bytes (IPX variants), when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pc: Option<Vec<u8>>,
}

impl TagIdentity {
    /// Create a tag identity, validating the EPC length against the
    /// protocol's length rule.
    pub fn new(protocol: TagProtocol, epc: Vec<u8>) -> Result<Self> {
        if !protocol.epc_length_ok(epc.len()) {
            return Err(ReaderError::IllegalArgument(format!(
                "invalid EPC length {} for protocol {}",
                epc.len(),
                protocol
            )));
        }
        Ok(Self {
            protocol,
            epc,
            crc: None,
            pc: None,
        })
    }

    /// Create a tag identity from wire bytes without length validation.
    ///
    /// Rows received from the device are taken as-is.
    pub(crate) fn from_wire(protocol: TagProtocol, epc: Vec<u8>, crc: Option<Vec<u8>>) -> Self {
        Self {
            protocol,
            epc,
            crc,
            pc: None,
        }
    }

    /// Attach CRC bytes.
    #[must_use]
    pub fn with_crc(mut self, crc: Vec<u8>) -> Self {
        self.crc = Some(crc);
        self
    }

    /// Attach protocol control bytes (IPX variants).
    #[must_use]
    pub fn with_pc(mut self, pc: Vec<u8>) -> Self {
        self.pc = Some(pc);
        self
    }

    /// EPC bytes.
    pub fn epc(&self) -> &[u8] {
        &self.epc
    }

    /// CRC bytes, if known.
    pub fn crc(&self) -> Option<&[u8]> {
        self.crc.as_deref()
    }

    /// Protocol control bytes, if known.
    pub fn pc(&self) -> Option<&[u8]> {
        self.pc.as_deref()
    }

    /// EPC as uppercase hex.
    pub fn epc_hex(&self) -> String {
        hex_upper(&self.epc)
    }

    /// EPC followed by CRC as uppercase hex, the form used in `id` clauses.
    pub fn id_hex(&self) -> String {
        let mut s = hex_upper(&self.epc);
        if let Some(crc) = &self.crc {
            s.push_str(&hex_upper(crc));
        }
        s
    }
}

impl PartialEq for TagIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.protocol == other.protocol && self.epc == other.epc
    }
}

impl Hash for TagIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.epc.hash(state);
    }
}

impl fmt::Display for TagIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.protocol, self.epc_hex())
    }
}

/// Render bytes as uppercase hex without prefix.
pub fn hex_upper(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{:02X}", b);
    }
    s
}

/// Parse a hex string (with or without `0x` prefix) into bytes.
pub fn hex_decode(s: &str) -> Result<Vec<u8>> {
    let s = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    if s.len() % 2 != 0 {
        return Err(ReaderError::parse(format!("odd-length hex string: {}", s)));
    }
    (0..s.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&s[i..i + 2], 16)
                .map_err(|_| ReaderError::parse(format!("invalid hex string: {}", s)))
        })
        .collect()
}
