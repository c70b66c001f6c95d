//! Tag-memory operation translation.
//!
//! Bank/word/byte address arithmetic and statement construction for
//! memory reads and writes, lock, kill, and identity rewrite. Gen2
//! exposes byte-addressable operations that convert to word granularity
//! here; ISO 18000-6B addresses are word-granular one-to-one with bytes.

use crate::core::error::{ReaderError, Result};
use crate::core::filter::TagFilter;
use crate::core::op::LockKind;
use crate::core::tag::{hex_upper, TagIdentity, TagProtocol};
use crate::rql::compiler::{antenna_clause, filter_clauses, protocol_clause};
use crate::rql::query::{hex_literal, select, update};
use crate::rql::row::RowLayout;
use crate::rql::{TAG_DATA_TABLE, TAG_ID_TABLE};

/// Highest addressable memory bank.
pub const MAX_BANK: u32 = 3;

/// Largest word count a single operation may touch.
pub const MAX_WORD_COUNT: u32 = 8;

/// Context shared by every tag-memory operation: the protocol and antenna
/// being addressed, the optional singulation filter, and the Gen2 access
/// password (rendered only when non-zero).
#[derive(Debug, Clone, Copy)]
pub struct OpContext<'a> {
    pub protocol: TagProtocol,
    pub antenna: u16,
    pub filter: Option<&'a TagFilter>,
    pub access_password: u32,
    pub timeout_ms: u64,
}

/// Convert a Gen2 byte-granular range to word address and word count.
///
/// `word_address = byte_address / 2`; the word count over-reads by one
/// byte and rounds up, so an odd start or odd length still covers every
/// requested byte: `word_count = ceil((byte_count + 1 + byte_address % 2)
/// / 2)`. A read at an odd address yields one leading byte to discard on
/// decode.
pub fn gen2_words_for_bytes(byte_address: u32, byte_count: u32) -> (u32, u32) {
    let word_address = byte_address / 2;
    let word_count = (byte_count + 1 + byte_address % 2).div_ceil(2);
    (word_address, word_count)
}

/// Leading bytes to discard when decoding a byte read at this address.
pub fn gen2_decode_offset(byte_address: u32) -> usize {
    (byte_address % 2) as usize
}

/// Bounds check shared by all memory operations.
pub fn validate_bank_and_count(bank: u32, word_count: u32) -> Result<()> {
    if bank > MAX_BANK {
        return Err(ReaderError::IllegalArgument(format!(
            "memory bank {} out of range 0..={}",
            bank, MAX_BANK
        )));
    }
    if word_count > MAX_WORD_COUNT {
        return Err(ReaderError::IllegalArgument(format!(
            "word count {} out of range 0..={}",
            word_count, MAX_WORD_COUNT
        )));
    }
    Ok(())
}

/// Byte-oriented writes must start on a word boundary and cover whole words.
pub fn validate_byte_write(byte_address: u32, byte_count: usize) -> Result<()> {
    if byte_address % 2 != 0 {
        return Err(ReaderError::IllegalArgument(format!(
            "byte write address {} must be even",
            byte_address
        )));
    }
    if byte_count % 2 != 0 {
        return Err(ReaderError::IllegalArgument(format!(
            "byte write length {} must be even",
            byte_count
        )));
    }
    Ok(())
}

/// Render a memory-read SELECT against the tag-data table.
pub fn read_memory_query(
    ctx: OpContext<'_>,
    bank: u32,
    word_address: u32,
    word_count: u32,
) -> Result<String> {
    validate_bank_and_count(bank, word_count)?;
    let mut clauses = common_clauses(ctx, true)?;
    if ctx.protocol == TagProtocol::Gen2 {
        clauses.push(format!("mem_bank={}", bank));
    }
    clauses.push(format!("block_count={}", word_count));
    clauses.push(format!("block_number={}", word_address));
    Ok(select(
        RowLayout::EmbeddedOp.fields(),
        TAG_DATA_TABLE,
        &clauses,
        Some(ctx.timeout_ms),
    ))
}

/// Render a memory-write UPDATE against the tag-data table.
pub fn write_memory_query(
    ctx: OpContext<'_>,
    bank: u32,
    word_address: u32,
    data: &[u8],
) -> Result<String> {
    let word_count = (data.len() as u32 + 1) / 2;
    validate_bank_and_count(bank, word_count)?;
    let mut clauses = common_clauses(ctx, true)?;
    if ctx.protocol == TagProtocol::Gen2 {
        clauses.push(format!("mem_bank={}", bank));
    }
    clauses.push(format!("block_number={}", word_address));
    Ok(update(
        TAG_DATA_TABLE,
        "data",
        &hex_literal(data),
        &clauses,
        Some(ctx.timeout_ms),
    ))
}

/// Render the UPDATE statements for a lock request.
///
/// A Gen2 action whose mask touches both the identity bits (`0x3FC`) and
/// the user-memory bits (`0x3`) produces two statements, one against the
/// tag-identity table and one against the tag-data table. ISO 18000-6B
/// always targets the tag-identity table keyed by byte address.
pub fn lock_queries(ctx: OpContext<'_>, kind: LockKind) -> Result<Vec<String>> {
    match (kind, ctx.protocol) {
        (LockKind::Gen2(action), TagProtocol::Gen2) => {
            let clauses = common_clauses(ctx, true)?;
            let mut queries = Vec::new();
            if action.touches_id() {
                let locked = u8::from(action.action & crate::core::tag::LOCK_MASK_ID != 0);
                queries.push(update(
                    TAG_ID_TABLE,
                    "locked",
                    &locked.to_string(),
                    &clauses,
                    Some(ctx.timeout_ms),
                ));
            }
            if action.touches_data() {
                let locked = u8::from(action.action & crate::core::tag::LOCK_MASK_DATA != 0);
                queries.push(update(
                    TAG_DATA_TABLE,
                    "locked",
                    &locked.to_string(),
                    &clauses,
                    Some(ctx.timeout_ms),
                ));
            }
            if queries.is_empty() {
                return Err(ReaderError::IllegalArgument(
                    "lock action mask selects no memory region".into(),
                ));
            }
            Ok(queries)
        }
        (LockKind::Iso180006b { address }, TagProtocol::Iso180006b | TagProtocol::Iso180006bUcode) => {
            let mut clauses = common_clauses(ctx, false)?;
            clauses.push(format!("byte_address={}", address));
            Ok(vec![update(
                TAG_ID_TABLE,
                "locked",
                "1",
                &clauses,
                Some(ctx.timeout_ms),
            )])
        }
        (kind, protocol) => Err(ReaderError::Unsupported(format!(
            "lock kind {:?} is not expressible under {}",
            kind, protocol
        ))),
    }
}

/// Render the kill UPDATE. The kill password clause is appended only when
/// the password is non-zero.
pub fn kill_query(ctx: OpContext<'_>, password: u32) -> Result<String> {
    let mut clauses = common_clauses(ctx, false)?;
    if password != 0 {
        clauses.push(format!("password=0x{:08X}", password));
    }
    Ok(update(TAG_ID_TABLE, "killed", "1", &clauses, Some(ctx.timeout_ms)))
}

/// Render the identity-rewrite UPDATE.
pub fn write_id_query(ctx: OpContext<'_>, new_id: &TagIdentity) -> Result<String> {
    let clauses = common_clauses(ctx, true)?;
    Ok(update(
        TAG_ID_TABLE,
        "id",
        &format!("0x{}", hex_upper(new_id.epc())),
        &clauses,
        Some(ctx.timeout_ms),
    ))
}

/// Protocol + antenna + optional filter clauses, plus the Gen2 access
/// password clause when requested and non-zero.
fn common_clauses(ctx: OpContext<'_>, with_password: bool) -> Result<Vec<String>> {
    let mut clauses = vec![protocol_clause(ctx.protocol)];
    if let Some(clause) = antenna_clause(&[ctx.antenna]) {
        clauses.push(clause);
    }
    if let Some(filter) = ctx.filter {
        clauses.extend(filter_clauses(filter, ctx.protocol)?);
    }
    if with_password && ctx.protocol == TagProtocol::Gen2 && ctx.access_password != 0 {
        clauses.push(format!("password=0x{:08X}", ctx.access_password));
    }
    Ok(clauses)
}
