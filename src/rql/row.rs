//! Response row normalization.
//!
//! Rows are pipe-delimited. Two basic layouts exist, negotiated at connect
//! time from the device model (older models lack the trailing `lqi`
//! column), plus an extended layout used when a read plan embeds a memory
//! read. The field count must match the expected layout exactly.

use chrono::{DateTime, Utc};

use crate::core::error::{ReaderError, Result};
use crate::core::record::TagReadRecord;
use crate::core::tag::{hex_decode, TagIdentity, TagProtocol, CRC_BYTES};

/// Row field layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowLayout {
    /// `antenna_id|read_count|id|frequency|dspmicros|protocol_id`
    Basic,

    /// `antenna_id|read_count|id|frequency|dspmicros|protocol_id|lqi`
    BasicLqi,

    /// `antenna_id|read_count|id|metadata|data|protocol_id|phase`
    EmbeddedOp,
}

impl RowLayout {
    /// The SELECT field list for this layout.
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            Self::Basic => &[
                "antenna_id",
                "read_count",
                "id",
                "frequency",
                "dspmicros",
                "protocol_id",
            ],
            Self::BasicLqi => &[
                "antenna_id",
                "read_count",
                "id",
                "frequency",
                "dspmicros",
                "protocol_id",
                "lqi",
            ],
            Self::EmbeddedOp => &[
                "antenna_id",
                "read_count",
                "id",
                "metadata",
                "data",
                "protocol_id",
                "phase",
            ],
        }
    }

    /// Number of fields in this layout.
    pub fn field_count(&self) -> usize {
        self.fields().len()
    }
}

/// Normalize one response row into a tag-read record.
///
/// `base_time` is the receive time of the batch the row arrived in; the
/// device-reported microsecond offset is truncated to milliseconds.
pub fn parse_row(line: &str, layout: RowLayout, base_time: DateTime<Utc>) -> Result<TagReadRecord> {
    let fields: Vec<&str> = line.split('|').collect();
    if fields.len() != layout.field_count() {
        return Err(ReaderError::parse(format!(
            "row has {} fields, expected {}: {}",
            fields.len(),
            layout.field_count(),
            line
        )));
    }

    // A seven-column row is ambiguous between the lqi layout and the
    // embedded-op layout; the data field's 0x prefix resolves it.
    let layout = if layout == RowLayout::BasicLqi && fields[4].starts_with("0x") {
        RowLayout::EmbeddedOp
    } else {
        layout
    };

    let antenna = parse_num::<u16>(fields[0], "antenna_id", line)?;
    let read_count = parse_num::<u32>(fields[1], "read_count", line)?;

    let protocol = TagProtocol::from_rql_token(fields[5]).ok_or_else(|| {
        ReaderError::parse(format!("unknown protocol '{}' in row: {}", fields[5], line))
    })?;

    let tag = parse_id_field(fields[2], protocol, line)?;

    match layout {
        RowLayout::Basic | RowLayout::BasicLqi => {
            let frequency = parse_num::<u32>(fields[3], "frequency", line)?;
            let dspmicros = parse_num::<u64>(fields[4], "dspmicros", line)?;
            let rssi = if layout == RowLayout::BasicLqi {
                Some(parse_num::<i32>(fields[6], "lqi", line)?)
            } else {
                None
            };
            Ok(TagReadRecord {
                tag,
                antenna,
                read_count,
                rssi,
                frequency: Some(frequency),
                phase: None,
                base_time,
                offset_ms: dspmicros / 1000,
                data: Vec::new(),
            })
        }
        RowLayout::EmbeddedOp => {
            // metadata is carried on the wire but not surfaced
            let _metadata = parse_num::<u32>(fields[3], "metadata", line)?;
            if !fields[4].starts_with("0x") {
                return Err(ReaderError::parse(format!(
                    "embedded-op data field missing 0x prefix in row: {}",
                    line
                )));
            }
            let data = hex_decode(fields[4])?;
            let phase = parse_num::<u32>(fields[6], "phase", line)?;
            Ok(TagReadRecord {
                tag,
                antenna,
                read_count,
                rssi: None,
                frequency: None,
                phase: (protocol == TagProtocol::Gen2).then_some(phase),
                base_time,
                offset_ms: 0,
                data,
            })
        }
    }
}

/// Split the `id` field into EPC and trailing CRC bytes.
fn parse_id_field(field: &str, protocol: TagProtocol, line: &str) -> Result<TagIdentity> {
    let bytes = hex_decode(field)?;
    if bytes.len() < CRC_BYTES {
        return Err(ReaderError::parse(format!(
            "id field shorter than CRC width in row: {}",
            line
        )));
    }
    let crc_at = bytes.len() - CRC_BYTES;
    let crc = bytes[crc_at..].to_vec();
    let epc = bytes[..crc_at].to_vec();
    Ok(TagIdentity::from_wire(protocol, epc, Some(crc)))
}

fn parse_num<T: std::str::FromStr>(field: &str, name: &str, line: &str) -> Result<T> {
    field.trim().parse::<T>().map_err(|_| {
        ReaderError::parse(format!("bad {} value '{}' in row: {}", name, field, line))
    })
}
