//! # rql-reader
//!
//! A client library for UHF RFID readers speaking RQL, the SQL-like text
//! query protocol, providing tag inventory, continuous streaming, and tag
//! memory operations over a line-oriented transport.
//!
//! ## Features
//!
//! - **Read plans**: weighted, nested search descriptions compiled into
//!   independently timed sub-queries
//! - **Synchronous and continuous reads**: one-shot inventory or a
//!   background streaming session with clean start/stop semantics
//! - **Tag memory operations**: read/write/lock/kill with per-protocol
//!   bank and word/byte address translation
//! - **Pluggable transport**: TCP built in; serial or Bluetooth plug in
//!   behind the same trait
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rql_reader::prelude::*;
//!
//! let mut reader = RqlReader::tcp("192.168.1.100:8080");
//! reader.connect().await?;
//!
//! // One-shot inventory on antennas 1 and 2 for 500 ms
//! let plan = ReadPlan::Simple(SimpleReadPlan::new(vec![1, 2], TagProtocol::Gen2));
//! for record in reader.read(&plan, 500).await? {
//!     println!("{} on antenna {}", record.tag, record.antenna);
//! }
//!
//! // Continuous read with an event subscription
//! let mut events = reader.subscribe();
//! reader.start_reading(&plan).await?;
//! while let Ok(ReadEvent::TagRead(record)) = events.recv().await {
//!     println!("{}", record.tag);
//! }
//! reader.stop_reading().await;
//! ```
//!
//! ## Supported protocols
//!
//! | Air protocol | Token |
//! |--------------|-------|
//! | EPC Gen2 (ISO 18000-6C) | `GEN2` |
//! | ISO 18000-6B | `ISO18000-6B` |
//! | ISO 18000-6B UCODE | `ISO18000-6B-UCODE` |
//! | IPX 64/256 kbps | `IPX64`, `IPX256` |
//! | ANSI ATA | `ATA` |

pub mod core;
pub mod params;
pub mod reader;
pub mod rql;
pub mod transport;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::core::{
        LockAction, LockKind, MemBank, MultiReadPlan, ReadEvent, ReadHandler, ReadPlan,
        ReaderError, Result, SelectOp, SimpleReadPlan, StopTriggerPlan, TagFilter, TagIdentity,
        TagOp, TagProtocol, TagReadRecord,
    };
    pub use crate::params::{keys, MemoryParams, ParamValue, ParameterStore};
    pub use crate::reader::{ConnectionState, RqlReader};
    pub use crate::transport::{RqlTransport, TcpTransport};
}

// Re-export core types at crate root for convenience
pub use crate::core::error::{ReaderError, Result};
pub use crate::core::plan::{MultiReadPlan, ReadPlan, SimpleReadPlan, StopTriggerPlan};
pub use crate::core::record::{ReadEvent, ReadHandler, TagReadRecord};
pub use crate::core::tag::{TagIdentity, TagProtocol};
pub use crate::reader::{ConnectionState, ReaderDiagnostics, RqlReader};
