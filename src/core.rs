//! Core data model for the reader client.
//!
//! This module provides the types the rest of the crate is built from:
//! tag identities, filters, operations, read plans, and read records.

pub mod error;
pub mod filter;
pub mod op;
pub mod plan;
pub mod record;
pub mod tag;

pub use error::{ReaderError, Result};
pub use filter::{SelectOp, TagFilter};
pub use op::{LockKind, TagOp};
pub use plan::{MultiReadPlan, ReadPlan, SimpleReadPlan, StopTriggerPlan, DEFAULT_WEIGHT};
pub use record::{ReadEvent, ReadEventReceiver, ReadEventSender, ReadHandler, TagReadRecord};
pub use tag::{LockAction, MemBank, TagIdentity, TagProtocol, CRC_BYTES};
