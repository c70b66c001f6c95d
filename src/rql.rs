//! RQL, the reader's SQL-like text wire protocol.
//!
//! Statements are ASCII, `;`-terminated, newline-framed. Responses are zero
//! or more pipe-delimited data lines followed by one blank line; a line
//! beginning with `Error` signals failure.
//!
//! This module is pure translation: no I/O happens here. The query builder
//! renders statements, the compiler flattens read plans into timed
//! sub-queries, the row module normalizes response rows, and the memop
//! module translates tag-memory operations.

pub mod compiler;
pub mod memop;
pub mod query;
pub mod row;

/// Table holding tag identities.
pub const TAG_ID_TABLE: &str = "tag_id";

/// Table exposing tag memory access.
pub const TAG_DATA_TABLE: &str = "tag_data";

/// Table exposing reader settings.
pub const PARAMS_TABLE: &str = "params";

pub use compiler::{compile, CompiledQuery};
pub use query::{declare_cursor, fetch, hex_literal, select, set_auto, set_repeat, update, RESET};
pub use row::{parse_row, RowLayout};
