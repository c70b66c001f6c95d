//! Configuration parameter registry.
//!
//! The engine reads all operating parameters through the `ParameterStore`
//! trait, so callers can back it with anything (a config file, a device
//! settings cache). `MemoryParams` is the default in-memory backend with
//! per-key validation.

mod memory;
mod traits;
mod value;

pub use memory::MemoryParams;
pub use traits::ParameterStore;
pub use value::ParamValue;

/// Well-known parameter keys.
pub mod keys {
    /// Per-command response timeout, milliseconds.
    pub const COMMAND_TIMEOUT: &str = "/reader/commandTimeout";

    /// Base transport receive timeout, milliseconds. The effective receive
    /// deadline of a command is this plus the command timeout.
    pub const TRANSPORT_TIMEOUT: &str = "/reader/transportTimeout";

    /// Length of each continuous-read burst, milliseconds. Each cursor's
    /// share of it is weight-proportional.
    pub const ASYNC_ON_TIME: &str = "/reader/read/asyncOnTime";

    /// Pause between continuous-read bursts, milliseconds. The wire
    /// `SET repeat` interval is on-time plus off-time.
    pub const ASYNC_OFF_TIME: &str = "/reader/read/asyncOffTime";

    /// Antenna used by standalone tag operations.
    pub const TAGOP_ANTENNA: &str = "/reader/tagop/antenna";

    /// Protocol token used by standalone tag operations.
    pub const TAGOP_PROTOCOL: &str = "/reader/tagop/protocol";

    /// Gen2 access password applied to memory and lock operations.
    pub const ACCESS_PASSWORD: &str = "/reader/gen2/accessPassword";

    /// Gen2 session (0-3). Passed through, not reinterpreted.
    pub const GEN2_SESSION: &str = "/reader/gen2/session";

    /// Gen2 initial Q (0-15). Passed through, not reinterpreted.
    pub const GEN2_INIT_Q: &str = "/reader/gen2/initQ";

    /// Gen2 target: A, B, AB, or BA.
    pub const GEN2_TARGET: &str = "/reader/gen2/target";

    /// Deduplicate synchronous read results.
    pub const READ_FILTER: &str = "/reader/tagReadData/enableReadFilter";

    /// Treat the same tag on different antennas as distinct when deduping.
    pub const UNIQUE_BY_ANTENNA: &str = "/reader/tagReadData/uniqueByAntenna";

    /// Keep the strongest-RSSI record when deduping.
    pub const RECORD_HIGHEST_RSSI: &str = "/reader/tagReadData/recordHighestRssi";
}
