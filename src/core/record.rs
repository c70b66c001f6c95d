//! Normalized tag-read records and read events.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::core::tag::TagIdentity;

/// One normalized tag read.
///
/// Records are created only by the row normalizer and are immutable after
/// construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagReadRecord {
    /// The tag that was read.
    pub tag: TagIdentity,

    /// Antenna the read came from.
    pub antenna: u16,

    /// How many times the tag was seen during the sub-query.
    pub read_count: u32,

    /// Receive signal strength, on models that report it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rssi: Option<i32>,

    /// Carrier frequency in kHz, when the row carries it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<u32>,

    /// RF phase, Gen2 embedded-operation rows only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<u32>,

    /// Time basis the read offset is relative to (batch receive time).
    pub base_time: DateTime<Utc>,

    /// Milliseconds after `base_time` the read occurred
    /// (device microseconds truncated to milliseconds).
    pub offset_ms: u64,

    /// Embedded memory-read payload bytes, when the plan carried one.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub data: Vec<u8>,
}

impl TagReadRecord {
    /// Absolute read time: base time plus the device-reported offset.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.base_time + ChronoDuration::milliseconds(self.offset_ms as i64)
    }
}

/// Events emitted during a continuous read.
#[derive(Debug, Clone)]
pub enum ReadEvent {
    /// A normalized tag read.
    TagRead(TagReadRecord),

    /// A communication or parse error raised by the streaming worker.
    /// The session ends after this event.
    Error(String),

    /// The streaming session ended (stop confirmed, channel drained).
    Stopped,
}

/// Receiver side of the read event stream.
pub type ReadEventReceiver = broadcast::Receiver<ReadEvent>;

/// Sender side of the read event stream.
pub type ReadEventSender = broadcast::Sender<ReadEvent>;

/// Callback-style read listener.
///
/// Alternative to `subscribe()` for callers that prefer a handler object
/// over a broadcast receiver. Uses `async_trait` for object safety.
#[async_trait]
pub trait ReadHandler: Send + Sync {
    /// Called for each tag read, in row-receive order.
    async fn on_tag_read(&self, record: &TagReadRecord);

    /// Called when the streaming worker raises an error; the session ends
    /// after this call.
    async fn on_error(&self, message: &str) {
        let _ = message;
    }
}
