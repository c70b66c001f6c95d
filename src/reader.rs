//! The reader client facade.
//!
//! `RqlReader` ties the pieces together: it owns the command channel,
//! compiles read plans, runs synchronous and continuous reads, and
//! translates tag-memory operations. Operating parameters come from an
//! injected `ParameterStore`; nothing is cached beyond one operation.

pub mod channel;
pub mod stream;

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::core::error::{ReaderError, Result};
use crate::core::filter::TagFilter;
use crate::core::op::LockKind;
use crate::core::plan::ReadPlan;
use crate::core::record::{ReadEventReceiver, ReadEventSender, ReadHandler, TagReadRecord};
use crate::core::tag::{TagIdentity, TagProtocol};
use crate::params::{keys, MemoryParams, ParameterStore};
use crate::rql::memop::{self, OpContext};
use crate::rql::row::{parse_row, RowLayout};
use crate::rql::{self, query, PARAMS_TABLE};
use crate::transport::{RqlTransport, TcpTransport, TransportListener};

pub use channel::CommandChannel;

/// Connection state of a reader client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Not connected to the reader.
    #[default]
    Disconnected,

    /// Connected and accepting synchronous commands.
    Connected,

    /// Connected with a continuous read in progress; the background
    /// worker owns the channel.
    StreamingAsync,
}

impl ConnectionState {
    /// Check if currently connected.
    #[inline]
    pub const fn is_connected(&self) -> bool {
        !matches!(self, Self::Disconnected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "Disconnected",
            Self::Connected => "Connected",
            Self::StreamingAsync => "StreamingAsync",
        };
        write!(f, "{}", s)
    }
}

/// Reader diagnostics snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaderDiagnostics {
    /// Model string reported at connect, if any.
    pub model: Option<String>,

    /// Connection state.
    pub connection_state: ConnectionState,

    /// Tag reads returned by synchronous reads.
    pub tags_read: u64,

    /// Failed commands.
    pub error_count: u64,
}

#[derive(Debug, Default)]
struct Counters {
    tags_read: u64,
    error_count: u64,
}

/// RQL reader client.
pub struct RqlReader {
    channel: Arc<Mutex<CommandChannel>>,
    params: Arc<dyn ParameterStore>,
    state: Arc<std::sync::RwLock<ConnectionState>>,
    counters: Arc<std::sync::RwLock<Counters>>,
    layout: RowLayout,
    model: Option<String>,
    events: ReadEventSender,
    handler: Option<Arc<dyn ReadHandler>>,
    stream: Option<stream::StreamHandle>,
}

impl RqlReader {
    /// Reader over the given transport with the default parameter registry.
    pub fn new(transport: Box<dyn RqlTransport>) -> Self {
        Self::with_params(transport, Arc::new(MemoryParams::with_defaults()))
    }

    /// Reader over the given transport and parameter registry.
    pub fn with_params(transport: Box<dyn RqlTransport>, params: Arc<dyn ParameterStore>) -> Self {
        let (events, _) = tokio::sync::broadcast::channel(1024);
        Self {
            channel: Arc::new(Mutex::new(CommandChannel::new(transport))),
            params,
            state: Arc::new(std::sync::RwLock::new(ConnectionState::Disconnected)),
            counters: Arc::new(std::sync::RwLock::new(Counters::default())),
            layout: RowLayout::BasicLqi,
            model: None,
            events,
            handler: None,
            stream: None,
        }
    }

    /// Reader over TCP to `host:port`.
    pub fn tcp(address: impl Into<String>) -> Self {
        Self::new(Box::new(TcpTransport::new(address)))
    }

    /// The parameter registry this reader operates through.
    pub fn params(&self) -> &Arc<dyn ParameterStore> {
        &self.params
    }

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.get_state()
    }

    /// Model string reported by the reader at connect.
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Diagnostics snapshot.
    pub fn diagnostics(&self) -> ReaderDiagnostics {
        let counters = self.counters.read().map(|c| (c.tags_read, c.error_count));
        let (tags_read, error_count) = counters.unwrap_or((0, 0));
        ReaderDiagnostics {
            model: self.model.clone(),
            connection_state: self.get_state(),
            tags_read,
            error_count,
        }
    }

    /// Subscribe to read events (tag reads, errors, session end).
    pub fn subscribe(&self) -> ReadEventReceiver {
        self.events.subscribe()
    }

    /// Set the callback-style read handler used by continuous reads.
    pub fn set_read_handler(&mut self, handler: Arc<dyn ReadHandler>) {
        self.handler = Some(handler);
    }

    /// Register an observer of the raw bytes crossing the transport.
    pub async fn add_transport_listener(&self, listener: Arc<dyn TransportListener>) {
        self.channel.lock().await.add_listener(listener);
    }

    /// Open the transport, reset the protocol, and negotiate the row
    /// layout from the reader model.
    pub async fn connect(&mut self) -> Result<()> {
        if self.get_state().is_connected() {
            return Ok(());
        }
        let transport_timeout = self.get_param_u64(keys::TRANSPORT_TIMEOUT).await?;
        let command_timeout = self.get_param_u64(keys::COMMAND_TIMEOUT).await?;

        let mut channel = self.channel.lock().await;
        channel.set_transport_timeout(std::time::Duration::from_millis(transport_timeout));
        channel.open().await?;
        channel.exchange(query::RESET, command_timeout).await?;

        let rows = channel
            .exchange(&query::select(&["model"], PARAMS_TABLE, &[], None), command_timeout)
            .await?;
        drop(channel);

        let model = rows.into_iter().next().unwrap_or_default();
        // older Mercury4 firmware rows lack the trailing lqi column
        self.layout = if model.contains("M4") {
            RowLayout::Basic
        } else {
            RowLayout::BasicLqi
        };
        info!(model = %model, layout = ?self.layout, "connected");
        self.model = Some(model);
        self.set_state(ConnectionState::Connected);
        Ok(())
    }

    /// Stop any continuous read and close the transport.
    pub async fn disconnect(&mut self) -> Result<()> {
        let _ = self.stop_reading().await;
        let mut channel = self.channel.lock().await;
        let result = channel.close().await;
        drop(channel);
        self.set_state(ConnectionState::Disconnected);
        result
    }

    /// Run a one-shot read of the plan for `timeout_ms` and return the
    /// collected records, deduplicated per the registry flags.
    pub async fn read(&mut self, plan: &ReadPlan, timeout_ms: u64) -> Result<Vec<TagReadRecord>> {
        self.ensure_idle_connected()?;
        let compiled = rql::compile(plan, timeout_ms, self.layout)?;

        let mut records: Vec<TagReadRecord> = Vec::new();
        'queries: for cq in &compiled {
            let rows = self.exchange(&cq.query, cq.timeout_ms).await?;
            let base = Utc::now();
            for row in rows {
                let record = parse_row(&row, cq.layout, base).map_err(|e| {
                    self.note_failure(&e);
                    e
                })?;
                records.push(record);
                if let Some(n) = cq.stop_count {
                    if records.len() >= n as usize {
                        break 'queries;
                    }
                }
            }
        }

        if self.get_param_bool(keys::READ_FILTER).await? {
            let unique_by_antenna = self.get_param_bool(keys::UNIQUE_BY_ANTENNA).await?;
            let highest_rssi = self.get_param_bool(keys::RECORD_HIGHEST_RSSI).await?;
            records = dedup(records, unique_by_antenna, highest_rssi);
        }

        if let Ok(mut counters) = self.counters.write() {
            counters.tags_read += records.len() as u64;
        }
        debug!(count = records.len(), "read complete");
        Ok(records)
    }

    /// Start a continuous read of the plan.
    ///
    /// Only one streaming session may be active; starting while one runs
    /// is a contract violation.
    pub async fn start_reading(&mut self, plan: &ReadPlan) -> Result<()> {
        match self.get_state() {
            ConnectionState::Disconnected => return Err(ReaderError::NotConnected),
            ConnectionState::StreamingAsync => {
                return Err(ReaderError::IllegalArgument(
                    "a continuous read is already active".into(),
                ))
            }
            ConnectionState::Connected => {}
        }

        let command_timeout = self.get_param_u64(keys::COMMAND_TIMEOUT).await?;
        let on_time = self.get_param_u64(keys::ASYNC_ON_TIME).await?;
        let off_time = self.get_param_u64(keys::ASYNC_OFF_TIME).await?;

        let compiled = rql::compile(plan, on_time, self.layout)?;
        let layout = compiled.first().map(|c| c.layout).unwrap_or(self.layout);

        let handle = stream::start(
            self.channel.clone(),
            compiled,
            command_timeout,
            on_time + off_time,
            layout,
            self.events.clone(),
            self.handler.clone(),
        )
        .await?;
        self.stream = Some(handle);
        self.set_state(ConnectionState::StreamingAsync);
        Ok(())
    }

    /// Request a stop and block until the session has drained and reset.
    ///
    /// A no-op returning `true` when no continuous read is active;
    /// `false` only if the worker died without signalling completion.
    pub async fn stop_reading(&mut self) -> bool {
        match self.stream.take() {
            None => true,
            Some(handle) => {
                let ok = handle.stop().await;
                self.set_state(ConnectionState::Connected);
                ok
            }
        }
    }

    /// Read words from tag memory.
    pub async fn read_tag_mem_words(
        &mut self,
        bank: u32,
        word_address: u32,
        word_count: u32,
        filter: Option<&TagFilter>,
    ) -> Result<Vec<u8>> {
        self.ensure_idle_connected()?;
        let (protocol, antenna, password, timeout_ms) = self.op_params().await?;
        let ctx = OpContext {
            protocol,
            antenna,
            filter,
            access_password: password,
            timeout_ms,
        };
        let q = memop::read_memory_query(ctx, bank, word_address, word_count)?;
        let rows = self.exchange(&q, timeout_ms).await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| ReaderError::comm("no tag matched the memory read"))?;
        let record = parse_row(&row, RowLayout::EmbeddedOp, Utc::now())?;
        Ok(record.data)
    }

    /// Read bytes from tag memory.
    ///
    /// Under Gen2 the byte range converts to word granularity, and a read
    /// at an odd address discards one leading byte of the decoded data;
    /// ISO 18000-6B addresses are used as-is.
    pub async fn read_tag_mem_bytes(
        &mut self,
        bank: u32,
        byte_address: u32,
        byte_count: u32,
        filter: Option<&TagFilter>,
    ) -> Result<Vec<u8>> {
        let (protocol, ..) = self.op_params_peek().await?;
        let (word_address, word_count, offset) = if protocol == TagProtocol::Gen2 {
            let (wa, wc) = memop::gen2_words_for_bytes(byte_address, byte_count);
            (wa, wc, memop::gen2_decode_offset(byte_address))
        } else {
            (byte_address, byte_count, 0)
        };
        let data = self
            .read_tag_mem_words(bank, word_address, word_count, filter)
            .await?;
        let end = offset + byte_count as usize;
        if data.len() < end {
            return Err(ReaderError::comm(format!(
                "short memory read: got {} bytes, wanted {}",
                data.len(),
                end
            )));
        }
        Ok(data[offset..end].to_vec())
    }

    /// Write words to tag memory.
    pub async fn write_tag_mem_words(
        &mut self,
        bank: u32,
        word_address: u32,
        data: &[u8],
        filter: Option<&TagFilter>,
    ) -> Result<()> {
        self.ensure_idle_connected()?;
        let (protocol, antenna, password, timeout_ms) = self.op_params().await?;
        let ctx = OpContext {
            protocol,
            antenna,
            filter,
            access_password: password,
            timeout_ms,
        };
        let q = memop::write_memory_query(ctx, bank, word_address, data)?;
        self.exchange(&q, timeout_ms).await?;
        Ok(())
    }

    /// Write bytes to tag memory. The address and data length must be
    /// even (whole words).
    pub async fn write_tag_mem_bytes(
        &mut self,
        bank: u32,
        byte_address: u32,
        data: &[u8],
        filter: Option<&TagFilter>,
    ) -> Result<()> {
        memop::validate_byte_write(byte_address, data.len())?;
        let (protocol, ..) = self.op_params_peek().await?;
        let word_address = if protocol == TagProtocol::Gen2 {
            byte_address / 2
        } else {
            byte_address
        };
        self.write_tag_mem_words(bank, word_address, data, filter).await
    }

    /// Apply a lock action.
    pub async fn lock_tag(&mut self, kind: LockKind, filter: Option<&TagFilter>) -> Result<()> {
        self.ensure_idle_connected()?;
        let (protocol, antenna, password, timeout_ms) = self.op_params().await?;
        let ctx = OpContext {
            protocol,
            antenna,
            filter,
            access_password: password,
            timeout_ms,
        };
        for q in memop::lock_queries(ctx, kind)? {
            self.exchange(&q, timeout_ms).await?;
        }
        Ok(())
    }

    /// Kill a tag with the given kill password.
    pub async fn kill_tag(&mut self, password: u32, filter: Option<&TagFilter>) -> Result<()> {
        self.ensure_idle_connected()?;
        let (protocol, antenna, _, timeout_ms) = self.op_params().await?;
        let ctx = OpContext {
            protocol,
            antenna,
            filter,
            access_password: 0,
            timeout_ms,
        };
        let q = memop::kill_query(ctx, password)?;
        self.exchange(&q, timeout_ms).await?;
        Ok(())
    }

    /// Rewrite a tag's identity (EPC).
    pub async fn write_tag_id(
        &mut self,
        new_id: &TagIdentity,
        filter: Option<&TagFilter>,
    ) -> Result<()> {
        self.ensure_idle_connected()?;
        let (protocol, antenna, password, timeout_ms) = self.op_params().await?;
        let ctx = OpContext {
            protocol,
            antenna,
            filter,
            access_password: password,
            timeout_ms,
        };
        let q = memop::write_id_query(ctx, new_id)?;
        self.exchange(&q, timeout_ms).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // internals

    fn get_state(&self) -> ConnectionState {
        self.state
            .read()
            .map(|s| *s)
            .unwrap_or(ConnectionState::Disconnected)
    }

    fn set_state(&self, state: ConnectionState) {
        if let Ok(mut s) = self.state.write() {
            *s = state;
        }
    }

    fn ensure_idle_connected(&self) -> Result<()> {
        match self.get_state() {
            ConnectionState::Connected => Ok(()),
            ConnectionState::Disconnected => Err(ReaderError::NotConnected),
            ConnectionState::StreamingAsync => Err(ReaderError::IllegalArgument(
                "synchronous commands are unavailable while a continuous read is active".into(),
            )),
        }
    }

    /// One serialized command exchange. A communication failure leaves the
    /// connection unusable until reopened.
    async fn exchange(&self, q: &str, timeout_ms: u64) -> Result<Vec<String>> {
        let mut channel = self.channel.lock().await;
        match channel.exchange(q, timeout_ms).await {
            Ok(rows) => Ok(rows),
            Err(e) => {
                drop(channel);
                self.note_failure(&e);
                Err(e)
            }
        }
    }

    fn note_failure(&self, error: &ReaderError) {
        if let Ok(mut counters) = self.counters.write() {
            counters.error_count += 1;
        }
        if error.is_communication() {
            self.set_state(ConnectionState::Disconnected);
        }
    }

    async fn get_param_u64(&self, key: &str) -> Result<u64> {
        self.params.get(key).await?.as_u64().ok_or_else(|| {
            ReaderError::Config(format!("parameter {} is not an unsigned integer", key))
        })
    }

    async fn get_param_bool(&self, key: &str) -> Result<bool> {
        self.params
            .get(key)
            .await?
            .as_bool()
            .ok_or_else(|| ReaderError::Config(format!("parameter {} is not a boolean", key)))
    }

    /// Operating parameters shared by every standalone tag operation.
    async fn op_params(&self) -> Result<(TagProtocol, u16, u32, u64)> {
        let (protocol, antenna) = self.op_params_peek().await?;
        let password = self
            .params
            .get(keys::ACCESS_PASSWORD)
            .await?
            .as_u32()
            .unwrap_or(0);
        let timeout_ms = self.get_param_u64(keys::COMMAND_TIMEOUT).await?;
        Ok((protocol, antenna, password, timeout_ms))
    }

    async fn op_params_peek(&self) -> Result<(TagProtocol, u16)> {
        let token = self.params.get(keys::TAGOP_PROTOCOL).await?;
        let protocol = token
            .as_str()
            .and_then(TagProtocol::from_rql_token)
            .ok_or_else(|| {
                ReaderError::Config("tagop protocol parameter is not a protocol token".into())
            })?;
        let antenna = self
            .params
            .get(keys::TAGOP_ANTENNA)
            .await?
            .as_u32()
            .and_then(|a| u16::try_from(a).ok())
            .ok_or_else(|| {
                ReaderError::Config("tagop antenna parameter is not an antenna id".into())
            })?;
        Ok((protocol, antenna))
    }
}

/// Merge duplicate reads of the same tag, preserving first-seen order.
fn dedup(
    records: Vec<TagReadRecord>,
    unique_by_antenna: bool,
    record_highest_rssi: bool,
) -> Vec<TagReadRecord> {
    use std::collections::HashMap;

    let mut out: Vec<TagReadRecord> = Vec::with_capacity(records.len());
    let mut index: HashMap<(TagIdentity, Option<u16>), usize> = HashMap::new();
    for record in records {
        let key = (record.tag.clone(), unique_by_antenna.then_some(record.antenna));
        match index.get(&key) {
            Some(&i) => {
                let merged = out[i].read_count + record.read_count;
                if record_highest_rssi
                    && record.rssi.unwrap_or(i32::MIN) > out[i].rssi.unwrap_or(i32::MIN)
                {
                    out[i] = record;
                }
                out[i].read_count = merged;
            }
            None => {
                index.insert(key, out.len());
                out.push(record);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::plan::SimpleReadPlan;
    use crate::core::record::ReadEvent;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    /// A scripted fake device: serves canned response lines, records every
    /// statement sent, and (optionally) emits endless empty batches once
    /// the script runs out, the way a streaming reader idles.
    struct FakeDevice {
        script: StdMutex<VecDeque<String>>,
        sent: Arc<StdMutex<Vec<String>>>,
        idle_blanks: bool,
    }

    impl FakeDevice {
        fn new(lines: &[&str], idle_blanks: bool) -> Self {
            Self {
                script: StdMutex::new(lines.iter().map(|l| l.to_string()).collect()),
                sent: Arc::new(StdMutex::new(Vec::new())),
                idle_blanks,
            }
        }
    }

    #[async_trait]
    impl RqlTransport for FakeDevice {
        async fn open(&mut self) -> Result<()> {
            Ok(())
        }
        async fn send(&mut self, bytes: &[u8]) -> Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push(String::from_utf8_lossy(bytes).into_owned());
            Ok(())
        }
        async fn receive_line(&mut self) -> Result<Option<String>> {
            let line = self.script.lock().unwrap().pop_front();
            match line {
                Some(line) => Ok(Some(line)),
                None if self.idle_blanks => {
                    // let other tasks run, as a real socket read would
                    tokio::task::yield_now().await;
                    Ok(Some(String::new()))
                }
                None => Err(ReaderError::Timeout(100)),
            }
        }
        fn set_timeout(&mut self, _timeout: Duration) {}
        fn timeout(&self) -> Duration {
            Duration::from_secs(1)
        }
        async fn flush(&mut self) -> Result<()> {
            Ok(())
        }
        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    /// Connect handshake: RESET ack, then the model row.
    fn connect_script(model: &str) -> Vec<String> {
        vec!["".into(), model.into(), "".into()]
    }

    async fn connected_reader(extra_lines: &[&str], idle_blanks: bool) -> (RqlReader, Arc<StdMutex<Vec<String>>>) {
        let mut lines = connect_script("M5 eu");
        lines.extend(extra_lines.iter().map(|l| l.to_string()));
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let device = FakeDevice::new(&refs, idle_blanks);
        let sent = device.sent.clone();
        let mut reader = RqlReader::new(Box::new(device));
        reader.connect().await.unwrap();
        (reader, sent)
    }

    #[tokio::test]
    async fn test_connect_negotiates_lqi_layout() {
        let (reader, sent) = connected_reader(&[], false).await;
        assert_eq!(reader.connection_state(), ConnectionState::Connected);
        assert_eq!(reader.model(), Some("M5 eu"));
        assert_eq!(reader.layout, RowLayout::BasicLqi);
        let sent = sent.lock().unwrap();
        assert_eq!(sent[0], "RESET;\n");
        assert_eq!(sent[1], "SELECT model FROM params;\n");
    }

    #[tokio::test]
    async fn test_connect_m4_lacks_lqi() {
        let lines = connect_script("M4");
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let device = FakeDevice::new(&refs, false);
        let mut reader = RqlReader::new(Box::new(device));
        reader.connect().await.unwrap();
        assert_eq!(reader.layout, RowLayout::Basic);
    }

    #[tokio::test]
    async fn test_read_requires_connection() {
        let device = FakeDevice::new(&[], false);
        let mut reader = RqlReader::new(Box::new(device));
        let plan = ReadPlan::Simple(SimpleReadPlan::new(vec![1], TagProtocol::Gen2));
        assert!(matches!(
            reader.read(&plan, 100).await,
            Err(ReaderError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_sync_read_collects_and_dedups() {
        let (mut reader, _) = connected_reader(
            &[
                "1|3|0xE200001122334455AABB|915000|500|GEN2|-60",
                "2|2|0xE200001122334455AABB|915000|700|GEN2|-55",
                "1|1|0xDEADBEEF11223344AABB|916000|900|GEN2|-70",
                "",
            ],
            false,
        )
        .await;

        let plan = ReadPlan::Simple(SimpleReadPlan::new(vec![1, 2], TagProtocol::Gen2));
        let records = reader.read(&plan, 1000).await.unwrap();

        // two distinct tags; duplicate merged with summed read count
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].read_count, 5);
        assert_eq!(records[1].tag.epc()[0], 0xDE);
        assert_eq!(reader.diagnostics().tags_read, 2);
    }

    #[tokio::test]
    async fn test_sync_read_unique_by_antenna() {
        let (mut reader, _) = connected_reader(
            &[
                "1|3|0xE200001122334455AABB|915000|500|GEN2|-60",
                "2|2|0xE200001122334455AABB|915000|700|GEN2|-55",
                "",
            ],
            false,
        )
        .await;
        reader
            .params()
            .set(keys::UNIQUE_BY_ANTENNA, true.into())
            .await
            .unwrap();

        let plan = ReadPlan::Simple(SimpleReadPlan::new(vec![1, 2], TagProtocol::Gen2));
        let records = reader.read(&plan, 1000).await.unwrap();
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn test_device_error_line_propagates_and_disconnects() {
        let (mut reader, _) = connected_reader(
            &["Error 0x2a4: Invalid antenna", "details", ""],
            false,
        )
        .await;

        let plan = ReadPlan::Simple(SimpleReadPlan::new(vec![99], TagProtocol::Gen2));
        let err = reader.read(&plan, 1000).await.unwrap_err();
        assert!(matches!(err, ReaderError::Communication { .. }));
        assert_eq!(reader.connection_state(), ConnectionState::Disconnected);
        assert_eq!(reader.diagnostics().error_count, 1);
    }

    #[tokio::test]
    async fn test_read_tag_mem_bytes_odd_address() {
        // words for (addr 5, count 4) = (2, 3); device returns 6 bytes and
        // the leading byte is discarded on decode
        let (mut reader, sent) = connected_reader(
            &["1|1|0xE200001122334455AABB|0|0x0A1122334455|GEN2|0", ""],
            false,
        )
        .await;

        let data = reader.read_tag_mem_bytes(3, 5, 4, None).await.unwrap();
        assert_eq!(data, vec![0x11, 0x22, 0x33, 0x44]);

        let sent = sent.lock().unwrap();
        let q = sent.last().unwrap();
        assert!(q.contains("block_number=2"), "{}", q);
        assert!(q.contains("block_count=3"), "{}", q);
        assert!(q.contains("mem_bank=3"), "{}", q);
    }

    #[tokio::test]
    async fn test_write_tag_mem_bytes_validates_evenness() {
        let (mut reader, _) = connected_reader(&[], false).await;
        assert!(matches!(
            reader.write_tag_mem_bytes(1, 3, &[0, 1], None).await,
            Err(ReaderError::IllegalArgument(_))
        ));
        assert!(matches!(
            reader.write_tag_mem_bytes(1, 2, &[0, 1, 2], None).await,
            Err(ReaderError::IllegalArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_kill_uses_password_param_free_clause() {
        let (mut reader, sent) = connected_reader(&[""], false).await;
        reader.kill_tag(0xCAFE, None).await.unwrap();
        let sent = sent.lock().unwrap();
        let q = sent.last().unwrap();
        assert!(q.starts_with("UPDATE tag_id SET killed=1"), "{}", q);
        assert!(q.contains("password=0x0000CAFE"), "{}", q);
    }

    #[tokio::test]
    async fn test_streaming_lifecycle() {
        // one batch of two rows, then the device idles with empty batches
        let (mut reader, sent) = connected_reader(
            &[
                // start_reading: RESET ack, DECLARE ack, SET repeat ack
                "",
                "",
                "",
                // first streamed batch
                "1|3|0xE200001122334455AABB|915000|500|GEN2|-60",
                "2|1|0xDEADBEEF11223344AABB|916000|700|GEN2|-61",
                "",
            ],
            true,
        )
        .await;

        let mut events = reader.subscribe();
        let plan = ReadPlan::Simple(SimpleReadPlan::new(vec![1], TagProtocol::Gen2));
        reader.start_reading(&plan).await.unwrap();
        assert_eq!(reader.connection_state(), ConnectionState::StreamingAsync);

        // starting again while active is a contract violation
        assert!(matches!(
            reader.start_reading(&plan).await,
            Err(ReaderError::IllegalArgument(_))
        ));

        let mut tags = Vec::new();
        while tags.len() < 2 {
            match events.recv().await.unwrap() {
                ReadEvent::TagRead(record) => tags.push(record),
                ReadEvent::Error(e) => panic!("unexpected stream error: {}", e),
                ReadEvent::Stopped => panic!("stopped before records arrived"),
            }
        }
        assert_eq!(tags[0].antenna, 1);
        assert_eq!(tags[1].antenna, 2);

        assert!(reader.stop_reading().await);
        assert_eq!(reader.connection_state(), ConnectionState::Connected);

        // no record is delivered after the completion signal: everything
        // still queued ends with Stopped
        let mut saw_stopped = false;
        loop {
            match events.try_recv() {
                Ok(ReadEvent::Stopped) => {
                    saw_stopped = true;
                    break;
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
        assert!(saw_stopped);

        let sent = sent.lock().unwrap();
        assert!(sent.iter().any(|s| s == "SET AUTO mxcursor1=ON;\n"));
        assert!(sent.iter().any(|s| s == "SET AUTO=OFF;\n"));
        // the protocol reset finalizer always runs last
        assert_eq!(sent.last().unwrap(), "RESET;\n");
        let declare = sent.iter().find(|s| s.starts_with("DECLARE")).unwrap();
        assert!(declare.starts_with("DECLARE mxcursor1 CURSOR FOR SELECT"));
    }

    #[tokio::test]
    async fn test_stop_reading_when_idle_is_noop() {
        let (mut reader, _) = connected_reader(&[], false).await;
        assert!(reader.stop_reading().await);
        assert_eq!(reader.connection_state(), ConnectionState::Connected);
    }

    #[test]
    fn test_dedup_highest_rssi() {
        let tag = TagIdentity::new(TagProtocol::Gen2, vec![0xE2]).unwrap();
        let mk = |rssi: i32, count: u32| TagReadRecord {
            tag: tag.clone(),
            antenna: 1,
            read_count: count,
            rssi: Some(rssi),
            frequency: None,
            phase: None,
            base_time: Utc::now(),
            offset_ms: 0,
            data: Vec::new(),
        };
        let merged = dedup(vec![mk(-70, 2), mk(-55, 3)], false, true);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].rssi, Some(-55));
        assert_eq!(merged[0].read_count, 5);
    }
}
