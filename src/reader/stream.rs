//! Continuous-read streaming controller.
//!
//! One background worker owns the command channel for the whole session
//! (the foreground thread only touches the cancellation token and waits on
//! the completion signal). The worker receives batches, normalizes rows in
//! receive order, and delivers them to listeners; on stop it sends
//! `SET AUTO=OFF`, drains the in-flight data, and always attempts a
//! protocol reset before signalling completion.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{oneshot, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::error::{ReaderError, Result};
use crate::core::record::{ReadEvent, ReadEventSender, ReadHandler, TagReadRecord};
use crate::reader::channel::CommandChannel;
use crate::rql::compiler::CompiledQuery;
use crate::rql::row::{parse_row, RowLayout};
use crate::rql::query;

/// Batches expected after `SET AUTO=OFF`: one for the acknowledgment, one
/// for the final tag bundle. An empirical device behavior, not a protocol
/// guarantee, hence tunable here.
pub(crate) const DRAIN_EXPECTED_BATCHES: usize = 2;

/// Safety bound on drain receives for a reader that never quiesces.
pub(crate) const DRAIN_MAX_ATTEMPTS: usize = 10;

/// Runtime state of one continuous-read session.
pub(crate) struct StreamSession {
    /// Declared cursor names, in declaration order.
    pub cursors: Vec<String>,

    /// Max sub-timeout across cursors; the receive timeout for every batch.
    pub max_timeout_ms: u64,

    /// Timeout for the control statements issued by the worker.
    pub command_timeout_ms: u64,

    /// Row layout the cursors were compiled against.
    pub layout: RowLayout,
}

/// Foreground handle to a running session.
pub(crate) struct StreamHandle {
    cancel: CancellationToken,
    done: oneshot::Receiver<()>,
}

impl StreamHandle {
    /// Request a stop and block until the worker signals completion.
    ///
    /// Returns `false` only if the completion signal was dropped without
    /// firing (worker died abnormally).
    pub async fn stop(self) -> bool {
        self.cancel.cancel();
        self.done.await.is_ok()
    }
}

/// Issue the session-start statements and spawn the worker.
///
/// The owned channel guard passes to the worker, which holds it until the
/// session completes; no foreground command can interleave.
pub(crate) async fn start(
    channel: Arc<tokio::sync::Mutex<CommandChannel>>,
    compiled: Vec<CompiledQuery>,
    command_timeout_ms: u64,
    off_time_ms: u64,
    layout: RowLayout,
    events: ReadEventSender,
    handler: Option<Arc<dyn ReadHandler>>,
) -> Result<StreamHandle> {
    if compiled.is_empty() {
        return Err(ReaderError::Unsupported(
            "read plan compiled to no sub-queries".into(),
        ));
    }

    let mut guard = channel.lock_owned().await;

    // reset to a known state before declaring cursors
    guard.exchange(query::RESET, command_timeout_ms).await?;

    let mut cursors = Vec::with_capacity(compiled.len());
    for (i, cq) in compiled.iter().enumerate() {
        let name = format!("mxcursor{}", i + 1);
        guard
            .exchange(&query::declare_cursor(&name, &cq.query), command_timeout_ms)
            .await?;
        cursors.push(name);
    }

    guard
        .exchange(&query::set_repeat(off_time_ms), command_timeout_ms)
        .await?;
    guard.send(&query::set_auto(&cursors, true)).await?;

    let max_timeout_ms = compiled
        .iter()
        .map(|c| c.timeout_ms)
        .max()
        .unwrap_or(command_timeout_ms);
    let session = StreamSession {
        cursors,
        max_timeout_ms,
        command_timeout_ms,
        layout,
    };
    debug!(cursors = session.cursors.len(), max_timeout_ms, "continuous read started");

    Ok(spawn_worker(guard, session, events, handler))
}

fn spawn_worker(
    mut channel: OwnedMutexGuard<CommandChannel>,
    session: StreamSession,
    events: ReadEventSender,
    handler: Option<Arc<dyn ReadHandler>>,
) -> StreamHandle {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let (done_tx, done_rx) = oneshot::channel();

    tokio::spawn(async move {
        receive_loop(&mut channel, &session, &events, handler.as_deref(), &token).await;
        drain(&mut channel, &session, &events, handler.as_deref()).await;

        // finalizer: always attempt a protocol reset
        if let Err(e) = channel
            .exchange(query::RESET, session.command_timeout_ms)
            .await
        {
            warn!(error = %e, "protocol reset after streaming failed");
        }

        let _ = events.send(ReadEvent::Stopped);
        let _ = done_tx.send(());
        // channel guard drops here, releasing the channel to the foreground
    });

    StreamHandle {
        cancel,
        done: done_rx,
    }
}

/// Active state: receive and deliver until stop or failure.
///
/// Cancellation is cooperative: the flag is checked between batches, never
/// mid-receive. A communication or parse failure is delivered to the
/// exception listener and ends the session; rows already delivered stand.
async fn receive_loop(
    channel: &mut CommandChannel,
    session: &StreamSession,
    events: &ReadEventSender,
    handler: Option<&dyn ReadHandler>,
    cancel: &CancellationToken,
) {
    while !cancel.is_cancelled() {
        match channel.receive_batch(session.max_timeout_ms, true).await {
            Ok(rows) => {
                let base = Utc::now();
                for row in rows {
                    match parse_row(&row, session.layout, base) {
                        Ok(record) => deliver(events, handler, record).await,
                        Err(e) => {
                            deliver_error(events, handler, &e).await;
                            return;
                        }
                    }
                }
            }
            Err(e) => {
                deliver_error(events, handler, &e).await;
                return;
            }
        }
    }
}

/// Draining state: flush in-flight data after `SET AUTO=OFF`.
///
/// A receive timeout here is normal completion, not an error.
async fn drain(
    channel: &mut CommandChannel,
    session: &StreamSession,
    events: &ReadEventSender,
    handler: Option<&dyn ReadHandler>,
) {
    if let Err(e) = channel.send(&query::set_auto(&[], false)).await {
        warn!(error = %e, "failed to send AUTO=OFF");
        return;
    }

    let mut batches = 0;
    let mut attempts = 0;
    while batches < DRAIN_EXPECTED_BATCHES && attempts < DRAIN_MAX_ATTEMPTS {
        attempts += 1;
        match channel.receive_batch(session.max_timeout_ms, true).await {
            Ok(rows) => {
                batches += 1;
                let base = Utc::now();
                for row in rows {
                    match parse_row(&row, session.layout, base) {
                        Ok(record) => deliver(events, handler, record).await,
                        Err(e) => warn!(error = %e, "discarding unparseable row during drain"),
                    }
                }
            }
            Err(ReaderError::Timeout(_)) => break,
            Err(e) => {
                warn!(error = %e, "receive failed during drain");
                break;
            }
        }
    }
    debug!(batches, attempts, "drain complete");
}

async fn deliver(events: &ReadEventSender, handler: Option<&dyn ReadHandler>, record: TagReadRecord) {
    if let Some(h) = handler {
        h.on_tag_read(&record).await;
    }
    let _ = events.send(ReadEvent::TagRead(record));
}

async fn deliver_error(
    events: &ReadEventSender,
    handler: Option<&dyn ReadHandler>,
    error: &ReaderError,
) {
    let message = error.to_string();
    warn!(error = %message, "streaming session failed");
    if let Some(h) = handler {
        h.on_error(&message).await;
    }
    let _ = events.send(ReadEvent::Error(message));
}
