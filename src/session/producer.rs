//! Message producers.
//!
//! | Producer | Role | Queue full |
//! |----------|------|------------|
//! | [`heartbeat`] | [`NonBlockingProducer`] on a timer | drops the beat |
//! | [`interactive`] | [`BlockingProducer`] over a line stream | waits |
//!
//! Both wait for session readiness before their first enqueue and return
//! once the session closes.

// ============================================================================
// Imports
// ============================================================================

use std::io;
use std::time::Duration;

use futures_util::stream::{self, Stream, StreamExt};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};

use super::message::SessionMessage;
use super::queue::{BlockingProducer, NonBlockingProducer};
use super::ready::ReadyWaiter;

// ============================================================================
// Constants
// ============================================================================

/// Heartbeat payload prefix.
pub const HEARTBEAT_TEXT: &str = "Hello World!!";

/// Default heartbeat period.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

// ============================================================================
// ProducerStats
// ============================================================================

/// Counters reported by a finished producer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerStats {
    /// Messages enqueued.
    pub sent: usize,
    /// Messages dropped or rejected.
    pub dropped: usize,
    /// Whether this producer enqueued `Stop`.
    pub stopped: bool,
}

// ============================================================================
// Heartbeat
// ============================================================================

/// Formats one heartbeat payload.
#[inline]
#[must_use]
pub fn heartbeat_payload(elapsed: Duration) -> String {
    format!("{HEARTBEAT_TEXT} {}", elapsed.as_millis())
}

/// Enqueues a heartbeat every `period` until the session closes.
///
/// The first beat fires one period after readiness. A full queue drops
/// the beat, and so does a payload longer than the queue's item capacity.
pub async fn heartbeat(
    producer: NonBlockingProducer,
    ready: ReadyWaiter,
    period: Duration,
) -> ProducerStats {
    let mut stats = ProducerStats::default();

    if ready.wait().await.is_err() {
        debug!("Session closed before heartbeat started");
        return stats;
    }

    let started = Instant::now();
    let mut ticker = interval_at(started + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let payload = heartbeat_payload(started.elapsed());

        match producer.try_enqueue(SessionMessage::data(payload)) {
            Ok(()) => stats.sent += 1,
            Err(e) if e.is_recoverable() => {
                stats.dropped += 1;
                warn!(error = %e, "Heartbeat dropped");
            }
            Err(e @ Error::MessageTooLarge { .. }) => {
                stats.dropped += 1;
                warn!(error = %e, "Heartbeat exceeds item capacity");
            }
            Err(Error::SessionClosed) => break,
            Err(e) => {
                error!(error = %e, "Heartbeat stopped");
                break;
            }
        }
    }

    debug!(sent = stats.sent, dropped = stats.dropped, "Heartbeat finished");
    stats
}

// ============================================================================
// Interactive
// ============================================================================

/// Adapts a buffered reader into a stream of lines.
pub fn lines<R>(reader: R) -> impl Stream<Item = io::Result<String>> + Unpin
where
    R: AsyncBufRead + Unpin,
{
    Box::pin(stream::unfold(reader.lines(), |mut lines| async move {
        match lines.next_line().await {
            Ok(Some(line)) => Some((Ok(line), lines)),
            Ok(None) => None,
            Err(e) => Some((Err(e), lines)),
        }
    }))
}

/// Lines from standard input.
pub fn stdin_lines() -> impl Stream<Item = io::Result<String>> + Unpin {
    lines(BufReader::new(tokio::io::stdin()))
}

/// Forwards input lines to the session.
///
/// An empty line enqueues `Stop` and ends the producer. Lines longer than
/// the queue's item capacity are skipped. End of input ends the producer
/// without stopping the session.
///
/// # Errors
///
/// - [`Error::SessionClosed`] if the session closed first
/// - [`Error::Io`] if reading input failed
pub async fn interactive<I>(
    mut input: I,
    producer: BlockingProducer,
    ready: ReadyWaiter,
) -> Result<ProducerStats>
where
    I: Stream<Item = io::Result<String>> + Unpin,
{
    let mut stats = ProducerStats::default();
    ready.wait().await?;
    info!("Type a line to send it, or an empty line to stop");

    while let Some(line) = input.next().await {
        let line = line?;
        let line = line.trim_end_matches(['\r', '\n']);

        if line.is_empty() {
            producer.enqueue(SessionMessage::Stop).await?;
            stats.stopped = true;
            info!("Stop requested");
            break;
        }

        match producer.enqueue(SessionMessage::data(line)).await {
            Ok(()) => stats.sent += 1,
            Err(e @ Error::MessageTooLarge { .. }) => {
                stats.dropped += 1;
                warn!(error = %e, "Line skipped");
            }
            Err(e) => return Err(e),
        }
    }

    debug!(sent = stats.sent, stopped = stats.stopped, "Interactive input finished");
    Ok(stats)
}

// ============================================================================
// Tests
// ============================================================================
