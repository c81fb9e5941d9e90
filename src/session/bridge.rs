//! Queue-to-socket session bridge.
//!
//! A [`SessionBridge`] owns the session queue's receiver and a readiness
//! signal. [`SessionBridge::connect`] opens the transport and fires
//! readiness; [`ActiveBridge::run`] then consumes the queue in strict
//! request/response order:
//!
//! ```text
//! AwaitingConnect ──open ok──▶ Active ──Stop──▶ Draining ──▶ Closed
//!        │                       │
//!        └──open failed──────────┴──transport error──────────▶ Closed
//! ```
//!
//! Each `Data` payload is written in one transport write, then one
//! response is read and handed to the [`ResponseObserver`]. The first
//! transport error ends the session. On every exit path the transport is
//! closed exactly once and queued messages are discarded.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::identifiers::SessionId;

use super::message::SessionMessage;
use super::queue::QueueReceiver;
use super::ready::ReadySignal;
use super::transport::{ConnectionHandle, DEFAULT_READ_BUFFER, Transport};

// ============================================================================
// Types
// ============================================================================

/// Callback receiving each peer response.
pub type ResponseObserver = Box<dyn Fn(&[u8]) + Send + Sync>;

/// Bridge lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BridgeState {
    /// Transport not yet open.
    #[default]
    AwaitingConnect,
    /// Consuming the queue.
    Active,
    /// Stop received; releasing resources.
    Draining,
    /// Transport released.
    Closed,
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AwaitingConnect => "awaiting-connect",
            Self::Active => "active",
            Self::Draining => "draining",
            Self::Closed => "closed",
        })
    }
}

/// Why a session ended.
#[derive(Debug)]
pub enum CloseReason {
    /// A `Stop` message was dequeued.
    Stop,
    /// Every producer handle was dropped.
    ProducersGone,
    /// A transport error ended the session.
    Failed(Error),
}

impl CloseReason {
    /// Returns `true` if the session ended without a transport error.
    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }
}

/// Summary of a finished session.
#[derive(Debug)]
pub struct SessionOutcome {
    /// Session identifier.
    pub session_id: SessionId,
    /// Peer address.
    pub peer: SocketAddr,
    /// Why the session ended.
    pub reason: CloseReason,
    /// Payloads fully written.
    pub written: usize,
    /// Responses handed to the observer.
    pub responses: usize,
    /// Messages still queued at close.
    pub discarded: usize,
}

// ============================================================================
// SessionBridge
// ============================================================================

/// Bridge waiting for its transport.
pub struct SessionBridge {
    id: SessionId,
    queue: QueueReceiver,
    ready: ReadySignal,
    observer: ResponseObserver,
    read_buffer: usize,
    read_timeout: Option<Duration>,
    state: watch::Sender<BridgeState>,
}

impl SessionBridge {
    /// Creates a bridge.
    ///
    /// # Arguments
    ///
    /// * `queue` - Receiver of the session queue
    /// * `ready` - Signal fired once the transport is open
    /// * `observer` - Called with every response
    #[must_use]
    pub fn new(queue: QueueReceiver, ready: ReadySignal, observer: ResponseObserver) -> Self {
        let (state, _) = watch::channel(BridgeState::AwaitingConnect);
        Self {
            id: SessionId::generate(),
            queue,
            ready,
            observer,
            read_buffer: DEFAULT_READ_BUFFER,
            read_timeout: None,
            state,
        }
    }

    /// Sets the response buffer size.
    #[inline]
    #[must_use]
    pub fn with_read_buffer(mut self, read_buffer: usize) -> Self {
        self.read_buffer = read_buffer;
        self
    }

    /// Bounds each response read.
    #[inline]
    #[must_use]
    pub fn with_read_timeout(mut self, read_timeout: Option<Duration>) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Returns the session identifier.
    #[inline]
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Subscribes to state changes.
    #[inline]
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<BridgeState> {
        self.state.subscribe()
    }

    /// Opens the transport and fires readiness.
    ///
    /// On failure the queue is closed and readiness is dropped unfired,
    /// so producers observe [`Error::SessionClosed`].
    ///
    /// # Errors
    ///
    /// Returns the transport's open error.
    pub async fn connect<T>(self, transport: &T, addr: SocketAddr) -> Result<ActiveBridge<T::Stream>>
    where
        T: Transport + ?Sized,
    {
        let Self {
            id,
            mut queue,
            ready,
            observer,
            read_buffer,
            read_timeout,
            state,
        } = self;

        let stream = match transport.open(addr).await {
            Ok(stream) => stream,
            Err(e) => {
                error!(session = %id, %addr, error = %e, "Unable to connect");
                queue.close();
                state.send_replace(BridgeState::Closed);
                return Err(e);
            }
        };

        let handle = ConnectionHandle::new(stream, addr, read_buffer).with_read_timeout(read_timeout);
        state.send_replace(BridgeState::Active);
        ready.fire();
        info!(session = %id, %addr, "Successfully connected");

        Ok(ActiveBridge {
            id,
            handle,
            queue,
            observer,
            state,
        })
    }
}

impl fmt::Debug for SessionBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionBridge")
            .field("id", &self.id)
            .field("read_buffer", &self.read_buffer)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ActiveBridge
// ============================================================================

/// Bridge with an open transport.
pub struct ActiveBridge<S> {
    id: SessionId,
    handle: ConnectionHandle<S>,
    queue: QueueReceiver,
    observer: ResponseObserver,
    state: watch::Sender<BridgeState>,
}

impl<S> ActiveBridge<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Returns the session identifier.
    #[inline]
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Returns the peer address.
    #[inline]
    #[must_use]
    pub fn peer(&self) -> SocketAddr {
        self.handle.peer()
    }

    /// Subscribes to state changes.
    #[inline]
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<BridgeState> {
        self.state.subscribe()
    }

    /// Consumes the queue until `Stop`, a transport error, or every
    /// producer is gone.
    pub async fn run(self) -> SessionOutcome {
        let Self {
            id,
            mut handle,
            mut queue,
            observer,
            state,
        } = self;
        let peer = handle.peer();

        let mut written = 0;
        let mut responses = 0;

        let reason = loop {
            let Some(message) = queue.dequeue().await else {
                debug!(session = %id, "All producers gone");
                state.send_replace(BridgeState::Draining);
                break CloseReason::ProducersGone;
            };

            let payload = match message {
                SessionMessage::Stop => {
                    debug!(session = %id, "Stop received");
                    state.send_replace(BridgeState::Draining);
                    break CloseReason::Stop;
                }
                SessionMessage::Data(payload) => payload,
            };

            if let Err(e) = handle.write_message(&payload).await {
                break CloseReason::Failed(e);
            }
            written += 1;

            match handle.read_response().await {
                Ok(response) => {
                    observer(response);
                    responses += 1;
                }
                Err(e) => break CloseReason::Failed(e),
            }
        };

        let discarded = queue.close();
        handle.close().await;
        state.send_replace(BridgeState::Closed);

        match &reason {
            CloseReason::Failed(e) => {
                warn!(session = %id, %peer, error = %e, written, responses, "Session failed");
            }
            _ => info!(session = %id, %peer, written, responses, discarded, "Session closed"),
        }

        SessionOutcome {
            session_id: id,
            peer,
            reason,
            written,
            responses,
            discarded,
        }
    }
}

impl<S> fmt::Debug for ActiveBridge<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveBridge")
            .field("id", &self.id)
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::{Context, Poll};

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, ReadBuf};

    use crate::session::queue::MessageQueue;
    use crate::session::ready::readiness;

    /// Duplex stream that counts shutdowns.
    struct CountingStream {
        inner: DuplexStream,
        shutdowns: Arc<AtomicUsize>,
    }

    impl AsyncRead for CountingStream {
        fn poll_read(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Pin::new(&mut self.inner).poll_read(cx, buf)
        }
    }

    impl AsyncWrite for CountingStream {
        fn poll_write(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Pin::new(&mut self.inner).poll_write(cx, buf)
        }

        fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Pin::new(&mut self.inner).poll_flush(cx)
        }

        fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            Pin::new(&mut self.inner).poll_shutdown(cx)
        }
    }

    /// Transport handing out one prepared stream.
    struct DuplexTransport {
        stream: Mutex<Option<CountingStream>>,
    }

    #[async_trait]
    impl Transport for DuplexTransport {
        type Stream = CountingStream;

        async fn open(&self, addr: SocketAddr) -> Result<CountingStream> {
            self.stream
                .lock()
                .take()
                .ok_or_else(|| Error::transport_open(addr, "refused"))
        }
    }

    /// Transport that always refuses.
    struct RefusingTransport;

    #[async_trait]
    impl Transport for RefusingTransport {
        type Stream = DuplexStream;

        async fn open(&self, addr: SocketAddr) -> Result<DuplexStream> {
            Err(Error::transport_open(addr, "connection refused"))
        }
    }

    struct Harness {
        transport: DuplexTransport,
        server: DuplexStream,
        shutdowns: Arc<AtomicUsize>,
    }

    fn harness() -> Harness {
        let (client, server) = tokio::io::duplex(1024);
        let shutdowns = Arc::new(AtomicUsize::new(0));
        let stream = CountingStream {
            inner: client,
            shutdowns: Arc::clone(&shutdowns),
        };
        Harness {
            transport: DuplexTransport {
                stream: Mutex::new(Some(stream)),
            },
            server,
            shutdowns,
        }
    }

    /// Replies `ack:<request>` until the client closes.
    async fn ack_peer(mut server: DuplexStream) -> Vec<Vec<u8>> {
        let mut seen = Vec::new();
        let mut buf = [0u8; 256];
        loop {
            let n = server.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            seen.push(buf[..n].to_vec());
            let mut reply = b"ack:".to_vec();
            reply.extend_from_slice(&buf[..n]);
            server.write_all(&reply).await.unwrap();
        }
        seen
    }

    fn recording_observer() -> (ResponseObserver, Arc<Mutex<Vec<Vec<u8>>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let observer: ResponseObserver = Box::new(move |response: &[u8]| {
            sink.lock().push(response.to_vec());
        });
        (observer, seen)
    }

    fn addr() -> SocketAddr {
        "192.168.4.2:3333".parse().unwrap()
    }

    #[tokio::test]
    async fn test_ping_pong_stop() {
        let h = harness();
        let (queue, rx) = MessageQueue::with_defaults().unwrap();
        let (signal, waiter) = readiness();
        let (observer, responses) = recording_observer();
        let peer = tokio::spawn(ack_peer(h.server));

        let bridge = SessionBridge::new(rx, signal, observer)
            .connect(&h.transport, addr())
            .await
            .unwrap();
        waiter.wait().await.unwrap();

        let producer = queue.blocking_producer();
        producer.enqueue(SessionMessage::data("ping")).await.unwrap();
        producer.enqueue(SessionMessage::data("pong")).await.unwrap();
        producer.enqueue(SessionMessage::Stop).await.unwrap();

        let outcome = bridge.run().await;

        assert!(matches!(outcome.reason, CloseReason::Stop));
        assert_eq!(outcome.written, 2);
        assert_eq!(outcome.responses, 2);
        assert_eq!(outcome.discarded, 0);
        assert_eq!(*responses.lock(), vec![b"ack:ping".to_vec(), b"ack:pong".to_vec()]);
        assert_eq!(h.shutdowns.load(Ordering::SeqCst), 1);
        assert_eq!(peer.await.unwrap(), vec![b"ping".to_vec(), b"pong".to_vec()]);
    }

    #[tokio::test]
    async fn test_data_after_stop_is_discarded() {
        let h = harness();
        let (queue, rx) = MessageQueue::with_defaults().unwrap();
        let (signal, _waiter) = readiness();
        let (observer, _) = recording_observer();
        let peer = tokio::spawn(ack_peer(h.server));

        let producer = queue.non_blocking_producer();
        producer.try_enqueue(SessionMessage::data("first")).unwrap();
        producer.try_enqueue(SessionMessage::Stop).unwrap();
        producer.try_enqueue(SessionMessage::data("late")).unwrap();

        let bridge = SessionBridge::new(rx, signal, observer)
            .connect(&h.transport, addr())
            .await
            .unwrap();
        let state = bridge.watch_state();
        let outcome = bridge.run().await;

        assert_eq!(outcome.written, 1);
        assert_eq!(outcome.discarded, 1);
        assert_eq!(*state.borrow(), BridgeState::Closed);
        assert_eq!(peer.await.unwrap(), vec![b"first".to_vec()]);
        assert!(matches!(
            producer.try_enqueue(SessionMessage::data("after")),
            Err(Error::SessionClosed)
        ));
    }

    #[tokio::test]
    async fn test_peer_close_ends_session() {
        let h = harness();
        let (queue, rx) = MessageQueue::with_defaults().unwrap();
        let (signal, _waiter) = readiness();
        let (observer, responses) = recording_observer();

        let mut server = h.server;
        let peer = tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let n = server.read(&mut buf).await.unwrap();
            buf[..n].to_vec()
        });

        let producer = queue.non_blocking_producer();
        producer.try_enqueue(SessionMessage::data("one")).unwrap();
        producer.try_enqueue(SessionMessage::data("two")).unwrap();

        let outcome = SessionBridge::new(rx, signal, observer)
            .connect(&h.transport, addr())
            .await
            .unwrap()
            .run()
            .await;

        assert!(matches!(outcome.reason, CloseReason::Failed(Error::PeerClosed)));
        assert!(!outcome.reason.is_clean());
        assert_eq!(outcome.written, 1);
        assert_eq!(outcome.discarded, 1);
        assert!(responses.lock().is_empty());
        assert_eq!(h.shutdowns.load(Ordering::SeqCst), 1);
        assert_eq!(peer.await.unwrap(), b"one");
    }

    #[tokio::test]
    async fn test_connect_failure_closes_session() {
        let (queue, rx) = MessageQueue::with_defaults().unwrap();
        let (signal, waiter) = readiness();
        let (observer, _) = recording_observer();
        let bridge = SessionBridge::new(rx, signal, observer);
        let state = bridge.watch_state();

        let err = bridge.connect(&RefusingTransport, addr()).await.unwrap_err();

        assert!(matches!(err, Error::TransportOpen { .. }));
        assert_eq!(*state.borrow(), BridgeState::Closed);
        assert!(matches!(waiter.wait().await, Err(Error::SessionClosed)));
        assert!(matches!(
            queue.blocking_producer().enqueue(SessionMessage::data("x")).await,
            Err(Error::SessionClosed)
        ));
    }

    #[tokio::test]
    async fn test_ready_fires_only_after_connect() {
        let h = harness();
        let (_queue, rx) = MessageQueue::with_defaults().unwrap();
        let (signal, waiter) = readiness();
        let (observer, _) = recording_observer();

        let bridge = SessionBridge::new(rx, signal, observer);
        assert!(!waiter.is_ready());
        assert_eq!(*bridge.watch_state().borrow(), BridgeState::AwaitingConnect);

        let active = bridge.connect(&h.transport, addr()).await.unwrap();
        assert!(waiter.is_ready());
        assert_eq!(*active.watch_state().borrow(), BridgeState::Active);
    }

    #[tokio::test]
    async fn test_producers_gone_ends_session() {
        let h = harness();
        let (queue, rx) = MessageQueue::with_defaults().unwrap();
        let (signal, _waiter) = readiness();
        let (observer, responses) = recording_observer();
        let peer = tokio::spawn(ack_peer(h.server));

        queue
            .non_blocking_producer()
            .try_enqueue(SessionMessage::data("only"))
            .unwrap();
        drop(queue);

        let outcome = SessionBridge::new(rx, signal, observer)
            .connect(&h.transport, addr())
            .await
            .unwrap()
            .run()
            .await;

        assert!(matches!(outcome.reason, CloseReason::ProducersGone));
        assert!(outcome.reason.is_clean());
        assert_eq!(responses.lock().len(), 1);
        assert_eq!(peer.await.unwrap(), vec![b"only".to_vec()]);
    }
}
