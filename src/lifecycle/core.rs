//! Connection lifecycle orchestration.
//!
//! Runs the pipeline once:
//!
//! ```text
//! AcquiringLink ──▶ Resolving ──▶ Opening ──▶ Bridging ──▶ Finished
//!       │               │            │
//!       └───────────────┴────────────┴──▶ Halted
//! ```
//!
//! Link, resolution, and connect failures are terminal: nothing is
//! retried, the readiness signal is dropped unfired, and producers see
//! [`Error::SessionClosed`].

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::io;
use std::net::SocketAddr;

use futures_util::Stream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::discovery::Resolver;
use crate::error::{Error, Result};
use crate::link::{LinkManager, LinkState};
use crate::session::{
    BlockingProducer, MessageQueue, NonBlockingProducer, ProducerStats, QueueReceiver,
    ReadySignal, ReadyWaiter, ResponseObserver, SessionBridge, SessionOutcome, TcpTransport,
    Transport, heartbeat, interactive,
};

use super::builder::LifecycleBuilder;
use super::config::{DEFAULT_PEER_PORT, LifecycleConfig, PeerLocator};

// ============================================================================
// LifecyclePhase
// ============================================================================

/// Pipeline phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecyclePhase {
    /// Not started.
    #[default]
    Idle,
    /// Bringing up the wireless link.
    AcquiringLink,
    /// Locating the peer.
    Resolving,
    /// Opening the transport.
    Opening,
    /// Session running.
    Bridging,
    /// Session ended.
    Finished,
    /// A terminal failure stopped the pipeline.
    Halted,
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::AcquiringLink => "acquiring-link",
            Self::Resolving => "resolving",
            Self::Opening => "opening",
            Self::Bridging => "bridging",
            Self::Finished => "finished",
            Self::Halted => "halted",
        })
    }
}

// ============================================================================
// ConnectionLifecycle
// ============================================================================

/// Link, resolve, connect, then bridge.
///
/// Producers are handed out before [`run`](Self::run) and wait for
/// readiness on their own.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
///
/// use wifi_rendezvous::{ConnectionLifecycle, HostLink, LifecycleConfig, SystemEngine};
///
/// # async fn example() -> wifi_rendezvous::Result<()> {
/// let config = LifecycleConfig::new()
///     .with_credentials("lab", "secret")
///     .with_peer_host("esp32", 3333);
/// let transport = config.session.tcp_transport();
///
/// let lifecycle = ConnectionLifecycle::builder()
///     .config(config)
///     .link_driver(Arc::new(HostLink::detect()))
///     .engine(Arc::new(SystemEngine::new()))
///     .transport(transport)
///     .build()?;
///
/// lifecycle.spawn_heartbeat();
/// let outcome = lifecycle.run().await?;
/// println!("{} messages written", outcome.written);
/// # Ok(())
/// # }
/// ```
pub struct ConnectionLifecycle<T> {
    config: LifecycleConfig,
    link: LinkManager,
    resolver: Resolver,
    transport: T,
    observer: ResponseObserver,
    queue: MessageQueue,
    receiver: QueueReceiver,
    ready: ReadySignal,
    waiter: ReadyWaiter,
    phase: watch::Sender<LifecyclePhase>,
}

impl ConnectionLifecycle<TcpTransport> {
    /// Creates a lifecycle builder.
    ///
    /// The transport type follows whatever is passed to
    /// [`LifecycleBuilder::transport`].
    #[inline]
    #[must_use]
    pub fn builder() -> LifecycleBuilder<TcpTransport> {
        LifecycleBuilder::new()
    }
}

impl<T> ConnectionLifecycle<T>
where
    T: Transport,
{
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: LifecycleConfig,
        link: LinkManager,
        resolver: Resolver,
        transport: T,
        observer: ResponseObserver,
        queue: MessageQueue,
        receiver: QueueReceiver,
        ready: (ReadySignal, ReadyWaiter),
    ) -> Self {
        let (phase, _) = watch::channel(LifecyclePhase::Idle);
        Self {
            config,
            link,
            resolver,
            transport,
            observer,
            queue,
            receiver,
            ready: ready.0,
            waiter: ready.1,
            phase,
        }
    }

    /// Returns the configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Returns the current phase.
    #[inline]
    #[must_use]
    pub fn phase(&self) -> LifecyclePhase {
        *self.phase.borrow()
    }

    /// Subscribes to phase changes.
    #[inline]
    #[must_use]
    pub fn watch_phase(&self) -> watch::Receiver<LifecyclePhase> {
        self.phase.subscribe()
    }

    /// Subscribes to link state changes.
    #[inline]
    #[must_use]
    pub fn watch_link(&self) -> watch::Receiver<LinkState> {
        self.link.watch_state()
    }

    /// Returns a producer that waits for queue space.
    #[inline]
    #[must_use]
    pub fn blocking_producer(&self) -> BlockingProducer {
        self.queue.blocking_producer()
    }

    /// Returns a producer that never waits.
    #[inline]
    #[must_use]
    pub fn non_blocking_producer(&self) -> NonBlockingProducer {
        self.queue.non_blocking_producer()
    }

    /// Returns a readiness waiter for custom producers.
    #[inline]
    #[must_use]
    pub fn ready_waiter(&self) -> ReadyWaiter {
        self.waiter.clone()
    }

    /// Spawns the heartbeat producer at the configured period.
    pub fn spawn_heartbeat(&self) -> JoinHandle<ProducerStats> {
        tokio::spawn(heartbeat(
            self.non_blocking_producer(),
            self.ready_waiter(),
            self.config.session.heartbeat_interval(),
        ))
    }

    /// Spawns the interactive producer over `input`.
    pub fn spawn_interactive<I>(&self, input: I) -> JoinHandle<Result<ProducerStats>>
    where
        I: Stream<Item = io::Result<String>> + Unpin + Send + 'static,
    {
        tokio::spawn(interactive(
            input,
            self.blocking_producer(),
            self.ready_waiter(),
        ))
    }

    /// Runs the pipeline once.
    ///
    /// # Errors
    ///
    /// - [`Error::LinkExhausted`] / [`Error::LinkDriver`] if the link failed
    /// - [`Error::ResolutionTimeout`], [`Error::ResolutionNotFound`],
    ///   [`Error::ResolutionError`] if the peer could not be located
    /// - [`Error::TransportOpen`] if the peer refused the connection
    pub async fn run(self) -> Result<SessionOutcome> {
        let Self {
            config,
            mut link,
            resolver,
            transport,
            observer,
            queue,
            receiver,
            ready,
            waiter,
            phase,
        } = self;

        // Only producers handed out earlier keep the session alive.
        drop(queue);
        drop(waiter);

        let result: Result<SessionOutcome> = async {
            phase.send_replace(LifecyclePhase::AcquiringLink);
            let credentials = config.link.credentials();
            match link.acquire(&credentials, config.link.max_retries).await? {
                LinkState::Connected => {}
                _ => return Err(Error::link_exhausted(link.retries())),
            }

            phase.send_replace(LifecyclePhase::Resolving);
            let addr = locate_peer(&resolver, &config).await?;

            phase.send_replace(LifecyclePhase::Opening);
            let bridge = SessionBridge::new(receiver, ready, observer)
                .with_read_buffer(config.session.read_buffer)
                .with_read_timeout(config.session.read_timeout())
                .connect(&transport, addr)
                .await?;

            phase.send_replace(LifecyclePhase::Bridging);
            Ok(bridge.run().await)
        }
        .await;

        match &result {
            Ok(outcome) => {
                phase.send_replace(LifecyclePhase::Finished);
                info!(session = %outcome.session_id, reason = ?outcome.reason, "Lifecycle finished");
            }
            Err(e) => {
                phase.send_replace(LifecyclePhase::Halted);
                error!(error = %e, "Lifecycle halted");
            }
        }
        result
    }

    /// Runs the pipeline; on failure, parks forever.
    ///
    /// Mirrors a device that idles after a terminal failure until it is
    /// restarted externally.
    pub async fn run_or_halt(self) -> SessionOutcome {
        match self.run().await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "Halting; restart required");
                std::future::pending().await
            }
        }
    }
}

impl<T> fmt::Debug for ConnectionLifecycle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionLifecycle")
            .field("peer", &self.config.peer)
            .field("phase", &*self.phase.borrow())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Peer Location
// ============================================================================

/// Resolves the configured peer to a socket address.
async fn locate_peer(resolver: &Resolver, config: &LifecycleConfig) -> Result<SocketAddr> {
    let deadline = config.resolve_timeout();
    let name = config.peer.query_name();

    let (result, port) = match &config.peer {
        PeerLocator::Host { hostname, port } => {
            (resolver.lookup_host(hostname, deadline).await, Some(*port))
        }
        PeerLocator::Service {
            service_type,
            proto,
            port_override,
            max_results,
        } => (
            resolver
                .resolve_service(service_type, proto, deadline, *max_results)
                .await,
            *port_override,
        ),
    };

    let (ip, answered_port) = result.into_result(&name, deadline)?;
    let port = port.or(answered_port).unwrap_or(DEFAULT_PEER_PORT);
    let addr = SocketAddr::new(ip, port);
    info!(peer = %name, %addr, "Peer located");
    Ok(addr)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Arc;
    use std::time::Duration;

    use parking_lot::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use crate::discovery::{IpFamily, ServiceRecord, StaticEngine};
    use crate::link::{Credentials, HostLink, LinkDriver, LinkEvent, LinkEvents};
    use crate::session::{CloseReason, SessionMessage};

    /// Driver that disconnects on every connect.
    struct DeadLink {
        events: LinkEvents,
    }

    impl LinkDriver for DeadLink {
        fn events(&self) -> &LinkEvents {
            &self.events
        }

        fn start(&self, _: &Credentials) -> Result<()> {
            self.events.publish(LinkEvent::StationStarted);
            Ok(())
        }

        fn connect(&self) -> Result<()> {
            self.events.publish(LinkEvent::StationDisconnected);
            Ok(())
        }
    }

    fn loopback_link() -> Arc<HostLink> {
        Arc::new(HostLink::new(IpAddr::V4(Ipv4Addr::LOCALHOST)))
    }

    fn config(port: u16) -> LifecycleConfig {
        LifecycleConfig::new()
            .with_credentials("lab", "secret")
            .with_peer_host("peer", port)
            .with_resolve_timeout(Duration::from_secs(1))
    }

    /// Replies `ack:<request>` until the client closes.
    async fn ack_server() -> (u16, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let task = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut seen = Vec::new();
            let mut buf = [0u8; 256];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                let text = String::from_utf8_lossy(&buf[..n]).to_string();
                socket.write_all(format!("ack:{text}").as_bytes()).await.unwrap();
                seen.push(text);
            }
            seen
        });
        (port, task)
    }

    #[tokio::test]
    async fn test_full_pipeline_over_loopback() {
        let (port, server) = ack_server().await;
        let responses = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&responses);

        let lifecycle = ConnectionLifecycle::builder()
            .config(config(port))
            .link_driver(loopback_link())
            .engine(Arc::new(StaticEngine::new().with_host("peer", Ipv4Addr::LOCALHOST)))
            .transport(TcpTransport::new())
            .observer(Box::new(move |response: &[u8]| {
                sink.lock().push(String::from_utf8_lossy(response).to_string());
            }))
            .build()
            .unwrap();

        let producer = lifecycle.blocking_producer();
        let waiter = lifecycle.ready_waiter();
        let phases = lifecycle.watch_phase();
        let feeder = tokio::spawn(async move {
            waiter.wait().await.unwrap();
            producer.enqueue(SessionMessage::data("ping")).await.unwrap();
            producer.enqueue(SessionMessage::data("pong")).await.unwrap();
            producer.enqueue(SessionMessage::Stop).await.unwrap();
        });

        let outcome = lifecycle.run().await.unwrap();
        feeder.await.unwrap();

        assert!(matches!(outcome.reason, CloseReason::Stop));
        assert_eq!(outcome.written, 2);
        assert_eq!(*responses.lock(), ["ack:ping", "ack:pong"]);
        assert_eq!(server.await.unwrap(), ["ping", "pong"]);
        assert_eq!(*phases.borrow(), LifecyclePhase::Finished);
    }

    #[tokio::test]
    async fn test_link_exhausted_halts_and_closes_producers() {
        let lifecycle = ConnectionLifecycle::builder()
            .config(config(3333).with_max_retries(3))
            .link_driver(Arc::new(DeadLink {
                events: LinkEvents::new(),
            }))
            .engine(Arc::new(StaticEngine::new()))
            .transport(TcpTransport::new())
            .build()
            .unwrap();
        let waiter = lifecycle.ready_waiter();
        let producer = lifecycle.blocking_producer();
        let phases = lifecycle.watch_phase();

        let err = lifecycle.run().await.unwrap_err();

        assert!(matches!(err, Error::LinkExhausted { retries: 3 }));
        assert_eq!(*phases.borrow(), LifecyclePhase::Halted);
        assert!(matches!(waiter.wait().await, Err(Error::SessionClosed)));
        assert!(matches!(
            producer.enqueue(SessionMessage::data("x")).await,
            Err(Error::SessionClosed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_or_halt_parks_after_failure() {
        let lifecycle = ConnectionLifecycle::builder()
            .config(config(3333))
            .link_driver(loopback_link())
            .engine(Arc::new(StaticEngine::new()))
            .transport(TcpTransport::new())
            .build()
            .unwrap();
        let phases = lifecycle.watch_phase();

        let parked = tokio::time::timeout(Duration::from_secs(60), lifecycle.run_or_halt()).await;

        assert!(parked.is_err());
        assert_eq!(*phases.borrow(), LifecyclePhase::Halted);
    }

    #[tokio::test]
    async fn test_unresolved_peer_is_not_found() {
        let lifecycle = ConnectionLifecycle::builder()
            .config(config(3333))
            .link_driver(loopback_link())
            .engine(Arc::new(StaticEngine::new()))
            .transport(TcpTransport::new())
            .build()
            .unwrap();

        let err = lifecycle.run().await.unwrap_err();
        assert!(matches!(err, Error::ResolutionNotFound { ref name } if name == "peer"));
        assert!(err.is_lifecycle_fatal());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_engine_times_out() {
        let lifecycle = ConnectionLifecycle::builder()
            .config(config(3333))
            .link_driver(loopback_link())
            .engine(Arc::new(
                StaticEngine::new()
                    .with_host("peer", Ipv4Addr::LOCALHOST)
                    .with_latency(Duration::from_secs(5)),
            ))
            .transport(TcpTransport::new())
            .build()
            .unwrap();

        let err = lifecycle.run().await.unwrap_err();
        assert!(matches!(err, Error::ResolutionTimeout { timeout_ms: 1000, .. }));
    }

    #[tokio::test]
    async fn test_refused_connection_is_transport_open() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let lifecycle = ConnectionLifecycle::builder()
            .config(config(port))
            .link_driver(loopback_link())
            .engine(Arc::new(StaticEngine::new().with_host("peer", Ipv4Addr::LOCALHOST)))
            .transport(TcpTransport::new())
            .build()
            .unwrap();
        let waiter = lifecycle.ready_waiter();

        let err = lifecycle.run().await.unwrap_err();
        assert!(matches!(err, Error::TransportOpen { .. }));
        assert!(matches!(waiter.wait().await, Err(Error::SessionClosed)));
    }

    #[tokio::test]
    async fn test_service_locator_uses_record_port() {
        let (port, server) = ack_server().await;
        let record = ServiceRecord::new("lo", IpFamily::V4)
            .with_instance("peer", "_service_3333", "_udp")
            .with_srv("peer", port)
            .with_address(Ipv4Addr::LOCALHOST);

        let lifecycle = ConnectionLifecycle::builder()
            .config(config(1).with_peer(PeerLocator::service("_service_3333", "_udp")))
            .link_driver(loopback_link())
            .engine(Arc::new(StaticEngine::new().with_service(record)))
            .transport(TcpTransport::new())
            .build()
            .unwrap();
        lifecycle
            .non_blocking_producer()
            .try_enqueue(SessionMessage::data("hello"))
            .unwrap();
        lifecycle
            .non_blocking_producer()
            .try_enqueue(SessionMessage::Stop)
            .unwrap();

        let outcome = lifecycle.run().await.unwrap();
        assert_eq!(outcome.peer.port(), port);
        assert_eq!(server.await.unwrap(), ["hello"]);
    }

    #[tokio::test]
    async fn test_interactive_stop_ends_session() {
        let (port, server) = ack_server().await;
        let lifecycle = ConnectionLifecycle::builder()
            .config(config(port))
            .link_driver(loopback_link())
            .engine(Arc::new(StaticEngine::new().with_host("peer", Ipv4Addr::LOCALHOST)))
            .transport(TcpTransport::new())
            .build()
            .unwrap();

        let input = futures_util::stream::iter(vec![Ok("ping".to_string()), Ok(String::new())]);
        let producer = lifecycle.spawn_interactive(input);

        let outcome = lifecycle.run().await.unwrap();
        let stats = producer.await.unwrap().unwrap();

        assert!(stats.stopped);
        assert!(matches!(outcome.reason, CloseReason::Stop));
        assert_eq!(server.await.unwrap(), ["ping"]);
    }
}
