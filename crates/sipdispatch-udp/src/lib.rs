//! UDP transport for the sipdispatch scheduling core
//!
//! A transport owns one UDP socket and decouples inbound packet dispatch
//! from outbound queuing: the receive loop hands every datagram to the
//! host's data callback synchronously, while `send_to` only enqueues onto a
//! bounded outbound queue that a separate drain loop writes to the socket.
//! Both loops run as one pair inside the transport's own cancellation scope
//! for its entire running lifetime.
//!
//! IPv6 address literals are normalized at the protocol boundary: the
//! callback-facing host string is bracketed (`"[::1]"`), the socket-facing
//! one never is. IPv4 transports perform neither conversion.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use sipdispatch_core::{
    destination_addr, source_addr, AddressFamily, MonotonicClock, Payload, Result, Scheduler,
    SourceAddr, SystemClock, TransportError, TransportTask, UdpTransportConfig,
};

/// Largest possible UDP datagram
const MAX_DATAGRAM_SIZE: usize = 65_535;

/// Inbound data callback supplied by the host protocol stack.
///
/// Invoked synchronously from the receive loop for every datagram. Errors
/// are caught and logged by the transport, never propagated, so a failing
/// callback cannot terminate the receive loop.
pub type DataCallback =
    Arc<dyn Fn(&[u8], SourceAddr, &UdpTransportHandle, Instant) -> Result<()> + Send + Sync>;

// ----------------------------------------------------------------------------
// Transport Options
// ----------------------------------------------------------------------------

/// Socket-level options for one UDP transport, mirroring what the host
/// protocol stack supplies when constructing its transport layer
pub struct UdpOptions {
    pub laddress: SocketAddr,
    pub family: AddressFamily,
    pub data_callback: DataCallback,
    clock: Arc<dyn MonotonicClock>,
}

impl UdpOptions {
    /// Options for a socket bound to `laddress`, with the address family
    /// derived from it
    pub fn new(laddress: SocketAddr, data_callback: DataCallback) -> Self {
        Self {
            laddress,
            family: AddressFamily::of(&laddress),
            data_callback,
            clock: Arc::new(SystemClock),
        }
    }

    /// Override the address family driving host-string normalization
    pub fn with_family(mut self, family: AddressFamily) -> Self {
        self.family = family;
        self
    }

    /// Inject a clock for receive timestamps
    pub fn with_clock(mut self, clock: Arc<dyn MonotonicClock>) -> Self {
        self.clock = clock;
        self
    }
}

// ----------------------------------------------------------------------------
// Transport Statistics
// ----------------------------------------------------------------------------

/// Per-transport packet counters
#[derive(Debug, Default)]
pub struct TransportStats {
    sent: AtomicU64,
    dropped: AtomicU64,
    received: AtomicU64,
}

impl TransportStats {
    /// Datagrams written to the socket by the drain loop
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Outbound packets rejected because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Datagrams handed to the data callback
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }
}

// ----------------------------------------------------------------------------
// Transport Handle
// ----------------------------------------------------------------------------

/// Cloneable handle to a registered UDP transport
///
/// The handle is what the host stack keeps: it queues outbound packets,
/// exposes the counters, and shuts the transport down. It stays valid from
/// construction, before the dispatcher has started the transport's loops.
#[derive(Clone)]
pub struct UdpTransportHandle {
    id: u64,
    family: AddressFamily,
    capacity: usize,
    outbound_tx: mpsc::Sender<(Payload, SocketAddr)>,
    stats: Arc<TransportStats>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    local_addr_rx: watch::Receiver<Option<SocketAddr>>,
}

impl UdpTransportHandle {
    /// Unique id assigned at construction
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn family(&self) -> AddressFamily {
        self.family
    }

    pub fn stats(&self) -> &TransportStats {
        &self.stats
    }

    /// Queue one outbound packet without blocking.
    ///
    /// For IPv6-family transports the destination host may carry the
    /// bracketed literal form; the brackets are stripped before the socket
    /// ever sees it. A full queue fails immediately with
    /// [`TransportError::SendBufferFull`]; nothing is silently dropped.
    pub fn send_to(&self, payload: impl Into<Payload>, address: (&str, u16)) -> Result<()> {
        let (host, port) = address;
        let dest = destination_addr(host, port, self.family)?;
        match self.outbound_tx.try_send((payload.into(), dest)) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.stats.record_dropped();
                warn!(id = self.id, %dest, "outbound queue full, packet rejected");
                Err(TransportError::SendBufferFull {
                    capacity: self.capacity,
                }
                .into())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(TransportError::QueueClosed.into()),
        }
    }

    /// Cancel the transport's scope, stopping its receive/drain loop pair
    pub fn shutdown(&self) {
        info!(id = self.id, "udp transport shutdown requested");
        let _ = self.shutdown_tx.send(true);
    }

    /// Address the socket is bound to, available once the dispatcher has
    /// started the transport. Useful when binding to port 0.
    pub async fn local_addr(&self) -> Result<SocketAddr> {
        let mut rx = self.local_addr_rx.clone();
        loop {
            if let Some(addr) = *rx.borrow() {
                return Ok(addr);
            }
            rx.changed()
                .await
                .map_err(|_| TransportError::NotRunning)?;
        }
    }
}

// ----------------------------------------------------------------------------
// UDP Transport
// ----------------------------------------------------------------------------

/// One UDP socket with its receive loop and outbound-drain loop
pub struct UdpTransport {
    id: u64,
    laddress: SocketAddr,
    family: AddressFamily,
    data_callback: DataCallback,
    clock: Arc<dyn MonotonicClock>,
    /// Consumer side of the outbound queue, taken by `run()`
    outbound_rx: Option<mpsc::Receiver<(Payload, SocketAddr)>>,
    handle: UdpTransportHandle,
    shutdown_rx: watch::Receiver<bool>,
    local_addr_tx: watch::Sender<Option<SocketAddr>>,
    stats: Arc<TransportStats>,
}

impl UdpTransport {
    /// Construct a transport and register it with the scheduler.
    ///
    /// The scheduler assigns the unique id and starts the transport when its
    /// own loop begins; the returned handle is usable immediately for
    /// queuing (packets sit in the outbound queue until the drain loop
    /// starts).
    pub fn register(
        scheduler: &dyn Scheduler,
        config: UdpTransportConfig,
        options: UdpOptions,
    ) -> Result<UdpTransportHandle> {
        config
            .validate()
            .map_err(sipdispatch_core::DispatchError::config_error)?;

        let id = scheduler.allocate_transport_id();
        let stats = Arc::new(TransportStats::default());
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_buffer_size);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (local_addr_tx, local_addr_rx) = watch::channel(None);

        let handle = UdpTransportHandle {
            id,
            family: options.family,
            capacity: config.outbound_buffer_size,
            outbound_tx,
            stats: Arc::clone(&stats),
            shutdown_tx: Arc::new(shutdown_tx),
            local_addr_rx,
        };

        let transport = UdpTransport {
            id,
            laddress: options.laddress,
            family: options.family,
            data_callback: options.data_callback,
            clock: options.clock,
            outbound_rx: Some(outbound_rx),
            handle: handle.clone(),
            shutdown_rx,
            local_addr_tx,
            stats,
        };

        info!(id, laddress = %options.laddress, family = %options.family, "udp transport registered");
        scheduler.register_transport(Box::new(transport));
        Ok(handle)
    }
}

#[async_trait::async_trait]
impl TransportTask for UdpTransport {
    fn transport_id(&self) -> u64 {
        self.id
    }

    async fn run(&mut self) -> Result<()> {
        let socket = Arc::new(
            UdpSocket::bind(self.laddress)
                .await
                .map_err(TransportError::NetworkIo)?,
        );
        let local = socket.local_addr().map_err(TransportError::NetworkIo)?;
        let _ = self.local_addr_tx.send(Some(local));
        info!(id = self.id, %local, "udp transport started");

        let mut scope: JoinSet<()> = JoinSet::new();

        // outbound-drain loop: the only writer for this socket
        let mut outbound_rx = self
            .outbound_rx
            .take()
            .ok_or(TransportError::NotRunning)?;
        let drain_socket = Arc::clone(&socket);
        let drain_stats = Arc::clone(&self.stats);
        let id = self.id;
        scope.spawn(async move {
            while let Some((payload, dest)) = outbound_rx.recv().await {
                let bytes = payload.into_bytes();
                match drain_socket.send_to(&bytes, dest).await {
                    Ok(len) => {
                        drain_stats.record_sent();
                        debug!(id, %dest, len, "datagram sent");
                    }
                    Err(err) => warn!(id, %dest, error = %err, "socket write failed"),
                }
            }
            debug!(id, "outbound queue closed, drain loop ending");
        });

        let mut shutdown_rx = self.shutdown_rx.clone();
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            // a shutdown requested before the loops started is already latched
            if *shutdown_rx.borrow() {
                break;
            }
            tokio::select! {
                received = socket.recv_from(&mut buf) => {
                    let (len, from) = received.map_err(TransportError::NetworkIo)?;
                    self.stats.record_received();
                    let source = source_addr(from, self.family);
                    let received_at = self.clock.now();
                    let callback = self.data_callback.as_ref();
                    if let Err(err) = callback(&buf[..len], source, &self.handle, received_at) {
                        // the receive loop must survive callback failures
                        error!(
                            id = self.id,
                            error = %err,
                            "unhandled error while processing incoming data"
                        );
                    }
                }
                _ = shutdown_rx.changed() => break,
            }
        }

        scope.abort_all();
        while scope.join_next().await.is_some() {}
        info!(id = self.id, "udp transport stopped");
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
