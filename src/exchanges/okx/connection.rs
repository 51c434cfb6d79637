use crate::core::errors::ExchangeError;
use std::fmt;
use std::ops::Index;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Logical socket role of the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionClass {
    /// Market data feed
    Public,
    /// Authenticated account and order feed
    Private,
}

impl ConnectionClass {
    pub const ALL: [Self; 2] = [Self::Public, Self::Private];

    const fn index(self) -> usize {
        match self {
            Self::Public => 0,
            Self::Private => 1,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }

    pub const fn is_private(self) -> bool {
        matches!(self, Self::Private)
    }
}

impl fmt::Display for ConnectionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One value per connection class
#[derive(Debug, Clone, Default)]
pub struct PerClass<T> {
    slots: [T; 2],
}

impl<T> PerClass<T> {
    pub const fn new(public: T, private: T) -> Self {
        Self {
            slots: [public, private],
        }
    }

    pub fn from_fn(mut f: impl FnMut(ConnectionClass) -> T) -> Self {
        Self::new(
            f(ConnectionClass::Public),
            f(ConnectionClass::Private),
        )
    }
}

impl<T> Index<ConnectionClass> for PerClass<T> {
    type Output = T;

    fn index(&self, class: ConnectionClass) -> &T {
        &self.slots[class.index()]
    }
}

/// A live transport: its generation and the cancellation scope shared by its
/// send and receive workers.
#[derive(Debug)]
pub(crate) struct TransportHandle {
    pub(crate) generation: u64,
    pub(crate) cancel: CancellationToken,
}

#[derive(Debug, Default)]
pub(crate) struct TransportState {
    pub(crate) handle: Option<TransportHandle>,
    pub(crate) closed: bool,
}

impl TransportState {
    pub(crate) const fn is_live(&self) -> bool {
        self.handle.is_some() && !self.closed
    }
}

/// Everything the client keeps for one connection class
pub(crate) struct ClassSlot {
    pub(crate) class: ConnectionClass,
    pub(crate) url: String,
    /// Guards the transport handle and its closed flag
    pub(crate) state: RwLock<TransportState>,
    outbound_tx: mpsc::Sender<String>,
    outbound_rx: Arc<Mutex<mpsc::Receiver<String>>>,
    epoch: Instant,
    last_transmit_ms: AtomicU64,
    generation: AtomicU64,
}

impl ClassSlot {
    pub(crate) fn new(class: ConnectionClass, url: String, capacity: usize) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity.max(1));
        Self {
            class,
            url,
            state: RwLock::new(TransportState::default()),
            outbound_tx,
            outbound_rx: Arc::new(Mutex::new(outbound_rx)),
            epoch: Instant::now(),
            last_transmit_ms: AtomicU64::new(0),
            generation: AtomicU64::new(0),
        }
    }

    pub(crate) async fn is_connected(&self) -> bool {
        self.state.read().await.is_live()
    }

    pub(crate) fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Record a successful transmission (either direction)
    pub(crate) fn touch(&self) {
        let elapsed = u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.last_transmit_ms.store(elapsed, Ordering::Relaxed);
    }

    pub(crate) fn idle_for(&self) -> Duration {
        let last = Duration::from_millis(self.last_transmit_ms.load(Ordering::Relaxed));
        self.epoch.elapsed().saturating_sub(last)
    }

    pub(crate) fn outbound_sender(&self) -> mpsc::Sender<String> {
        self.outbound_tx.clone()
    }

    /// Enqueue one frame; waits while the queue is full.
    pub(crate) async fn enqueue(&self, frame: String) -> Result<(), ExchangeError> {
        self.outbound_tx.send(frame).await.map_err(|_| {
            ExchangeError::NotConnected(format!("{} outbound queue closed", self.class))
        })
    }

    /// Exclusive access to the outbound queue for the lifetime of a send worker
    pub(crate) async fn outbound(&self) -> OwnedMutexGuard<mpsc::Receiver<String>> {
        self.outbound_rx.clone().lock_owned().await
    }
}

/// Whether the sender should emit a keep-alive ping
pub(crate) fn ping_due(idle: Duration, ping_period: Duration) -> bool {
    idle > ping_period
}
