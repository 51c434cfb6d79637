use crate::core::errors::{CancelledOp, ExchangeError};
use crate::core::kernel::{TeardownScope, WsConfig, WsDialer};
use crate::exchanges::okx::auth::Authenticator;
use crate::exchanges::okx::connection::{ClassSlot, ConnectionClass, PerClass, TransportHandle};
use crate::exchanges::okx::dispatcher::{Dispatcher, Sinks};
use crate::exchanges::okx::events::{Envelope, ErrorEvent, LoginEvent};
use crate::exchanges::okx::pipeline;
use crate::exchanges::okx::subscription::{build_args, route_class};
use crate::exchanges::okx::types::{build_request, Args, Operation};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Capacity of the cancellation notice queue
const DONE_CAPACITY: usize = 32;

/// State shared by the client handle and its workers
pub(crate) struct Shared {
    pub(crate) config: WsConfig,
    pub(crate) classes: PerClass<ClassSlot>,
    pub(crate) auth: Arc<Authenticator>,
    pub(crate) dispatcher: Arc<Dispatcher>,
    dialer: Arc<dyn WsDialer>,
    /// Root scope; every transport scope is a child of it
    shutdown: CancellationToken,
    done_tx: mpsc::Sender<CancelledOp>,
    done_rx: Mutex<Option<mpsc::Receiver<CancelledOp>>>,
}

impl Shared {
    pub(crate) fn new(
        config: WsConfig,
        classes: PerClass<ClassSlot>,
        auth: Arc<Authenticator>,
        dispatcher: Arc<Dispatcher>,
        dialer: Arc<dyn WsDialer>,
    ) -> Self {
        let (done_tx, done_rx) = mpsc::channel(DONE_CAPACITY);
        Self {
            config,
            classes,
            auth,
            dispatcher,
            dialer,
            shutdown: CancellationToken::new(),
            done_tx,
            done_rx: Mutex::new(Some(done_rx)),
        }
    }

    /// Announce that `op` observed cancellation and build its error.
    ///
    /// The notice is dropped when the done queue is full, so a receiver that
    /// is never taken costs at most `DONE_CAPACITY` buffered notices.
    pub(crate) fn handle_cancel(&self, op: CancelledOp) -> ExchangeError {
        if self.done_tx.try_send(op).is_err() {
            debug!(?op, "done queue full, notice dropped");
        }
        ExchangeError::Cancelled(op)
    }

    /// Detach the transport of `generation` from `class`.
    ///
    /// Cancels the transport scope so the paired worker exits too. A no-op
    /// when that generation is already gone.
    pub(crate) async fn teardown(&self, class: ConnectionClass, generation: u64) {
        let slot = &self.classes[class];
        {
            let mut state = slot.state.write().await;
            let current = state
                .handle
                .as_ref()
                .is_some_and(|handle| handle.generation == generation);
            if !current {
                return;
            }
            if let Some(handle) = state.handle.take() {
                handle.cancel.cancel();
            }
            state.closed = true;
            if class.is_private() {
                self.auth.reset();
            }
        }

        if self.config.teardown_scope == TeardownScope::Client {
            self.shutdown.cancel();
        }
        info!(%class, generation, "connection closed");
    }

    pub(crate) fn report_error(&self, event: ErrorEvent) {
        self.dispatcher.report_error(event);
    }
}

/// Streaming client holding one public and one private connection
///
/// Cheap to clone; clones share the same connections.
#[derive(Clone)]
pub struct ClientWs {
    pub(crate) shared: Arc<Shared>,
}

impl ClientWs {
    pub(crate) fn from_shared(shared: Shared) -> Self {
        Self {
            shared: Arc::new(shared),
        }
    }

    /// Ensure a live transport for `class`, redialing on a fixed interval
    /// until a dial succeeds or the client shuts down.
    #[instrument(skip(self), fields(%class))]
    pub async fn connect(&self, class: ConnectionClass) -> Result<(), ExchangeError> {
        if self.check_connect(class).await {
            return Ok(());
        }
        if self.shared.shutdown.is_cancelled() {
            return Err(self.shared.handle_cancel(CancelledOp::Connect));
        }

        let err = match self.dial(class).await {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };
        warn!(error = %err, "dial failed, retrying");

        let redial = self.shared.config.redial_interval;
        let mut ticker = interval_at(Instant::now() + redial, redial);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = self.shared.shutdown.cancelled() => {
                    return Err(self.shared.handle_cancel(CancelledOp::Connect));
                }
                _ = ticker.tick() => match self.dial(class).await {
                    Ok(()) => return Ok(()),
                    Err(err) => warn!(error = %err, "dial failed, retrying"),
                },
            }
        }
    }

    /// Whether `class` has a transport that is not marked closed
    pub async fn check_connect(&self, class: ConnectionClass) -> bool {
        self.shared.classes[class].is_connected().await
    }

    /// Make one dial attempt and start the class's send and receive workers.
    pub async fn dial(&self, class: ConnectionClass) -> Result<(), ExchangeError> {
        let slot = &self.shared.classes[class];
        let mut state = slot.state.write().await;
        if state.is_live() {
            return Ok(());
        }

        let (sink, stream) = self.shared.dialer.dial(&slot.url).await?;

        let generation = slot.next_generation();
        let cancel = self.shared.shutdown.child_token();
        state.handle = Some(TransportHandle {
            generation,
            cancel: cancel.clone(),
        });
        state.closed = false;
        slot.touch();
        if class.is_private() {
            self.shared.auth.on_connected();
        }
        drop(state);

        info!(%class, generation, url = %slot.url, "connected");
        pipeline::spawn_workers(&self.shared, class, generation, cancel, sink, stream);
        Ok(())
    }

    /// Request a login on the private class; see [`Authenticator::login`].
    pub async fn login(&self) -> Result<(), ExchangeError> {
        self.shared.auth.login().await
    }

    /// Wait until the private class is authorized or the client shuts down.
    ///
    /// Fails with [`ExchangeError::NotConnected`] when the private transport
    /// is down or goes away before the login is acknowledged; reconnect and
    /// wait again.
    pub async fn wait_for_authorization(&self) -> Result<(), ExchangeError> {
        self.shared
            .auth
            .wait_for_authorization(&self.shared.shutdown)
            .await
    }

    /// Whether the private class has completed its login
    pub fn is_authorized(&self) -> bool {
        self.shared.auth.is_authorized()
    }

    /// Subscribe to `channels` on `class`.
    ///
    /// Each record is `channel=<name>` overlaid with `extras`, so an extra
    /// named `channel` wins. With no channels a single extras-only record is
    /// sent.
    pub async fn subscribe<S: AsRef<str>>(
        &self,
        class: ConnectionClass,
        channels: &[S],
        extras: &Args,
    ) -> Result<(), ExchangeError> {
        let args = build_args(channels, extras);
        self.send(class, Operation::Subscribe, args, None).await
    }

    /// Unsubscribe from `channels` on `class`; records are built as for
    /// [`subscribe`](Self::subscribe), so an extra named `channel` wins.
    pub async fn unsubscribe<S: AsRef<str>>(
        &self,
        class: ConnectionClass,
        channels: &[S],
        extras: &Args,
    ) -> Result<(), ExchangeError> {
        let args = build_args(channels, extras);
        self.send(class, Operation::Unsubscribe, args, None).await
    }

    /// Serialize `{"op", "args", ..extras}` and queue it for transmission.
    ///
    /// Everything except a login first connects the target class and, on the
    /// private class, waits for authorization. Depth channels always go out on
    /// the public class. Waits while the class's outbound queue is full.
    #[instrument(skip(self, args, extras), fields(%class, %op))]
    pub async fn send(
        &self,
        class: ConnectionClass,
        op: Operation,
        args: Vec<Args>,
        extras: Option<&Args>,
    ) -> Result<(), ExchangeError> {
        let frame = build_request(op, &args, extras)?;
        let target = route_class(class, &args);
        if target != class {
            debug!(%target, "depth channel rerouted");
        }

        if op != Operation::Login {
            self.connect(target).await?;
            if target.is_private() {
                self.wait_for_authorization().await?;
            }
        }

        tokio::select! {
            biased;
            () = self.shared.shutdown.cancelled() => {
                Err(self.shared.handle_cancel(CancelledOp::Sender))
            }
            queued = self.shared.classes[target].enqueue(frame) => queued,
        }
    }

    /// Attach every notification sink at once, replacing previous ones
    pub fn set_channels(&self, sinks: Sinks) {
        self.shared.dispatcher.update_sinks(|current| *current = sinks);
    }

    pub fn set_error_channel(&self, tx: mpsc::Sender<ErrorEvent>) {
        self.shared
            .dispatcher
            .update_sinks(|sinks| sinks.error = Some(tx));
    }

    pub fn set_login_channel(&self, tx: mpsc::Sender<LoginEvent>) {
        self.shared
            .dispatcher
            .update_sinks(|sinks| sinks.login = Some(tx));
    }

    /// Receiver of cancellation notices, one per operation that observed
    /// shutdown. Only the first call gets it.
    ///
    /// Holds up to 32 notices; later ones are dropped until it is drained.
    pub fn take_done_receiver(&self) -> Option<mpsc::Receiver<CancelledOp>> {
        self.shared
            .done_rx
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
    }

    /// Run one raw frame through the dispatcher; `false` means unroutable.
    pub async fn process(&self, frame: &str) -> Result<bool, ExchangeError> {
        let envelope: Envelope = serde_json::from_str(frame)?;
        Ok(self.shared.dispatcher.dispatch(frame, envelope).await)
    }

    /// Cancel the root scope, tearing down both classes and any pending
    /// connect or authorization wait.
    pub fn shutdown(&self) {
        info!("shutting down");
        self.shared.shutdown.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }
}
