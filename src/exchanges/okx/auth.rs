use crate::core::errors::{CancelledOp, ExchangeError};
use crate::core::kernel::WsConfig;
use crate::exchanges::okx::signer::OkxSigner;
use crate::exchanges::okx::types::{build_request, to_args, Operation};
use chrono::Utc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// What the client should do with an inbound login acknowledgement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoginOutcome {
    /// The pending request is fresh; the private class is now authorized
    Fresh,
    /// The pending request timed out; it was cleared and must be re-issued
    Stale,
}

/// Private transport as seen by the login handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Session {
    Disconnected,
    Connected,
    Authorized,
}

/// Login handshake state of the private connection class
pub struct Authenticator {
    signer: Option<Arc<OkxSigner>>,
    session: watch::Sender<Session>,
    requested_at: Mutex<Option<Instant>>,
    private_tx: mpsc::Sender<String>,
    stale_after: Duration,
    poll_interval: Duration,
}

impl Authenticator {
    pub(crate) fn new(
        signer: Option<Arc<OkxSigner>>,
        private_tx: mpsc::Sender<String>,
        config: &WsConfig,
    ) -> Self {
        let (session, _) = watch::channel(Session::Disconnected);
        Self {
            signer,
            session,
            requested_at: Mutex::new(None),
            private_tx,
            stale_after: config.login_stale_after,
            poll_interval: config.auth_poll_interval,
        }
    }

    pub fn is_authorized(&self) -> bool {
        *self.session.borrow() == Session::Authorized
    }

    pub fn has_credentials(&self) -> bool {
        self.signer.is_some()
    }

    pub(crate) fn mark_authorized(&self) {
        self.session.send_replace(Session::Authorized);
    }

    /// A new private transport is up and not yet logged in.
    pub(crate) fn on_connected(&self) {
        self.session.send_replace(Session::Connected);
    }

    /// Forget authorization and any pending request; used when the private
    /// transport goes away. Pending authorization waits fail.
    pub(crate) fn reset(&self) {
        self.session.send_replace(Session::Disconnected);
        *self.pending() = None;
    }

    fn pending(&self) -> std::sync::MutexGuard<'_, Option<Instant>> {
        self.requested_at
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Record a new request at `now` unless a fresh one is still in flight.
    fn begin_request(&self, now: Instant) -> bool {
        let mut pending = self.pending();
        if let Some(at) = *pending {
            if now.saturating_duration_since(at) < self.stale_after {
                return false;
            }
        }
        *pending = Some(now);
        true
    }

    /// Enqueue a signed login frame on the private class.
    ///
    /// Does nothing when already authorized or when a request issued less than
    /// `login_stale_after` ago is still unanswered. The frame is queued even if
    /// the private class is not connected yet; it goes out once it is.
    #[instrument(skip(self))]
    pub async fn login(&self) -> Result<(), ExchangeError> {
        if self.is_authorized() {
            return Ok(());
        }

        let signer = self.signer.as_ref().ok_or_else(|| {
            ExchangeError::AuthError("login requires API credentials".to_string())
        })?;

        if !self.begin_request(Instant::now()) {
            debug!("login already in flight");
            return Ok(());
        }

        let frame = signer
            .login_args(Utc::now())
            .and_then(|args| to_args(&args))
            .and_then(|args| build_request(Operation::Login, &[args], None));
        let frame = match frame {
            Ok(frame) => frame,
            Err(err) => {
                *self.pending() = None;
                return Err(err);
            }
        };

        self.private_tx
            .send(frame)
            .await
            .map_err(|_| ExchangeError::NotConnected("private outbound queue closed".to_string()))?;
        info!("login requested");
        Ok(())
    }

    /// Classify a login acknowledgement received at `now`.
    pub(crate) fn on_login_frame(&self, now: Instant) -> LoginOutcome {
        {
            let mut pending = self.pending();
            if let Some(at) = *pending {
                if now.saturating_duration_since(at) > self.stale_after {
                    *pending = None;
                    return LoginOutcome::Stale;
                }
            }
        }

        self.mark_authorized();
        LoginOutcome::Fresh
    }

    /// Resolve once the private class is authorized.
    ///
    /// Issues a login first if needed and re-issues it every poll interval
    /// (suppressed while the pending one is fresh). There is no deadline; the
    /// wait ends early when `cancel` fires or when the private transport is
    /// down or torn down, the latter with [`ExchangeError::NotConnected`].
    pub async fn wait_for_authorization(
        &self,
        cancel: &CancellationToken,
    ) -> Result<(), ExchangeError> {
        let mut session = self.session.subscribe();
        match *session.borrow_and_update() {
            Session::Authorized => return Ok(()),
            Session::Disconnected => return Err(disconnected()),
            Session::Connected => {}
        }

        self.login().await?;

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            match *session.borrow_and_update() {
                Session::Authorized => return Ok(()),
                Session::Disconnected => {
                    debug!("private transport closed during authorization wait");
                    return Err(disconnected());
                }
                Session::Connected => {}
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return Err(ExchangeError::Cancelled(CancelledOp::Authorization));
                }
                changed = session.changed() => {
                    if changed.is_err() {
                        return Err(ExchangeError::ConnectionClosed);
                    }
                }
                _ = ticker.tick() => {
                    tokio::select! {
                        () = cancel.cancelled() => {
                            return Err(ExchangeError::Cancelled(CancelledOp::Authorization));
                        }
                        result = self.login() => {
                            if let Err(err) = result {
                                warn!(error = %err, "login re-request failed");
                                return Err(err);
                            }
                        }
                    }
                }
            }
        }
    }
}

fn disconnected() -> ExchangeError {
    ExchangeError::NotConnected("private connection closed before authorization".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tokio::sync::mpsc::error::TryRecvError;

    fn authenticator(signed: bool) -> (Arc<Authenticator>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(8);
        let signer = signed.then(|| Arc::new(OkxSigner::new("key".into(), "secret".into(), "phrase".into())));
        (
            Arc::new(Authenticator::new(signer, tx, &WsConfig::default())),
            rx,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_is_suppressed_while_pending() {
        let (auth, mut rx) = authenticator(true);

        auth.login().await.unwrap();
        tokio::time::advance(Duration::from_secs(10)).await;
        auth.login().await.unwrap();

        let frame: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(frame["op"], "login");
        assert_eq!(frame["args"][0]["apiKey"], "key");
        assert_eq!(frame["args"][0]["passphrase"], "phrase");
        assert!(frame["args"][0]["sign"].as_str().is_some());
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_is_reissued_after_stale_window() {
        let (auth, mut rx) = authenticator(true);

        auth.login().await.unwrap();
        tokio::time::advance(Duration::from_secs(31)).await;
        auth.login().await.unwrap();

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_login_noop_when_authorized() {
        let (auth, mut rx) = authenticator(true);
        auth.mark_authorized();
        auth.login().await.unwrap();
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn test_login_without_credentials() {
        let (auth, _rx) = authenticator(false);
        assert!(matches!(
            auth.login().await,
            Err(ExchangeError::AuthError(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_frame_freshness() {
        let (auth, _rx) = authenticator(true);
        auth.login().await.unwrap();

        let now = Instant::now();
        assert_eq!(auth.on_login_frame(now + Duration::from_secs(31)), LoginOutcome::Stale);
        assert!(!auth.is_authorized());

        // pending marker is cleared, so the next ack counts as fresh
        assert_eq!(auth.on_login_frame(now + Duration::from_secs(40)), LoginOutcome::Fresh);
        assert!(auth.is_authorized());
    }

    #[tokio::test]
    async fn test_reset_clears_authorization() {
        let (auth, mut rx) = authenticator(true);
        auth.login().await.unwrap();
        auth.on_login_frame(Instant::now());
        auth.reset();

        assert!(!auth.is_authorized());
        rx.try_recv().unwrap();
        auth.login().await.unwrap();
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_wait_resolves_on_authorization() {
        let (auth, _rx) = authenticator(true);
        auth.on_connected();
        let cancel = CancellationToken::new();

        let waiter = {
            let auth = Arc::clone(&auth);
            let cancel = cancel.clone();
            tokio::spawn(async move { auth.wait_for_authorization(&cancel).await })
        };

        tokio::task::yield_now().await;
        auth.on_login_frame(Instant::now());
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_wait_is_cancellable() {
        let (auth, _rx) = authenticator(true);
        auth.on_connected();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = auth.wait_for_authorization(&cancel).await;
        assert!(matches!(
            result,
            Err(ExchangeError::Cancelled(CancelledOp::Authorization))
        ));
    }

    #[tokio::test]
    async fn test_wait_fails_without_private_transport() {
        let (auth, mut rx) = authenticator(true);
        let result = auth.wait_for_authorization(&CancellationToken::new()).await;
        assert!(matches!(result, Err(ExchangeError::NotConnected(_))));
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn test_wait_ends_when_transport_is_lost() {
        let (auth, mut rx) = authenticator(true);
        auth.on_connected();
        let cancel = CancellationToken::new();

        let waiter = {
            let auth = Arc::clone(&auth);
            let cancel = cancel.clone();
            tokio::spawn(async move { auth.wait_for_authorization(&cancel).await })
        };

        assert!(rx.recv().await.is_some());
        auth.reset();

        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(ExchangeError::NotConnected(_))));
        assert!(!cancel.is_cancelled());
    }
}
