//! Classification of inbound frames.
//!
//! Each frame is matched against a fixed precedence: protocol errors,
//! subscribe and unsubscribe acknowledgements, login acknowledgements, the
//! private then the public topic processor, and finally correlated command
//! responses. A correlated response with a non-zero code is re-classified as
//! an error so command failures land in the same sink as protocol errors.

use crate::exchanges::okx::auth::{Authenticator, LoginOutcome};
use crate::exchanges::okx::connection::{ConnectionClass, PerClass};
use crate::exchanges::okx::events::{
    Envelope, ErrorEvent, EventKind, LoginEvent, SubscribeEvent, SuccessEvent, UnsubscribeEvent,
};
use crate::exchanges::okx::processor::TopicProcessor;
use futures_util::future::{BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Notification sinks the application attaches to receive classified events.
///
/// Unset sinks drop their events.
#[derive(Debug, Clone, Default)]
pub struct Sinks {
    pub error: Option<mpsc::Sender<ErrorEvent>>,
    pub subscribe: Option<mpsc::Sender<SubscribeEvent>>,
    pub unsubscribe: Option<mpsc::Sender<UnsubscribeEvent>>,
    pub login: Option<mpsc::Sender<LoginEvent>>,
    pub success: Option<mpsc::Sender<SuccessEvent>>,
}

pub struct Dispatcher {
    sinks: RwLock<Sinks>,
    processors: PerClass<Arc<dyn TopicProcessor>>,
    auth: Arc<Authenticator>,
}

impl Dispatcher {
    pub(crate) fn new(
        sinks: Sinks,
        processors: PerClass<Arc<dyn TopicProcessor>>,
        auth: Arc<Authenticator>,
    ) -> Self {
        Self {
            sinks: RwLock::new(sinks),
            processors,
            auth,
        }
    }

    fn sinks(&self) -> Sinks {
        self.sinks
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn update_sinks(&self, update: impl FnOnce(&mut Sinks)) {
        let mut sinks = self
            .sinks
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        update(&mut sinks);
    }

    /// Route one frame; `false` means nothing claimed it.
    pub fn dispatch<'a>(&'a self, frame: &'a str, envelope: Envelope) -> BoxFuture<'a, bool> {
        async move {
            let sinks = self.sinks();

            match envelope.event {
                EventKind::Error => {
                    let mut event: ErrorEvent = decode(frame, "error");
                    if event.event.is_empty() {
                        event.event = "error".to_string();
                    }
                    detach(sinks.error, event);
                    return true;
                }
                EventKind::Subscribe => {
                    let event: SubscribeEvent = decode(frame, "subscribe");
                    if let Some(tx) = sinks.subscribe {
                        let _ = tx.send(event).await;
                    }
                    return true;
                }
                EventKind::Unsubscribe => {
                    detach(sinks.unsubscribe, decode::<UnsubscribeEvent>(frame, "unsubscribe"));
                    return true;
                }
                EventKind::Login => match self.auth.on_login_frame(Instant::now()) {
                    LoginOutcome::Fresh => {
                        detach(sinks.login, decode::<LoginEvent>(frame, "login"));
                        return true;
                    }
                    LoginOutcome::Stale => {
                        warn!("stale login acknowledgement, re-requesting");
                        if let Err(err) = self.auth.login().await {
                            warn!(error = %err, "login re-request failed");
                        }
                    }
                },
                EventKind::Other(_) | EventKind::None => {}
            }

            for class in [ConnectionClass::Private, ConnectionClass::Public] {
                if self.processors[class].process(frame, &envelope).await {
                    trace!(%class, channel = envelope.channel(), "claimed by topic processor");
                    return true;
                }
            }

            if !envelope.id.is_empty() {
                if envelope.code != 0 {
                    let failed = Envelope {
                        event: EventKind::Error,
                        ..envelope
                    };
                    return self.dispatch(frame, failed).await;
                }

                let event: SuccessEvent = decode(frame, "success");
                if let Some(tx) = sinks.success {
                    let _ = tx.send(event).await;
                }
                return true;
            }

            debug!(frame, "unroutable frame");
            false
        }
        .boxed()
    }

    /// Report a locally raised error to the error sink without blocking.
    pub(crate) fn report_error(&self, event: ErrorEvent) {
        detach(self.sinks().error, event);
    }
}

/// Decode a classified frame; a frame that does not fit its subtype yields
/// the default value.
fn decode<T: DeserializeOwned + Default>(frame: &str, kind: &'static str) -> T {
    serde_json::from_str(frame).unwrap_or_else(|err| {
        debug!(kind, error = %err, "failed to decode frame subtype");
        T::default()
    })
}

fn detach<T: Send + 'static>(sink: Option<mpsc::Sender<T>>, event: T) {
    if let Some(tx) = sink {
        tokio::spawn(async move {
            let _ = tx.send(event).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::kernel::WsConfig;
    use crate::exchanges::okx::processor::ChannelRouter;
    use crate::exchanges::okx::signer::OkxSigner;
    use std::time::Duration;
    use tokio::sync::mpsc::error::TryRecvError;

    struct Harness {
        dispatcher: Dispatcher,
        auth: Arc<Authenticator>,
        public: Arc<ChannelRouter>,
        outbound: mpsc::Receiver<String>,
        error: mpsc::Receiver<ErrorEvent>,
        subscribe: mpsc::Receiver<SubscribeEvent>,
        unsubscribe: mpsc::Receiver<UnsubscribeEvent>,
        login: mpsc::Receiver<LoginEvent>,
        success: mpsc::Receiver<SuccessEvent>,
    }

    impl Harness {
        fn new() -> Self {
            let (outbound_tx, outbound) = mpsc::channel(8);
            let signer = Arc::new(OkxSigner::new("k".into(), "s".into(), "p".into()));
            let auth = Arc::new(Authenticator::new(
                Some(signer),
                outbound_tx,
                &WsConfig::default(),
            ));

            let (error_tx, error) = mpsc::channel(8);
            let (subscribe_tx, subscribe) = mpsc::channel(8);
            let (unsubscribe_tx, unsubscribe) = mpsc::channel(8);
            let (login_tx, login) = mpsc::channel(8);
            let (success_tx, success) = mpsc::channel(8);
            let sinks = Sinks {
                error: Some(error_tx),
                subscribe: Some(subscribe_tx),
                unsubscribe: Some(unsubscribe_tx),
                login: Some(login_tx),
                success: Some(success_tx),
            };

            let public = Arc::new(ChannelRouter::new());
            let private: Arc<dyn TopicProcessor> = Arc::new(ChannelRouter::new());
            let processors = PerClass::new(Arc::clone(&public) as Arc<dyn TopicProcessor>, private);

            Self {
                dispatcher: Dispatcher::new(sinks, processors, Arc::clone(&auth)),
                auth,
                public,
                outbound,
                error,
                subscribe,
                unsubscribe,
                login,
                success,
            }
        }

        async fn dispatch(&self, frame: &str) -> bool {
            let envelope: Envelope = serde_json::from_str(frame).unwrap();
            self.dispatcher.dispatch(frame, envelope).await
        }

        async fn settle() {
            for _ in 0..4 {
                tokio::task::yield_now().await;
            }
        }

        fn assert_quiet(&mut self) {
            assert_eq!(self.error.try_recv().err(), Some(TryRecvError::Empty));
            assert_eq!(self.subscribe.try_recv().err(), Some(TryRecvError::Empty));
            assert_eq!(self.unsubscribe.try_recv().err(), Some(TryRecvError::Empty));
            assert_eq!(self.login.try_recv().err(), Some(TryRecvError::Empty));
            assert_eq!(self.success.try_recv().err(), Some(TryRecvError::Empty));
        }
    }

    #[tokio::test]
    async fn test_subscribe_ack_reaches_only_subscribe_sink() {
        let mut h = Harness::new();
        let frame = r#"{"event":"subscribe","arg":{"channel":"tickers","instId":"BTC-USDT"}}"#;
        assert!(h.dispatch(frame).await);
        Harness::settle().await;

        let ack = h.subscribe.try_recv().unwrap();
        assert_eq!(ack.event, "subscribe");
        let arg = ack.arg.unwrap();
        assert_eq!(arg.channel, "tickers");
        assert_eq!(arg.inst_id.as_deref(), Some("BTC-USDT"));
        h.assert_quiet();
    }

    #[tokio::test]
    async fn test_failed_correlated_response_is_retagged_as_error() {
        let mut h = Harness::new();
        let frame = r#"{"id":"42","code":1,"msg":"","op":"order","data":[{"sCode":"51008"}]}"#;
        assert!(h.dispatch(frame).await);

        let error = tokio::time::timeout(Duration::from_secs(1), h.error.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(error.event, "error");
        assert_eq!(error.id, "42");
        assert_eq!(error.code, 1);
        assert_eq!(error.op, "order");
        assert_eq!(error.data.len(), 1);
        h.assert_quiet();
    }

    #[tokio::test]
    async fn test_successful_correlated_response() {
        let mut h = Harness::new();
        let frame = r#"{"id":"7","op":"cancel-order","code":"0","msg":"","data":[{"ordId":"1"}],"inTime":"1","outTime":"2"}"#;
        assert!(h.dispatch(frame).await);

        let success = h.success.try_recv().unwrap();
        assert_eq!(success.id, "7");
        assert_eq!(success.op, "cancel-order");
        assert_eq!(success.out_time, "2");
        h.assert_quiet();
    }

    #[tokio::test]
    async fn test_protocol_error_and_unsubscribe() {
        let mut h = Harness::new();
        assert!(h.dispatch(r#"{"event":"error","code":"60012","msg":"Invalid request"}"#).await);
        let error = h.error.recv().await.unwrap();
        assert_eq!(error.code, 60012);
        assert_eq!(error.msg, "Invalid request");

        assert!(h.dispatch(r#"{"event":"unsubscribe","arg":{"channel":"tickers"},"connId":"a1"}"#).await);
        let ack = h.unsubscribe.recv().await.unwrap();
        assert_eq!(ack.conn_id, "a1");
        h.assert_quiet();
    }

    #[tokio::test]
    async fn test_login_ack_authorizes() {
        let mut h = Harness::new();
        h.auth.login().await.unwrap();
        assert!(!h.auth.is_authorized());

        assert!(h.dispatch(r#"{"event":"login","code":"0","msg":"","connId":"c"}"#).await);
        assert!(h.auth.is_authorized());
        assert_eq!(h.login.recv().await.unwrap().conn_id, "c");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_login_ack_relogs_in() {
        let mut h = Harness::new();
        h.auth.login().await.unwrap();
        h.outbound.try_recv().unwrap();

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(!h.dispatch(r#"{"event":"login","code":"0","msg":""}"#).await);

        assert!(!h.auth.is_authorized());
        assert!(h.outbound.try_recv().unwrap().contains(r#""op":"login""#));
        Harness::settle().await;
        assert_eq!(h.login.try_recv().err(), Some(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn test_channel_push_goes_to_processor() {
        let mut h = Harness::new();
        let (tx, mut rx) = mpsc::channel(1);
        h.public.route("tickers", tx);

        let frame = r#"{"arg":{"channel":"tickers","instId":"ETH-USDT"},"data":[{"last":"2"}]}"#;
        assert!(h.dispatch(frame).await);
        assert_eq!(rx.recv().await.unwrap().arg.inst_id.as_deref(), Some("ETH-USDT"));
        h.assert_quiet();
    }

    #[tokio::test]
    async fn test_unroutable_frame() {
        let mut h = Harness::new();
        assert!(!h.dispatch(r#"{"arg":{"channel":"unknown"},"data":[]}"#).await);
        assert!(!h.dispatch(r#"{"event":"channel-conn-count","channel":"orders"}"#).await);
        Harness::settle().await;
        h.assert_quiet();
    }

    #[tokio::test]
    async fn test_missing_sinks_are_tolerated() {
        let h = Harness::new();
        h.dispatcher.update_sinks(|sinks| *sinks = Sinks::default());
        assert!(h.dispatch(r#"{"event":"subscribe","arg":{"channel":"tickers"}}"#).await);
        assert!(h.dispatch(r#"{"id":"1","code":0}"#).await);
    }
}
