use crate::core::config::ExchangeConfig;
use crate::core::kernel::{TeardownScope, TungsteniteDialer, WsConfig, WsDialer};
use crate::exchanges::okx::auth::Authenticator;
use crate::exchanges::okx::client::{ClientWs, Shared};
use crate::exchanges::okx::connection::{ClassSlot, ConnectionClass, PerClass};
use crate::exchanges::okx::dispatcher::{Dispatcher, Sinks};
use crate::exchanges::okx::processor::{ChannelRouter, TopicProcessor};
use crate::exchanges::okx::signer::OkxSigner;
use std::sync::Arc;

/// Builder for the OKX streaming client
///
/// Endpoints and credentials come from the [`ExchangeConfig`]; timing policy
/// from [`WsConfig`]. Without explicit topic processors each class gets an
/// empty [`ChannelRouter`].
pub struct ClientWsBuilder {
    config: ExchangeConfig,
    ws_config: WsConfig,
    dialer: Option<Arc<dyn WsDialer>>,
    public_processor: Option<Arc<dyn TopicProcessor>>,
    private_processor: Option<Arc<dyn TopicProcessor>>,
    sinks: Sinks,
}

impl ClientWsBuilder {
    pub fn new(config: ExchangeConfig) -> Self {
        let ws_config = WsConfig::default().with_local_ip(config.local_ip);
        Self {
            config,
            ws_config,
            dialer: None,
            public_processor: None,
            private_processor: None,
            sinks: Sinks::default(),
        }
    }

    /// Replace the timing policy; the config's `local_ip` is kept unless the
    /// new policy sets one.
    #[must_use]
    pub fn with_ws_config(mut self, ws_config: WsConfig) -> Self {
        let local_ip = ws_config.local_ip.or(self.config.local_ip);
        self.ws_config = ws_config.with_local_ip(local_ip);
        self
    }

    #[must_use]
    pub fn with_teardown_scope(mut self, scope: TeardownScope) -> Self {
        self.ws_config = self.ws_config.with_teardown_scope(scope);
        self
    }

    /// Use a custom socket dialer instead of tokio-tungstenite
    #[must_use]
    pub fn with_dialer(mut self, dialer: Arc<dyn WsDialer>) -> Self {
        self.dialer = Some(dialer);
        self
    }

    #[must_use]
    pub fn with_public_processor(mut self, processor: Arc<dyn TopicProcessor>) -> Self {
        self.public_processor = Some(processor);
        self
    }

    #[must_use]
    pub fn with_private_processor(mut self, processor: Arc<dyn TopicProcessor>) -> Self {
        self.private_processor = Some(processor);
        self
    }

    #[must_use]
    pub fn with_sinks(mut self, sinks: Sinks) -> Self {
        self.sinks = sinks;
        self
    }

    pub fn build(self) -> ClientWs {
        let endpoints = self.config.endpoints();
        let capacity = self.ws_config.outbound_capacity;
        let classes = PerClass::new(
            ClassSlot::new(ConnectionClass::Public, endpoints.public_ws, capacity),
            ClassSlot::new(ConnectionClass::Private, endpoints.private_ws, capacity),
        );

        let signer = self.config.has_credentials().then(|| {
            Arc::new(OkxSigner::new(
                self.config.api_key().to_string(),
                self.config.secret_key().to_string(),
                self.config.passphrase().to_string(),
            ))
        });
        let auth = Arc::new(Authenticator::new(
            signer,
            classes[ConnectionClass::Private].outbound_sender(),
            &self.ws_config,
        ));

        let processors = PerClass::new(
            self.public_processor
                .unwrap_or_else(|| Arc::new(ChannelRouter::new())),
            self.private_processor
                .unwrap_or_else(|| Arc::new(ChannelRouter::new())),
        );
        let dispatcher = Arc::new(Dispatcher::new(self.sinks, processors, Arc::clone(&auth)));

        let dialer = self
            .dialer
            .unwrap_or_else(|| Arc::new(TungsteniteDialer::new(&self.ws_config)));

        ClientWs::from_shared(Shared::new(
            self.ws_config,
            classes,
            auth,
            dispatcher,
            dialer,
        ))
    }
}

/// Client for `config` with default timing, dialer and topic processors
pub fn build_client(config: ExchangeConfig) -> ClientWs {
    ClientWsBuilder::new(config).build()
}
