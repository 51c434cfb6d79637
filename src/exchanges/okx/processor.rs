use crate::exchanges::okx::events::{ChannelUpdate, Envelope};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Decoder for the channel pushes of one connection class.
///
/// Offered every inbound frame the dispatcher could not classify as a
/// protocol control frame. Returns `true` when it consumed the frame.
#[async_trait]
pub trait TopicProcessor: Send + Sync {
    async fn process(&self, frame: &str, envelope: &Envelope) -> bool;
}

#[derive(Default)]
struct Routes {
    exact: HashMap<String, mpsc::Sender<ChannelUpdate>>,
    prefixed: Vec<(String, mpsc::Sender<ChannelUpdate>)>,
}

impl Routes {
    fn lookup(&self, channel: &str) -> Option<mpsc::Sender<ChannelUpdate>> {
        self.exact.get(channel).cloned().or_else(|| {
            self.prefixed
                .iter()
                .find(|(prefix, _)| channel.starts_with(prefix.as_str()))
                .map(|(_, tx)| tx.clone())
        })
    }
}

/// Channel-name keyed processor forwarding decoded pushes to consumer queues
///
/// A frame whose channel has no route is left unclaimed.
#[derive(Default)]
pub struct ChannelRouter {
    routes: RwLock<Routes>,
}

impl ChannelRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver pushes of exactly `channel` to `tx`
    pub fn route(&self, channel: impl Into<String>, tx: mpsc::Sender<ChannelUpdate>) {
        self.write().exact.insert(channel.into(), tx);
    }

    /// Deliver pushes of every channel starting with `prefix` (`books` covers
    /// `books5`, `books-l2-tbt`, ...) to `tx`; exact routes take precedence.
    pub fn route_prefix(&self, prefix: impl Into<String>, tx: mpsc::Sender<ChannelUpdate>) {
        let prefix = prefix.into();
        let mut routes = self.write();
        routes.prefixed.retain(|(existing, _)| *existing != prefix);
        routes.prefixed.push((prefix, tx));
    }

    pub fn remove(&self, channel: &str) {
        let mut routes = self.write();
        routes.exact.remove(channel);
        routes.prefixed.retain(|(prefix, _)| prefix != channel);
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Routes> {
        self.routes
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn lookup(&self, channel: &str) -> Option<mpsc::Sender<ChannelUpdate>> {
        self.routes
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .lookup(channel)
    }
}

#[async_trait]
impl TopicProcessor for ChannelRouter {
    async fn process(&self, frame: &str, envelope: &Envelope) -> bool {
        let Some(channel) = envelope.channel() else {
            return false;
        };
        let Some(tx) = self.lookup(channel) else {
            return false;
        };

        match serde_json::from_str::<ChannelUpdate>(frame) {
            Ok(update) => {
                if tx.send(update).await.is_err() {
                    warn!(channel, "channel consumer dropped");
                }
            }
            Err(err) => debug!(channel, error = %err, "undecodable channel push"),
        }
        true
    }
}
