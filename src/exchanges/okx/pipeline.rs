//! Per-class send and receive workers.
//!
//! Both workers of one transport share its cancellation scope. Whichever
//! exits first tears the transport down, which cancels the other.

use crate::core::errors::{CancelledOp, ExchangeError};
use crate::core::kernel::{WsSink, WsStream};
use crate::exchanges::okx::client::Shared;
use crate::exchanges::okx::connection::{ping_due, ConnectionClass};
use crate::exchanges::okx::events::{Envelope, ErrorEvent};
use futures_util::{SinkExt, StreamExt};
use std::future::Future;
use std::sync::Arc;
use tokio::time::{timeout, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn, Instrument};

/// Keep-alive request frame
pub const PING: &str = "ping";
/// Keep-alive reply frame; never dispatched
pub const PONG: &str = "pong";

pub(crate) fn spawn_workers(
    shared: &Arc<Shared>,
    class: ConnectionClass,
    generation: u64,
    cancel: CancellationToken,
    sink: WsSink,
    stream: WsStream,
) {
    let sender = run_sender(Arc::clone(shared), class, cancel.clone(), sink);
    tokio::spawn(
        supervise(Arc::clone(shared), class, generation, CancelledOp::Sender, sender)
            .instrument(tracing::info_span!("sender", %class, generation)),
    );

    let receiver = run_receiver(Arc::clone(shared), class, cancel, stream);
    tokio::spawn(
        supervise(Arc::clone(shared), class, generation, CancelledOp::Receiver, receiver)
            .instrument(tracing::info_span!("receiver", %class, generation)),
    );
}

/// Run a worker to completion, then tear its transport down and report the
/// failure unless it was a cancellation.
async fn supervise<F>(
    shared: Arc<Shared>,
    class: ConnectionClass,
    generation: u64,
    role: CancelledOp,
    worker: F,
) where
    F: Future<Output = Result<(), ExchangeError>>,
{
    let result = worker.await;
    shared.teardown(class, generation).await;

    match result {
        Ok(()) => debug!("worker finished"),
        Err(err) if err.is_cancelled() => debug!(error = %err, "worker cancelled"),
        Err(err) => {
            warn!(error = %err, "worker failed");
            shared.report_error(ErrorEvent::local(format!("{class} {role}: {err}")));
        }
    }
}

async fn run_sender(
    shared: Arc<Shared>,
    class: ConnectionClass,
    cancel: CancellationToken,
    mut sink: WsSink,
) -> Result<(), ExchangeError> {
    let slot = &shared.classes[class];
    let config = &shared.config;

    // A previous sender of this class may still hold the queue while it winds down.
    let mut outbound = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(shared.handle_cancel(CancelledOp::Sender)),
        outbound = slot.outbound() => outbound,
    };

    let mut ticker = tokio::time::interval(config.ping_tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let result = loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break Err(shared.handle_cancel(CancelledOp::Sender)),
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    break Err(ExchangeError::ConnectionClosed);
                };
                trace!(%frame, "write");
                match timeout(config.write_wait, sink.send(Message::Text(frame))).await {
                    Err(_) => break Err(ExchangeError::WriteTimeout(config.write_wait)),
                    Ok(Err(err)) => break Err(err),
                    Ok(Ok(())) => slot.touch(),
                }
            }
            _ = ticker.tick() => {
                if ping_due(slot.idle_for(), config.ping_period) {
                    // Queued from a separate task so a full queue never stalls the ticker
                    let tx = slot.outbound_sender();
                    tokio::spawn(async move {
                        let _ = tx.send(PING.to_string()).await;
                    });
                }
            }
        }
    };

    let _ = timeout(config.write_wait, sink.close()).await;
    result
}

async fn run_receiver(
    shared: Arc<Shared>,
    class: ConnectionClass,
    cancel: CancellationToken,
    mut stream: WsStream,
) -> Result<(), ExchangeError> {
    let slot = &shared.classes[class];
    let read_wait = shared.config.read_wait;

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(shared.handle_cancel(CancelledOp::Receiver)),
            next = timeout(read_wait, stream.next()) => next,
        };

        let message = match next {
            Err(_) => return Err(ExchangeError::ReadTimeout(read_wait)),
            Ok(None) => return Err(ExchangeError::ConnectionClosed),
            Ok(Some(message)) => message?,
        };
        slot.touch();

        let text = match message {
            Message::Text(text) => text,
            Message::Close(frame) => {
                debug!(?frame, "close frame received");
                return Err(ExchangeError::ConnectionClosed);
            }
            _ => continue,
        };
        if text == PONG {
            trace!("pong");
            continue;
        }

        let envelope: Envelope = serde_json::from_str(&text).map_err(|err| {
            ExchangeError::DeserializationError(format!("unclassifiable frame {text:?}: {err}"))
        })?;

        let dispatcher = Arc::clone(&shared.dispatcher);
        tokio::spawn(async move {
            dispatcher.dispatch(&text, envelope).await;
        });
    }
}
