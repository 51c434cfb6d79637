use anyhow::Context;
use okx_ws::exchanges::okx::{Args, ChannelRouter, ClientWsBuilder, ConnectionClass, Sinks};
use okx_ws::ExchangeConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Market data needs no credentials; OKX_* variables are picked up when set.
    let config = ExchangeConfig::from_env("OKX").unwrap_or_else(|_| ExchangeConfig::read_only());

    let tickers = Arc::new(ChannelRouter::new());
    let (ticker_tx, mut ticker_rx) = mpsc::channel(64);
    tickers.route("tickers", ticker_tx);

    let (error_tx, mut error_rx) = mpsc::channel(16);
    let (subscribe_tx, mut subscribe_rx) = mpsc::channel(16);

    let client = ClientWsBuilder::new(config)
        .with_public_processor(tickers)
        .with_sinks(Sinks {
            error: Some(error_tx),
            subscribe: Some(subscribe_tx),
            ..Sinks::default()
        })
        .build();

    let inst = Args::from([("instId".to_string(), "BTC-USDT".to_string())]);
    client
        .subscribe(ConnectionClass::Public, &["tickers"], &inst)
        .await
        .context("subscribe to tickers")?;

    let deadline = tokio::time::sleep(Duration::from_secs(30));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            () = &mut deadline => break,
            Some(ack) = subscribe_rx.recv() => println!("subscribed: {:?}", ack.arg),
            Some(update) = ticker_rx.recv() => println!("ticker: {:?}", update.data),
            Some(error) = error_rx.recv() => println!("error {}: {}", error.code, error.msg),
        }
    }

    client.shutdown();
    Ok(())
}
