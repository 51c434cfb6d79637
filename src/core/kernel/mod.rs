//! Vendor-neutral transport kernel
//!
//! ## Transport Layer
//! - `RestClient`: signed call-and-decode HTTP client
//! - `WsDialer`: opens a duplex message socket and hands back its split halves
//!
//! ## Authentication
//! - `Signer`: pluggable REST request signing
//! - `hmac_sha256_base64`: the HMAC primitive shared by REST signing and the
//!   WebSocket login handshake
//!
//! ```rust,no_run
//! use okx_ws::core::kernel::*;
//!
//! # async fn example() -> Result<(), okx_ws::ExchangeError> {
//! let dialer = TungsteniteDialer::new(&WsConfig::default());
//! let (_sink, _stream) = dialer.dial("wss://ws.okx.com:8443/ws/v5/public").await?;
//! # Ok(())
//! # }
//! ```
pub mod rest;
pub mod signer;
pub mod ws;

pub use rest::{ReqwestRest, RestClient, RestClientBuilder, RestClientConfig};
pub use signer::{hmac_sha256_base64, SignatureResult, Signer};
pub use ws::{TeardownScope, TungsteniteDialer, WsConfig, WsDialer, WsSink, WsStream};
