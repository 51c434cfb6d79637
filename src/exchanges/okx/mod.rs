//! OKX v5 WebSocket client.
//!
//! [`ClientWs`] keeps one public and one private connection, authenticates
//! the private one and routes inbound frames to application sinks and topic
//! processors.

pub mod auth;
pub mod builder;
pub mod client;
pub mod connection;
pub mod dispatcher;
pub mod events;
pub mod pipeline;
pub mod processor;
pub mod rest;
pub mod signer;
pub mod subscription;
pub mod trade;
pub mod types;

pub use auth::Authenticator;
pub use builder::{build_client, ClientWsBuilder};
pub use client::ClientWs;
pub use connection::{ConnectionClass, PerClass};
pub use dispatcher::{Dispatcher, Sinks};
pub use events::{
    Argument, ChannelUpdate, Envelope, ErrorEvent, EventKind, LoginEvent, SubscribeEvent,
    SuccessEvent, UnsubscribeEvent,
};
pub use pipeline::{PING, PONG};
pub use processor::{ChannelRouter, TopicProcessor};
pub use rest::{build_rest, OkxRest};
pub use signer::OkxSigner;
pub use subscription::{build_args, route_class, DEPTH_CHANNEL_MARKER};
pub use trade::Trade;
pub use types::{
    build_request, to_args, Args, LoginArgs, OkxAmendRequest, OkxCancelRequest, OkxOrderRequest,
    OkxResponse, Operation,
};
