pub mod core;
pub mod exchanges;

pub use core::config::{Destination, ExchangeConfig};
pub use core::errors::{CancelledOp, ExchangeError};
pub use core::kernel::{TeardownScope, WsConfig};
pub use exchanges::okx::{ClientWs, ClientWsBuilder, ConnectionClass, Sinks};
