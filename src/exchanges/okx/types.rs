use crate::core::errors::ExchangeError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// One argument record of an outbound operation (`{"channel": "tickers", "instId": "BTC-USDT"}`)
pub type Args = BTreeMap<String, String>;

/// Operation tag of an outbound frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    Login,
    Subscribe,
    Unsubscribe,
    Order,
    BatchOrders,
    CancelOrder,
    BatchCancelOrders,
    AmendOrder,
    BatchAmendOrders,
}

impl Operation {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
            Self::Order => "order",
            Self::BatchOrders => "batch-orders",
            Self::CancelOrder => "cancel-order",
            Self::BatchCancelOrders => "batch-cancel-orders",
            Self::AmendOrder => "amend-order",
            Self::BatchAmendOrders => "batch-amend-orders",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serialize `{"op": .., "args": [..], ..extras}` into one text frame.
///
/// Extras are written last, so an extra named `op` or `args` replaces the
/// generated field.
pub fn build_request(
    op: Operation,
    args: &[Args],
    extras: Option<&Args>,
) -> Result<String, ExchangeError> {
    let mut frame = Map::new();
    frame.insert("op".to_string(), Value::from(op.as_str()));
    frame.insert("args".to_string(), serde_json::to_value(args)?);

    for (key, value) in extras.into_iter().flatten() {
        frame.insert(key.clone(), Value::from(value.as_str()));
    }

    Ok(serde_json::to_string(&frame)?)
}

/// Flatten a request struct into an argument record; scalars are stringified
/// and `None` fields are dropped.
pub fn to_args<T: Serialize>(value: &T) -> Result<Args, ExchangeError> {
    let Value::Object(fields) = serde_json::to_value(value)? else {
        return Err(ExchangeError::InvalidParameters(
            "request must serialize to a JSON object".to_string(),
        ));
    };

    let mut args = Args::new();
    for (key, value) in fields {
        let text = match value {
            Value::Null => continue,
            Value::String(s) => s,
            other => other.to_string(),
        };
        args.insert(key, text);
    }
    Ok(args)
}

/// Signed login handshake record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LoginArgs {
    pub api_key: String,
    pub passphrase: String,
    pub timestamp: String,
    pub sign: String,
}

/// OKX Order request
#[derive(Debug, Serialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct OkxOrderRequest {
    pub inst_id: String,  // Instrument ID
    pub td_mode: String,  // Trade mode: cash, cross, isolated
    pub side: String,     // Order side: buy, sell
    pub ord_type: String, // Order type: market, limit, post_only, fok, ioc
    pub sz: String,       // Quantity to buy or sell
    #[serde(skip_serializing_if = "Option::is_none")]
    pub px: Option<String>, // Order price
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ccy: Option<String>, // Margin currency
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cl_ord_id: Option<String>, // Client order ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>, // Order tag
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pos_side: Option<String>, // Position side: long, short, net
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reduce_only: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tgt_ccy: Option<String>, // Target currency: base_ccy, quote_ccy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ban_amend: Option<bool>, // Disallow amend
}

/// Cancel request; one of `ord_id` / `cl_ord_id` identifies the order
#[derive(Debug, Serialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct OkxCancelRequest {
    pub inst_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ord_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cl_ord_id: Option<String>,
}

#[derive(Debug, Serialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct OkxAmendRequest {
    pub inst_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ord_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cl_ord_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub req_id: Option<String>, // Client amend request ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_sz: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_px: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cxl_on_fail: Option<bool>, // Cancel the order if the amend fails
}

/// OKX API standard response wrapper
#[derive(Debug, Deserialize, Serialize)]
pub struct OkxResponse<T> {
    pub code: String,
    pub msg: String,
    pub data: T,
}

impl<T> OkxResponse<T> {
    /// Unwrap `data`, turning a non-zero vendor code into an API error
    pub fn into_result(self) -> Result<T, ExchangeError> {
        if self.code == "0" {
            return Ok(self.data);
        }
        Err(ExchangeError::ApiError {
            code: self.code.parse().unwrap_or(-1),
            message: self.msg,
        })
    }
}
