use crate::core::config::{Destination, ExchangeConfig};
use crate::core::errors::ExchangeError;
use crate::core::kernel::{RestClient, RestClientBuilder, RestClientConfig, ReqwestRest};
use crate::exchanges::okx::signer::OkxSigner;
use crate::exchanges::okx::types::{OkxOrderRequest, OkxResponse};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Signed request/response calls against the OKX REST API
#[derive(Debug)]
pub struct OkxRest<R: RestClient> {
    rest_client: R,
}

impl<R: RestClient> OkxRest<R> {
    pub fn new(rest_client: R) -> Self {
        Self { rest_client }
    }

    /// Maps OKX error codes to `ExchangeError` variants
    fn map_okx_error(code: &str, message: &str) -> ExchangeError {
        match code {
            "50101" | "50102" | "50103" | "50104" | "50105" | "50111" | "50113" => {
                ExchangeError::AuthError(format!("{} - {}", code, message))
            }
            "51000" => ExchangeError::InvalidParameters(format!("{} - {}", code, message)),
            _ => ExchangeError::ApiError {
                code: code.parse().unwrap_or(-1),
                message: message.to_string(),
            },
        }
    }

    /// Unwrap the `{code, msg, data}` wrapper
    fn handle_response<T: DeserializeOwned>(response: OkxResponse<T>) -> Result<T, ExchangeError> {
        if response.code != "0" {
            return Err(Self::map_okx_error(&response.code, &response.msg));
        }
        response.into_result()
    }

    /// Server time in milliseconds
    pub async fn get_system_time(&self) -> Result<u64, ExchangeError> {
        let response = self
            .rest_client
            .get_json("/api/v5/public/time", &[], false)
            .await?;
        let items: Vec<HashMap<String, String>> = Self::handle_response(response)?;

        let timestamp = items
            .first()
            .and_then(|item| item.get("ts"))
            .ok_or_else(|| {
                ExchangeError::DeserializationError("Missing timestamp in response".to_string())
            })?;

        timestamp
            .parse::<u64>()
            .map_err(|e| ExchangeError::DeserializationError(format!("Invalid timestamp: {}", e)))
    }

    /// Trading account balance, optionally limited to comma-separated `ccy`
    pub async fn get_balance(&self, ccy: Option<&str>) -> Result<Vec<Value>, ExchangeError> {
        let query_params: Vec<(&str, &str)> = ccy.map(|ccy| ("ccy", ccy)).into_iter().collect();
        let response = self
            .rest_client
            .get_json("/api/v5/account/balance", &query_params, true)
            .await?;
        Self::handle_response(response)
    }

    /// Place one order; per-order results are in the returned data
    pub async fn place_order(&self, order: &OkxOrderRequest) -> Result<Vec<Value>, ExchangeError> {
        let body = serde_json::to_value(order)?;
        let response = self
            .rest_client
            .post_json("/api/v5/trade/order", &body, true)
            .await?;
        Self::handle_response(response)
    }
}

/// REST client for the destination and credentials of `config`
///
/// Requests are signed when credentials are present; the demo destination
/// marks them as simulated trading.
pub fn build_rest(config: &ExchangeConfig) -> Result<OkxRest<ReqwestRest>, ExchangeError> {
    let rest_config = RestClientConfig::new(config.endpoints().rest, "okx".to_string());
    let mut builder = RestClientBuilder::new(rest_config);

    if config.has_credentials() {
        let signer = OkxSigner::new(
            config.api_key().to_string(),
            config.secret_key().to_string(),
            config.passphrase().to_string(),
        )
        .simulated(config.destination == Destination::Demo);
        builder = builder.with_signer(Arc::new(signer));
    }

    Ok(OkxRest::new(builder.build()?))
}
