use crate::core::errors::ExchangeError;
use crate::core::kernel::{hmac_sha256_base64, Signer};
use crate::exchanges::okx::types::LoginArgs;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, Secret};
use std::collections::HashMap;

/// Path signed by the WebSocket login handshake
pub const LOGIN_VERIFY_PATH: &str = "/users/self/verify";

pub struct OkxSigner {
    api_key: Secret<String>,
    secret_key: Secret<String>,
    passphrase: Secret<String>,
    simulated: bool,
}

impl OkxSigner {
    pub fn new(api_key: String, secret_key: String, passphrase: String) -> Self {
        Self {
            api_key: Secret::new(api_key),
            secret_key: Secret::new(secret_key),
            passphrase: Secret::new(passphrase),
            simulated: false,
        }
    }

    /// Mark REST requests as demo-trading requests
    #[must_use]
    pub const fn simulated(mut self, simulated: bool) -> Self {
        self.simulated = simulated;
        self
    }

    /// Generate the signature for OKX requests
    /// The prehash string format is: timestamp + method + requestPath + body
    pub fn sign(
        &self,
        timestamp: &str,
        method: &str,
        request_path: &str,
        body: &str,
    ) -> Result<String, ExchangeError> {
        let prehash = format!("{}{}{}{}", timestamp, method, request_path, body);
        hmac_sha256_base64(self.secret_key.expose_secret().as_bytes(), &prehash)
    }

    /// REST timestamp: millisecond ISO-8601 in UTC with a literal `Z`
    pub fn iso_timestamp(at: DateTime<Utc>) -> String {
        at.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
    }

    /// Login timestamp: Unix seconds
    pub fn unix_timestamp(at: DateTime<Utc>) -> String {
        at.timestamp().to_string()
    }

    /// Build the signed `op=login` argument record
    pub fn login_args(&self, at: DateTime<Utc>) -> Result<LoginArgs, ExchangeError> {
        let timestamp = Self::unix_timestamp(at);
        let sign = self.sign(&timestamp, "GET", LOGIN_VERIFY_PATH, "")?;

        Ok(LoginArgs {
            api_key: self.api_key.expose_secret().clone(),
            passphrase: self.passphrase.expose_secret().clone(),
            timestamp,
            sign,
        })
    }
}

impl Signer for OkxSigner {
    fn sign_request(
        &self,
        method: &str,
        endpoint: &str,
        query_string: &str,
        body: &[u8],
        timestamp: u64,
    ) -> Result<(HashMap<String, String>, Vec<(String, String)>), ExchangeError> {
        let at = i64::try_from(timestamp)
            .ok()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .ok_or_else(|| ExchangeError::AuthError("Invalid timestamp".to_string()))?;
        let timestamp = Self::iso_timestamp(at);

        let request_path = if query_string.is_empty() {
            endpoint.to_string()
        } else {
            format!("{}?{}", endpoint, query_string)
        };

        let body_str = std::str::from_utf8(body)
            .map_err(|e| ExchangeError::AuthError(format!("Invalid body encoding: {}", e)))?;

        let signature = self.sign(&timestamp, method, &request_path, body_str)?;

        let mut headers = HashMap::new();
        headers.insert(
            "OK-ACCESS-KEY".to_string(),
            self.api_key.expose_secret().clone(),
        );
        headers.insert("OK-ACCESS-SIGN".to_string(), signature);
        headers.insert("OK-ACCESS-TIMESTAMP".to_string(), timestamp);
        headers.insert(
            "OK-ACCESS-PASSPHRASE".to_string(),
            self.passphrase.expose_secret().clone(),
        );
        if self.simulated {
            headers.insert("x-simulated-trading".to_string(), "1".to_string());
        }

        // Query parameters travel unchanged; the signature covers them.
        Ok((headers, Vec::new()))
    }
}
