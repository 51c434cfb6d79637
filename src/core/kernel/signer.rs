use crate::core::errors::ExchangeError;
use base64::engine::general_purpose;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;

/// Result type for signing operations: (headers, `query_params`)
pub type SignatureResult = Result<(HashMap<String, String>, Vec<(String, String)>), ExchangeError>;

/// Signer trait for request authentication
///
/// Implementations turn a request description into the headers and query
/// parameters the venue expects on authenticated REST calls.
pub trait Signer: Send + Sync {
    /// Sign a request and return headers and query parameters
    ///
    /// # Arguments
    /// * `method` - HTTP method (GET, POST, etc.)
    /// * `endpoint` - API endpoint path
    /// * `query_string` - Query string (without leading '?')
    /// * `body` - Raw request body bytes
    /// * `timestamp` - Request timestamp in milliseconds
    fn sign_request(
        &self,
        method: &str,
        endpoint: &str,
        query_string: &str,
        body: &[u8],
        timestamp: u64,
    ) -> SignatureResult;
}

/// base64(HMAC-SHA256(secret, payload))
pub fn hmac_sha256_base64(secret: &[u8], payload: &str) -> Result<String, ExchangeError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret)
        .map_err(|e| ExchangeError::AuthError(format!("Invalid secret key: {}", e)))?;

    mac.update(payload.as_bytes());
    Ok(general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}
