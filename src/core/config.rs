use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::env;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Server cluster the client talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    #[default]
    Default,
    Aws,
    Demo,
    Business,
}

impl FromStr for Destination {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" | "default" => Ok(Self::Default),
            "aws" => Ok(Self::Aws),
            "demo" => Ok(Self::Demo),
            "business" => Ok(Self::Business),
            other => Err(ConfigError::InvalidConfiguration(format!(
                "Unknown destination '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Default => "default",
            Self::Aws => "aws",
            Self::Demo => "demo",
            Self::Business => "business",
        };
        f.write_str(name)
    }
}

/// Resolved REST and WebSocket endpoints for one destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub rest: String,
    pub public_ws: String,
    pub private_ws: String,
}

impl Destination {
    pub fn endpoints(self) -> Endpoints {
        let (rest, public_ws, private_ws) = match self {
            Self::Default => (
                "https://www.okx.com",
                "wss://ws.okx.com:8443/ws/v5/public",
                "wss://ws.okx.com:8443/ws/v5/private",
            ),
            Self::Aws => (
                "https://aws.okx.com",
                "wss://wsaws.okx.com:8443/ws/v5/public",
                "wss://wsaws.okx.com:8443/ws/v5/private",
            ),
            Self::Demo => (
                "https://www.okx.com",
                "wss://wspap.okx.com:8443/ws/v5/public?brokerId=9999",
                "wss://wspap.okx.com:8443/ws/v5/private?brokerId=9999",
            ),
            Self::Business => (
                "https://www.okx.com",
                "wss://ws.okx.com:8443/ws/v5/business",
                "wss://ws.okx.com:8443/ws/v5/business",
            ),
        };
        Endpoints {
            rest: rest.to_string(),
            public_ws: public_ws.to_string(),
            private_ws: private_ws.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    pub api_key: Secret<String>,
    pub secret_key: Secret<String>,
    pub passphrase: Secret<String>,
    pub destination: Destination,
    /// Local address outgoing sockets are bound to
    pub local_ip: Option<IpAddr>,
    pub rest_url: Option<String>,
    pub public_ws_url: Option<String>,
    pub private_ws_url: Option<String>,
}

// Never expose secrets in serialization
impl Serialize for ExchangeConfig {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("ExchangeConfig", 8)?;
        state.serialize_field("api_key", "[REDACTED]")?;
        state.serialize_field("secret_key", "[REDACTED]")?;
        state.serialize_field("passphrase", "[REDACTED]")?;
        state.serialize_field("destination", &self.destination)?;
        state.serialize_field("local_ip", &self.local_ip)?;
        state.serialize_field("rest_url", &self.rest_url)?;
        state.serialize_field("public_ws_url", &self.public_ws_url)?;
        state.serialize_field("private_ws_url", &self.private_ws_url)?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for ExchangeConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct ExchangeConfigHelper {
            api_key: String,
            secret_key: String,
            passphrase: String,
            #[serde(default)]
            destination: Destination,
            #[serde(default)]
            local_ip: Option<IpAddr>,
            #[serde(default)]
            rest_url: Option<String>,
            #[serde(default)]
            public_ws_url: Option<String>,
            #[serde(default)]
            private_ws_url: Option<String>,
        }

        let helper = ExchangeConfigHelper::deserialize(deserializer)?;
        Ok(Self {
            api_key: Secret::new(helper.api_key),
            secret_key: Secret::new(helper.secret_key),
            passphrase: Secret::new(helper.passphrase),
            destination: helper.destination,
            local_ip: helper.local_ip,
            rest_url: helper.rest_url,
            public_ws_url: helper.public_ws_url,
            private_ws_url: helper.private_ws_url,
        })
    }
}

impl ExchangeConfig {
    /// Create a new configuration with API credentials
    #[must_use]
    pub fn new(api_key: String, secret_key: String, passphrase: String) -> Self {
        Self {
            api_key: Secret::new(api_key),
            secret_key: Secret::new(secret_key),
            passphrase: Secret::new(passphrase),
            destination: Destination::Default,
            local_ip: None,
            rest_url: None,
            public_ws_url: None,
            private_ws_url: None,
        }
    }

    /// Create configuration from environment variables
    ///
    /// Expected environment variables:
    /// - `{PREFIX}_API_KEY`
    /// - `{PREFIX}_SECRET_KEY`
    /// - `{PREFIX}_PASSPHRASE`
    /// - `{PREFIX}_DESTINATION` (optional: default, aws, demo, business)
    /// - `{PREFIX}_LOCAL_IP` (optional)
    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        let prefix = prefix.to_uppercase();
        let var = |name: &str| format!("{}_{}", prefix, name);
        let required = |name: &str| {
            let key = var(name);
            env::var(&key).map_err(|_| ConfigError::MissingEnvironmentVariable(key))
        };

        let api_key = required("API_KEY")?;
        let secret_key = required("SECRET_KEY")?;
        let passphrase = required("PASSPHRASE")?;

        let destination = env::var(var("DESTINATION"))
            .ok()
            .map(|d| d.parse::<Destination>())
            .transpose()?
            .unwrap_or_default();

        let local_ip = env::var(var("LOCAL_IP"))
            .ok()
            .map(|ip| {
                ip.parse::<IpAddr>().map_err(|e| {
                    ConfigError::InvalidConfiguration(format!("Invalid local IP '{}': {}", ip, e))
                })
            })
            .transpose()?;

        Ok(Self {
            destination,
            local_ip,
            ..Self::new(api_key, secret_key, passphrase)
        })
    }

    /// Create configuration from .env file and environment variables
    ///
    /// **Security Warning**: Never commit .env files to version control!
    #[cfg(feature = "env-file")]
    pub fn from_env_file(prefix: &str) -> Result<Self, ConfigError> {
        Self::from_env_file_with_path(prefix, ".env")
    }

    /// Create configuration from a specific .env file path
    #[cfg(feature = "env-file")]
    pub fn from_env_file_with_path(prefix: &str, env_file_path: &str) -> Result<Self, ConfigError> {
        match dotenv::from_path(env_file_path) {
            Ok(()) => {}
            Err(dotenv::Error::Io(io_err)) if io_err.kind() == std::io::ErrorKind::NotFound => {
                // fall back to the process environment
            }
            Err(e) => {
                return Err(ConfigError::InvalidConfiguration(format!(
                    "Failed to load .env file '{}': {}",
                    env_file_path, e
                )));
            }
        }

        Self::from_env(prefix)
    }

    /// Configuration for market data only; the private class cannot log in.
    #[must_use]
    pub fn read_only() -> Self {
        Self::new(String::new(), String::new(), String::new())
    }

    /// Check if this configuration can sign the private login handshake
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.api_key.expose_secret().is_empty()
            && !self.secret_key.expose_secret().is_empty()
            && !self.passphrase.expose_secret().is_empty()
    }

    #[must_use]
    pub const fn destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    #[must_use]
    pub const fn local_ip(mut self, ip: IpAddr) -> Self {
        self.local_ip = Some(ip);
        self
    }

    /// Override the WebSocket endpoints chosen by the destination
    #[must_use]
    pub fn ws_urls(mut self, public: String, private: String) -> Self {
        self.public_ws_url = Some(public);
        self.private_ws_url = Some(private);
        self
    }

    #[must_use]
    pub fn rest_url(mut self, rest_url: String) -> Self {
        self.rest_url = Some(rest_url);
        self
    }

    /// Endpoints of the destination with any explicit overrides applied
    pub fn endpoints(&self) -> Endpoints {
        let defaults = self.destination.endpoints();
        Endpoints {
            rest: self.rest_url.clone().unwrap_or(defaults.rest),
            public_ws: self.public_ws_url.clone().unwrap_or(defaults.public_ws),
            private_ws: self.private_ws_url.clone().unwrap_or(defaults.private_ws),
        }
    }

    /// Get API key (use carefully - exposes secret)
    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }

    /// Get secret key (use carefully - exposes secret)
    pub fn secret_key(&self) -> &str {
        self.secret_key.expose_secret()
    }

    /// Get passphrase (use carefully - exposes secret)
    pub fn passphrase(&self) -> &str {
        self.passphrase.expose_secret()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvironmentVariable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization_redacts_secrets() {
        let config = ExchangeConfig::new("key".into(), "secret".into(), "phrase".into());
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("\"secret\""));
        assert!(!json.contains("\"phrase\""));
        assert_eq!(json.matches("[REDACTED]").count(), 3);
    }

    #[test]
    fn test_from_env_reads_prefixed_variables() {
        env::set_var("CFGTEST_API_KEY", "k");
        env::set_var("CFGTEST_SECRET_KEY", "s");
        env::set_var("CFGTEST_PASSPHRASE", "p");
        env::set_var("CFGTEST_DESTINATION", "demo");
        env::set_var("CFGTEST_LOCAL_IP", "10.0.0.7");

        let config = ExchangeConfig::from_env("cfgtest").unwrap();
        assert!(config.has_credentials());
        assert_eq!(config.passphrase(), "p");
        assert_eq!(config.destination, Destination::Demo);
        assert_eq!(config.local_ip, Some("10.0.0.7".parse().unwrap()));
    }

    #[test]
    fn test_from_env_missing_passphrase() {
        env::set_var("CFGMISSING_API_KEY", "k");
        env::set_var("CFGMISSING_SECRET_KEY", "s");

        let err = ExchangeConfig::from_env("cfgmissing").unwrap_err();
        assert!(err.to_string().contains("CFGMISSING_PASSPHRASE"));
    }

    #[test]
    fn test_endpoint_overrides() {
        let config = ExchangeConfig::read_only()
            .destination(Destination::Aws)
            .ws_urls("ws://localhost:1".into(), "ws://localhost:2".into());
        let endpoints = config.endpoints();
        assert_eq!(endpoints.rest, "https://aws.okx.com");
        assert_eq!(endpoints.public_ws, "ws://localhost:1");
        assert_eq!(endpoints.private_ws, "ws://localhost:2");
        assert!(!config.has_credentials());
    }

    #[test]
    fn test_business_destination_shares_endpoint() {
        let endpoints = Destination::Business.endpoints();
        assert_eq!(endpoints.public_ws, endpoints.private_ws);
        assert!("nowhere".parse::<Destination>().is_err());
    }
}
