//! Gateway configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the gateway's HTTP client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Service name used in logs.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Request timeout
    #[serde(default = "default_timeout", with = "duration_secs")]
    pub timeout: Duration,

    /// User agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_service_name() -> String {
    "shopify".into()
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    format!("shopify-graphql/{}", env!("CARGO_PKG_VERSION"))
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            timeout: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config: GatewayConfig = serde_json::from_str("{}").expect("config");
        assert_eq!(config, GatewayConfig::default());
        assert!(config.user_agent.starts_with("shopify-graphql/"));
    }

    #[test]
    fn timeout_is_in_seconds() {
        let config: GatewayConfig =
            serde_json::from_str(r#"{"service_name": "orders", "timeout": 5}"#).expect("config");
        assert_eq!(config.service_name, "orders");
        assert_eq!(config.timeout, Duration::from_secs(5));

        let encoded = serde_json::to_value(&config).expect("encode");
        assert_eq!(encoded["timeout"], 5);
    }
}
