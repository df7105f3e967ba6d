//! The narrow configuration surface the core depends on directly (§4.11).
//! File loading, hot-reload, and environment overlay belong to the
//! out-of-scope outer configuration loader; this crate only ever sees an
//! already-constructed [`GatewayConfig`] value.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub executor: ExecutorConfig,
    pub client: ClientConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig { executor: ExecutorConfig::default(), client: ClientConfig::default() }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Per-operation cap on outbound subgraph requests (§3, §4.4 step 3).
    pub max_requests: u32,
    /// Boundary ids batched per lookup document for scalar-argument
    /// boundary fields (§4.5).
    pub boundary_batch_size: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig { max_requests: 500, boundary_batch_size: 50 }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// 0 means unlimited (§4.2).
    pub max_response_size: u64,
    pub user_agent: String,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            max_response_size: 0,
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}
