//! TOML file configuration structures.
//!
//! These structs directly map to the `matricula-config.toml` file format.

use compact_str::CompactString;
use matricula_core::identity::{DEFAULT_CODE_HIGH, DEFAULT_CODE_LOW, IssuerConfig};
use matricula_core::processors::SweepConfig;
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;
use url::Url;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct FileConfig {
    pub server: ServerConfig,
    pub gateway: GatewayConfig,
    pub identity: IdentityConfig,
    pub fees: FeesConfig,
    pub ops: OpsConfig,
    #[serde(default)]
    pub sweep: SweepSettings,
    #[serde(default)]
    pub notify: NotifyConfig,
}

/// Server configuration section.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

fn default_listen_addr() -> SocketAddr {
    "0.0.0.0:8080".parse().expect("valid default address")
}

/// Wompi gateway credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// API base, e.g. "https://production.wompi.co/v1/".
    pub base_url: Url,
    /// Private key, sent as the bearer credential.
    pub private_key: String,
    /// Events secret, used to verify webhook checksums.
    pub events_secret: String,
}

/// Identity issuance section.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    /// Domain for institutional email addresses.
    pub email_domain: String,
    #[serde(default = "default_code_low")]
    pub code_low: u32,
    #[serde(default = "default_code_high")]
    pub code_high: u32,
}

fn default_code_low() -> u32 {
    DEFAULT_CODE_LOW
}

fn default_code_high() -> u32 {
    DEFAULT_CODE_HIGH
}

impl IdentityConfig {
    pub fn to_issuer_config(&self) -> IssuerConfig {
        IssuerConfig {
            code_low: self.code_low,
            code_high: self.code_high,
            email_domain: CompactString::from(self.email_domain.as_str()),
        }
    }
}

/// Enrollment fee charged through payment links.
#[derive(Debug, Clone, Deserialize)]
pub struct FeesConfig {
    /// Fee amount in cents of `currency`.
    pub enrollment_in_cents: i64,
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Where the payer lands after checkout.
    #[serde(default)]
    pub redirect_url: Option<Url>,
}

fn default_currency() -> String {
    "COP".to_owned()
}

/// Operator API section.
#[derive(Debug, Clone, Deserialize)]
pub struct OpsConfig {
    /// Bearer token required by the `/ops` endpoints.
    pub token: String,
}

/// Sweep scheduling section.
#[derive(Debug, Clone, Deserialize)]
pub struct SweepSettings {
    #[serde(default = "default_sweep_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_sweep_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

fn default_sweep_interval_secs() -> u64 {
    300
}

fn default_sweep_concurrency() -> usize {
    4
}

fn default_call_timeout_secs() -> u64 {
    10
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_sweep_interval_secs(),
            concurrency: default_sweep_concurrency(),
            call_timeout_secs: default_call_timeout_secs(),
        }
    }
}

impl SweepSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn to_sweep_config(&self) -> SweepConfig {
        SweepConfig {
            concurrency: self.concurrency,
            call_timeout: Duration::from_secs(self.call_timeout_secs),
        }
    }
}

/// Notice relay section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotifyConfig {
    /// Administration-system endpoint that receives payment notices as JSON.
    /// Notices are only logged when unset.
    #[serde(default)]
    pub callback_url: Option<Url>,
}
