use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub gateway: GatewayConfig,
    pub provider: ProviderConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    pub payout: PayoutConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

/// Payment-provider endpoints and workspace identity.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProviderConfig {
    /// Base URL of the provider REST API, e.g. `https://sandbox.api.provider.com`
    pub base_url: String,
    /// Workspace id inbound events must originate from
    pub workspace_id: String,
    /// Publicly reachable URL the provider posts events to
    pub webhook_url: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct QueueConfig {
    pub name: String,
    /// Parallel consumer workers, each with its own channel
    pub workers: usize,
    /// Startup connection attempts before giving up
    pub connect_max_attempts: u32,
    /// Fixed delay between startup connection attempts
    pub connect_retry_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: "transfers".to_string(),
            workers: 2,
            connect_max_attempts: 10,
            connect_retry_secs: 6,
        }
    }
}

/// Destination account for outgoing transfers.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PayoutConfig {
    pub bank_code: String,
    pub branch: String,
    pub account: String,
    pub name: String,
    pub tax_id: String,
    pub account_type: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JobsConfig {
    /// Seconds between reconciliation runs
    pub reconcile_interval_secs: u64,
    #[serde(default)]
    pub invoice_seed: InvoiceSeedConfig,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            reconcile_interval_secs: 86_400,
            invoice_seed: InvoiceSeedConfig::default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct InvoiceSeedConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub n_min: u32,
    pub n_max: u32,
}

impl Default for InvoiceSeedConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 60,
            n_min: 8,
            n_max: 12,
        }
    }
}

impl AppConfig {
    pub fn load(env: &str) -> Self {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .unwrap_or_else(|_| panic!("Failed to read config file: {}", config_path));
        serde_yaml::from_str(&content).expect("Failed to parse config yaml")
    }
}
