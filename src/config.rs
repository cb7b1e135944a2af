//! Configuration for the $TREATZ client
//!
//! Two layers: a local TOML file (API base, RPC endpoint, wallet keypair,
//! settlement timing) and a remote payload fetched from the backend's
//! `GET /config` (mint, vaults, decimals, ticket price). The remote layer is
//! cached after the first successful fetch and retried lazily on the next
//! user attempt when unavailable.

use serde::{Deserialize, Serialize};

/// Local application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Backend API configuration
    pub api: ApiConfig,

    /// Solana RPC configuration
    pub rpc: RpcConfig,

    /// Wallet configuration
    #[serde(default)]
    pub wallet: WalletConfig,

    /// Settlement polling configuration
    #[serde(default)]
    pub settlement: SettlementConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Backend base URL, e.g. `https://api.trickortreatsol.tech/api`
    pub base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_api_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// RPC endpoint for account reads and raw broadcast
    pub url: String,

    /// Max retries the RPC node applies when rebroadcasting a raw transaction
    #[serde(default = "default_broadcast_retries")]
    pub broadcast_retries: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Path to a keypair file for the local signing provider
    #[serde(default)]
    pub keypair_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementConfig {
    /// Seconds between settlement polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Wall-clock budget before an unresolved action is reported indeterminate
    #[serde(default = "default_poll_timeout")]
    pub timeout_secs: u64,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            timeout_secs: default_poll_timeout(),
        }
    }
}

// Default value functions
fn default_api_timeout() -> u64 { 15 }
fn default_broadcast_retries() -> u32 { 3 }
fn default_poll_interval() -> u64 { 2 }
fn default_poll_timeout() -> u64 { 120 }

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration with `.env` overrides applied first
    pub fn from_file_with_env(path: &str) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_file(path)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                base_url: "http://127.0.0.1:8000/api".to_string(),
                timeout_secs: default_api_timeout(),
            },
            rpc: RpcConfig {
                url: "https://api.mainnet-beta.solana.com".to_string(),
                broadcast_retries: default_broadcast_retries(),
            },
            wallet: WalletConfig::default(),
            settlement: SettlementConfig::default(),
        }
    }
}

/// Remote configuration served by `GET /config`.
///
/// An empty `mint` means the deployment runs SOL-only; value transfers then
/// use the system program and no token accounts are resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Token mint address; empty or absent for SOL-only deployments
    #[serde(default)]
    pub mint: Option<String>,

    /// Token decimals for display conversion
    #[serde(default = "default_token_decimals")]
    pub token_decimals: u8,

    /// Coin-flip deposit vault (owner wallet, not an ATA)
    pub game_vault: String,

    /// Raffle deposit vault
    pub jackpot_vault: String,

    /// Optional precomputed vault ATAs, used as-is when present
    #[serde(default)]
    pub game_vault_ata: Option<String>,
    #[serde(default)]
    pub jackpot_vault_ata: Option<String>,

    /// Raffle ticket price in smallest units
    #[serde(default = "default_ticket_price")]
    pub ticket_price: u64,

    /// Optional token-program hint (`"token"` or `"token-2022"`); the
    /// resolver still verifies against the ledger when reachable
    #[serde(default)]
    pub token_program: Option<String>,
}

fn default_token_decimals() -> u8 { 6 }
fn default_ticket_price() -> u64 { 1_000_000 }

impl RemoteConfig {
    /// The configured mint, if this deployment uses an SPL token
    pub fn mint_address(&self) -> Option<&str> {
        self.mint.as_deref().filter(|m| !m.is_empty())
    }
}
