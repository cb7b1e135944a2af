//! Wallet provider abstraction
//!
//! Injected wallets expose wildly different signing surfaces. Instead of
//! duck-typing method presence at every call site, each provider is probed
//! once at discovery time into a typed [`SendCapabilities`] set; the
//! universal sender then picks the highest-priority supported path.

mod keypair;
mod registry;

pub use keypair::KeypairProvider;
pub use registry::ProviderRegistry;

use crate::errors::{ClientError, Result};
use async_trait::async_trait;
use solana_sdk::{pubkey::Pubkey, transaction::Transaction};

/// A signing/broadcast API shape a provider may expose, in strict priority
/// order. The sender attempts exactly one path per call: the highest
/// supported one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendMethod {
    /// Callback-style "run with an ephemeral signing session" (mobile in-app)
    TransactSession,
    /// Sign and submit in one provider call
    SignAndSend,
    /// Sign only; the sender serializes and submits to RPC itself
    SignOnly,
    /// Legacy batch signing; used as a batch of one, then as sign-only
    MultiSign,
}

impl SendMethod {
    /// All methods, highest priority first
    pub const RANKED: [SendMethod; 4] = [
        SendMethod::TransactSession,
        SendMethod::SignAndSend,
        SendMethod::SignOnly,
        SendMethod::MultiSign,
    ];

    fn bit(self) -> u8 {
        match self {
            Self::TransactSession => 1 << 0,
            Self::SignAndSend => 1 << 1,
            Self::SignOnly => 1 << 2,
            Self::MultiSign => 1 << 3,
        }
    }
}

/// Set of send methods a provider supports, computed once at discovery time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendCapabilities(u8);

impl SendCapabilities {
    pub const NONE: SendCapabilities = SendCapabilities(0);

    pub fn from_methods(methods: &[SendMethod]) -> Self {
        let mut caps = Self::NONE;
        for m in methods {
            caps.0 |= m.bit();
        }
        caps
    }

    pub fn supports(&self, method: SendMethod) -> bool {
        self.0 & method.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// The highest-priority supported method, if any
    pub fn best(&self) -> Option<SendMethod> {
        SendMethod::RANKED.into_iter().find(|m| self.supports(*m))
    }
}

/// Connection lifecycle of a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Where a provider sits in the discovery priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProviderKind {
    /// First-party mobile in-app wallet object, checked first
    InApp,
    /// Generic flagged injected wallet
    Injected,
}

/// Uniform, capability-probed view of a discovered provider
#[derive(Debug, Clone)]
pub struct WalletHandle {
    pub provider_id: String,
    pub public_key: Option<Pubkey>,
    pub capabilities: SendCapabilities,
    pub connection_state: ConnectionState,
}

impl WalletHandle {
    /// Base58 public key string, if connected
    pub fn public_key_string(&self) -> Option<String> {
        self.public_key.map(|k| k.to_string())
    }
}

/// Opaque value a provider hands back from a broadcast-capable path.
///
/// Wallets disagree on the return shape: some give a plain signature string,
/// others wrap it as `{"signature": ...}` (or `txHash`). Normalization lives
/// in the sender.
pub type ProviderResponse = serde_json::Value;

/// A wallet provider. Implementations only override the send paths they
/// actually support; the defaults reject, and [`WalletProvider::capabilities`]
/// must agree with what is overridden.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Stable identifier used for selection surfaces and logging
    fn id(&self) -> &str;

    fn kind(&self) -> ProviderKind;

    /// Capability probe; computed once at discovery, not re-probed per call
    fn capabilities(&self) -> SendCapabilities;

    /// Public key currently authorized, if any
    fn connected_key(&self) -> Option<Pubkey>;

    /// Request authorization. `ConnectRejected` when the user declines.
    async fn connect(&self) -> Result<Pubkey>;

    /// Clear provider-side session state. Never fails.
    async fn disconnect(&self);

    /// Priority 1: ephemeral signing session that signs and broadcasts
    async fn transact_session(&self, _tx: Transaction) -> Result<ProviderResponse> {
        Err(ClientError::submission("transact session not supported"))
    }

    /// Priority 2: sign and submit in one call
    async fn sign_and_send(&self, _tx: Transaction) -> Result<ProviderResponse> {
        Err(ClientError::submission("sign-and-send not supported"))
    }

    /// Priority 3: sign and return the serialized signed transaction
    async fn sign_transaction(&self, _tx: Transaction) -> Result<Vec<u8>> {
        Err(ClientError::submission("sign-only not supported"))
    }

    /// Priority 4: sign a batch, returning serialized signed transactions
    async fn sign_all_transactions(&self, _txs: Vec<Transaction>) -> Result<Vec<Vec<u8>>> {
        Err(ClientError::submission("multi-sign not supported"))
    }
}
