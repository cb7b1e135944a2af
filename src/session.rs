//! Session and balance cache
//!
//! One owned object holding the connected identity, token decimals and the
//! last-known balance. Mutated only through the provider registry's
//! connect/disconnect handlers; every other component reads it per call.
//! A wallet switch clears the balance because derived account addresses
//! depend on the owner.

use solana_sdk::pubkey::Pubkey;
use tokio::sync::RwLock;

/// Snapshot handed to link-visibility and label-rendering collaborators
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub connected: bool,
    /// Abbreviated base58 identity, e.g. `9xQe..4fYd`
    pub short_identity: Option<String>,
}

#[derive(Debug, Default)]
struct SessionInner {
    identity: Option<Pubkey>,
    decimals: Option<u8>,
    last_balance_base_units: Option<u64>,
}

/// Process-wide session cache
#[derive(Debug, Default)]
pub struct Session {
    inner: RwLock<SessionInner>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a newly-connected identity, invalidating cached balance
    pub async fn set_identity(&self, identity: Pubkey) {
        let mut inner = self.inner.write().await;
        if inner.identity != Some(identity) {
            inner.last_balance_base_units = None;
        }
        inner.identity = Some(identity);
    }

    /// Clear all session state. Called on disconnect, unconditionally.
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        *inner = SessionInner::default();
    }

    pub async fn identity(&self) -> Option<Pubkey> {
        self.inner.read().await.identity
    }

    pub async fn set_decimals(&self, decimals: u8) {
        self.inner.write().await.decimals = Some(decimals);
    }

    pub async fn set_balance(&self, base_units: u64) {
        self.inner.write().await.last_balance_base_units = Some(base_units);
    }

    pub async fn state(&self) -> SessionState {
        let inner = self.inner.read().await;
        SessionState {
            connected: inner.identity.is_some(),
            short_identity: inner.identity.map(shorten),
        }
    }

    /// Last-known balance converted with the cached decimals, or `None`
    /// when either is unknown
    pub async fn display_balance(&self) -> Option<f64> {
        let inner = self.inner.read().await;
        let base = inner.last_balance_base_units?;
        let decimals = inner.decimals?;
        Some(base as f64 / 10f64.powi(decimals as i32))
    }
}

fn shorten(key: Pubkey) -> String {
    let s = key.to_string();
    format!("{}..{}", &s[..4], &s[s.len() - 4..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disconnected_state() {
        let session = Session::new();
        let state = session.state().await;
        assert!(!state.connected);
        assert!(state.short_identity.is_none());
        assert!(session.display_balance().await.is_none());
    }

    #[tokio::test]
    async fn test_connected_short_identity() {
        let session = Session::new();
        let key = Pubkey::new_unique();
        session.set_identity(key).await;

        let state = session.state().await;
        assert!(state.connected);
        let short = state.short_identity.unwrap();
        let full = key.to_string();
        assert!(short.starts_with(&full[..4]));
        assert!(short.ends_with(&full[full.len() - 4..]));
    }

    #[tokio::test]
    async fn test_display_balance_uses_decimals() {
        let session = Session::new();
        session.set_identity(Pubkey::new_unique()).await;
        session.set_decimals(6).await;
        session.set_balance(2_500_000).await;
        assert_eq!(session.display_balance().await, Some(2.5));
    }

    #[tokio::test]
    async fn test_wallet_switch_invalidates_balance() {
        let session = Session::new();
        session.set_identity(Pubkey::new_unique()).await;
        session.set_decimals(6).await;
        session.set_balance(1_000_000).await;

        session.set_identity(Pubkey::new_unique()).await;
        assert!(session.display_balance().await.is_none());
    }

    #[tokio::test]
    async fn test_clear_resets_everything() {
        let session = Session::new();
        session.set_identity(Pubkey::new_unique()).await;
        session.set_balance(42).await;
        session.clear().await;
        assert!(!session.state().await.connected);
        assert!(session.identity().await.is_none());
    }
}
