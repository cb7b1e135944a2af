//! Provider registry
//!
//! Enumerates registered wallet providers in a fixed priority order (in-app
//! first, then generic injected objects), preferring any provider already
//! holding a public key. Connect/disconnect goes through here so session
//! state has exactly one writer, and provider-side events are re-emitted as
//! normalized [`SessionEvent`]s for dependent UI.

use crate::errors::{ClientError, Result};
use crate::provider::{ConnectionState, WalletHandle, WalletProvider};
use crate::session::Session;
use crate::types::SessionEvent;
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Registry of known wallet providers and owner of the session identity
pub struct ProviderRegistry {
    providers: RwLock<Vec<Arc<dyn WalletProvider>>>,
    active: RwLock<Option<Arc<dyn WalletProvider>>>,
    session: Arc<Session>,
    events: broadcast::Sender<SessionEvent>,
}

impl ProviderRegistry {
    pub fn new(session: Arc<Session>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            providers: RwLock::new(Vec::new()),
            active: RwLock::new(None),
            session,
            events,
        }
    }

    /// Register a provider. Priority is by kind (in-app before injected),
    /// then registration order within a kind.
    pub async fn register(&self, provider: Arc<dyn WalletProvider>) {
        let mut providers = self.providers.write().await;
        providers.push(provider);
        providers.sort_by_key(|p| p.kind());
    }

    /// Subscribe to normalized connect/disconnect events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Enumerate providers and return a capability-probed handle for the best
    /// candidate, or `None` when nothing is injected. A provider already
    /// holding a public key wins over an unconnected higher-priority one.
    pub async fn discover(&self) -> Option<WalletHandle> {
        let providers = self.providers.read().await;
        let best = providers
            .iter()
            .find(|p| p.connected_key().is_some())
            .or_else(|| providers.first())?;
        Some(handle_for(best.as_ref()))
    }

    /// Connect to the single available candidate.
    ///
    /// Auto-selection is only permitted when exactly one candidate exists or
    /// one is already connected; otherwise the caller gets
    /// `ProviderChoiceRequired` and must surface a selection.
    pub async fn connect(&self) -> Result<Pubkey> {
        let candidate = {
            let providers = self.providers.read().await;
            if providers.is_empty() {
                return Err(ClientError::ProviderMissing);
            }
            if let Some(connected) = providers.iter().find(|p| p.connected_key().is_some()) {
                Arc::clone(connected)
            } else if providers.len() == 1 {
                Arc::clone(&providers[0])
            } else {
                return Err(ClientError::ProviderChoiceRequired(
                    providers.iter().map(|p| p.id().to_string()).collect(),
                ));
            }
        };
        self.connect_provider(candidate).await
    }

    /// Connect to an explicitly chosen provider by id
    pub async fn connect_to(&self, provider_id: &str) -> Result<Pubkey> {
        let candidate = {
            let providers = self.providers.read().await;
            providers
                .iter()
                .find(|p| p.id() == provider_id)
                .cloned()
                .ok_or(ClientError::ProviderMissing)?
        };
        self.connect_provider(candidate).await
    }

    async fn connect_provider(&self, provider: Arc<dyn WalletProvider>) -> Result<Pubkey> {
        if provider.capabilities().is_empty() {
            warn!(provider = provider.id(), "provider exposes no send methods");
        }
        let key = provider.connect().await?;
        info!(provider = provider.id(), key = %key, "wallet connected");

        self.session.set_identity(key).await;
        *self.active.write().await = Some(provider);
        let _ = self.events.send(SessionEvent::Connected(key));
        Ok(key)
    }

    /// Disconnect and clear local session state unconditionally. Never fails;
    /// provider-side errors are logged and swallowed.
    pub async fn disconnect(&self) {
        if let Some(provider) = self.active.write().await.take() {
            provider.disconnect().await;
            debug!(provider = provider.id(), "wallet disconnected");
        }
        self.session.clear().await;
        let _ = self.events.send(SessionEvent::Disconnected);
    }

    /// The currently connected provider, if any
    pub async fn active(&self) -> Option<Arc<dyn WalletProvider>> {
        self.active.read().await.clone()
    }

    /// Connect if not already connected, returning the session identity
    pub async fn ensure_connected(&self) -> Result<Pubkey> {
        if let Some(provider) = self.active().await {
            if let Some(key) = provider.connected_key() {
                return Ok(key);
            }
        }
        self.connect().await
    }
}

fn handle_for(provider: &dyn WalletProvider) -> WalletHandle {
    let key = provider.connected_key();
    WalletHandle {
        provider_id: provider.id().to_string(),
        public_key: key,
        capabilities: provider.capabilities(),
        connection_state: if key.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ProviderKind, SendCapabilities, SendMethod};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakeProvider {
        id: &'static str,
        kind: ProviderKind,
        key: Pubkey,
        connected: AtomicBool,
        reject: bool,
    }

    impl FakeProvider {
        fn new(id: &'static str, kind: ProviderKind) -> Self {
            Self {
                id,
                kind,
                key: Pubkey::new_unique(),
                connected: AtomicBool::new(false),
                reject: false,
            }
        }
    }

    #[async_trait]
    impl WalletProvider for FakeProvider {
        fn id(&self) -> &str {
            self.id
        }
        fn kind(&self) -> ProviderKind {
            self.kind
        }
        fn capabilities(&self) -> SendCapabilities {
            SendCapabilities::from_methods(&[SendMethod::SignOnly])
        }
        fn connected_key(&self) -> Option<Pubkey> {
            self.connected.load(Ordering::SeqCst).then_some(self.key)
        }
        async fn connect(&self) -> Result<Pubkey> {
            if self.reject {
                return Err(ClientError::ConnectRejected);
            }
            self.connected.store(true, Ordering::SeqCst);
            Ok(self.key)
        }
        async fn disconnect(&self) {
            self.connected.store(false, Ordering::SeqCst);
        }
    }

    fn registry() -> ProviderRegistry {
        ProviderRegistry::new(Arc::new(Session::new()))
    }

    #[tokio::test]
    async fn test_no_providers_is_missing() {
        let reg = registry();
        assert!(reg.discover().await.is_none());
        assert!(matches!(reg.connect().await, Err(ClientError::ProviderMissing)));
    }

    #[tokio::test]
    async fn test_single_candidate_auto_connects() {
        let reg = registry();
        reg.register(Arc::new(FakeProvider::new("solflare", ProviderKind::Injected)))
            .await;

        let mut events = reg.subscribe();
        let key = reg.connect().await.unwrap();
        assert_eq!(events.recv().await.unwrap(), SessionEvent::Connected(key));
    }

    #[tokio::test]
    async fn test_multiple_candidates_require_choice() {
        let reg = registry();
        reg.register(Arc::new(FakeProvider::new("phantom", ProviderKind::Injected)))
            .await;
        reg.register(Arc::new(FakeProvider::new("solflare", ProviderKind::Injected)))
            .await;

        match reg.connect().await {
            Err(ClientError::ProviderChoiceRequired(ids)) => assert_eq!(ids.len(), 2),
            other => panic!("expected choice required, got {other:?}"),
        }

        // An explicit choice still works.
        reg.connect_to("solflare").await.unwrap();
    }

    #[tokio::test]
    async fn test_in_app_provider_ranks_first() {
        let reg = registry();
        reg.register(Arc::new(FakeProvider::new("phantom", ProviderKind::Injected)))
            .await;
        reg.register(Arc::new(FakeProvider::new("in-app", ProviderKind::InApp)))
            .await;

        let handle = reg.discover().await.unwrap();
        assert_eq!(handle.provider_id, "in-app");
        assert_eq!(handle.connection_state, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_already_connected_preferred_over_priority() {
        let reg = registry();
        let injected = Arc::new(FakeProvider::new("phantom", ProviderKind::Injected));
        injected.connected.store(true, Ordering::SeqCst);
        reg.register(Arc::new(FakeProvider::new("in-app", ProviderKind::InApp)))
            .await;
        reg.register(injected).await;

        let handle = reg.discover().await.unwrap();
        assert_eq!(handle.provider_id, "phantom");
        assert_eq!(handle.connection_state, ConnectionState::Connected);

        // connect() must not demand a choice when one is already connected
        reg.connect().await.unwrap();
    }

    #[tokio::test]
    async fn test_disconnect_clears_session_and_never_fails() {
        let session = Arc::new(Session::new());
        let reg = ProviderRegistry::new(Arc::clone(&session));
        reg.register(Arc::new(FakeProvider::new("phantom", ProviderKind::Injected)))
            .await;
        reg.connect().await.unwrap();
        assert!(session.state().await.connected);

        reg.disconnect().await;
        assert!(!session.state().await.connected);

        // Disconnecting with nothing active is still fine.
        reg.disconnect().await;
    }

    #[tokio::test]
    async fn test_connect_rejected_surfaces() {
        let reg = registry();
        let mut p = FakeProvider::new("phantom", ProviderKind::Injected);
        p.reject = true;
        reg.register(Arc::new(p)).await;

        assert!(matches!(reg.connect().await, Err(ClientError::ConnectRejected)));
    }
}
