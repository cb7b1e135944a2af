//! Universal sender
//!
//! Bridges a [`TxPlan`] to whatever signing surface the active provider
//! exposes. Exactly one path is attempted per call, chosen by strict
//! priority: transact session, sign-and-broadcast, sign-only, legacy
//! multi-sign. Sign-only artifacts are submitted raw with a bounded
//! node-side retry budget and a best-effort confirmation wait whose failure
//! never invalidates the returned signature.

use crate::api::ApiClient;
use crate::errors::{ClientError, Result};
use crate::provider::{ProviderResponse, SendMethod, WalletProvider};
use crate::tx_builder::TxPlan;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_sdk::commitment_config::CommitmentLevel;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct UniversalSender {
    rpc: Arc<RpcClient>,
    api: Arc<ApiClient>,
    /// Retries the RPC node applies when rebroadcasting a raw transaction;
    /// this is the broadcast layer's own budget, not a resend of the action
    broadcast_retries: u32,
}

impl UniversalSender {
    pub fn new(rpc: Arc<RpcClient>, api: Arc<ApiClient>, broadcast_retries: u32) -> Self {
        Self {
            rpc,
            api,
            broadcast_retries,
        }
    }

    /// Sign and broadcast the plan through the provider, returning the
    /// normalized transaction signature.
    ///
    /// Fee payer and blockhash are lazy-filled immediately before first use:
    /// some call sites hand over a bare plan and expect the sender to finish
    /// it.
    pub async fn send(&self, mut plan: TxPlan, provider: &dyn WalletProvider) -> Result<Signature> {
        if plan.fee_payer.is_none() {
            plan.fee_payer = Some(provider.connected_key().ok_or_else(|| {
                ClientError::submission("plan has no fee payer and provider is not connected")
            })?);
        }
        if plan.recent_blockhash.is_none() {
            plan.recent_blockhash = Some(self.api.latest_blockhash().await?);
        }

        let method = provider
            .capabilities()
            .best()
            .ok_or(ClientError::NoSendMethod)?;
        let tx = plan.into_transaction()?;

        debug!(provider = provider.id(), path = ?method, "sending transaction");
        let signature = match method {
            SendMethod::TransactSession => {
                normalize_signature(provider.transact_session(tx).await?)?
            }
            SendMethod::SignAndSend => normalize_signature(provider.sign_and_send(tx).await?)?,
            SendMethod::SignOnly => {
                let artifact = provider.sign_transaction(tx).await?;
                self.broadcast_signed(&artifact).await?
            }
            SendMethod::MultiSign => {
                let mut artifacts = provider.sign_all_transactions(vec![tx]).await?;
                let artifact = artifacts
                    .pop()
                    .ok_or_else(|| ClientError::submission("provider returned empty batch"))?;
                self.broadcast_signed(&artifact).await?
            }
        };

        info!(signature = %signature, path = ?method, "transaction submitted");
        Ok(signature)
    }

    /// Deserialize a signed artifact and submit it raw: first attempt with
    /// preflight, one retry with preflight skipped, then a best-effort
    /// confirmation wait.
    async fn broadcast_signed(&self, artifact: &[u8]) -> Result<Signature> {
        let tx: Transaction = bincode::deserialize(artifact)
            .map_err(|e| ClientError::submission(format!("malformed signed artifact: {e}")))?;

        let config = RpcSendTransactionConfig {
            skip_preflight: false,
            preflight_commitment: Some(CommitmentLevel::Confirmed),
            max_retries: Some(self.broadcast_retries as usize),
            ..Default::default()
        };

        let signature = match self.rpc.send_transaction_with_config(&tx, config).await {
            Ok(sig) => sig,
            Err(first) => {
                warn!(error = %first, "broadcast rejected, retrying with preflight skipped");
                let retry = RpcSendTransactionConfig {
                    skip_preflight: true,
                    ..config
                };
                self.rpc
                    .send_transaction_with_config(&tx, retry)
                    .await
                    .map_err(|e| ClientError::submission(e.to_string()))?
            }
        };

        // Confirmation here is advisory; the transaction's ledger fate is
        // already out of our hands.
        match self.rpc.confirm_transaction(&signature).await {
            Ok(confirmed) => debug!(signature = %signature, confirmed, "confirmation wait done"),
            Err(e) => debug!(signature = %signature, error = %e, "confirmation wait failed"),
        }

        Ok(signature)
    }
}

/// Normalize the heterogeneous provider return shapes to a signature:
/// either a plain string or a `{"signature": ...}` / `{"txHash": ...}`
/// wrapper.
pub fn normalize_signature(response: ProviderResponse) -> Result<Signature> {
    let raw = match &response {
        serde_json::Value::String(s) => Some(s.as_str()),
        serde_json::Value::Object(map) => map
            .get("signature")
            .or_else(|| map.get("txHash"))
            .and_then(|v| v.as_str()),
        _ => None,
    };
    let raw =
        raw.ok_or_else(|| ClientError::submission(format!("unrecognized response: {response}")))?;
    Signature::from_str(raw)
        .map_err(|e| ClientError::submission(format!("invalid signature '{raw}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ProviderKind, SendCapabilities};
    use async_trait::async_trait;
    use solana_sdk::{hash::Hash, pubkey::Pubkey, signature::Keypair, signer::Signer,
        system_instruction};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Provider whose every path records an invocation and succeeds
    struct CountingProvider {
        key: Pubkey,
        caps: SendCapabilities,
        calls: [AtomicUsize; 4],
        artifact: Vec<u8>,
    }

    impl CountingProvider {
        fn new(methods: &[SendMethod]) -> Self {
            Self {
                key: Pubkey::new_unique(),
                caps: SendCapabilities::from_methods(methods),
                calls: Default::default(),
                artifact: b"not a transaction".to_vec(),
            }
        }

        fn calls_for(&self, method: SendMethod) -> usize {
            let idx = SendMethod::RANKED.iter().position(|m| *m == method).unwrap();
            self.calls[idx].load(Ordering::SeqCst)
        }

        fn record(&self, method: SendMethod) {
            let idx = SendMethod::RANKED.iter().position(|m| *m == method).unwrap();
            self.calls[idx].fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl WalletProvider for CountingProvider {
        fn id(&self) -> &str {
            "counting"
        }
        fn kind(&self) -> ProviderKind {
            ProviderKind::Injected
        }
        fn capabilities(&self) -> SendCapabilities {
            self.caps
        }
        fn connected_key(&self) -> Option<Pubkey> {
            Some(self.key)
        }
        async fn connect(&self) -> Result<Pubkey> {
            Ok(self.key)
        }
        async fn disconnect(&self) {}

        async fn transact_session(&self, _tx: Transaction) -> Result<ProviderResponse> {
            self.record(SendMethod::TransactSession);
            Ok(serde_json::json!(Signature::default().to_string()))
        }
        async fn sign_and_send(&self, _tx: Transaction) -> Result<ProviderResponse> {
            self.record(SendMethod::SignAndSend);
            Ok(serde_json::json!({ "signature": Signature::default().to_string() }))
        }
        async fn sign_transaction(&self, _tx: Transaction) -> Result<Vec<u8>> {
            self.record(SendMethod::SignOnly);
            Ok(self.artifact.clone())
        }
        async fn sign_all_transactions(&self, txs: Vec<Transaction>) -> Result<Vec<Vec<u8>>> {
            self.record(SendMethod::MultiSign);
            Ok(txs.iter().map(|_| self.artifact.clone()).collect())
        }
    }

    fn sender() -> UniversalSender {
        let rpc = Arc::new(RpcClient::new("http://127.0.0.1:1".to_string()));
        let api = Arc::new(ApiClient::new("http://127.0.0.1:1", Duration::from_secs(1)).unwrap());
        UniversalSender::new(rpc, api, 3)
    }

    fn complete_plan(fee_payer: Pubkey) -> TxPlan {
        let ix = system_instruction::transfer(&fee_payer, &Pubkey::new_unique(), 1);
        TxPlan::new(vec![ix])
            .with_fee_payer(fee_payer)
            .with_blockhash(Hash::new_unique())
    }

    #[tokio::test]
    async fn test_no_send_method() {
        let provider = CountingProvider::new(&[]);
        let err = sender()
            .send(complete_plan(provider.key), &provider)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::NoSendMethod));
    }

    #[tokio::test]
    async fn test_highest_priority_path_wins_and_no_second_attempt() {
        let provider = CountingProvider::new(&[
            SendMethod::SignAndSend,
            SendMethod::SignOnly,
            SendMethod::MultiSign,
        ]);
        sender()
            .send(complete_plan(provider.key), &provider)
            .await
            .unwrap();

        assert_eq!(provider.calls_for(SendMethod::SignAndSend), 1);
        assert_eq!(provider.calls_for(SendMethod::TransactSession), 0);
        assert_eq!(provider.calls_for(SendMethod::SignOnly), 0);
        assert_eq!(provider.calls_for(SendMethod::MultiSign), 0);
    }

    #[tokio::test]
    async fn test_transact_session_outranks_everything() {
        let provider = CountingProvider::new(&[
            SendMethod::MultiSign,
            SendMethod::TransactSession,
            SendMethod::SignAndSend,
        ]);
        sender()
            .send(complete_plan(provider.key), &provider)
            .await
            .unwrap();
        assert_eq!(provider.calls_for(SendMethod::TransactSession), 1);
        assert_eq!(provider.calls_for(SendMethod::SignAndSend), 0);
    }

    #[tokio::test]
    async fn test_sign_only_malformed_artifact_is_submission_failed() {
        // The artifact is garbage bytes: path 3 must fail with
        // SubmissionFailed before any broadcast, not silently succeed.
        let provider = CountingProvider::new(&[SendMethod::SignOnly]);
        let err = sender()
            .send(complete_plan(provider.key), &provider)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::SubmissionFailed(_)));
        assert_eq!(provider.calls_for(SendMethod::SignOnly), 1);
    }

    #[tokio::test]
    async fn test_lazy_fill_fee_payer_from_provider() {
        let provider = CountingProvider::new(&[SendMethod::SignAndSend]);
        let ix = system_instruction::transfer(&provider.key, &Pubkey::new_unique(), 1);
        // Bare plan with only a blockhash; fee payer comes from the provider
        let plan = TxPlan::new(vec![ix]).with_blockhash(Hash::new_unique());

        sender().send(plan, &provider).await.unwrap();
        assert_eq!(provider.calls_for(SendMethod::SignAndSend), 1);
    }

    #[tokio::test]
    async fn test_multi_sign_empty_batch_rejected() {
        struct EmptyBatch(CountingProvider);

        #[async_trait]
        impl WalletProvider for EmptyBatch {
            fn id(&self) -> &str {
                "empty-batch"
            }
            fn kind(&self) -> ProviderKind {
                ProviderKind::Injected
            }
            fn capabilities(&self) -> SendCapabilities {
                SendCapabilities::from_methods(&[SendMethod::MultiSign])
            }
            fn connected_key(&self) -> Option<Pubkey> {
                Some(self.0.key)
            }
            async fn connect(&self) -> Result<Pubkey> {
                Ok(self.0.key)
            }
            async fn disconnect(&self) {}
            async fn sign_all_transactions(&self, _txs: Vec<Transaction>) -> Result<Vec<Vec<u8>>> {
                Ok(vec![])
            }
        }

        let provider = EmptyBatch(CountingProvider::new(&[SendMethod::MultiSign]));
        let err = sender()
            .send(complete_plan(provider.0.key), &provider)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::SubmissionFailed(_)));
    }

    #[test]
    fn test_normalize_plain_string() {
        let keypair = Keypair::new();
        let sig = keypair.sign_message(b"x");
        let normalized = normalize_signature(serde_json::json!(sig.to_string())).unwrap();
        assert_eq!(normalized, sig);
    }

    #[test]
    fn test_normalize_wrapped_shapes() {
        let sig = Signature::default().to_string();
        assert!(normalize_signature(serde_json::json!({ "signature": sig })).is_ok());
        assert!(normalize_signature(serde_json::json!({ "txHash": sig })).is_ok());
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        assert!(normalize_signature(serde_json::json!(42)).is_err());
        assert!(normalize_signature(serde_json::json!({ "other": "field" })).is_err());
        assert!(normalize_signature(serde_json::json!("not-base58!!")).is_err());
    }
}
