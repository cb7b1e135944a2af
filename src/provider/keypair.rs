//! File-backed keypair provider
//!
//! Lets the CLI exercise the full orchestration path without a browser
//! wallet. A raw keypair can sign but has no embedded broadcast channel, so
//! it advertises the sign-only and legacy multi-sign paths and leaves
//! submission to the universal sender.

use crate::errors::{ClientError, Result};
use crate::provider::{ProviderKind, SendCapabilities, SendMethod, WalletProvider};
use anyhow::Context;
use async_trait::async_trait;
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    signer::keypair::keypair_from_seed,
    transaction::Transaction,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub struct KeypairProvider {
    keypair: Arc<Keypair>,
    connected: AtomicBool,
}

impl KeypairProvider {
    /// Load from a keypair file: either 64 raw bytes or the JSON byte-array
    /// format `solana-keygen` writes
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let keypair_bytes =
            std::fs::read(path).with_context(|| format!("Failed to read keypair file: {}", path))?;

        let keypair = if keypair_bytes.len() == 64 {
            if keypair_bytes.iter().all(|&b| b == 0) {
                anyhow::bail!("Invalid keypair: all-zero key rejected");
            }
            Keypair::try_from(keypair_bytes.as_slice()).context("Invalid keypair bytes")?
        } else {
            let json: Vec<u8> = serde_json::from_slice(&keypair_bytes)
                .context("Failed to parse keypair JSON")?;
            if json.len() != 64 {
                anyhow::bail!("Invalid keypair length: expected 64 bytes, got {}", json.len());
            }
            if json.iter().all(|&b| b == 0) {
                anyhow::bail!("Invalid keypair: all-zero key rejected");
            }
            Keypair::try_from(json.as_slice()).context("Invalid keypair from JSON")?
        };

        Ok(Self::from_keypair(keypair))
    }

    /// Load from a base58-encoded secret: 64-byte secret key, or a 32-byte
    /// seed as a fallback
    pub fn from_base58(encoded: &str) -> anyhow::Result<Self> {
        if encoded.is_empty() {
            anyhow::bail!("Empty secret key provided");
        }
        let raw = bs58::decode(encoded).into_vec().context("Invalid base58")?;
        let keypair = match raw.len() {
            64 => Keypair::try_from(raw.as_slice()).context("Invalid 64-byte secret key")?,
            32 => keypair_from_seed(&raw)
                .map_err(|e| anyhow::anyhow!("Invalid 32-byte seed: {e}"))?,
            n => anyhow::bail!("Invalid secret key length: {} (expected 32 or 64 bytes)", n),
        };
        Ok(Self::from_keypair(keypair))
    }

    pub fn from_keypair(keypair: Keypair) -> Self {
        Self {
            keypair: Arc::new(keypair),
            connected: AtomicBool::new(false),
        }
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    fn sign(&self, mut tx: Transaction) -> Result<Vec<u8>> {
        let blockhash = tx.message.recent_blockhash;
        tx.try_sign(&[self.keypair.as_ref()], blockhash)
            .map_err(|e| ClientError::submission(format!("signing failed: {e}")))?;
        bincode::serialize(&tx)
            .map_err(|e| ClientError::submission(format!("serialization failed: {e}")))
    }
}

#[async_trait]
impl WalletProvider for KeypairProvider {
    fn id(&self) -> &str {
        "local-keypair"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Injected
    }

    fn capabilities(&self) -> SendCapabilities {
        SendCapabilities::from_methods(&[SendMethod::SignOnly, SendMethod::MultiSign])
    }

    fn connected_key(&self) -> Option<Pubkey> {
        self.connected
            .load(Ordering::SeqCst)
            .then(|| self.keypair.pubkey())
    }

    async fn connect(&self) -> Result<Pubkey> {
        // A local keypair has no authorization prompt to decline
        self.connected.store(true, Ordering::SeqCst);
        Ok(self.keypair.pubkey())
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    async fn sign_transaction(&self, tx: Transaction) -> Result<Vec<u8>> {
        self.sign(tx)
    }

    async fn sign_all_transactions(&self, txs: Vec<Transaction>) -> Result<Vec<Vec<u8>>> {
        txs.into_iter().map(|tx| self.sign(tx)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::{hash::Hash, system_instruction};

    fn transfer_tx(payer: Pubkey) -> Transaction {
        let ix = system_instruction::transfer(&payer, &Pubkey::new_unique(), 1);
        let mut tx = Transaction::new_with_payer(&[ix], Some(&payer));
        tx.message.recent_blockhash = Hash::new_unique();
        tx
    }

    #[tokio::test]
    async fn test_sign_only_produces_decodable_artifact() {
        let provider = KeypairProvider::from_keypair(Keypair::new());
        let payer = provider.pubkey();
        provider.connect().await.unwrap();

        let bytes = provider.sign_transaction(transfer_tx(payer)).await.unwrap();
        let decoded: Transaction = bincode::deserialize(&bytes).unwrap();
        assert!(decoded.is_signed());
    }

    #[tokio::test]
    async fn test_multi_sign_batch_of_one() {
        let provider = KeypairProvider::from_keypair(Keypair::new());
        let payer = provider.pubkey();

        let artifacts = provider
            .sign_all_transactions(vec![transfer_tx(payer)])
            .await
            .unwrap();
        assert_eq!(artifacts.len(), 1);
    }

    #[tokio::test]
    async fn test_connect_disconnect_cycle() {
        let provider = KeypairProvider::from_keypair(Keypair::new());
        assert!(provider.connected_key().is_none());
        provider.connect().await.unwrap();
        assert!(provider.connected_key().is_some());
        provider.disconnect().await;
        assert!(provider.connected_key().is_none());
    }

    #[test]
    fn test_base58_seed_roundtrip() {
        let keypair = Keypair::new();
        let seed = &keypair.to_bytes()[..32];
        let encoded = bs58::encode(seed).into_string();
        let provider = KeypairProvider::from_base58(&encoded).unwrap();
        assert_eq!(provider.pubkey(), keypair.pubkey());
    }

    #[test]
    fn test_invalid_secret_lengths_rejected() {
        let encoded = bs58::encode(&[7u8; 16]).into_string();
        assert!(KeypairProvider::from_base58(&encoded).is_err());
        assert!(KeypairProvider::from_base58("").is_err());
    }
}
