//! Associated token account resolution
//!
//! Determines which of the two token programs governs the configured mint,
//! derives canonical associated accounts (owners may be program-controlled
//! vaults, i.e. off-curve), checks existence per transaction attempt and
//! emits idempotent creation instructions when a destination is missing.
//!
//! Availability over strictness: when the governing-program lookup is
//! rate-limited or unreachable, resolution falls back to the default variant
//! instead of failing the whole action. The degradation is logged, never
//! surfaced to the user.

use crate::errors::{ClientError, Result};
use solana_account_decoder::UiAccountData;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_request::TokenAccountsFilter;
use solana_sdk::{instruction::Instruction, pubkey::Pubkey};
use spl_associated_token_account::get_associated_token_address_with_program_id;
use spl_associated_token_account::instruction::create_associated_token_account_idempotent;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Token-2022 program id; the spl-token crate only carries the classic one
pub const TOKEN_2022_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb");

/// One of the two mutually exclusive ledger programs that can govern a mint.
/// Source, destination and instruction data must all agree on the variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenProgramVariant {
    Classic,
    Token2022,
}

impl TokenProgramVariant {
    pub fn program_id(&self) -> Pubkey {
        match self {
            Self::Classic => spl_token::id(),
            Self::Token2022 => TOKEN_2022_PROGRAM_ID,
        }
    }

    /// Parse a remote-config hint (`"token"` / `"token-2022"`)
    pub fn from_hint(hint: &str) -> Option<Self> {
        match hint {
            "token" | "spl-token" => Some(Self::Classic),
            "token-2022" | "token2022" => Some(Self::Token2022),
            _ => None,
        }
    }
}

/// Deterministic token account reference for an (owner, mint, variant)
/// triple. The derivation is pure; `exists` is a snapshot fact re-checked
/// per transaction attempt and must never be cached across a wallet switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenAccountRef {
    pub owner: Pubkey,
    pub mint: Pubkey,
    pub variant: TokenProgramVariant,
    pub derived_address: Pubkey,
    pub exists: bool,
}

/// Result of destination resolution: the account to credit plus, when it
/// does not exist yet, an idempotent creation instruction safe to include
/// even if a concurrent transaction creates the same account
#[derive(Debug, Clone)]
pub struct ResolvedAccount {
    pub account: TokenAccountRef,
    pub creation_instruction: Option<Instruction>,
    pub variant: TokenProgramVariant,
}

/// Resolver over a shared RPC connection
pub struct AccountResolver {
    rpc: Arc<RpcClient>,
    /// Variant used when the ledger lookup fails
    fallback: TokenProgramVariant,
}

impl AccountResolver {
    pub fn new(rpc: Arc<RpcClient>) -> Self {
        Self {
            rpc,
            fallback: TokenProgramVariant::Classic,
        }
    }

    /// Override the fallback variant, e.g. from a remote-config hint
    pub fn with_fallback(mut self, fallback: TokenProgramVariant) -> Self {
        self.fallback = fallback;
        self
    }

    /// Pure canonical derivation. Owners are allowed off-curve (a vault may
    /// be program-controlled rather than a wallet).
    pub fn derive(owner: &Pubkey, mint: &Pubkey, variant: TokenProgramVariant) -> Pubkey {
        get_associated_token_address_with_program_id(owner, mint, &variant.program_id())
    }

    /// Determine which token program governs the mint by reading the mint
    /// account's owner. Falls back to the default variant on lookup failure.
    pub async fn detect_variant(&self, mint: &Pubkey) -> TokenProgramVariant {
        match self.rpc.get_account(mint).await {
            Ok(account) => {
                if account.owner == TOKEN_2022_PROGRAM_ID {
                    TokenProgramVariant::Token2022
                } else {
                    TokenProgramVariant::Classic
                }
            }
            Err(e) => {
                // AccountResolutionDegraded: recovered locally, logged only
                warn!(mint = %mint, error = %e, fallback = ?self.fallback,
                      "token program lookup failed, using fallback variant");
                self.fallback
            }
        }
    }

    /// Resolve the canonical account for (owner, mint), producing an
    /// idempotent creation instruction funded by `payer` when the account is
    /// not confirmed to exist. Never emits a creation instruction for an
    /// account confirmed present.
    pub async fn resolve_or_create(
        &self,
        owner: &Pubkey,
        mint: &Pubkey,
        payer: &Pubkey,
    ) -> Result<ResolvedAccount> {
        let variant = self.detect_variant(mint).await;
        let derived = Self::derive(owner, mint, variant);

        let exists = match self.account_exists(&derived).await {
            Ok(exists) => exists,
            Err(e) => {
                // Unknown existence: include the idempotent instruction,
                // which is a no-op when the account is already there.
                warn!(account = %derived, error = %e, "existence check failed");
                false
            }
        };

        let creation_instruction = if exists {
            None
        } else {
            Some(create_associated_token_account_idempotent(
                payer,
                owner,
                mint,
                &variant.program_id(),
            ))
        };

        Ok(ResolvedAccount {
            account: TokenAccountRef {
                owner: *owner,
                mint: *mint,
                variant,
                derived_address: derived,
                exists,
            },
            creation_instruction,
            variant,
        })
    }

    /// Resolve the *source* account for the connected user. Prefers an
    /// already-existing token account for the mint over the freshly-derived
    /// canonical one (tokens may sit in a pre-existing non-canonical
    /// account), but only after verifying its recorded owner matches the
    /// connected identity. Falls back to canonical silently on mismatch or
    /// lookup failure.
    pub async fn resolve_source(&self, owner: &Pubkey, mint: &Pubkey) -> Result<TokenAccountRef> {
        let variant = self.detect_variant(mint).await;
        let canonical = Self::derive(owner, mint, variant);

        if let Some(found) = self.find_owned_account(owner, mint).await {
            if found != canonical {
                debug!(account = %found, "using pre-existing non-canonical source account");
            }
            return Ok(TokenAccountRef {
                owner: *owner,
                mint: *mint,
                variant,
                derived_address: found,
                exists: true,
            });
        }

        let exists = self.account_exists(&canonical).await.unwrap_or(false);
        Ok(TokenAccountRef {
            owner: *owner,
            mint: *mint,
            variant,
            derived_address: canonical,
            exists,
        })
    }

    async fn account_exists(&self, address: &Pubkey) -> Result<bool> {
        let resp = self
            .rpc
            .get_account_with_commitment(address, self.rpc.commitment())
            .await
            .map_err(|e| ClientError::Rpc(e.to_string()))?;
        Ok(resp.value.is_some())
    }

    /// Query owned token accounts by mint and return the first whose parsed
    /// owner matches. Any failure yields `None` (canonical fallback).
    async fn find_owned_account(&self, owner: &Pubkey, mint: &Pubkey) -> Option<Pubkey> {
        let accounts = match self
            .rpc
            .get_token_accounts_by_owner(owner, TokenAccountsFilter::Mint(*mint))
            .await
        {
            Ok(accounts) => accounts,
            Err(e) => {
                debug!(owner = %owner, error = %e, "owned-account lookup failed");
                return None;
            }
        };

        for keyed in accounts {
            let Some(recorded) = parsed_token_owner(&keyed.account.data) else {
                continue;
            };
            if recorded == *owner {
                return Pubkey::from_str(&keyed.pubkey).ok();
            }
            debug!(account = %keyed.pubkey, "owner mismatch on discovered token account");
        }
        None
    }
}

/// Extract the owner field from jsonParsed token account data
fn parsed_token_owner(data: &UiAccountData) -> Option<Pubkey> {
    let UiAccountData::Json(parsed) = data else {
        return None;
    };
    let owner = parsed.parsed.get("info")?.get("owner")?.as_str()?;
    Pubkey::from_str(owner).ok()
}
