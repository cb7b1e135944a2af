//! Transaction builder
//!
//! Pure assembly: takes resolved accounts and a memo tag, produces an
//! ordered [`TxPlan`] with fee payer and a fresh blockhash attached. Never
//! signs. Deterministic given identical inputs except for the blockhash,
//! which is time-sensitive and refetched per attempt.

pub mod instructions;
pub mod plan;

pub use instructions::{build_memo, transfer_checked, MEMO_PROGRAM_ID};
pub use plan::{assemble, sanity_check_plan_order, TxPlan};

use crate::api::ApiClient;
use crate::errors::Result;
use solana_sdk::{instruction::Instruction, pubkey::Pubkey};
use std::sync::Arc;

pub struct TransactionBuilder {
    api: Arc<ApiClient>,
}

impl TransactionBuilder {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    /// Assemble a plan in the mandated order (creations, transfer, memo) and
    /// attach fee payer plus a freshly fetched blockhash
    pub async fn build(
        &self,
        creation_instructions: Vec<Instruction>,
        transfer: Instruction,
        memo: Instruction,
        fee_payer: Pubkey,
    ) -> Result<TxPlan> {
        let instructions = assemble(creation_instructions, transfer, memo);
        sanity_check_plan_order(&instructions)?;

        let blockhash = self.api.latest_blockhash().await?;
        Ok(TxPlan::new(instructions)
            .with_fee_payer(fee_payer)
            .with_blockhash(blockhash))
    }

    /// Assemble a bare plan with no metadata; the sender lazy-fills fee
    /// payer and blockhash before first use
    pub fn build_bare(
        &self,
        creation_instructions: Vec<Instruction>,
        transfer: Instruction,
        memo: Instruction,
    ) -> Result<TxPlan> {
        let instructions = assemble(creation_instructions, transfer, memo);
        sanity_check_plan_order(&instructions)?;
        Ok(TxPlan::new(instructions))
    }
}
