//! Transaction plan with ordering validation
//!
//! A [`TxPlan`] is an ordered instruction list plus fee-payer and blockhash
//! metadata. The mandated order is:
//! 1. account-creation instructions (a transfer must never reference an
//!    account whose creation rides in a *later* transaction)
//! 2. the value-transfer instruction
//! 3. the memo instruction carrying the server correlation tag

use crate::errors::{ClientError, Result};
use crate::tx_builder::instructions::MEMO_PROGRAM_ID;
use solana_sdk::{hash::Hash, instruction::Instruction, pubkey::Pubkey, transaction::Transaction};
use spl_associated_token_account::id as ata_program_id;

/// Ordered instruction list plus transaction metadata.
///
/// Built fresh per send attempt; a blockhash from an expired attempt must be
/// refreshed by the caller, never silently reused.
#[derive(Debug, Clone, Default)]
pub struct TxPlan {
    pub instructions: Vec<Instruction>,
    pub fee_payer: Option<Pubkey>,
    pub recent_blockhash: Option<Hash>,
}

impl TxPlan {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self {
            instructions,
            fee_payer: None,
            recent_blockhash: None,
        }
    }

    pub fn with_fee_payer(mut self, fee_payer: Pubkey) -> Self {
        self.fee_payer = Some(fee_payer);
        self
    }

    pub fn with_blockhash(mut self, blockhash: Hash) -> Self {
        self.recent_blockhash = Some(blockhash);
        self
    }

    /// Whether fee payer and blockhash are both populated
    pub fn is_complete(&self) -> bool {
        self.fee_payer.is_some() && self.recent_blockhash.is_some()
    }

    /// Compile into an unsigned transaction. Fails when metadata is missing;
    /// the sender lazy-fills both fields before calling this.
    pub fn into_transaction(self) -> Result<Transaction> {
        let fee_payer = self
            .fee_payer
            .ok_or_else(|| ClientError::submission("plan has no fee payer"))?;
        let blockhash = self
            .recent_blockhash
            .ok_or_else(|| ClientError::submission("plan has no blockhash"))?;
        if self.instructions.is_empty() {
            return Err(ClientError::submission("plan has no instructions"));
        }

        let mut tx = Transaction::new_with_payer(&self.instructions, Some(&fee_payer));
        tx.message.recent_blockhash = blockhash;
        Ok(tx)
    }
}

/// Assemble instructions in the mandated order
pub fn assemble(
    creation_instructions: Vec<Instruction>,
    transfer: Instruction,
    memo: Instruction,
) -> Vec<Instruction> {
    let mut instructions = Vec::with_capacity(creation_instructions.len() + 2);
    instructions.extend(creation_instructions);
    instructions.push(transfer);
    instructions.push(memo);
    instructions
}

/// Sanity-check plan ordering: creations first, memo last, exactly one memo.
/// Compiled in debug/test builds only.
#[cfg(debug_assertions)]
pub fn sanity_check_plan_order(instructions: &[Instruction]) -> Result<()> {
    if instructions.is_empty() {
        return Err(ClientError::submission("instruction list is empty"));
    }

    let is_creation = |ix: &Instruction| ix.program_id == ata_program_id();
    let is_memo = |ix: &Instruction| ix.program_id == MEMO_PROGRAM_ID;

    let memo_count = instructions.iter().filter(|ix| is_memo(ix)).count();
    if memo_count != 1 {
        return Err(ClientError::submission(format!(
            "expected exactly one memo instruction, found {memo_count}"
        )));
    }
    if !instructions.last().is_some_and(is_memo) {
        return Err(ClientError::submission("memo instruction must come last"));
    }

    // No creation instruction may follow a non-creation one
    let mut past_creations = false;
    for ix in instructions {
        if is_creation(ix) {
            if past_creations {
                return Err(ClientError::submission(
                    "account-creation instruction after transfer",
                ));
            }
        } else {
            past_creations = true;
        }
    }
    Ok(())
}

#[cfg(not(debug_assertions))]
#[inline]
pub fn sanity_check_plan_order(_instructions: &[Instruction]) -> Result<()> {
    Ok(())
}
