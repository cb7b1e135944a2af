//! Instruction construction: checked token transfer and memo tag

use crate::errors::{ClientError, Result};
use crate::resolver::TokenProgramVariant;
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
};

pub const MEMO_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr");

/// TransferChecked discriminator, identical across both token programs
const TRANSFER_CHECKED_TAG: u8 = 12;

/// Build a `TransferChecked` instruction for the governing token program.
///
/// The classic builder in spl-token refuses foreign program ids, so the
/// Token-2022 case is encoded directly; the instruction layout is shared
/// between the two programs.
pub fn transfer_checked(
    variant: TokenProgramVariant,
    source: &Pubkey,
    mint: &Pubkey,
    destination: &Pubkey,
    authority: &Pubkey,
    amount: u64,
    decimals: u8,
) -> Result<Instruction> {
    if amount == 0 {
        return Err(ClientError::submission("transfer amount must be > 0"));
    }

    match variant {
        TokenProgramVariant::Classic => spl_token::instruction::transfer_checked(
            &spl_token::id(),
            source,
            mint,
            destination,
            authority,
            &[],
            amount,
            decimals,
        )
        .map_err(|e| ClientError::submission(format!("transfer instruction: {e}"))),
        TokenProgramVariant::Token2022 => {
            let mut data = Vec::with_capacity(10);
            data.push(TRANSFER_CHECKED_TAG);
            data.extend_from_slice(&amount.to_le_bytes());
            data.push(decimals);

            Ok(Instruction {
                program_id: variant.program_id(),
                accounts: vec![
                    AccountMeta::new(*source, false),
                    AccountMeta::new_readonly(*mint, false),
                    AccountMeta::new(*destination, false),
                    AccountMeta::new_readonly(*authority, true),
                ],
                data,
            })
        }
    }
}

/// Build a memo instruction carrying the server-issued correlation tag
pub fn build_memo(data: &[u8], signers: &[&Pubkey]) -> Instruction {
    let metas: Vec<AccountMeta> = signers
        .iter()
        .map(|&pk| AccountMeta::new_readonly(*pk, true))
        .collect();

    Instruction::new_with_bytes(MEMO_PROGRAM_ID, data, metas)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classic_transfer_checked() {
        let ix = transfer_checked(
            TokenProgramVariant::Classic,
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
            1_000_000,
            6,
        )
        .unwrap();
        assert_eq!(ix.program_id, spl_token::id());
        assert_eq!(ix.data[0], TRANSFER_CHECKED_TAG);
    }

    #[test]
    fn test_token_2022_shares_layout_with_classic() {
        let source = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let dest = Pubkey::new_unique();
        let auth = Pubkey::new_unique();

        let classic = transfer_checked(
            TokenProgramVariant::Classic,
            &source,
            &mint,
            &dest,
            &auth,
            5_000_000,
            6,
        )
        .unwrap();
        let t22 = transfer_checked(
            TokenProgramVariant::Token2022,
            &source,
            &mint,
            &dest,
            &auth,
            5_000_000,
            6,
        )
        .unwrap();

        assert_eq!(classic.data, t22.data);
        assert_eq!(classic.accounts.len(), t22.accounts.len());
        assert_eq!(t22.program_id, TokenProgramVariant::Token2022.program_id());
        // Authority must sign in both encodings
        assert!(t22.accounts[3].is_signer);
    }

    #[test]
    fn test_zero_amount_rejected() {
        let result = transfer_checked(
            TokenProgramVariant::Classic,
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
            0,
            6,
        );
        assert!(matches!(result, Err(ClientError::SubmissionFailed(_))));
    }

    #[test]
    fn test_memo_carries_tag_bytes() {
        let ix = build_memo(b"BET:abc123:TREAT", &[]);
        assert_eq!(ix.program_id, MEMO_PROGRAM_ID);
        assert_eq!(ix.data, b"BET:abc123:TREAT");
        assert!(ix.accounts.is_empty());
    }
}
