use solana_sdk::hash::Hash;
use solana_sdk::instruction::Instruction;
use solana_sdk::message::Message;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::transaction::Transaction;

use vault_swap_lib::{CoverFeeAccounts, EncodingError, VaultCall};

use super::fee::FeeEstimate;
use crate::error::RelayError;

pub use solana_sdk::packet::PACKET_DATA_SIZE;

/// A fee-covered swap, ready for the relay. Only the assembler builds one and
/// its instruction order is fixed at `[coverFee, swap]`.
#[derive(Debug, Clone)]
pub struct SwapTransaction {
    cover_fee: Instruction,
    swap: Instruction,
    fee_payer: Pubkey,
    checkpoint: Option<Hash>,
    fee: FeeEstimate,
}

impl SwapTransaction {
    pub fn instructions(&self) -> [&Instruction; 2] {
        [&self.cover_fee, &self.swap]
    }

    pub fn fee_payer(&self) -> Pubkey {
        self.fee_payer
    }

    pub fn checkpoint(&self) -> Option<Hash> {
        self.checkpoint
    }

    pub fn fee(&self) -> &FeeEstimate {
        &self.fee
    }

    pub(crate) fn set_checkpoint(&mut self, checkpoint: Hash) {
        self.checkpoint = Some(checkpoint);
    }

    pub fn message(&self, checkpoint: &Hash) -> Message {
        Message::new_with_blockhash(
            &[self.cover_fee.clone(), self.swap.clone()],
            Some(&self.fee_payer),
            checkpoint,
        )
    }

    /// Wire size once signed, signatures included.
    pub fn serialized_size(&self) -> Result<usize, RelayError> {
        let checkpoint = self.checkpoint.unwrap_or_default();
        let unsigned = Transaction::new_unsigned(self.message(&checkpoint));
        bincode::serialized_size(&unsigned)
            .map(|size| size as usize)
            .map_err(|e| RelayError::Encoding(EncodingError::Malformed(e.to_string())))
    }
}

pub struct SwapTransactionAssembler {
    fee_payer: Pubkey,
    vault_program: Pubkey,
}

impl SwapTransactionAssembler {
    pub fn new(fee_payer: Pubkey, vault_program: Pubkey) -> Self {
        Self {
            fee_payer,
            vault_program,
        }
    }

    /// Pairs a `coverFee` call for `estimate.total` with `swap`, using the
    /// checkpoint captured by the probe.
    pub fn build_final(
        &self,
        estimate: FeeEstimate,
        cover: CoverFeeAccounts,
        swap: Instruction,
    ) -> Result<SwapTransaction, RelayError> {
        let cover_fee = VaultCall::CoverFee {
            fee_amount: estimate.total,
        }
        .into_instruction(self.vault_program, cover.to_account_metas())?;

        let transaction = SwapTransaction {
            cover_fee,
            swap,
            fee_payer: self.fee_payer,
            checkpoint: Some(estimate.checkpoint),
            fee: estimate,
        };

        let size = transaction.serialized_size()?;
        if size > PACKET_DATA_SIZE {
            return Err(RelayError::TransactionTooLarge {
                size,
                max: PACKET_DATA_SIZE,
            });
        }
        Ok(transaction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::fee::FeeSource;
    use solana_sdk::instruction::AccountMeta;
    use vault_swap_lib::encoding::{COVER_FEE_DISCRIMINATOR, SWAP_TO_SETTLEMENT_DISCRIMINATOR};

    fn estimate(total: u64) -> FeeEstimate {
        FeeEstimate {
            checkpoint: Hash::new_unique(),
            base_fee: total - 5_000,
            margin: 5_000,
            total,
            source: FeeSource::Network,
        }
    }

    fn swap_ix(program: Pubkey, route_len: usize) -> Instruction {
        let mut data = SWAP_TO_SETTLEMENT_DISCRIMINATOR.to_vec();
        data.extend(std::iter::repeat(7u8).take(route_len));
        Instruction::new_with_bytes(
            program,
            &data,
            vec![AccountMeta::new(Pubkey::new_unique(), false)],
        )
    }

    #[test]
    fn cover_fee_always_precedes_swap() {
        let relayer = Pubkey::new_unique();
        let program = Pubkey::new_unique();
        let assembler = SwapTransactionAssembler::new(relayer, program);
        let cover = CoverFeeAccounts {
            vault: Pubkey::new_unique(),
            owner: Pubkey::new_unique(),
            relayer,
        };
        let tx = assembler
            .build_final(estimate(15_000), cover, swap_ix(program, 16))
            .unwrap();

        let [first, second] = tx.instructions();
        assert_eq!(&first.data[..8], &COVER_FEE_DISCRIMINATOR);
        assert_eq!(&first.data[8..], &15_000u64.to_le_bytes());
        assert_eq!(&second.data[..8], &SWAP_TO_SETTLEMENT_DISCRIMINATOR);
        assert_eq!(tx.fee_payer(), relayer);

        let checkpoint = tx.checkpoint().unwrap();
        let message = tx.message(&checkpoint);
        assert_eq!(message.account_keys[0], relayer);
        assert_eq!(message.header.num_required_signatures, 1);
    }

    #[test]
    fn oversized_transactions_fail_locally() {
        let relayer = Pubkey::new_unique();
        let program = Pubkey::new_unique();
        let assembler = SwapTransactionAssembler::new(relayer, program);
        let cover = CoverFeeAccounts {
            vault: Pubkey::new_unique(),
            owner: Pubkey::new_unique(),
            relayer,
        };
        let err = assembler
            .build_final(estimate(15_000), cover, swap_ix(program, 1_300))
            .unwrap_err();
        assert!(matches!(
            err,
            RelayError::TransactionTooLarge { max: PACKET_DATA_SIZE, .. }
        ));
    }
}
