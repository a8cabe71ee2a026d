use borsh::BorshDeserialize;
use solana_program::pubkey::Pubkey;

use crate::constants::{ASSOCIATED_TOKEN_PROGRAM_ID, TOKEN_PROGRAM_ID, VAULT_SEED};
use crate::encoding::EncodingError;

/// `sha256("account:Vault")[..8]`
pub const VAULT_ACCOUNT_DISCRIMINATOR: [u8; 8] = [211, 8, 232, 43, 2, 152, 117, 119];

/// Vault PDA for `owner`. Always re-derived, never read back from storage.
pub fn find_vault_address(owner: &Pubkey, program_id: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[VAULT_SEED, owner.as_ref()], program_id)
}

/// Associated token account of `wallet` for `mint` under the classic token program.
pub fn associated_token_address(wallet: &Pubkey, mint: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[wallet.as_ref(), TOKEN_PROGRAM_ID.as_ref(), mint.as_ref()],
        &ASSOCIATED_TOKEN_PROGRAM_ID,
    )
    .0
}

#[derive(BorshDeserialize)]
struct RawVault {
    owner: [u8; 32],
    bump: u8,
    settlement_account: [u8; 32],
}

/// On-chain state of a vault account.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VaultAccount {
    pub owner: Pubkey,
    pub bump: u8,
    pub settlement_account: Pubkey,
}

impl VaultAccount {
    pub const LEN: usize = 8 + 32 + 1 + 32;

    pub fn try_from_bytes(data: &[u8]) -> Result<Self, EncodingError> {
        if data.len() < Self::LEN {
            return Err(EncodingError::Truncated(data.len()));
        }
        let mut discriminator = [0u8; 8];
        discriminator.copy_from_slice(&data[..8]);
        if discriminator != VAULT_ACCOUNT_DISCRIMINATOR {
            return Err(EncodingError::UnknownDiscriminator(discriminator));
        }
        let mut body = &data[8..];
        let raw = RawVault::deserialize(&mut body)
            .map_err(|e| EncodingError::Malformed(e.to_string()))?;
        Ok(Self {
            owner: Pubkey::new_from_array(raw.owner),
            bump: raw.bump,
            settlement_account: Pubkey::new_from_array(raw.settlement_account),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(Self::LEN);
        data.extend_from_slice(&VAULT_ACCOUNT_DISCRIMINATOR);
        data.extend_from_slice(self.owner.as_ref());
        data.push(self.bump);
        data.extend_from_slice(self.settlement_account.as_ref());
        data
    }

    /// True when `address` is the PDA this account's owner derives to.
    pub fn matches_address(&self, address: &Pubkey, program_id: &Pubkey) -> bool {
        let (derived, bump) = find_vault_address(&self.owner, program_id);
        derived == *address && bump == self.bump
    }
}
