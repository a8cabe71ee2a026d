//! Ordered account lists for the vault program's instructions.

use solana_program::instruction::AccountMeta;
use solana_program::pubkey::Pubkey;

use crate::constants::{SYSTEM_PROGRAM_ID, TOKEN_PROGRAM_ID};
use crate::vault::associated_token_address;

pub struct CoverFeeAccounts {
    pub vault: Pubkey,
    pub owner: Pubkey,
    pub relayer: Pubkey,
}

impl CoverFeeAccounts {
    pub fn to_account_metas(&self) -> Vec<AccountMeta> {
        vec![
            AccountMeta::new(self.vault, false),
            AccountMeta::new_readonly(self.owner, false),
            AccountMeta::new(self.relayer, false),
            AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
        ]
    }
}

pub struct SwapToSettlementAccounts {
    pub vault: Pubkey,
    pub owner: Pubkey,
    pub input_mint: Pubkey,
    pub settlement_mint: Pubkey,
    pub vault_input_account: Pubkey,
    pub fee_input_account: Pubkey,
    pub vault_settlement_account: Pubkey,
    pub aggregator_program: Pubkey,
}

impl SwapToSettlementAccounts {
    pub fn resolve(
        vault: Pubkey,
        owner: Pubkey,
        input_mint: Pubkey,
        settlement_mint: Pubkey,
        vault_settlement_account: Pubkey,
        fee_recipient: Pubkey,
        aggregator_program: Pubkey,
    ) -> Self {
        Self {
            vault,
            owner,
            input_mint,
            settlement_mint,
            vault_input_account: associated_token_address(&vault, &input_mint),
            fee_input_account: associated_token_address(&fee_recipient, &input_mint),
            vault_settlement_account,
            aggregator_program,
        }
    }

    pub fn to_account_metas(&self, route_accounts: &[AccountMeta]) -> Vec<AccountMeta> {
        let mut metas = vec![
            AccountMeta::new_readonly(self.vault, false),
            AccountMeta::new_readonly(self.owner, false),
            AccountMeta::new_readonly(self.input_mint, false),
            AccountMeta::new_readonly(self.settlement_mint, false),
            AccountMeta::new(self.vault_input_account, false),
            AccountMeta::new(self.fee_input_account, false),
            AccountMeta::new(self.vault_settlement_account, false),
            AccountMeta::new_readonly(self.aggregator_program, false),
            AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
            AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
        ];
        metas.extend(forwarded_route_accounts(route_accounts, &self.vault));
        metas
    }
}

pub struct SwapFeeToNativeAccounts {
    pub vault: Pubkey,
    pub owner: Pubkey,
    pub input_mint: Pubkey,
    pub vault_input_account: Pubkey,
    pub admin_recipient: Pubkey,
    pub aggregator_program: Pubkey,
}

impl SwapFeeToNativeAccounts {
    pub fn resolve(
        vault: Pubkey,
        owner: Pubkey,
        input_mint: Pubkey,
        admin_recipient: Pubkey,
        aggregator_program: Pubkey,
    ) -> Self {
        Self {
            vault,
            owner,
            input_mint,
            vault_input_account: associated_token_address(&vault, &input_mint),
            admin_recipient,
            aggregator_program,
        }
    }

    pub fn to_account_metas(&self, route_accounts: &[AccountMeta]) -> Vec<AccountMeta> {
        let mut metas = vec![
            AccountMeta::new(self.vault, false),
            AccountMeta::new_readonly(self.owner, false),
            AccountMeta::new_readonly(self.input_mint, false),
            AccountMeta::new(self.vault_input_account, false),
            AccountMeta::new(self.admin_recipient, false),
            AccountMeta::new_readonly(self.aggregator_program, false),
            AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
            AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
        ];
        metas.extend(forwarded_route_accounts(route_accounts, &self.vault));
        metas
    }
}

/// Route accounts as forwarded in the outer call. The vault keeps its
/// writable flag but never requires a transaction signature: the program
/// signs for it with its own seeds when it invokes the aggregator.
pub fn forwarded_route_accounts<'a>(
    route_accounts: &'a [AccountMeta],
    vault: &Pubkey,
) -> impl Iterator<Item = AccountMeta> + 'a {
    let vault = *vault;
    route_accounts.iter().map(move |meta| {
        if meta.pubkey == vault {
            AccountMeta {
                pubkey: meta.pubkey,
                is_signer: false,
                is_writable: meta.is_writable,
            }
        } else {
            meta.clone()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settlement_accounts_append_route_last_without_vault_signature() {
        let vault = Pubkey::new_unique();
        let hop = Pubkey::new_unique();
        let accounts = SwapToSettlementAccounts::resolve(
            vault,
            Pubkey::new_unique(),
            Pubkey::new_unique(),
            Pubkey::new_unique(),
            Pubkey::new_unique(),
            Pubkey::new_unique(),
            Pubkey::new_unique(),
        );
        let route = vec![AccountMeta::new(vault, true), AccountMeta::new(hop, false)];
        let metas = accounts.to_account_metas(&route);

        assert_eq!(metas.len(), 12);
        assert_eq!(metas[0].pubkey, vault);
        assert_eq!(metas[8].pubkey, TOKEN_PROGRAM_ID);
        assert_eq!(metas[10].pubkey, vault);
        assert!(!metas[10].is_signer);
        assert!(metas[10].is_writable);
        assert_eq!(metas[11].pubkey, hop);
        assert!(metas.iter().all(|m| !m.is_signer));
    }

    #[test]
    fn fee_leg_accounts_start_with_writable_vault() {
        let vault = Pubkey::new_unique();
        let admin = Pubkey::new_unique();
        let accounts = SwapFeeToNativeAccounts::resolve(
            vault,
            Pubkey::new_unique(),
            Pubkey::new_unique(),
            admin,
            Pubkey::new_unique(),
        );
        let metas = accounts.to_account_metas(&[]);
        assert_eq!(metas.len(), 8);
        assert!(metas[0].is_writable);
        assert_eq!(metas[4].pubkey, admin);
        assert!(metas[4].is_writable);
    }

    #[test]
    fn cover_fee_accounts_credit_relayer() {
        let relayer = Pubkey::new_unique();
        let metas = CoverFeeAccounts {
            vault: Pubkey::new_unique(),
            owner: Pubkey::new_unique(),
            relayer,
        }
        .to_account_metas();
        assert_eq!(metas[2], AccountMeta::new(relayer, false));
        assert_eq!(metas[3].pubkey, SYSTEM_PROGRAM_ID);
    }
}
