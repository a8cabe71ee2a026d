use solana_sdk::address_lookup_table::state::AddressLookupTable;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::message::v0::LoadedAddresses;
use solana_sdk::message::VersionedMessage;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::transaction::VersionedTransaction;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

use super::{Aggregator, Quote};
use crate::client::ChainRpc;
use crate::error::{RelayError, Stage};

/// Pulls the aggregator program's instruction out of a route transaction.
pub struct RouteInstructionExtractor {
    aggregator: Arc<dyn Aggregator>,
    rpc: Arc<dyn ChainRpc>,
    aggregator_program: Pubkey,
    stage_timeout: Duration,
}

impl RouteInstructionExtractor {
    pub fn new(
        aggregator: Arc<dyn Aggregator>,
        rpc: Arc<dyn ChainRpc>,
        aggregator_program: Pubkey,
        stage_timeout: Duration,
    ) -> Self {
        Self {
            aggregator,
            rpc,
            aggregator_program,
            stage_timeout,
        }
    }

    /// The returned instruction lists `vault` as a signer.
    pub async fn extract(
        &self,
        quote: &Quote,
        vault: &Pubkey,
        wrap_native: bool,
    ) -> Result<Instruction, RelayError> {
        let container = timeout(
            self.stage_timeout,
            self.aggregator.swap_transaction(quote, vault, wrap_native),
        )
        .await
        .map_err(|_| RelayError::Timeout {
            stage: Stage::RouteInstruction,
            after: self.stage_timeout,
        })??;

        let transaction: VersionedTransaction = bincode::deserialize(&container)
            .map_err(|e| RelayError::UnexpectedResponse(format!("route transaction: {e}")))?;
        let loaded = self.load_lookup_addresses(&transaction.message).await?;
        let instruction =
            extract_from_message(&transaction.message, &loaded, &self.aggregator_program, vault)?;

        debug!(
            target: "aggregator",
            vault = %vault,
            accounts = instruction.accounts.len(),
            data = %hex::encode(&instruction.data[..instruction.data.len().min(8)]),
            "extracted route instruction"
        );
        Ok(instruction)
    }

    async fn load_lookup_addresses(
        &self,
        message: &VersionedMessage,
    ) -> Result<LoadedAddresses, RelayError> {
        let mut loaded = LoadedAddresses::default();
        let VersionedMessage::V0(message) = message else {
            return Ok(loaded);
        };

        for lookup in &message.address_table_lookups {
            let account = timeout(self.stage_timeout, self.rpc.account(&lookup.account_key))
                .await
                .map_err(|_| RelayError::Timeout {
                    stage: Stage::AccountRead,
                    after: self.stage_timeout,
                })??
                .ok_or_else(|| {
                    RelayError::UnexpectedResponse(format!(
                        "lookup table {} not found",
                        lookup.account_key
                    ))
                })?;
            let table = AddressLookupTable::deserialize(&account.data).map_err(|e| {
                RelayError::UnexpectedResponse(format!(
                    "lookup table {}: {e}",
                    lookup.account_key
                ))
            })?;
            let pick = |indexes: &[u8]| {
                indexes
                    .iter()
                    .map(|&i| {
                        table.addresses.get(usize::from(i)).copied().ok_or_else(|| {
                            RelayError::UnexpectedResponse(format!(
                                "lookup index {i} out of range for table {}",
                                lookup.account_key
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()
            };
            loaded.writable.extend(pick(&lookup.writable_indexes)?);
            loaded.readonly.extend(pick(&lookup.readonly_indexes)?);
        }
        Ok(loaded)
    }
}

/// Resolves the first instruction addressed to `program` inside `message`.
///
/// Account order is static keys, then loaded writable, then loaded readonly.
pub fn extract_from_message(
    message: &VersionedMessage,
    loaded: &LoadedAddresses,
    program: &Pubkey,
    vault: &Pubkey,
) -> Result<Instruction, RelayError> {
    let keys = resolve_account_metas(message, loaded);
    let meta_at = |index: u8| {
        keys.get(usize::from(index)).cloned().ok_or_else(|| {
            RelayError::UnexpectedResponse(format!("account index {index} out of range"))
        })
    };

    let compiled = message
        .instructions()
        .iter()
        .find(|ix| {
            keys.get(usize::from(ix.program_id_index))
                .is_some_and(|meta| meta.pubkey == *program)
        })
        .ok_or(RelayError::InstructionNotFound(*program))?;

    let mut accounts = compiled
        .accounts
        .iter()
        .map(|&index| meta_at(index))
        .collect::<Result<Vec<_>, _>>()?;
    ensure_vault_signer(&mut accounts, vault);

    Ok(Instruction {
        program_id: *program,
        accounts,
        data: compiled.data.clone(),
    })
}

/// Marks `vault` as signer, inserting it first (signer and writable) when absent.
pub fn ensure_vault_signer(accounts: &mut Vec<AccountMeta>, vault: &Pubkey) {
    let mut found = false;
    for meta in accounts.iter_mut().filter(|m| m.pubkey == *vault) {
        meta.is_signer = true;
        found = true;
    }
    if !found {
        accounts.insert(0, AccountMeta::new(*vault, true));
    }
}

fn resolve_account_metas(message: &VersionedMessage, loaded: &LoadedAddresses) -> Vec<AccountMeta> {
    let header = message.header();
    let static_keys = message.static_account_keys();
    let signed = usize::from(header.num_required_signatures);
    let readonly_signed = usize::from(header.num_readonly_signed_accounts);
    let readonly_unsigned = usize::from(header.num_readonly_unsigned_accounts);

    let mut metas: Vec<AccountMeta> = static_keys
        .iter()
        .enumerate()
        .map(|(i, key)| {
            let is_signer = i < signed;
            let is_writable = if is_signer {
                i < signed.saturating_sub(readonly_signed)
            } else {
                i < static_keys.len().saturating_sub(readonly_unsigned)
            };
            AccountMeta {
                pubkey: *key,
                is_signer,
                is_writable,
            }
        })
        .collect();
    metas.extend(loaded.writable.iter().map(|key| AccountMeta::new(*key, false)));
    metas.extend(
        loaded
            .readonly
            .iter()
            .map(|key| AccountMeta::new_readonly(*key, false)),
    );
    metas
}
