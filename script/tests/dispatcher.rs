mod common;

use serde_json::json;
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use std::time::Duration;

use common::{settings, vault_calls, vault_of, Harness};
use vault_swap_lib::constants::{CBBTC_MINT, VAULT_PROGRAM_ID};
use vault_swap_lib::{associated_token_address, find_vault_address, VaultAccount, VaultCall};
use vault_swap_relay::client::{AccountSnapshot, RpcFailure, SignatureState};
use vault_swap_relay::dispatch::{
    normalize_batch, Deposit, DepositDispatcher, DepositOutcome, MemoryProcessedStore,
    OnChainVaultRegistry, ProcessedStore, SkipReason, StaticVaultRegistry, VaultRegistry,
};
use vault_swap_relay::pipeline::FeeLegOutcome;
use vault_swap_relay::FailureKind;

struct Setup {
    harness: Harness,
    store: Arc<MemoryProcessedStore>,
    dispatcher: DepositDispatcher,
    owners: Vec<Pubkey>,
}

fn setup(vaults: usize, dry_run: bool) -> Setup {
    let harness = Harness::with_settings(settings(dry_run));
    let owners: Vec<Pubkey> = (0..vaults).map(|_| Pubkey::new_unique()).collect();
    let registry = Arc::new(StaticVaultRegistry::new(
        &owners,
        &VAULT_PROGRAM_ID,
        &CBBTC_MINT,
    ));
    let store = Arc::new(MemoryProcessedStore::default());
    let dispatcher = DepositDispatcher::new(
        harness.pipeline.clone(),
        registry,
        store.clone(),
        4,
    );
    Setup {
        harness,
        store,
        dispatcher,
        owners,
    }
}

fn deposit(signature: &str, destination: Pubkey, asset: Pubkey, amount: u64) -> Deposit {
    Deposit {
        signature: signature.to_string(),
        destination,
        asset,
        amount,
    }
}

#[tokio::test]
async fn one_failure_does_not_block_the_rest_of_the_batch() {
    let setup = setup(2, false);
    let unroutable = Pubkey::new_unique();
    setup
        .harness
        .aggregator
        .no_route_inputs
        .lock()
        .unwrap()
        .insert(unroutable);

    let report = setup
        .dispatcher
        .dispatch_batch(vec![
            deposit("sig-a", vault_of(&setup.owners[0]), unroutable, 1_000_000),
            deposit("sig-b", vault_of(&setup.owners[1]), Pubkey::new_unique(), 1_000_000),
        ])
        .await;

    assert_eq!(report.results.len(), 2);
    assert_eq!(report.swapped(), 1);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.signatures().len(), 1);
    assert_eq!(report.results[0].deposit.signature, "sig-a");
    assert!(matches!(
        report.results[0].outcome,
        DepositOutcome::Failed {
            kind: FailureKind::Upstream,
            ..
        }
    ));
    assert!(matches!(
        report.results[1].outcome,
        DepositOutcome::Swapped { .. }
    ));
}

#[tokio::test]
async fn redelivered_deposit_is_processed_once() {
    let setup = setup(1, false);
    let vault = vault_of(&setup.owners[0]);
    let asset = Pubkey::new_unique();

    let report = setup
        .dispatcher
        .dispatch_batch(vec![
            deposit("sig-1", vault, asset, 300),
            deposit("sig-1", vault, asset, 300),
        ])
        .await;
    assert_eq!(report.swapped(), 1);
    assert_eq!(report.duplicates(), 1);

    let again = setup
        .dispatcher
        .dispatch_batch(vec![deposit("sig-1", vault, asset, 300)])
        .await;
    assert_eq!(again.duplicates(), 1);
    // 300 owes a fee of one unit, so each swap is followed by a fee leg.
    assert_eq!(setup.harness.rpc.send_count(), 2);
}

#[tokio::test]
async fn deposits_to_one_vault_settle_in_arrival_order() {
    let setup = setup(1, false);
    let vault = vault_of(&setup.owners[0]);

    let report = setup
        .dispatcher
        .dispatch_batch(vec![
            deposit("sig-1", vault, Pubkey::new_unique(), 100),
            deposit("sig-2", vault, Pubkey::new_unique(), 200),
        ])
        .await;
    assert_eq!(report.swapped(), 2);

    let amounts: Vec<u64> = setup
        .harness
        .rpc
        .sent()
        .iter()
        .map(|tx| match &vault_calls(tx)[1] {
            VaultCall::SwapToSettlement(args) => args.amount_in,
            other => panic!("unexpected call {other:?}"),
        })
        .collect();
    assert_eq!(amounts, vec![100, 200]);
}

#[tokio::test]
async fn pre_submission_failure_releases_the_claim() {
    let setup = setup(1, false);
    let vault = vault_of(&setup.owners[0]);
    let asset = Pubkey::new_unique();
    setup.harness.rpc.set_balance(vault, 10);

    let first = setup
        .dispatcher
        .dispatch_batch(vec![deposit("sig-1", vault, asset, 1_000_000)])
        .await;
    assert!(matches!(
        first.results[0].outcome,
        DepositOutcome::Failed {
            kind: FailureKind::LocalPrecondition,
            ..
        }
    ));
    assert!(setup.store.is_empty());

    setup.harness.rpc.set_balance(vault, 1_000_000);
    let retry = setup
        .dispatcher
        .dispatch_batch(vec![deposit("sig-1", vault, asset, 1_000_000)])
        .await;
    assert_eq!(retry.swapped(), 1);
}

#[tokio::test]
async fn unknown_outcome_keeps_the_claim() {
    let setup = setup(1, false);
    let vault = vault_of(&setup.owners[0]);
    let asset = Pubkey::new_unique();
    setup.harness.rpc.set_status(SignatureState::Pending);

    let first = setup
        .dispatcher
        .dispatch_batch(vec![deposit("sig-1", vault, asset, 1_000_000)])
        .await;
    assert!(matches!(
        first.results[0].outcome,
        DepositOutcome::Failed {
            kind: FailureKind::NetworkSubmission,
            ..
        }
    ));

    setup.harness.rpc.set_status(SignatureState::Confirmed);
    let again = setup
        .dispatcher
        .dispatch_batch(vec![deposit("sig-1", vault, asset, 1_000_000)])
        .await;
    assert_eq!(again.duplicates(), 1);
    assert_eq!(setup.harness.rpc.send_count(), 1);
}

#[tokio::test]
async fn already_processed_resend_counts_as_swapped_and_keeps_the_claim() {
    let setup = setup(1, false);
    let vault = vault_of(&setup.owners[0]);
    let asset = Pubkey::new_unique();
    setup.harness.rpc.script_sends([
        RpcFailure::Transient("response lost".into()),
        RpcFailure::AlreadyProcessed,
    ]);

    let first = setup
        .dispatcher
        .dispatch_batch(vec![deposit("sig-1", vault, asset, 2_000_000)])
        .await;
    match &first.results[0].outcome {
        DepositOutcome::Swapped { signature, fee_leg } => {
            let sent = setup.harness.rpc.sent();
            assert_eq!(*signature, Some(sent[0].signatures[0]));
            assert!(matches!(fee_leg, FeeLegOutcome::Completed(_)));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    // Two sends of the settlement leg, one of the fee leg.
    assert_eq!(setup.harness.rpc.send_count(), 3);

    let again = setup
        .dispatcher
        .dispatch_batch(vec![deposit("sig-1", vault, asset, 2_000_000)])
        .await;
    assert_eq!(again.duplicates(), 1);
    assert_eq!(setup.harness.rpc.send_count(), 3);
}

#[tokio::test]
async fn dry_run_does_not_consume_the_deposit() {
    let setup = setup(1, true);
    let vault = vault_of(&setup.owners[0]);
    let asset = Pubkey::new_unique();

    for _ in 0..2 {
        let report = setup
            .dispatcher
            .dispatch_batch(vec![deposit("sig-1", vault, asset, 2_000_000)])
            .await;
        match &report.results[0].outcome {
            DepositOutcome::Swapped { signature, fee_leg } => {
                assert!(signature.is_none());
                assert!(matches!(fee_leg, FeeLegOutcome::Completed(leg) if leg.amount_in == 8_000));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    assert_eq!(setup.harness.rpc.send_count(), 0);
    assert!(setup.store.is_empty());
}

#[tokio::test]
async fn skips_settlement_asset_zero_amounts_and_unknown_destinations() {
    let setup = setup(1, false);
    let vault = vault_of(&setup.owners[0]);

    let report = setup
        .dispatcher
        .dispatch_batch(vec![
            deposit("sig-1", vault, CBBTC_MINT, 1_000),
            deposit("sig-2", vault, Pubkey::new_unique(), 0),
            deposit("sig-3", Pubkey::new_unique(), Pubkey::new_unique(), 1_000),
        ])
        .await;

    let reasons: Vec<SkipReason> = report
        .results
        .iter()
        .map(|r| match r.outcome {
            DepositOutcome::Skipped(reason) => reason,
            ref other => panic!("unexpected outcome {other:?}"),
        })
        .collect();
    assert_eq!(
        reasons,
        vec![
            SkipReason::SettlementAsset,
            SkipReason::ZeroAmount,
            SkipReason::NotAVault
        ]
    );
    assert!(setup.harness.aggregator.quote_requests().is_empty());
    assert!(setup.store.is_empty());
}

#[tokio::test]
async fn notification_payload_flows_through_to_a_swap() {
    let setup = setup(1, false);
    let vault = vault_of(&setup.owners[0]);
    let mint = Pubkey::new_unique();
    let payload = json!([{
        "signature": "5xDeposit",
        "type": "TRANSFER",
        "tokenTransfers": [{
            "toUserAccount": vault.to_string(),
            "mint": mint.to_string(),
            "rawTokenAmount": { "tokenAmount": "2000000", "decimals": 6 }
        }]
    }]);

    let report = setup.dispatcher.dispatch_batch(normalize_batch(&payload)).await;
    assert_eq!(report.swapped(), 1);
    assert_eq!(setup.harness.rpc.send_count(), 2);
}

#[tokio::test]
async fn on_chain_registry_accepts_only_self_consistent_vaults() {
    let harness = Harness::new();
    let owner = Pubkey::new_unique();
    let (vault, bump) = find_vault_address(&owner, &VAULT_PROGRAM_ID);
    let settlement_account = associated_token_address(&vault, &CBBTC_MINT);
    let state = VaultAccount {
        owner,
        bump,
        settlement_account,
    };
    let impostor = Pubkey::new_unique();
    let foreign = Pubkey::new_unique();
    {
        let mut accounts = harness.rpc.accounts.lock().unwrap();
        for (address, program) in [
            (vault, VAULT_PROGRAM_ID),
            (impostor, VAULT_PROGRAM_ID),
            (foreign, Pubkey::new_unique()),
        ] {
            accounts.insert(
                address,
                AccountSnapshot {
                    owner: program,
                    lamports: 1_000_000,
                    data: state.to_bytes(),
                },
            );
        }
    }
    let registry =
        OnChainVaultRegistry::new(harness.rpc.clone(), VAULT_PROGRAM_ID, Duration::from_secs(1));

    let record = registry.resolve(&vault).await.unwrap().unwrap();
    assert_eq!(record.owner, owner);
    assert_eq!(record.settlement_account, settlement_account);
    assert!(registry.resolve(&impostor).await.unwrap().is_none());
    assert!(registry.resolve(&foreign).await.unwrap().is_none());
}

#[tokio::test]
async fn claims_survive_in_the_store_after_success() {
    let setup = setup(1, false);
    let deposit = deposit("sig-9", vault_of(&setup.owners[0]), Pubkey::new_unique(), 100);
    let key = deposit.key();

    setup.dispatcher.dispatch_batch(vec![deposit]).await;
    assert!(!setup.store.claim(&key).await.unwrap());
}
