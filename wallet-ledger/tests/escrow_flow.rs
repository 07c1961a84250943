//! End-to-end flows through the ledger facade
//!
//! Covers the escrow lifecycle (hold → release | refund), idempotent
//! resolution, atomic failure of hold creation, and the deposit/withdrawal
//! fee scenarios.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use wallet_ledger::{
    Config, CreateHoldRequest, Currency, EscrowStatus, Error, Ledger, ProfileId,
    TransactionFilter, TransactionStatus, TransactionType, Wallet,
};

fn test_ledger() -> (Ledger, tempfile::TempDir) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.data_dir = temp_dir.path().to_path_buf();
    (Ledger::open(config).unwrap(), temp_dir)
}

/// Create a wallet holding exactly `amount` (primed without fees so the
/// scenarios control round numbers).
fn primed_wallet(ledger: &Ledger, owner: &str, amount: Decimal) -> Wallet {
    let wallet = ledger
        .wallets()
        .create(ProfileId::new(owner), Currency::USD, false)
        .unwrap();
    ledger
        .wallets()
        .adjust_balance(&wallet.id, amount, wallet.version)
        .unwrap()
}

fn hold_request(funder: &Wallet, receiver: &str, amount: Decimal) -> CreateHoldRequest {
    CreateHoldRequest {
        contract_id: wallet_ledger::ContractId::new("contract-1"),
        milestone_id: Some("milestone-1".to_string()),
        funder_wallet_id: funder.id.clone(),
        receiver_profile_id: ProfileId::new(receiver),
        amount,
        currency: Currency::USD,
    }
}

#[tokio::test]
async fn escrow_round_trip() {
    let (ledger, _temp) = test_ledger();
    let funder = primed_wallet(&ledger, "funder", dec!(200.00));

    // Hold 80.00
    let hold = ledger
        .create_hold(hold_request(&funder, "receiver", dec!(80.00)))
        .await
        .unwrap();
    assert_eq!(hold.status, EscrowStatus::Held);
    assert_eq!(
        ledger.wallets().get(&funder.id).unwrap().balance,
        dec!(120.00)
    );

    // Release to the receiver
    let released = ledger.release_hold(hold.id).await.unwrap();
    assert_eq!(released.status, EscrowStatus::Released);
    assert!(released.resolved_at.is_some());

    let receiver_wallet = ledger
        .wallets()
        .get_default(&ProfileId::new("receiver"), Currency::USD)
        .unwrap()
        .expect("release should have created a receiver wallet");
    assert_eq!(receiver_wallet.balance, dec!(80.00));

    // Funder balance unchanged by the release
    assert_eq!(
        ledger.wallets().get(&funder.id).unwrap().balance,
        dec!(120.00)
    );
}

#[tokio::test]
async fn release_is_idempotent() {
    let (ledger, _temp) = test_ledger();
    let funder = primed_wallet(&ledger, "funder", dec!(200.00));

    let hold = ledger
        .create_hold(hold_request(&funder, "receiver", dec!(80.00)))
        .await
        .unwrap();

    let first = ledger.release_hold(hold.id).await.unwrap();
    let second = ledger.release_hold(hold.id).await.unwrap();

    assert_eq!(first.status, EscrowStatus::Released);
    assert_eq!(second.status, EscrowStatus::Released);
    assert_eq!(
        first.resolution_transaction_id,
        second.resolution_transaction_id
    );

    // One credit, not two
    let receiver_wallet = ledger
        .wallets()
        .get_default(&ProfileId::new("receiver"), Currency::USD)
        .unwrap()
        .unwrap();
    assert_eq!(receiver_wallet.balance, dec!(80.00));

    let releases = ledger
        .transactions()
        .list_by_wallet(
            &receiver_wallet.id,
            &TransactionFilter {
                tx_type: Some(TransactionType::EscrowRelease),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(releases.len(), 1);
}

#[tokio::test]
async fn refund_returns_funds_to_funder() {
    let (ledger, _temp) = test_ledger();
    let funder = primed_wallet(&ledger, "funder", dec!(200.00));

    let hold = ledger
        .create_hold(hold_request(&funder, "receiver", dec!(80.00)))
        .await
        .unwrap();
    assert_eq!(
        ledger.wallets().get(&funder.id).unwrap().balance,
        dec!(120.00)
    );

    let refunded = ledger.refund_hold(hold.id).await.unwrap();
    assert_eq!(refunded.status, EscrowStatus::Refunded);
    assert_eq!(
        ledger.wallets().get(&funder.id).unwrap().balance,
        dec!(200.00)
    );

    // The refund never touched the receiver
    assert!(ledger
        .wallets()
        .get_default(&ProfileId::new("receiver"), Currency::USD)
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn release_after_refund_is_absorbed() {
    let (ledger, _temp) = test_ledger();
    let funder = primed_wallet(&ledger, "funder", dec!(200.00));

    let hold = ledger
        .create_hold(hold_request(&funder, "receiver", dec!(80.00)))
        .await
        .unwrap();
    ledger.refund_hold(hold.id).await.unwrap();

    // A later release call sees the terminal record and does nothing
    let resolved = ledger.release_hold(hold.id).await.unwrap();
    assert_eq!(resolved.status, EscrowStatus::Refunded);
    assert!(ledger
        .wallets()
        .get_default(&ProfileId::new("receiver"), Currency::USD)
        .unwrap()
        .is_none());
    assert_eq!(
        ledger.wallets().get(&funder.id).unwrap().balance,
        dec!(200.00)
    );
}

#[tokio::test]
async fn failed_hold_leaves_no_trace_but_a_failed_transaction() {
    let (ledger, _temp) = test_ledger();
    let funder = primed_wallet(&ledger, "funder", dec!(50.00));

    let result = ledger
        .create_hold(hold_request(&funder, "receiver", dec!(80.00)))
        .await;
    assert!(matches!(result, Err(Error::InsufficientFunds { .. })));

    // Funder untouched
    assert_eq!(
        ledger.wallets().get(&funder.id).unwrap().balance,
        dec!(50.00)
    );

    // No hold exists for the contract
    let holds = ledger
        .escrows()
        .list_by_contract(&wallet_ledger::ContractId::new("contract-1"))
        .unwrap();
    assert!(holds.is_empty());

    // The opened transaction is failed, not completed
    let txs = ledger
        .transactions()
        .list_by_wallet(
            &funder.id,
            &TransactionFilter {
                tx_type: Some(TransactionType::EscrowHold),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(txs.len(), 1);
    assert_eq!(txs[0].status, TransactionStatus::Failed);
    assert!(txs[0].failure_reason.is_some());
}

#[tokio::test]
async fn hold_rejects_currency_mismatch_before_any_write() {
    let (ledger, _temp) = test_ledger();
    let funder = primed_wallet(&ledger, "funder", dec!(200.00));

    let mut request = hold_request(&funder, "receiver", dec!(80.00));
    request.currency = Currency::EUR;

    let result = ledger.create_hold(request).await;
    assert!(matches!(result, Err(Error::CurrencyMismatch { .. })));

    // Nothing was opened
    let txs = ledger
        .transactions()
        .list_by_wallet(&funder.id, &TransactionFilter::default())
        .unwrap();
    assert!(txs.is_empty());
}

#[tokio::test]
async fn release_transaction_links_back_to_hold() {
    let (ledger, _temp) = test_ledger();
    let funder = primed_wallet(&ledger, "funder", dec!(200.00));

    let hold = ledger
        .create_hold(hold_request(&funder, "receiver", dec!(80.00)))
        .await
        .unwrap();
    let released = ledger.release_hold(hold.id).await.unwrap();

    let resolution_tx = ledger
        .transactions()
        .get(released.resolution_transaction_id.unwrap())
        .unwrap();
    assert_eq!(
        resolution_tx.related_transaction_id,
        Some(hold.hold_transaction_id)
    );
    assert_eq!(resolution_tx.tx_type, TransactionType::EscrowRelease);
    assert_eq!(resolution_tx.status, TransactionStatus::Completed);
}

#[tokio::test]
async fn deposit_scenario_from_handbook() {
    let (ledger, _temp) = test_ledger();
    let wallet = primed_wallet(&ledger, "profile-1", dec!(100.00));

    let receipt = ledger.deposit(&wallet.id, dec!(50.00)).await.unwrap();

    assert_eq!(receipt.fee, dec!(1.00));
    assert_eq!(receipt.net_amount, dec!(49.00));
    assert_eq!(receipt.status, TransactionStatus::Completed);
    assert_eq!(receipt.wallet_balance, dec!(149.00));
}

#[tokio::test]
async fn withdrawal_insufficient_funds_scenario() {
    let (ledger, _temp) = test_ledger();
    let wallet = primed_wallet(&ledger, "profile-1", dec!(30.00));

    let result = ledger.withdraw(&wallet.id, dec!(50.00)).await;
    assert!(matches!(result, Err(Error::InsufficientFunds { .. })));
    assert_eq!(
        ledger.wallets().get(&wallet.id).unwrap().balance,
        dec!(30.00)
    );

    let completed = ledger
        .transactions()
        .list_by_wallet(
            &wallet.id,
            &TransactionFilter {
                status: Some(TransactionStatus::Completed),
                ..Default::default()
            },
        )
        .unwrap();
    assert!(completed.is_empty());
}

#[tokio::test]
async fn conservation_holds_across_escrow_flow() {
    let (ledger, _temp) = test_ledger();
    let funder = ledger
        .wallets()
        .create(ProfileId::new("funder"), Currency::USD, false)
        .unwrap();

    // Fund through the facade so every balance effect has a transaction
    ledger.deposit(&funder.id, dec!(300.00)).await.unwrap();

    let hold = ledger
        .create_hold(hold_request(&funder, "receiver", dec!(100.00)))
        .await
        .unwrap();
    ledger.release_hold(hold.id).await.unwrap();
    ledger.withdraw(&funder.id, dec!(50.00)).await.unwrap();

    assert!(ledger.check_conservation(&funder.id).unwrap());

    let receiver_wallet = ledger
        .wallets()
        .get_default(&ProfileId::new("receiver"), Currency::USD)
        .unwrap()
        .unwrap();
    assert!(ledger.check_conservation(&receiver_wallet.id).unwrap());
}

#[tokio::test]
async fn concurrent_deposits_serialize() {
    let (ledger, _temp) = test_ledger();
    let wallet = primed_wallet(&ledger, "profile-1", dec!(0.00));
    let ledger = Arc::new(ledger);

    let mut handles = Vec::new();
    for _ in 0..10 {
        let ledger = ledger.clone();
        let wallet_id = wallet.id.clone();
        handles.push(tokio::spawn(async move {
            ledger.deposit(&wallet_id, dec!(10.00)).await
        }));
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // 10 deposits of 10.00 at 2% fee each credit 9.80
    let stored = ledger.wallets().get(&wallet.id).unwrap();
    assert_eq!(stored.balance, dec!(98.00));
    assert_eq!(stored.version, 11); // priming + 10 deposits
    assert!(ledger.check_conservation(&wallet.id).unwrap());
}

#[tokio::test]
async fn concurrent_resolutions_credit_once() {
    let (ledger, _temp) = test_ledger();
    let funder = primed_wallet(&ledger, "funder", dec!(200.00));

    let hold = ledger
        .create_hold(hold_request(&funder, "receiver", dec!(80.00)))
        .await
        .unwrap();

    let ledger = Arc::new(ledger);
    let mut handles = Vec::new();
    for _ in 0..5 {
        let ledger = ledger.clone();
        let hold_id = hold.id;
        handles.push(tokio::spawn(
            async move { ledger.release_hold(hold_id).await },
        ));
    }

    for handle in handles {
        let resolved = handle.await.unwrap().unwrap();
        assert_eq!(resolved.status, EscrowStatus::Released);
    }

    let receiver_wallet = ledger
        .wallets()
        .get_default(&ProfileId::new("receiver"), Currency::USD)
        .unwrap()
        .unwrap();
    assert_eq!(receiver_wallet.balance, dec!(80.00));
}
