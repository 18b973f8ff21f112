//! Integration tests for the settlement round trips.
//!
//! Every test drives a full devnet: messages are queued by one ledger and
//! only reach the other when the test dispatches them, which is how the
//! in-flight windows of the protocol get exercised.

use xvault_contracts::devnet::{Devnet, DevnetConfig, Side};
use xvault_contracts::events::LedgerEvent;
use xvault_protocol::message::{MessageKind, WithdrawalAmount};
use xvault_protocol::rate::{assets_to_shares, shares_to_assets};
use xvault_protocol::types::Address;
use xvault_protocol::vault::YieldVault;

const UNIT: u64 = 1_000_000;

fn devnet() -> Devnet {
    Devnet::new(DevnetConfig::default()).expect("devnet")
}

fn recipient() -> Address {
    Address::from_label("recipient")
}

/// Deposits `amount` and delivers both legs.
fn settled_deposit(net: &mut Devnet, amount: u64) {
    net.deposit(amount).expect("deposit");
    let legs = net.dispatch_all().expect("dispatch");
    assert_eq!(legs.len(), 2);
}

// ---------------------------------------------------------------------------
// Deposits
// ---------------------------------------------------------------------------

#[test]
fn reference_deposit_of_one_hundred_yields_eighty_shares() {
    let mut net = devnet();
    settled_deposit(&mut net, 100);

    assert_eq!(net.source.total_shares(), 80);
    assert_eq!(net.source.total_pending_deposits(), 0);
    let total = net.source.total_assets();
    assert!(total <= 100 && total >= 99, "total_assets={total}");
}

#[test]
fn deposit_round_trip_moves_pending_into_shares() {
    let mut net = devnet();
    let before = net.source_env.asset.balance_of(&net.depositor());

    let id = net.deposit(100 * UNIT).expect("deposit");
    assert_eq!(net.source.total_pending_deposits(), 100 * UNIT);
    assert_eq!(net.source.total_assets(), 100 * UNIT);
    assert_eq!(net.source_env.asset.balance_of(&net.depositor()), before - 100 * UNIT);

    let first = net.dispatch_next().expect("deliver").expect("queued");
    assert_eq!(first.id, id);
    assert_eq!(first.kind, MessageKind::Deposit);
    assert_eq!(first.to, Side::Destination);
    assert_eq!(net.destination.vault_shares(), 80 * UNIT);
    // Still pending until the ack lands.
    assert_eq!(net.source.total_pending_deposits(), 100 * UNIT);

    let second = net.dispatch_next().expect("deliver").expect("queued");
    assert_eq!(second.kind, MessageKind::DepositAck);
    assert_eq!(second.to, Side::Source);
    assert_eq!(net.source.total_pending_deposits(), 0);
    assert_eq!(net.source.total_shares(), 80 * UNIT);
    assert_eq!(net.source.assets_per_share().raw, 1_249_999);
    assert_eq!(net.source.total_assets(), 99_999_920);
    assert!(net.source.pending_deposit(&id).is_none());
}

#[test]
fn conversion_never_returns_more_than_deposited() {
    let mut net = devnet();
    for amount in [1u64, 7, 333, 12_345_678] {
        settled_deposit(&mut net, amount);
    }
    let rate = net.source.assets_per_share();
    for amount in [1u64, 7, 333, 12_345_678] {
        assert!(shares_to_assets(assets_to_shares(amount, rate), rate) <= amount);
    }
    assert_eq!(net.source.total_shares(), net.destination.vault_shares());
}

#[test]
fn concurrent_deposits_settle_independently() {
    let mut net = devnet();
    let a = net.deposit(10 * UNIT).expect("deposit");
    let b = net.deposit(20 * UNIT).expect("deposit");
    assert_eq!(net.source.total_pending_deposits(), 30 * UNIT);

    // Both deposits reach the destination before either ack comes back.
    net.dispatch_id(&a).expect("deliver");
    net.dispatch_id(&b).expect("deliver");
    net.dispatch_all().expect("acks");

    assert_eq!(net.source.total_pending_deposits(), 0);
    assert_eq!(net.source.total_shares(), net.destination.vault_shares());
}

// ---------------------------------------------------------------------------
// Withdrawals
// ---------------------------------------------------------------------------

#[test]
fn withdraw_all_settles_entire_destination_balance() {
    let mut net = devnet();
    settled_deposit(&mut net, 100 * UNIT);

    let request = net
        .withdraw(WithdrawalAmount::All, recipient(), b"close".to_vec())
        .expect("withdraw");
    // Nothing is decremented at request time.
    assert_eq!(net.source.total_shares(), 80 * UNIT);
    assert!(net.source.pending_withdrawal(&request).is_some());

    net.dispatch_all().expect("dispatch");

    assert_eq!(net.source.total_shares(), 0);
    assert_eq!(net.destination.vault_shares(), 0);
    assert_eq!(net.source.pending_withdrawal_count(), 0);
    assert_eq!(net.source_env.asset.balance_of(&recipient()), 99_999_999);
    assert_eq!(net.source_env.asset.balance_of(&net.source.address()), 0);
    assert!(net.source.events().iter().any(|e| matches!(
        e,
        LedgerEvent::WithdrawalSettled { shares, assets: 99_999_999, memo, .. }
            if *shares == 80 * UNIT && memo.as_slice() == b"close"
    )));
}

#[test]
fn withdraw_all_picks_up_shares_minted_after_the_request() {
    let mut net = devnet();
    settled_deposit(&mut net, 100 * UNIT);

    // The deposit is sent after the "all" request but overtakes it, so its
    // shares are minted before the request executes.
    let request = net
        .withdraw(WithdrawalAmount::All, recipient(), vec![])
        .expect("withdraw");
    let deposit = net.deposit(50 * UNIT).expect("deposit");
    net.dispatch_id(&deposit).expect("deliver deposit");
    let minted = net.destination.vault_shares() - 80 * UNIT;
    assert!(minted > 0);

    let delivered = net.dispatch_all().expect("dispatch");
    let kinds: Vec<MessageKind> = delivered.iter().map(|d| d.kind).collect();
    assert_eq!(
        kinds,
        vec![
            MessageKind::WithdrawalRequest,
            MessageKind::DepositAck,
            MessageKind::WithdrawalConfirmed,
        ]
    );

    assert_eq!(net.destination.vault_shares(), 0);
    assert_eq!(net.source.total_shares(), 0);
    assert_eq!(net.source.total_pending_deposits(), 0);
    assert!(net.source.events().iter().any(|e| matches!(
        e,
        LedgerEvent::WithdrawalSettled { request_id, shares, .. }
            if *request_id == request && *shares == 80 * UNIT + minted
    )));
}

#[test]
fn exact_request_behind_withdraw_all_is_refused_and_channel_drains() {
    let mut net = devnet();
    settled_deposit(&mut net, 100 * UNIT);

    net.withdraw(WithdrawalAmount::All, recipient(), vec![])
        .expect("withdraw all");
    let sent = net.router.sent_count();
    let err = net
        .withdraw(WithdrawalAmount::Exact(80 * UNIT), recipient(), vec![])
        .unwrap_err();
    assert!(err.to_string().contains("insufficient shares"));
    assert_eq!(net.router.sent_count(), sent);
    assert_eq!(net.source.pending_withdrawal_count(), 1);

    net.deposit(10 * UNIT).expect("deposit");
    net.dispatch_all().expect("dispatch");

    assert_eq!(net.router.pending(), 0);
    assert_eq!(net.source.pending_withdrawal_count(), 0);
    assert_eq!(net.source.total_pending_deposits(), 0);
    assert_eq!(net.source_env.asset.balance_of(&recipient()), 99_999_999);
    // Only the late deposit's shares remain, on both sides.
    assert!(net.source.total_shares() > 0);
    assert_eq!(net.source.total_shares(), net.destination.vault_shares());
    assert_eq!(net.source.available_shares(), net.source.total_shares());
}

#[test]
fn exact_withdrawal_leaves_remainder() {
    let mut net = devnet();
    settled_deposit(&mut net, 100 * UNIT);

    net.withdraw(WithdrawalAmount::Exact(30 * UNIT), recipient(), vec![])
        .expect("withdraw");
    net.dispatch_all().expect("dispatch");

    assert_eq!(net.source.total_shares(), 50 * UNIT);
    assert_eq!(net.destination.vault_shares(), 50 * UNIT);
    let paid = net.source_env.asset.balance_of(&recipient());
    assert!(paid > 37 * UNIT && paid < 38 * UNIT, "paid={paid}");
}

#[test]
fn exact_withdrawal_beyond_settled_shares_rejected() {
    let mut net = devnet();
    settled_deposit(&mut net, 100 * UNIT);
    let sent = net.router.sent_count();

    let err = net
        .withdraw(WithdrawalAmount::Exact(80 * UNIT + 1), recipient(), vec![])
        .unwrap_err();
    assert!(err.to_string().contains("insufficient shares"));
    assert_eq!(net.router.sent_count(), sent);
    assert_eq!(net.source.pending_withdrawal_count(), 0);
}

// ---------------------------------------------------------------------------
// Rate synchronization
// ---------------------------------------------------------------------------

#[test]
fn stale_sync_leaves_rate_and_epoch_unchanged() {
    let mut net = devnet();
    let older = net.sync().expect("sync");
    net.accrue_yield(250 * UNIT).expect("yield");
    let newer = net.sync().expect("sync");
    let newer_rate = net.destination.assets_per_share();

    net.dispatch_id(&newer).expect("deliver newer");
    let epoch = net.source.update_epoch();
    assert_eq!(net.source.assets_per_share().raw, newer_rate);

    net.dispatch_id(&older).expect("deliver older");
    assert_eq!(net.source.update_epoch(), epoch);
    assert_eq!(net.source.assets_per_share().raw, newer_rate);
    assert!(matches!(
        net.source.events().last(),
        Some(LedgerEvent::StaleSyncIgnored { .. })
    ));
}

#[test]
fn ack_rate_cannot_overwrite_a_newer_sync() {
    let mut net = devnet();
    net.deposit(100 * UNIT).expect("deposit");
    net.dispatch_next().expect("deposit delivered");
    // The ack is queued; a newer reading overtakes it.
    net.accrue_yield(100 * UNIT).expect("yield");
    let sync = net.sync().expect("sync");
    net.dispatch_id(&sync).expect("sync delivered");
    let synced = net.source.assets_per_share();

    net.dispatch_all().expect("ack delivered");
    assert_eq!(net.source.total_shares(), 80 * UNIT);
    assert_eq!(net.source.assets_per_share(), synced);
}

#[test]
fn loss_is_visible_only_after_the_next_sync() {
    let mut net = devnet();
    settled_deposit(&mut net, 100 * UNIT);
    let before = net.source.total_assets();
    assert_eq!(before, 99_999_920);

    net.realize_loss(135 * UNIT).expect("loss");
    assert_eq!(net.source.total_assets(), before);

    net.sync().expect("sync");
    assert_eq!(net.source.total_assets(), before);

    net.dispatch_all().expect("dispatch");
    assert_eq!(net.source.assets_per_share().raw, 1_124_999);
    assert_eq!(net.source.total_assets(), 89_999_920);
}

#[test]
fn yield_raises_total_assets_after_sync() {
    let mut net = devnet();
    settled_deposit(&mut net, 100 * UNIT);
    let before = net.source.total_assets();

    net.accrue_yield(108 * UNIT).expect("yield");
    net.sync().expect("sync");
    net.dispatch_all().expect("dispatch");

    assert!(net.source.total_assets() > before);
    assert_eq!(
        net.source.assets_per_share().raw,
        net.destination.vault().assets_per_share()
    );
}
