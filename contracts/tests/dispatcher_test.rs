//! Integration tests for the inbound entry point: authentication,
//! routing, replay protection and all-or-nothing handler execution.

use xvault_contracts::devnet::{Devnet, DevnetConfig};
use xvault_contracts::dispatcher::deliver;
use xvault_contracts::error::{ErrorClass, LedgerError};
use xvault_protocol::message::{
    decode_body, encode_body, MessageKind, Payload, RateSync, WithdrawalAmount,
};
use xvault_protocol::storage::LedgerDB;
use xvault_protocol::types::Address;
use xvault_protocol::vault::VaultError;

const UNIT: u64 = 1_000_000;

fn devnet() -> Devnet {
    Devnet::new(DevnetConfig::default()).expect("devnet")
}

// ---------------------------------------------------------------------------
// Authentication & Routing
// ---------------------------------------------------------------------------

#[test]
fn only_the_router_may_deliver() {
    let mut net = devnet();
    net.deposit(100 * UNIT).expect("deposit");
    let envelope = net.router.pop_next().expect("queued");

    let mallory = Address::from_label("mallory");
    let err = deliver(
        &mut net.destination,
        &mut net.destination_env,
        &mut net.router,
        mallory,
        &envelope,
    )
    .unwrap_err();
    assert!(matches!(err, LedgerError::Unauthorized(a) if a == mallory));
    assert_eq!(net.destination.vault_shares(), 0);

    let router = net.router.address();
    deliver(
        &mut net.destination,
        &mut net.destination_env,
        &mut net.router,
        router,
        &envelope,
    )
    .expect("router delivery");
    assert_eq!(net.destination.vault_shares(), 80 * UNIT);
}

#[test]
fn envelopes_from_strangers_are_rejected() {
    let mut net = devnet();
    net.deposit(100 * UNIT).expect("deposit");
    let genuine = net.router.pop_next().expect("queued");
    let router = net.router.address();

    let mut forged = genuine.clone();
    forged.sender = Address::from_label("impostor");
    let err = deliver(
        &mut net.destination,
        &mut net.destination_env,
        &mut net.router,
        router,
        &forged,
    )
    .unwrap_err();
    assert!(matches!(err, LedgerError::UnknownPeer { .. }));

    let mut other_chain = genuine.clone();
    other_chain.source_chain = 99;
    let err = deliver(
        &mut net.destination,
        &mut net.destination_env,
        &mut net.router,
        router,
        &other_chain,
    )
    .unwrap_err();
    assert!(matches!(err, LedgerError::UnknownPeer { chain: 99, .. }));

    let mut misrouted = genuine.clone();
    misrouted.receiver = Address::from_label("someone-else");
    let err = deliver(
        &mut net.destination,
        &mut net.destination_env,
        &mut net.router,
        router,
        &misrouted,
    )
    .unwrap_err();
    assert!(matches!(err, LedgerError::Misrouted { .. }));
    assert_eq!(err.class(), ErrorClass::Precondition);
}

#[test]
fn ledgers_reject_kinds_they_do_not_handle() {
    let mut net = devnet();
    net.deposit(100 * UNIT).expect("deposit");
    let mut envelope = net.router.pop_next().expect("queued");
    let router = net.router.address();

    envelope.data = encode_body(&Payload::SyncAssetsPerShare(RateSync {
        assets_per_share: 1,
        marker: 1,
    }))
    .expect("encode");
    envelope.amount = 0;
    let err = deliver(
        &mut net.destination,
        &mut net.destination_env,
        &mut net.router,
        router,
        &envelope,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::UnexpectedMessage(MessageKind::SyncAssetsPerShare)
    ));
    assert_eq!(err.class(), ErrorClass::Decode);
}

#[test]
fn accounting_messages_must_not_carry_assets() {
    let mut net = devnet();
    let sync = net.sync().expect("sync");
    let mut envelope = net.router.take(&sync).expect("queued");
    envelope.amount = 1;
    let router = net.router.address();

    let err = deliver(
        &mut net.source,
        &mut net.source_env,
        &mut net.router,
        router,
        &envelope,
    )
    .unwrap_err();
    assert!(matches!(err, LedgerError::UnexpectedAmount { amount: 1, .. }));
    assert_eq!(net.source.update_epoch(), 0);
}

#[test]
fn garbage_bodies_are_decode_errors() {
    let mut net = devnet();
    net.deposit(1).expect("deposit");
    let mut envelope = net.router.pop_next().expect("queued");
    envelope.data = vec![1, 0];
    let router = net.router.address();

    let err = deliver(
        &mut net.destination,
        &mut net.destination_env,
        &mut net.router,
        router,
        &envelope,
    )
    .unwrap_err();
    assert!(matches!(err, LedgerError::Codec(_)));
}

// ---------------------------------------------------------------------------
// Replay
// ---------------------------------------------------------------------------

#[test]
fn duplicate_confirmation_does_not_pay_twice() {
    let mut net = devnet();
    net.deposit(100 * UNIT).expect("deposit");
    net.dispatch_all().expect("deposit legs");

    let recipient = Address::from_label("recipient");
    net.withdraw(WithdrawalAmount::All, recipient, vec![]).expect("withdraw");
    net.dispatch_next().expect("request delivered");

    let confirmation = net.router.peek().cloned().expect("confirmation queued");
    net.dispatch_next().expect("confirmation delivered");
    let paid = net.source_env.asset.balance_of(&recipient);
    assert!(paid > 0);

    // Through the router: refused before reaching the ledger.
    let err = net.replay(&confirmation).unwrap_err();
    assert_eq!(err.class(), ErrorClass::Replay);

    // Straight into the ledger: the pending record is gone.
    let payload = decode_body(&confirmation.data).expect("decode");
    let Payload::WithdrawalConfirmed(conf) = payload else {
        panic!("expected a confirmation, got {payload:?}");
    };
    let err = net
        .source
        .handle_withdrawal_confirmed(&mut net.source_env, &conf, confirmation.amount)
        .unwrap_err();
    assert!(matches!(err, LedgerError::UnknownWithdrawal(id) if id == conf.request_id));

    assert_eq!(net.source_env.asset.balance_of(&recipient), paid);
    assert_eq!(net.source.total_shares(), 0);
}

#[test]
fn duplicate_ack_does_not_double_credit_shares() {
    let mut net = devnet();
    net.deposit(100 * UNIT).expect("deposit");
    net.dispatch_next().expect("deposit delivered");
    let ack = net.router.peek().cloned().expect("ack queued");
    net.dispatch_next().expect("ack delivered");

    assert_eq!(net.replay(&ack).unwrap_err().class(), ErrorClass::Replay);

    let Payload::DepositAck(payload) = decode_body(&ack.data).expect("decode") else {
        panic!("expected an ack");
    };
    let err = net.source.handle_deposit_ack(&payload).unwrap_err();
    assert!(matches!(err, LedgerError::UnknownDeposit(_)));
    assert_eq!(net.source.total_shares(), 80 * UNIT);
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

#[test]
fn failed_out_of_order_delivery_keeps_its_place() {
    let mut net = devnet();
    net.deposit(100 * UNIT).expect("deposit");
    net.dispatch_all().expect("settle");

    net.deposit(50 * UNIT).expect("deposit");
    net.withdraw(WithdrawalAmount::All, Address::from_label("recipient"), vec![])
        .expect("withdraw");
    net.dispatch_next().expect("deliver deposit");
    net.dispatch_next().expect("deliver request");

    let queued: Vec<MessageKind> = net
        .router
        .queue()
        .map(|e| decode_body(&e.data).expect("decode").kind())
        .collect();
    assert_eq!(
        queued,
        vec![MessageKind::DepositAck, MessageKind::WithdrawalConfirmed]
    );
    let ack = net.router.queue().next().expect("ack").id;
    let confirmation = net.router.queue().nth(1).expect("confirmation").id;

    // The confirmation redeems shares the source has not been told about.
    let err = net.dispatch_id(&confirmation).unwrap_err();
    assert!(matches!(err, LedgerError::ShareUnderflow { .. }));
    assert!(!err.is_retryable());

    let order: Vec<_> = net.router.queue().map(|e| e.id).collect();
    assert_eq!(order, vec![ack, confirmation]);

    let delivered = net.dispatch_all().expect("dispatch");
    assert_eq!(delivered.len(), 2);
    assert_eq!(net.source.total_shares(), 0);
    assert_eq!(net.router.pending(), 0);
}

// ---------------------------------------------------------------------------
// Atomicity
// ---------------------------------------------------------------------------

#[test]
fn paused_vault_aborts_then_redelivery_succeeds() {
    let mut net = devnet();
    let deposit = net.deposit(100 * UNIT).expect("deposit");
    net.set_vault_paused(true);
    let destination_assets = net.destination_env.asset.clone();

    let err = net.dispatch_next().unwrap_err();
    assert!(matches!(err, LedgerError::Vault(VaultError::Paused)));
    assert!(err.is_retryable());

    // No partial effects anywhere, and the message is still first in line.
    assert_eq!(net.destination_env.asset, destination_assets);
    assert_eq!(net.destination.vault_shares(), 0);
    assert!(net.destination.events().is_empty());
    assert_eq!(net.router.pending(), 1);
    assert_eq!(net.router.peek().map(|e| e.id), Some(deposit));
    assert_eq!(net.source.total_pending_deposits(), 100 * UNIT);
    assert!(!net.router.is_delivered(&deposit));

    net.set_vault_paused(false);
    let delivered = net.dispatch_all().expect("redelivery");
    assert_eq!(delivered.len(), 2);
    assert_eq!(net.source.total_pending_deposits(), 0);
    assert_eq!(net.source.total_shares(), 80 * UNIT);
}

#[test]
fn paused_vault_holds_withdrawal_until_resumed() {
    let mut net = devnet();
    net.deposit(100 * UNIT).expect("deposit");
    net.dispatch_all().expect("deposit legs");

    let recipient = Address::from_label("recipient");
    net.withdraw(WithdrawalAmount::All, recipient, vec![]).expect("withdraw");
    net.set_vault_paused(true);
    assert!(net.dispatch_all().is_err());
    assert_eq!(net.source.pending_withdrawal_count(), 1);
    assert_eq!(net.destination.vault_shares(), 80 * UNIT);

    net.set_vault_paused(false);
    net.dispatch_all().expect("dispatch");
    assert_eq!(net.source.pending_withdrawal_count(), 0);
    assert_eq!(net.source.total_shares(), 0);
}

#[test]
fn unfunded_fee_aborts_the_reply_and_the_deposit_execution() {
    let mut net = devnet();
    net.deposit(100 * UNIT).expect("deposit");
    let fee_balance = net
        .destination_env
        .fee_token
        .balance_of(&net.destination.address());
    net.destination
        .withdraw_fee_token(&mut net.destination_env, Address::from_label("treasury"), fee_balance)
        .expect("drain fees");

    let err = net.dispatch_next().unwrap_err();
    assert_eq!(err.class(), ErrorClass::Transport);
    assert_eq!(net.destination.vault_shares(), 0);
    assert_eq!(net.router.pending(), 1);
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[test]
fn in_flight_messages_survive_a_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    {
        let mut net = devnet();
        net.deposit(100 * UNIT).expect("deposit");
        let db = LedgerDB::open(dir.path()).expect("open");
        net.save(&db).expect("save");
    }

    let db = LedgerDB::open(dir.path()).expect("reopen");
    let mut net = Devnet::load(&db).expect("load").expect("snapshot present");
    assert_eq!(net.source.total_pending_deposits(), 100 * UNIT);
    assert_eq!(net.router.pending(), 1);

    net.dispatch_all().expect("dispatch");
    assert_eq!(net.source.total_shares(), 80 * UNIT);
}
