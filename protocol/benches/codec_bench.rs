// Message codec benchmarks.
//
// Encoding and decoding of every message kind, plus router send throughput.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use xvault_protocol::chain::ChainEnv;
use xvault_protocol::message::{
    decode_body, encode_body, DepositAck, Payload, RateSync, WithdrawalAmount,
    WithdrawalConfirmation,
};
use xvault_protocol::token::TokenLedger;
use xvault_protocol::transport::{AsyncRouter, OutboundMessage, Transport};
use xvault_protocol::types::{Address, MessageId};

fn payloads() -> Vec<(&'static str, Payload)> {
    vec![
        ("deposit", Payload::Deposit),
        (
            "depositAck",
            Payload::DepositAck(DepositAck {
                deposit_id: MessageId([0x11; 32]),
                assets: 100_000_000,
                shares_minted: 80_000_000,
                assets_per_share: 1_249_999,
                marker: 1_024,
            }),
        ),
        (
            "withdrawalRequest",
            Payload::WithdrawalRequest(WithdrawalAmount::All),
        ),
        (
            "withdrawalConfirmed",
            Payload::WithdrawalConfirmed(WithdrawalConfirmation {
                request_id: MessageId([0x22; 32]),
                shares_redeemed: 80_000_000,
            }),
        ),
        (
            "syncAssetsPerShare",
            Payload::SyncAssetsPerShare(RateSync {
                assets_per_share: 1_249_999,
                marker: 2_048,
            }),
        ),
    ]
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec/encode");
    for (name, payload) in payloads() {
        group.bench_with_input(BenchmarkId::from_parameter(name), &payload, |b, p| {
            b.iter(|| encode_body(black_box(p)).unwrap());
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec/decode");
    for (name, payload) in payloads() {
        let body = encode_body(&payload).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(name), &body, |b, body| {
            b.iter(|| decode_body(black_box(body)).unwrap());
        });
    }
    group.finish();
}

fn bench_router_send(c: &mut Criterion) {
    let mut group = c.benchmark_group("router/send");
    let sender = Address::from_label("source-ledger");
    let receiver = Address::from_label("destination-ledger");
    let data = encode_body(&Payload::WithdrawalRequest(WithdrawalAmount::Exact(80))).unwrap();

    for size in [10u64, 100, 1_000] {
        group.throughput(Throughput::Elements(size));
        group.bench_function(BenchmarkId::from_parameter(size), |b| {
            b.iter(|| {
                let mut env =
                    ChainEnv::new(1, TokenLedger::new("USDC", 6), TokenLedger::new("LINK", 18));
                env.fee_token.mint(sender, size).unwrap();
                let mut router = AsyncRouter::new(Address::from_label("router"), 1);
                for _ in 0..size {
                    let msg = OutboundMessage {
                        dest_chain: 2,
                        receiver,
                        data: data.clone(),
                        amount: 0,
                        gas_limit: 999_999,
                    };
                    router.send(&mut env, sender, msg).unwrap();
                }
                router.pending()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode, bench_router_send);
criterion_main!(benches);
