//! Performance benchmarks for start-token signing and verification

use chrono::Duration;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ready_room::token::TokenCodec;

fn bench_token_issue(c: &mut Criterion) {
    let codec = TokenCodec::new("bench-secret", Duration::seconds(300)).unwrap();

    c.bench_function("token_issue", |b| {
        b.iter(|| codec.issue(black_box("ds-1"), black_box("m_42"), black_box("m_42")))
    });
}

fn bench_token_verify(c: &mut Criterion) {
    let codec = TokenCodec::new("bench-secret", Duration::seconds(300)).unwrap();
    let issued = codec.issue("ds-1", "m_42", "m_42");

    c.bench_function("token_verify", |b| {
        b.iter(|| codec.verify(black_box(&issued.token)))
    });

    let mut tampered = issued.token.clone();
    tampered.pop();
    tampered.push('x');
    c.bench_function("token_verify_reject", |b| {
        b.iter(|| codec.verify(black_box(&tampered)))
    });
}

criterion_group!(benches, bench_token_issue, bench_token_verify);
criterion_main!(benches);
