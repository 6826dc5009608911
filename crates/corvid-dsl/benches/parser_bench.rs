use criterion::{black_box, criterion_group, criterion_main, Criterion};

const MAC_AUTHENTICATION: &str = include_str!("../../../models/mac_authentication.vp");
const UNGUARDED_DH: &str = include_str!("../../../models/unguarded_dh.vp");
const SIGNED_HANDSHAKE: &str = include_str!("../../../models/signed_handshake.vp");

fn bench_parse_mac(c: &mut Criterion) {
    c.bench_function("parse_mac_authentication", |b| {
        b.iter(|| corvid_dsl::parse(black_box(MAC_AUTHENTICATION), "mac_authentication.vp").unwrap())
    });
}

fn bench_parse_dh(c: &mut Criterion) {
    c.bench_function("parse_unguarded_dh", |b| {
        b.iter(|| corvid_dsl::parse(black_box(UNGUARDED_DH), "unguarded_dh.vp").unwrap())
    });
}

fn bench_parse_handshake(c: &mut Criterion) {
    c.bench_function("parse_signed_handshake", |b| {
        b.iter(|| corvid_dsl::parse(black_box(SIGNED_HANDSHAKE), "signed_handshake.vp").unwrap())
    });
}

criterion_group!(benches, bench_parse_mac, bench_parse_dh, bench_parse_handshake);
criterion_main!(benches);
