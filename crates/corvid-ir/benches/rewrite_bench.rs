use criterion::{black_box, criterion_group, criterion_main, Criterion};

use corvid_ir::primitive::PrimitiveId;
use corvid_ir::resolve::{resolve_all_principal_state_values, DEFAULT_MAX_DEPTH};
use corvid_ir::rewrite::{perform_all_rewrites, rewrite_value};
use corvid_ir::value::{Constant, Declaration, Primitive, Qualifier, Value};

const SIGNED_HANDSHAKE: &str = include_str!("../../../models/signed_handshake.vp");

fn c(name: &str) -> Value {
    Value::Constant(Constant::new(name, Declaration::Knows, Qualifier::Private))
}

fn bench_nested_rewrite(c_: &mut Criterion) {
    let mut v = c("m");
    for i in 0..16 {
        let key = c(&format!("k{i}"));
        let enc = Primitive::new(PrimitiveId::Enc, vec![key.clone(), v]);
        v = Value::Primitive(Primitive::new(PrimitiveId::Dec, vec![key, enc.into()]));
    }
    c_.bench_function("rewrite_nested_dec_enc", |b| {
        b.iter(|| rewrite_value(black_box(&v)))
    });
}

fn bench_lower_and_rewrite(c_: &mut Criterion) {
    let model = corvid_dsl::parse(SIGNED_HANDSHAKE, "signed_handshake.vp").unwrap();
    c_.bench_function("lower_signed_handshake", |b| {
        b.iter(|| corvid_ir::lower(black_box(&model)).unwrap())
    });
    let compiled = corvid_ir::lower(&model).unwrap();
    c_.bench_function("resolve_and_rewrite_signed_handshake", |b| {
        b.iter(|| {
            for state in &compiled.principal_states {
                let mut resolved =
                    resolve_all_principal_state_values(black_box(state), DEFAULT_MAX_DEPTH)
                        .unwrap();
                perform_all_rewrites(&mut resolved);
            }
        })
    });
}

criterion_group!(benches, bench_nested_rewrite, bench_lower_and_rewrite);
criterion_main!(benches);
