//! Proptest strategies for generating symbolic values.

use proptest::prelude::*;

use crate::primitive::PrimitiveId;
use crate::value::{Constant, Declaration, Equation, Primitive, Qualifier, Value};

/// Strategy for a constant drawn from a small alphabet, so that generated
/// values share leaves often enough for equivalence to be interesting.
pub fn arb_constant() -> impl Strategy<Value = Constant> {
    (
        prop::sample::select(vec!["a", "b", "c", "k", "m", "n"]),
        any::<bool>(),
    )
        .prop_map(|(name, fresh)| {
            let mut c = Constant::new(name, Declaration::Knows, Qualifier::Private);
            c.fresh = fresh;
            c
        })
}

/// `G^x` or `G^x^y` over generated constants.
pub fn arb_equation() -> impl Strategy<Value = Equation> {
    prop::collection::vec(arb_constant(), 1..=2).prop_map(|exps| {
        let mut values = vec![Value::g()];
        values.extend(exps.into_iter().map(Value::Constant));
        Equation { values }
    })
}

/// Strategy for a well-formed value: every primitive has an arity its
/// table entry accepts, and equations are rooted at the generator.
pub fn arb_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        3 => arb_constant().prop_map(Value::Constant),
        1 => arb_equation().prop_map(Value::Equation),
    ];
    leaf.prop_recursive(3, 24, 5, |inner| {
        (prop::sample::select(PrimitiveId::ALL.to_vec()), any::<bool>())
            .prop_flat_map(move |(id, check)| {
                let (lo, hi) = id.spec().arity;
                (
                    Just(id),
                    Just(check && id.spec().checkable),
                    prop::collection::vec(inner.clone(), lo..=hi),
                )
            })
            .prop_map(|(id, check, arguments)| {
                Value::Primitive(Primitive {
                    id,
                    arguments,
                    output: 0,
                    check,
                })
            })
    })
}
