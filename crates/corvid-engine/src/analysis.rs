//! What the attacker can deduce from one resolved principal state.
//!
//! [`deduce`] runs a single pass of every deduction rule against a
//! snapshot. [`analyse`] repeats passes, merging into the shared store and
//! evaluating queries after each, until a pass teaches the attacker
//! nothing new.

use rayon::prelude::*;
use tracing::trace;

use corvid_ir::primitive::{possible_to_decompose, possible_to_recompose, PrimitiveId};
use corvid_ir::principal_state::PrincipalState;
use corvid_ir::rewrite::rewrite_primitive;
use corvid_ir::value::{position_equivalent, Equation, Qualifier, Value};

use crate::attacker_state::AttackerState;
use crate::pipeline::{Context, PipelineError};
use crate::query::resolve_queries;

/// True when the attacker knows `v` or can assemble it from what it knows.
pub fn can_reconstruct(v: &Value, attacker: &AttackerState) -> bool {
    if attacker.knows(v) {
        return true;
    }
    match v {
        Value::Constant(_) => false,
        Value::Primitive(p) => p.arguments.iter().all(|a| can_reconstruct(a, attacker)),
        Value::Equation(e) => chain_reconstructible(&e.values, attacker),
    }
}

/// An exponent chain is reconstructible when some exponent is, and so is
/// the chain without it.
fn chain_reconstructible(values: &[Value], attacker: &AttackerState) -> bool {
    match values.len() {
        0 => false,
        1 => can_reconstruct(&values[0], attacker),
        n => {
            let chain = Value::Equation(Equation {
                values: values.to_vec(),
            });
            attacker.knows(&chain)
                || (1..n).any(|j| {
                    can_reconstruct(&values[j], attacker) && {
                        let mut rest = values.to_vec();
                        rest.remove(j);
                        chain_reconstructible(&rest, attacker)
                    }
                })
        }
    }
}

/// Values revealed by taking apart or simplifying a known value.
fn learn_from_known(v: &Value, attacker: &AttackerState) -> Vec<Value> {
    let Value::Primitive(p) = v else {
        return Vec::new();
    };
    let mut out = Vec::new();
    if p.id == PrimitiveId::Concat {
        out.extend(p.arguments.iter().cloned());
    }
    if let Some((revealed, _)) = possible_to_decompose(p, |x| can_reconstruct(x, attacker)) {
        out.push(revealed);
    }
    if let Some(revealed) = possible_to_recompose(p, attacker.known()) {
        out.push(revealed);
    }
    let rewritten = rewrite_primitive(p);
    if rewritten.rewritten {
        out.push(rewritten.value);
    }
    out
}

/// Password constants used somewhere other than a password-hashing slot.
fn guessable_passwords(v: &Value, hashed: bool, out: &mut Vec<Value>) {
    match v {
        Value::Constant(c) => {
            if !hashed && c.qualifier == Qualifier::Password {
                out.push(v.clone());
            }
        }
        Value::Primitive(p) => {
            let hashing = p.id.spec().password_hashing;
            for (i, a) in p.arguments.iter().enumerate() {
                guessable_passwords(a, hashed || hashing.contains(&i), out);
            }
        }
        Value::Equation(e) => {
            for x in &e.values {
                guessable_passwords(x, hashed, out);
            }
        }
    }
}

/// One pass of resolve, decompose, recompose, reconstruct, equivalize, and
/// password guessing. `state` must already be resolved and rewritten.
/// Returns the values that are new to `attacker`.
pub fn deduce(state: &PrincipalState, attacker: &AttackerState) -> Vec<Value> {
    let mut candidates = Vec::new();

    for (k, v) in attacker.known().iter().enumerate() {
        let Value::Constant(c) = v else {
            continue;
        };
        if !attacker.is_wire(k) || c.is_g_or_nil() {
            continue;
        }
        if let Some(i) = state.index_of(&c.name) {
            candidates.push(state.assigned()[i].clone());
        }
    }

    candidates.par_extend(
        attacker
            .known()
            .par_iter()
            .flat_map_iter(|v| learn_from_known(v, attacker)),
    );

    candidates.par_extend(
        state
            .assigned()
            .par_iter()
            .filter(|v| !attacker.knows(v) && can_reconstruct(v, attacker))
            .cloned(),
    );

    for v in state.assigned() {
        if !matches!(v, Value::Constant(_)) {
            guessable_passwords(v, false, &mut candidates);
        }
    }

    let mut learned: Vec<Value> = Vec::new();
    for v in candidates {
        if !attacker.knows(&v) && position_equivalent(&learned, &v).is_none() {
            learned.push(v);
        }
    }
    learned
}

/// Analyses one resolved and rewritten principal state to a fixed point.
pub(crate) fn analyse(
    ctx: &Context<'_>,
    state: &PrincipalState,
    stage: usize,
) -> Result<(), PipelineError> {
    ctx.results.count_analysis();
    ctx.attacker.record_mutations(state);
    // One snapshot per analysis; what this state teaches is applied to it
    // locally and merged into the shared store after each pass.
    let mut attacker = ctx.attacker.snapshot();
    let mut passes = 0usize;
    loop {
        passes += 1;
        let learned = deduce(state, &attacker);
        ctx.attacker.put_all(learned.iter().cloned());
        let added = learned
            .into_iter()
            .filter(|v| attacker.put(v.clone(), false))
            .count();
        resolve_queries(ctx, state, &attacker)?;
        if added == 0 || ctx.results.all_resolved() {
            break;
        }
    }
    trace!(
        principal = state.name(),
        stage,
        passes,
        known = ctx.attacker.len(),
        "analysis finished"
    );
    Ok(())
}
