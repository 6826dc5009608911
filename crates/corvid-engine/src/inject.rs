//! Primitives the active attacker assembles from what it knows.

use corvid_ir::value::{position_equivalent, Equation, Primitive, Value};

use crate::attacker_state::AttackerState;

/// Stage 0 and 1 never inject. Stage 2 skips explosive primitives.
fn stage_restricted(p: &Primitive, stage: usize) -> bool {
    match stage {
        0 | 1 => true,
        2 => p.id.spec().explosive,
        _ => false,
    }
}

/// Nested primitives are rebuilt only from stage 5 on, one level deeper
/// per stage.
fn nesting_allowed(stage: usize, depth: usize) -> bool {
    stage >= 5 && depth <= stage - 5
}

/// The shape of a value with every leaf blanked out.
pub fn skeleton(v: &Value) -> Value {
    match v {
        Value::Constant(_) => Value::nil(),
        Value::Primitive(p) => Value::Primitive(Primitive {
            id: p.id,
            arguments: p.arguments.iter().map(skeleton).collect(),
            output: p.output,
            check: false,
        }),
        Value::Equation(e) => g_nil_chain(e.values.len()),
    }
}

fn g_nil_chain(len: usize) -> Value {
    let mut values = Vec::with_capacity(len);
    values.push(Value::g());
    values.resize(len.max(1), Value::nil());
    Value::Equation(Equation { values })
}

fn push_unique(out: &mut Vec<Value>, v: Value) {
    if position_equivalent(out, &v).is_none() {
        out.push(v);
    }
}

/// Every primitive of `p`'s shape the attacker can build at `stage`.
pub fn inject(p: &Primitive, attacker: &AttackerState, stage: usize) -> Vec<Value> {
    inject_at(p, attacker, stage, 0)
}

fn inject_at(p: &Primitive, attacker: &AttackerState, stage: usize, depth: usize) -> Vec<Value> {
    if !p.id.spec().injectable || stage_restricted(p, stage) {
        return Vec::new();
    }
    let mut slots: Vec<Vec<Value>> = Vec::with_capacity(p.arguments.len());
    for arg in &p.arguments {
        let mut candidates = Vec::new();
        match arg {
            Value::Constant(_) => {
                for c in attacker.constants() {
                    push_unique(&mut candidates, Value::Constant(c.clone()));
                }
            }
            Value::Primitive(inner) => {
                let shape = skeleton(arg);
                for k in attacker.known() {
                    if matches!(k, Value::Primitive(_)) && skeleton(k).equivalent(&shape, false) {
                        push_unique(&mut candidates, k.clone());
                    }
                }
                if nesting_allowed(stage, depth + 1) {
                    for v in inject_at(inner, attacker, stage, depth + 1) {
                        push_unique(&mut candidates, v);
                    }
                }
            }
            Value::Equation(e) => {
                push_unique(&mut candidates, g_nil_chain(e.values.len()));
                for k in attacker.known() {
                    if let Value::Equation(ke) = k {
                        if ke.values.len() == e.values.len() {
                            push_unique(&mut candidates, k.clone());
                        }
                    }
                }
            }
        }
        if candidates.is_empty() {
            return Vec::new();
        }
        slots.push(candidates);
    }
    cartesian(&slots)
        .into_iter()
        .map(|arguments| {
            Value::Primitive(Primitive {
                id: p.id,
                arguments,
                output: p.output,
                check: p.check,
            })
        })
        .collect()
}

fn cartesian(slots: &[Vec<Value>]) -> Vec<Vec<Value>> {
    let mut out: Vec<Vec<Value>> = vec![Vec::new()];
    for slot in slots {
        let mut next = Vec::with_capacity(out.len() * slot.len());
        for prefix in &out {
            for v in slot {
                let mut row = prefix.clone();
                row.push(v.clone());
                next.push(row);
            }
        }
        out = next;
    }
    out
}
