//! Algebraic simplification of resolved values.
//!
//! Rewriting is pure: it takes a value and returns the simplified value
//! together with the primitives whose rule did not apply. Applying the
//! results to a principal state is a separate step.

use crate::knowledge_map::splice_term;
use crate::primitive::{possible_to_rebuild, possible_to_rewrite};
use crate::principal_state::PrincipalState;
use crate::value::{Equation, Primitive, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct Rewrite {
    pub value: Value,
    /// Some rule applied somewhere inside the value.
    pub rewritten: bool,
    /// Primitives with a rule that did not apply.
    pub failed: Vec<Primitive>,
}

impl Rewrite {
    fn unchanged(value: Value) -> Self {
        Self {
            value,
            rewritten: false,
            failed: Vec::new(),
        }
    }

    /// The first failed primitive marked with `?`.
    pub fn failed_check(&self) -> Option<&Primitive> {
        self.failed.iter().find(|p| p.check)
    }
}

pub fn rewrite_value(v: &Value) -> Rewrite {
    match v {
        Value::Constant(_) => Rewrite::unchanged(v.clone()),
        Value::Primitive(p) => rewrite_primitive(p),
        Value::Equation(e) => rewrite_equation(e),
    }
}

pub fn rewrite_primitive(p: &Primitive) -> Rewrite {
    let mut rewritten = false;
    let mut failed = Vec::new();
    let mut arguments = Vec::with_capacity(p.arguments.len());
    for a in &p.arguments {
        match a {
            Value::Constant(_) => arguments.push(a.clone()),
            _ => {
                let inner = rewrite_value(a);
                if inner.rewritten {
                    rewritten = true;
                    arguments.push(inner.value);
                } else {
                    failed.extend(inner.failed);
                    arguments.push(a.clone());
                }
            }
        }
    }
    let mut candidate = Primitive {
        arguments,
        ..p.clone()
    };

    if let Some(rebuilt) = possible_to_rebuild(&candidate) {
        match rebuilt {
            Value::Primitive(inner) => {
                rewritten = true;
                candidate = inner;
            }
            other => {
                return Rewrite {
                    value: other,
                    rewritten: true,
                    failed,
                }
            }
        }
    }

    let spec = candidate.id.spec();
    let (applied, outputs) = possible_to_rewrite(&candidate);
    if !applied && spec.has_rule() {
        failed.push(candidate.clone());
    }
    let index = if applied && spec.core { p.output } else { 0 };
    let rewritten = rewritten || applied;
    match outputs.into_iter().nth(index) {
        Some(value) => Rewrite {
            value,
            rewritten,
            failed,
        },
        None => Rewrite {
            value: Value::nil(),
            rewritten,
            failed,
        },
    }
}

pub fn rewrite_equation(e: &Equation) -> Rewrite {
    let mut rewritten = false;
    let mut failed = Vec::new();
    let mut values = Vec::with_capacity(e.values.len());
    for (i, term) in e.values.iter().enumerate() {
        let has_rule = match term {
            Value::Constant(_) => false,
            Value::Primitive(p) => p.id.spec().has_rule(),
            Value::Equation(_) => true,
        };
        if !has_rule {
            values.push(term.clone());
            continue;
        }
        let inner = rewrite_value(term);
        if inner.rewritten {
            rewritten = true;
            splice_term(&mut values, i, inner.value);
        } else {
            failed.extend(inner.failed);
            values.push(term.clone());
        }
    }
    Rewrite {
        value: Value::Equation(Equation { values }),
        rewritten,
        failed,
    }
}

/// Rewrites every assigned value of `state` in place and returns each
/// failed primitive with the index of the slot it was found in.
pub fn perform_all_rewrites(state: &mut PrincipalState) -> Vec<(Primitive, usize)> {
    let mut failures = Vec::new();
    for i in 0..state.len() {
        if matches!(state.assigned()[i], Value::Constant(_)) {
            continue;
        }
        let result = rewrite_value(&state.assigned()[i]);
        failures.extend(result.failed.into_iter().map(|p| (p, i)));
        if result.rewritten {
            state.record_rewrite(i, result.value);
        }
    }
    failures
}
