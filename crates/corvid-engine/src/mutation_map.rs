//! Candidate substitutions for one principal in one stage, and an odometer
//! over their combinations.

use std::sync::Arc;

use tracing::debug;

use corvid_ir::principal_state::PrincipalState;
use corvid_ir::resolve::{resolve_constant, resolve_value, ResolutionError};
use corvid_ir::value::{position_equivalent, Constant, Equation, Primitive, Value};

use crate::attacker_state::AttackerState;
use crate::inject::inject;

/// Decides which combinations are worth analysing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WorthwhilePolicy {
    /// A combination counts only when one of the positions that changed
    /// since the previous combination actually substitutes a new value.
    #[default]
    SinceLastIncrement,
    /// Any combination that substitutes anything is analysed.
    Always,
}

/// Targets and candidates are shared by every combination of a map; each
/// combination owns only its odometer.
#[derive(Debug, Clone)]
pub struct MutationMap {
    pub constants: Arc<[Constant]>,
    pub mutations: Arc<[Vec<Value>]>,
    cursor: Vec<usize>,
    changed_from: usize,
}

impl MutationMap {
    pub fn new(
        state: &PrincipalState,
        attacker: &AttackerState,
        stage: usize,
        max_depth: usize,
    ) -> Result<Self, ResolutionError> {
        let mut constants = Vec::new();
        let mut mutations = Vec::new();
        for c in attacker.constants() {
            let (a, i) = resolve_constant(state, c);
            let Some(i) = i.filter(|&i| !skip_constant(state, attacker, c, i)) else {
                continue;
            };
            let candidates = replace_value(state, attacker, &a, i, stage, max_depth)?;
            if candidates.is_empty() {
                continue;
            }
            constants.push(c.clone());
            mutations.push(candidates);
        }
        debug!(
            principal = state.name(),
            stage,
            constants = constants.len(),
            "initialised mutation map"
        );
        let cursor = vec![0; constants.len()];
        Ok(Self {
            constants: constants.into(),
            mutations: mutations.into(),
            cursor,
            changed_from: 0,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    pub fn len(&self) -> usize {
        self.constants.len()
    }

    /// Number of combinations, saturating.
    pub fn combinations(&self) -> usize {
        self.mutations
            .iter()
            .fold(1usize, |n, m| n.saturating_mul(m.len()))
    }

    /// The current combination as (target, candidate) pairs.
    pub fn combination(&self) -> impl Iterator<Item = (usize, &Constant, &Value)> {
        self.constants
            .iter()
            .zip(&self.cursor)
            .enumerate()
            .map(|(i, (c, &d))| (i, c, &self.mutations[i][d]))
    }

    /// Lowest position that differs from the previous combination.
    pub fn changed_from(&self) -> usize {
        self.changed_from
    }

    /// The following combination, or `None` once every one has been seen.
    pub fn next(&self) -> Option<Self> {
        let mut cursor = self.cursor.clone();
        let mut i = cursor.len().checked_sub(1)?;
        loop {
            cursor[i] += 1;
            if cursor[i] < self.mutations[i].len() {
                break;
            }
            cursor[i] = 0;
            i = i.checked_sub(1)?;
        }
        Some(Self {
            constants: Arc::clone(&self.constants),
            mutations: Arc::clone(&self.mutations),
            cursor,
            changed_from: i,
        })
    }
}

/// Slots the attacker cannot or need not touch in this principal's view.
///
/// Only values in transit toward this principal are targets, so the slot's
/// own wire list decides. The attacker store's wire flag also covers leaked
/// constants that were never sent, and those cannot be substituted.
fn skip_constant(state: &PrincipalState, attacker: &AttackerState, c: &Constant, i: usize) -> bool {
    let id = state.id();
    if state.guard()[i] {
        let sender = state.sender()[i];
        let assailable = state.mutatable_to()[i].contains(&id)
            || attacker.mutated_toward(c, sender);
        if !assailable {
            return true;
        }
    }
    state.creator()[i] == id
        || !state.known()[i]
        || !state.wire()[i].contains(&id)
        || !state.phase()[i].contains(&attacker.current_phase)
}

fn replace_value(
    state: &PrincipalState,
    attacker: &AttackerState,
    a: &Value,
    i: usize,
    stage: usize,
    max_depth: usize,
) -> Result<Vec<Value>, ResolutionError> {
    let a = resolve_value(state, a, i, false, max_depth)?;
    Ok(match &a {
        Value::Constant(c) => replace_constant(state, attacker, c, stage),
        Value::Primitive(p) => replace_primitive(attacker, p, stage),
        Value::Equation(e) => replace_equation(attacker, e),
    })
}

fn push_unique(out: &mut Vec<Value>, v: Value) {
    if position_equivalent(out, &v).is_none() {
        out.push(v);
    }
}

fn replace_constant(
    state: &PrincipalState,
    attacker: &AttackerState,
    c: &Constant,
    stage: usize,
) -> Vec<Value> {
    if c.is_g_or_nil() {
        return Vec::new();
    }
    let mut out = vec![Value::nil()];
    if stage <= 3 {
        return out;
    }
    for k in attacker.constants() {
        if let (resolved @ Value::Constant(_), _) = resolve_constant(state, k) {
            push_unique(&mut out, resolved);
        }
    }
    out
}

fn replace_primitive(attacker: &AttackerState, p: &Primitive, stage: usize) -> Vec<Value> {
    let mut out = Vec::new();
    for k in attacker.known() {
        if let Value::Primitive(kp) = k {
            if kp.id == p.id && kp.arguments.len() == p.arguments.len() {
                push_unique(&mut out, k.clone());
            }
        }
    }
    for v in inject(p, attacker, stage) {
        push_unique(&mut out, v);
    }
    out
}

fn replace_equation(attacker: &AttackerState, e: &Equation) -> Vec<Value> {
    let mut out = Vec::new();
    match e.values.len() {
        1 => out.push(Value::g()),
        2 => out.push(Value::g_nil()),
        3 => out.push(Value::g_nil_nil()),
        _ => {}
    }
    for k in attacker.known() {
        if matches!(k, Value::Equation(ke) if ke.values.len() == e.values.len()) {
            push_unique(&mut out, k.clone());
        }
    }
    out
}
