//! What the attacker knows, and the lock that shares it between analyses.

use std::sync::{PoisonError, RwLock};

use corvid_ir::knowledge_map::KnowledgeMap;
use corvid_ir::principal_state::PrincipalState;
use corvid_ir::value::{position_equivalent, Constant, Declaration, PrincipalId, Qualifier, Value};

/// Values the attacker has learned in the current phase.
#[derive(Debug, Clone, Default)]
pub struct AttackerState {
    pub current_phase: usize,
    pub exhausted: bool,
    known: Vec<Value>,
    /// The value was observed on the wire rather than derived.
    wire: Vec<bool>,
    /// Principals whose state has held a mutation of the value.
    mutated_to: Vec<Vec<PrincipalId>>,
}

impl AttackerState {
    /// Builds the state for `phase`. Values from the previous phase survive
    /// unless they contain a fresh constant, and keep the principals they
    /// were already mutated toward. Then the attacker learns `g`,
    /// `nil`, every public constant, and every constant leaked or sent in a
    /// phase up to `phase`.
    pub fn for_phase(previous: Option<&AttackerState>, km: &KnowledgeMap, phase: usize) -> Self {
        let mut state = AttackerState {
            current_phase: phase,
            ..AttackerState::default()
        };
        if let Some(previous) = previous {
            let carried = previous
                .known
                .iter()
                .zip(&previous.wire)
                .zip(&previous.mutated_to);
            for ((v, &wire), targets) in carried {
                if v.constants().iter().any(|c| c.fresh) || !state.put(v.clone(), wire) {
                    continue;
                }
                if let Some(last) = state.mutated_to.last_mut() {
                    last.clone_from(targets);
                }
            }
        }
        state.put(Value::g(), false);
        state.put(Value::nil(), false);
        for entry in km.entries() {
            let c = &entry.constant;
            if c.declaration == Declaration::Knows && c.qualifier == Qualifier::Public {
                state.put(Value::Constant(c.clone()), false);
            }
            if entry.leaked_in.iter().any(|&p| p <= phase) {
                state.put(Value::Constant(c.clone()), true);
            }
        }
        for message in km.messages().iter().filter(|m| m.phase <= phase) {
            for c in &message.constants {
                let mut c: Constant = c.clone();
                c.guard = false;
                state.put(Value::Constant(c), true);
            }
        }
        state
    }

    pub fn known(&self) -> &[Value] {
        &self.known
    }

    pub fn is_wire(&self, i: usize) -> bool {
        self.wire.get(i).copied().unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    pub fn knows(&self, v: &Value) -> bool {
        position_equivalent(&self.known, v).is_some()
    }

    /// Adds `v` unless an equivalent value is already known.
    pub fn put(&mut self, v: Value, wire: bool) -> bool {
        if self.knows(&v) {
            return false;
        }
        self.known.push(v);
        self.wire.push(wire);
        self.mutated_to.push(Vec::new());
        true
    }

    /// True once some analysed state of `principal` held a mutated `c`.
    pub fn mutated_toward(&self, c: &Constant, principal: PrincipalId) -> bool {
        self.known
            .iter()
            .position(|v| matches!(v, Value::Constant(k) if k.name == c.name))
            .is_some_and(|i| self.mutated_to[i].contains(&principal))
    }

    fn record_mutations(&mut self, state: &PrincipalState) {
        for (i, c) in state.constants().iter().enumerate() {
            if !state.mutated()[i] {
                continue;
            }
            let found = self
                .known
                .iter()
                .position(|v| matches!(v, Value::Constant(k) if k.name == c.name));
            if let Some(k) = found {
                if !self.mutated_to[k].contains(&state.id()) {
                    self.mutated_to[k].push(state.id());
                }
            }
        }
    }

    /// Known constants other than `g` and `nil`.
    pub fn constants(&self) -> impl Iterator<Item = &Constant> {
        self.known
            .iter()
            .filter_map(Value::as_constant)
            .filter(|c| !c.is_g_or_nil())
    }
}

/// Shared attacker state. Readers take cheap snapshots; writers merge.
#[derive(Debug, Default)]
pub struct AttackerStore {
    inner: RwLock<AttackerState>,
}

impl AttackerStore {
    pub fn new(state: AttackerState) -> Self {
        Self {
            inner: RwLock::new(state),
        }
    }

    pub fn snapshot(&self) -> AttackerState {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn replace(&self, state: AttackerState) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    pub fn knows(&self, v: &Value) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .knows(v)
    }

    /// Merges `values` and returns how many were new.
    pub fn put_all(&self, values: impl IntoIterator<Item = Value>) -> usize {
        let mut state = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        values
            .into_iter()
            .filter(|v| state.put(v.clone(), false))
            .count()
    }

    /// Notes which of `state`'s constants the attacker has substituted.
    pub fn record_mutations(&self, state: &PrincipalState) {
        if state.mutated().iter().any(|&m| m) {
            self.inner
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .record_mutations(state);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set_exhausted(&self) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .exhausted = true;
    }

    pub fn is_exhausted(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .exhausted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh(name: &str) -> Value {
        let mut c = Constant::new(name, Declaration::Generates, Qualifier::Private);
        c.fresh = true;
        Value::Constant(c)
    }

    fn lowered(src: &str) -> KnowledgeMap {
        let model = corvid_dsl::parse(src, "t.vp").expect("parses");
        corvid_ir::lower(&model).expect("lowers").knowledge_map
    }

    const LEAK: &str = "attacker[passive]
        principal A[ knows public p knows private k generates n h = HASH(k) ]
        principal B[ ]
        A -> B: n, h
        phase[1]
        principal A[ leaks k ]
        queries[ confidentiality? k ]";

    #[test]
    fn phase_zero_sees_public_and_wire_constants() {
        let km = lowered(LEAK);
        let state = AttackerState::for_phase(None, &km, 0);
        let names: Vec<String> = state.known().iter().map(ToString::to_string).collect();
        for expected in ["g", "nil", "p", "n"] {
            assert!(names.iter().any(|n| n == expected), "missing {expected}");
        }
        assert!(!names.iter().any(|n| n == "k"));
    }

    #[test]
    fn leaks_become_visible_in_their_phase() {
        let km = lowered(LEAK);
        let k = Value::Constant(km.constant("k").cloned().expect("k"));
        assert!(!AttackerState::for_phase(None, &km, 0).knows(&k));
        assert!(AttackerState::for_phase(None, &km, 1).knows(&k));
    }

    #[test]
    fn fresh_values_are_evicted_between_phases() {
        let km = lowered(LEAK);
        let mut previous = AttackerState::for_phase(None, &km, 0);
        previous.put(fresh("other"), false);
        previous.put(Value::exp([fresh("x")]), false);
        let next = AttackerState::for_phase(Some(&previous), &km, 1);
        assert!(!next.knows(&fresh("other")));
        assert!(!next.knows(&Value::exp([fresh("x")])));
        // Sent constants are observed again in the new phase.
        assert!(next.knows(&fresh("n")));
    }

    #[test]
    fn mutation_records_carry_into_later_phases() {
        let model = corvid_ir::lower(&corvid_dsl::parse(LEAK, "t.vp").expect("parses"))
            .expect("lowers");
        let b = model
            .principal_states
            .iter()
            .find(|s| s.name() == "B")
            .expect("B");
        let mut mutated = b.clone();
        mutated.mutate(mutated.index_of("h").expect("h"), Value::nil());

        let h = model.knowledge_map.constant("h").cloned().expect("h");
        let mut previous = AttackerState::for_phase(None, &model.knowledge_map, 0);
        assert!(!previous.mutated_toward(&h, b.id()));
        previous.record_mutations(&mutated);
        assert!(previous.mutated_toward(&h, b.id()));

        let next = AttackerState::for_phase(Some(&previous), &model.knowledge_map, 1);
        assert!(next.mutated_toward(&h, b.id()));
        assert!(!next.mutated_toward(&h, PrincipalId::ATTACKER));
    }

    #[test]
    fn store_merges_without_duplicates() {
        let store = AttackerStore::new(AttackerState::default());
        assert_eq!(store.put_all([Value::g(), Value::nil(), Value::g()]), 2);
        assert_eq!(store.len(), 2);
        assert!(!store.is_exhausted());
        store.set_exhausted();
        assert!(store.snapshot().exhausted);
    }
}
