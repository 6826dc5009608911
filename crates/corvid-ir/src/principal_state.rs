//! Per-principal symbolic memory.
//!
//! A [`PrincipalState`] stores one slot per constant in the knowledge map,
//! laid out as parallel vectors. The vectors are private so every mutation
//! goes through methods that keep their lengths equal.

use crate::knowledge_map::{KnowledgeMap, KnownBy};
use crate::value::{Constant, PrincipalId, Value};

/// Initial contents of one principal-state slot.
#[derive(Debug, Clone)]
pub struct Slot {
    pub constant: Constant,
    pub assigned: Value,
    pub guard: bool,
    pub known: bool,
    pub wire: Vec<PrincipalId>,
    pub known_by: Vec<KnownBy>,
    pub declared_at: usize,
    pub creator: PrincipalId,
    pub sender: PrincipalId,
    pub mutatable_to: Vec<PrincipalId>,
    pub phase: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct PrincipalState {
    name: String,
    id: PrincipalId,
    max_declared_at: usize,
    constants: Vec<Constant>,
    assigned: Vec<Value>,
    guard: Vec<bool>,
    known: Vec<bool>,
    wire: Vec<Vec<PrincipalId>>,
    known_by: Vec<Vec<KnownBy>>,
    declared_at: Vec<usize>,
    creator: Vec<PrincipalId>,
    sender: Vec<PrincipalId>,
    rewritten: Vec<bool>,
    before_rewrite: Vec<Value>,
    mutated: Vec<bool>,
    mutatable_to: Vec<Vec<PrincipalId>>,
    before_mutate: Vec<Value>,
    phase: Vec<Vec<usize>>,
}

impl PrincipalState {
    pub fn new(name: impl Into<String>, id: PrincipalId, max_declared_at: usize) -> Self {
        Self {
            name: name.into(),
            id,
            max_declared_at,
            constants: Vec::new(),
            assigned: Vec::new(),
            guard: Vec::new(),
            known: Vec::new(),
            wire: Vec::new(),
            known_by: Vec::new(),
            declared_at: Vec::new(),
            creator: Vec::new(),
            sender: Vec::new(),
            rewritten: Vec::new(),
            before_rewrite: Vec::new(),
            mutated: Vec::new(),
            mutatable_to: Vec::new(),
            before_mutate: Vec::new(),
            phase: Vec::new(),
        }
    }

    /// Appends a slot. `before_rewrite` and `before_mutate` start out equal
    /// to `assigned`.
    pub fn push(&mut self, slot: Slot) {
        self.constants.push(slot.constant);
        self.before_rewrite.push(slot.assigned.clone());
        self.before_mutate.push(slot.assigned.clone());
        self.assigned.push(slot.assigned);
        self.guard.push(slot.guard);
        self.known.push(slot.known);
        self.wire.push(slot.wire);
        self.known_by.push(slot.known_by);
        self.declared_at.push(slot.declared_at);
        self.creator.push(slot.creator);
        self.sender.push(slot.sender);
        self.rewritten.push(false);
        self.mutated.push(false);
        self.mutatable_to.push(slot.mutatable_to);
        self.phase.push(slot.phase);
        debug_assert!(self.lengths_agree());
    }

    /// Drops every slot from `len` onward.
    pub fn truncate(&mut self, len: usize) {
        self.constants.truncate(len);
        self.assigned.truncate(len);
        self.guard.truncate(len);
        self.known.truncate(len);
        self.wire.truncate(len);
        self.known_by.truncate(len);
        self.declared_at.truncate(len);
        self.creator.truncate(len);
        self.sender.truncate(len);
        self.rewritten.truncate(len);
        self.before_rewrite.truncate(len);
        self.mutated.truncate(len);
        self.mutatable_to.truncate(len);
        self.before_mutate.truncate(len);
        self.phase.truncate(len);
        debug_assert!(self.lengths_agree());
    }

    /// Drops every slot declared at or after `declared_at`. Returns true if
    /// anything was removed.
    pub fn truncate_from_declaration(&mut self, declared_at: usize) -> bool {
        match self.declared_at.iter().position(|&d| d >= declared_at) {
            Some(cut) => {
                self.truncate(cut);
                true
            }
            None => false,
        }
    }

    pub fn lengths_agree(&self) -> bool {
        let n = self.constants.len();
        [
            self.assigned.len(),
            self.guard.len(),
            self.known.len(),
            self.wire.len(),
            self.known_by.len(),
            self.declared_at.len(),
            self.creator.len(),
            self.sender.len(),
            self.rewritten.len(),
            self.before_rewrite.len(),
            self.mutated.len(),
            self.mutatable_to.len(),
            self.before_mutate.len(),
            self.phase.len(),
        ]
        .iter()
        .all(|&len| len == n)
    }

    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> PrincipalId {
        self.id
    }

    pub fn max_declared_at(&self) -> usize {
        self.max_declared_at
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.constants.iter().position(|c| c.name == name)
    }

    pub fn constants(&self) -> &[Constant] {
        &self.constants
    }

    pub fn assigned(&self) -> &[Value] {
        &self.assigned
    }

    pub fn guard(&self) -> &[bool] {
        &self.guard
    }

    pub fn known(&self) -> &[bool] {
        &self.known
    }

    pub fn wire(&self) -> &[Vec<PrincipalId>] {
        &self.wire
    }

    pub fn known_by(&self) -> &[Vec<KnownBy>] {
        &self.known_by
    }

    pub fn declared_at(&self) -> &[usize] {
        &self.declared_at
    }

    pub fn creator(&self) -> &[PrincipalId] {
        &self.creator
    }

    pub fn sender(&self) -> &[PrincipalId] {
        &self.sender
    }

    pub fn rewritten(&self) -> &[bool] {
        &self.rewritten
    }

    pub fn before_rewrite(&self) -> &[Value] {
        &self.before_rewrite
    }

    pub fn mutated(&self) -> &[bool] {
        &self.mutated
    }

    pub fn mutatable_to(&self) -> &[Vec<PrincipalId>] {
        &self.mutatable_to
    }

    pub fn before_mutate(&self) -> &[Value] {
        &self.before_mutate
    }

    pub fn phase(&self) -> &[Vec<usize>] {
        &self.phase
    }

    /// Installs an attacker-chosen value at `i`.
    pub fn mutate(&mut self, i: usize, value: Value) {
        self.creator[i] = PrincipalId::ATTACKER;
        self.sender[i] = PrincipalId::ATTACKER;
        self.mutated[i] = true;
        self.before_rewrite[i] = value.clone();
        self.assigned[i] = value;
    }

    /// Replaces the assigned and before-rewrite values with their resolved
    /// forms.
    pub fn set_resolved(&mut self, i: usize, assigned: Value, before_rewrite: Value) {
        self.assigned[i] = assigned;
        self.before_rewrite[i] = before_rewrite;
    }

    pub fn record_rewrite(&mut self, i: usize, value: Value) {
        if !self.mutated[i] {
            self.before_mutate[i] = value.clone();
        }
        self.assigned[i] = value;
        self.rewritten[i] = true;
    }
}

/// Builds one state per principal from the knowledge map.
pub(crate) fn principal_state_for(
    km: &KnowledgeMap,
    id: PrincipalId,
    name: &str,
) -> PrincipalState {
    let mut state = PrincipalState::new(name, id, km.max_declared_at);
    for entry in km.entries() {
        let received = entry.known_by.iter().find(|k| k.recipient == id);
        let known = entry.creator == id || received.is_some();
        let sender = received.map(|k| k.sender).unwrap_or(entry.creator);

        let mut wire = Vec::new();
        let mut mutatable_to = Vec::new();
        let mut guard = false;
        for message in km.messages() {
            let Some(sent) = message
                .constants
                .iter()
                .find(|c| c.name == entry.constant.name)
            else {
                continue;
            };
            if !wire.contains(&message.recipient) {
                wire.push(message.recipient);
            }
            if !sent.guard && !mutatable_to.contains(&message.recipient) {
                mutatable_to.push(message.recipient);
            }
            if sent.guard && (message.recipient == id || message.sender == id) {
                guard = true;
            }
        }

        let mut constant = entry.constant.clone();
        constant.guard = guard;
        state.push(Slot {
            constant,
            assigned: entry.assigned.clone(),
            guard,
            known,
            wire,
            known_by: entry.known_by.clone(),
            declared_at: entry.declared_at,
            creator: entry.creator,
            sender,
            mutatable_to,
            phase: entry.phase.clone(),
        });
    }
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Declaration, Qualifier};

    fn slot(name: &str, declared_at: usize) -> Slot {
        let constant = Constant::new(name, Declaration::Knows, Qualifier::Private);
        Slot {
            assigned: Value::Constant(constant.clone()),
            constant,
            guard: false,
            known: true,
            wire: vec![],
            known_by: vec![],
            declared_at,
            creator: PrincipalId(1),
            sender: PrincipalId(1),
            mutatable_to: vec![],
            phase: vec![0],
        }
    }

    #[test]
    fn push_initialises_derived_columns() {
        let mut state = PrincipalState::new("Alice", PrincipalId(1), 0);
        state.push(slot("a", 0));
        assert_eq!(state.len(), 1);
        assert!(!state.mutated()[0]);
        assert!(!state.rewritten()[0]);
        assert_eq!(state.before_mutate()[0], state.assigned()[0]);
        assert!(state.lengths_agree());
    }

    #[test]
    fn truncation_keeps_columns_aligned() {
        let mut state = PrincipalState::new("Alice", PrincipalId(1), 2);
        for (i, name) in ["a", "b", "c", "d"].iter().enumerate() {
            state.push(slot(name, i / 2));
        }
        assert!(state.truncate_from_declaration(1));
        assert_eq!(state.len(), 2);
        assert!(state.lengths_agree());
        assert!(state.declared_at().iter().all(|&d| d < 1));
        assert!(!state.truncate_from_declaration(5));
    }

    #[test]
    fn mutation_marks_attacker_provenance() {
        let mut state = PrincipalState::new("Bob", PrincipalId(2), 0);
        state.push(slot("a", 0));
        state.mutate(0, Value::nil());
        assert_eq!(state.creator()[0], PrincipalId::ATTACKER);
        assert_eq!(state.sender()[0], PrincipalId::ATTACKER);
        assert!(state.mutated()[0]);
        assert_eq!(state.assigned()[0], Value::nil());
        assert_eq!(state.before_rewrite()[0], Value::nil());
        // The pre-mutation value is preserved for principals that never saw it.
        assert_ne!(state.before_mutate()[0], Value::nil());
    }

    #[test]
    fn rewrites_only_touch_before_mutate_when_unmutated() {
        let mut state = PrincipalState::new("Bob", PrincipalId(2), 0);
        state.push(slot("a", 0));
        state.push(slot("b", 0));
        state.mutate(1, Value::g());
        state.record_rewrite(0, Value::nil());
        state.record_rewrite(1, Value::nil());
        assert_eq!(state.before_mutate()[0], Value::nil());
        assert_ne!(state.before_mutate()[1], Value::nil());
        assert!(state.rewritten().iter().all(|&r| r));
    }
}
