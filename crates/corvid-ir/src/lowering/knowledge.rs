//! Construction of the knowledge map from the block sequence.

use corvid_dsl::ast;
use tracing::debug;

use super::values::{knows, range_text, ValueScope};
use super::LoweringError;
use crate::knowledge_map::{KnowledgeEntry, KnowledgeMap, KnownBy, WireMessage};
use crate::value::{Constant, Declaration, PrincipalId, Qualifier, Value};

pub(super) struct KnowledgeMapBuilder {
    km: KnowledgeMap,
    declared_at: usize,
    phase: usize,
    seen_phase: bool,
}

impl KnowledgeMapBuilder {
    pub(super) fn new(model: &ast::Model) -> Result<Self, LoweringError> {
        let mut km = KnowledgeMap::new();
        for block in model.principals() {
            if let ast::Block::Principal(p) = &block.node {
                if !km.principals.contains(&p.name) {
                    km.principals.push(p.name.clone());
                }
            }
        }
        if km.principals.len() == 1 {
            return Err(LoweringError::NoPrincipals);
        }
        Ok(Self {
            km,
            declared_at: 0,
            phase: 0,
            seen_phase: false,
        })
    }

    pub(super) fn build(mut self, model: &ast::Model) -> Result<KnowledgeMap, LoweringError> {
        for block in &model.blocks {
            match &block.node {
                ast::Block::Principal(p) => self.principal(p)?,
                ast::Block::Message(m) => self.message(m)?,
                ast::Block::Phase(ph) => self.phase(ph.number)?,
            }
        }
        self.km.max_declared_at = self.declared_at;
        self.km.max_phase = self.phase;
        debug!(
            constants = self.km.len(),
            messages = self.km.messages.len(),
            principals = self.km.principals.len() - 1,
            "built knowledge map"
        );
        Ok(self.km)
    }

    fn principal_id(&self, name: &str) -> Result<PrincipalId, LoweringError> {
        self.km
            .principal_id(name)
            .filter(|id| !id.is_attacker())
            .ok_or_else(|| LoweringError::UndeclaredPrincipal(name.to_owned()))
    }

    fn insert(&mut self, constant: Constant, assigned: Value, creator: PrincipalId) {
        self.km.entries.insert(
            constant.name.clone(),
            KnowledgeEntry {
                constant,
                assigned,
                creator,
                known_by: Vec::new(),
                declared_at: self.declared_at,
                phase: vec![self.phase],
                leaked_in: Vec::new(),
            },
        );
    }

    fn principal(&mut self, block: &ast::PrincipalBlock) -> Result<(), LoweringError> {
        let id = self.principal_id(&block.name)?;
        for expr in &block.expressions {
            // Every expression is its own declaration point, so a failed
            // check rolls back to the expression that raised it.
            self.declared_at += 1;
            match &expr.node {
                ast::Expression::Knows {
                    qualifier,
                    constants,
                } => {
                    for r in constants {
                        self.knows(id, *qualifier, r)?;
                    }
                }
                ast::Expression::Generates { constants } => {
                    for r in constants {
                        if self.km.entries.contains_key(&r.name) {
                            return Err(LoweringError::GeneratedExists(r.name.clone()));
                        }
                        let mut c =
                            Constant::new(&r.name, Declaration::Generates, Qualifier::Private);
                        c.fresh = true;
                        self.insert(c.clone(), Value::Constant(c), id);
                    }
                }
                ast::Expression::Leaks { constants } => {
                    for r in constants {
                        self.leak(id, &block.name, r)?;
                    }
                }
                ast::Expression::Assignment { targets, value } => {
                    self.assignment(id, &block.name, targets, value)?;
                }
            }
        }
        Ok(())
    }

    fn knows(
        &mut self,
        id: PrincipalId,
        qualifier: Qualifier,
        r: &ast::ConstantRef,
    ) -> Result<(), LoweringError> {
        if !self.km.entries.contains_key(&r.name) {
            let c = Constant::new(&r.name, Declaration::Knows, qualifier);
            self.insert(c.clone(), Value::Constant(c), id);
            return Ok(());
        }
        let Some(entry) = self.km.entries.get_mut(&r.name) else {
            return Ok(());
        };
        if entry.constant.declaration != Declaration::Knows
            || entry.constant.qualifier != qualifier
        {
            return Err(LoweringError::KnownDifferently(r.name.clone()));
        }
        if entry.creator != id && !entry.known_by.iter().any(|k| k.recipient == id) {
            entry.known_by.push(KnownBy {
                recipient: id,
                sender: id,
            });
        }
        Ok(())
    }

    fn leak(
        &mut self,
        id: PrincipalId,
        principal: &str,
        r: &ast::ConstantRef,
    ) -> Result<(), LoweringError> {
        if !knows(&self.km, id, &r.name) {
            return Err(LoweringError::LeakUnknown {
                principal: principal.to_owned(),
                name: r.name.clone(),
            });
        }
        let phase = self.phase;
        if let Some(entry) = self.km.entries.get_mut(&r.name) {
            entry.constant.leaked = true;
            if !entry.leaked_in.contains(&phase) {
                entry.leaked_in.push(phase);
            }
            if !entry.phase.contains(&phase) {
                entry.phase.push(phase);
            }
        }
        Ok(())
    }

    fn assignment(
        &mut self,
        id: PrincipalId,
        principal: &str,
        targets: &[ast::ConstantRef],
        value: &ast::ValueExpr,
    ) -> Result<(), LoweringError> {
        let first = targets.first().map(|t| t.name.clone()).unwrap_or_default();
        let lowered = ValueScope {
            km: &self.km,
            principal: id,
            principal_name: principal,
        }
        .value(value)?;

        let outputs: Vec<Value> = match lowered {
            Value::Constant(_) => return Err(LoweringError::AssignValueToValue(first)),
            Value::Primitive(p) => {
                let spec = p.id.spec();
                if !spec.accepts_outputs(targets.len()) {
                    return Err(LoweringError::WrongOutputs {
                        primitive: spec.name.to_owned(),
                        expected: range_text(spec.outputs),
                        got: targets.len(),
                    });
                }
                (0..targets.len())
                    .map(|i| Value::Primitive(p.clone().with_output(i)))
                    .collect()
            }
            Value::Equation(e) => {
                if targets.len() > 1 {
                    return Err(LoweringError::MultipleTargets(first));
                }
                vec![Value::Equation(e)]
            }
        };

        for (target, assigned) in targets.iter().zip(outputs) {
            if self.km.entries.contains_key(&target.name) {
                return Err(LoweringError::AssignedTwice(target.name.clone()));
            }
            let c = Constant::new(&target.name, Declaration::Assignment, Qualifier::Private);
            self.insert(c, assigned, id);
        }
        Ok(())
    }

    fn message(&mut self, m: &ast::Message) -> Result<(), LoweringError> {
        let sender = self.principal_id(&m.sender)?;
        let recipient = self.principal_id(&m.recipient)?;
        if sender == recipient {
            return Err(LoweringError::SelfMessage(m.sender.clone()));
        }
        self.declared_at += 1;
        let phase = self.phase;
        let mut sent = Vec::with_capacity(m.constants.len());
        for r in &m.constants {
            if !knows(&self.km, sender, &r.name) {
                return Err(LoweringError::SenderDoesNotKnow {
                    sender: m.sender.clone(),
                    name: r.name.clone(),
                });
            }
            if knows(&self.km, recipient, &r.name) {
                return Err(LoweringError::RecipientAlreadyKnows {
                    recipient: m.recipient.clone(),
                    name: r.name.clone(),
                });
            }
            let Some(entry) = self.km.entries.get_mut(&r.name) else {
                continue;
            };
            entry.known_by.push(KnownBy { recipient, sender });
            if !entry.phase.contains(&phase) {
                entry.phase.push(phase);
            }
            let mut c = entry.constant.clone();
            c.guard = r.guard;
            sent.push(c);
        }
        self.km.messages.push(WireMessage {
            sender,
            recipient,
            constants: sent,
            phase,
        });
        Ok(())
    }

    fn phase(&mut self, number: usize) -> Result<(), LoweringError> {
        let ordered = if self.seen_phase {
            number > self.phase
        } else {
            number >= self.phase
        };
        if !ordered {
            return Err(LoweringError::PhaseOrder {
                previous: self.phase,
                found: number,
            });
        }
        self.seen_phase = true;
        self.phase = number;
        Ok(())
    }
}
