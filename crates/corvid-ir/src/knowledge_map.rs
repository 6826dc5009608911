//! The global, declaration-ordered record of every constant in a model.

use indexmap::IndexMap;

use crate::value::{Constant, Equation, PrincipalId, Primitive, Value};

/// `recipient` learned the constant from `sender`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KnownBy {
    pub recipient: PrincipalId,
    pub sender: PrincipalId,
}

#[derive(Debug, Clone)]
pub struct KnowledgeEntry {
    pub constant: Constant,
    /// Defining value. For declared constants this is the constant itself.
    pub assigned: Value,
    pub creator: PrincipalId,
    pub known_by: Vec<KnownBy>,
    pub declared_at: usize,
    /// Phases in which the constant was declared, sent, or leaked.
    pub phase: Vec<usize>,
    /// Phases in which the constant was leaked.
    pub leaked_in: Vec<usize>,
}

/// One `Sender -> Recipient: ...` block.
#[derive(Debug, Clone)]
pub struct WireMessage {
    pub sender: PrincipalId,
    pub recipient: PrincipalId,
    /// Constants as sent; `guard` reflects the brackets in the message.
    pub constants: Vec<Constant>,
    pub phase: usize,
}

#[derive(Debug, Clone)]
pub struct KnowledgeMap {
    pub(crate) principals: Vec<String>,
    pub(crate) entries: IndexMap<String, KnowledgeEntry>,
    pub(crate) messages: Vec<WireMessage>,
    pub max_declared_at: usize,
    pub max_phase: usize,
}

pub const ATTACKER_NAME: &str = "Attacker";

impl Default for KnowledgeMap {
    fn default() -> Self {
        Self::new()
    }
}

impl KnowledgeMap {
    /// An empty map holding only the attacker and the predefined `g` and
    /// `nil` constants.
    pub fn new() -> Self {
        let mut entries = IndexMap::new();
        for constant in [Constant::g(), Constant::nil()] {
            entries.insert(
                constant.name.clone(),
                KnowledgeEntry {
                    assigned: Value::Constant(constant.clone()),
                    constant,
                    creator: PrincipalId::ATTACKER,
                    known_by: Vec::new(),
                    declared_at: 0,
                    phase: vec![0],
                    leaked_in: Vec::new(),
                },
            );
        }
        Self {
            principals: vec![ATTACKER_NAME.to_owned()],
            entries,
            messages: Vec::new(),
            max_declared_at: 0,
            max_phase: 0,
        }
    }

    /// Principal names; index 0 is the attacker.
    pub fn principals(&self) -> &[String] {
        &self.principals
    }

    pub fn principal_name(&self, id: PrincipalId) -> &str {
        self.principals
            .get(id.0)
            .map(String::as_str)
            .unwrap_or(ATTACKER_NAME)
    }

    pub fn principal_id(&self, name: &str) -> Option<PrincipalId> {
        self.principals
            .iter()
            .position(|p| p == name)
            .map(PrincipalId)
    }

    /// Principals declared in the model, excluding the attacker.
    pub fn honest_principals(&self) -> impl Iterator<Item = (PrincipalId, &str)> {
        self.principals
            .iter()
            .enumerate()
            .skip(1)
            .map(|(i, name)| (PrincipalId(i), name.as_str()))
    }

    pub fn entries(&self) -> impl Iterator<Item = &KnowledgeEntry> {
        self.entries.values()
    }

    pub fn entry(&self, name: &str) -> Option<&KnowledgeEntry> {
        self.entries.get(name)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.entries.get_index_of(name)
    }

    pub fn constant(&self, name: &str) -> Option<&Constant> {
        self.entries.get(name).map(|e| &e.constant)
    }

    pub fn messages(&self) -> &[WireMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Expands every constant in `v` into its definition, recursively.
    ///
    /// Definitions only refer to earlier constants, so this terminates.
    pub fn resolve(&self, v: &Value) -> Value {
        match v {
            Value::Constant(c) => match self.entries.get(&c.name) {
                Some(entry) => match &entry.assigned {
                    Value::Constant(_) => entry.assigned.clone(),
                    defined => self.resolve(defined),
                },
                None => v.clone(),
            },
            Value::Primitive(p) => Value::Primitive(Primitive {
                arguments: p.arguments.iter().map(|a| self.resolve(a)).collect(),
                ..p.clone()
            }),
            Value::Equation(e) => {
                let mut values = Vec::with_capacity(e.values.len());
                for (i, term) in e.values.iter().enumerate() {
                    splice_term(&mut values, i, self.resolve(term));
                }
                Value::Equation(Equation { values })
            }
        }
    }

    /// True when the definition of `name` refers to `target`, directly or
    /// through other assigned constants.
    pub fn depends_on(&self, name: &str, target: &str) -> bool {
        let Some(entry) = self.entries.get(name) else {
            return false;
        };
        if matches!(entry.assigned, Value::Constant(_)) {
            return false;
        }
        entry.assigned.constants().into_iter().any(|c| {
            c.name == target || (c.name != name && self.depends_on(&c.name, target))
        })
    }

    /// The phases in which `name` was leaked.
    pub fn leaked_in(&self, name: &str) -> &[usize] {
        self.entries
            .get(name)
            .map(|e| e.leaked_in.as_slice())
            .unwrap_or(&[])
    }
}

/// Appends an exponentiation term. A term that is itself an equation is
/// flattened: in base position it replaces the chain, elsewhere its own
/// base is dropped.
pub(crate) fn splice_term(values: &mut Vec<Value>, position: usize, term: Value) {
    match term {
        Value::Equation(inner) if position == 0 => {
            *values = inner.values;
        }
        Value::Equation(inner) => {
            values.extend(inner.values.into_iter().skip(1));
        }
        other => values.push(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::PrimitiveId;
    use crate::value::{Declaration, Qualifier};

    fn declare(km: &mut KnowledgeMap, name: &str, assigned: Option<Value>) {
        let constant = Constant::new(
            name,
            if assigned.is_some() {
                Declaration::Assignment
            } else {
                Declaration::Knows
            },
            Qualifier::Private,
        );
        km.entries.insert(
            name.to_owned(),
            KnowledgeEntry {
                assigned: assigned.unwrap_or_else(|| Value::Constant(constant.clone())),
                constant,
                creator: PrincipalId(1),
                known_by: vec![],
                declared_at: 0,
                phase: vec![0],
                leaked_in: vec![],
            },
        );
    }

    fn c(name: &str) -> Value {
        Value::Constant(Constant::new(name, Declaration::Knows, Qualifier::Private))
    }

    #[test]
    fn predefined_constants_belong_to_the_attacker() {
        let km = KnowledgeMap::new();
        assert_eq!(km.len(), 2);
        assert_eq!(km.entry("g").map(|e| e.creator), Some(PrincipalId::ATTACKER));
        assert_eq!(km.index_of("nil"), Some(1));
        assert_eq!(km.principal_name(PrincipalId::ATTACKER), "Attacker");
    }

    #[test]
    fn resolve_flattens_nested_exponentiation() {
        let mut km = KnowledgeMap::new();
        declare(&mut km, "a", None);
        declare(&mut km, "b", None);
        declare(&mut km, "ga", Some(Value::exp([c("a")])));
        declare(
            &mut km,
            "gab",
            Some(Value::Equation(Equation {
                values: vec![c("ga"), c("b")],
            })),
        );
        let resolved = km.resolve(&c("gab"));
        assert_eq!(resolved.to_string(), "G^a^b");
    }

    #[test]
    fn dependency_is_transitive() {
        let mut km = KnowledgeMap::new();
        declare(&mut km, "k", None);
        declare(&mut km, "m", None);
        declare(
            &mut km,
            "h",
            Some(Value::Primitive(Primitive::new(PrimitiveId::Hash, vec![c("m")]))),
        );
        declare(
            &mut km,
            "e",
            Some(Value::Primitive(Primitive::new(
                PrimitiveId::Enc,
                vec![c("k"), c("h")],
            ))),
        );
        assert!(km.depends_on("e", "m"));
        assert!(km.depends_on("e", "h"));
        assert!(!km.depends_on("h", "k"));
        assert!(!km.depends_on("m", "m"));
    }
}
