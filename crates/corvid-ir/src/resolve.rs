//! Resolution of constants into the values a principal currently believes.
//!
//! A principal that has not legitimately received a mutated value keeps
//! seeing the value it held before the mutation. That decision is made per
//! slot by [`should_resolve_to_before_mutate`] and propagated through
//! nested values.

use miette::Diagnostic;
use thiserror::Error;

use crate::knowledge_map::splice_term;
use crate::principal_state::PrincipalState;
use crate::value::{Constant, Equation, Primitive, Value};

/// Default nesting limit for [`resolve_value`].
pub const DEFAULT_MAX_DEPTH: usize = 65535;

#[derive(Debug, Clone, Error, Diagnostic, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("invalid index: `{name}` is not in the state of {principal}")]
    #[diagnostic(code(corvid::resolve::index))]
    InvalidIndex { name: String, principal: String },

    #[error("invalid depth: resolution exceeded {limit} levels")]
    #[diagnostic(
        code(corvid::resolve::depth),
        help("the model likely contains a self-referential definition")
    )]
    InvalidDepth { limit: usize },
}

pub fn should_resolve_to_before_mutate(state: &PrincipalState, i: usize) -> bool {
    state.creator()[i] == state.id()
        || !state.known()[i]
        || !state.wire()[i].contains(&state.id())
        || !state.mutated()[i]
}

/// One level of lookup. Returns the constant itself when the state has no
/// slot for it.
pub fn resolve_constant(state: &PrincipalState, c: &Constant) -> (Value, Option<usize>) {
    match state.index_of(&c.name) {
        Some(i) if should_resolve_to_before_mutate(state, i) => {
            (state.before_mutate()[i].clone(), Some(i))
        }
        Some(i) => (state.assigned()[i].clone(), Some(i)),
        None => (Value::Constant(c.clone()), None),
    }
}

struct Resolver<'a> {
    state: &'a PrincipalState,
    max_depth: usize,
}

impl Resolver<'_> {
    fn value(
        &self,
        a: &Value,
        mut root_value: Value,
        mut root: usize,
        mut force: bool,
        depth: usize,
    ) -> Result<Value, ResolutionError> {
        if depth > self.max_depth {
            return Err(ResolutionError::InvalidDepth {
                limit: self.max_depth,
            });
        }
        let state = self.state;
        let mut a = a.clone();
        if let Value::Constant(c) = &a {
            let next = state
                .index_of(&c.name)
                .ok_or_else(|| ResolutionError::InvalidIndex {
                    name: c.name.clone(),
                    principal: state.name().to_owned(),
                })?;
            if next == root {
                if !force {
                    force = should_resolve_to_before_mutate(state, next);
                }
                a = if force {
                    state.before_mutate()[next].clone()
                } else {
                    resolve_constant(state, c).0
                };
            } else {
                if matches!(root_value, Value::Primitive(_)) && state.creator()[root] != state.id()
                {
                    force = true;
                }
                force = if force {
                    !state.mutatable_to()[next].contains(&state.creator()[root])
                } else {
                    should_resolve_to_before_mutate(state, next)
                };
                a = if force {
                    state.before_mutate()[next].clone()
                } else {
                    state.assigned()[next].clone()
                };
                root = next;
                root_value = a.clone();
            }
        }
        match &a {
            Value::Constant(_) => Ok(a),
            Value::Primitive(p) => self.primitive(p, root_value, root, force, depth + 1),
            Value::Equation(e) => self.equation(e, root_value, root, force, depth + 1),
        }
    }

    fn primitive(
        &self,
        p: &Primitive,
        root_value: Value,
        root: usize,
        mut force: bool,
        depth: usize,
    ) -> Result<Value, ResolutionError> {
        if self.state.creator()[root] == self.state.id() {
            force = false;
        }
        let arguments = p
            .arguments
            .iter()
            .map(|arg| self.value(arg, root_value.clone(), root, force, depth + 1))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Value::Primitive(Primitive {
            arguments,
            ..p.clone()
        }))
    }

    fn equation(
        &self,
        e: &Equation,
        root_value: Value,
        root: usize,
        mut force: bool,
        depth: usize,
    ) -> Result<Value, ResolutionError> {
        if depth > self.max_depth {
            return Err(ResolutionError::InvalidDepth {
                limit: self.max_depth,
            });
        }
        let state = self.state;
        if state.creator()[root] == state.id() {
            force = false;
        }
        let mut values = Vec::with_capacity(e.values.len());
        for (i, term) in e.values.iter().enumerate() {
            let term = match term {
                Value::Constant(c) => match resolve_constant(state, c) {
                    (_, Some(idx)) if force => state.before_mutate()[idx].clone(),
                    (v, _) => v,
                },
                other => other.clone(),
            };
            let term = match &term {
                Value::Constant(_) => term,
                Value::Primitive(_) => {
                    self.value(&term, root_value.clone(), root, force, depth + 1)?
                }
                Value::Equation(inner) => {
                    self.equation(inner, root_value.clone(), root, force, depth + 1)?
                }
            };
            splice_term(&mut values, i, term);
        }
        Ok(Value::Equation(Equation { values }))
    }
}

/// Resolves `v` as seen from slot `root` of `state`.
pub fn resolve_value(
    state: &PrincipalState,
    v: &Value,
    root: usize,
    force_before_mutate: bool,
    max_depth: usize,
) -> Result<Value, ResolutionError> {
    Resolver { state, max_depth }.value(v, v.clone(), root, force_before_mutate, 0)
}

/// Resolves the `assigned` and `before_rewrite` columns of every slot.
/// All lookups read the original state, so slot order does not matter.
pub fn resolve_all_principal_state_values(
    state: &PrincipalState,
    max_depth: usize,
) -> Result<PrincipalState, ResolutionError> {
    let mut resolved = state.clone();
    for i in 0..state.len() {
        let force = should_resolve_to_before_mutate(state, i);
        let assigned = resolve_value(state, &state.assigned()[i], i, force, max_depth)?;
        let before_rewrite =
            resolve_value(state, &state.before_rewrite()[i], i, force, max_depth)?;
        resolved.set_resolved(i, assigned, before_rewrite);
    }
    Ok(resolved)
}

/// True when `v`, resolved from the slot of `c`, mentions a fresh constant.
pub fn contains_fresh_values(
    state: &PrincipalState,
    v: &Value,
    c: &Constant,
    max_depth: usize,
) -> Result<bool, ResolutionError> {
    let root = state
        .index_of(&c.name)
        .ok_or_else(|| ResolutionError::InvalidIndex {
            name: c.name.clone(),
            principal: state.name().to_owned(),
        })?;
    let resolved = resolve_value(state, v, root, false, max_depth)?;
    Ok(resolved.constants().into_iter().any(|leaf| {
        state
            .index_of(&leaf.name)
            .map(|i| state.constants()[i].fresh)
            .unwrap_or(false)
    }))
}
