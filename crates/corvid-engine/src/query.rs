//! Query evaluation against one analysed state.

use tracing::info;

use corvid_ir::knowledge_map::KnowledgeMap;
use corvid_ir::principal_state::PrincipalState;
use corvid_ir::query::{MessageRef, Query, QueryKind, QueryOption};
use corvid_ir::resolve::{contains_fresh_values, ResolutionError};
use corvid_ir::rewrite::rewrite_value;
use corvid_ir::value::{Constant, Value};

use crate::attacker_state::AttackerState;
use crate::pipeline::{Context, PipelineError};
use crate::result::{Mutation, OptionResult, QueryResult, QueryStatus};

/// Evidence that a query does not hold.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub summary: String,
    pub value: Option<Value>,
}

/// The honest definition of `c`, fully expanded and simplified.
fn original_value(km: &KnowledgeMap, c: &Constant) -> Value {
    rewrite_value(&km.resolve(&Value::Constant(c.clone()))).value
}

/// Whether the value `state` holds for `c` mentions a fresh constant.
fn is_fresh(state: &PrincipalState, c: &Constant, i: usize, max_depth: usize) -> Result<bool, ResolutionError> {
    // Truncated branches can lose constants a definition reaches, so
    // mutated states are read from their already resolved values.
    if state.mutated().iter().any(|&m| m) {
        return Ok(state.assigned()[i].constants().iter().any(|leaf| leaf.fresh));
    }
    contains_fresh_values(state, &Value::Constant(c.clone()), c, max_depth)
}

fn confidentiality(km: &KnowledgeMap, attacker: &AttackerState, c: &Constant) -> Option<Violation> {
    let v = original_value(km, c);
    attacker.knows(&v).then(|| Violation {
        summary: format!("{} is obtained by the attacker as {v}", c.name),
        value: Some(v),
    })
}

fn authentication(km: &KnowledgeMap, state: &PrincipalState, m: &MessageRef) -> Option<Violation> {
    if state.id() != m.recipient {
        return None;
    }
    for c in &m.constants {
        let Some(i) = state.index_of(&c.name) else {
            continue;
        };
        if !state.mutated()[i] || state.sender()[i] == m.sender {
            continue;
        }
        let received = &state.assigned()[i];
        if received.equivalent(&original_value(km, c), true) {
            continue;
        }
        for (ii, dependent) in state.constants().iter().enumerate() {
            if ii == i
                || state.creator()[ii] != state.id()
                || !km.depends_on(&dependent.name, &c.name)
            {
                continue;
            }
            let Some(Value::Primitive(p)) = km.entry(&dependent.name).map(|e| &e.assigned) else {
                continue;
            };
            if p.check || (p.id.spec().has_rule() && state.rewritten()[ii]) {
                return Some(Violation {
                    summary: format!(
                        "{} uses {} = {received} in {}, believing it came from {}",
                        m.recipient_name, c.name, dependent.name, m.sender_name
                    ),
                    value: Some(received.clone()),
                });
            }
        }
    }
    None
}

fn freshness(
    state: &PrincipalState,
    c: &Constant,
    max_depth: usize,
) -> Result<Option<Violation>, ResolutionError> {
    let Some(i) = state.index_of(&c.name).filter(|&i| state.known()[i]) else {
        return Ok(None);
    };
    if is_fresh(state, c, i, max_depth)? {
        return Ok(None);
    }
    Ok(Some(Violation {
        summary: format!(
            "{} is not a fresh value; if used as a nonce, replay attacks may be possible",
            c.name
        ),
        value: Some(state.assigned()[i].clone()),
    }))
}

fn unlinkability(
    state: &PrincipalState,
    cs: &[Constant],
    max_depth: usize,
) -> Result<Option<Violation>, ResolutionError> {
    let mut values = Vec::with_capacity(cs.len());
    for c in cs {
        let Some(i) = state.index_of(&c.name).filter(|&i| state.known()[i]) else {
            return Ok(None);
        };
        if !is_fresh(state, c, i, max_depth)? {
            return Ok(Some(Violation {
                summary: format!(
                    "{} cannot be an unlinkability candidate since it is not fresh",
                    c.name
                ),
                value: Some(state.assigned()[i].clone()),
            }));
        }
        values.push((c, &state.assigned()[i]));
    }
    for (n, (a, va)) in values.iter().enumerate() {
        for (b, vb) in &values[n + 1..] {
            if va.equivalent(vb, true) {
                return Ok(Some(Violation {
                    summary: format!("{} and {} resolve to the same value {va}", a.name, b.name),
                    value: Some((*va).clone()),
                }));
            }
        }
    }
    Ok(None)
}

/// Evaluates one query. `Ok(None)` means no violation in this state.
pub fn evaluate(
    km: &KnowledgeMap,
    query: &Query,
    state: &PrincipalState,
    attacker: &AttackerState,
    max_depth: usize,
) -> Result<Option<Violation>, ResolutionError> {
    match &query.kind {
        QueryKind::Confidentiality(c) => Ok(confidentiality(km, attacker, c)),
        QueryKind::Authentication(m) => Ok(authentication(km, state, m)),
        QueryKind::Freshness(c) => freshness(state, c, max_depth),
        QueryKind::Unlinkability(cs) => unlinkability(state, cs, max_depth),
    }
}

/// `precondition[A -> B: c]` holds when B got every `c` from A untouched.
fn option_results(query: &Query, state: &PrincipalState) -> Vec<OptionResult> {
    query
        .options
        .iter()
        .map(|option| match option {
            QueryOption::Precondition(m) => {
                let resolved = state.id() == m.recipient
                    && m.constants.iter().all(|c| {
                        state
                            .index_of(&c.name)
                            .is_some_and(|i| state.sender()[i] == m.sender && !state.mutated()[i])
                    });
                OptionResult {
                    option: format!("precondition[{m}]"),
                    resolved,
                }
            }
        })
        .collect()
}

/// The attacker's substitutions in `state`.
pub fn mutations_of(state: &PrincipalState) -> Vec<Mutation> {
    (0..state.len())
        .filter(|&i| state.mutated()[i])
        .map(|i| Mutation {
            constant: state.constants()[i].name.clone(),
            original: state.before_mutate()[i].to_string(),
            substituted: state.assigned()[i].to_string(),
        })
        .collect()
}

/// Evaluates every still-open query and records failures.
pub(crate) fn resolve_queries(
    ctx: &Context<'_>,
    state: &PrincipalState,
    attacker: &AttackerState,
) -> Result<(), PipelineError> {
    let km = &ctx.model.knowledge_map;
    for (index, query) in ctx.model.queries.iter().enumerate() {
        if ctx.results.is_resolved(index) {
            continue;
        }
        let Some(violation) = evaluate(km, query, state, attacker, ctx.options.max_resolution_depth)?
        else {
            continue;
        };
        let result = QueryResult {
            query: query.to_string(),
            status: QueryStatus::Fail,
            summary: Some(violation.summary),
            value: violation.value.as_ref().map(ToString::to_string),
            principal: Some(state.name().to_owned()),
            mutations: mutations_of(state),
            options: option_results(query, state),
        };
        if ctx.results.record(index, result) {
            info!(query = %query, principal = state.name(), "query failed");
        }
    }
    Ok(())
}
