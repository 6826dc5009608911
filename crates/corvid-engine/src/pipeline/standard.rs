//! The honest run: every principal's state, unmutated.

use rayon::prelude::*;

use corvid_ir::principal_state::PrincipalState;
use corvid_ir::resolve::resolve_all_principal_state_values;
use corvid_ir::rewrite::perform_all_rewrites;
use corvid_ir::value::Value;

use super::{Context, PipelineError};
use crate::analysis::analyse;

/// Resolves and rewrites `state`, rejecting models whose honest run is
/// already broken.
pub fn honest_state(state: &PrincipalState, max_depth: usize) -> Result<PrincipalState, PipelineError> {
    let mut resolved = resolve_all_principal_state_values(state, max_depth)?;
    let failures = perform_all_rewrites(&mut resolved);
    if let Some((p, _)) = failures.iter().find(|(p, _)| p.check) {
        return Err(PipelineError::CheckFailed {
            principal: state.name().to_owned(),
            primitive: Value::Primitive(p.clone()).to_string(),
        });
    }
    if let Some(v) = resolved.assigned().iter().find_map(non_generator_equation) {
        return Err(PipelineError::EquationBase {
            principal: state.name().to_owned(),
            value: v.to_string(),
        });
    }
    Ok(resolved)
}

fn non_generator_equation(v: &Value) -> Option<&Value> {
    match v {
        Value::Constant(_) => None,
        Value::Primitive(p) => p.arguments.iter().find_map(non_generator_equation),
        Value::Equation(e) if !e.values.first().is_some_and(Value::is_g) => Some(v),
        Value::Equation(e) => e.values.iter().find_map(non_generator_equation),
    }
}

/// Analyses every principal's honest state against the current attacker.
pub(crate) fn standard_run(ctx: &Context<'_>) -> Result<(), PipelineError> {
    ctx.model
        .principal_states
        .par_iter()
        .try_for_each(|state| {
            let resolved = honest_state(state, ctx.options.max_resolution_depth)?;
            analyse(ctx, &resolved, 0)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use corvid_ir::resolve::DEFAULT_MAX_DEPTH;

    fn states(src: &str) -> Vec<PrincipalState> {
        let model = corvid_dsl::parse(src, "s.vp").expect("parses");
        corvid_ir::lower(&model).expect("lowers").principal_states
    }

    #[test]
    fn honest_checks_pass() {
        let src = "attacker[active]
            principal A[ knows private k generates m h = MAC(k, m) ]
            A -> B: m, h
            principal B[ knows private k _ = ASSERT(MAC(k, m), h)? ]
            queries[ confidentiality? k ]";
        for state in states(src) {
            honest_state(&state, DEFAULT_MAX_DEPTH).expect("honest run succeeds");
        }
    }

    #[test]
    fn broken_checks_are_model_errors() {
        let src = "attacker[passive]
            principal A[ knows private k, j generates m e = ENC(k, m) ]
            A -> B: e
            principal B[ knows private j x = AEAD_DEC(j, e, j)? ]
            queries[ confidentiality? m ]";
        let states = states(src);
        let b = states.iter().find(|s| s.name() == "B").expect("B");
        let err = honest_state(b, DEFAULT_MAX_DEPTH).expect_err("check fails");
        assert!(matches!(err, PipelineError::CheckFailed { .. }));
    }
}
