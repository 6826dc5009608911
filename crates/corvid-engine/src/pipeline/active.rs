//! The active search: staged mutation of every principal's view.

use rayon::Scope;
use tracing::{debug, info};

use corvid_ir::principal_state::PrincipalState;
use corvid_ir::resolve::{resolve_all_principal_state_values, resolve_constant, resolve_value};
use corvid_ir::rewrite::perform_all_rewrites;
use corvid_ir::value::Value;

use super::standard::standard_run;
use super::{begin_phase, Context, PipelineError};
use crate::analysis::analyse;
use crate::attacker_state::AttackerState;
use crate::mutation_map::{MutationMap, WorthwhilePolicy};

pub(crate) fn run(ctx: &Context<'_>) -> Result<(), PipelineError> {
    for phase in 0..=ctx.model.knowledge_map.max_phase {
        info!("Running active attacker at phase {phase}...");
        begin_phase(ctx, phase);
        standard_run(ctx)?;
        run_stage(ctx, 1)?;
        let (a, b) = rayon::join(|| run_stage(ctx, 2), || run_stage(ctx, 3));
        a?;
        b?;
        let (a, b) = rayon::join(|| run_stage(ctx, 4), || run_stage(ctx, 5));
        a?;
        b?;
        let mut stage = 6;
        while !ctx.results.all_resolved() && !ctx.attacker.is_exhausted() {
            run_stage(ctx, stage)?;
            stage += 1;
        }
        if ctx.results.all_resolved() {
            break;
        }
    }
    Ok(())
}

/// Scans every principal's mutation map. Returns once all spawned scans
/// and analyses have finished.
fn run_stage(ctx: &Context<'_>, stage: usize) -> Result<(), PipelineError> {
    if ctx.should_stop() {
        return ctx.take_error();
    }
    ctx.count_stage();
    let attacker = ctx.attacker.snapshot();
    let known_before = attacker.len();
    debug!(stage, known = known_before, "running stage");
    rayon::scope(|s| {
        for state in &ctx.model.principal_states {
            let attacker = &attacker;
            s.spawn(move |s| {
                match MutationMap::new(state, attacker, stage, ctx.options.max_resolution_depth) {
                    Ok(map) if map.is_empty() => {}
                    Ok(map) => scan(ctx, state, attacker, map, stage, s),
                    Err(e) => ctx.push_error(e.into()),
                }
            });
        }
    });
    ctx.take_error()?;
    if stage > ctx.options.exhaustion_stage && ctx.attacker.len() == known_before {
        debug!(stage, "attacker knowledge exhausted");
        ctx.attacker.set_exhausted();
    }
    Ok(())
}

fn scan<'s>(
    ctx: &'s Context<'_>,
    state: &'s PrincipalState,
    attacker: &'s AttackerState,
    map: MutationMap,
    stage: usize,
    s: &Scope<'s>,
) {
    if ctx.should_stop() {
        return;
    }
    match mutate_principal_state(ctx, state, attacker, &map) {
        Ok(Some(mutated)) => s.spawn(move |_| {
            if let Err(e) = analyse(ctx, &mutated, stage) {
                ctx.push_error(e);
            }
        }),
        Ok(None) => {}
        Err(e) => {
            ctx.push_error(e);
            return;
        }
    }
    if let Some(next) = map.next() {
        s.spawn(move |s| scan(ctx, state, attacker, next, stage, s));
    }
}

/// Applies the current combination of `map` to a clone of `state`.
///
/// Returns `None` when the combination substitutes nothing new. Otherwise
/// the clone is resolved and rewritten; if one of this principal's own
/// checked primitives now fails, everything declared from that expression
/// on is dropped.
pub(crate) fn mutate_principal_state(
    ctx: &Context<'_>,
    state: &PrincipalState,
    attacker: &AttackerState,
    map: &MutationMap,
) -> Result<Option<PrincipalState>, PipelineError> {
    let max_depth = ctx.options.max_resolution_depth;
    let mut mutated = state.clone();
    let mut worthwhile = false;
    for (position, c, candidate) in map.combination() {
        let (target, Some(i)) = resolve_constant(state, c) else {
            continue;
        };
        if !attacker.knows(&Value::Constant(c.clone())) {
            continue;
        }
        let current = resolve_value(state, &target, i, true, max_depth)?;
        let mut candidate = candidate.clone();
        if let (Value::Primitive(cp), Value::Primitive(ap)) = (&mut candidate, &current) {
            cp.output = ap.output;
            cp.check = ap.check;
        }
        if matches!(candidate, Value::Primitive(_)) && candidate.contains_constant(&c.name) {
            continue;
        }
        if candidate.equivalent(&current, true) {
            continue;
        }
        mutated.mutate(i, candidate);
        worthwhile |= match ctx.options.worthwhile {
            WorthwhilePolicy::SinceLastIncrement => position >= map.changed_from(),
            WorthwhilePolicy::Always => true,
        };
    }
    if !worthwhile {
        return Ok(None);
    }
    let mut resolved = resolve_all_principal_state_values(&mutated, max_depth)?;
    let failures = perform_all_rewrites(&mut resolved);
    let own_failure = failures
        .iter()
        .find(|(p, slot)| p.check && resolved.creator()[*slot] == resolved.id())
        .map(|&(_, slot)| slot);
    if let Some(slot) = own_failure {
        let from = resolved.declared_at()[slot];
        resolved.truncate_from_declaration(from);
    }
    Ok(Some(resolved))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineOptions;
    use corvid_ir::CompiledModel;

    const MAC: &str = "attacker[active]
        principal Alice[ knows private k generates m h = MAC(k, m) ]
        Alice -> Bob: m, h
        principal Bob[ knows private k t = HASH(m) _ = ASSERT(MAC(k, m), h)? x = HASH(m) ]
        queries[ authentication? Alice -> Bob: m ]";

    fn compiled(src: &str) -> CompiledModel {
        let model = corvid_dsl::parse(src, "a.vp").expect("parses");
        corvid_ir::lower(&model).expect("lowers")
    }

    #[test]
    fn failed_checks_drop_only_what_follows_them() {
        let model = compiled(MAC);
        let options = PipelineOptions::default();
        let ctx = Context::new(&model, &options);
        let bob = model
            .principal_states
            .iter()
            .find(|s| s.name() == "Bob")
            .expect("Bob");
        let attacker = AttackerState::for_phase(None, &model.knowledge_map, 0);
        let map = MutationMap::new(bob, &attacker, 1, options.max_resolution_depth)
            .expect("builds");
        let m_at = map
            .constants
            .iter()
            .position(|c| c.name == "m")
            .expect("m is a target");
        assert_eq!(map.mutations[m_at][0], Value::nil());

        let mutated = mutate_principal_state(&ctx, bob, &attacker, &map)
            .expect("mutates")
            .expect("worthwhile");
        assert!(mutated.lengths_agree());
        let check = bob
            .constants()
            .iter()
            .position(|c| c.name.starts_with("unnamed"))
            .expect("assert slot");
        assert_eq!(mutated.len(), check);
        assert!(mutated.index_of("t").is_some());
        assert!(mutated.index_of("x").is_none());
        let m = mutated.index_of("m").expect("m survives");
        assert!(mutated.mutated()[m]);
    }

    const AEAD_MITM: &str = "attacker[active]
        principal Alice[ knows public c generates a ga = G^a ]
        Alice -> Bob: ga
        principal Bob[ knows public c generates b knows private m gb = G^b ss = ga^b e = AEAD_ENC(ss, m, c) ]
        Bob -> Alice: gb, e
        principal Alice[ ss_a = gb^a m_a = AEAD_DEC(ss_a, e, c)? ]
        queries[ authentication? Bob -> Alice: e ]";

    #[test]
    fn rollback_keeps_the_shared_secret_computed_before_the_check() {
        let model = compiled(AEAD_MITM);
        let options = PipelineOptions::default();
        let ctx = Context::new(&model, &options);
        let alice = model
            .principal_states
            .iter()
            .find(|s| s.name() == "Alice")
            .expect("Alice");
        let ss_a = alice.index_of("ss_a").expect("ss_a");
        let m_a = alice.index_of("m_a").expect("m_a");
        assert!(alice.declared_at()[ss_a] < alice.declared_at()[m_a]);

        let attacker = AttackerState::for_phase(None, &model.knowledge_map, 0);
        let map = MutationMap::new(alice, &attacker, 1, options.max_resolution_depth)
            .expect("builds");
        assert!(map.constants.iter().any(|c| c.name == "gb"));
        let mutated = mutate_principal_state(&ctx, alice, &attacker, &map)
            .expect("mutates")
            .expect("worthwhile");
        assert_eq!(mutated.len(), m_a);
        let ss_a = mutated.index_of("ss_a").expect("ss_a survives");
        assert_eq!(mutated.assigned()[ss_a].to_string(), "G^nil^a");
    }

    #[test]
    fn stages_continue_until_a_late_stage_learns_nothing() {
        let model = compiled(MAC);
        let options = PipelineOptions {
            exhaustion_stage: 2,
            ..PipelineOptions::default()
        };
        let ctx = Context::new(&model, &options);
        begin_phase(&ctx, 0);
        standard_run(&ctx).expect("honest run");
        let mut known = vec![ctx.attacker.len()];
        let mut stage = 1;
        while !ctx.attacker.is_exhausted() {
            assert!(stage < 64, "knowledge never stopped growing");
            run_stage(&ctx, stage).expect("stage runs");
            known.push(ctx.attacker.len());
            if stage <= options.exhaustion_stage {
                assert!(!ctx.attacker.is_exhausted(), "exhausted at stage {stage}");
            }
            stage += 1;
        }
        assert!(known.windows(2).all(|w| w[0] <= w[1]), "{known:?}");
        let n = known.len();
        assert_eq!(known[n - 1], known[n - 2]);
        assert!(!ctx.results.all_resolved());
    }
}
