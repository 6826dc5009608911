use tracing::info;

use super::standard::standard_run;
use super::{begin_phase, Context, PipelineError};

/// Phase by phase, the attacker only watches honest runs.
pub(crate) fn run(ctx: &Context<'_>) -> Result<(), PipelineError> {
    for phase in 0..=ctx.model.knowledge_map.max_phase {
        info!("Running passive attacker at phase {phase}...");
        begin_phase(ctx, phase);
        standard_run(ctx)?;
        if ctx.results.all_resolved() {
            break;
        }
    }
    Ok(())
}
