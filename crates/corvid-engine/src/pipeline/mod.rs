#![allow(clippy::result_large_err)]

mod active;
mod passive;
mod standard;

use miette::Diagnostic;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::info;

use corvid_dsl::ast::AttackerKind;
use corvid_dsl::errors::ParseError;
use corvid_dsl::parse;
use corvid_ir::lowering::{lower_with_source, LoweringError, SpannedLoweringError};
use corvid_ir::resolve::{ResolutionError, DEFAULT_MAX_DEPTH};
use corvid_ir::CompiledModel;

use crate::attacker_state::{AttackerState, AttackerStore};
use crate::result::{QueryResult, SearchStats, VerificationReport, VerifyResults};

pub use crate::mutation_map::WorthwhilePolicy;

#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    #[diagnostic(transparent)]
    Lowering(#[from] SpannedLoweringError),
    #[error("Lowering error: {0}")]
    #[diagnostic(code(corvid::lower))]
    UnspannedLowering(#[from] LoweringError),
    #[error(transparent)]
    #[diagnostic(transparent)]
    Resolution(#[from] ResolutionError),
    #[error("{principal}: checked primitive {primitive} fails in the honest run")]
    #[diagnostic(
        code(corvid::model::check),
        help("the protocol as written cannot complete; fix the model before verifying it")
    )]
    CheckFailed { principal: String, primitive: String },
    #[error("{principal}: equation {value} does not start from the generator G")]
    #[diagnostic(code(corvid::model::equation))]
    EquationBase { principal: String, value: String },
    #[error("could not start worker pool: {0}")]
    #[diagnostic(code(corvid::threads))]
    ThreadPool(String),
}

/// Options for the verification pipeline.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Verify against this attacker instead of the one the model declares.
    pub attacker_override: Option<AttackerKind>,
    pub max_resolution_depth: usize,
    /// Stages after this one stop the search once knowledge stops growing.
    pub exhaustion_stage: usize,
    pub worthwhile: WorthwhilePolicy,
    /// Size of a dedicated rayon pool. `None` uses the global pool.
    pub threads: Option<usize>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            attacker_override: None,
            max_resolution_depth: DEFAULT_MAX_DEPTH,
            exhaustion_stage: 5,
            worthwhile: WorthwhilePolicy::default(),
            threads: None,
        }
    }
}

/// Shared state of one verification run.
pub(crate) struct Context<'a> {
    pub(crate) model: &'a CompiledModel,
    pub(crate) options: &'a PipelineOptions,
    pub(crate) attacker: AttackerStore,
    pub(crate) results: VerifyResults,
    errors: Mutex<Vec<PipelineError>>,
    phases: AtomicUsize,
    stages: AtomicUsize,
}

impl<'a> Context<'a> {
    pub(crate) fn new(model: &'a CompiledModel, options: &'a PipelineOptions) -> Self {
        Self {
            model,
            options,
            attacker: AttackerStore::default(),
            results: VerifyResults::new(&model.queries),
            errors: Mutex::new(Vec::new()),
            phases: AtomicUsize::new(0),
            stages: AtomicUsize::new(0),
        }
    }

    /// Records an error raised inside a spawned task.
    pub(crate) fn push_error(&self, err: PipelineError) {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(err);
    }

    pub(crate) fn failed(&self) -> bool {
        !self
            .errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Returns the first error collected since the last barrier.
    pub(crate) fn take_error(&self) -> Result<(), PipelineError> {
        let mut errors = self.errors.lock().unwrap_or_else(PoisonError::into_inner);
        if errors.is_empty() {
            return Ok(());
        }
        Err(errors.swap_remove(0))
    }

    /// True once nothing is left to decide or a task has failed.
    pub(crate) fn should_stop(&self) -> bool {
        self.results.all_resolved() || self.failed()
    }

    pub(crate) fn count_phase(&self) {
        self.phases.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn count_stage(&self) {
        self.stages.fetch_add(1, Ordering::Relaxed);
    }

    fn finish(self) -> (Vec<QueryResult>, SearchStats) {
        let stats = SearchStats {
            phases: self.phases.load(Ordering::Relaxed),
            stages: self.stages.load(Ordering::Relaxed),
            analyses: self.results.analyses(),
        };
        (self.results.finish(), stats)
    }
}

/// Rebuilds the attacker's knowledge for `phase` from what it carried out
/// of the previous one.
pub(crate) fn begin_phase(ctx: &Context<'_>, phase: usize) {
    let previous = ctx.attacker.snapshot();
    let previous = (phase > 0).then_some(&previous);
    ctx.attacker.replace(AttackerState::for_phase(
        previous,
        &ctx.model.knowledge_map,
        phase,
    ));
    ctx.count_phase();
}

fn run(
    model: &CompiledModel,
    options: &PipelineOptions,
    attacker: AttackerKind,
) -> Result<(Vec<QueryResult>, SearchStats), PipelineError> {
    let search = || -> Result<(Vec<QueryResult>, SearchStats), PipelineError> {
        let ctx = Context::new(model, options);
        match attacker {
            AttackerKind::Passive => passive::run(&ctx)?,
            AttackerKind::Active => active::run(&ctx)?,
        }
        Ok(ctx.finish())
    };
    match options.threads {
        Some(n) => rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build()
            .map_err(|e| PipelineError::ThreadPool(e.to_string()))?
            .install(search),
        None => search(),
    }
}

/// Verifies against an attacker that only observes the wire.
pub fn verify_passive(
    model: &CompiledModel,
    options: &PipelineOptions,
) -> Result<(Vec<QueryResult>, SearchStats), PipelineError> {
    run(model, options, AttackerKind::Passive)
}

/// Verifies against an attacker that may substitute unguarded values.
pub fn verify_active(
    model: &CompiledModel,
    options: &PipelineOptions,
) -> Result<(Vec<QueryResult>, SearchStats), PipelineError> {
    run(model, options, AttackerKind::Active)
}

/// Runs the search for `model` against its declared attacker, or the
/// override in `options`. Results are in query order.
pub fn verify_model(
    model: &CompiledModel,
    options: &PipelineOptions,
) -> Result<(Vec<QueryResult>, SearchStats), PipelineError> {
    run(model, options, options.attacker_override.unwrap_or(model.attacker))
}

/// Parses, lowers, and verifies `source`.
pub fn verify(
    source: &str,
    filename: &str,
    options: &PipelineOptions,
) -> Result<VerificationReport, PipelineError> {
    info!("Parsing {filename}...");
    let model = parse(source, filename)?;
    let compiled = lower_with_source(&model, source, filename)?;
    let attacker = options.attacker_override.unwrap_or(compiled.attacker);
    info!(
        principals = compiled.principal_states.len(),
        queries = compiled.queries.len(),
        %attacker,
        "Verifying {filename}..."
    );
    let (queries, stats) = verify_model(&compiled, options)?;
    Ok(VerificationReport {
        file: filename.to_owned(),
        source_sha256: source_sha256(source),
        attacker: attacker.to_string(),
        queries,
        stats,
    })
}

/// Parses and lowers `source` without verifying it.
pub fn check(source: &str, filename: &str) -> Result<CompiledModel, PipelineError> {
    let model = parse(source, filename)?;
    Ok(lower_with_source(&model, source, filename)?)
}

pub fn source_sha256(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_match_documented_values() {
        let options = PipelineOptions::default();
        assert_eq!(options.max_resolution_depth, 65535);
        assert_eq!(options.exhaustion_stage, 5);
        assert_eq!(options.worthwhile, WorthwhilePolicy::SinceLastIncrement);
        assert!(options.attacker_override.is_none());
        assert!(options.threads.is_none());
    }

    #[test]
    fn digest_is_stable_hex() {
        let digest = source_sha256("");
        assert_eq!(
            digest,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn parse_errors_surface_as_pipeline_errors() {
        let err = verify("attacker[sideways]", "bad.vp", &PipelineOptions::default())
            .expect_err("does not parse");
        assert!(matches!(err, PipelineError::Parse(_)));
    }

    #[test]
    fn lowering_errors_keep_their_span() {
        let src = "attacker[passive]
            principal A[ x = HASH(y) ]
            queries[ confidentiality? x ]";
        let err = check(src, "bad.vp").expect_err("does not lower");
        match err {
            PipelineError::Lowering(spanned) => assert!(spanned.span.is_some()),
            other => panic!("unexpected error: {other}"),
        }
    }
}
