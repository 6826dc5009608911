use std::path::PathBuf;

use tracing::info;

use corvid_engine::{verify, PipelineOptions, WorthwhilePolicy};

use super::helpers::{fail, parse_attacker, parse_output_format, print_json, read_source};
use crate::types::OutputFormat;

pub(crate) struct VerifyArgs {
    pub(crate) file: PathBuf,
    pub(crate) format: String,
    pub(crate) attacker: Option<String>,
    pub(crate) threads: Option<usize>,
    pub(crate) max_depth: usize,
    pub(crate) exhaustion_stage: usize,
    pub(crate) exhaustive: bool,
}

impl VerifyArgs {
    fn options(&self) -> miette::Result<PipelineOptions> {
        Ok(PipelineOptions {
            attacker_override: self.attacker.as_deref().map(parse_attacker).transpose()?,
            max_resolution_depth: self.max_depth,
            exhaustion_stage: self.exhaustion_stage,
            worthwhile: if self.exhaustive {
                WorthwhilePolicy::Always
            } else {
                WorthwhilePolicy::SinceLastIncrement
            },
            threads: self.threads,
        })
    }
}

/// Run the `verify` CLI command.
pub(crate) fn run_verify_command(args: VerifyArgs) -> miette::Result<()> {
    let output_format = parse_output_format(&args.format)?;
    let options = args.options()?;
    let (source, filename) = read_source(&args.file)?;

    let report = match verify(&source, &filename, &options) {
        Ok(report) => report,
        Err(e) => return fail(output_format, e.into()),
    };
    info!(
        phases = report.stats.phases,
        stages = report.stats.stages,
        analyses = report.stats.analyses,
        "Verification of {filename} finished"
    );

    match output_format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Text => println!("{report}"),
    }
    if !report.all_pass() {
        std::process::exit(1);
    }
    Ok(())
}
