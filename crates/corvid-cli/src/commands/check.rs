use std::path::PathBuf;

use corvid_engine::pipeline::{check, source_sha256};
use corvid_ir::CompiledModel;

use super::helpers::{fail, parse_output_format, print_json, read_source};
use crate::types::{ModelSummary, OutputFormat};

fn summarize(filename: &str, source: &str, model: &CompiledModel) -> ModelSummary {
    let km = &model.knowledge_map;
    ModelSummary {
        file: filename.to_owned(),
        source_sha256: source_sha256(source),
        attacker: model.attacker.to_string(),
        principals: model
            .principal_states
            .iter()
            .map(|s| s.name().to_owned())
            .collect(),
        constants: km.entries().count(),
        messages: km.messages().len(),
        phases: km.max_phase + 1,
        queries: model.queries.iter().map(ToString::to_string).collect(),
    }
}

/// Run the `check` CLI command.
pub(crate) fn run_check_command(file: PathBuf, format: String) -> miette::Result<()> {
    let output_format = parse_output_format(&format)?;
    let (source, filename) = read_source(&file)?;
    let model = match check(&source, &filename) {
        Ok(model) => model,
        Err(e) => return fail(output_format, e.into()),
    };
    let summary = summarize(&filename, &source, &model);
    match output_format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Text => {
            println!("{} is well formed ({} attacker)", summary.file, summary.attacker);
            println!("  principals: {}", summary.principals.join(", "));
            println!(
                "  {} constant(s), {} message(s), {} phase(s)",
                summary.constants, summary.messages, summary.phases
            );
            for q in &summary.queries {
                println!("  {q}");
            }
        }
    }
    Ok(())
}

/// Run the `parse` CLI command.
pub(crate) fn run_parse_command(file: PathBuf) -> miette::Result<()> {
    let (source, filename) = read_source(&file)?;
    let model = corvid_dsl::parse(&source, &filename)?;
    print_json(&model)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_counts_model_parts() {
        let src = "attacker[passive]
            principal A[ generates s ]
            A -> B: s
            principal B[ knows public c ]
            phase[1]
            principal A[ leaks s ]
            queries[ confidentiality? s ]";
        let model = check(src, "m.vp").expect("checks");
        let summary = summarize("m.vp", src, &model);
        assert_eq!(summary.attacker, "passive");
        assert_eq!(summary.principals, ["A", "B"]);
        assert_eq!(summary.messages, 1);
        assert_eq!(summary.phases, 2);
        assert_eq!(summary.queries, ["confidentiality? s"]);
    }
}
