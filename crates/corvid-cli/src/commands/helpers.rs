use std::path::Path;

use miette::{IntoDiagnostic, WrapErr};
use serde_json::json;

use corvid_dsl::ast::AttackerKind;

use crate::types::OutputFormat;

pub(crate) fn parse_output_format(raw: &str) -> miette::Result<OutputFormat> {
    match raw {
        "text" => Ok(OutputFormat::Text),
        "json" => Ok(OutputFormat::Json),
        other => miette::bail!("Unknown output format: {other}. Use 'text' or 'json'."),
    }
}

pub(crate) fn parse_attacker(raw: &str) -> miette::Result<AttackerKind> {
    match raw {
        "passive" => Ok(AttackerKind::Passive),
        "active" => Ok(AttackerKind::Active),
        other => miette::bail!("Unknown attacker: {other}. Use 'passive' or 'active'."),
    }
}

pub(crate) fn read_source(path: &Path) -> miette::Result<(String, String)> {
    let source = std::fs::read_to_string(path)
        .into_diagnostic()
        .wrap_err_with(|| format!("Failed to read {}", path.display()))?;
    Ok((source, path.display().to_string()))
}

/// Prints `value` as pretty JSON on stdout.
pub(crate) fn print_json(value: &impl serde::Serialize) -> miette::Result<()> {
    println!("{}", serde_json::to_string_pretty(value).into_diagnostic()?);
    Ok(())
}

/// Reports a failed command in the requested format and exits with status 1.
/// Text output goes through miette so spans and help are rendered.
pub(crate) fn fail(format: OutputFormat, err: miette::Report) -> miette::Result<()> {
    match format {
        OutputFormat::Json => {
            print_json(&json!({ "error": err.to_string() }))?;
            std::process::exit(1);
        }
        OutputFormat::Text => Err(err),
    }
}
