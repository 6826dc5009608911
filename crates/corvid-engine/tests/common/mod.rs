#![allow(dead_code)]

use corvid_dsl::ast::AttackerKind;
use corvid_engine::{verify, PipelineOptions, QueryStatus, VerificationReport};

pub fn load_model(name: &str) -> String {
    let path = format!("{}/../../models/{name}", env!("CARGO_MANIFEST_DIR"));
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to load {path}: {e}"))
}

pub fn load_all_models() -> Vec<(String, String)> {
    let dir = format!("{}/../../models", env!("CARGO_MANIFEST_DIR"));
    let mut files: Vec<std::path::PathBuf> = std::fs::read_dir(&dir)
        .unwrap_or_else(|e| panic!("Failed to read {dir}: {e}"))
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some("vp"))
        .collect();
    files.sort();
    files
        .into_iter()
        .map(|path| {
            let file = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("unknown.vp")
                .to_string();
            let src = std::fs::read_to_string(&path)
                .unwrap_or_else(|e| panic!("Failed to read {}: {e}", path.display()));
            (file, src)
        })
        .collect()
}

pub fn verify_model_file(name: &str, attacker: Option<AttackerKind>) -> VerificationReport {
    let options = PipelineOptions {
        attacker_override: attacker,
        ..PipelineOptions::default()
    };
    verify(&load_model(name), name, &options)
        .unwrap_or_else(|e| panic!("{name} failed to verify: {e}"))
}

pub fn statuses(report: &VerificationReport) -> Vec<QueryStatus> {
    report.queries.iter().map(|q| q.status).collect()
}
