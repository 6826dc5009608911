//! Verification outcomes for the bundled models.

mod common;

use common::{load_all_models, load_model, statuses, verify_model_file};
use corvid_dsl::ast::AttackerKind;
use corvid_engine::{check, verify, PipelineOptions, QueryStatus, WorthwhilePolicy};

#[test]
fn every_bundled_model_compiles() {
    let models = load_all_models();
    assert!(!models.is_empty());
    for (file, src) in models {
        let compiled = check(&src, &file).unwrap_or_else(|e| panic!("{file}: {e}"));
        assert!(!compiled.queries.is_empty(), "{file} has no queries");
    }
}

#[test]
fn hashed_secret_stays_confidential() {
    let report = verify_model_file("simple_confidentiality.vp", None);
    assert_eq!(report.attacker, "active");
    assert_eq!(statuses(&report), [QueryStatus::Pass]);
    assert!(report.all_pass());

    let passive = verify_model_file("simple_confidentiality.vp", Some(AttackerKind::Passive));
    assert_eq!(passive.attacker, "passive");
    assert_eq!(statuses(&passive), [QueryStatus::Pass]);
}

#[test]
fn cleartext_secret_is_observed() {
    let report = verify_model_file("plaintext_leak.vp", None);
    assert_eq!(statuses(&report), [QueryStatus::Fail]);
    let failure = report.failures().next().expect("one failure");
    assert!(failure.summary.as_deref().is_some_and(|s| s.contains('s')));
    assert!(failure.mutations.is_empty());
}

#[test]
fn mac_check_prevents_forgery() {
    let report = verify_model_file("mac_authentication.vp", None);
    assert_eq!(statuses(&report), [QueryStatus::Pass]);
    // Stages 1 to 5 always run; the search then needs a stage past the
    // exhaustion threshold that teaches the attacker nothing.
    assert!(report.stats.stages > PipelineOptions::default().exhaustion_stage);
    assert!(report.stats.analyses > 0);
}

#[test]
fn unauthenticated_key_exchange_falls_to_active_attacker() {
    let report = verify_model_file("unguarded_dh.vp", None);
    assert_eq!(statuses(&report), [QueryStatus::Fail]);
    let failure = report.failures().next().expect("one failure");
    assert!(!failure.mutations.is_empty());
    assert!(report.to_string().contains("FAIL confidentiality? m"));
}

#[test]
fn unauthenticated_key_exchange_resists_passive_attacker() {
    let report = verify_model_file("unguarded_dh.vp", Some(AttackerKind::Passive));
    assert_eq!(statuses(&report), [QueryStatus::Pass]);
    assert_eq!(report.stats.stages, 0);
}

#[test]
fn signed_key_exchange_keeps_its_secret() {
    let report = verify_model_file("signed_handshake.vp", None);
    assert_eq!(statuses(&report), [QueryStatus::Pass, QueryStatus::Pass]);
}

#[test]
fn aead_without_authenticated_keys_accepts_forgeries() {
    let report = verify_model_file("unauthenticated_aead.vp", None);
    assert_eq!(statuses(&report), [QueryStatus::Fail]);
    let failure = report.failures().next().expect("one failure");
    assert_eq!(failure.principal.as_deref(), Some("Alice"));
    let substituted: Vec<&str> = failure.mutations.iter().map(|m| m.constant.as_str()).collect();
    assert!(substituted.contains(&"gb"), "{substituted:?}");
    assert!(substituted.contains(&"e"), "{substituted:?}");

    let passive = verify_model_file("unauthenticated_aead.vp", Some(AttackerKind::Passive));
    assert_eq!(statuses(&passive), [QueryStatus::Pass]);
}

#[test]
fn leaked_key_exposes_earlier_phase() {
    let report = verify_model_file("key_leak_phases.vp", None);
    assert_eq!(statuses(&report), [QueryStatus::Fail]);
    assert_eq!(report.stats.phases, 2);
}

#[test]
fn dedicated_pool_agrees_with_global_pool() {
    let src = load_model("unguarded_dh.vp");
    let pooled = PipelineOptions {
        threads: Some(2),
        ..PipelineOptions::default()
    };
    let report = verify(&src, "unguarded_dh.vp", &pooled).expect("verifies");
    assert_eq!(statuses(&report), [QueryStatus::Fail]);
}

#[test]
fn exhaustive_policy_agrees_on_outcomes() {
    let options = PipelineOptions {
        worthwhile: WorthwhilePolicy::Always,
        ..PipelineOptions::default()
    };
    for (name, expected) in [
        ("unguarded_dh.vp", QueryStatus::Fail),
        ("mac_authentication.vp", QueryStatus::Pass),
    ] {
        let report = verify(&load_model(name), name, &options).expect("verifies");
        assert_eq!(statuses(&report), [expected], "{name}");
    }
}

#[test]
fn report_carries_source_digest() {
    let src = load_model("plaintext_leak.vp");
    let report = verify(&src, "plaintext_leak.vp", &PipelineOptions::default()).expect("verifies");
    assert_eq!(report.source_sha256.len(), 64);
    assert_eq!(report.source_sha256, corvid_engine::pipeline::source_sha256(&src));
    let json = report.to_json().expect("serializes");
    assert!(json.contains("\"status\": \"fail\""));
}
