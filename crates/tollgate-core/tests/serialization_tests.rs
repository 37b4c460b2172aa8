//! Serialization tests for tollgate-core types.

use chrono::Utc;
use pretty_assertions::assert_eq;
use tollgate_core::events::*;
use tollgate_core::ids::*;
use tollgate_core::run::*;
use tollgate_core::workflow::*;

#[test]
fn test_decision_reason_is_tagged() {
    let decision = Decision::matched("src/lib.rs", "src/");
    let json = serde_json::to_value(&decision).unwrap();
    assert_eq!(json["changes_detected"], true);
    assert_eq!(json["reason"]["kind"], "matched");
    assert_eq!(json["reason"]["pattern"], "src/");
}

#[test]
fn test_job_outcome_snake_case() {
    let json = serde_json::to_string(&JobOutcome::UpstreamFailure).unwrap();
    assert_eq!(json, "\"upstream_failure\"");
}

#[test]
fn test_run_report_json_keeps_skipped_apart_from_failed() {
    let now = Utc::now();
    let job = |name: &str, outcome| JobReport {
        job_id: JobId::new(),
        index: 0,
        display_name: name.to_string(),
        parameters: JobParameters::new(),
        always_run: false,
        gated: true,
        outcome,
        exit_code: None,
        message: None,
        started_at: None,
        completed_at: now,
        duration_ms: None,
    };
    let report = RunReport {
        run_id: RunId::new(),
        workflow_name: "ci".to_string(),
        revisions: RevisionPair::new("a", "b"),
        decision: Some(Decision::no_match(1)),
        detector_error: None,
        jobs: vec![
            job("tests (3.8)", JobOutcome::Skipped),
            job("lint", JobOutcome::Succeeded),
        ],
        started_at: now,
        completed_at: now,
        duration_ms: 10,
    };

    assert!(!report.has_failures());

    let json = serde_json::to_string(&report).unwrap();
    let parsed: RunReport = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.summary(), report.summary());
    assert_eq!(parsed.summary().skipped, 1);
    assert_eq!(parsed.job("lint").map(|j| j.outcome), Some(JobOutcome::Succeeded));
}

#[test]
fn test_instance_spec_yaml_roundtrip_omits_false_flag() {
    let spec = InstanceSpec::new([("runtime_version", "3.9"), ("task_type", "ray")]);
    let yaml = serde_yaml::to_string(&spec).unwrap();
    assert!(!yaml.contains("always_run"));

    let parsed: InstanceSpec = serde_yaml::from_str(&yaml).unwrap();
    assert_eq!(parsed, spec);
}

#[test]
fn test_run_completed_event_roundtrip() {
    let mut summary = RunSummary::default();
    summary.record(JobOutcome::Succeeded);
    let event = Event::RunCompleted(RunCompletedPayload {
        run_id: RunId::new(),
        workflow_name: "ci".into(),
        summary: summary.clone(),
        duration_ms: 42,
        completed_at: Utc::now(),
    });

    let json = serde_json::to_string(&event).unwrap();
    match serde_json::from_str::<Event>(&json).unwrap() {
        Event::RunCompleted(p) => assert_eq!(p.summary, summary),
        other => panic!("unexpected event: {:?}", other),
    }
}
