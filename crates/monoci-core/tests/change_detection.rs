//! Change detector behaviour against scripted gateways.

use std::sync::Arc;

use monoci_core::fakes::{ScriptedPipeline, ScriptedVcs};
use monoci_core::{ChangeDetector, CiError, CommitHash};

fn paths(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn detector(pipeline: &Arc<ScriptedPipeline>, vcs: &Arc<ScriptedVcs>) -> ChangeDetector {
    ChangeDetector::new(pipeline.clone(), vcs.clone())
}

fn app_changes() -> ScriptedVcs {
    ScriptedVcs::with_changes(&[
        "services/app1/README.md",
        "services/app2/README.md",
        "services/app3/README.md",
    ])
}

#[tokio::test]
async fn lists_only_candidates_with_changes() {
    let pipeline = Arc::new(ScriptedPipeline::new("123", "456"));
    let vcs = Arc::new(app_changes());

    let got = detector(&pipeline, &vcs)
        .list_changes(&paths(&["services/app1", "pkg"]), "main.yml")
        .await
        .unwrap();

    assert_eq!(got, paths(&["services/app1"]));
    assert_eq!(pipeline.last_successful_calls(), vec!["main.yml".to_string()]);
    assert_eq!(vcs.ensure_calls(), vec![CommitHash::new("123")]);
    assert_eq!(
        vcs.diff_calls(),
        vec![(CommitHash::new("123"), CommitHash::new("456"))]
    );
}

#[tokio::test]
async fn empty_last_commit_still_diffs_against_current() {
    let pipeline = Arc::new(ScriptedPipeline::new(CommitHash::empty(), "456"));
    let vcs = Arc::new(app_changes());

    let got = detector(&pipeline, &vcs)
        .list_changes(&paths(&["services/app2"]), "main.yml")
        .await
        .unwrap();

    assert_eq!(got, paths(&["services/app2"]));
    assert_eq!(
        vcs.diff_calls(),
        vec![(CommitHash::empty(), CommitHash::new("456"))]
    );
}

#[tokio::test]
async fn last_commit_lookup_error_names_the_workflow() {
    let pipeline =
        Arc::new(ScriptedPipeline::new("123", "456").fail_last_successful("rate limited"));
    let vcs = Arc::new(app_changes());

    let err = detector(&pipeline, &vcs)
        .list_changes(&paths(&["services/app1"]), "main.yml")
        .await
        .unwrap_err();

    let msg = err.to_string();
    assert!(msg.contains("main.yml"), "missing workflow id: {msg}");
    assert!(msg.contains("rate limited"), "missing cause: {msg}");
    assert!(vcs.diff_calls().is_empty());
}

#[tokio::test]
async fn missing_commit_is_distinguishable() {
    let pipeline = Arc::new(ScriptedPipeline::new("deadbeef", "456"));
    let vcs = Arc::new(app_changes().missing_commit("deadbeef"));

    let err = detector(&pipeline, &vcs)
        .list_changes(&paths(&["services/app1"]), "main.yml")
        .await
        .unwrap_err();

    assert!(err.is_no_commit());
    assert!(err.to_string().contains("deadbeef"));
    assert!(vcs.diff_calls().is_empty(), "diff must not run without the base commit");
}

#[tokio::test]
async fn diff_error_is_wrapped_with_both_commits() {
    let pipeline = Arc::new(ScriptedPipeline::new("123", "456"));
    let vcs = Arc::new(app_changes().fail_diff("bad object"));

    let err = detector(&pipeline, &vcs)
        .list_changes(&paths(&["services/app1"]), "main.yml")
        .await
        .unwrap_err();

    let msg = err.to_string();
    assert!(msg.contains("\"123\"") && msg.contains("\"456\""), "{msg}");
    assert!(matches!(err.root_cause(), CiError::Git(_)));
    assert!(!err.is_no_commit());
}

#[tokio::test]
async fn repeated_calls_give_identical_results() {
    let pipeline = Arc::new(ScriptedPipeline::new("123", "456"));
    let vcs = Arc::new(app_changes());
    let detector = detector(&pipeline, &vcs);
    let candidates = paths(&["services/app3", "services/app1", "libs/common"]);

    let first = detector.list_changes(&candidates, "main.yml").await.unwrap();
    let second = detector.list_changes(&candidates, "main.yml").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first, paths(&["services/app3", "services/app1"]));
}

#[tokio::test]
async fn lists_project_names() {
    let pipeline = Arc::new(ScriptedPipeline::new("123", "456"));
    let vcs = Arc::new(app_changes());
    let detector = detector(&pipeline, &vcs);
    let candidates = paths(&["services/app1", "services/app2"]);

    let names = detector.list_projects(&candidates, "main.yml").await.unwrap();
    assert_eq!(names, paths(&["app1", "app2"]));

    let joined = detector
        .list_projects_joined(&candidates, "main.yml")
        .await
        .unwrap();
    assert_eq!(joined, "|app1|app2|");
}
