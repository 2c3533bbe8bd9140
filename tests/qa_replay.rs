//! Answers recorded in one run are replayed in the next

mod support;

use kubelift::{QaConfig, QuestionBridge};
use serial_test::serial;
use std::fs;
use std::sync::Arc;
use support::{build_plan, read, transform, Project};

fn bridge(config: QaConfig) -> Arc<QuestionBridge> {
    Arc::new(QuestionBridge::from_config(&config, Default::default()).unwrap())
}

#[tokio::test]
#[serial]
async fn test_recorded_answers_replay() {
    std::env::remove_var("KUBELIFT_QA_RECORDING_MODE");
    let project = Project::new();
    project.write("svc/Dockerfile", "FROM alpine\n");
    let answers = project.output("answers.yaml");
    fs::write(&answers, "common.containerruntime: podman\n").unwrap();
    let store = project.output("store.yaml");

    let qa = bridge(QaConfig {
        answers_files: vec![answers],
        record_store: Some(store.clone()),
        interactive: false,
    });
    let plan = build_plan(&project, &qa).await;
    let first = project.output("first");
    transform(&project, &plan, &first, qa).await.unwrap();
    assert!(read(&first.join("scripts/builddockerimages.sh")).contains("podman build"));
    assert!(read(&store).contains("common.containerruntime"));

    let qa = bridge(QaConfig {
        answers_files: Vec::new(),
        record_store: Some(store),
        interactive: false,
    });
    let second = project.output("second");
    transform(&project, &plan, &second, qa).await.unwrap();
    assert!(read(&second.join("scripts/builddockerimages.sh")).contains("podman build"));
}
