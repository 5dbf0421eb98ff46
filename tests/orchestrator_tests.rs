//! Mission lifecycle: scheduling order, plan rejection, cancellation,
//! durability across restarts.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{TestReasoner, TestResearch, TestTool, ToolScript};
use wayfarer::collaborator::TaskProposal;
use wayfarer::config::WayfarerConfig;
use wayfarer::error::WayfarerError;
use wayfarer::mission::{MissionState, TaskState};
use wayfarer::orchestrator::Orchestrator;

fn chain(descriptions: &[&str]) -> Vec<TaskProposal> {
    descriptions
        .iter()
        .enumerate()
        .map(|(i, description)| TaskProposal {
            ref_id: format!("s{}", i + 1),
            description: description.to_string(),
            depends_on: if i == 0 {
                Vec::new()
            } else {
                vec![format!("s{}", i)]
            },
            complexity: Default::default(),
            required_capabilities: Vec::new(),
        })
        .collect()
}

#[tokio::test]
async fn dependency_chain_completes_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let target = TestTool::new("target", ToolScript::AlwaysSucceed);

    let (orchestrator, _esc) = Orchestrator::open(
        dir.path(),
        WayfarerConfig::default(),
        Arc::new(TestReasoner::with_proposals(chain(&[
            "prepare the workspace",
            "build the binary",
            "package the release",
        ]))),
        Arc::new(TestResearch::empty()),
    )
    .await
    .unwrap();
    orchestrator.gateway().mount(target.clone(), 0.9);

    let mission = orchestrator.create_mission("ship the release").await.unwrap();
    let report = orchestrator.run(&mission.id).await.unwrap();

    assert_eq!(report.status, MissionState::Completed);
    assert_eq!(report.tasks_succeeded, 3);
    // One round per chain link: dependencies gate strictly.
    assert_eq!(report.iterations, 3);
    assert_eq!(target.invocation_count(), 3);

    let snapshot = orchestrator.snapshot(&mission.id).await.unwrap();
    for task in snapshot.plan.unwrap().tasks() {
        assert_eq!(task.state, TaskState::Succeeded);
    }
}

#[tokio::test]
async fn cyclic_decomposition_fails_the_mission_before_any_execution() {
    let dir = tempfile::tempdir().unwrap();
    let target = TestTool::new("target", ToolScript::AlwaysSucceed);

    let mut proposals = chain(&["a", "b"]);
    proposals[0].depends_on = vec!["s2".into()];

    let (orchestrator, _esc) = Orchestrator::open(
        dir.path(),
        WayfarerConfig::default(),
        Arc::new(TestReasoner::with_proposals(proposals)),
        Arc::new(TestResearch::empty()),
    )
    .await
    .unwrap();
    orchestrator.gateway().mount(target.clone(), 0.9);

    let mission = orchestrator.create_mission("impossible plan").await.unwrap();
    let err = orchestrator.run(&mission.id).await.unwrap_err();
    assert!(matches!(err, WayfarerError::InvalidPlan(_)));

    // Mission-fatal, persisted, and nothing ever executed.
    let snapshot = orchestrator.snapshot(&mission.id).await.unwrap();
    assert_eq!(snapshot.mission.status, MissionState::Failed);
    assert_eq!(target.invocation_count(), 0);
}

#[tokio::test]
async fn cancellation_aborts_in_flight_work() {
    let dir = tempfile::tempdir().unwrap();
    let target = TestTool::new("target", ToolScript::Delay { ms: 5_000 });

    let (orchestrator, _esc) = Orchestrator::open(
        dir.path(),
        WayfarerConfig::default(),
        Arc::new(TestReasoner::single_task("long haul")),
        Arc::new(TestResearch::empty()),
    )
    .await
    .unwrap();
    orchestrator.gateway().mount(target, 0.9);

    let mission = orchestrator.create_mission("slow mission").await.unwrap();
    let orchestrator = Arc::new(orchestrator);
    let signal = orchestrator.signal();

    let runner = {
        let orchestrator = orchestrator.clone();
        let mission_id = mission.id.clone();
        tokio::spawn(async move { orchestrator.run(&mission_id).await })
    };

    tokio::time::sleep(Duration::from_millis(200)).await;
    signal.cancel();

    let report = runner.await.unwrap().unwrap();
    assert_eq!(report.status, MissionState::Cancelled);

    // The aborted task's result was discarded; no retry budget consumed.
    let snapshot = orchestrator.snapshot(&mission.id).await.unwrap();
    let task = snapshot.plan.unwrap().task("t-001").unwrap().clone();
    assert_eq!(task.state, TaskState::Pending);
    assert_eq!(task.retry_count, 0);
}

#[tokio::test]
async fn state_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();

    let mission_id = {
        let target = TestTool::new("target", ToolScript::AlwaysSucceed);
        let (orchestrator, _esc) = Orchestrator::open(
            dir.path(),
            WayfarerConfig::default(),
            Arc::new(TestReasoner::single_task("one and done")),
            Arc::new(TestResearch::empty()),
        )
        .await
        .unwrap();
        orchestrator.gateway().mount(target, 0.9);

        let mission = orchestrator.create_mission("durable mission").await.unwrap();
        let report = orchestrator.run(&mission.id).await.unwrap();
        assert_eq!(report.status, MissionState::Completed);
        mission.id
    };

    // A fresh process over the same data directory sees everything.
    let (orchestrator, _esc) = Orchestrator::open(
        dir.path(),
        WayfarerConfig::default(),
        Arc::new(TestReasoner::single_task("unused")),
        Arc::new(TestResearch::empty()),
    )
    .await
    .unwrap();

    let snapshot = orchestrator.snapshot(&mission_id).await.unwrap();
    assert_eq!(snapshot.mission.status, MissionState::Completed);
    assert!(snapshot.plan.unwrap().is_complete());
    assert!(orchestrator.memory().count().unwrap() >= 1);
    assert_eq!(orchestrator.create_mission("next").await.unwrap().id, "m-002");
}
