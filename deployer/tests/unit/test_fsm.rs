//! FSM unit tests

use dualdeploy::engine::fsm::{RunEvent, RunFsm, RunState};
use dualdeploy::errors::DeployError;

#[test]
fn test_fsm_initial_state() {
    let fsm = RunFsm::new();
    assert_eq!(fsm.state(), RunState::Idle);
    assert!(fsm.error().is_none());
    assert!(!fsm.state().is_finished());
}

#[test]
fn test_fsm_success_flow() {
    let mut fsm = RunFsm::new();

    // Idle -> Running
    fsm.process(RunEvent::Start).unwrap();
    assert_eq!(fsm.state(), RunState::Running);

    // Running -> Succeeded
    fsm.process(RunEvent::Finish).unwrap();
    assert_eq!(fsm.state(), RunState::Succeeded);
    assert!(fsm.error().is_none());
}

#[test]
fn test_fsm_failure_flow() {
    let mut fsm = RunFsm::new();

    fsm.process(RunEvent::Start).unwrap();
    fsm.process(RunEvent::Abort("deploy-worker failed: exited with 1".to_string()))
        .unwrap();

    assert_eq!(fsm.state(), RunState::Failed);
    assert_eq!(fsm.error(), Some("deploy-worker failed: exited with 1"));
}

#[test]
fn test_fsm_reset_clears_error() {
    let mut fsm = RunFsm::new();

    fsm.process(RunEvent::Start).unwrap();
    fsm.process(RunEvent::Abort("check-auth failed".to_string()))
        .unwrap();
    fsm.process(RunEvent::Reset).unwrap();

    assert_eq!(fsm.state(), RunState::Idle);
    assert!(fsm.error().is_none());

    // A fresh run can start again
    fsm.process(RunEvent::Start).unwrap();
    assert_eq!(fsm.state(), RunState::Running);
}

#[test]
fn test_fsm_invalid_transitions() {
    let mut fsm = RunFsm::new();

    // Cannot finish before starting
    let err = fsm.process(RunEvent::Finish).unwrap_err();
    assert!(matches!(err, DeployError::InvalidTransition(_)));

    // Cannot start twice
    fsm.process(RunEvent::Start).unwrap();
    assert!(fsm.process(RunEvent::Start).is_err());

    // Cannot reset a running pipeline
    assert!(fsm.process(RunEvent::Reset).is_err());
    assert_eq!(fsm.state(), RunState::Running);
}

#[test]
fn test_fsm_state_serializes_lowercase() {
    let json = serde_json::to_string(&RunState::Succeeded).unwrap();
    assert_eq!(json, "\"succeeded\"");
}
