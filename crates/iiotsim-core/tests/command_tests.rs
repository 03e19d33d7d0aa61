//! Integration tests for remote commands

use iiotsim_core::{
    Command, DeviceError, ProductionStatus, SimError, Simulator, SimulatorConfig,
};
use std::sync::Arc;

async fn running_device() -> Simulator {
    let simulator = Simulator::new(SimulatorConfig::default().with_seed(21));
    simulator.start().await.unwrap();
    simulator.add_device("M1").await.unwrap();
    simulator.store().start_production("M1").unwrap();
    simulator
        .store()
        .get("M1")
        .unwrap()
        .update(|s| s.production_rate = 80);
    simulator
}

#[tokio::test]
async fn test_emergency_stop_via_method_node() {
    let simulator = running_device().await;
    simulator
        .store()
        .set_fault("M1", DeviceError::SENSOR_FAILURE, true)
        .unwrap();

    simulator
        .registry()
        .call("M1", Command::EmergencyStop)
        .await
        .unwrap();

    let state = simulator.store().get("M1").unwrap().state();
    assert_eq!(state.production_status, ProductionStatus::Stopped);
    assert!(state.is_emergency_stop());
    assert!(state.is_sensor_failure());
}

#[tokio::test]
async fn test_emergency_stop_is_idempotent() {
    let simulator = running_device().await;
    for _ in 0..3 {
        simulator
            .registry()
            .call("M1", Command::EmergencyStop)
            .await
            .unwrap();
    }
    let state = simulator.store().get("M1").unwrap().state();
    assert_eq!(state.device_error, DeviceError::EMERGENCY_STOP);
    assert_eq!(state.production_status, ProductionStatus::Stopped);
}

#[tokio::test]
async fn test_reset_clears_flags_only() {
    let simulator = running_device().await;
    simulator
        .store()
        .set_fault("M1", DeviceError::POWER_FAILURE, true)
        .unwrap();
    simulator
        .store()
        .set_fault("M1", DeviceError::UNKNOWN, true)
        .unwrap();

    simulator
        .registry()
        .call("M1", Command::ResetErrorStatus)
        .await
        .unwrap();

    let state = simulator.store().get("M1").unwrap().state();
    assert!(state.device_error.is_empty());
    assert_eq!(state.production_status, ProductionStatus::Running);
    assert_eq!(state.production_rate, 80);
}

#[tokio::test]
async fn test_stop_then_reset_then_sync() {
    let simulator = running_device().await;
    simulator.sync().tick().await.unwrap();

    simulator
        .registry()
        .call("M1", Command::EmergencyStop)
        .await
        .unwrap();
    let report = simulator.sync().tick().await.unwrap();
    assert_eq!(report.published, 2); // status + error bits

    simulator
        .registry()
        .call("M1", Command::ResetErrorStatus)
        .await
        .unwrap();
    let report = simulator.sync().tick().await.unwrap();
    assert_eq!(report.published, 1);
}

#[tokio::test]
async fn test_call_on_unknown_device() {
    let simulator = Simulator::new(SimulatorConfig::default());
    simulator.start().await.unwrap();
    assert_eq!(
        simulator
            .registry()
            .call("ghost", Command::ResetErrorStatus)
            .await
            .unwrap_err(),
        SimError::NodeNotFound("ghost/ResetErrorStatus".into())
    );
}

#[tokio::test]
async fn test_commands_race_with_simulation() {
    let simulator = Arc::new(running_device().await);

    let engine = simulator.engine().clone();
    let ticker = tokio::task::spawn_blocking(move || {
        for _ in 0..2000 {
            engine.tick();
        }
    });

    for _ in 0..50 {
        simulator
            .registry()
            .call("M1", Command::EmergencyStop)
            .await
            .unwrap();
        simulator.store().start_production("M1").unwrap();
        simulator
            .registry()
            .call("M1", Command::ResetErrorStatus)
            .await
            .unwrap();
        tokio::task::yield_now().await;
    }
    ticker.await.unwrap();

    simulator
        .registry()
        .call("M1", Command::EmergencyStop)
        .await
        .unwrap();
    let state = simulator.store().get("M1").unwrap().state();
    assert_eq!(state.production_status, ProductionStatus::Stopped);
    assert!(state.is_emergency_stop());
}
