//! Integration tests for the stochastic production model

use iiotsim_core::{DeviceError, DeviceStore, ProductionStatus, SimulationEngine, SimulatorConfig};
use std::sync::Arc;

fn engine_with_seed(seed: u64) -> (Arc<DeviceStore>, SimulationEngine) {
    let store = Arc::new(DeviceStore::new());
    let config = SimulatorConfig::default().with_seed(seed);
    let engine = SimulationEngine::new(store.clone(), &config);
    (store, engine)
}

fn start_at_rate(store: &DeviceStore, name: &str, rate: i32) {
    store.insert(name).unwrap();
    store.start_production(name).unwrap();
    store.get(name).unwrap().update(|s| s.production_rate = rate);
}

#[test]
fn test_running_device_scenario() {
    let (store, engine) = engine_with_seed(1);
    start_at_rate(&store, "M1", 50);
    let device = store.get("M1").unwrap();

    let mut last_total = 0;
    for _ in 0..1000 {
        engine.tick();
        let state = device.state();
        let total = state.good_count + state.bad_count;
        assert!(total >= last_total);
        assert!(
            (60.0..=110.0).contains(&state.temperature),
            "temperature {} out of band",
            state.temperature
        );
        last_total = total;
    }
    assert!(last_total > 0);
}

#[test]
fn test_stopped_device_scenario() {
    let (store, engine) = engine_with_seed(2);
    store.insert("M2").unwrap();
    let device = store.get("M2").unwrap();

    for _ in 0..1000 {
        engine.tick();
        let state = device.state();
        assert_eq!(state.good_count, 0);
        assert_eq!(state.bad_count, 0);
        assert!((24.0..=26.0).contains(&state.temperature));
    }
}

#[test]
fn test_idle_invariant_for_zero_rate_and_stopped() {
    let (store, engine) = engine_with_seed(3);
    start_at_rate(&store, "zero", 0);
    store.insert("stopped").unwrap();
    store.get("stopped").unwrap().update(|s| {
        s.production_rate = 80;
        s.good_count = 17;
        s.bad_count = 4;
    });

    for _ in 0..500 {
        engine.tick();
    }

    let zero = store.get("zero").unwrap().state();
    assert_eq!((zero.good_count, zero.bad_count), (0, 0));
    let stopped = store.get("stopped").unwrap().state();
    assert_eq!((stopped.good_count, stopped.bad_count), (17, 4));
}

#[test]
fn test_sensor_failure_scenario() {
    let (store, engine) = engine_with_seed(4);
    start_at_rate(&store, "M1", 50);
    store
        .set_fault("M1", DeviceError::SENSOR_FAILURE, true)
        .unwrap();
    let device = store.get("M1").unwrap();

    let mut outside_band = 0;
    for _ in 0..100 {
        engine.tick();
        let temperature = device.state().temperature;
        assert!((-1000.0..=1000.0).contains(&temperature));
        assert_eq!(temperature.fract(), 0.0);
        if !(60.0..=110.0).contains(&temperature) {
            outside_band += 1;
        }
    }
    assert!(outside_band > 0);
}

#[test]
fn test_sensor_failure_overrides_idle_formula() {
    let (store, engine) = engine_with_seed(5);
    store.insert("M1").unwrap();
    store
        .set_fault("M1", DeviceError::SENSOR_FAILURE, true)
        .unwrap();
    let device = store.get("M1").unwrap();

    let mut outside_idle_band = 0;
    for _ in 0..100 {
        engine.tick();
        let temperature = device.state().temperature;
        assert!((-1000.0..=1000.0).contains(&temperature));
        if !(24.0..=26.0).contains(&temperature) {
            outside_idle_band += 1;
        }
    }
    assert!(outside_idle_band > 0);
}

#[test]
fn test_emergency_stop_flag_blocks_running_device() {
    let (store, engine) = engine_with_seed(6);
    start_at_rate(&store, "M1", 100);
    store
        .set_fault("M1", DeviceError::EMERGENCY_STOP, true)
        .unwrap();

    for _ in 0..200 {
        engine.tick();
    }
    let state = store.get("M1").unwrap().state();
    assert_eq!(state.production_status, ProductionStatus::Running);
    assert_eq!((state.good_count, state.bad_count), (0, 0));
}

#[test]
fn test_same_seed_same_trajectory() {
    let (store_a, engine_a) = engine_with_seed(99);
    let (store_b, engine_b) = engine_with_seed(99);
    start_at_rate(&store_a, "M1", 70);
    start_at_rate(&store_b, "M1", 70);

    for _ in 0..250 {
        engine_a.tick();
        engine_b.tick();
    }
    let a = store_a.get("M1").unwrap().state();
    let b = store_b.get("M1").unwrap().state();
    assert_eq!(a.good_count, b.good_count);
    assert_eq!(a.bad_count, b.bad_count);
    assert_eq!(a.temperature, b.temperature);
}

#[test]
fn test_device_added_after_snapshot_joins_next_tick() {
    let (store, engine) = engine_with_seed(7);
    assert_eq!(engine.tick(), 0);
    start_at_rate(&store, "late", 100);
    assert_eq!(engine.tick(), 1);
}

#[tokio::test]
async fn test_run_stops_on_cancel() {
    let store = Arc::new(DeviceStore::new());
    let config = SimulatorConfig::default()
        .with_seed(8)
        .with_simulation_interval(std::time::Duration::from_millis(5));
    let engine = Arc::new(SimulationEngine::new(store.clone(), &config));
    start_at_rate(&store, "M1", 100);

    let token = tokio_util::sync::CancellationToken::new();
    let handle = tokio::spawn(engine.run(token.clone()));
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    token.cancel();
    handle.await.unwrap();

    let produced = store.get("M1").unwrap().state().good_count;
    assert!(produced > 0);
}
