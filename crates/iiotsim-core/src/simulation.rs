//! Stochastic production model
//!
//! Each tick advances every device independently:
//! - producing devices emit good/bad units with odds driven by the rate
//! - temperature follows the load, or idles around 25 degrees
//! - a sensor failure replaces the reading with garbage in [-1000, 1000)

use crate::config::SimulatorConfig;
use crate::device::DeviceState;
use crate::store::DeviceStore;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Probability floor a good unit must clear
const GOOD_THRESHOLD: f64 = 0.05;
/// Probability floor a bad unit must clear on a healthy machine
const BAD_THRESHOLD: f64 = 0.9;
/// Probability floor a bad unit must clear with an unknown error active
const BAD_THRESHOLD_UNKNOWN: f64 = 0.5;

const ACTIVE_BASE_TEMPERATURE: f64 = 60.0;
const IDLE_BASE_TEMPERATURE: f64 = 25.0;

/// Periodic engine that evolves the metrics of every stored device
pub struct SimulationEngine {
    store: Arc<DeviceStore>,
    rng: Mutex<StdRng>,
    interval: Duration,
}

impl SimulationEngine {
    pub fn new(store: Arc<DeviceStore>, config: &SimulatorConfig) -> Self {
        let rng = config
            .seed
            .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        Self {
            store,
            rng: Mutex::new(rng),
            interval: config.simulation_interval(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Advance a single state by one tick
    pub fn step(&self, state: &mut DeviceState) {
        advance(&mut *self.rng.lock(), state);
    }

    /// Run one tick over a snapshot of the store, returning the device count
    pub fn tick(&self) -> usize {
        let devices = self.store.snapshot();
        let mut rng = self.rng.lock();
        for device in &devices {
            device.update(|state| advance(&mut *rng, state));
        }
        devices.len()
    }

    /// Tick on the configured period until cancelled
    pub async fn run(self: Arc<Self>, token: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval_ms = self.interval.as_millis() as u64, "simulation loop started");

        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = interval.tick() => {}
            }
            let devices = self.tick();
            tracing::trace!(devices, "simulation tick");
        }

        tracing::info!("simulation loop stopped");
    }
}

/// Integer draw from `[lo, hi)`, collapsing to `lo` on an empty range
fn uniform_int<R: Rng + ?Sized>(rng: &mut R, lo: i32, hi: i32) -> i32 {
    if lo >= hi {
        lo
    } else {
        rng.gen_range(lo..hi)
    }
}

fn advance<R: Rng + ?Sized>(rng: &mut R, state: &mut DeviceState) {
    if state.is_producing() {
        let error_rate = if state.is_power_failure() {
            state.production_rate / 2
        } else {
            state.production_rate
        };
        let adj_rate = 100 - error_rate;

        let good = rng.gen_range(0..100) > adj_rate && rng.gen::<f64>() > GOOD_THRESHOLD;
        state.good_count += i64::from(good);

        let threshold = if state.is_unknown_error() {
            BAD_THRESHOLD_UNKNOWN
        } else {
            BAD_THRESHOLD
        };
        let bad = rng.gen_range(0..100) > adj_rate && rng.gen::<f64>() > threshold;
        state.bad_count += i64::from(bad);

        let load = uniform_int(rng, error_rate / 2, error_rate);
        state.temperature = ACTIVE_BASE_TEMPERATURE + f64::from(load) * rng.gen::<f64>();
    } else {
        let drift = uniform_int(rng, -1, 2);
        state.temperature = IDLE_BASE_TEMPERATURE + f64::from(drift) * rng.gen::<f64>();
    }

    if state.is_sensor_failure() {
        state.temperature = f64::from(uniform_int(rng, -1000, 1000));
    }
}
