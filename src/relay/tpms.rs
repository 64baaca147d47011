//! Synthetic tire-pressure telemetry.
//!
//! Each call advances a tick counter. Per wheel, pressure and temperature are
//! a base value plus a slow sinusoidal drift plus a little uniform jitter,
//! rounded to one decimal and clamped into the plausible range.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Mutex;

use super::geo::round_to;
use super::protocol::{TireReading, TireStatus, TpmsSnapshot, Wheel};

pub const PRESSURE_MIN_PSI: f64 = 25.0;
pub const PRESSURE_MAX_PSI: f64 = 42.0;
pub const TEMPERATURE_MIN_C: f64 = 20.0;
pub const TEMPERATURE_MAX_C: f64 = 90.0;

/// Below this pressure a tire reports `LOW`
pub const LOW_PRESSURE_PSI: f64 = 28.0;
/// Above this pressure a tire reports `HIGH`
pub const HIGH_PRESSURE_PSI: f64 = 38.0;

const PRESSURE_DRIFT_RATE: f64 = 0.05;
const PRESSURE_DRIFT_PSI: f64 = 1.5;
const PRESSURE_JITTER_PSI: f64 = 0.3;
const TEMPERATURE_DRIFT_RATE: f64 = 0.03;
const TEMPERATURE_DRIFT_C: f64 = 5.0;
const TEMPERATURE_JITTER_C: f64 = 1.0;

/// Telemetry source shared by the dispatcher and the broadcaster.
pub type SharedSynthesizer = Arc<Mutex<TpmsSynthesizer>>;

/// Constants describing one wheel's simulated behaviour.
struct WheelProfile {
    base_pressure: f64,
    base_temperature: f64,
    pressure_phase: f64,
    temperature_phase: f64,
}

fn profile(wheel: Wheel) -> WheelProfile {
    match wheel {
        Wheel::FrontLeft => WheelProfile {
            base_pressure: 33.0,
            base_temperature: 35.0,
            pressure_phase: 0.0,
            temperature_phase: 0.0,
        },
        Wheel::FrontRight => WheelProfile {
            base_pressure: 33.5,
            base_temperature: 36.0,
            pressure_phase: 3.0,
            temperature_phase: 2.0,
        },
        Wheel::RearLeft => WheelProfile {
            base_pressure: 32.0,
            base_temperature: 34.0,
            pressure_phase: 6.0,
            temperature_phase: 4.0,
        },
        Wheel::RearRight => WheelProfile {
            base_pressure: 32.5,
            base_temperature: 35.5,
            pressure_phase: 9.0,
            temperature_phase: 6.0,
        },
    }
}

/// Status as a pure function of (already clamped) pressure.
pub fn tire_status(pressure_psi: f64) -> TireStatus {
    if pressure_psi < LOW_PRESSURE_PSI {
        TireStatus::Low
    } else if pressure_psi > HIGH_PRESSURE_PSI {
        TireStatus::High
    } else {
        TireStatus::Ok
    }
}

#[derive(Debug)]
pub struct TpmsSynthesizer<R = StdRng> {
    tick: u64,
    rng: R,
}

impl TpmsSynthesizer<StdRng> {
    /// Create a synthesizer seeded from the operating system.
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_os_rng())
    }

    pub fn shared() -> SharedSynthesizer {
        Arc::new(Mutex::new(Self::new()))
    }
}

impl<R: Rng> TpmsSynthesizer<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { tick: 0, rng }
    }

    /// Number of snapshots generated so far.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Advance one tick and produce readings for all four wheels.
    pub fn next_snapshot(&mut self) -> TpmsSnapshot {
        self.tick += 1;
        let t = self.tick as f64;
        let rng = &mut self.rng;

        TpmsSnapshot::from_fn(|wheel| {
            let p = profile(wheel);

            let drift = (t * PRESSURE_DRIFT_RATE + p.pressure_phase).sin() * PRESSURE_DRIFT_PSI;
            let jitter = rng.random_range(-PRESSURE_JITTER_PSI..=PRESSURE_JITTER_PSI);
            let pressure_psi = round_to(p.base_pressure + drift + jitter, 1)
                .clamp(PRESSURE_MIN_PSI, PRESSURE_MAX_PSI);

            let drift =
                (t * TEMPERATURE_DRIFT_RATE + p.temperature_phase).sin() * TEMPERATURE_DRIFT_C;
            let jitter = rng.random_range(-TEMPERATURE_JITTER_C..=TEMPERATURE_JITTER_C);
            let temperature_c = round_to(p.base_temperature + drift + jitter, 1)
                .clamp(TEMPERATURE_MIN_C, TEMPERATURE_MAX_C);

            TireReading {
                pressure_psi,
                temperature_c,
                status: tire_status(pressure_psi),
            }
        })
    }
}

impl Default for TpmsSynthesizer<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(seed: u64) -> TpmsSynthesizer<StdRng> {
        TpmsSynthesizer::with_rng(StdRng::seed_from_u64(seed))
    }

    #[test]
    fn test_readings_stay_in_range() {
        let mut synth = seeded(7);

        for _ in 0..2_000 {
            let snapshot = synth.next_snapshot();
            for (wheel, reading) in snapshot.iter() {
                assert!(
                    (PRESSURE_MIN_PSI..=PRESSURE_MAX_PSI).contains(&reading.pressure_psi),
                    "{} pressure {}",
                    wheel.code(),
                    reading.pressure_psi
                );
                assert!(
                    (TEMPERATURE_MIN_C..=TEMPERATURE_MAX_C).contains(&reading.temperature_c),
                    "{} temperature {}",
                    wheel.code(),
                    reading.temperature_c
                );
                assert_eq!(reading.status, tire_status(reading.pressure_psi));
            }
        }
    }

    #[test]
    fn test_status_thresholds() {
        assert_eq!(tire_status(25.0), TireStatus::Low);
        assert_eq!(tire_status(27.9), TireStatus::Low);
        assert_eq!(tire_status(28.0), TireStatus::Ok);
        assert_eq!(tire_status(33.0), TireStatus::Ok);
        assert_eq!(tire_status(38.0), TireStatus::Ok);
        assert_eq!(tire_status(38.1), TireStatus::High);
        assert_eq!(tire_status(42.0), TireStatus::High);
    }

    #[test]
    fn test_tick_advances_once_per_snapshot() {
        let mut synth = seeded(1);
        assert_eq!(synth.tick(), 0);
        synth.next_snapshot();
        synth.next_snapshot();
        assert_eq!(synth.tick(), 2);
    }

    #[test]
    fn test_same_seed_same_readings() {
        let mut a = seeded(42);
        let mut b = seeded(42);
        for _ in 0..10 {
            assert_eq!(a.next_snapshot(), b.next_snapshot());
        }
    }

    #[test]
    fn test_readings_stay_near_base() {
        let mut synth = seeded(3);
        let snapshot = synth.next_snapshot();

        // Drift is at most 1.5 psi and jitter 0.3 psi
        for (wheel, reading) in snapshot.iter() {
            let base = profile(wheel).base_pressure;
            assert!((reading.pressure_psi - base).abs() <= 1.9, "{}", wheel.code());
        }
    }

    #[tokio::test]
    async fn test_shared_synthesizer_counts_every_caller() {
        let synth = TpmsSynthesizer::shared();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let synth = Arc::clone(&synth);
            handles.push(tokio::spawn(async move {
                for _ in 0..25 {
                    synth.lock().await.next_snapshot();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(synth.lock().await.tick(), 200);
    }
}
