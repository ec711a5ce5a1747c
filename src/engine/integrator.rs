//! # Energy Integrator
//!
//! Rectangle-rule integration of current samples into watt-hours.
//!
//! ## Rule
//!
//! When a sample `amps` arrives at `t` and the previous sample was at `t0`,
//! the new current is assumed constant over `[t0, t]`:
//!
//! ```text
//! Wh += amps * (t - t0) / 3600 * nominal_voltage
//! ```
//!
//! The first sample after start-up (or after the energy counters were cleared)
//! only sets the watermark. Intervals that are zero or negative (duplicate or
//! out-of-order timestamps) add nothing, but the watermark still moves to the
//! new sample.
//!
//! ## Usage
//!
//! ```
//! use chrono::{Duration, TimeZone, Utc};
//! use pdu_controller::engine::channels::{ChannelStore, ChannelId};
//! use pdu_controller::engine::integrator::EnergyIntegrator;
//!
//! let labels: [String; 6] = std::array::from_fn(|i| format!("S{}", i + 1));
//! let mut store = ChannelStore::new(&labels);
//! let integrator = EnergyIntegrator::new(28.0);
//! let id = ChannelId::new(1, "example").unwrap();
//! let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
//!
//! integrator.apply_status_sample(store.get_mut(id), 0.5, t0);
//! integrator.apply_status_sample(store.get_mut(id), 0.5, t0 + Duration::seconds(10));
//! assert!((store.get(id).accumulated_wh - 0.038889).abs() < 1e-6);
//! ```

use chrono::{DateTime, Utc};

use super::channels::{Channel, HeaterChannel};

const SECONDS_PER_HOUR: f64 = 3600.0;

/// What a sample did to the accumulation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleOutcome {
    /// No previous sample; watermark set, nothing added
    FirstSample,

    /// Energy added over a positive interval
    Integrated { added_wh: f64 },

    /// Zero or negative interval; watermark moved, nothing added
    NonPositiveInterval,
}

/// Elapsed hours between two instants (negative if `to` is earlier)
pub fn elapsed_hours(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let delta = to - from;
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1_000_000.0 / SECONDS_PER_HOUR,
        None => delta.num_milliseconds() as f64 / 1_000.0 / SECONDS_PER_HOUR,
    }
}

/// Integrates samples using the configured nominal bus voltage
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyIntegrator {
    nominal_voltage_v: f64,
}

impl EnergyIntegrator {
    pub fn new(nominal_voltage_v: f64) -> Self {
        Self { nominal_voltage_v }
    }

    pub fn nominal_voltage_v(&self) -> f64 {
        self.nominal_voltage_v
    }

    pub fn set_nominal_voltage_v(&mut self, nominal_voltage_v: f64) {
        self.nominal_voltage_v = nominal_voltage_v;
    }

    /// Energy of `amps` held constant over `[from, to]`, or `None` if the
    /// interval is not positive
    pub fn interval_wh(&self, amps: f64, from: DateTime<Utc>, to: DateTime<Utc>) -> Option<f64> {
        let hours = elapsed_hours(from, to);
        (hours > 0.0).then(|| amps * hours * self.nominal_voltage_v)
    }

    /// Fold one `STATUS` sample into a channel
    ///
    /// The channel id must already be validated by the caller.
    pub fn apply_status_sample(
        &self,
        channel: &mut Channel,
        amps: f64,
        sampled_at: DateTime<Utc>,
    ) -> SampleOutcome {
        let outcome = match channel.last_sample_at {
            None => SampleOutcome::FirstSample,
            Some(previous) => match self.interval_wh(amps, previous, sampled_at) {
                Some(added_wh) => {
                    channel.accumulated_wh += added_wh;
                    SampleOutcome::Integrated { added_wh }
                }
                None => SampleOutcome::NonPositiveInterval,
            },
        };

        channel.last_current_amps = amps;
        channel.last_sample_at = Some(sampled_at);
        outcome
    }

    /// Close the heater's open interval at `at` and start a new one there
    ///
    /// Uses the heater's constant consumption instead of a sampled current.
    /// When the heater is not metering this only arms it.
    pub fn tick_heater(&self, heater: &mut HeaterChannel, at: DateTime<Utc>) -> SampleOutcome {
        let outcome = match heater.last_sample_at {
            None => SampleOutcome::FirstSample,
            Some(previous) => match self.interval_wh(heater.consumption_amps, previous, at) {
                Some(added_wh) => {
                    heater.accumulated_wh += added_wh;
                    SampleOutcome::Integrated { added_wh }
                }
                None => SampleOutcome::NonPositiveInterval,
            },
        };

        heater.last_sample_at = Some(at);
        outcome
    }
}
