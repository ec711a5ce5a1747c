//! # Battery Budget Estimator
//!
//! Remaining energy = total capacity - (channel energy + heater energy + offset).
//!
//! The remaining value is signed and never clamped here: a negative budget is
//! an operational signal. Only [`BatteryReport::display_percent`] clamps, for
//! progress-bar style rendering.

use serde::Serialize;

use crate::error::TelemetryFault;

/// Battery parameters set by the operator
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BatteryConfig {
    /// Usable capacity when full
    pub total_capacity_wh: f64,
    /// Bus voltage used to turn amperes into watts
    pub nominal_voltage_v: f64,
    /// Energy already consumed before this run; may be negative
    pub offset_wh: f64,
}

impl BatteryConfig {
    /// Build a validated configuration
    ///
    /// # Errors
    ///
    /// `InvalidParameter` if capacity or voltage are not strictly positive, or
    /// any value is not finite.
    pub fn new(
        total_capacity_wh: f64,
        nominal_voltage_v: f64,
        offset_wh: f64,
    ) -> Result<Self, TelemetryFault> {
        if !total_capacity_wh.is_finite() || total_capacity_wh <= 0.0 {
            return Err(TelemetryFault::InvalidParameter {
                name: "total capacity (Wh)",
                value: total_capacity_wh,
            });
        }
        if !nominal_voltage_v.is_finite() || nominal_voltage_v <= 0.0 {
            return Err(TelemetryFault::InvalidParameter {
                name: "nominal voltage (V)",
                value: nominal_voltage_v,
            });
        }
        if !offset_wh.is_finite() {
            return Err(TelemetryFault::InvalidParameter { name: "offset (Wh)", value: offset_wh });
        }

        Ok(Self {
            total_capacity_wh,
            nominal_voltage_v,
            offset_wh,
        })
    }
}

/// Derived battery budget
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BatteryReport {
    /// Channel + heater energy plus the manual offset
    pub used_wh: f64,
    /// Capacity minus usage; negative when over budget
    pub remaining_wh: f64,
    /// Unclamped percentage of capacity remaining
    pub remaining_percent: f64,
}

impl BatteryReport {
    /// Percentage clamped to 0..=100 for display
    pub fn display_percent(&self) -> f64 {
        self.remaining_percent.clamp(0.0, 100.0)
    }

    pub fn is_depleted(&self) -> bool {
        self.remaining_wh <= 0.0
    }
}

/// Compute the budget from every accumulator (six channels and the heater)
///
/// # Examples
///
/// ```
/// use pdu_controller::engine::battery::{recompute, BatteryConfig};
///
/// let config = BatteryConfig::new(100.0, 28.0, 10.0).unwrap();
/// let report = recompute(&config, [5.0, 0.0, 0.0, 0.0, 0.0, 0.0, 5.0]);
/// assert_eq!(report.remaining_wh, 80.0);
/// assert_eq!(report.remaining_percent, 80.0);
/// ```
pub fn recompute(config: &BatteryConfig, accumulated_wh: impl IntoIterator<Item = f64>) -> BatteryReport {
    let used_wh = accumulated_wh.into_iter().sum::<f64>() + config.offset_wh;
    let remaining_wh = config.total_capacity_wh - used_wh;
    BatteryReport {
        used_wh,
        remaining_wh,
        remaining_percent: remaining_wh / config.total_capacity_wh * 100.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining_is_capacity_minus_usage_and_offset() {
        let config = BatteryConfig::new(3750.0, 28.0, 250.0).unwrap();
        let report = recompute(&config, [100.0, 50.0, 0.0, 0.0, 0.0, 0.0, 25.0]);
        assert_eq!(report.used_wh, 425.0);
        assert_eq!(report.remaining_wh, 3325.0);
        assert!((report.remaining_percent - 88.666_666_666).abs() < 1e-6);
    }

    #[test]
    fn test_over_budget_stays_negative() {
        let config = BatteryConfig::new(100.0, 28.0, 0.0).unwrap();
        let report = recompute(&config, [80.0, 40.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(report.remaining_wh, -20.0);
        assert_eq!(report.remaining_percent, -20.0);
        assert_eq!(report.display_percent(), 0.0);
        assert!(report.is_depleted());
    }

    #[test]
    fn test_negative_offset_can_push_above_full() {
        let config = BatteryConfig::new(100.0, 28.0, -20.0).unwrap();
        let report = recompute(&config, [0.0; 7]);
        assert_eq!(report.remaining_wh, 120.0);
        assert_eq!(report.remaining_percent, 120.0);
        assert_eq!(report.display_percent(), 100.0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(BatteryConfig::new(0.0, 28.0, 0.0).is_err());
        assert!(BatteryConfig::new(100.0, 0.0, 0.0).is_err());
        assert!(BatteryConfig::new(100.0, -28.0, 0.0).is_err());
        assert!(BatteryConfig::new(100.0, 28.0, f64::INFINITY).is_err());
        assert!(BatteryConfig::new(f64::NAN, 28.0, 0.0).is_err());
    }
}
