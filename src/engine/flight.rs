//! # Flight Session Controller
//!
//! Two-state machine gating heater energy metering:
//!
//! ```text
//!  Idle --start_flight(at)--> InFlight --end_flight(at)--> Idle
//! ```
//!
//! Starting a flight arms the heater at `at` without crediting any earlier
//! interval. Ending a flight closes the open heater interval and disarms it.
//! A transition requested from the wrong state is rejected and reported so
//! that no accounting boundary is silently lost.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::channels::HeaterChannel;
use super::integrator::EnergyIntegrator;
use crate::error::TelemetryFault;
use crate::protocol::types::{EVENT_END_FLIGHT, EVENT_START_FLIGHT};

/// Flight session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlightState {
    #[default]
    Idle,
    InFlight,
}

impl fmt::Display for FlightState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlightState::Idle => f.write_str("IDLE"),
            FlightState::InFlight => f.write_str("IN FLIGHT"),
        }
    }
}

/// Which boundary a session event marks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionBoundary {
    Start,
    End,
}

/// A completed session transition, worth journaling
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SessionEvent {
    pub boundary: SessionBoundary,
    pub at: DateTime<Utc>,
    /// Heater energy credited by this transition (always 0 for a start)
    pub heater_wh_added: f64,
}

impl SessionEvent {
    /// Event keyword as written to the journal
    pub fn name(&self) -> &'static str {
        match self.boundary {
            SessionBoundary::Start => EVENT_START_FLIGHT,
            SessionBoundary::End => EVENT_END_FLIGHT,
        }
    }
}

/// Session state machine
#[derive(Debug, Clone, Default)]
pub struct FlightSession {
    state: FlightState,
    started_at: Option<DateTime<Utc>>,
}

impl FlightSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> FlightState {
        self.state
    }

    /// Start of the current session, if in flight
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn is_in_flight(&self) -> bool {
        self.state == FlightState::InFlight
    }

    /// Enter `InFlight` and arm heater metering at `at`
    ///
    /// # Errors
    ///
    /// `InvalidSessionTransition` if already in flight; heater untouched.
    pub fn start(
        &mut self,
        heater: &mut HeaterChannel,
        at: DateTime<Utc>,
    ) -> Result<SessionEvent, TelemetryFault> {
        if self.state != FlightState::Idle {
            return Err(TelemetryFault::InvalidSessionTransition {
                attempted: "start flight",
                state: self.state,
            });
        }

        // A stale watermark is dropped, never integrated
        heater.last_sample_at = Some(at);
        self.state = FlightState::InFlight;
        self.started_at = Some(at);

        Ok(SessionEvent {
            boundary: SessionBoundary::Start,
            at,
            heater_wh_added: 0.0,
        })
    }

    /// Close the heater interval at `at`, disarm metering and return to `Idle`
    ///
    /// # Errors
    ///
    /// `InvalidSessionTransition` if idle; heater untouched.
    pub fn end(
        &mut self,
        heater: &mut HeaterChannel,
        integrator: &EnergyIntegrator,
        at: DateTime<Utc>,
    ) -> Result<SessionEvent, TelemetryFault> {
        if self.state != FlightState::InFlight {
            return Err(TelemetryFault::InvalidSessionTransition {
                attempted: "end flight",
                state: self.state,
            });
        }

        let heater_wh_added = heater
            .last_sample_at
            .and_then(|armed_at| integrator.interval_wh(heater.consumption_amps, armed_at, at))
            .unwrap_or(0.0);
        heater.accumulated_wh += heater_wh_added;
        heater.last_sample_at = None;

        self.state = FlightState::Idle;
        self.started_at = None;

        Ok(SessionEvent {
            boundary: SessionBoundary::End,
            at,
            heater_wh_added,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_starts_idle() {
        let session = FlightSession::new();
        assert_eq!(session.state(), FlightState::Idle);
        assert_eq!(session.started_at(), None);
    }

    #[test]
    fn test_start_then_end_same_instant_adds_nothing() {
        let mut session = FlightSession::new();
        let mut heater = HeaterChannel::new(0.9);
        let integrator = EnergyIntegrator::new(28.0);

        let start = session.start(&mut heater, t0()).unwrap();
        assert_eq!(start.name(), "START_FLIGHT");
        assert!(heater.is_metering());

        let end = session.end(&mut heater, &integrator, t0()).unwrap();
        assert_eq!(end.name(), "END_FLIGHT");
        assert_eq!(end.heater_wh_added, 0.0);
        assert_eq!(heater.accumulated_wh, 0.0);
        assert!(!heater.is_metering());
        assert_eq!(session.state(), FlightState::Idle);
    }

    #[test]
    fn test_end_integrates_open_interval() {
        let mut session = FlightSession::new();
        let mut heater = HeaterChannel::new(0.9);
        let integrator = EnergyIntegrator::new(28.0);

        session.start(&mut heater, t0()).unwrap();
        let end = session
            .end(&mut heater, &integrator, t0() + Duration::minutes(30))
            .unwrap();

        let expected = 0.9 * 0.5 * 28.0;
        assert!((end.heater_wh_added - expected).abs() < 1e-9);
        assert!((heater.accumulated_wh - expected).abs() < 1e-9);
    }

    #[test]
    fn test_end_while_idle_is_rejected_and_heater_untouched() {
        let mut session = FlightSession::new();
        let mut heater = HeaterChannel::new(0.9);
        heater.accumulated_wh = 3.0;
        let before = heater.clone();
        let integrator = EnergyIntegrator::new(28.0);

        let result = session.end(&mut heater, &integrator, t0());
        assert_eq!(
            result,
            Err(TelemetryFault::InvalidSessionTransition {
                attempted: "end flight",
                state: FlightState::Idle,
            })
        );
        assert_eq!(heater, before);
    }

    #[test]
    fn test_double_start_is_rejected_and_keeps_first_arm() {
        let mut session = FlightSession::new();
        let mut heater = HeaterChannel::new(0.9);

        session.start(&mut heater, t0()).unwrap();
        let again = session.start(&mut heater, t0() + Duration::minutes(5));
        assert!(again.is_err());
        assert_eq!(heater.last_sample_at, Some(t0()));
        assert_eq!(session.started_at(), Some(t0()));
    }

    #[test]
    fn test_start_discards_stale_watermark() {
        let mut session = FlightSession::new();
        let mut heater = HeaterChannel::new(0.9);
        heater.last_sample_at = Some(t0() - Duration::hours(5));

        session.start(&mut heater, t0()).unwrap();
        assert_eq!(heater.last_sample_at, Some(t0()));
        assert_eq!(heater.accumulated_wh, 0.0);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(FlightState::Idle.to_string(), "IDLE");
        assert_eq!(FlightState::InFlight.to_string(), "IN FLIGHT");
    }
}
