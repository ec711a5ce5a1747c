//! # Telemetry Ingestion & Energy-Accounting Engine
//!
//! [`Engine`] owns every piece of mutable state: the channel table, the heater
//! pseudo-channel, both groups, the flight session, the battery parameters and
//! the auto-refresh timer. Callers feed it framed packets and operator
//! intents; it answers with commands to transmit and read-only reports.
//!
//! The engine never reads the wall clock and never blocks. All mutation goes
//! through `&mut self`, so hosting it in a single task serializes every
//! operation, which delta-time integration requires.
//!
//! ## Usage
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use pdu_controller::engine::{Engine, EngineSettings};
//!
//! let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
//! let mut engine = Engine::new(&EngineSettings::default(), t0).unwrap();
//!
//! engine.submit_inbound_packet("PDU,2024-05-01 10:00:00.000,STATUS,1,0.5", t0);
//! engine.submit_inbound_packet("PDU,2024-05-01 10:00:10.000,STATUS,1,0.5", t0);
//!
//! let wh = engine.channel(1).unwrap().accumulated_wh;
//! assert!((wh - 0.038889).abs() < 1e-6);
//! ```

pub mod battery;
pub mod channels;
pub mod flight;
pub mod groups;
pub mod integrator;
pub mod scheduler;

use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::TelemetryFault;
use crate::protocol::decoder::decode;
use crate::protocol::encoder::refresh_all_commands;
use crate::protocol::types::*;

use battery::{BatteryConfig, BatteryReport};
use channels::{Channel, ChannelId, ChannelStore, HeaterChannel};
use flight::{FlightSession, FlightState, SessionEvent};
use groups::{group_slot, Group, GroupReport, GROUP_COUNT};
use integrator::{EnergyIntegrator, SampleOutcome};
use scheduler::AutoRefresh;

/// Initial engine parameters, usually derived from the configuration file
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub labels: [String; CHANNEL_COUNT],
    pub nominal_voltage_v: f64,
    pub heater_consumption_a: f64,
    pub total_capacity_wh: f64,
    pub offset_wh: f64,
    pub group_members: [Vec<u8>; GROUP_COUNT],
    pub group_limits_wh: [f64; GROUP_COUNT],
    pub refresh_interval_s: i64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            labels: std::array::from_fn(|i| format!("Service {}", i + 1)),
            nominal_voltage_v: 28.0,
            heater_consumption_a: 0.9,
            total_capacity_wh: 3750.0,
            offset_wh: 0.0,
            group_members: [Vec::new(), Vec::new()],
            group_limits_wh: [0.0; GROUP_COUNT],
            refresh_interval_s: 0,
        }
    }
}

/// Network settings last acknowledged by the PDU
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkAcknowledgements {
    pub ip: Option<Ipv4Addr>,
    pub port: Option<u16>,
    pub resets: u32,
    pub command_errors: u32,
}

/// Result of feeding one packet to the engine
#[derive(Debug, Clone, PartialEq)]
pub struct InboundReport {
    pub packet: ParsedTelemetry,
    pub faults: Vec<TelemetryFault>,
    pub session_event: Option<SessionEvent>,
}

impl InboundReport {
    pub fn is_clean(&self) -> bool {
        self.faults.is_empty()
    }
}

/// Everything the presentation layer renders, in one serializable value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineSnapshot {
    pub channels: Vec<Channel>,
    pub heater: HeaterChannel,
    pub groups: Vec<GroupReport>,
    pub groups_total_amps: f64,
    pub battery: BatteryReport,
    pub battery_display_percent: f64,
    pub flight_state: FlightState,
    pub flight_started_at: Option<DateTime<Utc>>,
    pub nominal_voltage_v: f64,
    pub refresh_interval_s: i64,
    pub link: LinkAcknowledgements,
}

/// The engine context object
#[derive(Debug, Clone)]
pub struct Engine {
    channels: ChannelStore,
    heater: HeaterChannel,
    integrator: EnergyIntegrator,
    groups: [Group; GROUP_COUNT],
    flight: FlightSession,
    battery: BatteryConfig,
    refresh: AutoRefresh,
    link: LinkAcknowledgements,
}

impl Engine {
    /// Create an engine with every channel OFF, no energy, and the session idle
    ///
    /// # Arguments
    ///
    /// * `settings` - Labels, battery parameters, groups and refresh interval
    /// * `now` - Start of the first auto-refresh window
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting (battery values, heater current,
    /// group member ids or limits).
    pub fn new(settings: &EngineSettings, now: DateTime<Utc>) -> Result<Self, TelemetryFault> {
        let battery = BatteryConfig::new(
            settings.total_capacity_wh,
            settings.nominal_voltage_v,
            settings.offset_wh,
        )?;

        if !settings.heater_consumption_a.is_finite() || settings.heater_consumption_a < 0.0 {
            return Err(TelemetryFault::InvalidParameter {
                name: "heater consumption (A)",
                value: settings.heater_consumption_a,
            });
        }

        let mut groups = [Group::new(1), Group::new(2)];
        for (group, (members, limit_wh)) in groups
            .iter_mut()
            .zip(settings.group_members.iter().zip(settings.group_limits_wh))
        {
            for &member in members {
                group.set_member(ChannelId::new(member, "group membership")?, true);
            }
            group.set_limit_wh(limit_wh)?;
        }

        Ok(Self {
            channels: ChannelStore::new(&settings.labels),
            heater: HeaterChannel::new(settings.heater_consumption_a),
            integrator: EnergyIntegrator::new(battery.nominal_voltage_v),
            groups,
            flight: FlightSession::new(),
            battery,
            refresh: AutoRefresh::new(settings.refresh_interval_s, now),
            link: LinkAcknowledgements::default(),
        })
    }

    // ----------------------------------------------------------------------
    // Inbound
    // ----------------------------------------------------------------------

    /// Decode and apply one framed packet
    ///
    /// Only `PDU` packets mutate channel state. Other sources are inspected
    /// for `START_FLIGHT` / `END_FLIGHT` events and otherwise ignored. Every
    /// fault is logged and returned; none aborts processing.
    pub fn submit_inbound_packet(&mut self, raw: &str, received_at: DateTime<Utc>) -> InboundReport {
        let packet = decode(raw, received_at);
        let mut faults = Vec::new();
        let mut session_event = None;

        if let Some(fault) = &packet.timestamp_fault {
            faults.push(fault.clone());
        }

        match &packet.message {
            Message::Malformed { reason } => {
                faults.push(TelemetryFault::MalformedPacket {
                    raw: raw.trim_end().to_string(),
                    reason: reason.clone(),
                });
            }
            _ if !packet.is_from_pdu() => match self.apply_ground_packet(&packet) {
                Ok(event) => session_event = event,
                Err(fault) => faults.push(fault),
            },
            _ => {
                if let Err(fault) = self.apply_pdu_message(&packet) {
                    faults.push(fault);
                }
            }
        }

        for fault in &faults {
            warn!(source = %packet.source, header = %packet.header, %fault, "Telemetry fault");
        }

        InboundReport {
            packet,
            faults,
            session_event,
        }
    }

    fn apply_pdu_message(&mut self, packet: &ParsedTelemetry) -> Result<(), TelemetryFault> {
        match &packet.message {
            Message::ServiceSet { channel, on } => {
                self.channels.apply_service_set(*channel, *on)?;
                debug!(channel, on, "Service state confirmed");
            }
            Message::Status { channel, amps } => {
                self.status_sample(*channel, *amps, packet.received_at)?;
            }
            Message::IpSet { address } => {
                info!(%address, "PDU acknowledged new IP address");
                self.link.ip = Some(*address);
            }
            Message::PortSet { port } => {
                info!(port, "PDU acknowledged new port");
                self.link.port = Some(*port);
            }
            Message::Resetting => {
                info!("PDU is resetting its network settings");
                self.link.resets += 1;
            }
            Message::CommandError => {
                warn!("PDU rejected a command (CMDERROR)");
                self.link.command_errors += 1;
            }
            Message::Rejected(fault) => return Err(fault.clone()),
            Message::Event { name } => debug!(%name, "Ignoring event reported by the PDU"),
            Message::Unknown => debug!(header = %packet.header, "Ignoring unknown header"),
            Message::Malformed { .. } => {}
        }
        Ok(())
    }

    fn apply_ground_packet(
        &mut self,
        packet: &ParsedTelemetry,
    ) -> Result<Option<SessionEvent>, TelemetryFault> {
        match &packet.message {
            Message::Event { name } if name == EVENT_START_FLIGHT => {
                self.begin_flight(packet.received_at).map(Some)
            }
            Message::Event { name } if name == EVENT_END_FLIGHT => {
                self.finish_flight(packet.received_at).map(Some)
            }
            Message::Rejected(fault) if packet.header == HEADER_EVENT => Err(fault.clone()),
            _ => Ok(None),
        }
    }

    fn status_sample(
        &mut self,
        channel: u8,
        amps: f64,
        sampled_at: DateTime<Utc>,
    ) -> Result<SampleOutcome, TelemetryFault> {
        let id = ChannelId::new(channel, HEADER_STATUS)?;
        if !amps.is_finite() || amps < 0.0 {
            return Err(TelemetryFault::InvalidArgument {
                header: HEADER_STATUS.to_string(),
                name: "current",
                value: amps.to_string(),
            });
        }

        let outcome = self
            .integrator
            .apply_status_sample(self.channels.get_mut(id), amps, sampled_at);
        debug!(channel, amps, ?outcome, "Status sample applied");
        Ok(outcome)
    }

    /// Record a confirmed on/off state (as an `SRVCSET` reply would)
    pub fn apply_service_set(&mut self, channel: u8, on: bool) -> Result<(), TelemetryFault> {
        reported(self.channels.apply_service_set(channel, on))
    }

    /// Integrate one current sample (as a `STATUS` reply would)
    pub fn apply_status_sample(
        &mut self,
        channel: u8,
        amps: f64,
        sampled_at: DateTime<Utc>,
    ) -> Result<SampleOutcome, TelemetryFault> {
        reported(self.status_sample(channel, amps, sampled_at))
    }

    // ----------------------------------------------------------------------
    // Outbound intents
    // ----------------------------------------------------------------------

    /// Ask the PDU to flip a channel relative to its confirmed state
    ///
    /// The confirmed state is not changed; it only flips when the PDU answers
    /// with `SRVCSET`.
    pub fn request_toggle(&mut self, channel: u8) -> Result<Command, TelemetryFault> {
        let id = reported(ChannelId::new(channel, "toggle"))?;
        let on = !self.channels.get(id).confirmed_on;
        Ok(self.set_service(id, on))
    }

    /// Ask the PDU to switch a channel to an explicit state
    pub fn request_set_service(&mut self, channel: u8, on: bool) -> Result<Command, TelemetryFault> {
        let id = reported(ChannelId::new(channel, "set service"))?;
        Ok(self.set_service(id, on))
    }

    fn set_service(&mut self, id: ChannelId, on: bool) -> Command {
        self.channels.note_request(id, on);
        Command::SetService { channel: id.get(), on }
    }

    /// Ask one channel for its current draw
    pub fn request_status(&self, channel: u8) -> Result<Command, TelemetryFault> {
        let id = reported(ChannelId::new(channel, "status request"))?;
        Ok(Command::Status { channel: id.get() })
    }

    /// One status request per channel
    pub fn request_refresh_all(&self) -> Vec<Command> {
        refresh_all_commands()
    }

    pub fn request_reset(&self) -> Command {
        Command::Reset
    }

    pub fn request_set_ip(&self, address: Ipv4Addr) -> Command {
        Command::SetIp { address }
    }

    pub fn request_set_port(&self, port: u16) -> Result<Command, TelemetryFault> {
        if port == 0 {
            return reported(Err(TelemetryFault::InvalidParameter { name: "port", value: 0.0 }));
        }
        Ok(Command::SetPort { port })
    }

    // ----------------------------------------------------------------------
    // Operator settings
    // ----------------------------------------------------------------------

    pub fn set_group_membership(
        &mut self,
        group: u8,
        channel: u8,
        member: bool,
    ) -> Result<(), TelemetryFault> {
        let slot = reported(group_slot(group))?;
        let id = reported(ChannelId::new(channel, "group membership"))?;
        self.groups[slot].set_member(id, member);
        debug!(group, channel, member, "Group membership changed");
        Ok(())
    }

    pub fn set_group_limit(&mut self, group: u8, limit_wh: f64) -> Result<(), TelemetryFault> {
        let slot = reported(group_slot(group))?;
        reported(self.groups[slot].set_limit_wh(limit_wh))
    }

    /// Replace the battery parameters; the voltage applies to future intervals only
    pub fn set_battery_config(
        &mut self,
        total_capacity_wh: f64,
        nominal_voltage_v: f64,
        offset_wh: f64,
    ) -> Result<(), TelemetryFault> {
        self.battery = reported(BatteryConfig::new(total_capacity_wh, nominal_voltage_v, offset_wh))?;
        self.integrator.set_nominal_voltage_v(nominal_voltage_v);
        Ok(())
    }

    pub fn set_offset(&mut self, offset_wh: f64) -> Result<(), TelemetryFault> {
        self.set_battery_config(
            self.battery.total_capacity_wh,
            self.battery.nominal_voltage_v,
            offset_wh,
        )
    }

    /// Change the auto-refresh interval; zero or less disables it
    pub fn set_refresh_interval(&mut self, interval_s: i64) {
        self.refresh.set_interval_s(interval_s);
        debug!(interval_s, "Auto refresh interval changed");
    }

    /// Zero every accumulator and forget every channel's last sample instant
    ///
    /// When in flight the heater is re-armed at `at`.
    pub fn clear_energy(&mut self, at: DateTime<Utc>) {
        self.channels.clear_energy();
        self.heater.accumulated_wh = 0.0;
        self.heater.last_sample_at = self.flight.is_in_flight().then_some(at);
        info!("Energy counters cleared");
    }

    // ----------------------------------------------------------------------
    // Flight session
    // ----------------------------------------------------------------------

    /// Enter a flight session and start metering the heater at `at`
    pub fn start_flight(&mut self, at: DateTime<Utc>) -> Result<SessionEvent, TelemetryFault> {
        reported(self.begin_flight(at))
    }

    /// Leave the flight session, crediting the heater up to `at`
    pub fn end_flight(&mut self, at: DateTime<Utc>) -> Result<SessionEvent, TelemetryFault> {
        reported(self.finish_flight(at))
    }

    fn begin_flight(&mut self, at: DateTime<Utc>) -> Result<SessionEvent, TelemetryFault> {
        let event = self.flight.start(&mut self.heater, at)?;
        info!(at = %at, "Flight session started");
        Ok(event)
    }

    fn finish_flight(&mut self, at: DateTime<Utc>) -> Result<SessionEvent, TelemetryFault> {
        let event = self.flight.end(&mut self.heater, &self.integrator, at)?;
        info!(
            at = %at,
            heater_wh_added = event.heater_wh_added,
            heater_wh = self.heater.accumulated_wh,
            "Flight session ended"
        );
        Ok(event)
    }

    // ----------------------------------------------------------------------
    // Timer
    // ----------------------------------------------------------------------

    /// Drive the auto-refresh timer
    ///
    /// Returns the refresh batch when the interval elapsed (empty otherwise).
    /// On the same occasion, while in flight, the heater is integrated up to
    /// `now` even if no reply ever arrives.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<Command> {
        if !self.refresh.poll(now) {
            return Vec::new();
        }

        if self.flight.is_in_flight() {
            let outcome = self.integrator.tick_heater(&mut self.heater, now);
            debug!(?outcome, heater_wh = self.heater.accumulated_wh, "Heater tick");
        }

        debug!(interval_s = self.refresh.interval_s(), "Auto refresh");
        self.request_refresh_all()
    }

    // ----------------------------------------------------------------------
    // Read-only accessors
    // ----------------------------------------------------------------------

    pub fn channel(&self, channel: u8) -> Result<Channel, TelemetryFault> {
        self.channels.read_snapshot(channel)
    }

    pub fn heater(&self) -> &HeaterChannel {
        &self.heater
    }

    pub fn flight_state(&self) -> FlightState {
        self.flight.state()
    }

    pub fn nominal_voltage_v(&self) -> f64 {
        self.integrator.nominal_voltage_v()
    }

    pub fn battery_config(&self) -> &BatteryConfig {
        &self.battery
    }

    pub fn refresh_interval_s(&self) -> i64 {
        self.refresh.interval_s()
    }

    pub fn link_acknowledgements(&self) -> &LinkAcknowledgements {
        &self.link
    }

    pub fn group_report(&self, group: u8) -> Result<GroupReport, TelemetryFault> {
        let slot = group_slot(group)?;
        Ok(self.groups[slot].report(&self.channels))
    }

    /// Sum of both groups' current; a channel in both groups counts twice
    pub fn groups_total_amps(&self) -> f64 {
        self.groups
            .iter()
            .map(|group| group.report(&self.channels).current_amps)
            .sum()
    }

    pub fn battery_report(&self) -> BatteryReport {
        let accumulated = self
            .channels
            .iter()
            .map(|channel| channel.accumulated_wh)
            .chain(std::iter::once(self.heater.accumulated_wh));
        battery::recompute(&self.battery, accumulated)
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        let battery = self.battery_report();
        EngineSnapshot {
            channels: self.channels.iter().cloned().collect(),
            heater: self.heater.clone(),
            groups: self.groups.iter().map(|group| group.report(&self.channels)).collect(),
            groups_total_amps: self.groups_total_amps(),
            battery_display_percent: battery.display_percent(),
            battery,
            flight_state: self.flight.state(),
            flight_started_at: self.flight.started_at(),
            nominal_voltage_v: self.nominal_voltage_v(),
            refresh_interval_s: self.refresh.interval_s(),
            link: self.link,
        }
    }
}

/// Log a fault on its way back to the caller
fn reported<T>(result: Result<T, TelemetryFault>) -> Result<T, TelemetryFault> {
    if let Err(fault) = &result {
        warn!(%fault, "Rejected engine operation");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
    }

    fn line(source: &str, at: DateTime<Utc>, rest: &str) -> String {
        format!("{},{},{}", source, crate::protocol::framing::format_timestamp(at), rest)
    }

    fn engine() -> Engine {
        Engine::new(&EngineSettings::default(), t0()).unwrap()
    }

    fn energy_state(engine: &Engine) -> (Vec<Channel>, HeaterChannel, BatteryReport) {
        let snapshot = engine.snapshot();
        (snapshot.channels, snapshot.heater, snapshot.battery)
    }

    #[test]
    fn test_two_status_samples_example() {
        let mut engine = engine();
        let report = engine.submit_inbound_packet(&line("PDU", t0(), "STATUS,1,0.5"), t0());
        assert!(report.is_clean());
        assert_eq!(engine.channel(1).unwrap().accumulated_wh, 0.0);

        let t1 = t0() + Duration::seconds(10);
        engine.submit_inbound_packet(&line("PDU", t1, "STATUS,1,0.5"), t1);

        let channel = engine.channel(1).unwrap();
        assert!((channel.accumulated_wh - 0.5 * 10.0 / 3600.0 * 28.0).abs() < 1e-12);
        assert_eq!(channel.last_current_amps, 0.5);
        assert_eq!(channel.last_sample_at, Some(t1));
    }

    #[test]
    fn test_packet_timestamp_drives_integration_not_receive_time() {
        let mut engine = engine();
        let late = t0() + Duration::hours(2);
        engine.submit_inbound_packet(&line("PDU", t0(), "STATUS,2,1.0"), late);
        engine.submit_inbound_packet(&line("PDU", t0() + Duration::seconds(36), "STATUS,2,1.0"), late);
        assert!((engine.channel(2).unwrap().accumulated_wh - 0.28).abs() < 1e-9);
    }

    #[test]
    fn test_malformed_packet_changes_nothing() {
        let mut engine = engine();
        engine.submit_inbound_packet(&line("PDU", t0(), "STATUS,1,1.0"), t0());
        let before = energy_state(&engine);

        let report = engine.submit_inbound_packet("PDU,bad", t0());
        assert!(report.packet.is_malformed());
        assert!(matches!(report.faults[..], [TelemetryFault::MalformedPacket { .. }]));
        assert_eq!(energy_state(&engine), before);
    }

    #[test]
    fn test_status_for_channel_seven_is_rejected() {
        let mut engine = engine();
        let before = energy_state(&engine);
        let report = engine.submit_inbound_packet(&line("PDU", t0(), "STATUS,7,0.5"), t0());
        assert_eq!(
            report.faults,
            vec![TelemetryFault::ChannelIndexOutOfRange { context: "STATUS".to_string(), index: 7 }]
        );
        assert_eq!(energy_state(&engine), before);
    }

    #[test]
    fn test_bad_timestamp_is_reported_and_receive_time_used() {
        let mut engine = engine();
        let report = engine.submit_inbound_packet("PDU,garbage,STATUS,3,0.25", t0());
        assert!(matches!(report.faults[..], [TelemetryFault::TimestampDecodeFailure { .. }]));
        let channel = engine.channel(3).unwrap();
        assert_eq!(channel.last_sample_at, Some(t0()));
        assert_eq!(channel.last_current_amps, 0.25);
    }

    #[test]
    fn test_service_set_confirms_state() {
        let mut engine = engine();
        let command = engine.request_toggle(4).unwrap();
        assert_eq!(command, Command::SetService { channel: 4, on: true });
        assert!(!engine.channel(4).unwrap().confirmed_on);
        assert_eq!(engine.channel(4).unwrap().requested_on, Some(true));

        engine.submit_inbound_packet(&line("PDU", t0(), "SRVCSET,4,1"), t0());
        let channel = engine.channel(4).unwrap();
        assert!(channel.confirmed_on);
        assert_eq!(channel.requested_on, None);

        // Next toggle is relative to the confirmed state
        assert_eq!(engine.request_toggle(4).unwrap(), Command::SetService { channel: 4, on: false });
    }

    #[test]
    fn test_unconfirmed_toggle_repeats_same_request() {
        let mut engine = engine();
        let first = engine.request_toggle(1).unwrap();
        let second = engine.request_toggle(1).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_ground_packets_only_drive_flight_events() {
        let mut engine = engine();
        let before = energy_state(&engine);

        // Transmit lines replayed from a journal are not telemetry
        for rest in ["STATUS,1", "SETSRVC,1,1", "SRVCSET,1,1", "STATUS,1,5.0"] {
            let report = engine.submit_inbound_packet(&line("GND", t0(), rest), t0());
            assert!(report.is_clean(), "{} should be ignored quietly", rest);
        }
        assert_eq!(energy_state(&engine), before);
        assert!(!engine.channel(1).unwrap().confirmed_on);

        let report = engine.submit_inbound_packet(&line("GND", t0(), "EVENT,START_FLIGHT"), t0());
        assert!(report.session_event.is_some());
        assert_eq!(engine.flight_state(), FlightState::InFlight);
        assert_eq!(engine.heater().last_sample_at, Some(t0()));

        let t1 = t0() + Duration::hours(1);
        engine.submit_inbound_packet(&line("GND", t1, "EVENT,END_FLIGHT"), t1);
        assert_eq!(engine.flight_state(), FlightState::Idle);
        assert!((engine.heater().accumulated_wh - 0.9 * 28.0).abs() < 1e-9);
        assert!(!engine.heater().is_metering());
    }

    #[test]
    fn test_pdu_flight_events_are_inert() {
        let mut engine = engine();
        let report = engine.submit_inbound_packet(&line("PDU", t0(), "EVENT,START_FLIGHT"), t0());
        assert!(report.is_clean());
        assert_eq!(engine.flight_state(), FlightState::Idle);
    }

    #[test]
    fn test_end_flight_while_idle_reported() {
        let mut engine = engine();
        let result = engine.end_flight(t0());
        assert!(matches!(result, Err(TelemetryFault::InvalidSessionTransition { .. })));

        let report = engine.submit_inbound_packet(&line("GND", t0(), "EVENT,END_FLIGHT"), t0());
        assert!(matches!(
            report.faults[..],
            [TelemetryFault::InvalidSessionTransition { state: FlightState::Idle, .. }]
        ));
        assert_eq!(engine.heater().accumulated_wh, 0.0);
    }

    #[test]
    fn test_start_then_end_same_instant() {
        let mut engine = engine();
        engine.start_flight(t0()).unwrap();
        let event = engine.end_flight(t0()).unwrap();
        assert_eq!(event.heater_wh_added, 0.0);
        assert_eq!(engine.heater().accumulated_wh, 0.0);
    }

    #[test]
    fn test_tick_emits_refresh_batch_and_meters_heater() {
        let settings = EngineSettings { refresh_interval_s: 10, ..EngineSettings::default() };
        let mut engine = Engine::new(&settings, t0()).unwrap();

        assert!(engine.tick(t0() + Duration::seconds(5)).is_empty());

        // Idle: batch only, heater untouched
        let batch = engine.tick(t0() + Duration::seconds(10));
        assert_eq!(batch, refresh_all_commands());
        assert!(!engine.heater().is_metering());

        let start = t0() + Duration::seconds(12);
        engine.start_flight(start).unwrap();

        let fire = t0() + Duration::seconds(20);
        assert_eq!(engine.tick(fire).len(), CHANNEL_COUNT);
        let expected = 0.9 * (8.0 / 3600.0) * 28.0;
        assert!((engine.heater().accumulated_wh - expected).abs() < 1e-12);
        assert_eq!(engine.heater().last_sample_at, Some(fire));

        // End credits only the interval since the last tick
        let end = fire + Duration::seconds(3600);
        let event = engine.end_flight(end).unwrap();
        assert!((event.heater_wh_added - 0.9 * 28.0).abs() < 1e-9);
    }

    #[test]
    fn test_tick_disabled_never_fires() {
        let mut engine = engine();
        assert!(engine.tick(t0() + Duration::days(1)).is_empty());
        engine.set_refresh_interval(30);
        assert_eq!(engine.tick(t0() + Duration::days(1)).len(), CHANNEL_COUNT);
    }

    #[test]
    fn test_groups_follow_membership_at_call_time() {
        let mut engine = engine();
        for (channel, amps) in [(1u8, 1.0), (2, 2.0), (3, 4.0)] {
            engine.apply_status_sample(channel, amps, t0()).unwrap();
            engine
                .apply_status_sample(channel, amps, t0() + Duration::hours(1))
                .unwrap();
        }

        engine.set_group_membership(1, 1, true).unwrap();
        engine.set_group_membership(1, 2, true).unwrap();
        let first = engine.group_report(1).unwrap();
        assert_eq!(first.current_amps, 3.0);
        assert!((first.accumulated_wh - 3.0 * 28.0).abs() < 1e-9);

        engine.set_group_membership(1, 2, false).unwrap();
        engine.set_group_membership(2, 1, true).unwrap();
        engine.set_group_membership(2, 3, true).unwrap();
        assert_eq!(first.current_amps, 3.0);
        assert_eq!(engine.group_report(1).unwrap().current_amps, 1.0);
        assert_eq!(engine.group_report(2).unwrap().current_amps, 5.0);
        assert_eq!(engine.groups_total_amps(), 6.0);

        assert!(engine.set_group_membership(3, 1, true).is_err());
        assert!(engine.set_group_membership(1, 9, true).is_err());
    }

    #[test]
    fn test_group_limit_warning() {
        let mut engine = engine();
        engine.apply_status_sample(5, 1.0, t0()).unwrap();
        engine.apply_status_sample(5, 1.0, t0() + Duration::hours(1)).unwrap();
        engine.set_group_membership(2, 5, true).unwrap();

        engine.set_group_limit(2, 30.0).unwrap();
        assert_eq!(engine.group_report(2).unwrap().status, groups::LimitStatus::Warn);
        engine.set_group_limit(2, 0.0).unwrap();
        assert_eq!(engine.group_report(2).unwrap().status, groups::LimitStatus::Ok);
        assert!(engine.set_group_limit(2, -1.0).is_err());
    }

    #[test]
    fn test_battery_budget_counts_channels_heater_and_offset() {
        let mut engine = engine();
        engine.set_battery_config(100.0, 10.0, 5.0).unwrap();

        engine.apply_status_sample(1, 2.0, t0()).unwrap();
        engine.apply_status_sample(1, 2.0, t0() + Duration::hours(2)).unwrap();
        engine.start_flight(t0()).unwrap();
        engine.end_flight(t0() + Duration::hours(1)).unwrap();

        let report = engine.battery_report();
        let heater_wh = 0.9 * 10.0;
        let expected_used = 40.0 + heater_wh + 5.0;
        assert!((report.used_wh - expected_used).abs() < 1e-9);
        assert!((report.remaining_wh - (100.0 - expected_used)).abs() < 1e-9);

        engine.set_offset(200.0).unwrap();
        let report = engine.battery_report();
        assert!(report.remaining_wh < 0.0);
        assert!(report.remaining_percent < 0.0);
        assert_eq!(engine.snapshot().battery_display_percent, 0.0);
    }

    #[test]
    fn test_invalid_battery_config_keeps_previous() {
        let mut engine = engine();
        assert!(engine.set_battery_config(0.0, 28.0, 0.0).is_err());
        assert_eq!(engine.battery_config().total_capacity_wh, 3750.0);
        assert_eq!(engine.nominal_voltage_v(), 28.0);
    }

    #[test]
    fn test_clear_energy_resets_watermarks() {
        let mut engine = engine();
        engine.apply_status_sample(1, 1.0, t0()).unwrap();
        engine.apply_status_sample(1, 1.0, t0() + Duration::hours(1)).unwrap();
        engine.start_flight(t0()).unwrap();

        let at = t0() + Duration::hours(2);
        engine.clear_energy(at);
        assert_eq!(engine.channel(1).unwrap().accumulated_wh, 0.0);
        assert_eq!(engine.channel(1).unwrap().last_sample_at, None);
        assert_eq!(engine.heater().last_sample_at, Some(at));

        // First sample after clearing contributes nothing
        engine.apply_status_sample(1, 1.0, at + Duration::hours(1)).unwrap();
        assert_eq!(engine.channel(1).unwrap().accumulated_wh, 0.0);
    }

    #[test]
    fn test_link_acknowledgements_are_recorded() {
        let mut engine = engine();
        engine.submit_inbound_packet(&line("PDU", t0(), "IPSET,192,2,104,200"), t0());
        engine.submit_inbound_packet(&line("PDU", t0(), "PORTSET,50001"), t0());
        engine.submit_inbound_packet(&line("PDU", t0(), "Resetting"), t0());
        engine.submit_inbound_packet(&line("PDU", t0(), "CMDERROR"), t0());
        let report = engine.submit_inbound_packet(&line("PDU", t0(), "HELLO,1"), t0());
        assert!(report.is_clean());

        let link = engine.link_acknowledgements();
        assert_eq!(link.ip, Some(Ipv4Addr::new(192, 2, 104, 200)));
        assert_eq!(link.port, Some(50001));
        assert_eq!(link.resets, 1);
        assert_eq!(link.command_errors, 1);
    }

    #[test]
    fn test_outbound_intents_validate_ranges() {
        let mut engine = engine();
        assert_eq!(engine.request_status(6).unwrap(), Command::Status { channel: 6 });
        assert!(engine.request_status(0).is_err());
        assert!(engine.request_toggle(7).is_err());
        assert_eq!(
            engine.request_set_service(2, false).unwrap(),
            Command::SetService { channel: 2, on: false }
        );
        assert!(engine.request_set_port(0).is_err());
        assert_eq!(engine.request_set_port(50000).unwrap(), Command::SetPort { port: 50000 });
        assert_eq!(engine.request_reset(), Command::Reset);
    }

    #[test]
    fn test_settings_validation() {
        let bad_members = EngineSettings {
            group_members: [vec![1, 7], Vec::new()],
            ..EngineSettings::default()
        };
        assert!(Engine::new(&bad_members, t0()).is_err());

        let bad_heater = EngineSettings { heater_consumption_a: -0.5, ..EngineSettings::default() };
        assert!(Engine::new(&bad_heater, t0()).is_err());

        let grouped = EngineSettings {
            group_members: [vec![1, 2], vec![2, 6]],
            group_limits_wh: [10.0, 0.0],
            ..EngineSettings::default()
        };
        let engine = Engine::new(&grouped, t0()).unwrap();
        assert_eq!(engine.group_report(1).unwrap().members, vec![1, 2]);
        assert_eq!(engine.group_report(2).unwrap().members, vec![2, 6]);
        assert_eq!(engine.group_report(1).unwrap().limit_wh, 10.0);
    }

    #[test]
    fn test_snapshot_serializes() {
        let engine = engine();
        let json = serde_json::to_value(engine.snapshot()).unwrap();
        assert_eq!(json["channels"].as_array().unwrap().len(), CHANNEL_COUNT);
        assert_eq!(json["flight_state"], "idle");
        assert_eq!(json["groups"][0]["status"], "ok");
        assert!(json["flight_started_at"].is_null());
    }

    #[test]
    fn test_snapshot_tracks_session_start_and_voltage() {
        let mut engine = engine();
        engine.start_flight(t0()).unwrap();
        engine.set_battery_config(3750.0, 24.0, 0.0).unwrap();

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.flight_started_at, Some(t0()));
        assert_eq!(snapshot.nominal_voltage_v, 24.0);

        engine.end_flight(t0() + Duration::minutes(5)).unwrap();
        assert_eq!(engine.snapshot().flight_started_at, None);
    }
}
