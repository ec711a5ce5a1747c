//! # Channel State Store
//!
//! Holds the six switchable PDU outputs and the heater pseudo-channel.
//!
//! Every channel starts OFF with no sample and no energy: the PDU cannot be
//! asked for its switch state, so the store only ever learns it from `SRVCSET`
//! confirmations. The last intent issued by the operator is kept in a separate
//! field and never overwrites the confirmed state.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::TelemetryFault;
use crate::protocol::types::CHANNEL_COUNT;

/// Validated channel id (1..=6)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(u8);

impl ChannelId {
    /// Validate a wire channel index
    ///
    /// `context` names the packet or operation for the fault report.
    pub fn new(index: u8, context: &str) -> Result<Self, TelemetryFault> {
        if (1..=CHANNEL_COUNT as u8).contains(&index) {
            Ok(Self(index))
        } else {
            Err(TelemetryFault::ChannelIndexOutOfRange {
                context: context.to_string(),
                index: u64::from(index),
            })
        }
    }

    /// Wire index (1-based)
    pub fn get(self) -> u8 {
        self.0
    }

    /// Every channel id in order
    pub fn all() -> impl Iterator<Item = ChannelId> {
        (1..=CHANNEL_COUNT as u8).map(ChannelId)
    }

    fn slot(self) -> usize {
        usize::from(self.0 - 1)
    }
}

/// One switchable PDU output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Channel {
    /// Wire id (1..=6)
    pub id: u8,

    /// Operator-facing name
    pub label: String,

    /// Last state confirmed by the PDU (`SRVCSET`)
    pub confirmed_on: bool,

    /// Last state requested by the operator, until the PDU answers
    pub requested_on: Option<bool>,

    /// Last current sample in amperes
    pub last_current_amps: f64,

    /// Instant of the last sample; `None` until the first `STATUS` reply
    pub last_sample_at: Option<DateTime<Utc>>,

    /// Energy integrated so far
    pub accumulated_wh: f64,
}

impl Channel {
    fn new(id: ChannelId, label: String) -> Self {
        Self {
            id: id.get(),
            label,
            confirmed_on: false,
            requested_on: None,
            last_current_amps: 0.0,
            last_sample_at: None,
            accumulated_wh: 0.0,
        }
    }
}

/// Constant-current load metered only during flight sessions
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeaterChannel {
    /// Configured draw in amperes
    pub consumption_amps: f64,

    /// Start of the open metering interval; `None` when not metering
    pub last_sample_at: Option<DateTime<Utc>>,

    /// Energy integrated so far
    pub accumulated_wh: f64,
}

impl HeaterChannel {
    pub fn new(consumption_amps: f64) -> Self {
        Self {
            consumption_amps,
            last_sample_at: None,
            accumulated_wh: 0.0,
        }
    }

    /// Whether a metering interval is open
    pub fn is_metering(&self) -> bool {
        self.last_sample_at.is_some()
    }
}

/// Fixed table of the six channels
#[derive(Debug, Clone)]
pub struct ChannelStore {
    channels: [Channel; CHANNEL_COUNT],
}

impl ChannelStore {
    /// Create the store with every channel OFF and unsampled
    pub fn new(labels: &[String; CHANNEL_COUNT]) -> Self {
        let channels = std::array::from_fn(|slot| {
            Channel::new(ChannelId(slot as u8 + 1), labels[slot].clone())
        });
        Self { channels }
    }

    /// Record a confirmed on/off state
    ///
    /// The confirmation replaces whatever was known before and clears the
    /// pending operator request for that channel.
    ///
    /// # Errors
    ///
    /// Returns `ChannelIndexOutOfRange` for ids outside 1..=6; nothing is mutated.
    pub fn apply_service_set(&mut self, channel: u8, on: bool) -> Result<(), TelemetryFault> {
        let id = ChannelId::new(channel, "SRVCSET")?;
        let entry = self.get_mut(id);
        entry.confirmed_on = on;
        entry.requested_on = None;
        Ok(())
    }

    /// Remember the state the operator just asked for
    pub fn note_request(&mut self, id: ChannelId, on: bool) {
        self.get_mut(id).requested_on = Some(on);
    }

    /// Copy of one channel for consumers
    pub fn read_snapshot(&self, channel: u8) -> Result<Channel, TelemetryFault> {
        let id = ChannelId::new(channel, "snapshot")?;
        Ok(self.get(id).clone())
    }

    pub fn get(&self, id: ChannelId) -> &Channel {
        &self.channels[id.slot()]
    }

    pub fn get_mut(&mut self, id: ChannelId) -> &mut Channel {
        &mut self.channels[id.slot()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter()
    }

    /// Zero every accumulation and forget every sample instant
    ///
    /// The next `STATUS` reply on each channel becomes a first sample again.
    pub fn clear_energy(&mut self) {
        for channel in &mut self.channels {
            channel.accumulated_wh = 0.0;
            channel.last_sample_at = None;
        }
    }
}
