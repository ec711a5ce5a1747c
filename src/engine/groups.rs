//! # Group Aggregator
//!
//! Two operator-defined, possibly overlapping channel groups used for
//! aggregate energy reporting. Totals are recomputed from the channel table on
//! every call and never stored, so a membership change only affects later
//! reports.

use serde::Serialize;

use super::channels::{ChannelId, ChannelStore};
use crate::error::TelemetryFault;
use crate::protocol::types::CHANNEL_COUNT;

/// Number of groups
pub const GROUP_COUNT: usize = 2;

/// A group warns once remaining headroom is at most this fraction of its limit
pub const LIMIT_HEADROOM_FRACTION: f64 = 0.1;

/// Limit evaluation result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitStatus {
    Ok,
    Warn,
}

/// Sums over a group's members
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct GroupTotals {
    pub current_amps: f64,
    pub accumulated_wh: f64,
}

/// Everything the presentation layer shows for one group
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupReport {
    pub id: u8,
    pub members: Vec<u8>,
    pub current_amps: f64,
    pub accumulated_wh: f64,
    pub limit_wh: f64,
    pub status: LimitStatus,
}

/// Membership and limit of one group
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    id: u8,
    members: [bool; CHANNEL_COUNT],
    limit_wh: f64,
}

impl Group {
    pub fn new(id: u8) -> Self {
        Self {
            id,
            members: [false; CHANNEL_COUNT],
            limit_wh: 0.0,
        }
    }

    pub fn limit_wh(&self) -> f64 {
        self.limit_wh
    }

    pub fn set_member(&mut self, channel: ChannelId, member: bool) {
        self.members[usize::from(channel.get() - 1)] = member;
    }

    /// Set the energy limit; 0 disables the warning
    pub fn set_limit_wh(&mut self, limit_wh: f64) -> Result<(), TelemetryFault> {
        if !limit_wh.is_finite() || limit_wh < 0.0 {
            return Err(TelemetryFault::InvalidParameter { name: "group limit (Wh)", value: limit_wh });
        }
        self.limit_wh = limit_wh;
        Ok(())
    }

    pub fn is_member(&self, channel: ChannelId) -> bool {
        self.members[usize::from(channel.get() - 1)]
    }

    pub fn member_ids(&self) -> Vec<ChannelId> {
        ChannelId::all().filter(|id| self.is_member(*id)).collect()
    }

    /// Current totals and limit status
    pub fn report(&self, channels: &ChannelStore) -> GroupReport {
        let members = self.member_ids();
        let totals = recompute(&members, channels);
        GroupReport {
            id: self.id,
            members: members.iter().map(|id| id.get()).collect(),
            current_amps: totals.current_amps,
            accumulated_wh: totals.accumulated_wh,
            limit_wh: self.limit_wh,
            status: evaluate_limit(self.limit_wh, totals.accumulated_wh),
        }
    }
}

/// Validate a group id (1..=2) into a table slot
pub fn group_slot(group: u8) -> Result<usize, TelemetryFault> {
    if (1..=GROUP_COUNT as u8).contains(&group) {
        Ok(usize::from(group - 1))
    } else {
        Err(TelemetryFault::InvalidParameter { name: "group id", value: f64::from(group) })
    }
}

/// Sum last current and accumulated energy over exactly `members`
pub fn recompute(members: &[ChannelId], channels: &ChannelStore) -> GroupTotals {
    members
        .iter()
        .map(|id| channels.get(*id))
        .fold(GroupTotals::default(), |totals, channel| GroupTotals {
            current_amps: totals.current_amps + channel.last_current_amps,
            accumulated_wh: totals.accumulated_wh + channel.accumulated_wh,
        })
}

/// Warn when a positive limit has 10% or less headroom left
///
/// # Examples
///
/// ```
/// use pdu_controller::engine::groups::{evaluate_limit, LimitStatus};
///
/// assert_eq!(evaluate_limit(100.0, 89.0), LimitStatus::Ok);
/// assert_eq!(evaluate_limit(100.0, 90.0), LimitStatus::Warn);
/// assert_eq!(evaluate_limit(0.0, 1_000.0), LimitStatus::Ok);
/// ```
pub fn evaluate_limit(limit_wh: f64, accumulated_wh: f64) -> LimitStatus {
    if limit_wh > 0.0 && limit_wh - accumulated_wh <= LIMIT_HEADROOM_FRACTION * limit_wh {
        LimitStatus::Warn
    } else {
        LimitStatus::Ok
    }
}
