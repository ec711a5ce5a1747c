//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section and every field has a default, so an empty file is a valid
//! configuration for the stock PDU at `192.168.1.177:50000`.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;

use crate::engine::EngineSettings;
use crate::error::{PduError, Result};
use crate::protocol::types::CHANNEL_COUNT;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub link: LinkConfig,

    #[serde(default)]
    pub battery: PowerConfig,

    #[serde(default)]
    pub services: ServicesConfig,

    #[serde(default)]
    pub groups: GroupsConfig,

    #[serde(default)]
    pub refresh: RefreshConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// UDP link configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LinkConfig {
    #[serde(default = "default_pdu_ip")]
    pub pdu_ip: Ipv4Addr,

    #[serde(default = "default_pdu_port")]
    pub pdu_port: u16,

    #[serde(default = "default_bind_ip")]
    pub bind_ip: IpAddr,

    /// Local receive port; 0 lets the OS choose
    #[serde(default)]
    pub recv_port: u16,

    #[serde(default = "default_recv_timeout_ms")]
    pub recv_timeout_ms: u64,
}

/// Battery and heater configuration (`[battery]`)
#[derive(Debug, Deserialize, Clone)]
pub struct PowerConfig {
    #[serde(default = "default_nominal_voltage_v")]
    pub nominal_voltage_v: f64,

    #[serde(default = "default_total_capacity_wh")]
    pub total_capacity_wh: f64,

    #[serde(default)]
    pub offset_wh: f64,

    #[serde(default = "default_heater_consumption_a")]
    pub heater_consumption_a: f64,
}

/// Channel labels and group membership
#[derive(Debug, Deserialize, Clone)]
pub struct ServicesConfig {
    #[serde(default = "default_labels")]
    pub labels: Vec<String>,

    #[serde(default)]
    pub group1: Vec<u8>,

    #[serde(default)]
    pub group2: Vec<u8>,
}

/// Group energy limits; 0 disables the warning
#[derive(Debug, Deserialize, Clone, Default)]
pub struct GroupsConfig {
    #[serde(default)]
    pub group1_limit_wh: f64,

    #[serde(default)]
    pub group2_limit_wh: f64,
}

/// Auto-refresh configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RefreshConfig {
    /// Seconds between status sweeps; 0 disables
    #[serde(default = "default_refresh_interval_s")]
    pub interval_s: i64,
}

/// TMTC journal and replay configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default = "default_journal_enabled")]
    pub journal_enabled: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    /// Journal replayed into the engine at start-up and then appended to
    #[serde(default)]
    pub replay_file: Option<String>,
}

// Default value functions
fn default_pdu_ip() -> Ipv4Addr { Ipv4Addr::new(192, 168, 1, 177) }
fn default_pdu_port() -> u16 { 50000 }
fn default_bind_ip() -> IpAddr { IpAddr::V4(Ipv4Addr::UNSPECIFIED) }
fn default_recv_timeout_ms() -> u64 { 10 }

fn default_nominal_voltage_v() -> f64 { 28.0 }
fn default_total_capacity_wh() -> f64 { 3750.0 }
fn default_heater_consumption_a() -> f64 { 0.9 }

fn default_labels() -> Vec<String> {
    (1..=CHANNEL_COUNT).map(|i| format!("Service {}", i)).collect()
}

fn default_refresh_interval_s() -> i64 { 5 }

fn default_journal_enabled() -> bool { true }
fn default_log_dir() -> String { "./logs".to_string() }

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            pdu_ip: default_pdu_ip(),
            pdu_port: default_pdu_port(),
            bind_ip: default_bind_ip(),
            recv_port: 0,
            recv_timeout_ms: default_recv_timeout_ms(),
        }
    }
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            nominal_voltage_v: default_nominal_voltage_v(),
            total_capacity_wh: default_total_capacity_wh(),
            offset_wh: 0.0,
            heater_consumption_a: default_heater_consumption_a(),
        }
    }
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            labels: default_labels(),
            group1: Vec::new(),
            group2: Vec::new(),
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self { interval_s: default_refresh_interval_s() }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            journal_enabled: default_journal_enabled(),
            log_dir: default_log_dir(),
            replay_file: None,
        }
    }
}

fn invalid(message: impl std::fmt::Display) -> PduError {
    PduError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use pdu_controller::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        // Link
        if self.link.pdu_port == 0 {
            return Err(invalid("pdu_port must be between 1 and 65535"));
        }

        if self.link.recv_timeout_ms == 0 || self.link.recv_timeout_ms > 10000 {
            return Err(invalid("recv_timeout_ms must be between 1 and 10000"));
        }

        // Battery
        for (name, value) in [
            ("nominal_voltage_v", self.battery.nominal_voltage_v),
            ("total_capacity_wh", self.battery.total_capacity_wh),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(invalid(format!("{} must be greater than 0", name)));
            }
        }

        if !self.battery.offset_wh.is_finite() {
            return Err(invalid("offset_wh must be a finite number"));
        }

        if !self.battery.heater_consumption_a.is_finite() || self.battery.heater_consumption_a < 0.0 {
            return Err(invalid("heater_consumption_a must be 0 or greater"));
        }

        // Services
        if self.services.labels.len() != CHANNEL_COUNT {
            return Err(invalid(format!(
                "services.labels must have exactly {} entries, got {}",
                CHANNEL_COUNT,
                self.services.labels.len()
            )));
        }

        for (group, members) in [("group1", &self.services.group1), ("group2", &self.services.group2)] {
            for &member in members {
                if member == 0 || usize::from(member) > CHANNEL_COUNT {
                    return Err(invalid(format!(
                        "{} member {} is out of range (must be 1-{})",
                        group, member, CHANNEL_COUNT
                    )));
                }
            }
        }

        // Groups
        for (name, value) in [
            ("group1_limit_wh", self.groups.group1_limit_wh),
            ("group2_limit_wh", self.groups.group2_limit_wh),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(format!("{} must be 0 or greater", name)));
            }
        }

        // Telemetry
        if self.telemetry.journal_enabled && self.telemetry.log_dir.is_empty() {
            return Err(invalid("telemetry log_dir cannot be empty when the journal is enabled"));
        }

        Ok(())
    }

    /// Initial engine parameters described by this configuration
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            labels: std::array::from_fn(|slot| {
                self.services
                    .labels
                    .get(slot)
                    .cloned()
                    .unwrap_or_else(|| format!("Service {}", slot + 1))
            }),
            nominal_voltage_v: self.battery.nominal_voltage_v,
            heater_consumption_a: self.battery.heater_consumption_a,
            total_capacity_wh: self.battery.total_capacity_wh,
            offset_wh: self.battery.offset_wh,
            group_members: [self.services.group1.clone(), self.services.group2.clone()],
            group_limits_wh: [self.groups.group1_limit_wh, self.groups.group2_limit_wh],
            refresh_interval_s: self.refresh.interval_s,
        }
    }
}
