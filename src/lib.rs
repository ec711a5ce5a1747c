//! # PDU Controller Library
//!
//! Ground-station side of a six-channel Power Distribution Unit driven over UDP.
//!
//! This library provides telemetry decoding, per-channel energy accounting,
//! group and battery budgets, flight-session heater metering and the UDP link
//! used to talk to the PDU.

pub mod config;
pub mod console;
pub mod engine;
pub mod error;
pub mod link;
pub mod protocol;
pub mod sim;
pub mod telemetry;
