//! # PDU Protocol Module
//!
//! Implementation of the PDU's comma-separated ASCII command/reply protocol.
//!
//! This module handles:
//! - Outbound command encoding (`SETSRVC`, `STATUS`, `RESET`, `SETIP`, `SETPORT`)
//! - Inbound packet decoding into typed messages (fails soft, never panics)
//! - Ground-side framing of raw datagrams into `SOURCE,TIMESTAMP,...` lines

pub mod types;
pub mod encoder;
pub mod decoder;
pub mod framing;
