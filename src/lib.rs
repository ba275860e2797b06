//! Modbus-RTU/TCP protocol broker: serializes, paces, and translates
//! requests between a single RS-485 inverter and its upstream consumers.

pub mod arbiter;
pub mod cli;
pub mod config;
pub mod crc;
pub mod error;
pub mod events;
pub mod rtu;
pub mod serial;
pub mod shine;
pub mod supervisor;
pub mod tcp;
