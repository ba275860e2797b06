//! Shared serial line setup: maps [`crate::config::SerialFraming`] onto
//! `serialport` builder types. Split out so the downstream arbiter and the
//! Shine endpoint configure their ports identically (§4.5: "configured
//! identically to the downstream").

use std::time::Duration;

use crate::config::{Parity, SerialFraming};

/// Per-read OS-level timeout used for every opened port. This is deliberately
/// short and unrelated to any higher-level read deadline (`rtimeout`, the
/// Shine frame-read timeout): [`crate::rtu::Framer`] polls the source in a
/// loop and enforces its own deadline, so the port itself only needs to hand
/// back control promptly when nothing is waiting, the way a non-blocking
/// source would (§4.2).
pub const POLL_TIMEOUT: Duration = Duration::from_millis(20);

pub fn open(dev: &str, framing: SerialFraming) -> serialport::Result<Box<dyn serialport::SerialPort>> {
    serialport::new(dev, framing.baud)
        .data_bits(to_data_bits(framing.data_bits))
        .parity(to_parity(framing.parity))
        .stop_bits(to_stop_bits(framing.stop_bits))
        .timeout(POLL_TIMEOUT)
        .open()
}

pub fn to_data_bits(bits: u8) -> serialport::DataBits {
    match bits {
        5 => serialport::DataBits::Five,
        6 => serialport::DataBits::Six,
        7 => serialport::DataBits::Seven,
        _ => serialport::DataBits::Eight,
    }
}

pub fn to_parity(parity: Parity) -> serialport::Parity {
    match parity {
        Parity::None => serialport::Parity::None,
        Parity::Even => serialport::Parity::Even,
        Parity::Odd => serialport::Parity::Odd,
    }
}

pub fn to_stop_bits(bits: u8) -> serialport::StopBits {
    match bits {
        2 => serialport::StopBits::Two,
        _ => serialport::StopBits::One,
    }
}
