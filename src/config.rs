//! Validated configuration surface (§4.8, §6). Built from parsed CLI flags;
//! `Config::validate` is the single place invalid configuration is rejected.

use std::net::SocketAddr;
use std::path::PathBuf;

use crate::cli::Args;
use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Even,
    Odd,
}

impl Parity {
    pub fn bit(self) -> bool {
        !matches!(self, Parity::None)
    }
}

/// Serial line settings for one side of the broker (downstream inverter or
/// upstream Shine logger).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialFraming {
    pub baud: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: u8,
}

/// Parse a `DATABITS PARITY STOPBITS` framing string such as `"8E1"` or `"7O2"`.
pub fn parse_framing(flag: &'static str, baud: u32, bytes: &str) -> Result<SerialFraming, ConfigError> {
    let chars: Vec<char> = bytes.chars().collect();
    let invalid = || ConfigError::InvalidFraming {
        flag,
        value: bytes.to_string(),
    };
    if chars.len() != 3 {
        return Err(invalid());
    }
    let data_bits = chars[0].to_digit(10).filter(|d| (5..=8).contains(d)).ok_or_else(invalid)? as u8;
    let parity = match chars[1].to_ascii_uppercase() {
        'N' => Parity::None,
        'E' => Parity::Even,
        'O' => Parity::Odd,
        _ => return Err(invalid()),
    };
    let stop_bits = chars[2].to_digit(10).filter(|d| (1..=2).contains(d)).ok_or_else(invalid)? as u8;
    Ok(SerialFraming {
        baud,
        data_bits,
        parity,
        stop_bits,
    })
}

#[derive(Debug, Clone)]
pub struct Config {
    pub inverter_dev: String,
    pub inverter_framing: SerialFraming,
    pub shine_dev: Option<String>,
    pub shine_framing: SerialFraming,
    pub tcp_addr: Option<SocketAddr>,
    pub tcp_alt_addr: Option<SocketAddr>,
    pub sniff_addr: Option<SocketAddr>,
    pub min_cmd_period_secs: f64,
    pub rtimeout_secs: f64,
    pub log_path: LogTarget,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stdout,
    Disabled,
    File(PathBuf),
}

fn parse_addr(flag: &'static str, raw: &str) -> Result<Option<SocketAddr>, ConfigError> {
    if raw == "-" {
        return Ok(None);
    }
    raw.parse::<SocketAddr>()
        .map(Some)
        .map_err(|_| ConfigError::InvalidAddress {
            flag,
            value: raw.to_string(),
        })
}

fn parse_duration(flag: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::InvalidDuration { flag, value })
    }
}

fn log_target(raw: &str) -> LogTarget {
    match raw {
        "" | "-" => LogTarget::Stdout,
        s if s.eq_ignore_ascii_case("none") => LogTarget::Disabled,
        s => LogTarget::File(PathBuf::from(s)),
    }
}

impl Config {
    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        let inv_baud = args.inv_baud.unwrap_or(args.baud);
        let inv_bytes = args.inv_bytes.as_deref().unwrap_or(&args.bytes).to_string();
        let shine_baud = args.shine_baud.unwrap_or(args.baud);
        let shine_bytes = args.shine_bytes.as_deref().unwrap_or(&args.bytes).to_string();

        let inverter_framing = parse_framing("--inv-bytes/--bytes", inv_baud, &inv_bytes)?;
        let shine_framing = parse_framing("--shine-bytes/--bytes", shine_baud, &shine_bytes)?;

        let tcp_addr = parse_addr("--tcp", &args.tcp)?;
        let tcp_alt_addr = match &args.tcp_alt {
            Some(raw) => parse_addr("--tcp-alt", raw)?,
            None => None,
        };
        let sniff_addr = match &args.sniff {
            Some(raw) => parse_addr("--sniff", raw)?,
            None => None,
        };

        if tcp_addr.is_none() && tcp_alt_addr.is_none() {
            return Err(ConfigError::NoTcpServer);
        }

        let min_cmd_period_secs = parse_duration("--min-period", args.min_period)?;
        let rtimeout_secs = parse_duration("--rtimeout", args.rtimeout)?;

        Ok(Config {
            inverter_dev: args.inverter.clone(),
            inverter_framing,
            shine_dev: args.shine.clone(),
            shine_framing,
            tcp_addr,
            tcp_alt_addr,
            sniff_addr,
            min_cmd_period_secs,
            rtimeout_secs,
            log_path: log_target(&args.log),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_standard_framing() {
        let f = parse_framing("--bytes", 9600, "8E1").unwrap();
        assert_eq!(f.data_bits, 8);
        assert_eq!(f.parity, Parity::Even);
        assert_eq!(f.stop_bits, 1);
    }

    #[test]
    fn rejects_malformed_framing() {
        assert!(parse_framing("--bytes", 9600, "8X1").is_err());
        assert!(parse_framing("--bytes", 9600, "81").is_err());
        assert!(parse_framing("--bytes", 9600, "9N1").is_err());
    }

    #[test]
    fn log_target_selection() {
        assert_eq!(log_target(""), LogTarget::Stdout);
        assert_eq!(log_target("-"), LogTarget::Stdout);
        assert_eq!(log_target("NONE"), LogTarget::Disabled);
        assert_eq!(log_target("/var/log/x.jsonl"), LogTarget::File(PathBuf::from("/var/log/x.jsonl")));
    }

    #[test]
    fn dash_disables_a_tcp_listener() {
        assert_eq!(parse_addr("--tcp", "-").unwrap(), None);
    }

    #[test]
    fn requires_at_least_one_tcp_server() {
        let args = Args {
            inverter: "/dev/ttyUSB0".into(),
            shine: None,
            baud: 9600,
            bytes: "8E1".into(),
            inv_baud: None,
            inv_bytes: None,
            shine_baud: None,
            shine_bytes: None,
            tcp: "-".into(),
            tcp_alt: None,
            sniff: None,
            min_period: 1.0,
            rtimeout: 1.5,
            log: "-".into(),
        };
        assert!(matches!(Config::from_args(&args), Err(ConfigError::NoTcpServer)));
    }
}
