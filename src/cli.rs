//! Command-line surface (§4.8, §6), built with `clap`'s derive API.

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "growatt-broker", about = "Modbus-RTU/TCP broker for a single RS-485 inverter")]
pub struct Args {
    /// Downstream RS-485 inverter device, e.g. /dev/ttyUSB0
    #[arg(long)]
    pub inverter: String,

    /// Upstream vendor data-logger ("Shine") device, if relayed
    #[arg(long)]
    pub shine: Option<String>,

    /// Baud rate used for both sides unless overridden
    #[arg(long, default_value_t = 9600)]
    pub baud: u32,

    /// Byte framing (DATABITS PARITY STOPBITS, e.g. 8E1) used for both sides unless overridden
    #[arg(long, default_value = "8E1")]
    pub bytes: String,

    /// Downstream baud override
    #[arg(long)]
    pub inv_baud: Option<u32>,

    /// Downstream framing override
    #[arg(long)]
    pub inv_bytes: Option<String>,

    /// Shine baud override
    #[arg(long)]
    pub shine_baud: Option<u32>,

    /// Shine framing override
    #[arg(long)]
    pub shine_bytes: Option<String>,

    /// Primary Modbus-TCP listen address, "-" to disable
    #[arg(long, default_value = "0.0.0.0:5020")]
    pub tcp: String,

    /// Secondary Modbus-TCP listen address
    #[arg(long)]
    pub tcp_alt: Option<String>,

    /// Sniff-relay listen address broadcasting JSONL events
    #[arg(long)]
    pub sniff: Option<String>,

    /// Minimum seconds between completion of one downstream transaction and the next
    #[arg(long, default_value_t = 1.0)]
    pub min_period: f64,

    /// Downstream read timeout in seconds
    #[arg(long, default_value_t = 1.5)]
    pub rtimeout: f64,

    /// Event log path, "-" for stdout, "none" to disable
    #[arg(long, default_value = "/var/log/growatt_broker.jsonl")]
    pub log: String,
}
