//! Structured event fan-out (C4): every concurrent request path feeds this
//! hub without blocking the bus. Grounded on the teacher's `core::logs`
//! `LogEntry`/`LogMetadata` shape, generalized from a UI log buffer to a
//! JSONL event stream with pluggable sinks.

pub mod sink;

use std::sync::Arc;

use chrono::{DateTime, Local, SecondsFormat};
use serde::Serialize;

use crate::rtu::ParsedView;

pub use sink::{EventSink, FileSink, StdoutSink};

/// Role tag carried by every event (§3 Data model).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Req,
    Rsp,
    Drop,
    Warn,
    Sys,
    Error,
}

/// Parsed Modbus fields, flattened into the event when present.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ParsedFields {
    pub unit: u8,
    pub function: u8,
    pub body_len: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addr: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub byte_count: Option<u8>,
}

impl From<ParsedView> for ParsedFields {
    fn from(v: ParsedView) -> Self {
        Self {
            unit: v.unit,
            function: v.function,
            body_len: v.body_len,
            addr: v.addr,
            count: v.count,
            value: v.value,
            byte_count: v.byte_count,
        }
    }
}

/// A single structured broker event, millisecond-precision local timestamp.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    #[serde(serialize_with = "serialize_millis")]
    pub timestamp: DateTime<Local>,
    pub role: Role,
    pub client: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<&'static str>,
    pub hex: String,
    #[serde(flatten)]
    pub parsed: Option<ParsedFields>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crc_ok: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,
}

/// Builder for an [`Event`]; `timestamp` is stamped at [`EventHub::emit`] time
/// so producers never need to touch a clock.
#[derive(Debug, Clone)]
pub struct EventBuilder {
    role: Role,
    client: String,
    event: Option<&'static str>,
    hex: String,
    parsed: Option<ParsedFields>,
    crc_ok: Option<bool>,
    timeout: Option<f64>,
}

impl EventBuilder {
    pub fn new(role: Role, client: impl Into<String>) -> Self {
        Self {
            role,
            client: client.into(),
            event: None,
            hex: String::new(),
            parsed: None,
            crc_ok: None,
            timeout: None,
        }
    }

    pub fn kind(mut self, kind: &'static str) -> Self {
        self.event = Some(kind);
        self
    }

    pub fn hex_bytes(mut self, bytes: &[u8]) -> Self {
        self.hex = hex_encode(bytes);
        self
    }

    pub fn parsed(mut self, parsed: ParsedView) -> Self {
        self.parsed = Some(parsed.into());
        self
    }

    pub fn crc_ok(mut self, ok: bool) -> Self {
        self.crc_ok = Some(ok);
        self
    }

    pub fn timeout(mut self, seconds: f64) -> Self {
        self.timeout = Some(seconds);
        self
    }

    pub(crate) fn build(self) -> Event {
        Event {
            timestamp: Local::now(),
            role: self.role,
            client: self.client,
            event: self.event,
            hex: self.hex,
            parsed: self.parsed,
            crc_ok: self.crc_ok,
            timeout: self.timeout,
        }
    }
}

/// Serialize as ISO-8601 with millisecond precision (§3), rather than
/// `chrono`'s default nanosecond-precision `Serialize` impl.
fn serialize_millis<S>(ts: &DateTime<Local>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
}

pub fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Fan-out point: accepts events from any producer, dispatches to every
/// registered sink, isolating a failing sink from the others (P6).
#[derive(Clone, Default)]
pub struct EventHub {
    sinks: Arc<Vec<Arc<dyn EventSink>>>,
}

impl EventHub {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self {
            sinks: Arc::new(sinks),
        }
    }

    /// Stamp `builder` with the current time and dispatch it to every sink.
    pub fn emit(&self, builder: EventBuilder) {
        let event = builder.build();
        for sink in self.sinks.iter() {
            sink.handle(&event);
        }
    }
}
