//! Shine vendor-logger endpoint (C6): a transparent RTU peer relayed through
//! the downstream arbiter. State machine grounded on the teacher's serial
//! reconnect pattern in `protocol/daemon/serial_daemon.rs`'s `reopen_serial`,
//! generalized to the CLOSED/OPENING/ONLINE machine and backoff timings §4.5
//! requires.

use std::time::Duration;

use crate::arbiter::ArbiterHandle;
use crate::config::SerialFraming;
use crate::crc;
use crate::events::{EventBuilder, EventHub, Role};
use crate::rtu::framer::char_time;
use crate::rtu::Framer;
use crate::serial;

const OPEN_FAILURE_BACKOFF: Duration = Duration::from_secs(5);
const SERIAL_ERROR_BACKOFF: Duration = Duration::from_secs(2);
const FRAME_READ_TIMEOUT: Duration = Duration::from_secs(10);

const CLIENT_LABEL: &str = "SHINE";

pub struct ShineEndpoint {
    dev: String,
    framing: SerialFraming,
    arbiter: ArbiterHandle,
    events: EventHub,
}

impl ShineEndpoint {
    pub fn new(dev: String, framing: SerialFraming, arbiter: ArbiterHandle, events: EventHub) -> Self {
        Self {
            dev,
            framing,
            arbiter,
            events,
        }
    }

    /// Run the CLOSED → OPENING → ONLINE loop forever on the calling thread.
    /// The supervisor spawns this on its own dedicated OS thread because it
    /// owns a real serial port.
    pub fn run(mut self) -> ! {
        loop {
            match self.open() {
                Ok(mut port) => {
                    self.events.emit(EventBuilder::new(Role::Sys, CLIENT_LABEL).kind("shine_online"));
                    let mut framer = Framer::new(char_time(
                        self.framing.baud,
                        self.framing.data_bits,
                        self.framing.stop_bits,
                        self.framing.parity.bit(),
                    ));
                    self.online_loop(port.as_mut(), &mut framer);
                    self.events.emit(EventBuilder::new(Role::Sys, CLIENT_LABEL).kind("shine_serial_error"));
                    std::thread::sleep(SERIAL_ERROR_BACKOFF);
                }
                Err(err) => {
                    log::warn!("shine open failed: {err}");
                    self.events.emit(EventBuilder::new(Role::Sys, CLIENT_LABEL).kind("shine_open_failed"));
                    std::thread::sleep(OPEN_FAILURE_BACKOFF);
                }
            }
        }
    }

    fn open(&self) -> std::io::Result<Box<dyn serialport::SerialPort>> {
        serial::open(&self.dev, self.framing).map_err(std::io::Error::from)
    }

    /// ONLINE state: read one frame, relay it through the arbiter, write the
    /// response back. Returns once a read yields a hard I/O error.
    fn online_loop(&mut self, port: &mut dyn serialport::SerialPort, framer: &mut Framer) {
        loop {
            match framer.read_frame(port, FRAME_READ_TIMEOUT) {
                Ok(Some(frame)) => {
                    if !crc::verify(&frame) {
                        self.events.emit(
                            EventBuilder::new(Role::Drop, CLIENT_LABEL)
                                .hex_bytes(&frame)
                                .crc_ok(false),
                        );
                        continue;
                    }
                    match self.arbiter.transact(CLIENT_LABEL, frame) {
                        Some(response) => {
                            if let Err(err) = port.write_all(&response).and_then(|_| port.flush()) {
                                log::error!("shine write failed: {err}");
                                return;
                            }
                        }
                        None => {
                            self.events.emit(
                                EventBuilder::new(Role::Warn, CLIENT_LABEL).kind("downstream_timeout"),
                            );
                        }
                    }
                }
                Ok(None) => continue,
                Err(err) => {
                    log::warn!("shine read error: {err}");
                    return;
                }
            }
        }
    }
}
