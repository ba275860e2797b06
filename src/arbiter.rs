//! Downstream transaction arbiter (C5): the single serialization point for
//! the RS-485 wire. Grounded on the teacher's `boot_serial_loop` (dedicated
//! thread owning the port, `flume` channel handing it work) generalized from
//! a fire-and-forget command stream to a request/response `transact` call
//! with pacing and bus-cleanup semantics this spec requires.

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use flume::{Receiver, Sender};

use crate::error::ArbiterError;
use crate::events::{EventBuilder, EventHub, Role};
use crate::rtu::{self, Framer};

/// Upper bound on how long [`Arbiter::bus_cleanup`] spends draining stale
/// bytes, independent of the port's own read timeout (§4.3, I3).
const BUS_CLEANUP_BUDGET: Duration = Duration::from_millis(50);

/// One downstream transaction request, submitted by any upstream endpoint.
pub struct ArbiterRequest {
    pub client: String,
    pub frame: Vec<u8>,
    pub reply: Sender<Option<Vec<u8>>>,
}

/// Cheaply `Clone`-able handle to the arbiter's worker thread. Every upstream
/// endpoint holds one; only the worker thread touches the serial port.
#[derive(Clone)]
pub struct ArbiterHandle {
    tx: Sender<ArbiterRequest>,
}

impl ArbiterHandle {
    /// Submit `frame` and block the calling thread for the response (I1: the
    /// channel send enqueues FIFO, the worker thread serializes execution).
    pub fn transact(&self, client: &str, frame: Vec<u8>) -> Option<Vec<u8>> {
        let (reply_tx, reply_rx) = flume::bounded(1);
        let request = ArbiterRequest {
            client: client.to_string(),
            frame,
            reply: reply_tx,
        };
        if self.tx.send(request).is_err() {
            return None;
        }
        reply_rx.recv().ok().flatten()
    }

    /// Async variant for `tokio` TCP connection tasks: awaits the reply
    /// without blocking the executor (§5).
    pub async fn transact_async(&self, client: &str, frame: Vec<u8>) -> Option<Vec<u8>> {
        let (reply_tx, reply_rx) = flume::bounded(1);
        let request = ArbiterRequest {
            client: client.to_string(),
            frame,
            reply: reply_tx,
        };
        if self.tx.send_async(request).await.is_err() {
            return None;
        }
        reply_rx.recv_async().await.ok().flatten()
    }
}

/// Owns the downstream port exclusively. Lives only on the dedicated worker
/// thread spawned by [`spawn`]. Generic over the port type so tests can
/// substitute an in-memory duplex byte pipe for a real `serialport::SerialPort`
/// (§4.10).
pub struct Arbiter<P> {
    port: P,
    framer: Framer,
    min_cmd_period: Duration,
    rtimeout: Duration,
    events: EventHub,
    last_done: Option<Instant>,
}

impl<P: Read + Write + Send + 'static> Arbiter<P> {
    pub fn new(port: P, framer: Framer, min_cmd_period: Duration, rtimeout: Duration, events: EventHub) -> Self {
        Self {
            port,
            framer,
            min_cmd_period,
            rtimeout,
            events,
            last_done: None,
        }
    }

    /// Drain `rx` forever, serving one transaction at a time (I1).
    pub fn run(mut self, rx: Receiver<ArbiterRequest>) {
        while let Ok(req) = rx.recv() {
            let response = self.transact(&req.client, &req.frame);
            let _ = req.reply.send(response);
        }
    }

    fn transact(&mut self, client: &str, frame: &[u8]) -> Option<Vec<u8>> {
        self.wait_for_pacing();
        self.bus_cleanup();

        let parsed = rtu::parse(frame);
        self.events.emit(
            EventBuilder::new(Role::Req, client)
                .hex_bytes(frame)
                .parsed(parsed),
        );

        if let Err(err) = self.write_request(frame) {
            log::error!("downstream write failed: {err}");
            self.last_done = Some(Instant::now());
            return None;
        }

        let response = match self.framer.read_frame(&mut self.port, self.rtimeout) {
            Ok(Some(frame)) => Some(frame),
            Ok(None) => {
                self.events.emit(
                    EventBuilder::new(Role::Warn, client)
                        .kind("downstream_timeout")
                        .timeout(self.rtimeout.as_secs_f64()),
                );
                None
            }
            Err(err) => {
                log::error!("downstream read failed: {err}");
                None
            }
        };

        self.last_done = Some(Instant::now());

        let mut rsp_event = EventBuilder::new(Role::Rsp, client);
        if let Some(bytes) = &response {
            let crc_ok = crate::crc::verify(bytes);
            rsp_event = rsp_event.hex_bytes(bytes).crc_ok(crc_ok);
        }
        self.events.emit(rsp_event);

        response
    }

    fn wait_for_pacing(&self) {
        if let Some(last) = self.last_done {
            let elapsed = last.elapsed();
            if elapsed < self.min_cmd_period {
                std::thread::sleep(self.min_cmd_period - elapsed);
            }
        }
    }

    /// I3: discard any bytes that arrived on the wire before this
    /// transaction, both in the OS driver and in the framer's buffer. Bounded
    /// to [`BUS_CLEANUP_BUDGET`] regardless of the port's own read timeout, so
    /// an idle bus never makes a healthy transaction wait out `rtimeout`.
    fn bus_cleanup(&mut self) {
        let deadline = Instant::now() + BUS_CLEANUP_BUDGET;
        let mut scratch = [0u8; 256];
        while Instant::now() < deadline {
            match self.port.read(&mut scratch) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(_) => break,
            }
        }
        self.framer.reset();
        self.framer.mark_fresh(Instant::now());
    }

    fn write_request(&mut self, frame: &[u8]) -> Result<(), ArbiterError> {
        self.port.write_all(frame).map_err(ArbiterError::Write)?;
        self.port.flush().map_err(ArbiterError::Write)?;
        Ok(())
    }
}

/// Spawn the arbiter's dedicated worker thread, returning a handle every
/// endpoint can clone and send requests through.
pub fn spawn<P: Read + Write + Send + 'static>(arbiter: Arbiter<P>) -> ArbiterHandle {
    let (tx, rx) = flume::unbounded();
    std::thread::Builder::new()
        .name("downstream-arbiter".into())
        .spawn(move || arbiter.run(rx))
        .expect("failed to spawn arbiter thread");
    ArbiterHandle { tx }
}
