//! Black-box end-to-end scenarios (§8): a loopback TCP socket stands in for
//! the RS-485 wire (both sides implement `Read + Write + Send`, same as a
//! real serial port), a small "fake inverter" thread on the far end answers
//! requests the way the downstream device would.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use growatt_broker::arbiter::{self, Arbiter};
use growatt_broker::crc;
use growatt_broker::events::sink::EventSink;
use growatt_broker::events::{Event, EventHub};
use growatt_broker::rtu::framer::char_time;
use growatt_broker::rtu::Framer;

/// Poll-sized read timeout matching what every real port is opened with
/// (`serial::POLL_TIMEOUT`): short enough that a speculative read with
/// nothing waiting returns promptly instead of blocking past the frame gap.
const POLL_TIMEOUT: Duration = Duration::from_millis(20);

/// Connect a loopback TCP pair: one end plays the downstream serial port the
/// arbiter owns, the other is handed to the fake inverter thread. Both ends
/// get a short read timeout so `Framer::read_frame`'s polling loop can
/// observe its own gap/deadline instead of blocking inside the OS read.
fn loopback_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let client = TcpStream::connect(addr).unwrap();
    let (server, _) = listener.accept().unwrap();
    client.set_nodelay(true).unwrap();
    server.set_nodelay(true).unwrap();
    client.set_read_timeout(Some(POLL_TIMEOUT)).unwrap();
    server.set_read_timeout(Some(POLL_TIMEOUT)).unwrap();
    (client, server)
}

fn spawn_arbiter(port: TcpStream, min_cmd_period: Duration, rtimeout: Duration, events: EventHub) -> arbiter::ArbiterHandle {
    let framer = Framer::new(char_time(115_200, 8, 1, false));
    let arbiter = Arbiter::new(port, framer, min_cmd_period, rtimeout, events);
    arbiter::spawn(arbiter)
}

#[derive(Default)]
struct CountingSink(AtomicUsize);
impl EventSink for CountingSink {
    fn handle(&self, _event: &Event) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Respond once with `response` to the next inbound frame, forever.
fn fake_inverter_fixed_response(mut inverter_side: TcpStream, response: Vec<u8>) {
    std::thread::spawn(move || {
        let mut framer = Framer::new(char_time(115_200, 8, 1, false));
        loop {
            match framer.read_frame(&mut inverter_side, Duration::from_secs(5)) {
                Ok(Some(_request)) => {
                    if inverter_side.write_all(&response).is_err() {
                        return;
                    }
                }
                Ok(None) => continue,
                Err(_) => return,
            }
        }
    });
}

#[test]
fn happy_read_round_trips_registers() {
    // Scenario 1 + P3's CRC fixture: read_holding(addr=0, count=2) -> [1, 2].
    let (downstream_client, downstream_server) = loopback_pair();
    let response = crc::append(&[0x01, 0x03, 0x04, 0x00, 0x01, 0x00, 0x02]);
    fake_inverter_fixed_response(downstream_server, response.clone());

    let events = EventHub::new(vec![]);
    let handle = spawn_arbiter(downstream_client, Duration::from_millis(0), Duration::from_millis(500), events);

    let request = crc::append(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x02]);
    let got = handle.transact("test", request).expect("response");
    assert_eq!(got, response);

    let view = growatt_broker::rtu::parse(&got);
    assert_eq!(view.unit, 1);
    assert_eq!(view.function, 3);
}

#[test]
fn crc_fixture_matches_known_vector() {
    // P3 / scenario 2, expressed as the spec's literal fixture.
    let body = [0x01, 0x03, 0x00, 0x00, 0x00, 0x0A];
    assert_eq!(crc::crc16(&body), 0xCDC5);
    let frame = crc::append(&body);
    assert_eq!(frame, vec![0x01, 0x03, 0x00, 0x00, 0x00, 0x0A, 0xC5, 0xCD]);
    assert!(crc::verify(&frame));
    let view = growatt_broker::rtu::parse(&frame);
    assert_eq!(view.unit, 1);
    assert_eq!(view.function, 3);
    assert_eq!(view.body_len, 4);
    assert_eq!(view.addr, Some(0));
    assert_eq!(view.count, Some(10));
}

#[test]
fn downstream_silence_times_out_and_emits_warning() {
    // Scenario 3: nobody answers on the wire within rtimeout.
    let (downstream_client, _downstream_server_kept_open_but_silent) = loopback_pair();
    let sink = Arc::new(CountingSink::default());
    let events = EventHub::new(vec![sink.clone()]);
    let rtimeout = Duration::from_millis(100);
    let handle = spawn_arbiter(downstream_client, Duration::from_millis(0), rtimeout, events);

    let started = std::time::Instant::now();
    let request = crc::append(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x02]);
    let got = handle.transact("test", request);

    assert!(got.is_none());
    assert!(started.elapsed() < rtimeout + Duration::from_millis(100));
    // REQ then downstream_timeout (WARN) then RSP: 3 events for one silent transaction.
    assert_eq!(sink.0.load(Ordering::SeqCst), 3);
}

#[test]
fn pacing_enforces_minimum_interval_between_transactions() {
    // Scenario 4 / P1: the gap between transaction N finishing and N+1
    // starting is >= min_cmd_period.
    let (downstream_client, downstream_server) = loopback_pair();
    let response = crc::append(&[0x01, 0x03, 0x02, 0x00, 0x01]);
    fake_inverter_fixed_response(downstream_server, response);

    let min_cmd_period = Duration::from_millis(250);
    let events = EventHub::new(vec![]);
    let handle = spawn_arbiter(downstream_client, min_cmd_period, Duration::from_secs(1), events);

    let request = crc::append(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x01]);

    let t0 = std::time::Instant::now();
    handle.transact("test", request.clone());
    let after_first = t0.elapsed();
    handle.transact("test", request);
    let after_second = t0.elapsed();

    assert!(
        after_second - after_first >= min_cmd_period - Duration::from_millis(10),
        "second transaction started only {:?} after the first completed",
        after_second - after_first
    );
}

#[test]
fn concurrent_requests_never_interleave_on_the_wire() {
    // Scenario 6: two concurrent callers, min_cmd_period = 0. The arbiter's
    // single worker thread must still serialize them so neither request's
    // bytes interleave with the other's on the wire.
    let (downstream_client, downstream_server) = loopback_pair();

    // Fake inverter: for every CRC-valid frame it reads, write back a
    // response tagged with that frame's unit byte so callers can confirm
    // their own request was answered intact (no interleaving garbage).
    std::thread::spawn(move || {
        let mut inverter_side = downstream_server;
        let mut framer = Framer::new(char_time(115_200, 8, 1, false));
        for _ in 0..2 {
            match framer.read_frame(&mut inverter_side, Duration::from_secs(5)) {
                Ok(Some(request)) => {
                    let unit = request[0];
                    let response = crc::append(&[unit, 0x03, 0x02, 0x00, unit as u16 as u8]);
                    let _ = inverter_side.write_all(&response);
                }
                _ => return,
            }
        }
    });

    let events = EventHub::new(vec![]);
    let handle = spawn_arbiter(downstream_client, Duration::from_millis(0), Duration::from_secs(1), events);

    let handle_a = handle.clone();
    let handle_b = handle.clone();
    let request_a = crc::append(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x01]);
    let request_b = crc::append(&[0x02, 0x03, 0x00, 0x00, 0x00, 0x01]);

    let t1 = std::thread::spawn(move || handle_a.transact("client-a", request_a));
    let t2 = std::thread::spawn(move || handle_b.transact("client-b", request_b));

    let got_a = t1.join().unwrap().expect("client a response");
    let got_b = t2.join().unwrap().expect("client b response");

    assert!(crc::verify(&got_a));
    assert!(crc::verify(&got_b));
    assert_eq!(got_a[0], 0x01);
    assert_eq!(got_b[0], 0x02);
}

/// P4 / scenario 1, through the real MBAP wire protocol rather than calling
/// the arbiter directly: a TCP client's `tid`/`pid` must come back unchanged.
#[tokio::test]
async fn mbap_client_round_trips_through_the_real_tcp_endpoint() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let (downstream_client, downstream_server) = loopback_pair();
    let response = crc::append(&[0x01, 0x03, 0x04, 0x00, 0x01, 0x00, 0x02]);
    fake_inverter_fixed_response(downstream_server, response);

    let events = EventHub::new(vec![]);
    let handle = spawn_arbiter(downstream_client, Duration::from_millis(0), Duration::from_millis(500), events.clone());

    // Reserve a free port, then hand it to the real `tcp::serve` listener loop.
    let reserved = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let bound_addr = reserved.local_addr().unwrap();
    drop(reserved);
    tokio::spawn(async move {
        let _ = growatt_broker::tcp::serve(bound_addr, handle, events).await;
    });
    tokio::time::sleep(Duration::from_millis(30)).await;

    let mut client = tokio::net::TcpStream::connect(bound_addr).await.unwrap();
    let tid: u16 = 0x55AA;
    let mut mbap_request = Vec::new();
    mbap_request.extend_from_slice(&tid.to_be_bytes()); // tid
    mbap_request.extend_from_slice(&0u16.to_be_bytes()); // pid
    mbap_request.extend_from_slice(&6u16.to_be_bytes()); // length = unit + pdu(5)
    mbap_request.push(0x01); // unit
    mbap_request.extend_from_slice(&[0x03, 0x00, 0x00, 0x00, 0x02]); // read_holding addr=0 count=2

    client.write_all(&mbap_request).await.unwrap();

    let mut header = [0u8; 7];
    client.read_exact(&mut header).await.unwrap();
    let got_tid = u16::from_be_bytes([header[0], header[1]]);
    let got_pid = u16::from_be_bytes([header[2], header[3]]);
    let length = u16::from_be_bytes([header[4], header[5]]);
    assert_eq!(got_tid, tid);
    assert_eq!(got_pid, 0);

    let mut pdu = vec![0u8; (length - 1) as usize];
    client.read_exact(&mut pdu).await.unwrap();
    assert_eq!(pdu, vec![0x03, 0x04, 0x00, 0x01, 0x00, 0x02]);
}
