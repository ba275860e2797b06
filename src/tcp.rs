//! Modbus-TCP endpoint (C7): listens on one or more addresses, bridges each
//! connection's MBAP requests to the downstream arbiter. Grounded on the
//! teacher's `tokio`-based accept-loop style used throughout its daemon
//! modules, generalized from a single protocol daemon to per-connection MBAP
//! framing with a hard per-read timeout.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::arbiter::ArbiterHandle;
use crate::events::{EventHub, Role};
use crate::events::EventBuilder;
use crate::rtu::mbap::{rtu_response_to_mbap, MbapRequest};

const READ_TIMEOUT: Duration = Duration::from_secs(3);
const LISTEN_BACKLOG_HINT: &str = "backlog >= 8 is handled by the OS default";

/// Bind `addr` and accept connections forever, spawning one task per
/// connection. Intended to run inside a `tokio` runtime as its own task.
pub async fn serve(addr: SocketAddr, arbiter: ArbiterHandle, events: EventHub) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    log::info!("tcp endpoint listening on {addr} ({LISTEN_BACKLOG_HINT})");
    loop {
        let (stream, peer) = listener.accept().await?;
        let arbiter = arbiter.clone();
        let events = events.clone();
        tokio::spawn(async move {
            let client = format!("tcp:{peer}");
            if let Err(err) = handle_connection(stream, &client, arbiter, events).await {
                log::debug!("tcp connection {client} closed: {err}");
            }
        });
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    client: &str,
    arbiter: ArbiterHandle,
    events: EventHub,
) -> std::io::Result<()> {
    loop {
        let mut header = [0u8; 7];
        match tokio::time::timeout(READ_TIMEOUT, stream.read_exact(&mut header)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(err),
            Err(_) => return Ok(()),
        }

        let (tid, pid, length, unit) = match MbapRequest::parse_header(&header) {
            Ok(parsed) => parsed,
            Err(err) => {
                log::debug!("{client} sent invalid mbap header: {err}");
                return Ok(());
            }
        };

        let mut pdu = vec![0u8; (length - 1) as usize];
        match tokio::time::timeout(READ_TIMEOUT, stream.read_exact(&mut pdu)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(err),
            Err(_) => return Ok(()),
        }

        let request = MbapRequest { tid, pid, unit, pdu };
        let rtu_request = request.to_rtu_request();

        let response = arbiter.transact_async(client, rtu_request).await;
        let Some(rtu_response) = response else {
            return Ok(());
        };

        let Some(mbap_response) = rtu_response_to_mbap(tid, pid, &rtu_response) else {
            events.emit(
                EventBuilder::new(Role::Warn, client)
                    .kind("downstream_timeout")
                    .crc_ok(false),
            );
            return Ok(());
        };

        stream.write_all(&mbap_response).await?;
    }
}
