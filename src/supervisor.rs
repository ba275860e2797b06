//! Supervisor (C9): wires every component together from a [`Config`], owns
//! their lifetimes, and runs until signaled. Grounded on the teacher's
//! `main.rs` bootstrap sequence (open config, boot serial loop, boot
//! protocol daemons) generalized to this broker's component set.

use std::net::TcpListener as StdTcpListener;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::arbiter::{self, Arbiter, ArbiterHandle};
use crate::config::{Config, LogTarget};
use crate::events::sink::{BroadcastSink, EventSink, FileSink, StdoutSink};
use crate::events::EventHub;
use crate::rtu::framer::char_time;
use crate::rtu::Framer;
use crate::serial;
use crate::shine::ShineEndpoint;

/// Build the configured set of event sinks (§4.7, mode selection), plus the
/// sniff-relay broadcaster if `--sniff` names an address. Binds the sniff
/// listener and spawns its accept loop as a side effect.
fn build_sinks(config: &Config) -> Result<Vec<Arc<dyn EventSink>>> {
    let mut sinks: Vec<Arc<dyn EventSink>> = Vec::new();
    match &config.log_path {
        LogTarget::Stdout => sinks.push(Arc::new(StdoutSink::new())),
        LogTarget::Disabled => {}
        LogTarget::File(path) => match FileSink::open(path) {
            Ok(sink) => sinks.push(Arc::new(sink)),
            Err(err) => {
                log::error!("failed to open log file {}: {err}, falling back to stdout", path.display());
                sinks.push(Arc::new(StdoutSink::new()));
            }
        },
    }
    if let Some(addr) = config.sniff_addr {
        let sink = BroadcastSink::new();
        let listener = StdTcpListener::bind(addr).with_context(|| format!("failed to bind sniff relay {addr}"))?;
        log::info!("sniff relay listening on {addr}");
        let accept_sink = sink.clone();
        std::thread::Builder::new()
            .name("sniff-relay".into())
            .spawn(move || accept_sink.accept_loop(listener))
            .expect("failed to spawn sniff relay thread");
        sinks.push(sink);
    }
    Ok(sinks)
}

/// Build the arbiter and spawn its dedicated worker thread.
fn spawn_arbiter(config: &Config, events: EventHub) -> Result<ArbiterHandle> {
    let rtimeout = Duration::from_secs_f64(config.rtimeout_secs);
    let port = serial::open(&config.inverter_dev, config.inverter_framing)
        .with_context(|| format!("failed to open downstream port {}", config.inverter_dev))?;
    let framer = Framer::new(char_time(
        config.inverter_framing.baud,
        config.inverter_framing.data_bits,
        config.inverter_framing.stop_bits,
        config.inverter_framing.parity.bit(),
    ));
    let min_cmd_period = Duration::from_secs_f64(config.min_cmd_period_secs);
    let arbiter = Arbiter::new(port, framer, min_cmd_period, rtimeout, events);
    Ok(arbiter::spawn(arbiter))
}

fn spawn_shine(config: &Config, arbiter: ArbiterHandle, events: EventHub) {
    let Some(dev) = config.shine_dev.clone() else {
        return;
    };
    let framing = config.shine_framing;
    std::thread::Builder::new()
        .name("shine-endpoint".into())
        .spawn(move || ShineEndpoint::new(dev, framing, arbiter, events).run())
        .expect("failed to spawn shine endpoint thread");
}

/// Run the broker until a shutdown signal arrives. Binds all configured TCP
/// listeners on the current `tokio` runtime and blocks on `ctrl_c`/SIGTERM.
pub async fn run(config: Config) -> Result<()> {
    let hub = EventHub::new(build_sinks(&config)?);

    let arbiter = spawn_arbiter(&config, hub.clone())?;
    spawn_shine(&config, arbiter.clone(), hub.clone());

    let mut tcp_tasks = Vec::new();
    if let Some(addr) = config.tcp_addr {
        tcp_tasks.push(tokio::spawn(crate::tcp::serve(addr, arbiter.clone(), hub.clone())));
    }
    if let Some(addr) = config.tcp_alt_addr {
        tcp_tasks.push(tokio::spawn(crate::tcp::serve(addr, arbiter.clone(), hub.clone())));
    }

    wait_for_shutdown().await;
    log::info!("shutdown signal received, exiting");
    for task in tcp_tasks {
        task.abort();
    }
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
}
