//! Event sinks: stdout JSONL, file JSONL, and the C8 sniff-relay broadcaster.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use super::Event;

/// One-operation sink capability: every sink variant implements this.
pub trait EventSink: Send + Sync {
    fn handle(&self, event: &Event);
}

fn serialize(event: &Event) -> Option<String> {
    match serde_json::to_string(event) {
        Ok(line) => Some(line),
        Err(err) => {
            log::warn!("failed to serialize event: {err}");
            None
        }
    }
}

/// One JSONL line per event on stdout, flushed after each write.
pub struct StdoutSink {
    lock: Mutex<()>,
}

impl StdoutSink {
    pub fn new() -> Self {
        Self { lock: Mutex::new(()) }
    }
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for StdoutSink {
    fn handle(&self, event: &Event) {
        let Some(line) = serialize(event) else {
            return;
        };
        let _guard = self.lock.lock();
        let mut stdout = std::io::stdout();
        if writeln!(stdout, "{line}").is_err() {
            return;
        }
        let _ = stdout.flush();
    }
}

/// Append-only JSONL file sink. Creates its parent directory at open time
/// and serializes writes so concurrent emitters never interleave partial
/// lines.
pub struct FileSink {
    file: Mutex<File>,
}

impl FileSink {
    pub fn open(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl EventSink for FileSink {
    fn handle(&self, event: &Event) {
        let Some(line) = serialize(event) else {
            return;
        };
        let mut file = self.file.lock();
        if let Err(err) = writeln!(file, "{line}") {
            log::warn!("file sink write failed: {err}");
        }
    }
}

/// C8 sniff relay: broadcasts every event as a JSONL line to all connected
/// TCP observers. Observers are never read from.
pub struct BroadcastSink {
    observers: Mutex<Vec<TcpStream>>,
}

impl BroadcastSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            observers: Mutex::new(Vec::new()),
        })
    }

    /// Accept observers forever on the calling thread. The supervisor spawns
    /// this on a dedicated OS thread.
    pub fn accept_loop(self: &Arc<Self>, listener: TcpListener) {
        for incoming in listener.incoming() {
            match incoming {
                Ok(stream) => {
                    log::info!("sniff observer connected: {:?}", stream.peer_addr());
                    self.observers.lock().push(stream);
                }
                Err(err) => log::warn!("sniff accept error: {err}"),
            }
        }
    }
}

impl EventSink for BroadcastSink {
    fn handle(&self, event: &Event) {
        let Some(line) = serialize(event) else {
            return;
        };
        let mut payload = line.into_bytes();
        payload.push(b'\n');

        // Snapshot the observer list, write outside the lock, then prune
        // dead observers under lock afterwards.
        let snapshot: Vec<Option<TcpStream>> = {
            let guard = self.observers.lock();
            guard.iter().map(|s| s.try_clone().ok()).collect()
        };

        let mut alive = vec![true; snapshot.len()];
        for (idx, slot) in snapshot.into_iter().enumerate() {
            match slot {
                Some(mut stream) if stream.write_all(&payload).is_ok() => {}
                _ => alive[idx] = false,
            }
        }

        if alive.iter().any(|ok| !ok) {
            let mut guard = self.observers.lock();
            let mut idx = 0;
            guard.retain(|_| {
                let keep = idx >= alive.len() || alive[idx];
                idx += 1;
                keep
            });
        }
    }
}
