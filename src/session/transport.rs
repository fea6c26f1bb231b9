//! Persistent message connection to the game server.
//!
//! Owns the TCP socket, line framing, the background receive loop and the
//! liveness probe loop. Any I/O failure closes the connection; reconnection
//! is the owner's job and always starts as a fresh connect attempt.

use crate::clock::Clock;
use crate::lock_or_recover;
use crate::log_debug;
use crate::session::protocol::ClientMessage;
use crate::session::router::ProtocolRouter;
use anyhow::{bail, Context, Result};
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

/// How often the receive loop polls the socket for available data.
pub const RECEIVE_POLL_INTERVAL_MILLIS: u64 = 250;

/// How often the probe loop wakes up; an idle interval of this length
/// triggers exactly one `StillAliveCheck` send.
pub const STILL_ALIVE_CHECK_INTERVAL_MILLIS: i64 = 1_500;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
/// Small read timeout so the availability poll never blocks writers for long.
const READ_POLL_TIMEOUT: Duration = Duration::from_millis(5);
/// Background loops sleep in slices this long so shutdown is prompt while the
/// 250ms/1500ms schedules hold.
const SHUTDOWN_POLL_SLICE: Duration = Duration::from_millis(50);

/// A silently dead peer looks idle rather than erroring, so the probe is due
/// once a full interval passed with no inbound data.
pub(super) fn probe_due(now_unix_millis: i64, last_inbound_unix_millis: i64) -> bool {
    now_unix_millis - last_inbound_unix_millis >= STILL_ALIVE_CHECK_INTERVAL_MILLIS
}

/// Live connection state. Holding all handles in one value makes
/// connected-ness a derived fact: the `Option` is either fully populated or
/// `None`, never half-open.
struct Connection {
    peer: SocketAddr,
    reader: TcpStream,
    writer: TcpStream,
    /// Partial trailing line carried across polls.
    read_buf: Vec<u8>,
}

struct TransportShared {
    conn: Mutex<Option<Connection>>,
    router: ProtocolRouter,
    clock: Arc<dyn Clock>,
    last_inbound_unix_millis: AtomicI64,
    shutdown: AtomicBool,
}

/// Persistent session transport with its two background loops.
pub struct SessionTransport {
    shared: Arc<TransportShared>,
    receive_thread: Option<thread::JoinHandle<()>>,
    probe_thread: Option<thread::JoinHandle<()>>,
}

impl SessionTransport {
    /// Spawn the receive and probe loops. The transport starts disconnected;
    /// call [`connect`](Self::connect) once discovery yields an endpoint.
    pub fn start(router: ProtocolRouter, clock: Arc<dyn Clock>) -> Self {
        let shared = Arc::new(TransportShared {
            conn: Mutex::new(None),
            router,
            last_inbound_unix_millis: AtomicI64::new(clock.now_unix_millis()),
            clock,
            shutdown: AtomicBool::new(false),
        });

        let receive_shared = Arc::clone(&shared);
        let receive_thread = thread::Builder::new()
            .name("micbridge-receive".to_string())
            .spawn(move || receive_loop(&receive_shared))
            .ok();

        let probe_shared = Arc::clone(&shared);
        let probe_thread = thread::Builder::new()
            .name("micbridge-probe".to_string())
            .spawn(move || probe_loop(&probe_shared))
            .ok();

        Self {
            shared,
            receive_thread,
            probe_thread,
        }
    }

    /// Open a fresh connection, replacing any existing one. On failure no
    /// partial state survives.
    pub fn connect(&self, endpoint: SocketAddr) -> Result<()> {
        let mut guard = lock_or_recover(&self.shared.conn, "transport connect");
        close_locked(&mut guard);

        let reader = TcpStream::connect_timeout(&endpoint, CONNECT_TIMEOUT)
            .with_context(|| format!("connect to {endpoint}"))?;
        // Pitch batches are tiny; coalescing them would add latency.
        reader.set_nodelay(true).context("set TCP_NODELAY")?;
        reader
            .set_read_timeout(Some(READ_POLL_TIMEOUT))
            .context("set read timeout")?;
        let writer = reader.try_clone().context("clone stream for writing")?;

        self.shared
            .last_inbound_unix_millis
            .store(self.shared.clock.now_unix_millis(), Ordering::Relaxed);
        *guard = Some(Connection {
            peer: endpoint,
            reader,
            writer,
            read_buf: Vec::new(),
        });
        log_debug(&format!("Connected to server at {endpoint}"));
        Ok(())
    }

    /// Serialize one message as a JSON line, write and flush. A failed write
    /// closes the connection; the caller triggers reconnection, not us.
    pub fn send(&self, message: &ClientMessage) -> Result<()> {
        let line = serde_json::to_string(message).context("encode outbound message")?;
        let mut guard = lock_or_recover(&self.shared.conn, "transport send");
        let Some(conn) = guard.as_mut() else {
            bail!("not connected");
        };
        if let Err(err) = write_line(conn, &line) {
            log_debug(&format!("Send failed, closing connection: {err}"));
            close_locked(&mut guard);
            return Err(err).context("send message");
        }
        Ok(())
    }

    /// Derived from connection presence; never stored as a separate flag.
    pub fn is_connected(&self) -> bool {
        lock_or_recover(&self.shared.conn, "transport is_connected").is_some()
    }

    pub fn peer_endpoint(&self) -> Option<SocketAddr> {
        lock_or_recover(&self.shared.conn, "transport peer_endpoint")
            .as_ref()
            .map(|conn| conn.peer)
    }

    pub fn close(&self) {
        let mut guard = lock_or_recover(&self.shared.conn, "transport close");
        close_locked(&mut guard);
    }

    /// Stop both background loops deterministically and drop the connection.
    pub fn shutdown(&mut self) {
        self.shared.shutdown.store(true, Ordering::Relaxed);
        self.close();
        if let Some(handle) = self.receive_thread.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.probe_thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SessionTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn write_line(conn: &mut Connection, line: &str) -> io::Result<()> {
    conn.writer.write_all(line.as_bytes())?;
    conn.writer.write_all(b"\n")?;
    conn.writer.flush()
}

fn close_locked(guard: &mut MutexGuard<'_, Option<Connection>>) {
    if let Some(conn) = guard.take() {
        let _ = conn.reader.shutdown(Shutdown::Both);
        log_debug("Closed network connection");
    }
}

/// Read everything currently available and split it into complete lines.
/// Returns the lines plus whether any bytes arrived at all.
fn drain_lines(conn: &mut Connection) -> io::Result<(Vec<String>, bool)> {
    let mut chunk = [0u8; 4096];
    let mut received_bytes = false;
    loop {
        match conn.reader.read(&mut chunk) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "peer closed connection",
                ))
            }
            Ok(n) => {
                received_bytes = true;
                conn.read_buf.extend_from_slice(&chunk[..n]);
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err)
                if err.kind() == io::ErrorKind::WouldBlock
                    || err.kind() == io::ErrorKind::TimedOut =>
            {
                break;
            }
            Err(err) => return Err(err),
        }
    }

    let mut lines = Vec::new();
    while let Some(newline_at) = conn.read_buf.iter().position(|&b| b == b'\n') {
        let record: Vec<u8> = conn.read_buf.drain(..=newline_at).collect();
        let line = String::from_utf8_lossy(&record).trim().to_string();
        if !line.is_empty() {
            lines.push(line);
        }
    }
    Ok((lines, received_bytes))
}

/// Poll for inbound records every [`RECEIVE_POLL_INTERVAL_MILLIS`] and route
/// them. Lines are routed outside the connection lock so sends from other
/// threads are not blocked by dispatch work.
fn receive_loop(shared: &TransportShared) {
    while !shared.shutdown.load(Ordering::Relaxed) {
        let lines = {
            let mut guard = lock_or_recover(&shared.conn, "receive loop");
            match guard.as_mut() {
                Some(conn) => match drain_lines(conn) {
                    Ok((lines, received_bytes)) => {
                        if received_bytes {
                            shared
                                .last_inbound_unix_millis
                                .store(shared.clock.now_unix_millis(), Ordering::Relaxed);
                        }
                        lines
                    }
                    Err(err) => {
                        log_debug(&format!("Read failed, closing connection: {err}"));
                        close_locked(&mut guard);
                        Vec::new()
                    }
                },
                None => Vec::new(),
            }
        };

        for line in &lines {
            shared.router.handle_line(line);
        }

        sleep_unless_shutdown(
            &shared.shutdown,
            Duration::from_millis(RECEIVE_POLL_INTERVAL_MILLIS),
        );
    }
}

/// Send one no-op probe per idle interval. A send failure means the peer is
/// dead even though the socket looked healthy (TCP half-open); `send` already
/// closed the connection in that case.
fn probe_loop(shared: &TransportShared) {
    while !shared.shutdown.load(Ordering::Relaxed) {
        sleep_unless_shutdown(
            &shared.shutdown,
            Duration::from_millis(STILL_ALIVE_CHECK_INTERVAL_MILLIS as u64),
        );
        if shared.shutdown.load(Ordering::Relaxed) {
            break;
        }

        let connected = lock_or_recover(&shared.conn, "probe loop").is_some();
        if !connected {
            continue;
        }
        let last_inbound = shared.last_inbound_unix_millis.load(Ordering::Relaxed);
        if !probe_due(shared.clock.now_unix_millis(), last_inbound) {
            continue;
        }

        let line = match serde_json::to_string(&ClientMessage::StillAliveCheck) {
            Ok(line) => line,
            Err(_) => continue,
        };
        let mut guard = lock_or_recover(&shared.conn, "probe send");
        let Some(conn) = guard.as_mut() else {
            continue;
        };
        if let Err(err) = write_line(conn, &line) {
            log_debug(&format!(
                "Still-alive check failed, closing connection: {err}"
            ));
            close_locked(&mut guard);
        }
    }
}

fn sleep_unless_shutdown(shutdown: &AtomicBool, total: Duration) {
    let started = Instant::now();
    while started.elapsed() < total {
        if shutdown.load(Ordering::Relaxed) {
            return;
        }
        let remaining = total.saturating_sub(started.elapsed());
        thread::sleep(remaining.min(SHUTDOWN_POLL_SLICE));
    }
}
