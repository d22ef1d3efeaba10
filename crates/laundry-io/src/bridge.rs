use crate::channel::ChannelSet;
use crate::metrics::BRIDGE_CONNECTED;
use crate::protocol::{IncomingMessage, StateMsg};
use crate::sensor::Published;
use laundry_core::{ApplianceKind, TimeBase};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Longest unterminated line accepted from a client.
const MAX_LINE_BYTES: usize = 64 * 1024;

pub struct BridgeConfig {
    pub bind_addr: String,
    pub poll_interval: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:7010".to_string(),
            poll_interval: Duration::from_millis(5),
        }
    }
}

/// Outbound `state` lines not yet written to the client.
#[derive(Debug, Default)]
struct Outbox {
    buf: Vec<u8>,
    offset: usize,
    sequence: u64,
}

impl Outbox {
    fn queue(&mut self, appliance: ApplianceKind, state: Published, unix_us: u64) {
        self.sequence = self.sequence.wrapping_add(1);
        match StateMsg::new(self.sequence, appliance, state, unix_us).encode() {
            Ok(line) => self.buf.extend_from_slice(&line),
            Err(e) => warn!(error = %e, "Dropping state message"),
        }
    }

    fn pending(&self) -> &[u8] {
        &self.buf[self.offset..]
    }

    fn advance(&mut self, n: usize) {
        self.offset += n;
        if self.offset >= self.buf.len() {
            self.buf.clear();
            self.offset = 0;
        }
    }

    fn reset(&mut self) {
        self.buf.clear();
        self.offset = 0;
    }
}

/// Bind the bridge listener. Separate from [`serve`] so callers can learn the
/// bound address first.
pub fn bind(config: &BridgeConfig) -> io::Result<TcpListener> {
    let listener = TcpListener::bind(&config.bind_addr)?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}

pub fn run_bridge(
    channels: ChannelSet,
    timebase: TimeBase,
    config: BridgeConfig,
    stop: Arc<AtomicBool>,
    on_change: impl FnMut(ApplianceKind, Published),
) -> io::Result<()> {
    let listener = bind(&config)?;
    serve(listener, channels, timebase, config.poll_interval, stop, on_change)
}

/// Serve one client at a time until `stop` is set.
///
/// Every published change is handed to `on_change`, whether or not a client
/// is connected.
pub fn serve(
    listener: TcpListener,
    mut channels: ChannelSet,
    timebase: TimeBase,
    poll_interval: Duration,
    stop: Arc<AtomicBool>,
    mut on_change: impl FnMut(ApplianceKind, Published),
) -> io::Result<()> {
    let addr: SocketAddr = listener.local_addr()?;
    info!(addr = %addr, "Bridge listening");

    let mut client: Option<TcpStream> = None;
    let mut recv_buf: Vec<u8> = Vec::with_capacity(4096);
    let mut outbox = Outbox::default();

    loop {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        if client.is_none() {
            match listener.accept() {
                Ok((stream, addr)) => match stream.set_nonblocking(true) {
                    Ok(()) => {
                        info!(client_addr = %addr, "Bridge client connected");
                        BRIDGE_CONNECTED.set(1.0);
                        for channel in channels.iter() {
                            outbox.queue(channel.kind(), channel.current(), timebase.unix_us());
                        }
                        client = Some(stream);
                    }
                    Err(err) => warn!(error = %err, "Failed to set client nonblocking"),
                },
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {}
                Err(err) => {
                    warn!("Bridge accept error: {}", err);
                }
            }
        }

        let mut changes = channels.fire_due(timebase.now());

        let mut drop_client = false;
        if let Some(stream) = client.as_mut() {
            // Receive data
            let mut temp = [0u8; 1024];
            match stream.read(&mut temp) {
                Ok(0) => {
                    info!("Bridge client disconnected");
                    drop_client = true;
                }
                Ok(n) => {
                    recv_buf.extend_from_slice(&temp[..n]);
                    while let Some(pos) = recv_buf.iter().position(|b| *b == b'\n') {
                        let line = recv_buf.drain(..=pos).collect::<Vec<u8>>();
                        let Ok(text) = std::str::from_utf8(&line) else {
                            debug!("Ignoring non-UTF-8 line");
                            continue;
                        };
                        let trimmed = text.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        match IncomingMessage::parse(trimmed) {
                            Some(msg) => {
                                changes.extend(handle_incoming(msg, &mut channels, &timebase));
                            }
                            None => debug!(line = %trimmed, "Ignoring unrecognised line"),
                        }
                    }
                    if recv_buf.len() > MAX_LINE_BYTES {
                        debug!(buffered = recv_buf.len(), "Dropping client: line exceeds limit");
                        drop_client = true;
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {}
                Err(err) => {
                    warn!(error = %err, "Bridge read error");
                    drop_client = true;
                }
            }
        }

        for (kind, published) in changes {
            on_change(kind, published);
            if client.is_some() && !drop_client {
                outbox.queue(kind, published, timebase.unix_us());
            }
        }

        if let Some(stream) = client.as_mut() {
            if !drop_client && !outbox.pending().is_empty() {
                match stream.write(outbox.pending()) {
                    Ok(0) => {
                        info!("Bridge client disconnected");
                        drop_client = true;
                    }
                    Ok(n) => outbox.advance(n),
                    Err(err) if err.kind() == io::ErrorKind::WouldBlock => {}
                    Err(err) => {
                        warn!(error = %err, "Bridge write error");
                        drop_client = true;
                    }
                }
            }
        }

        if drop_client {
            client = None;
            recv_buf.clear();
            outbox.reset();
            BRIDGE_CONNECTED.set(0.0);
        }

        std::thread::sleep(poll_interval);
    }

    info!("Bridge stopped");
    Ok(())
}

#[instrument(skip(channels, timebase))]
fn handle_incoming(
    msg: IncomingMessage,
    channels: &mut ChannelSet,
    timebase: &TimeBase,
) -> Vec<(ApplianceKind, Published)> {
    let now = timebase.now();
    match msg {
        IncomingMessage::Hello(hello) => {
            if !hello.protocol_version.is_supported() {
                warn!(
                    major = hello.protocol_version.major,
                    minor = hello.protocol_version.minor,
                    "Unsupported protocol version"
                );
                return Vec::new();
            }
            info!(client_id = ?hello.client_id, "Bridge handshake received");
            Vec::new()
        }
        IncomingMessage::Power(power) => {
            let Some(channel) = channels.get_mut(power.appliance) else {
                return Vec::new();
            };
            match channel.on_power(now, &power.state) {
                Ok(changed) => changed
                    .into_iter()
                    .map(|published| (power.appliance, published))
                    .collect(),
                Err(e) => {
                    warn!(error = %e, "Power update rejected");
                    Vec::new()
                }
            }
        }
        IncomingMessage::Door(door) => {
            if !door.is_opening() {
                debug!(appliance = %door.appliance, new_state = %door.new_state, "Door event ignored");
                return Vec::new();
            }
            let Some(channel) = channels.get_mut(door.appliance) else {
                return Vec::new();
            };
            match channel.on_door_opened(now) {
                Ok(changed) => changed
                    .into_iter()
                    .map(|published| (door.appliance, published))
                    .collect(),
                Err(e) => {
                    warn!(error = %e, "Door event rejected");
                    Vec::new()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use laundry_core::{ApplianceState, ThresholdsConfig};
    use std::io::{BufRead, BufReader};
    use std::sync::mpsc;

    fn read_json(reader: &mut impl BufRead) -> serde_json::Value {
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        serde_json::from_str(&line).unwrap()
    }

    #[test]
    fn client_sees_snapshot_then_changes() {
        let listener = bind(&BridgeConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            ..BridgeConfig::default()
        })
        .unwrap();
        let addr = listener.local_addr().unwrap();
        let channels = ChannelSet::new(&ThresholdsConfig::default()).unwrap();
        let stop = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel();

        let server = {
            let stop = stop.clone();
            std::thread::spawn(move || {
                serve(
                    listener,
                    channels,
                    TimeBase::new(),
                    Duration::from_millis(5),
                    stop,
                    move |kind, published| {
                        let _ = tx.send((kind, published));
                    },
                )
            })
        };

        let mut stream = TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());

        let first = read_json(&mut reader);
        let second = read_json(&mut reader);
        assert_eq!(first["type"], "state");
        assert_eq!(first["sequence"], 1);
        assert_eq!(first["entity"], "laundry.washer");
        assert_eq!(first["state"], "off");
        assert_eq!(second["entity"], "laundry.dryer");

        writeln!(stream, "not json").unwrap();
        writeln!(
            stream,
            "{}",
            serde_json::json!({"type": "power", "appliance": "washer", "state": "520"})
        )
        .unwrap();

        let change = read_json(&mut reader);
        assert_eq!(change["appliance"], "washer");
        assert_eq!(change["state"], "on");
        assert_eq!(change["sequence"], 3);

        stop.store(true, Ordering::Relaxed);
        server.join().unwrap().unwrap();
        let seen: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            seen,
            vec![(ApplianceKind::Washer, Published::Appliance(ApplianceState::On))]
        );
    }

    #[test]
    fn oversized_line_drops_client() {
        let listener = bind(&BridgeConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            ..BridgeConfig::default()
        })
        .unwrap();
        let addr = listener.local_addr().unwrap();
        let channels = ChannelSet::new(&ThresholdsConfig::default()).unwrap();
        let stop = Arc::new(AtomicBool::new(false));

        let server = {
            let stop = stop.clone();
            std::thread::spawn(move || {
                serve(
                    listener,
                    channels,
                    TimeBase::new(),
                    Duration::from_millis(1),
                    stop,
                    |_, _| {},
                )
            })
        };

        let mut stream = TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        read_json(&mut reader);
        read_json(&mut reader);

        // The server may reset the connection mid-write.
        let _ = stream.write_all(&vec![b'x'; MAX_LINE_BYTES + 4096]);
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) => {}
            Ok(_) => panic!("unexpected line {line:?}"),
            Err(e) => assert!(
                !matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut),
                "client was not dropped: {e}"
            ),
        }

        // The bridge keeps serving new clients.
        let fresh = TcpStream::connect(addr).unwrap();
        fresh
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let snapshot = read_json(&mut BufReader::new(fresh));
        assert_eq!(snapshot["entity"], "laundry.washer");

        stop.store(true, Ordering::Relaxed);
        server.join().unwrap().unwrap();
    }
}
