/*
Stand-in for the GUI / storage process, for exercising the Simulink driver blocks without the GUI.

Each tick the server sends one reply value first and then reads one telemetry record. Sending
first matters: the driver's read is blocking, so it must never wait on data that depends on
its own send. Reply values cycle through --reply, the way the GUI cycles through its input boxes.

Usage:
    cargo run --bin mock_gui_server -- --reply 0.5 --reply 0.75 --store records.jsonl
*/

use chrono::Utc;
use clap::Parser;
use common::constants::RECORD_SIZE;
use common::ports::{SERVER_TCP_IP, TCP_PORT};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Error, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tcp_interface::{bind_listener, Interface, TcpInterface};
use telemetry_record::{decode_reply, encode_reply, TelemetryRecord};

/// Records kept in memory before the history is cut back to the view window
const MAX_BUFFER_LENGTH: usize = 10000;
/// Most recent records the GUI plots, kept when the history is cut back
const N_SAMPLES_IN_VIEW: usize = 100;

#[derive(Parser, Debug)]
#[command(about = "Mock GUI server for the Simulink telemetry link")]
struct Args {
    #[arg(long, default_value = SERVER_TCP_IP)]
    ip: String,
    #[arg(long, default_value_t = TCP_PORT)]
    port: u16,
    /// Value sent back each tick, repeat to cycle through several
    #[arg(long = "reply", default_values_t = vec![0.0], allow_negative_numbers = true)]
    replies: Vec<f64>,
    /// Append every received record to this file as JSON lines
    #[arg(long)]
    store: Option<PathBuf>,
    /// Stop after this many records
    #[arg(long)]
    ticks: Option<u64>,
    /// Serve one driver connection, then exit
    #[arg(long)]
    once: bool,
    #[arg(long, default_value = "dev_tools/mock_gui_server/logs")]
    log_dir: String,
}

#[derive(Serialize)]
struct StoredRecord<'a> {
    time: String,
    tick: u64,
    record: &'a TelemetryRecord,
}

/// JSON lines file of every record received
struct RecordStore {
    writer: BufWriter<File>,
}

impl RecordStore {
    fn open(path: &Path) -> Result<RecordStore, Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().append(true).create(true).open(path)?;
        Ok(RecordStore {
            writer: BufWriter::new(file),
        })
    }

    fn append(&mut self, tick: u64, record: &TelemetryRecord) -> Result<(), Error> {
        let line = StoredRecord {
            time: Utc::now().to_rfc3339(),
            tick,
            record,
        };
        serde_json::to_writer(&mut self.writer, &line)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
enum PeerOutcome {
    Disconnected,
    TickLimitReached,
}

struct MockGuiServer {
    replies: Vec<f64>,
    next_reply: usize,
    store: Option<RecordStore>,
    history: VecDeque<TelemetryRecord>,
    ticks: u64,
    max_ticks: Option<u64>,
}

impl MockGuiServer {
    fn new(replies: Vec<f64>, store: Option<RecordStore>, max_ticks: Option<u64>) -> Self {
        MockGuiServer {
            replies,
            next_reply: 0,
            store,
            history: VecDeque::new(),
            ticks: 0,
            max_ticks,
        }
    }

    fn next_reply(&mut self) -> f64 {
        if self.replies.is_empty() {
            return 0.0;
        }
        let value = self.replies[self.next_reply % self.replies.len()];
        self.next_reply += 1;
        value
    }

    fn tick_limit_reached(&self) -> bool {
        self.max_ticks.is_some_and(|max| self.ticks >= max)
    }

    fn record_received(&mut self, record: TelemetryRecord) -> Result<(), Error> {
        self.ticks += 1;
        if let Some(store) = self.store.as_mut() {
            store.append(self.ticks, &record)?;
        }
        self.history.push_back(record);
        if self.history.len() > MAX_BUFFER_LENGTH {
            let excess = self.history.len() - N_SAMPLES_IN_VIEW;
            debug!("History full, dropping {} records", excess);
            self.history.drain(..excess);
        }
        Ok(())
    }

    /// The last records the GUI would have on screen, oldest first
    fn in_view(&self) -> impl Iterator<Item = &TelemetryRecord> {
        let skip = self.history.len().saturating_sub(N_SAMPLES_IN_VIEW);
        self.history.iter().skip(skip)
    }

    /// Run ticks against one connected driver until it goes away or the tick limit is hit.
    fn serve_peer<T: Interface>(&mut self, peer: &mut T) -> Result<PeerOutcome, Error> {
        let mut buffer = [0u8; RECORD_SIZE];
        while !self.tick_limit_reached() {
            let reply = self.next_reply();
            if let Err(e) = peer.send_all(&encode_reply(reply)) {
                return disconnect_or_fail(e);
            }
            if let Err(e) = peer.read_full(&mut buffer) {
                return disconnect_or_fail(e);
            }
            let record = TelemetryRecord::from_bytes(&buffer)
                .map_err(|e| Error::new(ErrorKind::InvalidData, e))?;
            debug!(
                "Tick {}: V={:?} I={:?} f0_V={:?} f0_I={:?}",
                self.ticks + 1,
                record.voltages,
                record.currents,
                record.f0_voltages,
                record.f0_currents
            );
            self.record_received(record)?;
        }
        Ok(PeerOutcome::TickLimitReached)
    }
}

fn disconnect_or_fail(e: Error) -> Result<PeerOutcome, Error> {
    match e.kind() {
        ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset | ErrorKind::BrokenPipe => {
            info!("Driver disconnected: {}", e);
            Ok(PeerOutcome::Disconnected)
        }
        _ => Err(e),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    logging::init_logger(&args.log_dir)?;
    info!("Beginning mock GUI server...");

    let store = match &args.store {
        Some(path) => Some(RecordStore::open(path)?),
        None => None,
    };
    let mut server = MockGuiServer::new(args.replies, store, args.ticks);
    let listener = bind_listener(&args.ip, args.port)?;

    loop {
        let mut peer = match TcpInterface::accept(&listener) {
            Ok(peer) => peer,
            Err(e) => {
                warn!("Connection failed: {}", e);
                continue;
            }
        };
        let outcome = server.serve_peer(&mut peer);
        peer.close();
        match outcome {
            Ok(PeerOutcome::TickLimitReached) => break,
            Ok(PeerOutcome::Disconnected) if args.once => break,
            Ok(PeerOutcome::Disconnected) => continue,
            Err(e) => {
                error!("Error serving driver: {}", e);
                return Err(e.into());
            }
        }
    }

    info!("Received {} records", server.ticks);
    let view: Vec<&TelemetryRecord> = server.in_view().collect();
    if let Some(last) = view.last() {
        let mean_v1 = view.iter().map(|r| r.voltages[0]).sum::<f64>() / view.len() as f64;
        info!(
            "Last record: {:?}, mean V1 over the last {} records: {}",
            last.values(),
            view.len(),
            mean_v1
        );
    }
    Ok(())
}
