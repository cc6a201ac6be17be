/*
Plays the part of the Simulink model: connects once, then every tick sends a synthetic
three phase record and reads back the GUI's value, and closes at the end.

Usage:
    cargo run --bin sim_tick_driver -- --ticks 500 --rate-hz 50
*/

use clap::Parser;
use common::constants::RECORD_LEN;
use common::ports::{SERVER_TCP_IP, TCP_PORT};
use gui_client::{ClientConfig, GuiClient, ReadPolicy, TelemetryRecord};
use log::{debug, info};
use rand::Rng;
use std::f64::consts::{PI, SQRT_2};
use std::thread;
use std::time::Duration;

const MAINS_FREQUENCY_HZ: f64 = 50.0;
const PHASE_VOLTAGE_RMS: f64 = 230.0;
const PHASE_CURRENT_RMS: f64 = 10.0;
/// Simulated spread of the frequency estimates around mains
const F0_JITTER_HZ: f64 = 0.05;

#[derive(Parser, Debug)]
#[command(about = "Drive the GUI link the way the Simulink model does")]
struct Args {
    #[arg(long, default_value = SERVER_TCP_IP)]
    ip: String,
    #[arg(long, default_value_t = TCP_PORT)]
    port: u16,
    #[arg(long, default_value_t = 100)]
    ticks: u64,
    /// Simulation step rate
    #[arg(long, default_value_t = 10.0)]
    rate_hz: f64,
    /// Only send, never block on a reply
    #[arg(long)]
    no_receive: bool,
    /// Take one read per reply even if it comes back short
    #[arg(long)]
    single_read: bool,
    #[arg(long, default_value = "dev_tools/sim_tick_driver/logs")]
    log_dir: String,
}

/// Sleep between ticks for a step rate in Hz
fn tick_period(rate_hz: f64) -> Result<Duration, String> {
    if !(rate_hz.is_finite() && rate_hz > 0.0) {
        return Err(format!("--rate-hz must be a positive number, got {}", rate_hz));
    }
    Duration::try_from_secs_f64(1.0 / rate_hz)
        .map_err(|e| format!("--rate-hz {} gives no usable tick period: {}", rate_hz, e))
}

/// Record for simulation time `t` seconds: balanced three phase voltages and currents
fn synthetic_record(t: f64, rng: &mut impl Rng) -> TelemetryRecord {
    let omega = 2.0 * PI * MAINS_FREQUENCY_HZ;
    let mut values = [0.0; RECORD_LEN];
    values[0] = t;
    for phase in 0..3 {
        let shift = phase as f64 * 2.0 * PI / 3.0;
        values[1 + phase] = PHASE_VOLTAGE_RMS * SQRT_2 * (omega * t - shift).sin();
        values[4 + phase] = PHASE_CURRENT_RMS * SQRT_2 * (omega * t - shift - PI / 6.0).sin();
    }
    for f0 in values[7..].iter_mut() {
        *f0 = MAINS_FREQUENCY_HZ + rng.gen_range(-F0_JITTER_HZ..=F0_JITTER_HZ);
    }
    TelemetryRecord::from_values(values)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let step = tick_period(args.rate_hz)?;
    logging::init_logger(&args.log_dir)?;
    info!("Beginning simulated tick loop...");

    let read_policy = if args.single_read {
        ReadPolicy::SingleRead
    } else {
        ReadPolicy::Exact
    };
    let mut client = GuiClient::new(ClientConfig {
        ip: args.ip,
        port: args.port,
    })
    .with_read_policy(read_policy);
    let mut rng = rand::thread_rng();

    client.connect()?;
    for tick in 0..args.ticks {
        let t = tick as f64 * step.as_secs_f64();
        client.send(&synthetic_record(t, &mut rng))?;
        if !args.no_receive {
            let value = client.receive()?;
            debug!("Tick {}: GUI sent {}", tick, value);
        }
        thread::sleep(step);
    }
    client.close();

    info!("Sent {} records", args.ticks);
    Ok(())
}
