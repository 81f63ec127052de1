use ramp_counter::console_display;
use ramp_counter::data_logger;
use ramp_counter::handle::SequencerHandle;
use ramp_counter::types::*;

use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "ramp-counter")]
#[command(about = "Jammable ramp counter with drift-corrected sample-rate pacing")]
struct Cli {
    /// Target counter rate (Hz)
    #[arg(long, default_value_t = DEFAULT_SAMPLE_RATE)]
    rate: u32,

    /// Note durations in samples, comma-separated
    #[arg(long, default_value = "10000,20000", value_delimiter = ',')]
    notes: Vec<u64>,

    /// Pacing chunk length (ms)
    #[arg(long, default_value_t = DEFAULT_CHUNK_MS)]
    chunk_ms: u64,

    /// Snapshot publication interval (ms)
    #[arg(long, default_value_t = DEFAULT_UPDATE_MS)]
    update_ms: u64,

    /// Enable the console dashboard
    #[arg(long)]
    console: bool,

    /// Console refresh rate (Hz)
    #[arg(long, default_value_t = 20)]
    display_hz: u32,

    /// Enable session data logging
    #[arg(long)]
    log_data: bool,

    /// Output directory for logged sessions
    #[arg(long, default_value = "./sessions")]
    output_dir: PathBuf,

    /// Stop automatically after this many seconds (runs until Ctrl+C if unset)
    #[arg(long)]
    run_secs: Option<u64>,
}

fn main() {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .format_timestamp_millis()
    .init();

    let cli = Cli::parse();

    let mut config = SequencerConfig::new(cli.rate, cli.notes.clone());
    config.chunk_duration = Duration::from_millis(cli.chunk_ms);
    config.update_interval = Duration::from_millis(cli.update_ms);

    let mut handle = match SequencerHandle::new(config.clone()) {
        Ok(h) => h,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("═══════════════════════════════════════════════");
    info!("  RAMP COUNTER v{}", env!("CARGO_PKG_VERSION"));
    info!("  Target rate: {} Hz", cli.rate);
    info!("  Notes: {:?} samples", cli.notes);
    info!("  Chunk: {}ms, snapshots every {}ms", cli.chunk_ms, cli.update_ms);
    info!("═══════════════════════════════════════════════");

    let mut handles = Vec::new();

    // ─── Console dashboard (opt-in) ─────────────────────────────────
    if cli.console {
        let rx = handle.subscribe();
        let hz = cli.display_hz;
        handles.push(thread::Builder::new().name("display".into()).spawn(move || {
            console_display::ConsoleDisplay::new(rx, hz).run();
        }).unwrap());
    }

    // ─── Data logger (opt-in) ───────────────────────────────────────
    if cli.log_data {
        let rx = handle.subscribe();
        let output_dir = cli.output_dir.clone();
        let cfg = config.clone();
        handles.push(thread::Builder::new().name("logger".into()).spawn(move || {
            data_logger::DataLogger::new(rx, &output_dir, cfg).run();
        }).unwrap());
    }

    handle.start();

    match cli.run_secs {
        Some(secs) => {
            thread::sleep(Duration::from_secs(secs));
            handle.stop();
            let last = handle.snapshot();
            info!(
                "Final: {} samples, {:.0} Hz achieved ({:.1}% of target)",
                last.samples_processed,
                last.achieved_rate,
                last.accuracy_ratio * 100.0
            );
        }
        None => {
            info!("Running until Ctrl+C.");
            loop {
                thread::sleep(Duration::from_secs(3600));
            }
        }
    }

    // Dropping the handle closes the snapshot channels; consumers drain
    // their queues and exit.
    drop(handle);
    for h in handles {
        let _ = h.join();
    }
}
