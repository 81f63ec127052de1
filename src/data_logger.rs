use crate::types::*;
use crossbeam_channel::Receiver;
use log::{error, info};
use serde_json::json;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Writes a session directory with a config manifest, a JSONL stream of
/// compact snapshots, and final run statistics.
pub struct DataLogger {
    rx: Receiver<Snapshot>,
    session_dir: PathBuf,
    config: SequencerConfig,
}

impl DataLogger {
    pub fn new(rx: Receiver<Snapshot>, output_dir: &Path, config: SequencerConfig) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let session_dir = output_dir.join(format!("session_{}", timestamp));
        fs::create_dir_all(&session_dir).expect("create session dir");

        Self {
            rx,
            session_dir,
            config,
        }
    }

    /// Run the logger. Blocks the calling thread until the snapshot
    /// channel closes.
    pub fn run(&self) {
        info!("Data logger → {:?}", self.session_dir);

        self.write_manifest();

        let snapshots_path = self.session_dir.join("snapshots.jsonl");
        let snapshots_file = File::create(&snapshots_path).expect("create snapshots file");
        let mut writer = BufWriter::new(snapshots_file);

        let mut line_count: u64 = 0;
        let mut last: Option<Snapshot> = None;

        for snap in self.rx.iter() {
            let compact = CompactSnapshot::from(&snap);
            let line = serde_json::to_string(&compact).unwrap();
            let _ = writeln!(writer, "{}", line);
            line_count += 1;
            last = Some(snap);

            if line_count % 1000 == 0 {
                let _ = writer.flush();
                info!("Logged {} snapshots", line_count);
            }
        }

        let _ = writer.flush();

        // Final run totals next to the stream
        let stats_path = self.session_dir.join("stats.json");
        let stats = match &last {
            Some(s) => json!({
                "total_snapshots": line_count,
                "final_counter": s.counter,
                "samples_processed": s.samples_processed,
                "achieved_rate_hz": s.achieved_rate,
                "accuracy_ratio": s.accuracy_ratio,
            }),
            None => json!({ "total_snapshots": 0 }),
        };
        fs::write(&stats_path, serde_json::to_string_pretty(&stats).unwrap())
            .unwrap_or_else(|e| error!("Failed to write stats: {}", e));

        info!(
            "Session saved: {} snapshots → {:?}",
            line_count, self.session_dir
        );
    }

    fn write_manifest(&self) {
        let manifest = json!({
            "version": env!("CARGO_PKG_VERSION"),
            "system": "ramp-counter",
            "sample_rate_hz": self.config.sample_rate,
            "note_durations": self.config.note_durations,
            "chunk_duration_ms": self.config.chunk_duration.as_millis() as u64,
            "update_interval_ms": self.config.update_interval.as_millis() as u64,
            "min_note_duration": self.config.min_note_duration,
        });

        let path = self.session_dir.join("manifest.json");
        fs::write(&path, serde_json::to_string_pretty(&manifest).unwrap())
            .expect("write manifest");
    }
}
