use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;

// ─── Configuration ──────────────────────────────────────────────────────────

/// Construction-time parameters for the sequencer core.
#[derive(Debug, Clone)]
pub struct SequencerConfig {
    /// Target counter rate in Hz
    pub sample_rate: u32,
    /// Initial note durations in samples, cycled in order. Length ≥ 1.
    pub note_durations: Vec<u64>,
    /// Wall-clock length of one pacing chunk
    pub chunk_duration: Duration,
    /// Minimum wall-clock spacing between published snapshots
    pub update_interval: Duration,
    /// Floor for jammed durations: updates below this are clamped up
    pub min_note_duration: u64,
}

impl SequencerConfig {
    pub fn new(sample_rate: u32, note_durations: Vec<u64>) -> Self {
        Self {
            sample_rate,
            note_durations,
            chunk_duration: Duration::from_millis(DEFAULT_CHUNK_MS),
            update_interval: Duration::from_millis(DEFAULT_UPDATE_MS),
            min_note_duration: MIN_NOTE_DURATION,
        }
    }

    /// Number of `advance()` calls per pacing chunk. Always at least 1,
    /// so very low rates still make progress.
    pub fn chunk_size(&self) -> u64 {
        let samples = self.sample_rate as f64 * self.chunk_duration.as_secs_f64();
        (samples.round() as u64).max(1)
    }

    pub fn validate(&self) -> Result<(), InvalidParameter> {
        if self.sample_rate == 0 {
            return Err(InvalidParameter::ZeroSampleRate);
        }
        if self.note_durations.is_empty() {
            return Err(InvalidParameter::EmptyDurations);
        }
        if self.note_durations.iter().any(|&d| d == 0) {
            return Err(InvalidParameter::ZeroDuration);
        }
        Ok(())
    }
}

// ─── Errors ─────────────────────────────────────────────────────────────────

/// A rejected configuration or jam parameter.
/// Always recovered locally: the prior valid state is retained.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidParameter {
    #[error("note index {index} out of range ({len} notes configured)")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("note duration must be positive")]
    ZeroDuration,
    #[error("note duration list must not be empty")]
    EmptyDurations,
    #[error("sample rate must be positive")]
    ZeroSampleRate,
}

// ─── Timing accounting ──────────────────────────────────────────────────────

/// Throughput accounting for a single run. Owned and updated only on the
/// clock thread; frozen into the final snapshot at stop.
#[derive(Debug, Clone)]
pub struct TimingStats {
    pub samples_processed: u64,
    run_start: Instant,
}

impl TimingStats {
    pub fn start() -> Self {
        Self {
            samples_processed: 0,
            run_start: Instant::now(),
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.run_start.elapsed().as_secs_f64()
    }

    /// Samples per second actually achieved over the run so far.
    pub fn achieved_rate(&self) -> f64 {
        let secs = self.elapsed_secs();
        if secs > 0.0 {
            self.samples_processed as f64 / secs
        } else {
            0.0
        }
    }

    /// Processed samples over the count expected at the target rate.
    /// 1.0 = on schedule; below 1.0 = the loop fell behind.
    pub fn accuracy_ratio(&self, target_rate: u32) -> f64 {
        let expected = self.elapsed_secs() * target_rate as f64;
        if expected > 0.0 {
            self.samples_processed as f64 / expected
        } else {
            1.0
        }
    }
}

// ─── Published state ────────────────────────────────────────────────────────

/// Complete point-in-time view of the core, published by the clock thread.
/// Readers receive whole snapshots, never individual fields, so a counter
/// value can never be observed paired with a stale note index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Microseconds since handle construction (session clock)
    pub timestamp_us: u64,
    /// Monotonic sample counter, reset only on start
    pub counter: u64,
    /// Index of the active note in `note_durations`
    pub note_index: usize,
    /// Normalized position within the active note, in [0, 1)
    pub phase: f64,
    /// Duration list in effect when the snapshot was taken
    pub note_durations: Vec<u64>,
    pub samples_processed: u64,
    /// Configured target rate (Hz)
    pub target_rate: u32,
    /// Achieved throughput over the run so far (Hz)
    pub achieved_rate: f64,
    /// Processed / expected sample count; < 1.0 when the loop fell behind
    pub accuracy_ratio: f64,
    pub is_running: bool,
    /// Tail of recent phase values for display ramps, at most
    /// `PHASE_TAIL_LEN` entries, oldest first
    pub recent_phases: Vec<f32>,
}

impl Snapshot {
    /// Zeroed snapshot for a sequencer that has not advanced yet.
    pub fn fresh(
        timestamp_us: u64,
        target_rate: u32,
        note_durations: Vec<u64>,
        is_running: bool,
    ) -> Self {
        Self {
            timestamp_us,
            counter: 0,
            note_index: 0,
            phase: 0.0,
            note_durations,
            samples_processed: 0,
            target_rate,
            achieved_rate: 0.0,
            accuracy_ratio: 1.0,
            is_running,
            recent_phases: Vec::new(),
        }
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "t={:>10}µs  c={:<10} note={} ph={:.4}  rate={:.0}Hz acc={:.3}  {}",
            self.timestamp_us,
            self.counter,
            self.note_index + 1,
            self.phase,
            self.achieved_rate,
            self.accuracy_ratio,
            if self.is_running { "RUN" } else { "STOP" },
        )
    }
}

// ─── Compact serialization ──────────────────────────────────────────────────

/// Short-key representation for JSONL session logging.
/// Field mapping: t=timestamp_us, c=counter, n=note_index, ph=phase,
/// d=note_durations, sp=samples_processed, tr=target_rate,
/// ar=achieved_rate, ac=accuracy_ratio, run=is_running.
/// `recent_phases` is display-only and deliberately not logged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactSnapshot {
    pub t: u64,
    pub c: u64,
    pub n: usize,
    pub ph: f64,
    pub d: Vec<u64>,
    pub sp: u64,
    pub tr: u32,
    pub ar: f64,
    pub ac: f64,
    pub run: bool,
}

impl From<&Snapshot> for CompactSnapshot {
    fn from(s: &Snapshot) -> Self {
        Self {
            t: s.timestamp_us,
            c: s.counter,
            n: s.note_index,
            ph: s.phase,
            d: s.note_durations.clone(),
            sp: s.samples_processed,
            tr: s.target_rate,
            ar: s.achieved_rate,
            ac: s.accuracy_ratio,
            run: s.is_running,
        }
    }
}

// ─── Inter-thread messages ──────────────────────────────────────────────────

/// Jam updates sent from the handle to the running clock thread, drained
/// at chunk boundaries. Values are validated and clamped before sending.
#[derive(Debug, Clone)]
pub enum ControlCommand {
    SetDuration { index: usize, value: u64 },
    ReplaceDurations(Vec<u64>),
}

// ─── Session clock ──────────────────────────────────────────────────────────

/// Monotonic clock for the sequencer session.
#[derive(Clone)]
pub struct SessionClock {
    start: Instant,
}

impl SessionClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn now_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Constants ──────────────────────────────────────────────────────────────

pub const DEFAULT_SAMPLE_RATE: u32 = 40_000;
pub const DEFAULT_NOTE_DURATIONS: [u64; 2] = [10_000, 20_000];
pub const DEFAULT_CHUNK_MS: u64 = 50;
pub const DEFAULT_UPDATE_MS: u64 = 50;

/// Jam policy floor. The original control surface stepped durations in
/// units of 1000 samples with this as its lower bound.
pub const MIN_NOTE_DURATION: u64 = 1000;

/// Capacity of the recent-phase tail carried in each snapshot.
pub const PHASE_TAIL_LEN: usize = 100;

/// Capacity of each subscriber's snapshot channel.
pub const SNAPSHOT_QUEUE: usize = 256;
