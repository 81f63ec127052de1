use crate::clock::PacedClock;
use crate::sequencer::PhaseSequencer;
use crate::types::*;
use crossbeam_channel::{bounded, Receiver, Sender};
use log::info;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// Control surface for the sequencer core.
///
/// Owns the master note duration list and the published-snapshot slot,
/// and spawns one named clock thread per run. The clock thread is the
/// only mutator of sequencer state; this handle crosses the boundary
/// through exactly three points: the `Arc<Mutex<Snapshot>>` publication
/// slot (reads), a bounded command channel (jam writes), and an
/// `AtomicBool` stop flag observed at chunk boundaries.
///
/// `start()` on a running handle and `stop()` on a stopped one are
/// no-ops; a double-press must not corrupt state.
pub struct SequencerHandle {
    config: SequencerConfig,
    /// Master duration list. Jams land here first so runs started later
    /// pick them up; a running clock gets them via the command channel.
    durations: Vec<u64>,
    session: SessionClock,
    running: Arc<AtomicBool>,
    published: Arc<Mutex<Snapshot>>,
    subscribers: Vec<Sender<Snapshot>>,
    cmd_tx: Option<Sender<ControlCommand>>,
    thread: Option<JoinHandle<()>>,
}

impl SequencerHandle {
    /// Validates the configuration; an empty duration list, a zero
    /// duration, or a zero sample rate is fatal here.
    pub fn new(config: SequencerConfig) -> Result<Self, InvalidParameter> {
        config.validate()?;
        let durations = config.note_durations.clone();
        let session = SessionClock::new();
        let published = Arc::new(Mutex::new(Snapshot::fresh(
            session.now_us(),
            config.sample_rate,
            durations.clone(),
            false,
        )));
        Ok(Self {
            config,
            durations,
            session,
            running: Arc::new(AtomicBool::new(false)),
            published,
            subscribers: Vec::new(),
            cmd_tx: None,
            thread: None,
        })
    }

    /// Register a consumer for the rate-limited snapshot stream. Call
    /// before `start()`; the channel stays open across runs and closes
    /// when the handle is dropped. A slow consumer loses snapshots
    /// rather than stalling the clock.
    pub fn subscribe(&mut self) -> Receiver<Snapshot> {
        let (tx, rx) = bounded(SNAPSHOT_QUEUE);
        self.subscribers.push(tx);
        rx
    }

    /// Start a run: fresh sequencer state, fresh stats, new clock thread.
    /// No-op if already running.
    pub fn start(&mut self) {
        if self.running.load(Ordering::Acquire) {
            return;
        }
        // Reap the previous run's thread, if any.
        if let Some(h) = self.thread.take() {
            let _ = h.join();
        }

        let sequencer =
            PhaseSequencer::new(self.durations.clone(), self.config.min_note_duration)
                .expect("master duration list is kept valid by every mutation path");
        let (cmd_tx, cmd_rx) = bounded::<ControlCommand>(COMMAND_QUEUE);

        // Reset the published view before the clock's first publication
        // so readers never see the previous run's counter after a start.
        *self.published.lock().unwrap() = Snapshot::fresh(
            self.session.now_us(),
            self.config.sample_rate,
            self.durations.clone(),
            true,
        );

        self.running.store(true, Ordering::Release);
        let config = self.config.clone();
        let session = self.session.clone();
        let running = self.running.clone();
        let published = self.published.clone();
        let subscribers = self.subscribers.clone();
        let handle = thread::Builder::new()
            .name("clock".into())
            .spawn(move || {
                let mut clock = PacedClock::new(
                    config,
                    sequencer,
                    session,
                    running,
                    cmd_rx,
                    published,
                    subscribers,
                );
                clock.run();
            })
            .unwrap();

        self.cmd_tx = Some(cmd_tx);
        self.thread = Some(handle);
        info!(
            "Sequencer started: {} Hz, notes {:?}",
            self.config.sample_rate, self.durations
        );
    }

    /// Stop the run and freeze stats. The clock observes the flag at its
    /// next chunk boundary, so this returns within roughly one chunk
    /// duration. No-op if already stopped.
    pub fn stop(&mut self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(h) = self.thread.take() {
            let _ = h.join();
        }
        self.cmd_tx = None;
        info!("Sequencer stopped");
    }

    /// The original surface's Play/Stop button.
    pub fn toggle(&mut self) {
        if self.is_running() {
            self.stop();
        } else {
            self.start();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Jam one note's duration, running or stopped. Zero is rejected,
    /// sub-minimum values are clamped up, and a running clock sees the
    /// change at its next chunk boundary. Returns the applied value.
    pub fn set_note_duration(&mut self, index: usize, value: u64) -> Result<u64, InvalidParameter> {
        if index >= self.durations.len() {
            return Err(InvalidParameter::IndexOutOfRange {
                index,
                len: self.durations.len(),
            });
        }
        if value == 0 {
            return Err(InvalidParameter::ZeroDuration);
        }
        let applied = value.max(self.config.min_note_duration);
        self.durations[index] = applied;
        if let Some(tx) = &self.cmd_tx {
            let _ = tx.try_send(ControlCommand::SetDuration {
                index,
                value: applied,
            });
        }
        Ok(applied)
    }

    /// Replace the whole duration list. Rejects empty lists and zero
    /// entries; the list can never shrink below length 1.
    pub fn set_note_durations(&mut self, list: Vec<u64>) -> Result<(), InvalidParameter> {
        if list.is_empty() {
            return Err(InvalidParameter::EmptyDurations);
        }
        if list.iter().any(|&d| d == 0) {
            return Err(InvalidParameter::ZeroDuration);
        }
        self.durations = list
            .into_iter()
            .map(|d| d.max(self.config.min_note_duration))
            .collect();
        if let Some(tx) = &self.cmd_tx {
            let _ = tx.try_send(ControlCommand::ReplaceDurations(self.durations.clone()));
        }
        Ok(())
    }

    /// Non-blocking consistent view of the core. The clock writes whole
    /// snapshots under this lock, so fields never tear; between runs the
    /// final frozen snapshot of the last run is returned.
    pub fn snapshot(&self) -> Snapshot {
        self.published.lock().unwrap().clone()
    }

    /// Current master duration list (jams apply here immediately).
    pub fn note_durations(&self) -> &[u64] {
        &self.durations
    }
}

impl Drop for SequencerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Capacity of the per-run jam command channel.
const COMMAND_QUEUE: usize = 64;
