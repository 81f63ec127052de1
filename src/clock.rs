use crate::sequencer::PhaseSequencer;
use crate::types::*;
use crossbeam_channel::{Receiver, Sender};
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

/// Drives the [`PhaseSequencer`] at the target rate on a dedicated thread.
///
/// Samples are produced in fixed-size chunks with no sleeping inside a
/// chunk; pacing happens between chunks against an accumulated deadline
/// (`next_deadline += chunk_duration`), so individual sleep imprecision
/// never accumulates into drift. When a chunk overruns its deadline the
/// backlog is dropped rather than burst-replayed; the loss is visible only
/// as `accuracy_ratio` falling below 1.0.
///
/// Control commands and the stop flag are observed once per chunk, which
/// bounds jam visibility and stop latency to one chunk duration.
pub struct PacedClock {
    config: SequencerConfig,
    sequencer: PhaseSequencer,
    session: SessionClock,
    running: Arc<AtomicBool>,
    cmd_rx: Receiver<ControlCommand>,
    published: Arc<Mutex<Snapshot>>,
    subscribers: Vec<Sender<Snapshot>>,
}

impl PacedClock {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: SequencerConfig,
        sequencer: PhaseSequencer,
        session: SessionClock,
        running: Arc<AtomicBool>,
        cmd_rx: Receiver<ControlCommand>,
        published: Arc<Mutex<Snapshot>>,
        subscribers: Vec<Sender<Snapshot>>,
    ) -> Self {
        Self {
            config,
            sequencer,
            session,
            running,
            cmd_rx,
            published,
            subscribers,
        }
    }

    /// Run the pacing loop until the stop flag clears. Blocks the calling
    /// thread; spawn via [`SequencerHandle::start`](crate::handle::SequencerHandle::start).
    pub fn run(&mut self) {
        let chunk_size = self.config.chunk_size();
        let chunk_duration = self.config.chunk_duration;
        info!(
            "Clock running: {} Hz target, {} samples per {:?} chunk",
            self.config.sample_rate, chunk_size, chunk_duration
        );

        let mut stats = TimingStats::start();
        let mut phase_tail: VecDeque<f32> = VecDeque::with_capacity(PHASE_TAIL_LEN);
        let mut next_deadline = Instant::now();
        // Publish at the end of the first chunk, then rate-limit.
        let mut last_publish: Option<Instant> = None;
        let mut chunk_count: u64 = 0;

        while self.running.load(Ordering::Acquire) {
            self.drain_commands();

            for _ in 0..chunk_size {
                let step = self.sequencer.advance();
                if phase_tail.len() == PHASE_TAIL_LEN {
                    phase_tail.pop_front();
                }
                phase_tail.push_back(step.phase as f32);
            }
            stats.samples_processed += chunk_size;
            chunk_count += 1;

            let due = match last_publish {
                Some(t) => t.elapsed() >= self.config.update_interval,
                None => true,
            };
            if due {
                self.publish(&stats, &phase_tail, true);
                last_publish = Some(Instant::now());
            }
            if chunk_count % 1000 == 0 {
                debug!(
                    "Clock: {} chunks, {} samples, accuracy {:.3}",
                    chunk_count,
                    stats.samples_processed,
                    stats.accuracy_ratio(self.config.sample_rate)
                );
            }

            next_deadline += chunk_duration;
            let now = Instant::now();
            if next_deadline > now {
                thread::sleep(next_deadline - now);
            } else {
                // Fell behind: drop the backlog instead of bursting to
                // catch up. accuracy_ratio reports the loss.
                next_deadline = now;
            }
        }

        // Final frozen snapshot for readers that arrive after the run.
        self.publish(&stats, &phase_tail, false);
        info!(
            "Clock stopped: {} samples in {:.2}s ({:.0} Hz achieved, accuracy {:.3})",
            stats.samples_processed,
            stats.elapsed_secs(),
            stats.achieved_rate(),
            stats.accuracy_ratio(self.config.sample_rate)
        );
    }

    /// Apply pending jams. Values were validated and clamped by the
    /// handle; failures here mean the running list diverged and are
    /// logged, never fatal.
    fn drain_commands(&mut self) {
        while let Ok(cmd) = self.cmd_rx.try_recv() {
            match cmd {
                ControlCommand::SetDuration { index, value } => {
                    match self.sequencer.update_duration(index, value) {
                        Ok(applied) => debug!("Jam: note {} duration → {}", index + 1, applied),
                        Err(e) => warn!("Jam rejected: {}", e),
                    }
                }
                ControlCommand::ReplaceDurations(list) => {
                    match self.sequencer.replace_durations(list) {
                        Ok(()) => debug!("Jam: durations → {:?}", self.sequencer.durations()),
                        Err(e) => warn!("Jam rejected: {}", e),
                    }
                }
            }
        }
    }

    /// Publish a whole snapshot: store it in the shared slot for
    /// `snapshot()` readers and fan it out to subscribers. A slow
    /// subscriber loses snapshots; it never stalls the pacing loop.
    fn publish(&self, stats: &TimingStats, phase_tail: &VecDeque<f32>, is_running: bool) {
        let snap = Snapshot {
            timestamp_us: self.session.now_us(),
            counter: self.sequencer.counter(),
            note_index: self.sequencer.note_index(),
            phase: self.sequencer.phase(),
            note_durations: self.sequencer.durations().to_vec(),
            samples_processed: stats.samples_processed,
            target_rate: self.config.sample_rate,
            achieved_rate: stats.achieved_rate(),
            accuracy_ratio: stats.accuracy_ratio(self.config.sample_rate),
            is_running,
            recent_phases: phase_tail.iter().copied().collect(),
        };

        for tx in &self.subscribers {
            let _ = tx.try_send(snap.clone());
        }
        *self.published.lock().unwrap() = snap;
    }
}
