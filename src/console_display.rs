use crate::types::Snapshot;
use crossbeam_channel::Receiver;
use std::io::{self, Write};
use std::time::{Duration, Instant};

/// Renders a live ASCII dashboard of the sequencer state.
pub struct ConsoleDisplay {
    rx: Receiver<Snapshot>,
    update_hz: u32,
}

impl ConsoleDisplay {
    pub fn new(rx: Receiver<Snapshot>, update_hz: u32) -> Self {
        Self { rx, update_hz }
    }

    pub fn run(&self) {
        let min_interval = if self.update_hz == 0 {
            Duration::from_millis(50)
        } else {
            Duration::from_millis((1000 / self.update_hz as u64).max(1))
        };
        let mut last_render: Option<Instant> = None;
        let mut stdout = io::stdout();

        for snap in self.rx.iter() {
            if let Some(t) = last_render {
                if t.elapsed() < min_interval {
                    continue;
                }
            }
            last_render = Some(Instant::now());

            // Clear screen and move cursor home
            print!("\x1b[2J\x1b[H");

            println!("╔══════════════════════════════════════════════════════════╗");
            println!("║  RAMP COUNTER — Live Monitor                             ║");
            println!("╠══════════════════════════════════════════════════════════╣");

            let secs = snap.timestamp_us as f64 / 1_000_000.0;
            println!("║  Time: {:>10.2}s        State: {:<7}                 ║",
                secs, if snap.is_running { "RUNNING" } else { "STOPPED" });

            println!("║                                                          ║");
            println!("║  Counter:    {:<12}                                ║", snap.counter);

            let bar = make_bar(snap.phase, 30);
            println!("║  Phase:      {} {:.4}              ║", bar, snap.phase);

            println!("║                                                          ║");
            println!("║  Notes:                                                  ║");
            for (i, &dur) in snap.note_durations.iter().enumerate() {
                let marker = if i == snap.note_index { "▶" } else { " " };
                println!("║   {} {:>2}: {:>8} samples                                ║",
                    marker, i + 1, dur);
            }

            println!("║                                                          ║");
            let ramp = make_sparkline(&snap.recent_phases, 50);
            println!("║  Ramp: {} ║", ramp);

            println!("║                                                          ║");
            println!("║  Target Rate:   {:>8} Hz                              ║", snap.target_rate);
            println!("║  Actual Rate:   {:>8.0} Hz                              ║", snap.achieved_rate);
            println!("║  Accuracy:      {:>8.1} %                               ║",
                snap.accuracy_ratio * 100.0);

            println!("╚══════════════════════════════════════════════════════════╝");
            let _ = stdout.flush();
        }
    }
}

fn make_bar(val: f64, width: usize) -> String {
    let filled = ((val.clamp(0.0, 1.0)) * width as f64).round() as usize;
    let empty = width.saturating_sub(filled);
    format!("[{}{}]", "█".repeat(filled), "░".repeat(empty))
}

/// Down-sample the recent phase tail into a fixed-width block sparkline.
fn make_sparkline(phases: &[f32], width: usize) -> String {
    const BLOCKS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
    let mut line = String::new();
    if phases.is_empty() {
        line.push_str(&" ".repeat(width));
        return line;
    }
    for i in 0..width {
        let idx = i * phases.len() / width;
        let v = phases[idx].clamp(0.0, 1.0);
        let level = ((v * 8.0) as usize).min(7);
        line.push(BLOCKS[level]);
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sparkline_width_is_stable() {
        assert_eq!(make_sparkline(&[], 50).chars().count(), 50);
        assert_eq!(make_sparkline(&[0.5], 50).chars().count(), 50);
        let ramp: Vec<f32> = (0..100).map(|i| i as f32 / 100.0).collect();
        let line = make_sparkline(&ramp, 50);
        assert_eq!(line.chars().count(), 50);
        // A rising ramp starts low and ends high
        assert_eq!(line.chars().next(), Some('▁'));
        assert_eq!(line.chars().last(), Some('█'));
    }

    #[test]
    fn test_bar_extremes() {
        assert_eq!(make_bar(0.0, 10), format!("[{}]", "░".repeat(10)));
        assert_eq!(make_bar(1.0, 10), format!("[{}]", "█".repeat(10)));
    }
}
