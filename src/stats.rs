//! This file contains all of the code for keeping stats for the current
//! session: how many trials each stage submitted, whether it was cut short,
//! how long it took and what the sink did with the results

use chrono::Local;
use std::time::{Duration, Instant};

use crate::mutators::StageReport;

// Helper function to format a group of stats
fn format_group(title: &str, stats: &[(String, String)]) -> String {
    let stats_str = stats
        .iter()
        .map(|(k, v)| format!("{}: {}", k, v))
        .collect::<Vec<_>>()
        .join(" | ");
    format!("\x1b[1;32m{}:\x1b[0m {}", title, stats_str)
}

// Compact trial counts, same buckets for every group
fn format_count(count: usize) -> String {
    match count {
        0..=999 => format!("{}", count),
        1_000..=999_999 => format!("{:.2}K", count as f64 / 1_000.0),
        _ => format!("{:.3}M", count as f64 / 1_000_000.0),
    }
}

fn format_elapsed(elapsed: Duration) -> String {
    let total_seconds = elapsed.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    let millis = elapsed.subsec_millis();

    format!("{}h {}m {}.{:03}s", hours, minutes, seconds, millis)
}

fn per_second(trials: usize, elapsed: Duration) -> f64 {
    let seconds = elapsed.as_secs_f64();
    if seconds == 0.0 {
        return 0.0;
    }

    trials as f64 / seconds
}

/// What one stage did
#[derive(Clone, Debug)]
pub struct StageStats {
    pub name: String,      // Stage name as given to the factory
    pub trials: usize,     // Trials submitted
    pub stopped: bool,     // Cut short by a Stop verdict
    pub elapsed: Duration, // Wall time spent in the stage
}

#[derive(Clone, Debug, Default)]
pub struct Stats {
    pub start_str: String,          // String repr of date start
    session_start: Option<Instant>, // Start time
    stage_start: Option<Instant>,   // Start time of the running stage
    pub stages: Vec<StageStats>,    // Finished stages in run order
    pub saved: usize,               // Mutants written to disk
    pub duplicates: usize,          // Mutants skipped as already seen
}

impl Stats {
    pub fn new() -> Self {
        Stats::default()
    }

    pub fn start_session(&mut self) {
        self.start_str = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        self.session_start = Some(Instant::now());
    }

    pub fn start_stage(&mut self) {
        self.stage_start = Some(Instant::now());
    }

    /// Record a finished stage, the clock started by `start_stage` stops here
    pub fn finish_stage(&mut self, name: &str, report: &StageReport) {
        let elapsed = self
            .stage_start
            .take()
            .map(|start| start.elapsed())
            .unwrap_or_default();

        self.stages.push(StageStats {
            name: name.to_string(),
            trials: report.trials,
            stopped: report.stopped,
            elapsed,
        });
    }

    pub fn total_trials(&self) -> usize {
        self.stages.iter().map(|stage| stage.trials).sum()
    }

    fn uptime(&self) -> Duration {
        self.session_start
            .map(|start| start.elapsed())
            .unwrap_or_default()
    }

    pub fn print_stats(&self) {
        println!(
            "\n\x1b[1;35m[strata stats (start time: {})]\x1b[0m",
            self.start_str
        );

        for stage in &self.stages {
            let group = [
                ("trials".to_string(), format_count(stage.trials)),
                (
                    "trials/s".to_string(),
                    format!("{:.2}", per_second(stage.trials, stage.elapsed)),
                ),
                ("time".to_string(), format_elapsed(stage.elapsed)),
                ("stopped".to_string(), stage.stopped.to_string()),
            ];
            println!("{}", format_group(&stage.name, &group));
        }

        let uptime = self.uptime();
        let globals = [
            ("uptime".to_string(), format_elapsed(uptime)),
            ("stages".to_string(), self.stages.len().to_string()),
            ("trials".to_string(), format_count(self.total_trials())),
            ("saved".to_string(), format_count(self.saved)),
            ("duplicates".to_string(), format_count(self.duplicates)),
        ];
        println!("{}", format_group("globals", &globals));
    }
}
