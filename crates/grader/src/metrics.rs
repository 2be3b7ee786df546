//! Metric accumulators and the snapshot derived from them at run end.

use crate::user::{CommitKey, Population};
use gradesim::SimTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Instantaneous system state, taken once per tick.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub at: SimTime,
    pub test_busy: usize,
    /// Users in the test stage, queued or in service.
    pub test_length: usize,
    pub backup_length: usize,
    pub result_busy: usize,
    pub result_length: usize,
    pub test_utilization: f64,
    pub result_utilization: f64,
}

/// Entry and exit times of one commit in one stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageVisit {
    pub entered: SimTime,
    pub exited: Option<SimTime>,
}

impl StageVisit {
    pub fn sojourn(&self) -> Option<SimTime> {
        self.exited.map(|exit| exit.saturating_sub(self.entered))
    }
}

/// Mean, variance and range of a set of observations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Spread {
    pub avg: f64,
    pub var: f64,
    pub min: f64,
    pub max: f64,
}

impl Spread {
    /// Population statistics; all zero for an empty set.
    pub fn of(values: &[f64]) -> Self {
        if values.is_empty() {
            return Spread::default();
        }
        let (avg, var) = mean_variance(values);
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Spread { avg, var, min, max }
    }
}

fn mean_variance(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    pub avg_length: f64,
    pub var_length: f64,
    pub max_length: usize,
    pub avg_utilization: f64,
    pub var_utilization: f64,
    /// Refusals over total submissions.
    pub blocking_rate: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SojournTimes {
    pub test_queue: Spread,
    pub result_queue: Spread,
    pub total: Spread,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BackupStats {
    pub avg_length: f64,
    pub max_length: usize,
    /// Records parked over the run.
    pub stored: u64,
}

/// Aggregate view of a finished run, the only interface offered to
/// cost-analysis and plotting consumers.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub test_queue: QueueStats,
    pub result_queue: QueueStats,
    pub sojourn_times: SojournTimes,
    /// Total time in system per population, for commits that completed.
    pub sojourn_by_population: BTreeMap<Population, Spread>,
    pub backup: BackupStats,
    /// Completed commits per tick over the sampled span.
    pub throughput: f64,
    pub total_requests: u64,
    /// Submissions turned away by the dam before reaching admission.
    pub dam_deferrals: u64,
}

/// Accumulates samples and stage transitions during a run.
#[derive(Clone, Debug, Default)]
pub struct MetricsRecorder {
    samples: Vec<Sample>,
    test_visits: BTreeMap<CommitKey, StageVisit>,
    result_visits: BTreeMap<CommitKey, StageVisit>,
    populations: BTreeMap<CommitKey, Population>,
    test_blocked: Vec<SimTime>,
    result_blocked: Vec<SimTime>,
    backed_up: u64,
    dam_deferrals: u64,
    submissions: u64,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sample(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    pub fn record_submission(&mut self, key: CommitKey, population: Population) {
        self.submissions += 1;
        self.populations.insert(key, population);
    }

    pub fn record_test_entry(&mut self, key: CommitKey, at: SimTime) {
        self.test_visits.insert(
            key,
            StageVisit {
                entered: at,
                exited: None,
            },
        );
    }

    pub fn record_test_exit(&mut self, key: CommitKey, at: SimTime) {
        if let Some(visit) = self.test_visits.get_mut(&key) {
            visit.exited = Some(at);
        }
    }

    pub fn record_result_entry(&mut self, key: CommitKey, at: SimTime) {
        self.result_visits.insert(
            key,
            StageVisit {
                entered: at,
                exited: None,
            },
        );
    }

    pub fn record_result_exit(&mut self, key: CommitKey, at: SimTime) {
        if let Some(visit) = self.result_visits.get_mut(&key) {
            visit.exited = Some(at);
        }
    }

    pub fn record_test_blocked(&mut self, at: SimTime) {
        self.test_blocked.push(at);
    }

    pub fn record_result_blocked(&mut self, at: SimTime) {
        self.result_blocked.push(at);
    }

    pub fn record_backup(&mut self) {
        self.backed_up += 1;
    }

    pub fn record_dam_deferral(&mut self) {
        self.dam_deferrals += 1;
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn test_visits(&self) -> &BTreeMap<CommitKey, StageVisit> {
        &self.test_visits
    }

    pub fn result_visits(&self) -> &BTreeMap<CommitKey, StageVisit> {
        &self.result_visits
    }

    pub fn test_blocked_times(&self) -> &[SimTime] {
        &self.test_blocked
    }

    pub fn result_blocked_times(&self) -> &[SimTime] {
        &self.result_blocked
    }

    pub fn submissions(&self) -> u64 {
        self.submissions
    }

    /// Derive the aggregate statistics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let test_queue = self.queue_stats(
            |s| s.test_length,
            |s| s.test_utilization,
            self.test_blocked.len(),
        );
        let result_queue = self.queue_stats(
            |s| s.result_length,
            |s| s.result_utilization,
            self.result_blocked.len(),
        );

        let mut test_times = Vec::new();
        let mut result_times = Vec::new();
        let mut total_times = Vec::new();
        let mut by_population: BTreeMap<Population, Vec<f64>> = BTreeMap::new();
        let mut completed = 0u64;

        for (key, test) in &self.test_visits {
            if let Some(sojourn) = test.sojourn() {
                test_times.push(sojourn as f64);
            }
            let Some(result) = self.result_visits.get(key) else {
                continue;
            };
            if let (Some(sojourn), Some(exit)) = (result.sojourn(), result.exited) {
                result_times.push(sojourn as f64);
                let total = exit.saturating_sub(test.entered) as f64;
                total_times.push(total);
                if let Some(population) = self.populations.get(key) {
                    by_population.entry(*population).or_default().push(total);
                }
                completed += 1;
            }
        }

        let backup_lengths: Vec<f64> = self
            .samples
            .iter()
            .map(|s| s.backup_length as f64)
            .collect();

        MetricsSnapshot {
            test_queue,
            result_queue,
            sojourn_times: SojournTimes {
                test_queue: Spread::of(&test_times),
                result_queue: Spread::of(&result_times),
                total: Spread::of(&total_times),
            },
            sojourn_by_population: by_population
                .into_iter()
                .map(|(population, times)| (population, Spread::of(&times)))
                .collect(),
            backup: BackupStats {
                avg_length: mean_variance(&backup_lengths).0,
                max_length: self
                    .samples
                    .iter()
                    .map(|s| s.backup_length)
                    .max()
                    .unwrap_or(0),
                stored: self.backed_up,
            },
            throughput: self.throughput(completed),
            total_requests: self.submissions,
            dam_deferrals: self.dam_deferrals,
        }
    }

    fn queue_stats(
        &self,
        length: impl Fn(&Sample) -> usize,
        utilization: impl Fn(&Sample) -> f64,
        blocked: usize,
    ) -> QueueStats {
        let lengths: Vec<f64> = self.samples.iter().map(|s| length(s) as f64).collect();
        let utilizations: Vec<f64> = self.samples.iter().map(&utilization).collect();
        let (avg_length, var_length) = mean_variance(&lengths);
        let (avg_utilization, var_utilization) = mean_variance(&utilizations);

        QueueStats {
            avg_length,
            var_length,
            max_length: self.samples.iter().map(&length).max().unwrap_or(0),
            avg_utilization,
            var_utilization,
            blocking_rate: if self.submissions > 0 {
                blocked as f64 / self.submissions as f64
            } else {
                0.0
            },
        }
    }

    fn throughput(&self, completed: u64) -> f64 {
        let (Some(first), Some(last)) = (self.samples.first(), self.samples.last()) else {
            return 0.0;
        };
        let span = last.at.saturating_sub(first.at);
        if span == 0 {
            0.0
        } else {
            completed as f64 / span as f64
        }
    }
}
