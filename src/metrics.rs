//! Performance metrics and statistics tracking for the risk pipeline.

use crate::error::{ErrorKind, PipelineError};
use crate::types::{PredictionResult, RiskLevel};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

const MAX_SAMPLES: usize = 10_000;
const MAX_STAGE_SAMPLES: usize = 1_000;

/// Pipeline stage timed separately from end-to-end latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Extraction,
    Scoring,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Extraction => "extraction",
            Stage::Scoring => "scoring",
        }
    }
}

/// Metrics collector for pipeline performance
pub struct PipelineMetrics {
    /// Verdicts produced
    pub predictions: AtomicU64,
    /// Items that ended in an error record
    pub failures: AtomicU64,
    /// Batch requests served
    pub batches: AtomicU64,
    failures_by_kind: RwLock<HashMap<ErrorKind, u64>>,
    predictions_by_level: RwLock<HashMap<RiskLevel, u64>>,
    /// End-to-end latency per successful item (in microseconds)
    latencies: RwLock<Vec<u64>>,
    stage_times: RwLock<HashMap<Stage, Vec<u64>>>,
    /// Fraud probability distribution buckets
    probability_buckets: RwLock<[u64; 10]>,
    start_time: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            predictions: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            batches: AtomicU64::new(0),
            failures_by_kind: RwLock::new(HashMap::new()),
            predictions_by_level: RwLock::new(HashMap::new()),
            latencies: RwLock::new(Vec::with_capacity(1000)),
            stage_times: RwLock::new(HashMap::new()),
            probability_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record a successful prediction
    pub fn record_prediction(&self, latency: Duration, result: &PredictionResult) {
        self.predictions.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut times) = self.latencies.write() {
            times.push(latency.as_micros() as u64);
            if times.len() > MAX_SAMPLES {
                times.drain(0..MAX_SAMPLES / 2);
            }
        }

        if let Ok(mut by_level) = self.predictions_by_level.write() {
            *by_level.entry(result.risk_level).or_insert(0) += 1;
        }

        let bucket = (result.fraud_probability() * 10.0).clamp(0.0, 9.0) as usize;
        if let Ok(mut buckets) = self.probability_buckets.write() {
            buckets[bucket] += 1;
        }
    }

    pub fn record_failure(&self, error: &PipelineError) {
        self.failures.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut by_kind) = self.failures_by_kind.write() {
            *by_kind.entry(error.kind()).or_insert(0) += 1;
        }
    }

    pub fn record_batch(&self) {
        self.batches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stage_time(&self, stage: Stage, duration: Duration) {
        if let Ok(mut times) = self.stage_times.write() {
            let stage_times = times.entry(stage).or_default();
            stage_times.push(duration.as_micros() as u64);
            if stage_times.len() > MAX_STAGE_SAMPLES {
                stage_times.drain(0..MAX_STAGE_SAMPLES / 2);
            }
        }
    }

    /// End-to-end latency statistics
    pub fn get_latency_stats(&self) -> LatencyStats {
        self.latencies
            .read()
            .map(|times| LatencyStats::from_samples(&times))
            .unwrap_or_default()
    }

    pub fn get_stage_stats(&self) -> HashMap<Stage, LatencyStats> {
        self.stage_times
            .read()
            .map(|times| {
                times
                    .iter()
                    .filter(|(_, samples)| !samples.is_empty())
                    .map(|(stage, samples)| (*stage, LatencyStats::from_samples(samples)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Verdicts per second since startup
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.predictions.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn get_probability_distribution(&self) -> [u64; 10] {
        self.probability_buckets
            .read()
            .map(|buckets| *buckets)
            .unwrap_or_default()
    }

    pub fn get_predictions_by_level(&self) -> HashMap<RiskLevel, u64> {
        self.predictions_by_level
            .read()
            .map(|by_level| by_level.clone())
            .unwrap_or_default()
    }

    pub fn get_failures_by_kind(&self) -> HashMap<ErrorKind, u64> {
        self.failures_by_kind
            .read()
            .map(|by_kind| by_kind.clone())
            .unwrap_or_default()
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let predictions = self.predictions.load(Ordering::Relaxed);
        let failures = self.failures.load(Ordering::Relaxed);
        let batches = self.batches.load(Ordering::Relaxed);
        let attempted = predictions + failures;
        let failure_rate = if attempted > 0 {
            (failures as f64 / attempted as f64) * 100.0
        } else {
            0.0
        };

        let latency = self.get_latency_stats();
        let throughput = self.get_throughput();
        let by_level = self.get_predictions_by_level();
        let by_kind = self.get_failures_by_kind();
        let distribution = self.get_probability_distribution();

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║             WALLET RISK PIPELINE - METRICS SUMMARY           ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Predictions:  {:>8}  │  Throughput: {:>8.1} wallets/s    ║",
            predictions, throughput
        );
        info!(
            "║ Failures:     {:>8}  │  Failure Rate: {:>6.1}%  Batches: {:>5} ║",
            failures, failure_rate, batches
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Latency (μs): mean={:>6} p50={:>6} p95={:>6} p99={:>6}   ║",
            latency.mean_us, latency.p50_us, latency.p95_us, latency.p99_us
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Predictions by Risk Level:                                   ║");
        for level in [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High] {
            let count = by_level.get(&level).copied().unwrap_or(0);
            let pct = if predictions > 0 {
                (count as f64 / predictions as f64) * 100.0
            } else {
                0.0
            };
            info!(
                "║   {:10}: {:>6} ({:>5.1}%)                                ║",
                level.as_str(),
                count,
                pct
            );
        }
        if !by_kind.is_empty() {
            info!("╠══════════════════════════════════════════════════════════════╣");
            info!("║ Failures by Kind:                                            ║");
            for (kind, count) in &by_kind {
                info!("║   {:20}: {:>6}                                ║", kind.as_str(), count);
            }
        }
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Fraud Probability Distribution:                              ║");
        let total: u64 = distribution.iter().sum();
        for (i, &count) in distribution.iter().enumerate() {
            let pct = if total > 0 { (count as f64 / total as f64) * 100.0 } else { 0.0 };
            let bar_len = (pct / 2.0) as usize;
            let bar: String = "█".repeat(bar_len.min(20));
            info!(
                "║   {:.1}-{:.1}: {:>6} ({:>5.1}%) {}",
                i as f64 / 10.0,
                (i + 1) as f64 / 10.0,
                count,
                pct,
                bar
            );
        }
        info!("╚══════════════════════════════════════════════════════════════╝");

        let stage_stats = self.get_stage_stats();
        if !stage_stats.is_empty() {
            info!("Stage Times (μs):");
            for (stage, stats) in &stage_stats {
                info!(
                    "  {}: mean={} p50={} p99={} (calls={})",
                    stage.as_str(),
                    stats.mean_us,
                    stats.p50_us,
                    stats.p99_us,
                    stats.count
                );
            }
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Latency statistics in microseconds
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LatencyStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

impl LatencyStats {
    fn from_samples(samples: &[u64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }

        let mut sorted = samples.to_vec();
        sorted.sort_unstable();

        let count = sorted.len();
        let sum: u64 = sorted.iter().sum();

        Self {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: sorted[count / 2],
            p95_us: sorted[(count as f64 * 0.95) as usize],
            p99_us: sorted[(count as f64 * 0.99) as usize],
            max_us: sorted[count - 1],
        }
    }
}

/// Real-time metrics reporter that prints periodic summaries
pub struct MetricsReporter {
    metrics: Arc<PipelineMetrics>,
    interval: Duration,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<PipelineMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval: Duration::from_secs(interval_secs.max(1)),
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(self.interval);
        // First tick fires immediately; skip the empty summary
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(p_fraud: f64, risk_level: RiskLevel) -> PredictionResult {
        PredictionResult {
            pred_class: u8::from(p_fraud > 0.5),
            probabilities: [1.0 - p_fraud, p_fraud],
            risk_level,
        }
    }

    #[test]
    fn test_metrics_recording() {
        let metrics = PipelineMetrics::new();

        metrics.record_prediction(Duration::from_micros(100), &result(0.1, RiskLevel::Low));
        metrics.record_prediction(Duration::from_micros(300), &result(0.8, RiskLevel::High));
        metrics.record_prediction(Duration::from_micros(200), &result(1.0, RiskLevel::High));
        metrics.record_failure(&PipelineError::UnresolvableAddress("0x12".into()));

        assert_eq!(metrics.predictions.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.failures.load(Ordering::Relaxed), 1);

        let by_level = metrics.get_predictions_by_level();
        assert_eq!(by_level.get(&RiskLevel::High), Some(&2));
        assert_eq!(by_level.get(&RiskLevel::Medium), None);

        let by_kind = metrics.get_failures_by_kind();
        assert_eq!(by_kind.get(&ErrorKind::UnresolvableAddress), Some(&1));

        // p = 1.0 lands in the top bucket
        let distribution = metrics.get_probability_distribution();
        assert_eq!(distribution[1], 1);
        assert_eq!(distribution[8], 1);
        assert_eq!(distribution[9], 1);
    }

    #[test]
    fn test_latency_stats() {
        let metrics = PipelineMetrics::new();
        assert_eq!(metrics.get_latency_stats(), LatencyStats::default());

        for us in 1..=100 {
            metrics.record_prediction(Duration::from_micros(us), &result(0.2, RiskLevel::Low));
        }

        let stats = metrics.get_latency_stats();
        assert_eq!(stats.count, 100);
        assert_eq!(stats.mean_us, 50);
        assert_eq!(stats.p50_us, 51);
        assert_eq!(stats.max_us, 100);
    }

    #[test]
    fn test_stage_times() {
        let metrics = PipelineMetrics::new();
        metrics.record_stage_time(Stage::Scoring, Duration::from_micros(40));
        metrics.record_stage_time(Stage::Scoring, Duration::from_micros(60));

        let stats = metrics.get_stage_stats();
        assert_eq!(stats[&Stage::Scoring].count, 2);
        assert!(!stats.contains_key(&Stage::Extraction));
    }
}
