//! Prediction orchestration
//!
//! Composes extraction, scoring and risk levelling behind one entry point
//! used by both the single-wallet and the batch paths. Batch items run as
//! independent tasks bounded by a process-wide worker semaphore and are
//! reassembled in input order.

use crate::error::PipelineError;
use crate::feature_extractor::FeatureExtractor;
use crate::metrics::{PipelineMetrics, Stage};
use crate::models::RiskClassifier;
use crate::risk_policy::RiskLevelPolicy;
use crate::source::RawActivitySource;
use crate::types::{BatchItem, FeatureSchema, FeatureVector, PredictionResult};
use anyhow::{ensure, Result};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

pub struct PredictionOrchestrator<S> {
    extractor: FeatureExtractor<S>,
    classifier: RiskClassifier,
    policy: RiskLevelPolicy,
    workers: Arc<Semaphore>,
    metrics: Arc<PipelineMetrics>,
}

impl<S: RawActivitySource + 'static> PredictionOrchestrator<S> {
    /// Wire the pipeline together. Refuses to start when the extractor and
    /// the classifier were built for different schemas.
    pub fn new(
        extractor: FeatureExtractor<S>,
        classifier: RiskClassifier,
        policy: RiskLevelPolicy,
        workers: usize,
        metrics: Arc<PipelineMetrics>,
    ) -> Result<Self> {
        ensure!(workers > 0, "at least one worker is required");
        ensure!(
            extractor.schema() == classifier.schema(),
            "extractor schema '{}' and classifier schema '{}' differ",
            extractor.schema().version(),
            classifier.schema().version()
        );

        Ok(Self {
            extractor,
            classifier,
            policy,
            workers: Arc::new(Semaphore::new(workers)),
            metrics,
        })
    }

    pub fn schema(&self) -> &Arc<FeatureSchema> {
        self.classifier.schema()
    }

    pub fn extractor(&self) -> &FeatureExtractor<S> {
        &self.extractor
    }

    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    /// Extract features for one address.
    pub async fn extract(&self, address: &str) -> Result<FeatureVector, PipelineError> {
        let start = Instant::now();
        let result = self.extractor.extract(address).await;
        self.metrics.record_stage_time(Stage::Extraction, start.elapsed());
        result
    }

    /// Full verdict for one address, propagating the first failure.
    pub async fn predict(&self, address: &str) -> Result<PredictionResult, PipelineError> {
        let start = Instant::now();

        let result = match self.extract(address).await {
            Ok(vector) => self.score_vector(&vector),
            Err(e) => Err(e),
        };

        match &result {
            Ok(prediction) => {
                self.metrics.record_prediction(start.elapsed(), prediction);
                debug!(
                    wallet = address,
                    pred_class = prediction.pred_class,
                    p_fraud = prediction.fraud_probability(),
                    risk_level = prediction.risk_level.as_str(),
                    "Wallet scored"
                );
            }
            Err(e) => {
                self.metrics.record_failure(e);
                debug!(wallet = address, kind = e.kind().as_str(), error = %e, "Wallet not scored");
            }
        }
        result
    }

    /// Score an already extracted vector.
    pub fn score_vector(&self, vector: &FeatureVector) -> Result<PredictionResult, PipelineError> {
        let start = Instant::now();
        let score = self.classifier.score(vector);
        self.metrics.record_stage_time(Stage::Scoring, start.elapsed());
        let score = score?;

        let risk_level = self.policy.classify(score.fraud_probability())?;
        Ok(PredictionResult {
            pred_class: score.pred_class,
            probabilities: score.probabilities,
            risk_level,
        })
    }

    /// Verdicts for many addresses, one entry per input in input order.
    ///
    /// Each item is scored by [`predict`](Self::predict) on its own task.
    /// Failures stay at their position as error records. Dropping the
    /// returned future stops scheduling new items; items already running
    /// finish on their own.
    pub async fn predict_batch(self: &Arc<Self>, addresses: &[String]) -> Vec<BatchItem> {
        let request_id = Uuid::new_v4();
        let span = info_span!("batch", %request_id, size = addresses.len());

        async {
            self.metrics.record_batch();
            let start = Instant::now();

            let mut handles: Vec<JoinHandle<Result<PredictionResult, PipelineError>>> =
                Vec::with_capacity(addresses.len());

            for address in addresses {
                // Acquire permit (limits concurrent extractions across all batches)
                let permit = self.workers.clone().acquire_owned().await;
                let this = Arc::clone(self);
                let address = address.clone();

                let handle = tokio::spawn(
                    async move {
                        let _permit = permit.map_err(|e| {
                            PipelineError::Internal(format!("worker pool closed: {e}"))
                        })?;
                        this.predict(&address).await
                    }
                    .in_current_span(),
                );
                handles.push(handle);
            }

            let mut results = Vec::with_capacity(handles.len());
            let joined = futures::future::join_all(handles).await;
            for (index, joined) in joined.into_iter().enumerate() {
                let result = joined.unwrap_or_else(|e| {
                    error!(index, error = %e, "Batch worker task failed");
                    let err = PipelineError::Internal(format!("worker task failed: {e}"));
                    self.metrics.record_failure(&err);
                    Err(err)
                });
                results.push(BatchItem::from(result));
            }

            log_batch_outcome(&results, start);
            results
        }
        .instrument(span)
        .await
    }

    /// Verdicts for pre-extracted, numerically encoded rows.
    ///
    /// Rows are decoded against the active schema and scored exactly like
    /// extracted vectors. A row that fails decoding becomes an error record.
    pub fn predict_rows(&self, rows: &[Vec<f64>]) -> Vec<BatchItem> {
        let request_id = Uuid::new_v4();
        let _span = info_span!("rows", %request_id, size = rows.len()).entered();

        self.metrics.record_batch();
        let start = Instant::now();

        let results: Vec<BatchItem> = rows
            .iter()
            .enumerate()
            .map(|(index, row)| {
                let item_start = Instant::now();
                let result = self
                    .schema()
                    .decode(row)
                    .and_then(|vector| self.score_vector(&vector));

                match &result {
                    Ok(prediction) => {
                        self.metrics.record_prediction(item_start.elapsed(), prediction)
                    }
                    Err(e @ PipelineError::SchemaMismatch(_)) => {
                        self.metrics.record_failure(e);
                        error!(
                            index,
                            schema = self.schema().version(),
                            error = %e,
                            "Row rejected before scoring"
                        );
                    }
                    Err(e) => {
                        self.metrics.record_failure(e);
                        debug!(index, kind = e.kind().as_str(), error = %e, "Row not scored");
                    }
                }
                BatchItem::from(result)
            })
            .collect();

        log_batch_outcome(&results, start);
        results
    }
}

fn log_batch_outcome(results: &[BatchItem], start: Instant) {
    let failed = results.iter().filter(|r| r.error().is_some()).count();
    let elapsed_ms = start.elapsed().as_millis() as u64;

    if failed > 0 {
        warn!(
            items = results.len(),
            failed,
            elapsed_ms,
            "Batch completed with failures"
        );
    } else {
        info!(items = results.len(), elapsed_ms, "Batch completed");
    }
}
