//! Wallet Risk Pipeline - Main Entry Point
//!
//! Loads the schema, model and activity source from configuration and
//! serves the risk API over HTTP.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use wallet_risk_pipeline::{
    api::{self, AppState},
    config::{AppConfig, LoggingConfig, SourceKind},
    feature_extractor::FeatureExtractor,
    metrics::{MetricsReporter, PipelineMetrics},
    models::{self, RiskClassifier},
    orchestrator::PredictionOrchestrator,
    risk_policy::RiskLevelPolicy,
    source::{EtherscanSource, FixtureSource, RawActivitySource},
    types::FeatureSchema,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration before logging so the configured level applies
    let config = AppConfig::load()?;
    init_logging(&config.logging)?;

    info!("Starting Wallet Risk Pipeline");
    info!(
        "Risk levels: low < {:.2} <= medium < {:.2} <= high",
        config.risk_levels.low, config.risk_levels.high
    );

    let schema =
        Arc::new(FeatureSchema::from_config(&config.schema).context("Invalid feature schema")?);
    info!(
        schema = schema.version(),
        fields = schema.len(),
        "Feature schema loaded"
    );

    let timeout = config.pipeline.timeout();
    match config.source.kind {
        SourceKind::Fixture => {
            let path = config
                .source
                .fixture_path
                .as_deref()
                .context("source.fixture_path is not set")?;
            let source = FixtureSource::load(path)?;
            run(config, schema, source).await
        }
        SourceKind::Etherscan => {
            if config.source.api_key.is_none() {
                warn!("No Etherscan API key configured; requests will be rate limited");
            }
            let source = EtherscanSource::new(
                &config.source.api_url,
                config.source.api_key.clone(),
                &config.source.flagged,
                timeout,
            )?;
            run(config, schema, source).await
        }
    }
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .context("Invalid log level")?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.pretty().init();
    }
    Ok(())
}

async fn run<S: RawActivitySource + 'static>(
    config: AppConfig,
    schema: Arc<FeatureSchema>,
    source: S,
) -> Result<()> {
    let metrics = Arc::new(PipelineMetrics::new());

    let extractor = FeatureExtractor::new(schema.clone(), source, config.pipeline.timeout())?;
    info!(
        source = extractor.source_name(),
        "Feature extractor initialized ({} features)",
        extractor.feature_count()
    );

    let model = models::load_model(&config.model, &schema)?;
    let classifier = RiskClassifier::new(schema, model);
    info!(model = classifier.model_name(), "Risk classifier initialized");

    let policy = RiskLevelPolicy::new(config.risk_levels)?;

    let orchestrator = Arc::new(PredictionOrchestrator::new(
        extractor,
        classifier,
        policy,
        config.pipeline.workers,
        metrics.clone(),
    )?);
    info!(
        workers = config.pipeline.workers,
        timeout_ms = config.pipeline.timeout_ms,
        max_batch_size = config.pipeline.max_batch_size,
        "Prediction orchestrator ready"
    );

    if config.metrics.report_interval_secs > 0 {
        let reporter = MetricsReporter::new(metrics.clone(), config.metrics.report_interval_secs);
        tokio::spawn(reporter.start());
    }

    let state = Arc::new(AppState::new(orchestrator, config.pipeline.max_batch_size));
    let app = api::router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down");
    metrics.print_summary();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        // Without a signal handler, run until killed
        std::future::pending::<()>().await;
    }
}
