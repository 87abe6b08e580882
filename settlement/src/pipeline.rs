//! Settlement pipeline
//!
//! Drives one settlement run:
//!
//! 1. **Listing**: fetch merchant ids from the directory (once)
//! 2. **Settlement**: for each id, in directory order, fetch the merchant
//!    and compute its settlement
//! 3. **Export**: round net amounts and hand all rows to the export sink
//!    as one batch
//!
//! Merchants are processed one at a time. Every directory call is bounded
//! by the fetch timeout, optionally retried, and raced against the run's
//! cancellation token.

use crate::{
    calculator::SettlementCalculator,
    config::{Config, ErrorPolicy},
    directory::{HttpMerchantDirectory, MerchantDirectory},
    export::{CsvExporter, ExportSink},
    retry::{RetryConfig, RetryStrategy},
    rounding::RoundingRule,
    types::*,
    Error, ErrorKind, Result,
};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Pipeline settings
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    /// Upper bound for each directory call
    pub fetch_timeout: Duration,

    /// Rounding applied to net amounts on export
    pub rounding: RoundingRule,

    /// Per-merchant failure handling
    pub error_policy: ErrorPolicy,

    /// Retry of fetch failures
    pub retry: RetryConfig,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for PipelineOptions {
    fn from(config: &Config) -> Self {
        Self {
            fetch_timeout: config.directory.fetch_timeout(),
            rounding: config.export.rounding,
            error_policy: config.pipeline.error_policy,
            retry: config.pipeline.retry.clone(),
        }
    }
}

/// Settlement pipeline
pub struct SettlementPipeline {
    /// Merchant data source
    directory: Arc<dyn MerchantDirectory>,

    /// Batch destination
    sink: Arc<dyn ExportSink>,

    /// Calculator
    calculator: SettlementCalculator,

    /// Fetch retry
    retry: RetryStrategy,

    /// Settings
    options: PipelineOptions,

    /// Run cancellation
    cancel: CancellationToken,
}

impl std::fmt::Debug for SettlementPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettlementPipeline")
            .field("options", &self.options)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl SettlementPipeline {
    /// Create pipeline over the given collaborators
    pub fn new(
        directory: Arc<dyn MerchantDirectory>,
        sink: Arc<dyn ExportSink>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            directory,
            sink,
            calculator: SettlementCalculator::new(),
            retry: RetryStrategy::new(options.retry.clone()),
            options,
            cancel: CancellationToken::new(),
        }
    }

    /// Create pipeline with the HTTP directory and CSV exporter
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let directory =
            HttpMerchantDirectory::new(&config.directory.base_url, config.directory.fetch_timeout())?;
        let sink = CsvExporter::new(&config.export.output_dir);

        Ok(Self::new(
            Arc::new(directory),
            Arc::new(sink),
            PipelineOptions::from(config),
        ))
    }

    /// Use `token` to cancel the run
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that cancels this pipeline's runs
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Pipeline settings
    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Settle all merchants and export the batch
    pub async fn run(&self) -> Result<SettlementReport> {
        let mut report = self.settle().await?;

        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let rows = report
            .results
            .iter()
            .map(|result| result.export_row(self.options.rounding))
            .collect::<Result<Vec<_>>>()?;

        let path = self.sink.export(&rows).map_err(|e| {
            error!("Export failed: {}", e);
            if e.kind() == ErrorKind::Export {
                e
            } else {
                Error::Export(e.to_string())
            }
        })?;

        report.export_path = Some(path);
        Ok(report)
    }

    /// Settle all merchants without exporting
    ///
    /// Results are in directory order. Under [`ErrorPolicy::Skip`] failed
    /// merchants are listed in the report; under [`ErrorPolicy::Abort`] the
    /// first failure ends the run.
    pub async fn settle(&self) -> Result<SettlementReport> {
        info!("Starting settlement run");

        let directory = &self.directory;
        let ids = self
            .guarded("fetch merchant list", || directory.fetch_merchant_ids())
            .await?;

        let ids = dedup_ids(ids);
        info!("Found {} merchants", ids.len());

        let mut report = SettlementReport::default();

        for id in ids {
            if self.cancel.is_cancelled() {
                warn!("Settlement run cancelled before merchant {}", id);
                return Err(Error::Cancelled);
            }

            match self.settle_merchant(&id).await {
                Ok(result) => report.results.push(result),
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => match self.options.error_policy {
                    ErrorPolicy::Abort => {
                        error!("Merchant {} failed, aborting run: {}", id, e);
                        return Err(e.for_merchant(id.as_str()));
                    }
                    ErrorPolicy::Skip => {
                        warn!(merchant_id = %id, kind = %e.kind(), "Skipping merchant: {}", e);
                        report.failures.push(MerchantFailure {
                            merchant_id: id,
                            kind: e.kind(),
                            message: e.to_string(),
                        });
                    }
                },
            }
        }

        info!(
            "Settlement run complete: {} settled, {} failed",
            report.results.len(),
            report.failures.len()
        );

        Ok(report)
    }

    async fn settle_merchant(&self, id: &MerchantId) -> Result<SettlementResult> {
        debug!("Settling merchant {}", id);

        let directory = &self.directory;
        let merchant = self
            .guarded(&format!("fetch merchant {}", id), || directory.fetch_merchant(id))
            .await?;

        let result = self.calculator.compute(&merchant)?;

        // The net amount must round into an export row; checked here so the
        // failure falls under the error policy rather than sinking the batch.
        result.export_row(self.options.rounding)?;

        Ok(result)
    }

    /// Run a directory call under timeout, retry and cancellation
    async fn guarded<T, F, Fut>(&self, operation: &str, call: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let timeout = self.options.fetch_timeout;
        let call = &call;

        let attempt = || async move {
            match tokio::time::timeout(timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout {
                    millis: timeout.as_millis() as u64,
                    operation: operation.to_string(),
                }),
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            result = self.retry.execute(attempt, operation) => result,
        }
    }
}

/// Drop repeated ids, keeping the first occurrence
fn dedup_ids(ids: Vec<MerchantId>) -> Vec<MerchantId> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.into_iter()
        .filter(|id| {
            let first = seen.insert(id.clone());
            if !first {
                warn!("Duplicate merchant id {} in directory listing, ignoring", id);
            }
            first
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_keeps_first_occurrence_order() {
        let ids = vec![
            MerchantId::new("b"),
            MerchantId::new("a"),
            MerchantId::new("b"),
            MerchantId::new("c"),
            MerchantId::new("a"),
        ];

        assert_eq!(
            dedup_ids(ids),
            vec![MerchantId::new("b"), MerchantId::new("a"), MerchantId::new("c")]
        );
    }

    #[test]
    fn test_options_from_config() {
        let mut config = Config::default();
        config.directory.fetch_timeout_seconds = 5;
        config.export.rounding = RoundingRule::Floor;
        config.pipeline.error_policy = ErrorPolicy::Skip;

        let options = PipelineOptions::from(&config);
        assert_eq!(options.fetch_timeout, Duration::from_secs(5));
        assert_eq!(options.rounding, RoundingRule::Floor);
        assert_eq!(options.error_policy, ErrorPolicy::Skip);
    }
}
