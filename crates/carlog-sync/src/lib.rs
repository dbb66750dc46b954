//! Daily pipeline orchestration: scrape a snapshot, merge it into the
//! history, regenerate the dashboard.

pub mod config;
pub mod merge;
pub mod scrape;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use carlog_adapters::{MerrjepAdapter, SourceAdapter};
use carlog_storage::{write_listings, HttpFetcher};
use carlog_web::{render_dashboard, DashboardOptions, DashboardSummary};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

pub use config::{ConfigError, PipelineConfig};
pub use merge::{merge_files, merge_records, MergeSummary};
pub use scrape::{scrape_snapshot, ScrapeError, ScrapeOptions, ScrapeReport};

pub const CRATE_NAME: &str = "carlog-sync";

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub scrape: ScrapeReport,
    pub merge: MergeSummary,
    pub dashboard: DashboardSummary,
}

pub struct Pipeline {
    config: PipelineConfig,
    adapter: Arc<dyn SourceAdapter>,
    http: Arc<HttpFetcher>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let adapter = Arc::new(MerrjepAdapter::new(config.source.clone()));
        Self::with_adapter(config, adapter)
    }

    pub fn with_adapter(config: PipelineConfig, adapter: Arc<dyn SourceAdapter>) -> Result<Self> {
        config.validate()?;
        let http = HttpFetcher::new(config.http_client_config())?;
        Ok(Self {
            config,
            adapter,
            http: Arc::new(http),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn scrape_options(&self) -> ScrapeOptions {
        ScrapeOptions {
            pages: self.config.scrape.pages,
            max_detail_failure_ratio: self.config.scrape.max_detail_failure_ratio,
        }
    }

    /// Scrape one snapshot and replace the snapshot file with it. The file is
    /// left as it was when the scrape fails.
    pub async fn scrape(&self, scraped_at: DateTime<Utc>) -> Result<ScrapeReport> {
        let (rows, report) = scrape_snapshot(
            Arc::clone(&self.adapter),
            Arc::clone(&self.http),
            &self.scrape_options(),
            scraped_at,
        )
        .await?;
        let path = &self.config.paths.snapshot;
        write_listings(path, &rows).with_context(|| format!("writing snapshot {}", path.display()))?;
        info!(path = %path.display(), rows = rows.len(), "snapshot written");
        Ok(report)
    }

    pub fn merge(&self) -> Result<MergeSummary> {
        merge_files(&self.config.paths.history, &self.config.paths.snapshot)
    }

    pub fn dashboard(&self, as_of: DateTime<Utc>) -> Result<DashboardSummary> {
        render_dashboard_with(&self.config, &self.config.paths.output_dir, as_of)
    }

    pub async fn run_once(&self) -> Result<RunSummary> {
        self.run_once_at(Utc::now()).await
    }

    /// Runs every stage in order. A failed stage stops the run and later
    /// stages are not attempted.
    pub async fn run_once_at(&self, now: DateTime<Utc>) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", %run_id);
        async move {
            let scrape = self.scrape(now).await.context("scrape stage")?;
            let merge = self.merge().context("merge stage")?;
            let dashboard = self.dashboard(now).context("dashboard stage")?;
            let finished_at = Utc::now();
            info!(
                added = merge.rows_added,
                history_rows = merge.history_rows_after,
                "daily run complete"
            );
            Ok(RunSummary {
                run_id,
                started_at: now,
                finished_at,
                scrape,
                merge,
                dashboard,
            })
        }
        .instrument(span)
        .await
    }
}

/// Render the dashboard for `config` into `out_dir` without building an HTTP client.
pub fn render_dashboard_with(config: &PipelineConfig, out_dir: &Path, as_of: DateTime<Utc>) -> Result<DashboardSummary> {
    let options = DashboardOptions {
        timezone: config.timezone()?,
        currency: config.dashboard.currency.clone(),
        as_of,
    };
    render_dashboard(&config.paths.history, out_dir, &options)
}
