//! The scrape step: listing pages, then detail pages, into one snapshot.

use std::collections::HashSet;
use std::sync::Arc;

use carlog_adapters::{AdapterError, SourceAdapter};
use carlog_core::{format_scrape_date, ListingAttributes, ListingRecord};
use carlog_storage::HttpFetcher;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ScrapeOptions {
    pub pages: usize,
    pub max_detail_failure_ratio: f64,
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        Self {
            pages: 20,
            max_detail_failure_ratio: 0.5,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScrapeReport {
    pub source_id: String,
    pub scrape_date: String,
    pub pages_fetched: usize,
    pub links_found: usize,
    pub details_ok: usize,
    pub details_failed: usize,
}

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("listing page {page} failed: {source}")]
    ListingPage {
        page: usize,
        #[source]
        source: AdapterError,
    },
    #[error("{failed} of {attempted} detail pages failed, above the allowed ratio {max_ratio}")]
    TooManyFailures {
        failed: usize,
        attempted: usize,
        max_ratio: f64,
    },
}

/// Walks listing pages `1..=pages` in order, stopping early at the first page
/// without links, and returns the unique detail URLs in first-seen order.
async fn collect_links(
    adapter: &dyn SourceAdapter,
    http: &HttpFetcher,
    pages: usize,
) -> Result<(Vec<String>, usize), ScrapeError> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();
    let mut pages_fetched = 0;
    for page in 1..=pages {
        let found = adapter
            .fetch_listing(http, page)
            .await
            .map_err(|source| ScrapeError::ListingPage { page, source })?;
        pages_fetched += 1;
        if found.is_empty() {
            debug!(page, "listing page without links; stopping pagination");
            break;
        }
        for link in found {
            if seen.insert(link.clone()) {
                links.push(link);
            }
        }
    }
    Ok((links, pages_fetched))
}

/// Scrape one snapshot. Every row carries the same `scraped_at` timestamp and
/// rows keep the order their links were found in.
///
/// Detail fetches are spawned together; `http` caps how many are in flight.
pub async fn scrape_snapshot(
    adapter: Arc<dyn SourceAdapter>,
    http: Arc<HttpFetcher>,
    options: &ScrapeOptions,
    scraped_at: DateTime<Utc>,
) -> Result<(Vec<ListingRecord>, ScrapeReport), ScrapeError> {
    let scrape_date = format_scrape_date(scraped_at);
    let (links, pages_fetched) = collect_links(adapter.as_ref(), &http, options.pages).await?;
    info!(source = adapter.source_id(), pages = pages_fetched, links = links.len(), "collected listing links");
    if links.is_empty() {
        warn!(source = adapter.source_id(), "no listing links found; snapshot will be empty");
    }

    let mut tasks = JoinSet::new();
    for (idx, url) in links.iter().cloned().enumerate() {
        let adapter = Arc::clone(&adapter);
        let http = Arc::clone(&http);
        tasks.spawn(async move {
            let result = adapter.fetch_detail(&http, &url).await;
            (idx, url, result)
        });
    }

    let mut details: Vec<Option<ListingAttributes>> = vec![None; links.len()];
    let mut failed = 0usize;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((idx, _, Ok(attrs))) => details[idx] = Some(attrs),
            Ok((_, url, Err(err))) => {
                warn!(url = %url, error = %err, "skipping listing detail");
                failed += 1;
            }
            Err(err) => {
                warn!(error = %err, "detail task did not complete");
                failed += 1;
            }
        }
    }

    let attempted = links.len();
    if attempted > 0 && failed as f64 / attempted as f64 > options.max_detail_failure_ratio {
        return Err(ScrapeError::TooManyFailures {
            failed,
            attempted,
            max_ratio: options.max_detail_failure_ratio,
        });
    }

    let rows: Vec<ListingRecord> = links
        .into_iter()
        .zip(details)
        .filter_map(|(url, attrs)| Some(ListingRecord::new(scrape_date.clone(), url, attrs?)))
        .collect();
    let report = ScrapeReport {
        source_id: adapter.source_id().to_string(),
        scrape_date,
        pages_fetched,
        links_found: attempted,
        details_ok: rows.len(),
        details_failed: failed,
    };
    info!(ok = report.details_ok, failed = report.details_failed, "scraped listing details");
    Ok((rows, report))
}
