//! Static dashboard generation for the historical listings log, plus a small
//! axum server to preview the rendered directory locally.
//!
//! A render reads the whole history, recomputes every aggregate, and writes
//! all assets into a staging directory that replaces the output directory in
//! one rename.

pub mod charts;
pub mod exports;
pub mod page;
pub mod serve;
pub mod stats;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use carlog_core::ListingRecord;
use carlog_storage::{read_listings, replace_dir};
use chrono::{DateTime, Datelike, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::{info, info_span, warn};
use uuid::Uuid;

pub use exports::Asset;
pub use serve::{preview_app, serve_preview};

pub const CRATE_NAME: &str = "carlog-web";
pub const INDEX_FILE: &str = "index.html";

#[derive(Debug, Clone)]
pub struct DashboardOptions {
    pub timezone: Tz,
    pub currency: String,
    /// Reference instant for listing age and the page timestamp.
    pub as_of: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardSummary {
    pub output_dir: String,
    pub history_rows: usize,
    pub clean_rows: usize,
    pub other_currency_rows: usize,
    pub unparseable_rows: usize,
    pub outlier_rows: usize,
    /// Inclusive price fences of the outlier filter; `None` without priced rows.
    pub price_lower: Option<f64>,
    pub price_upper: Option<f64>,
    pub assets: usize,
}

/// Integer rendering with `,` thousands separators.
pub fn format_thousands(value: f64) -> String {
    if !value.is_finite() {
        return String::new();
    }
    let rounded = value.round() as i64;
    let digits = rounded.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if rounded < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

pub struct RenderedDashboard {
    pub assets: Vec<Asset>,
    pub summary: DashboardSummary,
}

/// Computes every dashboard asset in memory, manifest last.
pub fn build_assets(rows: &[ListingRecord], options: &DashboardOptions) -> Result<RenderedDashboard> {
    let local_now = options.as_of.with_timezone(&options.timezone);
    let cleaned = stats::prepare(rows, &options.currency, local_now.year(), options.timezone);
    let stats = stats::compute(&cleaned.listings);

    let mut assets: Vec<Asset> = charts::render_all(&stats, &options.currency)
        .context("rendering charts")?
        .into_iter()
        .map(|chart| Asset::new(chart.file_name, chart.svg.into_bytes()))
        .collect();
    assets.extend(exports::csv_assets(&cleaned.listings, &stats)?);
    assets.push(Asset::new(
        exports::PARQUET_EXPORT,
        exports::listings_parquet(&cleaned.listings)?,
    ));
    let html = page::render_index(
        &stats,
        local_now.format("%Y-%m-%d %H:%M %Z").to_string(),
        options.timezone.name(),
        &options.currency,
    )?;
    assets.push(Asset::new(INDEX_FILE, html.into_bytes()));
    let manifest = exports::manifest(&assets)?;
    assets.push(manifest);

    let summary = DashboardSummary {
        output_dir: String::new(),
        history_rows: cleaned.history_rows,
        clean_rows: cleaned.listings.len(),
        other_currency_rows: cleaned.other_currency_rows,
        unparseable_rows: cleaned.unparseable_rows,
        outlier_rows: cleaned.outlier_rows,
        price_lower: cleaned.bounds.map(|b| b.lower),
        price_upper: cleaned.bounds.map(|b| b.upper),
        assets: assets.len(),
    };
    Ok(RenderedDashboard { assets, summary })
}

fn staging_dir_for(out_dir: &Path) -> PathBuf {
    let name = out_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "dashboard".to_string());
    out_dir.with_file_name(format!(".{name}.{}.staging", Uuid::new_v4()))
}

fn write_assets(dir: &Path, assets: &[Asset]) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    for asset in assets {
        let path = dir.join(&asset.name);
        fs::write(&path, &asset.bytes).with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(())
}

/// Regenerate the dashboard in `out_dir` from the history CSV.
///
/// A missing history renders an empty dashboard. On any failure the previous
/// contents of `out_dir` are left untouched.
pub fn render_dashboard(
    history_path: &Path,
    out_dir: &Path,
    options: &DashboardOptions,
) -> Result<DashboardSummary> {
    let span = info_span!("dashboard", out_dir = %out_dir.display());
    let _guard = span.enter();

    let rows = match read_listings(history_path)? {
        Some(rows) => rows,
        None => {
            warn!(path = %history_path.display(), "no history yet; rendering an empty dashboard");
            Vec::new()
        }
    };
    let RenderedDashboard { assets, mut summary } = build_assets(&rows, options)?;

    let staging = staging_dir_for(out_dir);
    if let Err(err) = write_assets(&staging, &assets).and_then(|_| replace_dir(&staging, out_dir)) {
        if staging.exists() {
            let _ = fs::remove_dir_all(&staging);
        }
        return Err(err);
    }

    summary.output_dir = out_dir.display().to_string();
    info!(
        history_rows = summary.history_rows,
        clean_rows = summary.clean_rows,
        assets = summary.assets,
        "dashboard rendered"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use carlog_core::{parse_timezone, ListingAttributes};
    use carlog_storage::write_listings;
    use chrono::TimeZone;

    fn options() -> DashboardOptions {
        DashboardOptions {
            timezone: parse_timezone("Europe/Tirane").unwrap(),
            currency: "EUR".into(),
            as_of: Utc.with_ymd_and_hms(2024, 6, 1, 6, 0, 0).unwrap(),
        }
    }

    fn history() -> Vec<ListingRecord> {
        let models = [("Golf", "6500", "Tiranë"), ("Golf", "7200", "Durrës"), ("Yaris", "9800", "Vlorë"), ("Passat", "5400", "Fier")];
        let mut rows = Vec::new();
        for (day, date) in ["2024-05-01T06:00:00Z", "2024-05-03T06:00:00Z"].iter().enumerate() {
            for (i, (model, price, municipality)) in models.iter().enumerate() {
                rows.push(ListingRecord::new(
                    *date,
                    format!("https://www.merrjep.al/njoftim/{day}-{i}"),
                    ListingAttributes {
                        year: "2014".into(),
                        transmission: "Manual".into(),
                        mileage: "150 000 - 174 999".into(),
                        fuel: if i % 2 == 0 { "Naftë".into() } else { "Benzinë".into() },
                        municipality: (*municipality).into(),
                        make: "VW".into(),
                        model: (*model).into(),
                        price_value: (*price).into(),
                        price_currency: "EUR".into(),
                        ..Default::default()
                    },
                ));
            }
        }
        rows
    }

    fn read_dir_sorted(dir: &Path) -> Vec<(String, Vec<u8>)> {
        let mut files: Vec<(String, Vec<u8>)> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap())
            .map(|e| (e.file_name().to_string_lossy().to_string(), fs::read(e.path()).unwrap()))
            .collect();
        files.sort();
        files
    }

    #[test]
    fn thousands_are_grouped() {
        assert_eq!(format_thousands(0.0), "0");
        assert_eq!(format_thousands(999.4), "999");
        assert_eq!(format_thousands(1234567.0), "1,234,567");
        assert_eq!(format_thousands(-4500.0), "-4,500");
        assert_eq!(format_thousands(f64::NAN), "");
    }

    #[test]
    fn render_writes_every_asset_and_replaces_previous_output() {
        let dir = tempfile::tempdir().unwrap();
        let history_path = dir.path().join("historical_listings.csv");
        write_listings(&history_path, &history()).unwrap();
        let out = dir.path().join("docs");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("stale.png"), "old").unwrap();

        let summary = render_dashboard(&history_path, &out, &options()).unwrap();
        assert_eq!(summary.history_rows, 8);
        assert_eq!(summary.clean_rows, 8);
        assert_eq!(summary.assets, 9 + 15 + 1 + 1 + 1);
        assert_eq!(summary.price_lower, Some(3787.5));
        assert_eq!(summary.price_upper, Some(10287.5));

        assert!(!out.join("stale.png").exists());
        for name in exports::CSV_EXPORTS.iter().chain([INDEX_FILE, "manifest.json", "heatmap_model_year.svg"].iter()) {
            assert!(out.join(name).exists(), "{name}");
        }
        let html = fs::read_to_string(out.join(INDEX_FILE)).unwrap();
        assert!(html.contains("<p>8</p>"));
        assert!(html.contains("2024-06-01 08:00 CEST"));

        let daily = fs::read_to_string(out.join("daily_volume.csv")).unwrap();
        assert_eq!(daily, "date,count\n2024-05-01,4\n2024-05-02,0\n2024-05-03,4\n");

        let siblings: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(siblings.len(), 2, "{siblings:?}");
    }

    #[test]
    fn same_history_and_instant_render_identical_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let history_path = dir.path().join("historical_listings.csv");
        write_listings(&history_path, &history()).unwrap();

        render_dashboard(&history_path, &dir.path().join("a"), &options()).unwrap();
        render_dashboard(&history_path, &dir.path().join("b"), &options()).unwrap();
        assert_eq!(read_dir_sorted(&dir.path().join("a")), read_dir_sorted(&dir.path().join("b")));
    }

    #[test]
    fn missing_history_renders_empty_dashboard() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("docs");
        let summary = render_dashboard(&dir.path().join("none.csv"), &out, &options()).unwrap();
        assert_eq!(summary.clean_rows, 0);
        assert_eq!(summary.price_upper, None);
        let html = fs::read_to_string(out.join(INDEX_FILE)).unwrap();
        assert!(html.contains("<p>0</p>"));
    }

    #[test]
    fn failed_render_keeps_previous_dashboard() {
        let dir = tempfile::tempdir().unwrap();
        let history_path = dir.path().join("historical_listings.csv");
        fs::write(&history_path, "url,price\nhttps://a,1\n").unwrap();
        let out = dir.path().join("docs");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join(INDEX_FILE), "previous").unwrap();

        assert!(render_dashboard(&history_path, &out, &options()).is_err());
        assert_eq!(fs::read_to_string(out.join(INDEX_FILE)).unwrap(), "previous");
    }
}
