use anyhow::{Context, Result};
use askama::Template;

use crate::exports::{CSV_EXPORTS, MANIFEST_FILE, PARQUET_EXPORT};
use crate::stats::{by_count_desc, DashboardStats};
use crate::format_thousands;

/// Months shown in the trends table, most recent last.
const RECENT_MONTHS: usize = 6;

#[derive(Debug, Clone)]
pub struct ShareRow {
    pub name: String,
    pub percent: String,
}

#[derive(Debug, Clone)]
pub struct PriceShareRow {
    pub name: String,
    pub count: usize,
    pub avg_price: String,
    pub percent: String,
}

#[derive(Debug, Clone)]
pub struct MonthRow {
    pub month: String,
    pub count: usize,
    pub percent: String,
    pub avg_price: String,
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub generated_at: String,
    pub timezone: String,
    pub currency: String,
    pub total_listings: String,
    pub avg_price: String,
    pub avg_mileage: String,
    pub avg_age: String,
    pub model_rows: Vec<ShareRow>,
    pub region_rows: Vec<PriceShareRow>,
    pub fuel_rows: Vec<PriceShareRow>,
    pub municipality_rows: Vec<PriceShareRow>,
    pub month_rows: Vec<MonthRow>,
    pub downloads: Vec<&'static str>,
}

fn pct(value: f64) -> String {
    format!("{value:.1}%")
}

fn or_na(value: Option<String>) -> String {
    value.unwrap_or_else(|| "n/a".to_string())
}

impl IndexTemplate {
    pub fn new(stats: &DashboardStats, generated_at: String, timezone: &str, currency: &str) -> Self {
        let price_rows = |rows: &[crate::stats::GroupRow]| {
            rows.iter()
                .map(|r| PriceShareRow {
                    name: r.name.clone(),
                    count: r.count,
                    avg_price: format_thousands(r.avg_price),
                    percent: pct(r.percent),
                })
                .collect::<Vec<_>>()
        };
        let skip = stats.monthly.len().saturating_sub(RECENT_MONTHS);

        let mut downloads: Vec<&'static str> = CSV_EXPORTS.to_vec();
        downloads.push(PARQUET_EXPORT);
        downloads.push(MANIFEST_FILE);

        Self {
            generated_at,
            timezone: timezone.to_string(),
            currency: currency.to_string(),
            total_listings: format_thousands(stats.total_listings as f64),
            avg_price: or_na(stats.avg_price.map(format_thousands)),
            avg_mileage: or_na(stats.avg_mileage.map(format_thousands)),
            avg_age: or_na(stats.avg_age.map(|a| format!("{a:.1}"))),
            model_rows: stats
                .models
                .iter()
                .map(|m| ShareRow {
                    name: m.name.clone(),
                    percent: pct(m.percent),
                })
                .collect(),
            region_rows: price_rows(&by_count_desc(&stats.regions)),
            fuel_rows: price_rows(&by_count_desc(&stats.fuels)),
            municipality_rows: price_rows(&stats.municipalities),
            month_rows: stats
                .monthly
                .iter()
                .skip(skip)
                .map(|m| MonthRow {
                    month: m.period.clone(),
                    count: m.count,
                    percent: pct(m.percent),
                    avg_price: or_na(m.avg_price.map(format_thousands)),
                })
                .collect(),
            downloads,
        }
    }
}

pub fn render_index(
    stats: &DashboardStats,
    generated_at: String,
    timezone: &str,
    currency: &str,
) -> Result<String> {
    IndexTemplate::new(stats, generated_at, timezone, currency)
        .render()
        .context("rendering index.html")
}
