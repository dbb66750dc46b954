//! Cleaning and aggregation of the historical log for the dashboard.
//!
//! Everything here is pure over `ListingRecord`s so the same history always
//! produces the same tables, in the same order.

use std::collections::{BTreeMap, BTreeSet};

use carlog_core::{ListingRecord, ScrapeInstant};
use chrono::{Datelike, NaiveDate};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::{debug, warn};

pub const TOP_MODELS: usize = 20;
pub const DEPRECIATION_MODELS: usize = 8;
pub const TIMELINE_MODELS: usize = 10;
pub const TOP_MUNICIPALITIES: usize = 10;
pub const MILEAGE_BINS: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Region {
    Tirane,
    Durres,
    Vlore,
    Other,
}

impl Region {
    /// Buckets a free-text municipality by substring, first match wins.
    pub fn from_municipality(municipality: &str) -> Self {
        let lower = municipality.to_lowercase();
        if lower.contains("tir") {
            Self::Tirane
        } else if lower.contains("dur") {
            Self::Durres
        } else if lower.contains("vl") {
            Self::Vlore
        } else {
            Self::Other
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tirane => "Tirane",
            Self::Durres => "Durres",
            Self::Vlore => "Vlore",
            Self::Other => "Other",
        }
    }
}

/// A history row that survived cleaning, with its numeric columns parsed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanListing {
    pub scrape_date: String,
    pub listing_url: String,
    pub year: i32,
    pub transmission: String,
    pub mileage: i64,
    pub fuel: String,
    pub municipality: String,
    pub color: String,
    pub make: String,
    pub model: String,
    pub price_value: String,
    pub price_currency: String,
    pub price: f64,
    pub age: i32,
    pub region: Region,
    #[serde(skip)]
    pub local_date: Option<NaiveDate>,
}

/// Lower bound of a mileage range such as `"100 000 - 124 999"`.
pub fn parse_mileage(raw: &str) -> Option<i64> {
    let low = raw.split('-').next().unwrap_or_default();
    let digits: String = low.chars().filter(|c| !c.is_whitespace()).collect();
    digits.parse().ok()
}

fn parse_year(raw: &str) -> Option<i32> {
    raw.trim().parse().ok()
}

fn parse_price(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|p| p.is_finite())
}

/// Linear-interpolated quantile of an ascending slice.
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceBounds {
    pub q1: f64,
    pub q3: f64,
    pub lower: f64,
    pub upper: f64,
}

impl PriceBounds {
    pub fn contains(&self, price: f64) -> bool {
        price >= self.lower && price <= self.upper
    }
}

/// Tukey fences on price; the lower fence never goes below zero.
pub fn iqr_bounds(prices: &[f64]) -> Option<PriceBounds> {
    let mut sorted = prices.to_vec();
    sorted.sort_by(f64::total_cmp);
    let q1 = quantile(&sorted, 0.25)?;
    let q3 = quantile(&sorted, 0.75)?;
    let iqr = q3 - q1;
    Some(PriceBounds {
        q1,
        q3,
        lower: (q1 - 1.5 * iqr).max(0.0),
        upper: q3 + 1.5 * iqr,
    })
}

#[derive(Debug, Clone)]
pub struct Cleaned {
    pub listings: Vec<CleanListing>,
    pub history_rows: usize,
    pub other_currency_rows: usize,
    pub unparseable_rows: usize,
    pub outlier_rows: usize,
    pub undated_rows: usize,
    pub bounds: Option<PriceBounds>,
}

/// Filters to `currency`, parses numeric columns, drops price outliers and
/// derives age, region and the local scrape date in `tz`.
pub fn prepare(rows: &[ListingRecord], currency: &str, as_of_year: i32, tz: Tz) -> Cleaned {
    let in_currency: Vec<&ListingRecord> = rows
        .iter()
        .filter(|r| r.price_currency.trim().eq_ignore_ascii_case(currency.trim()))
        .collect();
    let other_currency_rows = rows.len() - in_currency.len();

    let parsed: Vec<(&ListingRecord, i32, f64, i64)> = in_currency
        .iter()
        .filter_map(|r| {
            Some((
                *r,
                parse_year(&r.year)?,
                parse_price(&r.price_value)?,
                parse_mileage(&r.mileage)?,
            ))
        })
        .collect();
    let unparseable_rows = in_currency.len() - parsed.len();

    let prices: Vec<f64> = parsed.iter().map(|(_, _, price, _)| *price).collect();
    let bounds = iqr_bounds(&prices);

    let mut undated_rows = 0usize;
    let mut listings = Vec::with_capacity(parsed.len());
    for (row, year, price, mileage) in parsed {
        if !bounds.is_some_and(|b| b.contains(price)) {
            continue;
        }
        let local_date = match ScrapeInstant::parse(&row.scrape_date) {
            Ok(instant) => Some(instant.local_date(tz)),
            Err(err) => {
                debug!(error = %err, url = %row.listing_url, "row left out of time series");
                undated_rows += 1;
                None
            }
        };
        listings.push(CleanListing {
            scrape_date: row.scrape_date.clone(),
            listing_url: row.listing_url.clone(),
            year,
            transmission: row.transmission.clone(),
            mileage,
            fuel: row.fuel.clone(),
            municipality: row.municipality.clone(),
            color: row.color.clone(),
            make: row.make.clone(),
            model: row.model.clone(),
            price_value: row.price_value.clone(),
            price_currency: row.price_currency.clone(),
            price,
            age: as_of_year - year,
            region: Region::from_municipality(&row.municipality),
            local_date,
        });
    }
    if undated_rows > 0 {
        warn!(rows = undated_rows, "unparseable scrape_date values; rows excluded from time series");
    }

    let outlier_rows = prices.len() - listings.len();
    Cleaned {
        listings,
        history_rows: rows.len(),
        other_currency_rows,
        unparseable_rows,
        outlier_rows,
        undated_rows,
        bounds,
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Acc {
    count: usize,
    sum: f64,
}

impl Acc {
    fn add(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
    }

    fn mean(self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let mut acc = Acc::default();
    values.for_each(|v| acc.add(v));
    acc.mean()
}

fn percent(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupRow {
    pub name: String,
    pub count: usize,
    pub avg_price: f64,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodRow {
    pub period: String,
    pub count: usize,
    pub avg_price: Option<f64>,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramBin {
    pub start: f64,
    pub end: f64,
    pub count: usize,
}

/// Average price per age for one model, ages ascending.
#[derive(Debug, Clone, PartialEq)]
pub struct DepreciationCurve {
    pub model: String,
    pub points: Vec<(i32, f64)>,
}

/// Monthly average price for one model, aligned to `DashboardStats::monthly`.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelTimeline {
    pub model: String,
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Heatmap {
    pub models: Vec<String>,
    pub years: Vec<i32>,
    /// `cells[model][year]`
    pub cells: Vec<Vec<Option<f64>>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardStats {
    pub total_listings: usize,
    pub avg_price: Option<f64>,
    pub avg_mileage: Option<f64>,
    pub avg_age: Option<f64>,
    /// Alphabetical.
    pub fuels: Vec<GroupRow>,
    /// Most listed first, at most `TOP_MODELS`.
    pub models: Vec<GroupRow>,
    /// Alphabetical.
    pub regions: Vec<GroupRow>,
    /// Highest average price first, at most `TOP_MUNICIPALITIES`.
    pub municipalities: Vec<GroupRow>,
    pub daily: Vec<PeriodRow>,
    pub monthly: Vec<PeriodRow>,
    pub mileage_bins: Vec<HistogramBin>,
    pub depreciation: Vec<DepreciationCurve>,
    pub model_timelines: Vec<ModelTimeline>,
    pub heatmap: Heatmap,
}

pub fn by_count_desc(rows: &[GroupRow]) -> Vec<GroupRow> {
    let mut sorted = rows.to_vec();
    sorted.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    sorted
}

pub fn by_avg_price_desc(rows: &[GroupRow]) -> Vec<GroupRow> {
    let mut sorted = rows.to_vec();
    sorted.sort_by(|a, b| {
        b.avg_price
            .total_cmp(&a.avg_price)
            .then_with(|| a.name.cmp(&b.name))
    });
    sorted
}

fn group_rows<'a, F>(listings: &'a [CleanListing], key: F) -> Vec<GroupRow>
where
    F: Fn(&'a CleanListing) -> &'a str,
{
    let mut groups: BTreeMap<&str, Acc> = BTreeMap::new();
    for listing in listings {
        let name = key(listing).trim();
        if name.is_empty() {
            continue;
        }
        groups.entry(name).or_default().add(listing.price);
    }
    groups
        .into_iter()
        .map(|(name, acc)| GroupRow {
            name: name.to_string(),
            count: acc.count,
            avg_price: acc.mean().unwrap_or_default(),
            percent: percent(acc.count, listings.len()),
        })
        .collect()
}

fn next_month((year, month): (i32, u32)) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

fn month_of(date: NaiveDate) -> (i32, u32) {
    (date.year(), date.month())
}

fn month_label((year, month): (i32, u32)) -> String {
    format!("{year:04}-{month:02}")
}

/// Every month from the first to the last dated listing, inclusive.
fn month_span(listings: &[CleanListing]) -> Vec<(i32, u32)> {
    let months: BTreeSet<(i32, u32)> = listings
        .iter()
        .filter_map(|l| l.local_date.map(month_of))
        .collect();
    let (Some(first), Some(last)) = (months.first().copied(), months.last().copied()) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    let mut month = first;
    while month <= last {
        out.push(month);
        month = next_month(month);
    }
    out
}

fn daily_rows(listings: &[CleanListing]) -> Vec<PeriodRow> {
    let mut by_day: BTreeMap<NaiveDate, Acc> = BTreeMap::new();
    for listing in listings {
        if let Some(day) = listing.local_date {
            by_day.entry(day).or_default().add(listing.price);
        }
    }
    let (Some(first), Some(last)) = (
        by_day.keys().next().copied(),
        by_day.keys().next_back().copied(),
    ) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    let mut day = first;
    loop {
        let acc = by_day.get(&day).copied().unwrap_or_default();
        out.push(PeriodRow {
            period: day.format("%Y-%m-%d").to_string(),
            count: acc.count,
            avg_price: acc.mean(),
            percent: percent(acc.count, listings.len()),
        });
        match day.succ_opt() {
            Some(next) if next <= last => day = next,
            _ => break,
        }
    }
    out
}

fn monthly_rows(listings: &[CleanListing], months: &[(i32, u32)]) -> Vec<PeriodRow> {
    let mut by_month: BTreeMap<(i32, u32), Acc> = BTreeMap::new();
    for listing in listings {
        if let Some(day) = listing.local_date {
            by_month.entry(month_of(day)).or_default().add(listing.price);
        }
    }
    months
        .iter()
        .map(|month| {
            let acc = by_month.get(month).copied().unwrap_or_default();
            PeriodRow {
                period: month_label(*month),
                count: acc.count,
                avg_price: acc.mean(),
                percent: percent(acc.count, listings.len()),
            }
        })
        .collect()
}

/// Equal-width bins between the smallest and largest mileage, last bin closed.
pub fn mileage_histogram(mileages: &[i64], bins: usize) -> Vec<HistogramBin> {
    let (Some(min), Some(max)) = (mileages.iter().min(), mileages.iter().max()) else {
        return Vec::new();
    };
    let bins = bins.max(1);
    let (lo, hi) = if min == max {
        (*min as f64 - 0.5, *max as f64 + 0.5)
    } else {
        (*min as f64, *max as f64)
    };
    let width = (hi - lo) / bins as f64;

    let mut counts = vec![0usize; bins];
    for mileage in mileages {
        let idx = ((*mileage as f64 - lo) / width).floor() as usize;
        counts[idx.min(bins - 1)] += 1;
    }
    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBin {
            start: lo + width * i as f64,
            end: lo + width * (i + 1) as f64,
            count,
        })
        .collect()
}

fn depreciation_curves(listings: &[CleanListing], models: &[GroupRow]) -> Vec<DepreciationCurve> {
    models
        .iter()
        .take(DEPRECIATION_MODELS)
        .map(|m| {
            let mut by_age: BTreeMap<i32, Acc> = BTreeMap::new();
            for listing in listings.iter().filter(|l| l.model.trim() == m.name) {
                by_age.entry(listing.age).or_default().add(listing.price);
            }
            DepreciationCurve {
                model: m.name.clone(),
                points: by_age
                    .into_iter()
                    .filter_map(|(age, acc)| Some((age, acc.mean()?)))
                    .collect(),
            }
        })
        .collect()
}

fn model_timelines(
    listings: &[CleanListing],
    models: &[GroupRow],
    months: &[(i32, u32)],
) -> Vec<ModelTimeline> {
    models
        .iter()
        .take(TIMELINE_MODELS)
        .map(|m| {
            let mut by_month: BTreeMap<(i32, u32), Acc> = BTreeMap::new();
            for listing in listings.iter().filter(|l| l.model.trim() == m.name) {
                if let Some(day) = listing.local_date {
                    by_month.entry(month_of(day)).or_default().add(listing.price);
                }
            }
            ModelTimeline {
                model: m.name.clone(),
                values: months
                    .iter()
                    .map(|month| by_month.get(month).and_then(|acc| acc.mean()))
                    .collect(),
            }
        })
        .collect()
}

fn heatmap(listings: &[CleanListing], models: &[GroupRow]) -> Heatmap {
    let mut cells: BTreeMap<(&str, i32), Acc> = BTreeMap::new();
    let mut years = BTreeSet::new();
    for listing in listings {
        let model = listing.model.trim();
        if models.iter().any(|m| m.name == model) {
            cells.entry((model, listing.year)).or_default().add(listing.price);
            years.insert(listing.year);
        }
    }
    let years: Vec<i32> = years.into_iter().collect();
    Heatmap {
        models: models.iter().map(|m| m.name.clone()).collect(),
        cells: models
            .iter()
            .map(|m| {
                years
                    .iter()
                    .map(|y| cells.get(&(m.name.as_str(), *y)).and_then(|acc| acc.mean()))
                    .collect()
            })
            .collect(),
        years,
    }
}

pub fn compute(listings: &[CleanListing]) -> DashboardStats {
    let models: Vec<GroupRow> = by_count_desc(&group_rows(listings, |l| l.model.as_str()))
        .into_iter()
        .take(TOP_MODELS)
        .collect();
    let municipalities = by_avg_price_desc(&group_rows(listings, |l| l.municipality.as_str()))
        .into_iter()
        .take(TOP_MUNICIPALITIES)
        .collect();
    let months = month_span(listings);
    let mileages: Vec<i64> = listings.iter().map(|l| l.mileage).collect();

    DashboardStats {
        total_listings: listings.len(),
        avg_price: mean(listings.iter().map(|l| l.price)),
        avg_mileage: mean(listings.iter().map(|l| l.mileage as f64)),
        avg_age: mean(listings.iter().map(|l| l.age as f64)),
        fuels: group_rows(listings, |l| l.fuel.as_str()),
        regions: group_rows(listings, |l| l.region.as_str()),
        municipalities,
        daily: daily_rows(listings),
        monthly: monthly_rows(listings, &months),
        mileage_bins: mileage_histogram(&mileages, MILEAGE_BINS),
        depreciation: depreciation_curves(listings, &models),
        model_timelines: model_timelines(listings, &models, &months),
        heatmap: heatmap(listings, &models),
        models,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carlog_core::{parse_timezone, ListingAttributes};

    fn record(date: &str, url: &str, model: &str, price: &str) -> ListingRecord {
        ListingRecord::new(
            date,
            url,
            ListingAttributes {
                year: "2015".into(),
                mileage: "100 000 - 124 999".into(),
                fuel: "Naftë".into(),
                municipality: "Tiranë".into(),
                make: "Volkswagen".into(),
                model: model.into(),
                price_value: price.into(),
                price_currency: "EUR".into(),
                ..Default::default()
            },
        )
    }

    fn tirane() -> Tz {
        parse_timezone("Europe/Tirane").unwrap()
    }

    #[test]
    fn regions_match_by_substring_in_order() {
        assert_eq!(Region::from_municipality("Tiranë"), Region::Tirane);
        assert_eq!(Region::from_municipality("DURRËS"), Region::Durres);
        assert_eq!(Region::from_municipality("Vlorë"), Region::Vlore);
        assert_eq!(Region::from_municipality("Shkodër"), Region::Other);
        assert_eq!(Region::from_municipality(""), Region::Other);
    }

    #[test]
    fn mileage_takes_lower_bound_of_range() {
        assert_eq!(parse_mileage("100 000 - 124 999"), Some(100_000));
        assert_eq!(parse_mileage("0 - 4 999"), Some(0));
        assert_eq!(parse_mileage("250 000"), Some(250_000));
        assert_eq!(parse_mileage("mbi 500 000"), None);
        assert_eq!(parse_mileage(""), None);
    }

    #[test]
    fn iqr_fences_interpolate_and_clamp_at_zero() {
        let bounds = iqr_bounds(&[100.0, 10_000.0, 300.0, 200.0, 400.0]).unwrap();
        assert_eq!(bounds.q1, 200.0);
        assert_eq!(bounds.q3, 400.0);
        assert_eq!(bounds.lower, 0.0);
        assert_eq!(bounds.upper, 700.0);
        assert!(iqr_bounds(&[]).is_none());

        assert_eq!(quantile(&[1.0, 2.0], 0.25), Some(1.25));
    }

    #[test]
    fn prepare_drops_foreign_currency_unparseable_and_outliers() {
        let mut lek = record("2024-01-01", "https://a/lek", "Golf", "900000");
        lek.price_currency = "ALL".into();
        let mut no_year = record("2024-01-01", "https://a/no-year", "Golf", "5000");
        no_year.year = String::new();
        let mut lowercase = record("2024-01-01", "https://a/lower", "Golf", "5200");
        lowercase.price_currency = "eur".into();

        let rows = vec![
            record("2024-01-01", "https://a/1", "Golf", "5000"),
            record("2024-01-01", "https://a/2", "Golf", "5100"),
            record("2024-01-01", "https://a/3", "Passat", "4900"),
            record("2024-01-01", "https://a/4", "Passat", "5050"),
            record("2024-01-01", "https://a/typo", "Passat", "5000000"),
            lek,
            no_year,
            lowercase,
        ];
        let cleaned = prepare(&rows, "EUR", 2024, tirane());

        assert_eq!(cleaned.history_rows, 8);
        assert_eq!(cleaned.other_currency_rows, 1);
        assert_eq!(cleaned.unparseable_rows, 1);
        assert_eq!(cleaned.outlier_rows, 1);
        assert_eq!(cleaned.listings.len(), 5);
        assert!(cleaned.listings.iter().all(|l| l.age == 9 && l.region == Region::Tirane));
        assert!(cleaned.listings.iter().all(|l| l.mileage == 100_000));
    }

    #[test]
    fn time_series_bucket_by_local_date_and_fill_gaps() {
        let rows = vec![
            record("2024-01-30T23:30:00Z", "https://a/1", "Golf", "5000"),
            record("2024-02-02T08:00:00Z", "https://a/2", "Golf", "7000"),
            record("2024-03-31T22:30:00Z", "https://a/3", "Golf", "6000"),
        ];
        let cleaned = prepare(&rows, "EUR", 2024, tirane());
        let stats = compute(&cleaned.listings);

        let days: Vec<(&str, usize)> = stats.daily.iter().map(|d| (d.period.as_str(), d.count)).collect();
        assert_eq!(days.first(), Some(&("2024-01-31", 1)));
        assert_eq!(days[1], ("2024-02-01", 0));
        assert_eq!(days[2], ("2024-02-02", 1));
        assert_eq!(days.last(), Some(&("2024-04-01", 1)));
        assert_eq!(stats.daily[1].avg_price, None);

        let months: Vec<(&str, usize)> = stats.monthly.iter().map(|m| (m.period.as_str(), m.count)).collect();
        assert_eq!(months, vec![("2024-01", 1), ("2024-02", 1), ("2024-03", 0), ("2024-04", 1)]);
        assert_eq!(stats.model_timelines[0].values, vec![Some(5000.0), Some(7000.0), None, Some(6000.0)]);
    }

    #[test]
    fn undated_rows_count_in_totals_but_not_in_time_series() {
        let rows = vec![
            record("2024-01-01", "https://a/1", "Golf", "5000"),
            record("last tuesday", "https://a/2", "Golf", "5000"),
        ];
        let cleaned = prepare(&rows, "EUR", 2024, tirane());
        assert_eq!(cleaned.undated_rows, 1);
        let stats = compute(&cleaned.listings);
        assert_eq!(stats.total_listings, 2);
        assert_eq!(stats.daily.len(), 1);
        assert_eq!(stats.daily[0].count, 1);
        assert_eq!(stats.daily[0].percent, 50.0);
    }

    #[test]
    fn group_orderings_are_deterministic() {
        let rows = vec![
            record("2024-01-01", "https://a/1", "Polo", "3000"),
            record("2024-01-01", "https://a/2", "Golf", "5000"),
            record("2024-01-01", "https://a/3", "Astra", "4000"),
            record("2024-01-01", "https://a/4", "Golf", "5000"),
            record("2024-01-01", "https://a/5", "", "4000"),
        ];
        let cleaned = prepare(&rows, "EUR", 2024, tirane());
        let stats = compute(&cleaned.listings);

        let models: Vec<&str> = stats.models.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(models, vec!["Golf", "Astra", "Polo"]);
        assert_eq!(stats.models[0].percent, 40.0);
        assert_eq!(stats.heatmap.models, vec!["Golf", "Astra", "Polo"]);
        assert_eq!(stats.heatmap.years, vec![2015]);
        assert_eq!(stats.heatmap.cells[0], vec![Some(5000.0)]);
        assert_eq!(stats.depreciation[0].points, vec![(9, 5000.0)]);
    }

    #[test]
    fn histogram_covers_every_mileage_once() {
        let bins = mileage_histogram(&[0, 10, 20, 30, 300], MILEAGE_BINS);
        assert_eq!(bins.len(), MILEAGE_BINS);
        assert_eq!(bins.iter().map(|b| b.count).sum::<usize>(), 5);
        assert_eq!(bins[0].start, 0.0);
        assert_eq!(bins[MILEAGE_BINS - 1].end, 300.0);
        assert_eq!(bins[MILEAGE_BINS - 1].count, 1);

        let flat = mileage_histogram(&[5, 5], 4);
        assert_eq!(flat.iter().map(|b| b.count).sum::<usize>(), 2);
        assert!(mileage_histogram(&[], MILEAGE_BINS).is_empty());
    }

    #[test]
    fn empty_history_yields_empty_stats() {
        let cleaned = prepare(&[], "EUR", 2024, tirane());
        let stats = compute(&cleaned.listings);
        assert_eq!(stats.total_listings, 0);
        assert_eq!(stats.avg_price, None);
        assert!(stats.daily.is_empty());
        assert!(stats.heatmap.years.is_empty());
    }
}
