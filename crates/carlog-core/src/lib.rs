//! Core listing model, dedupe key and scrape timestamp handling for carlog.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CRATE_NAME: &str = "carlog-core";

/// Bumped whenever `COLUMNS` changes; snapshot and history files share it.
pub const SCHEMA_VERSION: u32 = 1;

/// Column order of snapshot and history CSV files.
pub const COLUMNS: [&str; 12] = [
    "scrape_date",
    "listing_url",
    "year",
    "transmission",
    "mileage",
    "fuel",
    "municipality",
    "color",
    "make",
    "model",
    "price_value",
    "price_currency",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("unrecognized scrape_date `{0}`")]
    ScrapeDate(String),
    #[error("unknown time zone `{0}`")]
    TimeZone(String),
}

/// Attributes read off a single listing detail page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingAttributes {
    pub year: String,
    pub transmission: String,
    pub mileage: String,
    pub fuel: String,
    pub municipality: String,
    pub color: String,
    pub make: String,
    pub model: String,
    pub price_value: String,
    pub price_currency: String,
}

impl ListingAttributes {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// One row of a snapshot or of the historical log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub scrape_date: String,
    pub listing_url: String,
    #[serde(default)]
    pub year: String,
    #[serde(default)]
    pub transmission: String,
    #[serde(default)]
    pub mileage: String,
    #[serde(default)]
    pub fuel: String,
    #[serde(default)]
    pub municipality: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub make: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub price_value: String,
    #[serde(default)]
    pub price_currency: String,
}

impl ListingRecord {
    pub fn new(scrape_date: impl Into<String>, listing_url: impl Into<String>, attrs: ListingAttributes) -> Self {
        Self {
            scrape_date: scrape_date.into(),
            listing_url: listing_url.into(),
            year: attrs.year,
            transmission: attrs.transmission,
            mileage: attrs.mileage,
            fuel: attrs.fuel,
            municipality: attrs.municipality,
            color: attrs.color,
            make: attrs.make,
            model: attrs.model,
            price_value: attrs.price_value,
            price_currency: attrs.price_currency,
        }
    }

    pub fn dedupe_key(&self) -> DedupeKey {
        DedupeKey::new(&self.scrape_date, &self.listing_url)
    }

    pub fn scrape_instant(&self) -> Result<ScrapeInstant, CoreError> {
        ScrapeInstant::parse(&self.scrape_date)
    }
}

/// Identity of one listing observation: `(scrape_date, listing_url)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DedupeKey {
    pub scrape_date: String,
    pub listing_url: String,
}

impl DedupeKey {
    pub fn new(scrape_date: &str, listing_url: &str) -> Self {
        Self {
            scrape_date: scrape_date.trim().to_string(),
            listing_url: listing_url.trim().to_string(),
        }
    }
}

/// A `scrape_date` resolved to a UTC instant.
///
/// Accepts plain dates (UTC midnight), naive timestamps (read as UTC, which is
/// what the scraper has always written) and RFC 3339 timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ScrapeInstant(pub DateTime<Utc>);

impl ScrapeInstant {
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let s = raw.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(Self(dt.with_timezone(&Utc)));
        }
        for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
                return Ok(Self(naive.and_utc()));
            }
        }
        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
                return Ok(Self(midnight.and_utc()));
            }
        }
        Err(CoreError::ScrapeDate(raw.to_string()))
    }

    /// Calendar date of this instant in `tz`.
    pub fn local_date(&self, tz: Tz) -> NaiveDate {
        self.0.with_timezone(&tz).date_naive()
    }
}

/// Timestamp written into the `scrape_date` column of a new snapshot.
pub fn format_scrape_date(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn parse_timezone(name: &str) -> Result<Tz, CoreError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| CoreError::TimeZone(name.to_string()))
}
