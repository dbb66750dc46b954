//! Downloadable tables: CSV exports, the Parquet copy of the cleaned listings
//! and the asset manifest.

use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{Float64Array, Int32Array, Int64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field as ArrowField, Schema};
use carlog_storage::sha256_hex;
use parquet::arrow::ArrowWriter;
use serde::Serialize;

use crate::stats::{by_count_desc, CleanListing, DashboardStats, GroupRow, PeriodRow};

pub const MANIFEST_SCHEMA_VERSION: u32 = 1;

/// CSV downloads in the order they are listed on the page.
pub const CSV_EXPORTS: [&str; 15] = [
    "historical_listings.csv",
    "top_models.csv",
    "avg_price_by_fuel.csv",
    "avg_price_by_region.csv",
    "count_by_region.csv",
    "daily_volume.csv",
    "daily_avg_price.csv",
    "monthly_volume.csv",
    "monthly_avg_price.csv",
    "top_municipalities.csv",
    "top_models_pct.csv",
    "fuel_distribution_pct.csv",
    "count_by_region_pct.csv",
    "daily_volume_pct.csv",
    "monthly_volume_pct.csv",
];

pub const PARQUET_EXPORT: &str = "historical_listings.parquet";
pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl Asset {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardManifest {
    pub schema_version: u32,
    pub files: Vec<ManifestFile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManifestFile {
    pub name: String,
    pub sha256: String,
    pub bytes: u64,
}

fn two_decimals(value: f64) -> String {
    format!("{value:.2}")
}

fn optional(value: Option<f64>) -> String {
    value.map(two_decimals).unwrap_or_default()
}

fn table<I>(header: [&str; 2], rows: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(header).context("writing CSV header")?;
    for (key, value) in rows {
        writer.write_record([key, value]).context("writing CSV row")?;
    }
    writer.into_inner().context("flushing CSV buffer")
}

fn counts(key: &str, rows: &[GroupRow]) -> Result<Vec<u8>> {
    table([key, "count"], rows.iter().map(|r| (r.name.clone(), r.count.to_string())))
}

fn avg_prices(key: &str, rows: &[GroupRow]) -> Result<Vec<u8>> {
    table([key, "avg_price"], rows.iter().map(|r| (r.name.clone(), two_decimals(r.avg_price))))
}

fn percents(key: &str, rows: &[GroupRow]) -> Result<Vec<u8>> {
    table([key, "percent"], rows.iter().map(|r| (r.name.clone(), two_decimals(r.percent))))
}

fn period_counts(key: &str, rows: &[PeriodRow]) -> Result<Vec<u8>> {
    table([key, "count"], rows.iter().map(|r| (r.period.clone(), r.count.to_string())))
}

fn period_avg_prices(key: &str, rows: &[PeriodRow]) -> Result<Vec<u8>> {
    table([key, "avg_price"], rows.iter().map(|r| (r.period.clone(), optional(r.avg_price))))
}

fn period_percents(key: &str, rows: &[PeriodRow]) -> Result<Vec<u8>> {
    table([key, "percent"], rows.iter().map(|r| (r.period.clone(), two_decimals(r.percent))))
}

pub fn listings_csv(listings: &[CleanListing]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for listing in listings {
        writer.serialize(listing).context("encoding cleaned listing")?;
    }
    if listings.is_empty() {
        writer
            .write_record(LISTING_COLUMNS)
            .context("writing CSV header")?;
    }
    writer.into_inner().context("flushing CSV buffer")
}

const LISTING_COLUMNS: [&str; 15] = [
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
    "price",
    "age",
    "region",
];

/// Every CSV export, named as in `CSV_EXPORTS`.
pub fn csv_assets(listings: &[CleanListing], stats: &DashboardStats) -> Result<Vec<Asset>> {
    let region_counts = by_count_desc(&stats.regions);
    let fuel_counts = by_count_desc(&stats.fuels);
    let bodies = [
        listings_csv(listings)?,
        counts("model", &stats.models)?,
        avg_prices("fuel", &stats.fuels)?,
        avg_prices("region", &stats.regions)?,
        counts("region", &region_counts)?,
        period_counts("date", &stats.daily)?,
        period_avg_prices("date", &stats.daily)?,
        period_counts("month", &stats.monthly)?,
        period_avg_prices("month", &stats.monthly)?,
        avg_prices("municipality", &stats.municipalities)?,
        percents("model", &stats.models)?,
        percents("fuel", &fuel_counts)?,
        percents("region", &region_counts)?,
        period_percents("date", &stats.daily)?,
        period_percents("month", &stats.monthly)?,
    ];
    Ok(CSV_EXPORTS
        .iter()
        .zip(bodies)
        .map(|(name, bytes)| Asset::new(*name, bytes))
        .collect())
}

fn listing_schema() -> Schema {
    Schema::new(vec![
        ArrowField::new("scrape_date", DataType::Utf8, false),
        ArrowField::new("listing_url", DataType::Utf8, false),
        ArrowField::new("local_date", DataType::Utf8, true),
        ArrowField::new("year", DataType::Int32, false),
        ArrowField::new("age", DataType::Int32, false),
        ArrowField::new("mileage", DataType::Int64, false),
        ArrowField::new("price", DataType::Float64, false),
        ArrowField::new("price_currency", DataType::Utf8, false),
        ArrowField::new("transmission", DataType::Utf8, false),
        ArrowField::new("fuel", DataType::Utf8, false),
        ArrowField::new("municipality", DataType::Utf8, false),
        ArrowField::new("region", DataType::Utf8, false),
        ArrowField::new("color", DataType::Utf8, false),
        ArrowField::new("make", DataType::Utf8, false),
        ArrowField::new("model", DataType::Utf8, false),
    ])
}

fn strings<'a>(listings: &'a [CleanListing], field: impl Fn(&'a CleanListing) -> &'a str) -> StringArray {
    StringArray::from(listings.iter().map(|l| Some(field(l))).collect::<Vec<_>>())
}

pub fn listings_parquet(listings: &[CleanListing]) -> Result<Vec<u8>> {
    let schema = Arc::new(listing_schema());
    let local_dates = StringArray::from(
        listings
            .iter()
            .map(|l| l.local_date.map(|d| d.format("%Y-%m-%d").to_string()))
            .collect::<Vec<_>>(),
    );
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(strings(listings, |l| l.scrape_date.as_str())),
            Arc::new(strings(listings, |l| l.listing_url.as_str())),
            Arc::new(local_dates),
            Arc::new(Int32Array::from(listings.iter().map(|l| l.year).collect::<Vec<_>>())),
            Arc::new(Int32Array::from(listings.iter().map(|l| l.age).collect::<Vec<_>>())),
            Arc::new(Int64Array::from(listings.iter().map(|l| l.mileage).collect::<Vec<_>>())),
            Arc::new(Float64Array::from(listings.iter().map(|l| l.price).collect::<Vec<_>>())),
            Arc::new(strings(listings, |l| l.price_currency.as_str())),
            Arc::new(strings(listings, |l| l.transmission.as_str())),
            Arc::new(strings(listings, |l| l.fuel.as_str())),
            Arc::new(strings(listings, |l| l.municipality.as_str())),
            Arc::new(strings(listings, |l| l.region.as_str())),
            Arc::new(strings(listings, |l| l.color.as_str())),
            Arc::new(strings(listings, |l| l.make.as_str())),
            Arc::new(strings(listings, |l| l.model.as_str())),
        ],
    )
    .context("building listings record batch")?;

    let mut buf = Vec::new();
    let mut writer =
        ArrowWriter::try_new(&mut buf, schema, None).context("opening parquet writer")?;
    writer.write(&batch).context("writing listings record batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(buf)
}

pub fn manifest(assets: &[Asset]) -> Result<Asset> {
    let manifest = DashboardManifest {
        schema_version: MANIFEST_SCHEMA_VERSION,
        files: assets
            .iter()
            .map(|a| ManifestFile {
                name: a.name.clone(),
                sha256: sha256_hex(&a.bytes),
                bytes: a.bytes.len() as u64,
            })
            .collect(),
    };
    let bytes = serde_json::to_vec_pretty(&manifest).context("serializing dashboard manifest")?;
    Ok(Asset::new(MANIFEST_FILE, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{compute, prepare};
    use carlog_core::{parse_timezone, ListingAttributes, ListingRecord};

    fn listings() -> Vec<CleanListing> {
        let rows = ["Golf", "Golf", "Passat"]
            .iter()
            .enumerate()
            .map(|(i, model)| {
                ListingRecord::new(
                    "2024-03-01T07:00:00Z",
                    format!("https://www.merrjep.al/njoftim/{i}"),
                    ListingAttributes {
                        year: "2016".into(),
                        mileage: "125 000 - 149 999".into(),
                        fuel: "Naftë".into(),
                        municipality: "Durrës".into(),
                        model: (*model).into(),
                        price_value: "7000".into(),
                        price_currency: "EUR".into(),
                        ..Default::default()
                    },
                )
            })
            .collect::<Vec<_>>();
        prepare(&rows, "EUR", 2024, parse_timezone("Europe/Tirane").unwrap()).listings
    }

    fn text(asset: &Asset) -> String {
        String::from_utf8(asset.bytes.clone()).unwrap()
    }

    #[test]
    fn every_csv_export_is_produced_in_page_order() {
        let listings = listings();
        let assets = csv_assets(&listings, &compute(&listings)).unwrap();
        let names: Vec<&str> = assets.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, CSV_EXPORTS.to_vec());

        assert_eq!(text(&assets[1]), "model,count\nGolf,2\nPassat,1\n");
        assert_eq!(text(&assets[4]), "region,count\nDurres,3\n");
        assert_eq!(text(&assets[10]), "model,percent\nGolf,66.67\nPassat,33.33\n");
        assert_eq!(text(&assets[8]), "month,avg_price\n2024-03,7000.00\n");
    }

    #[test]
    fn cleaned_listings_csv_keeps_header_when_empty() {
        let empty = text(&Asset::new("x", listings_csv(&[]).unwrap()));
        assert_eq!(empty.trim_end(), LISTING_COLUMNS.join(","));

        let full = text(&Asset::new("x", listings_csv(&listings()).unwrap()));
        assert!(full.starts_with(&LISTING_COLUMNS.join(",")));
        assert!(full.contains(",Durres\n"));
    }

    #[test]
    fn parquet_export_is_stable() {
        let first = listings_parquet(&listings()).unwrap();
        let second = listings_parquet(&listings()).unwrap();
        assert_eq!(&first[..4], b"PAR1");
        assert_eq!(first, second);
        assert!(listings_parquet(&[]).is_ok());
    }

    #[test]
    fn manifest_lists_digests() {
        let assets = vec![Asset::new("a.csv", b"hello world".to_vec())];
        let manifest = manifest(&assets).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&manifest.bytes).unwrap();
        assert_eq!(json["schema_version"], 1);
        assert_eq!(json["files"][0]["name"], "a.csv");
        assert_eq!(json["files"][0]["bytes"], 11);
        assert_eq!(
            json["files"][0]["sha256"],
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }
}
