//! Source adapter contract + the merrjep.al car listings adapter.

use async_trait::async_trait;
use carlog_core::ListingAttributes;
use carlog_storage::{FetchError, HttpFetcher};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub const CRATE_NAME: &str = "carlog-adapters";

pub const MERRJEP_BASE_URL: &str = "https://www.merrjep.al";
pub const MERRJEP_LISTING_PATH: &str = "/njoftime/automjete/makina/ne-shitje";

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("unparseable page {url}: {reason}")]
    Parse { url: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    pub base_url: String,
    pub listing_path: String,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            base_url: MERRJEP_BASE_URL.to_string(),
            listing_path: MERRJEP_LISTING_PATH.to_string(),
        }
    }
}

/// Seam between the scrape step and a concrete listings site.
///
/// `parse_*` are pure over page HTML; the provided `fetch_*` methods pair them
/// with an HTTP fetch and are what the scrape step calls.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source_id(&self) -> &'static str;

    fn listing_page_url(&self, page: usize) -> String;

    fn parse_listing(&self, html: &str) -> Result<Vec<String>, AdapterError>;

    fn parse_detail(&self, url: &str, html: &str) -> Result<ListingAttributes, AdapterError>;

    async fn fetch_listing(&self, http: &HttpFetcher, page: usize) -> Result<Vec<String>, AdapterError> {
        let url = self.listing_page_url(page);
        let resp = http.fetch_bytes(&url).await?;
        let links = self.parse_listing(&resp.text())?;
        debug!(page, links = links.len(), "parsed listing page");
        Ok(links)
    }

    async fn fetch_detail(&self, http: &HttpFetcher, url: &str) -> Result<ListingAttributes, AdapterError> {
        let resp = http.fetch_bytes(url).await?;
        self.parse_detail(url, &resp.text())
    }
}

#[derive(Debug, Clone)]
pub struct MerrjepAdapter {
    settings: SourceSettings,
}

impl MerrjepAdapter {
    pub fn new(settings: SourceSettings) -> Self {
        Self { settings }
    }

    pub fn absolute_url(&self, href: &str) -> String {
        if href.starts_with("http") {
            href.to_string()
        } else {
            format!(
                "{}/{}",
                self.settings.base_url.trim_end_matches('/'),
                href.trim_start_matches('/')
            )
        }
    }
}

impl Default for MerrjepAdapter {
    fn default() -> Self {
        Self::new(SourceSettings::default())
    }
}

#[async_trait]
impl SourceAdapter for MerrjepAdapter {
    fn source_id(&self) -> &'static str {
        "merrjep"
    }

    fn listing_page_url(&self, page: usize) -> String {
        format!(
            "{}{}?Page={}",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.listing_path,
            page
        )
    }

    fn parse_listing(&self, html: &str) -> Result<Vec<String>, AdapterError> {
        let document = Html::parse_document(html);
        let links = select_all_attrs(&document, "a.Link_vis", "href")?;
        let mut out: Vec<String> = Vec::with_capacity(links.len());
        for href in links {
            let url = self.absolute_url(&href);
            if !out.contains(&url) {
                out.push(url);
            }
        }
        Ok(out)
    }

    fn parse_detail(&self, url: &str, html: &str) -> Result<ListingAttributes, AdapterError> {
        let document = Html::parse_document(html);
        let mut attrs = ListingAttributes::default();

        let tag_sel = selector(".tag-item")?;
        let label_sel = selector("span")?;
        let value_sel = selector("bdi")?;
        for tag in document.select(&tag_sel) {
            let (Some(label), Some(value)) = (
                first_text_in(tag, &label_sel),
                first_text_in(tag, &value_sel),
            ) else {
                continue;
            };
            if let Some(slot) = attribute_slot(&mut attrs, &label) {
                *slot = value;
            }
        }

        if let Some(price) = select_first_attr(&document, ".new-price .format-money-int", "value")? {
            attrs.price_value = price;
        }
        if let Some(currency) = select_first_text(&document, ".new-price span:not(.format-money-int)")? {
            attrs.price_currency = currency;
        }

        if attrs.is_empty() {
            return Err(AdapterError::Parse {
                url: url.to_string(),
                reason: "no listing attributes or price block".to_string(),
            });
        }
        Ok(attrs)
    }
}

/// Maps a `.tag-item` label onto the attribute it fills, by label prefix.
fn attribute_slot<'a>(attrs: &'a mut ListingAttributes, label: &str) -> Option<&'a mut String> {
    let slot = if label.starts_with("Viti") {
        &mut attrs.year
    } else if label.starts_with("Transmetuesi") {
        &mut attrs.transmission
    } else if label.starts_with("Kilometrazha") {
        &mut attrs.mileage
    } else if label.starts_with("Karburanti") {
        &mut attrs.fuel
    } else if label.starts_with("Komuna") {
        &mut attrs.municipality
    } else if label.starts_with("Ngjyra") {
        &mut attrs.color
    } else if label.starts_with("Prodhuesi") {
        &mut attrs.make
    } else if label.starts_with("Modeli") {
        &mut attrs.model
    } else {
        return None;
    };
    Some(slot)
}

fn text_or_none(value: String) -> Option<String> {
    let trimmed = value.trim().to_string();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn selector(css: &str) -> Result<Selector, AdapterError> {
    Selector::parse(css).map_err(|e| AdapterError::Message(format!("bad selector `{css}`: {e}")))
}

fn first_text_in(element: ElementRef<'_>, sel: &Selector) -> Option<String> {
    element
        .select(sel)
        .next()
        .and_then(|n| text_or_none(n.text().collect::<String>()))
}

fn select_first_text(document: &Html, css: &str) -> Result<Option<String>, AdapterError> {
    let sel = selector(css)?;
    Ok(document
        .select(&sel)
        .next()
        .and_then(|n| text_or_none(n.text().collect::<String>())))
}

fn select_first_attr(document: &Html, css: &str, attr: &str) -> Result<Option<String>, AdapterError> {
    let sel = selector(css)?;
    Ok(document
        .select(&sel)
        .next()
        .and_then(|n| n.value().attr(attr))
        .and_then(|s| text_or_none(s.to_string())))
}

fn select_all_attrs(document: &Html, css: &str, attr: &str) -> Result<Vec<String>, AdapterError> {
    let sel = selector(css)?;
    Ok(document
        .select(&sel)
        .filter_map(|n| n.value().attr(attr))
        .filter_map(|s| text_or_none(s.to_string()))
        .collect())
}
