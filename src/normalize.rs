//! Turns the free-form text a scraper hands over into typed listing fields.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::HOME_CURRENCY;
use crate::types::{NewListing, RawListing};

static RE_FREE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bfree\b").unwrap());

static RE_AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:,\d+)*(?:\.\d{1,2})?").unwrap());

static RE_DISTANCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Within\s+(\d+)\s*km").unwrap());

/// Markers that flag a price as foreign. A bare `$` or `CA$` is home currency.
const FOREIGN_MARKERS: &[&str] = &["US$", "AU$", "USD", "AUD", "EUR", "GBP", "€", "£"];

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPrice {
    pub price: Option<f64>,
    pub currency: String,
}

/// Parse a price such as `"CA$1,999.00"`, `"Free"` or `"US$40"`.
/// Never fails: unparseable text yields `price: None`.
pub fn parse_price(text: &str) -> ParsedPrice {
    let t = text.trim();

    if RE_FREE.is_match(t) {
        return ParsedPrice {
            price: Some(0.0),
            currency: HOME_CURRENCY.to_string(),
        };
    }

    let Some(m) = RE_AMOUNT.find(t) else {
        return ParsedPrice {
            price: None,
            currency: HOME_CURRENCY.to_string(),
        };
    };

    let price = m.as_str().replace(',', "").parse::<f64>().ok();
    let currency = currency_marker(&t[..m.start()])
        .unwrap_or(HOME_CURRENCY)
        .to_string();

    ParsedPrice { price, currency }
}

/// The foreign marker directly in front of the amount, if any, as written in the text.
fn currency_marker(prefix: &str) -> Option<&str> {
    let prefix = prefix.trim_end();
    FOREIGN_MARKERS.iter().find_map(|marker| {
        let start = prefix.len().checked_sub(marker.len())?;
        let tail = prefix.get(start..)?;
        tail.eq_ignore_ascii_case(marker).then_some(tail)
    })
}

/// `"Within 12 km"` → 12.0.
pub fn parse_distance_km(location: &str) -> Option<f64> {
    RE_DISTANCE
        .captures(location)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

/// Collapse whitespace; blank text becomes `None`.
pub fn clean_text(text: Option<&str>) -> Option<String> {
    let collapsed = text?.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

/// Normalize a scraped listing. Source and url are trimmed but kept verbatim otherwise,
/// since together they form the dedup key.
pub fn normalize(raw: &RawListing) -> NewListing {
    let parsed = raw.price_text.as_deref().map(parse_price);
    let location = clean_text(raw.location.as_deref());
    let explicit_currency = clean_text(raw.currency.as_deref()).map(|c| c.to_uppercase());

    NewListing {
        source: raw.source.trim().to_string(),
        url: raw.url.trim().to_string(),
        title: clean_text(raw.title.as_deref()),
        // Descriptions keep their line breaks.
        description: raw
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string),
        price: parsed.as_ref().and_then(|p| p.price),
        currency: explicit_currency.or_else(|| parsed.map(|p| p.currency)),
        distance_km: location.as_deref().and_then(parse_distance_km),
        location,
        posted_at_text: clean_text(raw.posted_at_text.as_deref()),
        seller: clean_text(raw.seller.as_deref()),
        photos: if raw.photos.is_empty() {
            None
        } else {
            Some(raw.photos.clone())
        },
        label: clean_text(raw.label.as_deref()),
        note: clean_text(raw.note.as_deref()),
        initial_label: clean_text(raw.initial_label.as_deref()),
        initial_note: clean_text(raw.initial_note.as_deref()),
    }
}
