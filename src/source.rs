use std::path::PathBuf;

use async_trait::async_trait;
use csv::ReaderBuilder;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::Result;
use crate::types::RawListing;

/// Anything that can hand over a batch of raw listings for ingestion.
#[async_trait]
pub trait ListingSource: Send + Sync {
    fn name(&self) -> &str;
    async fn fetch(&self) -> Result<Vec<RawListing>>;
}

/// Marketplace listings collected by hand into a CSV file with columns
/// `title,price,url,currency,location`. Rows without a url are skipped.
pub struct CsvWatchlist {
    path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct WatchlistRow {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    price: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    location: Option<String>,
}

const WATCHLIST_SOURCE: &str = "facebook";
const WATCHLIST_LABEL: &str = "watch";
const WATCHLIST_NOTE: &str = "csv import";

impl CsvWatchlist {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ListingSource for CsvWatchlist {
    fn name(&self) -> &str {
        "csv-watchlist"
    }

    async fn fetch(&self) -> Result<Vec<RawListing>> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        let listings = parse_watchlist(&content)?;
        info!(path = %self.path.display(), rows = listings.len(), "watchlist loaded");
        Ok(listings)
    }
}

/// Parse watchlist CSV text. Malformed rows are logged and skipped.
pub fn parse_watchlist(content: &str) -> Result<Vec<RawListing>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    // Fail early on an unreadable header; row errors are per-line.
    reader.headers()?;

    let mut listings = Vec::new();
    for (line_num, result) in reader.deserialize::<WatchlistRow>().enumerate() {
        let row = match result {
            Ok(row) => row,
            Err(e) => {
                warn!(line = line_num + 2, "skipping unreadable watchlist row: {e}");
                continue;
            }
        };

        let Some(url) = row.url.filter(|u| !u.is_empty()) else {
            continue;
        };

        listings.push(RawListing {
            source: WATCHLIST_SOURCE.to_string(),
            url,
            title: row.title,
            price_text: row.price,
            currency: row.currency.filter(|c| !c.is_empty()),
            location: row.location.filter(|l| !l.is_empty()),
            initial_label: Some(WATCHLIST_LABEL.to_string()),
            initial_note: Some(WATCHLIST_NOTE.to_string()),
            ..Default::default()
        });
    }

    Ok(listings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_without_url_are_skipped() {
        let csv = "title,price,url,currency,location\n\
                   Trek FX 2,$250,https://fb.example/1,,Within 12 km\n\
                   No link,$10,,,\n\
                   Desk,Free,https://fb.example/2,USD,\n";
        let rows = parse_watchlist(csv).unwrap();
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0].source, "facebook");
        assert_eq!(rows[0].url, "https://fb.example/1");
        assert_eq!(rows[0].price_text.as_deref(), Some("$250"));
        assert_eq!(rows[0].currency, None);
        assert_eq!(rows[0].location.as_deref(), Some("Within 12 km"));
        assert_eq!(rows[0].label, None);
        assert_eq!(rows[0].note, None);
        assert_eq!(rows[0].initial_label.as_deref(), Some("watch"));
        assert_eq!(rows[0].initial_note.as_deref(), Some("csv import"));

        assert_eq!(rows[1].currency.as_deref(), Some("USD"));
    }

    #[test]
    fn missing_columns_are_tolerated() {
        let csv = "url,title\nhttps://fb.example/9,Lamp\n";
        let rows = parse_watchlist(csv).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title.as_deref(), Some("Lamp"));
        assert_eq!(rows[0].price_text, None);
    }

    #[tokio::test]
    async fn missing_file_is_an_io_error() {
        let src = CsvWatchlist::new("/nonexistent/watchlist.csv");
        let err = src.fetch().await.unwrap_err();
        assert!(matches!(err, crate::error::AppError::Io(_)));
    }
}
