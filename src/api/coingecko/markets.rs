use crate::config::TrackerConfig;
use crate::error::TrackerError;
use crate::model::AssetRecord;
use chrono::{DateTime, Utc};
use log::{info, warn};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashSet;

const USER_AGENT: &str = concat!("cryptotracker/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct MarketEntry {
    id: String,
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    name: String,
    current_price: Option<f64>,
    market_cap: Option<f64>,
    total_volume: Option<f64>,
    price_change_percentage_24h: Option<f64>,
}

/// Client for the `/coins/markets` endpoint.
pub struct MarketFetcher {
    client: Client,
    base_url: String,
}

impl MarketFetcher {
    pub fn new(config: &TrackerConfig) -> Result<Self, TrackerError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            base_url: config.api_url.clone(),
        })
    }

    /// Top `n` coins by market cap, priced in `vs_currency`. One request, no
    /// retry; a non-2xx status is returned as `TrackerError::Network`.
    pub async fn fetch_top(
        &self,
        n: usize,
        vs_currency: &str,
    ) -> Result<Vec<AssetRecord>, TrackerError> {
        let url = format!("{}/coins/markets", self.base_url);
        info!("Requesting {} (top {} coins in {})", url, n, vs_currency);

        let per_page = n.to_string();
        let response = self
            .client
            .get(&url)
            .query(&[
                ("vs_currency", vs_currency),
                ("order", "market_cap_desc"),
                ("per_page", per_page.as_str()),
                ("page", "1"),
                ("sparkline", "false"),
            ])
            .send()
            .await?
            .error_for_status()?;

        let body = response.bytes().await?;
        let records = parse_markets(&body, n, Utc::now())?;
        info!("Received {} records", records.len());
        Ok(records)
    }
}

/// Decode a markets response body into at most `n` records stamped with
/// `scrape_time`. Null numbers become zero and repeated ids keep their first
/// occurrence.
pub fn parse_markets(
    body: &[u8],
    n: usize,
    scrape_time: DateTime<Utc>,
) -> Result<Vec<AssetRecord>, TrackerError> {
    let entries: Vec<MarketEntry> = serde_json::from_slice(body)?;
    let received = entries.len();

    let mut seen = HashSet::new();
    let records: Vec<AssetRecord> = entries
        .into_iter()
        .filter(|entry| seen.insert(entry.id.clone()))
        .take(n)
        .map(|entry| AssetRecord {
            id: entry.id,
            symbol: entry.symbol,
            name: entry.name,
            current_price: entry.current_price.unwrap_or(0.0),
            market_cap: entry.market_cap.unwrap_or(0.0),
            total_volume: entry.total_volume.unwrap_or(0.0),
            price_change_24h: entry.price_change_percentage_24h.unwrap_or(0.0),
            scrape_time,
        })
        .collect();

    if records.len() < n {
        warn!(
            "Expected {} coins but kept {} of {} received",
            n,
            records.len(),
            received
        );
    }
    Ok(records)
}
