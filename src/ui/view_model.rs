//! Immutable snapshot of everything the dashboard draws. A new view model is
//! built from the store files on every refresh; nothing is cached between
//! refreshes.

use crate::model::{AlertRecord, AssetRecord};
use crate::store::{Dataset, FileStore};
use chrono::{DateTime, Utc};
use log::error;
use std::collections::HashMap;

/// History points shown in the market table's trend column
pub const TREND_POINTS: usize = 7;

/// Rows shown in the alerts panel when no alert file is available
pub const FALLBACK_MOVERS: usize = 5;

const SPARK_LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

#[derive(Debug, Clone, PartialEq)]
pub struct CoinDetail {
    pub id: String,
    pub symbol: String,
    pub name: String,
    pub current_price: f64,
    pub price_change_24h: f64,
    /// Oldest first
    pub series: Vec<(DateTime<Utc>, f64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarketRow {
    pub id: String,
    pub symbol: String,
    pub name: String,
    pub current_price: f64,
    pub price_change_24h: f64,
    pub market_cap: f64,
    pub trend: Vec<f64>,
}

/// Snapshot row re-labelled for the alerts panel fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct TopMover {
    pub id: String,
    pub symbol: String,
    pub name: String,
    pub current_price: f64,
    pub price_change_pct: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AlertsView {
    Current(Vec<AlertRecord>),
    TopMovers(Vec<TopMover>),
    NoData,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardViewModel {
    pub refreshed_at: DateTime<Utc>,
    /// False when the snapshot file is missing or unreadable
    pub has_snapshot: bool,
    pub coin: Option<CoinDetail>,
    pub market: Vec<MarketRow>,
    pub alerts: AlertsView,
}

impl DashboardViewModel {
    /// Re-read every store file and build a fresh view. Read failures are
    /// logged and shown as missing data.
    pub fn load(store: &FileStore, selected: Option<&str>, top_n: usize) -> Self {
        let snapshot = store.read_snapshot().unwrap_or_else(|e| {
            error!("Failed to read snapshot: {}", e);
            Dataset::Absent
        });
        let history = store.read_full_history().unwrap_or_else(|e| {
            error!("Failed to read history: {}", e);
            Dataset::Absent
        });
        let alerts = store.read_alerts().unwrap_or_else(|e| {
            error!("Failed to read alerts: {}", e);
            Dataset::Absent
        });
        Self::build(&snapshot, &history, &alerts, selected, top_n, Utc::now())
    }

    pub fn build(
        snapshot: &Dataset<AssetRecord>,
        history: &Dataset<AssetRecord>,
        alerts: &Dataset<AlertRecord>,
        selected: Option<&str>,
        top_n: usize,
        refreshed_at: DateTime<Utc>,
    ) -> Self {
        let rows: Vec<&AssetRecord> = snapshot.rows().iter().take(top_n).collect();

        // history is already sorted oldest first
        let mut prices_by_id: HashMap<&str, Vec<(DateTime<Utc>, f64)>> = HashMap::new();
        for record in history.rows() {
            prices_by_id
                .entry(record.id.as_str())
                .or_default()
                .push((record.scrape_time, record.current_price));
        }

        let coin = selected
            .and_then(|id| rows.iter().find(|r| r.id == id))
            .map(|row| coin_detail(row, prices_by_id.get(row.id.as_str())));

        let market = rows
            .iter()
            .map(|row| MarketRow {
                id: row.id.clone(),
                symbol: row.symbol.clone(),
                name: row.name.clone(),
                current_price: row.current_price,
                price_change_24h: row.price_change_24h,
                market_cap: row.market_cap,
                trend: trend(row, prices_by_id.get(row.id.as_str())),
            })
            .collect();

        Self {
            refreshed_at,
            has_snapshot: !snapshot.is_absent(),
            coin,
            market,
            alerts: alerts_view(alerts, &rows),
        }
    }

    pub fn position_of(&self, id: &str) -> Option<usize> {
        self.market.iter().position(|row| row.id == id)
    }
}

fn coin_detail(row: &AssetRecord, history: Option<&Vec<(DateTime<Utc>, f64)>>) -> CoinDetail {
    let series = match history {
        Some(points) if !points.is_empty() => points.clone(),
        _ => vec![(row.scrape_time, row.current_price)],
    };
    CoinDetail {
        id: row.id.clone(),
        symbol: row.symbol.clone(),
        name: row.name.clone(),
        current_price: row.current_price,
        price_change_24h: row.price_change_24h,
        series,
    }
}

/// Last `TREND_POINTS` history prices, or the current price repeated.
fn trend(row: &AssetRecord, history: Option<&Vec<(DateTime<Utc>, f64)>>) -> Vec<f64> {
    match history {
        Some(points) if !points.is_empty() => points[points.len().saturating_sub(TREND_POINTS)..]
            .iter()
            .map(|(_, price)| *price)
            .collect(),
        _ => vec![row.current_price; TREND_POINTS],
    }
}

fn alerts_view(alerts: &Dataset<AlertRecord>, snapshot: &[&AssetRecord]) -> AlertsView {
    if !alerts.is_empty() {
        return AlertsView::Current(alerts.rows().to_vec());
    }
    if snapshot.is_empty() {
        return AlertsView::NoData;
    }

    let mut movers: Vec<&AssetRecord> = snapshot.to_vec();
    movers.sort_by(|a, b| {
        b.price_change_24h
            .abs()
            .total_cmp(&a.price_change_24h.abs())
    });
    AlertsView::TopMovers(
        movers
            .into_iter()
            .take(FALLBACK_MOVERS)
            .map(|row| TopMover {
                id: row.id.clone(),
                symbol: row.symbol.clone(),
                name: row.name.clone(),
                current_price: row.current_price,
                price_change_pct: row.price_change_24h,
            })
            .collect(),
    )
}

/// One block character per point, scaled between the series min and max.
pub fn spark_line(points: &[f64]) -> String {
    let min = points.iter().copied().fold(f64::INFINITY, f64::min);
    let max = points.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    points
        .iter()
        .map(|p| {
            if range <= 0.0 {
                SPARK_LEVELS[SPARK_LEVELS.len() / 2]
            } else {
                let level = ((p - min) / range * (SPARK_LEVELS.len() - 1) as f64).round() as usize;
                SPARK_LEVELS[level.min(SPARK_LEVELS.len() - 1)]
            }
        })
        .collect()
}
