use crate::error::TrackerError;
use crate::model::{parse_number, MoverRow, SummaryRow};
use crate::store::{FileStore, Table};
use log::info;
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub summary: Vec<SummaryRow>,
    pub gainers: Vec<MoverRow>,
    pub losers: Vec<MoverRow>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    Written { rows: usize },
    NoSnapshot,
}

pub struct ReportGenerator {
    top: usize,
}

impl ReportGenerator {
    pub fn new(top: usize) -> Self {
        Self { top }
    }

    /// Derive the summary and the movers from a snapshot table. The percent
    /// column is `price_change_pct` when the snapshot carries one, otherwise
    /// `price_change_24h`.
    pub fn build(&self, table: &Table) -> Report {
        let pct_column = if table.has_column("price_change_pct") {
            "price_change_pct"
        } else {
            "price_change_24h"
        };

        let summary: Vec<SummaryRow> = table
            .iter()
            .map(|row| SummaryRow {
                id: row.get("id").to_string(),
                symbol: row.get("symbol").to_string(),
                name: row.get("name").to_string(),
                current_price: parse_number(row.get("current_price")),
                price_change_pct: parse_number(row.get(pct_column)),
                market_cap: parse_number(row.get("market_cap")),
            })
            .collect();

        // values are finite here, and 0.0 and -0.0 must tie
        let gainers = rank(&summary, self.top, |a, b| {
            b.partial_cmp(&a).unwrap_or(Ordering::Equal)
        });
        let losers = rank(&summary, self.top, |a, b| {
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        });

        Report {
            summary,
            gainers,
            losers,
        }
    }

    pub fn generate(&self, store: &FileStore) -> Result<ReportOutcome, TrackerError> {
        let Some(table) = store.read_snapshot_table()? else {
            info!(
                "Snapshot missing at {}. Run the scraper first.",
                store.snapshot_path().display()
            );
            return Ok(ReportOutcome::NoSnapshot);
        };

        let report = self.build(&table);
        store.write_report(&report.summary, &report.gainers, &report.losers)?;
        for path in store.report_paths() {
            info!("Report saved: {}", path.display());
        }
        Ok(ReportOutcome::Written {
            rows: report.summary.len(),
        })
    }
}

/// First `top` rows after a stable sort on percent change.
fn rank<F>(summary: &[SummaryRow], top: usize, cmp: F) -> Vec<MoverRow>
where
    F: Fn(f64, f64) -> Ordering,
{
    let mut ranked: Vec<&SummaryRow> = summary.iter().collect();
    ranked.sort_by(|a, b| cmp(a.price_change_pct, b.price_change_pct));
    ranked
        .into_iter()
        .take(top)
        .map(|row| MoverRow {
            name: row.name.clone(),
            price_change_pct: row.price_change_pct,
        })
        .collect()
}
