use super::{append_rows, read_table, write_atomic, Dataset, Table, TableRow};
use crate::config::TrackerConfig;
use crate::error::TrackerError;
use crate::model::{
    parse_number, parse_timestamp, AlertRecord, AssetRecord, MoverRow, SummaryRow, ALERT_COLUMNS,
    ASSET_COLUMNS,
};
use chrono::{DateTime, Utc};
use log::debug;
use std::path::{Path, PathBuf};

const SUMMARY_COLUMNS: [&str; 6] = [
    "id",
    "symbol",
    "name",
    "current_price",
    "price_change_pct",
    "market_cap",
];
const MOVER_COLUMNS: [&str; 2] = ["name", "price_change_pct"];

/// Paths to every file the tracker reads or writes.
#[derive(Debug, Clone)]
pub struct FileStore {
    snapshot_path: PathBuf,
    history_path: PathBuf,
    alert_path: PathBuf,
    summary_path: PathBuf,
    gainers_path: PathBuf,
    losers_path: PathBuf,
}

impl FileStore {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            snapshot_path: config.snapshot_path(),
            history_path: config.history_path(),
            alert_path: config.alert_path(),
            summary_path: config.summary_path(),
            gainers_path: config.gainers_path(),
            losers_path: config.losers_path(),
        }
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    pub fn history_path(&self) -> &Path {
        &self.history_path
    }

    pub fn alert_path(&self) -> &Path {
        &self.alert_path
    }

    pub fn report_paths(&self) -> [&Path; 3] {
        [&self.summary_path, &self.gainers_path, &self.losers_path]
    }

    /// Replace the snapshot wholesale.
    pub fn write_snapshot(&self, records: &[AssetRecord]) -> Result<(), TrackerError> {
        write_atomic(&self.snapshot_path, &ASSET_COLUMNS, records)
    }

    /// Append one cycle to the history log, creating it with a header if needed.
    pub fn append_history(&self, records: &[AssetRecord]) -> Result<(), TrackerError> {
        append_rows(&self.history_path, &ASSET_COLUMNS, records)
    }

    /// Latest snapshot in file order. An unreadable `scrape_time` reads as the
    /// Unix epoch.
    pub fn read_snapshot(&self) -> Result<Dataset<AssetRecord>, TrackerError> {
        let Some(table) = read_table(&self.snapshot_path)? else {
            return Ok(Dataset::Absent);
        };
        let records = table
            .iter()
            .filter_map(|row| asset_from_row(&row, Some(DateTime::<Utc>::UNIX_EPOCH)))
            .collect();
        Ok(Dataset::Rows(records))
    }

    /// Raw snapshot table, for consumers that look at optional columns.
    pub fn read_snapshot_table(&self) -> Result<Option<Table>, TrackerError> {
        read_table(&self.snapshot_path)
    }

    /// History rows for one coin, oldest first. Rows without a readable
    /// `scrape_time` are dropped.
    pub fn read_history(&self, id: &str) -> Result<Dataset<AssetRecord>, TrackerError> {
        Ok(self
            .read_full_history()?
            .map(|rows| rows.into_iter().filter(|r| r.id == id).collect()))
    }

    /// Every history row with a readable `scrape_time`, oldest first. Rows
    /// sharing a timestamp keep file order.
    pub fn read_full_history(&self) -> Result<Dataset<AssetRecord>, TrackerError> {
        let Some(table) = read_table(&self.history_path)? else {
            return Ok(Dataset::Absent);
        };
        let total = table.len();
        let mut records: Vec<AssetRecord> = table
            .iter()
            .filter_map(|row| asset_from_row(&row, None))
            .collect();
        if records.len() < total {
            debug!(
                "Dropped {} history rows with unreadable timestamps",
                total - records.len()
            );
        }
        records.sort_by_key(|r| r.scrape_time);
        Ok(Dataset::Rows(records))
    }

    pub fn write_alerts(&self, alerts: &[AlertRecord]) -> Result<(), TrackerError> {
        write_atomic(&self.alert_path, &ALERT_COLUMNS, alerts)
    }

    pub fn read_alerts(&self) -> Result<Dataset<AlertRecord>, TrackerError> {
        let Some(table) = read_table(&self.alert_path)? else {
            return Ok(Dataset::Absent);
        };
        let alerts = table
            .iter()
            .map(|row| AlertRecord {
                id: row.get("id").to_string(),
                symbol: row.get("symbol").to_string(),
                name: row.get("name").to_string(),
                current_price: parse_number(row.get("current_price")),
                price_change_24h: parse_number(row.get("price_change_24h")),
                alert_time: parse_timestamp(row.get("alert_time"))
                    .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            })
            .collect();
        Ok(Dataset::Rows(alerts))
    }

    pub fn write_report(
        &self,
        summary: &[SummaryRow],
        gainers: &[MoverRow],
        losers: &[MoverRow],
    ) -> Result<(), TrackerError> {
        write_atomic(&self.summary_path, &SUMMARY_COLUMNS, summary)?;
        write_atomic(&self.gainers_path, &MOVER_COLUMNS, gainers)?;
        write_atomic(&self.losers_path, &MOVER_COLUMNS, losers)?;
        Ok(())
    }
}

/// Coerce one row. Numbers fall back to zero; the timestamp falls back to
/// `fallback_time`, and the row is rejected when that is `None`.
fn asset_from_row(
    row: &TableRow<'_>,
    fallback_time: Option<DateTime<Utc>>,
) -> Option<AssetRecord> {
    let scrape_time = parse_timestamp(row.get("scrape_time")).or(fallback_time)?;
    Some(AssetRecord {
        id: row.get("id").to_string(),
        symbol: row.get("symbol").to_string(),
        name: row.get("name").to_string(),
        current_price: parse_number(row.get("current_price")),
        market_cap: parse_number(row.get("market_cap")),
        total_volume: parse_number(row.get("total_volume")),
        price_change_24h: parse_number(row.get("price_change_24h")),
        scrape_time,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::TestDir;
    use chrono::TimeZone;
    use std::fs;

    fn store_in(dir: &TestDir) -> FileStore {
        let config = TrackerConfig {
            data_dir: dir.path().join("data"),
            log_dir: dir.path().join("logs"),
            output_dir: dir.path().join("outputs"),
            ..TrackerConfig::default()
        };
        FileStore::new(&config)
    }

    fn asset(id: &str, price: f64, change: f64, minute: u32) -> AssetRecord {
        AssetRecord {
            id: id.to_string(),
            symbol: id[..3].to_string(),
            name: format!("{} coin", id),
            current_price: price,
            market_cap: price * 1_000_000.0,
            total_volume: price * 1_000.0,
            price_change_24h: change,
            scrape_time: Utc.with_ymd_and_hms(2024, 5, 1, 10, minute, 0).unwrap()
                + chrono::Duration::microseconds(123_456),
        }
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = TestDir::new("snapshot_round_trip");
        let store = store_in(&dir);
        let records = vec![
            asset("bitcoin", 64_123.45, 2.31, 0),
            asset("ethereum", 3_101.9, -7.2, 0),
            AssetRecord {
                name: "Comma, Quote \"Coin\"".to_string(),
                ..asset("weird-coin", 0.000_012_34, 0.0, 0)
            },
        ];

        store.write_snapshot(&records).unwrap();

        assert_eq!(store.read_snapshot().unwrap(), Dataset::Rows(records));
    }

    #[test]
    fn test_snapshot_replaced_not_merged() {
        let dir = TestDir::new("snapshot_replace");
        let store = store_in(&dir);

        store
            .write_snapshot(&[asset("bitcoin", 1.0, 1.0, 0), asset("ethereum", 2.0, 2.0, 0)])
            .unwrap();
        store.write_snapshot(&[asset("solana", 3.0, 3.0, 5)]).unwrap();

        let rows = store.read_snapshot().unwrap().into_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "solana");
    }

    #[test]
    fn test_missing_files_read_as_absent() {
        let dir = TestDir::new("absent");
        let store = store_in(&dir);

        assert!(store.read_snapshot().unwrap().is_absent());
        assert!(store.read_history("bitcoin").unwrap().is_absent());
        assert!(store.read_full_history().unwrap().is_absent());
        assert!(store.read_alerts().unwrap().is_absent());
        assert!(store.read_snapshot_table().unwrap().is_none());
    }

    #[test]
    fn test_append_history_preserves_order_and_counts() {
        let dir = TestDir::new("history_append");
        let store = store_in(&dir);
        let first = vec![asset("bitcoin", 1.0, 0.0, 0), asset("ethereum", 2.0, 0.0, 0)];
        let second = vec![
            asset("bitcoin", 1.1, 0.0, 1),
            asset("ethereum", 2.1, 0.0, 1),
            asset("solana", 3.1, 0.0, 1),
        ];

        store.append_history(&first).unwrap();
        store.append_history(&second).unwrap();

        let rows = store.read_full_history().unwrap().into_rows();
        assert_eq!(rows.len(), first.len() + second.len());
        let expected: Vec<AssetRecord> = first.into_iter().chain(second).collect();
        assert_eq!(rows, expected);

        let content = fs::read_to_string(store.history_path()).unwrap();
        assert_eq!(content.matches("id,symbol,name").count(), 1);
    }

    #[test]
    fn test_append_history_after_interrupted_append() {
        let dir = TestDir::new("history_torn");
        let store = store_in(&dir);
        let bitcoin = asset("bitcoin", 1.0, 0.0, 0);
        store.append_history(&[bitcoin.clone()]).unwrap();
        let content = fs::read_to_string(store.history_path()).unwrap();
        fs::write(store.history_path(), content.trim_end_matches('\n')).unwrap();

        let ethereum = asset("ethereum", 2.0, 0.0, 1);
        store.append_history(&[ethereum.clone()]).unwrap();

        assert_eq!(
            store.read_full_history().unwrap(),
            Dataset::Rows(vec![bitcoin, ethereum])
        );
    }

    #[test]
    fn test_read_history_drops_bad_timestamps_and_sorts() {
        let dir = TestDir::new("history_bad_ts");
        let store = store_in(&dir);
        fs::create_dir_all(store.history_path().parent().unwrap()).unwrap();
        fs::write(
            store.history_path(),
            "id,symbol,name,current_price,market_cap,total_volume,price_change_24h,scrape_time\n\
             bitcoin,btc,Bitcoin,300,1,1,0.5,2024-05-01 10:03:00\n\
             bitcoin,btc,Bitcoin,999,1,1,0.5,not-a-time\n\
             ethereum,eth,Ethereum,10,1,1,0.5,2024-05-01 10:00:00\n\
             bitcoin,btc,Bitcoin,100,1,1,0.5,2024-05-01T10:01:00Z\n\
             bitcoin,btc,Bitcoin,oops,1,1,0.5,\n\
             bitcoin,btc,Bitcoin,200,1,1,0.5,2024-05-01 10:02:00.5\n",
        )
        .unwrap();

        let rows = store.read_history("bitcoin").unwrap().into_rows();
        let prices: Vec<f64> = rows.iter().map(|r| r.current_price).collect();
        assert_eq!(prices, vec![100.0, 200.0, 300.0]);
        assert!(rows.windows(2).all(|w| w[0].scrape_time <= w[1].scrape_time));
    }

    #[test]
    fn test_malformed_numbers_coerced_to_zero() {
        let dir = TestDir::new("coerce");
        let store = store_in(&dir);
        fs::create_dir_all(store.snapshot_path().parent().unwrap()).unwrap();
        fs::write(
            store.snapshot_path(),
            "id,symbol,name,current_price,market_cap,price_change_24h,scrape_time\n\
             bitcoin,btc,Bitcoin,abc,,-7.2,garbage\n",
        )
        .unwrap();

        let rows = store.read_snapshot().unwrap().into_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].current_price, 0.0);
        assert_eq!(rows[0].market_cap, 0.0);
        assert_eq!(rows[0].total_volume, 0.0);
        assert_eq!(rows[0].price_change_24h, -7.2);
        assert_eq!(rows[0].scrape_time, DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn test_alerts_round_trip() {
        let dir = TestDir::new("alerts");
        let store = store_in(&dir);
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 11, 0, 0).unwrap();
        let alerts = vec![AlertRecord::from_asset(&asset("ethereum", 3_000.0, -7.2, 0), at)];

        store.write_alerts(&alerts).unwrap();

        assert_eq!(store.read_alerts().unwrap(), Dataset::Rows(alerts));
    }
}
