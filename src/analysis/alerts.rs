use crate::error::TrackerError;
use crate::model::{AlertRecord, AssetRecord};
use crate::store::{Dataset, FileStore};
use chrono::{DateTime, Utc};
use log::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertOutcome {
    /// The alert file was replaced with this many rows.
    Written(usize),
    /// Nothing crossed the threshold; the previous alert file is untouched.
    NoAlerts,
    NoSnapshot,
}

/// Flags snapshot rows whose 24h move is at least `threshold` percent either way.
pub struct AlertEngine {
    threshold: f64,
}

impl AlertEngine {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn is_triggered(&self, asset: &AssetRecord) -> bool {
        asset.price_change_24h.abs() >= self.threshold
    }

    /// Rows that trigger, in snapshot order.
    pub fn select(&self, snapshot: &[AssetRecord], alert_time: DateTime<Utc>) -> Vec<AlertRecord> {
        snapshot
            .iter()
            .filter(|asset| self.is_triggered(asset))
            .map(|asset| AlertRecord::from_asset(asset, alert_time))
            .collect()
    }

    /// Read the snapshot and replace the alert file when anything triggers.
    /// An empty selection writes nothing, so earlier alerts stay visible.
    pub fn evaluate(&self, store: &FileStore) -> Result<AlertOutcome, TrackerError> {
        let snapshot = match store.read_snapshot()? {
            Dataset::Absent => {
                info!("Snapshot file not found: {}", store.snapshot_path().display());
                return Ok(AlertOutcome::NoSnapshot);
            }
            Dataset::Rows(rows) => rows,
        };

        let alerts = self.select(&snapshot, Utc::now());
        if alerts.is_empty() {
            info!("No alerts (threshold ±{}%)", self.threshold);
            return Ok(AlertOutcome::NoAlerts);
        }

        store.write_alerts(&alerts)?;
        info!(
            "Alerts generated: {} rows. Saved to {}",
            alerts.len(),
            store.alert_path().display()
        );
        Ok(AlertOutcome::Written(alerts.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerConfig;
    use crate::store::test_support::TestDir;
    use chrono::TimeZone;
    use std::fs;

    fn asset(id: &str, change: f64) -> AssetRecord {
        AssetRecord {
            id: id.to_string(),
            symbol: id.to_uppercase(),
            name: id.to_string(),
            current_price: 100.0,
            market_cap: 1_000.0,
            total_volume: 10.0,
            price_change_24h: change,
            scrape_time: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    fn store_in(dir: &TestDir) -> FileStore {
        FileStore::new(&TrackerConfig {
            data_dir: dir.path().join("data"),
            log_dir: dir.path().join("logs"),
            output_dir: dir.path().join("outputs"),
            ..TrackerConfig::default()
        })
    }

    #[test]
    fn test_select_uses_absolute_change() {
        let engine = AlertEngine::new(5.0);
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).unwrap();
        let snapshot = vec![
            asset("down", -7.2),
            asset("calm", 3.1),
            asset("edge", 5.0),
            asset("edge_neg", -5.0),
            asset("near", 4.999),
            asset("up", 12.0),
        ];

        let alerts = engine.select(&snapshot, at);

        let ids: Vec<&str> = alerts.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["down", "edge", "edge_neg", "up"]);
        assert!(alerts.iter().all(|a| a.alert_time == at));
        assert_eq!(alerts[0].price_change_24h, -7.2);
    }

    #[test]
    fn test_evaluate_without_snapshot() {
        let dir = TestDir::new("alerts_no_snapshot");
        let store = store_in(&dir);

        let outcome = AlertEngine::new(5.0).evaluate(&store).unwrap();

        assert_eq!(outcome, AlertOutcome::NoSnapshot);
        assert!(!store.alert_path().exists());
    }

    #[test]
    fn test_evaluate_writes_alert_file() {
        let dir = TestDir::new("alerts_write");
        let store = store_in(&dir);
        store
            .write_snapshot(&[asset("bitcoin", 1.0), asset("ethereum", -7.2)])
            .unwrap();

        let outcome = AlertEngine::new(5.0).evaluate(&store).unwrap();

        assert_eq!(outcome, AlertOutcome::Written(1));
        let alerts = store.read_alerts().unwrap().into_rows();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].id, "ethereum");
    }

    #[test]
    fn test_empty_selection_leaves_previous_file_untouched() {
        let dir = TestDir::new("alerts_stale");
        let store = store_in(&dir);
        let engine = AlertEngine::new(5.0);

        store.write_snapshot(&[asset("ethereum", -9.0)]).unwrap();
        engine.evaluate(&store).unwrap();
        let before = fs::read(store.alert_path()).unwrap();

        store.write_snapshot(&[asset("ethereum", 0.4)]).unwrap();
        let outcome = engine.evaluate(&store).unwrap();

        assert_eq!(outcome, AlertOutcome::NoAlerts);
        assert_eq!(fs::read(store.alert_path()).unwrap(), before);
    }
}
