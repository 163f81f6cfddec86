use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Serialize, Serializer};

/// Snapshot and history column order.
pub const ASSET_COLUMNS: [&str; 8] = [
    "id",
    "symbol",
    "name",
    "current_price",
    "market_cap",
    "total_volume",
    "price_change_24h",
    "scrape_time",
];

pub const ALERT_COLUMNS: [&str; 6] = [
    "id",
    "symbol",
    "name",
    "current_price",
    "price_change_24h",
    "alert_time",
];

/// One coin as captured by a single scrape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetRecord {
    pub id: String,
    pub symbol: String,
    pub name: String,
    pub current_price: f64,
    pub market_cap: f64,
    pub total_volume: f64,
    /// Percent change over the trailing 24 hours
    pub price_change_24h: f64,
    #[serde(serialize_with = "serialize_timestamp")]
    pub scrape_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertRecord {
    pub id: String,
    pub symbol: String,
    pub name: String,
    pub current_price: f64,
    pub price_change_24h: f64,
    #[serde(serialize_with = "serialize_timestamp")]
    pub alert_time: DateTime<Utc>,
}

impl AlertRecord {
    pub fn from_asset(asset: &AssetRecord, alert_time: DateTime<Utc>) -> Self {
        Self {
            id: asset.id.clone(),
            symbol: asset.symbol.clone(),
            name: asset.name.clone(),
            current_price: asset.current_price,
            price_change_24h: asset.price_change_24h,
            alert_time,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub id: String,
    pub symbol: String,
    pub name: String,
    pub current_price: f64,
    pub price_change_pct: f64,
    pub market_cap: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MoverRow {
    pub name: String,
    pub price_change_pct: f64,
}

pub fn serialize_timestamp<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

/// Lenient timestamp parsing. Accepts RFC 3339 and the naive
/// `YYYY-MM-DD HH:MM:SS[.fff]` forms (read as UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Numeric coercion: anything unparseable or non-finite reads as zero.
pub fn parse_number(raw: &str) -> f64 {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2024-03-01T12:30:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01T14:30:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01 12:30:00"), Some(expected));
        assert_eq!(
            parse_timestamp("2024-03-01 12:30:00.250000"),
            Some(expected + chrono::Duration::milliseconds(250))
        );
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp(""), None);
    }

    #[test]
    fn test_parse_number_defaults_to_zero() {
        assert_eq!(parse_number("42.5"), 42.5);
        assert_eq!(parse_number(" -7.2 "), -7.2);
        assert_eq!(parse_number(""), 0.0);
        assert_eq!(parse_number("n/a"), 0.0);
        assert_eq!(parse_number("NaN"), 0.0);
    }
}
