mod markets;

pub use markets::{parse_markets, MarketFetcher};
