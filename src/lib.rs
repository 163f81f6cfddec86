//! Crypto market tracker.
//!
//! Fetches the top coins from CoinGecko into CSV snapshot and history files,
//! flags large 24h moves, writes gainers/losers reports and shows everything
//! in a polling terminal dashboard. The components share data only through
//! those files.

pub mod analysis;
pub mod api;
pub mod config;
pub mod error;
pub mod model;
pub mod store;
pub mod ui;
