pub mod alerts;
pub mod report;
