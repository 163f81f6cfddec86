pub mod dashboard;
pub mod theme;
pub mod view_model;
