pub mod api;
pub mod config;
pub mod errors;
pub mod tracker;
pub mod ui;
