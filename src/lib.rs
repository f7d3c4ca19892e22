//! Customer segmentation dashboard: filter a customer dataset, inspect
//! aggregate figures and export the matching rows.

pub mod config;
pub mod data;
pub mod error;
pub mod export;
pub mod hub;
pub mod session;
