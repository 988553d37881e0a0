//! Black-Scholes-Merton pricing engine with spot × volatility heatmaps.
//!
//! The numeric core lives in [`models`] and has no runtime state:
//! [`models::price`] values one input set, [`models::price_grid`] and
//! [`models::pnl_grid`] sweep it over heatmap axes. The remaining modules
//! wrap it in the HTTP service that dashboards talk to.

pub mod config;
pub mod db;
pub mod errors;
pub mod models;
pub mod server;
pub mod state;
