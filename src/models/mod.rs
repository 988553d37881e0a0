pub mod black_scholes;
pub mod grid;
pub mod pnl;

pub use black_scholes::{price, PricingInputs, PricingResult};
pub use grid::{pnl_grid, price_grid, Grid, GridBase, GridSpec, HeatmapRange};
pub use pnl::{pnl_call, pnl_put};
