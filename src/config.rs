use crate::errors::{AppError, AppResult};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server_port: u16,
    pub data_dir: PathBuf,
    /// Heatmaps larger than this are rejected before evaluation.
    pub max_grid_cells: usize,
    pub grid_parallel_threshold: usize,
    pub heatmap_steps: usize,
    pub history_limit_max: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_port: 3001,
            data_dir: PathBuf::from("data"),
            max_grid_cells: 2500,
            grid_parallel_threshold: crate::models::grid::DEFAULT_PARALLEL_THRESHOLD,
            heatmap_steps: crate::models::HeatmapRange::DEFAULT_STEPS,
            history_limit_max: 200,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> AppResult<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let server_port = env_var_or("SERVER_PORT", &defaults.server_port.to_string())
            .parse::<u16>()
            .map_err(|e| AppError::Config(format!("SERVER_PORT: {e}")))?;

        let max_grid_cells = env_parse("MAX_GRID_CELLS", defaults.max_grid_cells)?;
        let grid_parallel_threshold =
            env_parse("GRID_PARALLEL_THRESHOLD", defaults.grid_parallel_threshold)?;
        let heatmap_steps = env_parse("HEATMAP_STEPS", defaults.heatmap_steps)?;
        let history_limit_max = env_parse("HISTORY_LIMIT_MAX", defaults.history_limit_max)?;

        check_heatmap_steps(heatmap_steps, max_grid_cells)?;

        Ok(Self {
            server_port,
            data_dir: PathBuf::from(env_var_or("DATA_DIR", "data")),
            max_grid_cells,
            grid_parallel_threshold,
            heatmap_steps,
            history_limit_max,
        })
    }
}

/// The default heatmap must itself fit under the cell cap.
fn check_heatmap_steps(heatmap_steps: usize, max_grid_cells: usize) -> AppResult<()> {
    if heatmap_steps == 0 {
        return Err(AppError::Config("HEATMAP_STEPS: must be >= 1".into()));
    }
    match heatmap_steps.checked_mul(heatmap_steps) {
        Some(cells) if cells <= max_grid_cells => Ok(()),
        _ => Err(AppError::Config(format!(
            "HEATMAP_STEPS: default {heatmap_steps}x{heatmap_steps} grid exceeds MAX_GRID_CELLS={max_grid_cells}"
        ))),
    }
}

fn env_parse(key: &str, default: usize) -> AppResult<usize> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<usize>()
            .map_err(|e| AppError::Config(format!("{key}: {e}"))),
        Err(_) => Ok(default),
    }
}

fn env_var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
