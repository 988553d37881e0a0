use crate::errors::PricingError;
use crate::models::black_scholes::{self, PricingInputs};
use crate::models::pnl;
use rayon::prelude::*;

/// Cell count at which volatility rows are evaluated on the rayon pool.
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 400;

/// The inputs held fixed across a heatmap: only spot and volatility vary.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GridBase {
    pub strike: f64,
    pub time_to_maturity: f64,
    pub interest_rate: f64,
}

impl GridBase {
    #[inline]
    pub fn at(&self, spot: f64, volatility: f64) -> PricingInputs {
        PricingInputs::new(
            spot,
            self.strike,
            self.time_to_maturity,
            volatility,
            self.interest_rate,
        )
    }
}

impl From<&PricingInputs> for GridBase {
    fn from(inputs: &PricingInputs) -> Self {
        Self {
            strike: inputs.strike,
            time_to_maturity: inputs.time_to_maturity,
            interest_rate: inputs.interest_rate,
        }
    }
}

/// 2-D heatmap values indexed `[vol_index][spot_index]`.
/// Serializes as a list of rows, one per volatility level.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(transparent)]
pub struct Grid {
    rows: Vec<Vec<f64>>,
}

impl Grid {
    fn from_rows(rows: Vec<Vec<f64>>) -> Self {
        Self { rows }
    }

    /// (number of volatility rows, number of spot columns)
    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.rows.first().map_or(0, Vec::len))
    }

    #[inline]
    pub fn get(&self, vol_index: usize, spot_index: usize) -> Option<f64> {
        self.rows.get(vol_index)?.get(spot_index).copied()
    }

    pub fn row(&self, vol_index: usize) -> Option<&[f64]> {
        self.rows.get(vol_index).map(Vec::as_slice)
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }
}

/// Validated heatmap axes: both non-empty, finite and ascending.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct GridSpec {
    spot_values: Vec<f64>,
    vol_values: Vec<f64>,
}

impl GridSpec {
    pub fn new(spot_values: Vec<f64>, vol_values: Vec<f64>) -> Result<Self, PricingError> {
        validate_axes(&spot_values, &vol_values)?;
        Ok(Self {
            spot_values,
            vol_values,
        })
    }

    pub fn spot_values(&self) -> &[f64] {
        &self.spot_values
    }

    pub fn vol_values(&self) -> &[f64] {
        &self.vol_values
    }

    pub fn cells(&self) -> usize {
        self.spot_values.len() * self.vol_values.len()
    }

    /// (spot_values, vol_values)
    pub fn into_axes(self) -> (Vec<f64>, Vec<f64>) {
        (self.spot_values, self.vol_values)
    }
}

fn validate_axis(field: &'static str, values: &[f64]) -> Result<(), PricingError> {
    if values.is_empty() {
        return Err(PricingError::invalid(field, 0.0, "axis must not be empty"));
    }
    if let Some(&v) = values.iter().find(|v| !v.is_finite()) {
        return Err(PricingError::invalid(field, v, "axis values must be finite"));
    }
    if let Some(w) = values.windows(2).find(|w| w[1] < w[0]) {
        return Err(PricingError::invalid(field, w[1], "axis must be ascending"));
    }
    Ok(())
}

fn validate_axes(spot_values: &[f64], vol_values: &[f64]) -> Result<(), PricingError> {
    validate_axis("spot_values", spot_values)?;
    validate_axis("vol_values", vol_values)
}

/// One volatility row: call and put prices across every spot.
fn price_row(
    base: &GridBase,
    spot_values: &[f64],
    volatility: f64,
) -> Result<(Vec<f64>, Vec<f64>), PricingError> {
    let mut calls = Vec::with_capacity(spot_values.len());
    let mut puts = Vec::with_capacity(spot_values.len());
    for &spot in spot_values {
        let res = black_scholes::price(&base.at(spot, volatility))?;
        calls.push(res.call_price);
        puts.push(res.put_price);
    }
    Ok((calls, puts))
}

/// Call and put price grids over `vol_values × spot_values`.
///
/// Any failing cell aborts the whole grid with that cell's error; no
/// sentinel values are ever written. Equivalent to `price_grid_with` at
/// `DEFAULT_PARALLEL_THRESHOLD`.
pub fn price_grid(
    base: &GridBase,
    spot_values: &[f64],
    vol_values: &[f64],
) -> Result<(Grid, Grid), PricingError> {
    price_grid_with(base, spot_values, vol_values, DEFAULT_PARALLEL_THRESHOLD)
}

/// `price_grid` with an explicit parallelism threshold (in cells).
///
/// Rows are independent and may run on the rayon pool. The error reported
/// is always the first failing row in volatility order, so sequential and
/// parallel evaluation are indistinguishable to the caller.
pub fn price_grid_with(
    base: &GridBase,
    spot_values: &[f64],
    vol_values: &[f64],
    parallel_threshold: usize,
) -> Result<(Grid, Grid), PricingError> {
    validate_axes(spot_values, vol_values)?;

    let cells = spot_values.len() * vol_values.len();
    let rows: Vec<Result<(Vec<f64>, Vec<f64>), PricingError>> = if cells >= parallel_threshold {
        vol_values
            .par_iter()
            .map(|&vol| price_row(base, spot_values, vol))
            .collect()
    } else {
        vol_values
            .iter()
            .map(|&vol| price_row(base, spot_values, vol))
            .collect()
    };

    let rows = rows.into_iter().collect::<Result<Vec<_>, _>>()?;
    let (call_rows, put_rows): (Vec<_>, Vec<_>) = rows.into_iter().unzip();

    Ok((Grid::from_rows(call_rows), Grid::from_rows(put_rows)))
}

/// Call and put PnL grids over `vol_values × spot_values`, treating each spot
/// as the terminal spot.
///
/// Volatility does not enter the payoff, so every row is identical; the
/// grids keep the price grids' shape so the two line up on a dashboard.
/// Total: empty axes give an empty grid.
pub fn pnl_grid(
    strike: f64,
    purchase_price: f64,
    spot_values: &[f64],
    vol_values: &[f64],
) -> (Grid, Grid) {
    let call_rows = vol_values
        .iter()
        .map(|_vol| {
            spot_values
                .iter()
                .map(|&spot| pnl::pnl_call(strike, spot, purchase_price))
                .collect()
        })
        .collect();
    let put_rows = vol_values
        .iter()
        .map(|_vol| {
            spot_values
                .iter()
                .map(|&spot| pnl::pnl_put(strike, spot, purchase_price))
                .collect()
        })
        .collect();

    (Grid::from_rows(call_rows), Grid::from_rows(put_rows))
}

/// `n` evenly spaced values from `start` to `end`, both endpoints included.
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let last = n - 1;
            let step = (end - start) / last as f64;
            (0..n)
                .map(|i| if i == last { end } else { start + step * i as f64 })
                .collect()
        }
    }
}

/// Heatmap axis bounds as entered on the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct HeatmapRange {
    pub spot_min: f64,
    pub spot_max: f64,
    pub vol_min: f64,
    pub vol_max: f64,
    #[serde(default = "default_steps")]
    pub steps: usize,
}

fn default_steps() -> usize {
    HeatmapRange::DEFAULT_STEPS
}

impl HeatmapRange {
    pub const DEFAULT_STEPS: usize = 10;
    pub const MIN_SPOT: f64 = 0.01;
    pub const MIN_VOL: f64 = 0.01;
    pub const MAX_VOL: f64 = 1.0;

    /// Dashboard defaults: spot ±20 %, volatility ×0.5 to ×1.5 clamped to
    /// [0.01, 1.0].
    pub fn around(inputs: &PricingInputs, steps: usize) -> Self {
        Self {
            spot_min: (inputs.spot * 0.8).max(Self::MIN_SPOT),
            spot_max: (inputs.spot * 1.2).max(Self::MIN_SPOT),
            vol_min: (inputs.volatility * 0.5).clamp(Self::MIN_VOL, Self::MAX_VOL),
            vol_max: (inputs.volatility * 1.5).clamp(Self::MIN_VOL, Self::MAX_VOL),
            steps,
        }
    }

    pub fn grid_spec(&self) -> Result<GridSpec, PricingError> {
        if self.steps == 0 {
            return Err(PricingError::invalid("steps", 0.0, "must be >= 1"));
        }
        if self.spot_min.is_nan() || self.spot_min <= 0.0 {
            return Err(PricingError::invalid("spot_min", self.spot_min, "must be > 0"));
        }
        if self.vol_min.is_nan() || self.vol_min <= 0.0 {
            return Err(PricingError::invalid("vol_min", self.vol_min, "must be > 0"));
        }
        if self.spot_max < self.spot_min {
            return Err(PricingError::invalid("spot_max", self.spot_max, "must be >= spot_min"));
        }
        if self.vol_max < self.vol_min {
            return Err(PricingError::invalid("vol_max", self.vol_max, "must be >= vol_min"));
        }
        GridSpec::new(
            linspace(self.spot_min, self.spot_max, self.steps),
            linspace(self.vol_min, self.vol_max, self.steps),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn base() -> GridBase {
        GridBase {
            strike: 100.0,
            time_to_maturity: 1.0,
            interest_rate: 0.05,
        }
    }

    #[test]
    fn test_price_grid_shape() {
        let spots = linspace(80.0, 120.0, 7);
        let vols = linspace(0.1, 0.3, 4);
        let (call, put) = price_grid(&base(), &spots, &vols).unwrap();
        assert_eq!(call.shape(), (4, 7));
        assert_eq!(put.shape(), (4, 7));
        assert_eq!(call.rows().len(), vols.len());
    }

    #[test]
    fn test_cells_match_kernel() {
        let spots = [90.0, 100.0, 110.0];
        let vols = [0.15, 0.2];
        let (call, put) = price_grid(&base(), &spots, &vols).unwrap();
        for (v, &vol) in vols.iter().enumerate() {
            for (s, &spot) in spots.iter().enumerate() {
                let res = black_scholes::price(&base().at(spot, vol)).unwrap();
                assert_eq!(call.get(v, s), Some(res.call_price));
                assert_eq!(put.get(v, s), Some(res.put_price));
            }
        }
        assert_abs_diff_eq!(call.get(1, 1).unwrap(), 10.4506, epsilon = 1e-3);
        assert_eq!(call.get(2, 0), None);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let spots = linspace(50.0, 150.0, 25);
        let vols = linspace(0.05, 0.9, 20);
        let sequential = price_grid_with(&base(), &spots, &vols, usize::MAX).unwrap();
        let parallel = price_grid_with(&base(), &spots, &vols, 0).unwrap();
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_call_rises_with_spot_and_vol() {
        let spots = linspace(80.0, 120.0, 10);
        let vols = linspace(0.1, 0.3, 10);
        let (call, _) = price_grid(&base(), &spots, &vols).unwrap();
        for v in 0..10 {
            let row = call.row(v).unwrap();
            assert!(row.windows(2).all(|w| w[1] >= w[0]), "row {v} not increasing in spot");
        }
        for s in 0..10 {
            for v in 1..10 {
                assert!(call.get(v, s).unwrap() > call.get(v - 1, s).unwrap());
            }
        }
    }

    #[test]
    fn test_degenerate_cell_aborts_grid() {
        let err = price_grid(&base(), &[90.0, 100.0], &[0.0, 0.2]).unwrap_err();
        assert!(matches!(err, PricingError::DegenerateInputs(_)));

        let expired = GridBase { time_to_maturity: 0.0, ..base() };
        let err = price_grid_with(&expired, &[100.0], &[0.2], 0).unwrap_err();
        assert_eq!(err.kind(), "degenerate_inputs");
    }

    #[test]
    fn test_invalid_spot_cell_aborts_grid() {
        let err = price_grid(&base(), &[-10.0, 100.0], &[0.2]).unwrap_err();
        assert!(matches!(err, PricingError::InvalidInput { field: "current_price", .. }));
    }

    #[test]
    fn test_axis_validation() {
        assert!(matches!(
            price_grid(&base(), &[], &[0.2]),
            Err(PricingError::InvalidInput { field: "spot_values", .. })
        ));
        assert!(matches!(
            price_grid(&base(), &[100.0], &[]),
            Err(PricingError::InvalidInput { field: "vol_values", .. })
        ));
        assert!(matches!(
            GridSpec::new(vec![110.0, 100.0], vec![0.2]),
            Err(PricingError::InvalidInput { field: "spot_values", .. })
        ));
        assert!(GridSpec::new(vec![100.0], vec![0.2, f64::NAN]).is_err());
        assert_eq!(GridSpec::new(vec![1.0, 2.0, 3.0], vec![0.1, 0.2]).unwrap().cells(), 6);
    }

    #[test]
    fn test_pnl_grid_rows_constant_across_vol() {
        let spots = linspace(80.0, 120.0, 5);
        let vols = linspace(0.1, 0.5, 6);
        let (call, put) = pnl_grid(100.0, 10.0, &spots, &vols);
        assert_eq!(call.shape(), (6, 5));
        assert_eq!(put.shape(), (6, 5));
        for v in 1..6 {
            assert_eq!(call.row(v), call.row(0));
            assert_eq!(put.row(v), put.row(0));
        }
        assert_eq!(call.get(3, 4), Some(10.0));
        assert_eq!(put.get(3, 4), Some(-10.0));
        assert_eq!(put.get(0, 0), Some(10.0));
    }

    #[test]
    fn test_pnl_grid_empty_axes() {
        let (call, put) = pnl_grid(100.0, 5.0, &[100.0, 110.0], &[]);
        assert_eq!(call.shape(), (0, 0));
        assert!(put.rows().is_empty());
    }

    #[test]
    fn test_linspace() {
        assert!(linspace(0.0, 1.0, 0).is_empty());
        assert_eq!(linspace(3.0, 9.0, 1), vec![3.0]);
        let xs = linspace(80.0, 120.0, 10);
        assert_eq!(xs.len(), 10);
        assert_eq!(xs[0], 80.0);
        assert_eq!(xs[9], 120.0);
        assert_abs_diff_eq!(xs[1] - xs[0], 40.0 / 9.0, epsilon = 1e-12);
    }

    #[test]
    fn test_range_around_defaults() {
        let inputs = PricingInputs::new(100.0, 100.0, 1.0, 0.2, 0.05);
        let range = HeatmapRange::around(&inputs, HeatmapRange::DEFAULT_STEPS);
        assert_abs_diff_eq!(range.spot_min, 80.0, epsilon = 1e-12);
        assert_abs_diff_eq!(range.spot_max, 120.0, epsilon = 1e-12);
        assert_abs_diff_eq!(range.vol_min, 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(range.vol_max, 0.3, epsilon = 1e-12);

        let spec = range.grid_spec().unwrap();
        assert_eq!(spec.spot_values().len(), 10);
        assert_eq!(spec.vol_values().len(), 10);
    }

    #[test]
    fn test_range_vol_clamped() {
        let inputs = PricingInputs::new(100.0, 100.0, 1.0, 0.9, 0.05);
        let range = HeatmapRange::around(&inputs, 5);
        assert_abs_diff_eq!(range.vol_min, 0.45, epsilon = 1e-12);
        assert_eq!(range.vol_max, 1.0);

        let tiny = PricingInputs::new(100.0, 100.0, 1.0, 0.001, 0.05);
        assert_eq!(HeatmapRange::around(&tiny, 5).vol_min, 0.01);
    }

    #[test]
    fn test_range_validation() {
        let mut range = HeatmapRange {
            spot_min: 80.0,
            spot_max: 120.0,
            vol_min: 0.1,
            vol_max: 0.3,
            steps: 0,
        };
        assert!(matches!(
            range.grid_spec(),
            Err(PricingError::InvalidInput { field: "steps", .. })
        ));
        range.steps = 3;
        range.spot_max = 50.0;
        assert!(matches!(
            range.grid_spec(),
            Err(PricingError::InvalidInput { field: "spot_max", .. })
        ));
        range.spot_max = 120.0;
        range.vol_min = 0.0;
        assert!(range.grid_spec().is_err());
    }

    #[test]
    fn test_range_steps_default_when_missing() {
        let range: HeatmapRange = serde_json::from_str(
            r#"{"spot_min":80,"spot_max":120,"vol_min":0.1,"vol_max":0.3}"#,
        )
        .unwrap();
        assert_eq!(range.steps, HeatmapRange::DEFAULT_STEPS);
    }
}
