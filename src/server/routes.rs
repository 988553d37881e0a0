use crate::db;
use crate::errors::{AppError, AppResult, PricingError};
use crate::models::grid::{self, Grid, GridBase, GridSpec, HeatmapRange};
use crate::models::{self, PricingInputs};
use crate::state::{AppState, CalculationEvent, DbCommand, WsMessage};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use portable_atomic::Ordering::Relaxed;
use smallvec::SmallVec;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;

/// JSON error body with an HTTP status.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: String,
    kind: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.error, "kind": self.kind });
        (self.status, Json(body)).into_response()
    }
}

impl From<PricingError> for ApiError {
    fn from(e: PricingError) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            kind: e.kind(),
            error: e.to_string(),
        }
    }
}

impl From<AppError> for ApiError {
    fn from(e: AppError) -> Self {
        match e {
            AppError::Pricing(p) => p.into(),
            other => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                kind: "internal",
                error: other.to_string(),
            },
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct PriceResponse {
    #[serde(flatten)]
    pub calculation: CalculationEvent,
    /// Collaborator problems (history store); the pricing itself succeeded.
    pub warnings: SmallVec<[String; 2]>,
}

#[derive(Debug, serde::Deserialize)]
pub struct HeatmapRequest {
    pub inputs: PricingInputs,
    pub spot_values: Option<Vec<f64>>,
    pub vol_values: Option<Vec<f64>>,
    pub range: Option<HeatmapRange>,
    /// When present, PnL grids are returned alongside the price grids.
    pub purchase_price: Option<f64>,
}

#[derive(Debug, serde::Serialize)]
pub struct HeatmapResponse {
    pub spot_values: Vec<f64>,
    pub vol_values: Vec<f64>,
    pub call: Grid,
    pub put: Grid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pnl_call: Option<Grid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pnl_put: Option<Grid>,
}

#[derive(serde::Deserialize)]
pub struct PnlQuery {
    pub strike: f64,
    pub terminal_spot: f64,
    pub purchase_price: f64,
}

#[derive(serde::Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

/// POST /api/price -- price one input set, log it to history
pub async fn post_price(
    State(state): State<Arc<AppState>>,
    Json(inputs): Json<PricingInputs>,
) -> Result<Json<PriceResponse>, ApiError> {
    let result = models::price(&inputs).map_err(|e| {
        state.counters.pricing_errors.fetch_add(1, Relaxed);
        tracing::warn!(error = %e, "pricing request rejected");
        e
    })?;
    state.counters.prices_computed.fetch_add(1, Relaxed);

    let event = CalculationEvent {
        id: uuid::Uuid::new_v4().to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        inputs,
        result,
    };

    let mut warnings = SmallVec::new();
    if let Err(e) = log_calculation(&state, &event) {
        warnings.push(e.to_string());
    }

    let _ = state.snapshot_tx.send(Some(event.clone()));
    state.broadcast(WsMessage::Calculation(event.clone()));

    Ok(Json(PriceResponse {
        calculation: event,
        warnings,
    }))
}

/// Hand the row to the writer task without waiting on it.
fn log_calculation(state: &AppState, event: &CalculationEvent) -> AppResult<()> {
    state
        .db_tx
        .try_send(DbCommand::calculation(event))
        .map_err(|e| {
            state.counters.history_writes_dropped.fetch_add(1, Relaxed);
            let err = match e {
                TrySendError::Full(_) => {
                    AppError::Database("history queue full, calculation not logged".into())
                }
                TrySendError::Closed(_) => AppError::ChannelClosed("history writer".into()),
            };
            tracing::warn!(error = %err, id = %event.id, "history write skipped");
            err
        })
}

fn grid_too_large(cells: Option<usize>, max_cells: usize) -> ApiError {
    let error = match cells {
        Some(cells) => format!("grid of {cells} cells exceeds limit of {max_cells}"),
        None => format!("grid cell count overflows limit of {max_cells}"),
    };
    ApiError {
        status: StatusCode::UNPROCESSABLE_ENTITY,
        kind: "grid_too_large",
        error,
    }
}

fn check_cells(spot_len: usize, vol_len: usize, max_cells: usize) -> Result<usize, ApiError> {
    match spot_len.checked_mul(vol_len) {
        Some(cells) if cells <= max_cells => Ok(cells),
        cells => Err(grid_too_large(cells, max_cells)),
    }
}

/// Explicit axes win over a range; a missing range falls back to the
/// dashboard defaults around the request's spot and volatility.
///
/// The cell cap is checked from axis lengths before any axis is generated.
fn resolve_axes(
    req: &mut HeatmapRequest,
    steps: usize,
    max_cells: usize,
) -> Result<GridSpec, ApiError> {
    if let (Some(spots), Some(vols)) = (req.spot_values.as_mut(), req.vol_values.as_mut()) {
        check_cells(spots.len(), vols.len(), max_cells)?;
        return Ok(GridSpec::new(std::mem::take(spots), std::mem::take(vols))?);
    }

    let range = match req.range {
        Some(range) => range,
        None => {
            req.inputs.validate()?;
            HeatmapRange::around(&req.inputs, steps)
        }
    };
    check_cells(
        req.spot_values.as_ref().map_or(range.steps, Vec::len),
        req.vol_values.as_ref().map_or(range.steps, Vec::len),
        max_cells,
    )?;
    let (generated_spots, generated_vols) = range.grid_spec()?.into_axes();

    Ok(GridSpec::new(
        req.spot_values.take().unwrap_or(generated_spots),
        req.vol_values.take().unwrap_or(generated_vols),
    )?)
}

/// POST /api/heatmap -- call/put price grids (and optional PnL grids)
pub async fn post_heatmap(
    State(state): State<Arc<AppState>>,
    Json(mut req): Json<HeatmapRequest>,
) -> Result<Json<HeatmapResponse>, ApiError> {
    let spec = resolve_axes(
        &mut req,
        state.config.heatmap_steps,
        state.config.max_grid_cells,
    )
    .map_err(|e| {
        tracing::warn!(kind = e.kind, error = %e.error, "heatmap request rejected");
        e
    })?;
    let cells = spec.cells();

    if let Some(p) = req.purchase_price.filter(|p| !p.is_finite()) {
        return Err(PricingError::invalid("purchase_price", p, "must be finite").into());
    }

    let base = GridBase::from(&req.inputs);
    let threshold = state.config.grid_parallel_threshold;
    // Grid evaluation is CPU-bound; keep it off the async workers
    let (spec, priced) = tokio::task::spawn_blocking(move || {
        let priced = grid::price_grid_with(&base, spec.spot_values(), spec.vol_values(), threshold);
        (spec, priced)
    })
    .await
    .map_err(AppError::from)?;
    let (call, put) = priced.map_err(|e| {
        state.counters.pricing_errors.fetch_add(1, Relaxed);
        tracing::warn!(error = %e, cells, "heatmap rejected");
        e
    })?;

    let (pnl_call, pnl_put) = match req.purchase_price {
        Some(purchase_price) => {
            let (c, p) = grid::pnl_grid(
                base.strike,
                purchase_price,
                spec.spot_values(),
                spec.vol_values(),
            );
            (Some(c), Some(p))
        }
        None => (None, None),
    };

    state.counters.heatmaps_computed.fetch_add(1, Relaxed);
    state.counters.grid_cells_evaluated.fetch_add(cells as u64, Relaxed);
    tracing::info!(cells, with_pnl = pnl_call.is_some(), "heatmap computed");

    let (spots, vols) = (spec.spot_values(), spec.vol_values());
    state.broadcast(WsMessage::Heatmap {
        vol_rows: vols.len(),
        spot_cols: spots.len(),
        spot_min: spots[0],
        spot_max: spots[spots.len() - 1],
        vol_min: vols[0],
        vol_max: vols[vols.len() - 1],
        with_pnl: pnl_call.is_some(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    });

    let (spot_values, vol_values) = spec.into_axes();
    Ok(Json(HeatmapResponse {
        spot_values,
        vol_values,
        call,
        put,
        pnl_call,
        pnl_put,
    }))
}

/// GET /api/pnl -- call and put PnL at one terminal spot
pub async fn get_pnl(Query(q): Query<PnlQuery>) -> Result<Json<serde_json::Value>, ApiError> {
    for (field, value) in [
        ("strike", q.strike),
        ("terminal_spot", q.terminal_spot),
        ("purchase_price", q.purchase_price),
    ] {
        if !value.is_finite() {
            return Err(PricingError::invalid(field, value, "must be finite").into());
        }
    }
    Ok(Json(serde_json::json!({
        "call": models::pnl_call(q.strike, q.terminal_spot, q.purchase_price),
        "put": models::pnl_put(q.strike, q.terminal_spot, q.purchase_price),
    })))
}

/// GET /api/history -- most recent logged calculations (cold path)
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let limit = params.limit.unwrap_or(50).min(state.config.history_limit_max);
    let rows = db::get_recent_calculations(&state.db, limit)?;
    Ok(Json(serde_json::json!({ "calculations": rows })))
}

/// GET /api/state -- latest calculation (from watch channel, no lock)
pub async fn get_state(State(state): State<Arc<AppState>>) -> Json<Option<CalculationEvent>> {
    let latest = state.snapshot_rx.borrow().clone();
    Json(latest)
}

/// GET /api/counters -- performance counters (lock-free reads)
pub async fn get_counters(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let c = &state.counters;
    Json(serde_json::json!({
        "prices_computed": c.prices_computed.load(Relaxed),
        "heatmaps_computed": c.heatmaps_computed.load(Relaxed),
        "grid_cells_evaluated": c.grid_cells_evaluated.load(Relaxed),
        "pricing_errors": c.pricing_errors.load(Relaxed),
        "history_writes_dropped": c.history_writes_dropped.load(Relaxed),
        "ws_messages_sent": c.ws_messages_sent.load(Relaxed),
    }))
}
