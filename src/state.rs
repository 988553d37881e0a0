use crate::config::AppConfig;
use crate::db::DbPool;
use crate::models::{PricingInputs, PricingResult};
use portable_atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};

// ── Messages OUT to dashboards ──

#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "type")]
pub enum WsMessage {
    #[serde(rename = "calculation")]
    Calculation(CalculationEvent),

    #[serde(rename = "heatmap")]
    Heatmap {
        vol_rows: usize,
        spot_cols: usize,
        spot_min: f64,
        spot_max: f64,
        vol_min: f64,
        vol_max: f64,
        with_pnl: bool,
        timestamp: String,
    },
}

/// A single priced input set, as logged and broadcast.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CalculationEvent {
    pub id: String,
    pub timestamp: String,
    pub inputs: PricingInputs,
    pub result: PricingResult,
}

// ── DB Commands (sent to writer task via bounded channel) ──

#[derive(Debug)]
pub enum DbCommand {
    /// Append one history row from a flat field-name -> value mapping.
    InsertCalculation {
        id: String,
        created_at: String,
        fields: Vec<(&'static str, f64)>,
    },
}

impl DbCommand {
    pub fn calculation(event: &CalculationEvent) -> Self {
        let fields = event
            .inputs
            .fields()
            .into_iter()
            .chain(event.result.fields())
            .collect();
        DbCommand::InsertCalculation {
            id: event.id.clone(),
            created_at: event.timestamp.clone(),
            fields,
        }
    }
}

// ── Performance Counters (lock-free) ──

pub struct PerfCounters {
    pub prices_computed: AtomicU64,
    pub heatmaps_computed: AtomicU64,
    pub grid_cells_evaluated: AtomicU64,
    pub pricing_errors: AtomicU64,
    pub history_writes_dropped: AtomicU64,
    pub ws_messages_sent: AtomicU64,
}

impl PerfCounters {
    pub fn new() -> Self {
        Self {
            prices_computed: AtomicU64::new(0),
            heatmaps_computed: AtomicU64::new(0),
            grid_cells_evaluated: AtomicU64::new(0),
            pricing_errors: AtomicU64::new(0),
            history_writes_dropped: AtomicU64::new(0),
            ws_messages_sent: AtomicU64::new(0),
        }
    }
}

impl Default for PerfCounters {
    fn default() -> Self {
        Self::new()
    }
}

// ── Application shared state (channels, not locks) ──

pub struct AppState {
    pub config: AppConfig,
    pub db: DbPool,

    // Latest calculation for newly connected dashboards
    pub snapshot_tx: watch::Sender<Option<CalculationEvent>>,
    pub snapshot_rx: watch::Receiver<Option<CalculationEvent>>,

    // Event stream for WS clients
    pub ws_tx: broadcast::Sender<WsMessage>,

    // Handlers -> DB Writer: bounded command channel
    pub db_tx: mpsc::Sender<DbCommand>,

    pub counters: PerfCounters,
}

impl AppState {
    pub fn new(config: AppConfig, db: DbPool, db_tx: mpsc::Sender<DbCommand>) -> Arc<Self> {
        let (ws_tx, _) = broadcast::channel(256);
        let (snapshot_tx, snapshot_rx) = watch::channel(None);

        Arc::new(Self {
            config,
            db,
            snapshot_tx,
            snapshot_rx,
            ws_tx,
            db_tx,
            counters: PerfCounters::new(),
        })
    }

    #[inline]
    pub fn broadcast(&self, msg: WsMessage) {
        self.counters.ws_messages_sent.fetch_add(1, Ordering::Relaxed);
        let _ = self.ws_tx.send(msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::price;

    #[test]
    fn test_calculation_command_is_flat_inputs_then_outputs() {
        let inputs = PricingInputs::new(100.0, 95.0, 0.5, 0.25, 0.02);
        let event = CalculationEvent {
            id: "abc".into(),
            timestamp: "2026-01-01T00:00:00Z".into(),
            inputs,
            result: price(&inputs).unwrap(),
        };
        let DbCommand::InsertCalculation { id, fields, .. } = DbCommand::calculation(&event);
        assert_eq!(id, "abc");
        assert_eq!(fields.len(), 17);
        assert_eq!(fields[0], ("current_price", 100.0));
        assert_eq!(fields[5].0, "call_price");
        assert_eq!(fields[16], ("rho_put", event.result.rho_put));
    }

    #[test]
    fn test_ws_message_tagged() {
        let inputs = PricingInputs::new(100.0, 100.0, 1.0, 0.2, 0.05);
        let msg = WsMessage::Calculation(CalculationEvent {
            id: "x".into(),
            timestamp: "t".into(),
            inputs,
            result: price(&inputs).unwrap(),
        });
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "calculation");
        assert_eq!(json["inputs"]["current_price"], 100.0);
    }
}
