use bsm_heatmap::state::{AppState, DbCommand};
use bsm_heatmap::{config, db, server};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("bsm_heatmap starting");

    let cfg = match config::AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("config error: {e}");
            std::process::exit(1);
        }
    };

    let db_pool = match db::init_db(&cfg.data_dir) {
        Ok(d) => d,
        Err(e) => {
            tracing::error!("database init error: {e}");
            std::process::exit(1);
        }
    };

    // Bounded: a stalled history store drops rows instead of backing up pricing
    let (db_tx, db_rx) = mpsc::channel::<DbCommand>(1024);

    let app_state = AppState::new(cfg.clone(), db_pool.clone(), db_tx);

    // DB writer task (dedicated, owns the DB connection for writes)
    tokio::spawn(db::run_db_writer(db_pool, db_rx));

    let app = server::router(app_state);

    let addr = format!("0.0.0.0:{}", cfg.server_port);
    tracing::info!(
        max_grid_cells = cfg.max_grid_cells,
        parallel_threshold = cfg.grid_parallel_threshold,
        "server listening on {addr}"
    );

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("bind error: {e}");
            std::process::exit(1);
        });

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("server error: {e}");
    }
}
