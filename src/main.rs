use fraudsentry::{api, config, db, ensemble::TreeEnsemble, narrator::GeminiNarrator};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // Logs go to stdout; RUST_LOG overrides the DEBUG default
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_writer(std::io::stdout)
        .with_target(false)
        .init();

    info!("FraudSentry starting...");

    // Load configuration (fails without GEMINI_API_KEY)
    let cfg = config::load()?;
    info!("  DB Path: {}", cfg.db_path);
    info!("  Port: {}", cfg.port);
    info!("  RF model: {}", cfg.rf_model_path.display());
    info!("  XGB model: {}", cfg.xgb_model_path.display());
    info!("  Narrative model: {}", cfg.gemini_model);

    // Create the history table once at startup
    {
        let conn = db::connect(&cfg.db_path)?;
        db::run_migrations(&conn)?;
    }

    info!("Loading models...");
    let forest = TreeEnsemble::load(&cfg.rf_model_path)?;
    let boosted = TreeEnsemble::load(&cfg.xgb_model_path)?;
    info!("Models loaded!");

    let narrator = Arc::new(GeminiNarrator::new(
        cfg.gemini_api_key.clone(),
        cfg.gemini_model.clone(),
        cfg.gemini_base_url.clone(),
    ));

    let state = Arc::new(api::AppState::new(
        cfg.db_path.clone(),
        cfg.report_dir.clone(),
        forest,
        boosted,
        narrator,
    ));

    let api_handle = tokio::spawn({
        let cfg = cfg.clone();
        async move { api::serve(cfg, state).await }
    });

    tokio::select! {
        res = api_handle => match res {
            Ok(Ok(_)) => info!("API exited cleanly"),
            Ok(Err(e)) => error!("API error: {:?}", e),
            Err(e) => error!("API task panicked: {:?}", e),
        },
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received, stopping...");
        }
    }

    info!("FraudSentry stopped.");
    Ok(())
}
