use crate::config::Config;
use crate::db;
use crate::ensemble::TreeEnsemble;
use crate::error::ApiError;
use crate::explain::TreeExplainer;
use crate::models::{
    BatchResponse, DashboardStats, HistoryRecord, ModelChoice, PredictionResponse, ReportRequest,
    ScanSummary, Transaction,
};
use crate::narrator::{narrate_or_fallback, Narrator, NO_ANALYSIS};
use crate::report;
use crate::scanner;
use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::Local;
use eyre::WrapErr;
use serde::Deserialize;
use std::{path::PathBuf, sync::Arc};
use tokio::task;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Process-wide state: both models are loaded once and never reloaded.
pub struct AppState {
    pub db_path: String,
    pub report_dir: PathBuf,
    pub forest: Arc<TreeEnsemble>,
    pub boosted: Arc<TreeEnsemble>,
    pub explainer: TreeExplainer,
    pub narrator: Arc<dyn Narrator>,
}

impl AppState {
    pub fn new(
        db_path: String,
        report_dir: PathBuf,
        forest: TreeEnsemble,
        boosted: TreeEnsemble,
        narrator: Arc<dyn Narrator>,
    ) -> Self {
        let boosted = Arc::new(boosted);
        Self {
            db_path,
            report_dir,
            forest: Arc::new(forest),
            explainer: TreeExplainer::new(Arc::clone(&boosted)),
            boosted,
            narrator,
        }
    }
}

#[derive(Deserialize)]
pub struct PredictQuery {
    pub model_type: Option<String>,
}

pub fn router(state: Arc<AppState>, cors_origin: &str, max_upload_bytes: usize) -> Router {
    let origin = match cors_origin.parse::<HeaderValue>() {
        Ok(value) => AllowOrigin::exact(value),
        Err(_) => {
            warn!("Invalid CORS_ORIGIN {:?}, allowing any origin", cors_origin);
            AllowOrigin::any()
        }
    };
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(|| async { "FraudSentry API running" }))
        .route("/predict", post(predict))
        .route("/upload-batch", post(upload_batch))
        .route("/save-report", post(save_report))
        .route("/history", get(history))
        .route("/dashboard-stats", get(dashboard_stats))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(cfg: Config, state: Arc<AppState>) -> eyre::Result<()> {
    let app = router(state, &cfg.cors_origin, cfg.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind((cfg.host.as_str(), cfg.port)).await?;
    info!("API listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

// ---------- handlers ----------

async fn predict(
    State(state): State<Arc<AppState>>,
    Query(q): Query<PredictQuery>,
    Json(tx): Json<Transaction>,
) -> Json<PredictionResponse> {
    let features = tx.features();
    let choice = ModelChoice::from_query(q.model_type.as_deref());

    let (label, probability) = match choice {
        ModelChoice::RandomForest => state.forest.classify(&features),
        ModelChoice::Boosted => state.boosted.classify(&features),
    };
    let explanation = state.explainer.explain(&features);

    // Only flagged transactions get a narrative
    let ai_analysis = if label == 1 {
        narrate_or_fallback(state.narrator.as_ref(), &explanation).await
    } else {
        NO_ANALYSIS.to_string()
    };

    info!(
        model = choice.label(),
        label,
        probability,
        "Scored transaction"
    );

    Json(PredictionResponse {
        is_fraud: label,
        risk_score: probability,
        model_used: choice.label().to_string(),
        message: if label == 1 {
            "Transaction flagged as suspicious!"
        } else {
            "Transaction appears safe."
        }
        .to_string(),
        explanation,
        ai_analysis,
    })
}

async fn upload_batch(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<BatchResponse>, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() == Some("file") {
            let name = field.file_name().unwrap_or("upload.csv").to_string();
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {}", e)))?;
            upload = Some((name, data));
            break;
        }
    }
    let (name, data) =
        upload.ok_or_else(|| ApiError::BadRequest("Missing multipart field: file".to_string()))?;

    let rows = scanner::parse_csv(&data)?;
    let result = scanner::scan(rows, &state.forest, &state.boosted);

    info!(
        "Scanned {} → {} rows (RF {}, XGB {}, both {})",
        name,
        result.stats.total_scanned,
        result.stats.rf_flags,
        result.stats.xgb_flags,
        result.stats.both_agreed
    );

    Ok(Json(result))
}

async fn save_report(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ReportRequest>,
) -> Result<Response, ApiError> {
    let now = Local::now();

    // 1. history row
    let summary = ScanSummary {
        scan_date: now.format("%Y-%m-%d %H:%M:%S").to_string(),
        filename: req.filename.clone(),
        total_scanned: req.total,
        fraud_found_xgb: req.xgb_fraud,
        fraud_found_rf: req.rf_fraud,
    };
    let db_path = state.db_path.clone();
    let id = task::spawn_blocking(move || {
        let conn = db::connect(&db_path)?;
        db::insert_history(&conn, &summary)
    })
    .await??;

    // 2. PDF, kept on disk and returned
    let layout = report::build_layout(&req, &now);
    let file_name = layout.file_name();
    let path = state.report_dir.join(&file_name);
    let bytes = task::spawn_blocking(move || -> eyre::Result<Vec<u8>> {
        let bytes = report::render_pdf(&layout)?;
        std::fs::write(&path, &bytes)
            .wrap_err_with(|| format!("failed to write report {}", path.display()))?;
        Ok(bytes)
    })
    .await??;

    info!("💾 Saved report {} (history id {})", file_name, id);

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        bytes,
    )
        .into_response())
}

async fn history(State(state): State<Arc<AppState>>) -> Result<Json<Vec<HistoryRecord>>, ApiError> {
    let db_path = state.db_path.clone();
    let rows = task::spawn_blocking(move || {
        let conn = db::connect(&db_path)?;
        db::list_history(&conn)
    })
    .await??;
    Ok(Json(rows))
}

async fn dashboard_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DashboardStats>, ApiError> {
    let db_path = state.db_path.clone();
    let stats = task::spawn_blocking(move || {
        let conn = db::connect(&db_path)?;
        db::dashboard_stats(&conn)
    })
    .await??;
    Ok(Json(stats))
}
