//! End-to-end tests for the HTTP surface, run against the bundled demo models.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use fraudsentry::{
    api::{router, AppState},
    db,
    ensemble::TreeEnsemble,
    models::{FeatureImpact, ScanSummary},
    narrator::{Narrator, NarratorError},
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "fraudsentry-test-boundary";

/// Narrator stub: replies with a fixed text, or fails when none is set
struct Canned(Option<&'static str>);

#[async_trait]
impl Narrator for Canned {
    async fn narrate(&self, factors: &[FeatureImpact]) -> Result<String, NarratorError> {
        match self.0 {
            Some(text) => Ok(format!("{} ({} factors)", text, factors.len())),
            None => Err(NarratorError::Api {
                status: 503,
                body: "unavailable".to_string(),
            }),
        }
    }
}

struct TestApp {
    dir: TempDir,
    db_path: String,
    app: Router,
}

fn load_model(name: &str) -> TreeEnsemble {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("models").join(name);
    TreeEnsemble::load(path).unwrap()
}

fn test_app(narrator: Canned) -> TestApp {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("history.db").to_string_lossy().to_string();
    let conn = db::connect(&db_path).unwrap();
    db::run_migrations(&conn).unwrap();

    let state = AppState::new(
        db_path.clone(),
        dir.path().to_path_buf(),
        load_model("fraud_model.json"),
        load_model("fraud_model_xgboost.json"),
        Arc::new(narrator),
    );
    let app = router(Arc::new(state), "http://localhost:5173", 1024 * 1024);

    TestApp { dir, db_path, app }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    (status, bytes.to_vec())
}

async fn send_json(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let (status, bytes) = send(app, req).await;
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn upload(field: &str, csv: &str) -> Request<Body> {
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"scan.csv\"\r\n\
         Content-Type: text/csv\r\n\r\n{csv}\r\n--{b}--\r\n",
        b = BOUNDARY,
        field = field,
        csv = csv
    );
    Request::builder()
        .method("POST")
        .uri("/upload-batch")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

fn drained() -> Value {
    json!({
        "amount": 200000.0,
        "oldbalanceOrg": 200000.0,
        "newbalanceOrig": 0.0,
        "oldbalanceDest": 0.0,
        "newbalanceDest": 200000.0
    })
}

fn routine() -> Value {
    json!({
        "amount": 500.0,
        "oldbalanceOrg": 10000.0,
        "newbalanceOrig": 9500.0,
        "oldbalanceDest": 1000.0,
        "newbalanceDest": 1500.0
    })
}

fn report_body(filename: &str) -> Value {
    json!({
        "filename": filename,
        "total": 4,
        "xgb_fraud": 1,
        "rf_fraud": 2,
        "confirmed_frauds": [{
            "amount": 200000.0,
            "oldbalanceOrg": 200000.0,
            "newbalanceOrig": 0.0,
            "oldbalanceDest": 0.0,
            "newbalanceDest": 200000.0,
            "XGB_Risk_Score": 0.985,
            "RF_Prediction": 1,
            "XGB_Prediction": 1
        }],
        "false_alarms": []
    })
}

#[tokio::test]
async fn health_check() {
    let t = test_app(Canned(Some("ok")));
    let (status, body) = send(&t.app, get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(String::from_utf8(body).unwrap(), "FraudSentry API running");
}

#[tokio::test]
async fn predict_flags_drained_account_with_forest_by_default() {
    let t = test_app(Canned(Some("Funds were moved out")));
    let (status, body) = send_json(&t.app, post_json("/predict", drained())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_fraud"], 1);
    assert_eq!(body["model_used"], "RF");
    assert_eq!(body["message"], "Transaction flagged as suspicious!");
    let risk = body["risk_score"].as_f64().unwrap();
    assert!((risk - 0.87).abs() < 1e-9);

    let explanation = body["explanation"].as_array().unwrap();
    assert_eq!(explanation.len(), 5);
    let impacts: Vec<f64> = explanation
        .iter()
        .map(|e| e["impact"].as_f64().unwrap().abs())
        .collect();
    for pair in impacts.windows(2) {
        assert!(pair[0] >= pair[1]);
    }

    assert_eq!(body["ai_analysis"], "Funds were moved out (5 factors)");
}

#[tokio::test]
async fn predict_uses_boosted_model_when_asked() {
    let t = test_app(Canned(Some("narrative")));
    let (status, body) = send_json(&t.app, post_json("/predict?model_type=xgb", drained())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model_used"], "XGB");
    let risk = body["risk_score"].as_f64().unwrap();
    let expected = 1.0 / (1.0 + (-4.2f64).exp());
    assert!((risk - expected).abs() < 1e-9);
}

#[tokio::test]
async fn unknown_model_type_falls_back_to_forest() {
    let t = test_app(Canned(Some("narrative")));
    let (_, body) = send_json(&t.app, post_json("/predict?model_type=SVM", drained())).await;
    assert_eq!(body["model_used"], "RF");
}

#[tokio::test]
async fn routine_transfer_skips_narrative() {
    let t = test_app(Canned(None));
    let (status, body) = send_json(&t.app, post_json("/predict?model_type=XGB", routine())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_fraud"], 0);
    assert_eq!(body["message"], "Transaction appears safe.");
    assert_eq!(body["ai_analysis"], "Analysis not available.");
    assert_eq!(body["explanation"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn narrator_failure_still_returns_prediction() {
    let t = test_app(Canned(None));
    let (status, body) = send_json(&t.app, post_json("/predict", drained())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_fraud"], 1);
    assert!(body["ai_analysis"]
        .as_str()
        .unwrap()
        .starts_with("AI Error:"));
}

#[tokio::test]
async fn predict_rejects_incomplete_transaction() {
    let t = test_app(Canned(Some("x")));
    let (status, _) = send(&t.app, post_json("/predict", json!({ "amount": 10.0 }))).await;
    assert!(status.is_client_error());
}

#[tokio::test]
async fn upload_scores_every_row() {
    let t = test_app(Canned(Some("x")));
    let csv = "step,type,amount,oldbalanceOrg,newbalanceOrig,oldbalanceDest,newbalanceDest\n\
               1,CASH_OUT,500,10000,9500,1000,1500\n\
               1,TRANSFER,200000,200000,0,0,200000\n\
               1,TRANSFER,3000,3000,0,0,0";
    let (status, body) = send_json(&t.app, upload("file", csv)).await;

    assert_eq!(status, StatusCode::OK);
    let stats = &body["stats"];
    assert_eq!(stats["total_scanned"], 3);
    let rf = stats["rf_flags"].as_u64().unwrap();
    let xgb = stats["xgb_flags"].as_u64().unwrap();
    assert!(stats["both_agreed"].as_u64().unwrap() <= rf.min(xgb));

    let rows = body["top_risky_transactions"].as_array().unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["amount"], 200000);
    assert_eq!(rows[0]["type"], "TRANSFER");
    assert_eq!(rows[0]["XGB_Prediction"], 1);
    for pair in rows.windows(2) {
        assert!(pair[0]["XGB_Risk_Score"].as_f64() >= pair[1]["XGB_Risk_Score"].as_f64());
    }
}

#[tokio::test]
async fn upload_with_missing_columns_is_bad_request() {
    let t = test_app(Canned(Some("x")));
    let (status, body) = send_json(&t.app, upload("file", "amount,oldbalanceOrg\n1,2")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"]
        .as_str()
        .unwrap()
        .starts_with("CSV must contain columns"));
}

#[tokio::test]
async fn upload_with_garbage_rows_is_bad_request() {
    let t = test_app(Canned(Some("x")));
    let csv = "amount,oldbalanceOrg,newbalanceOrig,oldbalanceDest,newbalanceDest\n1,2\n";
    let (status, body) = send_json(&t.app, upload("file", csv)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Invalid CSV file");
}

#[tokio::test]
async fn upload_without_file_field_is_bad_request() {
    let t = test_app(Canned(Some("x")));
    let (status, body) = send_json(&t.app, upload("document", "a,b\n1,2")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Missing multipart field: file");
}

#[tokio::test]
async fn save_report_records_history_and_returns_pdf() {
    let t = test_app(Canned(Some("x")));
    let resp = t
        .app
        .clone()
        .oneshot(post_json("/save-report", report_body("march.csv")))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/pdf");
    let disposition = resp.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.starts_with("attachment; filename=\"FraudSentry_Report_"));

    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    assert!(bytes.starts_with(b"%PDF"));

    let saved: Vec<_> = std::fs::read_dir(t.dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|name| name.ends_with(".pdf"))
        .collect();
    assert_eq!(saved.len(), 1);
    assert!(disposition.contains(&saved[0]));

    let (_, history) = send_json(&t.app, get("/history")).await;
    let history = history.as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["filename"], "march.csv");
    assert_eq!(history[0]["total_scanned"], 4);
    assert_eq!(history[0]["fraud_found_xgb"], 1);
    assert_eq!(history[0]["fraud_found_rf"], 2);
}

#[tokio::test]
async fn save_report_accepts_legacy_top_frauds() {
    let t = test_app(Canned(Some("x")));
    let body = json!({
        "filename": "legacy.csv",
        "total": 10,
        "xgb_fraud": 2,
        "rf_fraud": 3,
        "top_frauds": [{ "amount": 9000.0, "XGB_Risk_Score": 0.7 }]
    });
    let (status, bytes) = send(&t.app, post_json("/save-report", body)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(bytes.starts_with(b"%PDF"));
}

#[tokio::test]
async fn history_is_newest_first() {
    let t = test_app(Canned(Some("x")));
    for name in ["first.csv", "second.csv"] {
        let (status, _) = send(&t.app, post_json("/save-report", report_body(name))).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send_json(&t.app, get("/history")).await;
    assert_eq!(status, StatusCode::OK);
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["filename"], "second.csv");
    assert_eq!(rows[1]["filename"], "first.csv");
    assert!(rows[0]["id"].as_i64() > rows[1]["id"].as_i64());
}

#[tokio::test]
async fn dashboard_on_empty_store_is_zero() {
    let t = test_app(Canned(Some("x")));
    let (status, body) = send_json(&t.app, get("/dashboard-stats")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_scans"], 0);
    assert_eq!(body["total_tx"], 0);
    assert_eq!(body["total_fraud"], 0);
    assert_eq!(body["trend_data"], json!([]));
}

#[tokio::test]
async fn dashboard_trend_holds_last_seven_oldest_first() {
    let t = test_app(Canned(Some("x")));
    let conn = db::connect(&t.db_path).unwrap();
    for i in 1..=9 {
        db::insert_history(
            &conn,
            &ScanSummary {
                scan_date: format!("2025-12-{:02} 10:00:00", i),
                filename: format!("scan{}.csv", i),
                total_scanned: 100,
                fraud_found_xgb: i,
                fraud_found_rf: i * 2,
            },
        )
        .unwrap();
    }

    let (status, body) = send_json(&t.app, get("/dashboard-stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_scans"], 9);
    assert_eq!(body["total_tx"], 900);
    assert_eq!(body["total_fraud"], 45);

    let trend = body["trend_data"].as_array().unwrap();
    assert_eq!(trend.len(), 7);
    assert_eq!(trend[0]["name"], "2025-12-03");
    assert_eq!(trend[0]["XGBoost"], 3);
    assert_eq!(trend[0]["RandomForest"], 6);
    assert_eq!(trend[6]["name"], "2025-12-09");
    assert_eq!(trend[6]["XGBoost"], 9);
}
