// src/models.rs
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Column names of the five model inputs, in model order.
pub const FEATURE_NAMES: [&str; 5] = [
    "amount",
    "oldbalanceOrg",
    "newbalanceOrig",
    "oldbalanceDest",
    "newbalanceDest",
];

pub const FEATURE_COUNT: usize = FEATURE_NAMES.len();

pub type FeatureVector = [f64; FEATURE_COUNT];

/// A single transaction submitted for scoring
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub amount: f64,
    #[serde(rename = "oldbalanceOrg")]
    pub old_balance_orig: f64,
    #[serde(rename = "newbalanceOrig")]
    pub new_balance_orig: f64,
    #[serde(rename = "oldbalanceDest")]
    pub old_balance_dest: f64,
    #[serde(rename = "newbalanceDest")]
    pub new_balance_dest: f64,
}

impl Transaction {
    pub fn features(&self) -> FeatureVector {
        [
            self.amount,
            self.old_balance_orig,
            self.new_balance_orig,
            self.old_balance_dest,
            self.new_balance_dest,
        ]
    }
}

/// Which classifier answers a `/predict` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelChoice {
    RandomForest,
    Boosted,
}

impl ModelChoice {
    /// `XGB` (any case) selects the boosted model; anything else falls back to the forest.
    pub fn from_query(raw: Option<&str>) -> Self {
        match raw {
            Some(s) if s.trim().eq_ignore_ascii_case("XGB") => ModelChoice::Boosted,
            _ => ModelChoice::RandomForest,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ModelChoice::RandomForest => "RF",
            ModelChoice::Boosted => "XGB",
        }
    }
}

/// One entry of the attribution ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImpact {
    pub feature: String,
    pub impact: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub is_fraud: u8,
    pub risk_score: f64,
    pub model_used: String,
    pub message: String,
    pub explanation: Vec<FeatureImpact>,
    pub ai_analysis: String,
}

/// Aggregate counts for one batch upload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub total_scanned: usize,
    pub rf_flags: usize,
    pub xgb_flags: usize,
    pub both_agreed: usize,
}

/// An uploaded row echoed back with both models' verdicts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredRow {
    #[serde(flatten)]
    pub columns: BTreeMap<String, Value>,
    #[serde(rename = "RF_Prediction")]
    pub rf_prediction: u8,
    #[serde(rename = "RF_Risk_Score")]
    pub rf_risk_score: f64,
    #[serde(rename = "XGB_Prediction")]
    pub xgb_prediction: u8,
    #[serde(rename = "XGB_Risk_Score")]
    pub xgb_risk_score: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchResponse {
    pub stats: BatchStats,
    pub top_risky_transactions: Vec<ScoredRow>,
}

/// Append-only scan summary row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: i64,
    pub scan_date: String,
    pub filename: String,
    pub total_scanned: i64,
    pub fraud_found_xgb: i64,
    pub fraud_found_rf: i64,
}

/// Fields needed to append a history row
#[derive(Debug, Clone)]
pub struct ScanSummary {
    pub scan_date: String,
    pub filename: String,
    pub total_scanned: i64,
    pub fraud_found_xgb: i64,
    pub fraud_found_rf: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub name: String,
    #[serde(rename = "XGBoost")]
    pub xgboost: i64,
    #[serde(rename = "RandomForest")]
    pub random_forest: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_scans: i64,
    pub total_tx: i64,
    pub total_fraud: i64,
    pub trend_data: Vec<TrendPoint>,
}

/// A row inside a report request; every field is optional on the wire
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportRow {
    pub amount: f64,
    #[serde(rename = "oldbalanceOrg")]
    pub old_balance_orig: f64,
    #[serde(rename = "newbalanceOrig")]
    pub new_balance_orig: f64,
    #[serde(rename = "oldbalanceDest")]
    pub old_balance_dest: f64,
    #[serde(rename = "newbalanceDest")]
    pub new_balance_dest: f64,
    #[serde(rename = "XGB_Risk_Score")]
    pub xgb_risk_score: f64,
    #[serde(rename = "RF_Prediction")]
    pub rf_prediction: u8,
    #[serde(rename = "XGB_Prediction")]
    pub xgb_prediction: u8,
}

/// Body of `/save-report`. Older clients send a single `top_frauds` list.
#[derive(Debug, Clone, Deserialize)]
pub struct ReportRequest {
    pub filename: String,
    pub total: i64,
    pub xgb_fraud: i64,
    pub rf_fraud: i64,
    #[serde(default)]
    pub confirmed_frauds: Vec<ReportRow>,
    #[serde(default)]
    pub false_alarms: Vec<ReportRow>,
    #[serde(default)]
    pub top_frauds: Option<Vec<ReportRow>>,
}

impl ReportRequest {
    /// Rows for the confirmed-fraud table, falling back to `top_frauds`.
    pub fn confirmed(&self) -> &[ReportRow] {
        match &self.top_frauds {
            Some(top) if self.confirmed_frauds.is_empty() => top,
            _ => &self.confirmed_frauds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn transaction_uses_original_column_names() {
        let tx: Transaction = serde_json::from_value(json!({
            "amount": 10.0,
            "oldbalanceOrg": 20.0,
            "newbalanceOrig": 10.0,
            "oldbalanceDest": 0.0,
            "newbalanceDest": 10.0
        }))
        .unwrap();
        assert_eq!(tx.features(), [10.0, 20.0, 10.0, 0.0, 10.0]);
    }

    #[test]
    fn model_choice_defaults_to_forest() {
        assert_eq!(ModelChoice::from_query(None), ModelChoice::RandomForest);
        assert_eq!(ModelChoice::from_query(Some("RF")), ModelChoice::RandomForest);
        assert_eq!(ModelChoice::from_query(Some("lgbm")), ModelChoice::RandomForest);
        assert_eq!(ModelChoice::from_query(Some("xgb")), ModelChoice::Boosted);
        assert_eq!(ModelChoice::Boosted.label(), "XGB");
    }

    #[test]
    fn report_request_accepts_single_list_schema() {
        let req: ReportRequest = serde_json::from_value(json!({
            "filename": "scan.csv",
            "total": 3,
            "xgb_fraud": 1,
            "rf_fraud": 1,
            "top_frauds": [{"amount": 500.0, "RF_Prediction": 1}]
        }))
        .unwrap();
        assert_eq!(req.confirmed().len(), 1);
        assert_eq!(req.confirmed()[0].rf_prediction, 1);
        assert!(req.false_alarms.is_empty());
    }

    #[test]
    fn report_request_prefers_confirmed_list() {
        let req: ReportRequest = serde_json::from_value(json!({
            "filename": "scan.csv",
            "total": 3,
            "xgb_fraud": 1,
            "rf_fraud": 1,
            "confirmed_frauds": [{"amount": 1.0}, {"amount": 2.0}],
            "top_frauds": [{"amount": 3.0}]
        }))
        .unwrap();
        assert_eq!(req.confirmed().len(), 2);
    }
}
