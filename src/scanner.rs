//! Batch scoring of uploaded CSV tables with both classifiers.

use crate::ensemble::TreeEnsemble;
use crate::models::{BatchResponse, BatchStats, FeatureVector, ScoredRow, FEATURE_COUNT, FEATURE_NAMES};
use serde_json::{Number, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Rows returned from a scan, riskiest first.
pub const TOP_N: usize = 100;

const OUTPUT_COLUMNS: [&str; 4] = ["RF_Prediction", "RF_Risk_Score", "XGB_Prediction", "XGB_Risk_Score"];

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Invalid CSV file")]
    InvalidCsv(#[from] csv::Error),

    #[error("CSV must contain columns: {0:?}")]
    MissingColumns(Vec<&'static str>),

    #[error("Invalid CSV file: row {row}, column {column} is not a number")]
    NotNumeric { row: usize, column: &'static str },
}

/// One parsed input row: the model features plus every original cell
#[derive(Debug, Clone)]
pub struct InputRow {
    pub features: FeatureVector,
    pub columns: BTreeMap<String, Value>,
}

/// Parse an uploaded table; nothing is scored unless every row parses.
pub fn parse_csv(data: &[u8]) -> Result<Vec<InputRow>, ScanError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(data);

    let headers = reader.headers()?.clone();
    let mut feature_idx = [0usize; FEATURE_COUNT];
    let mut missing = Vec::new();
    for (slot, name) in feature_idx.iter_mut().zip(FEATURE_NAMES) {
        match headers.iter().position(|h| h == name) {
            Some(i) => *slot = i,
            None => missing.push(name),
        }
    }
    if !missing.is_empty() {
        return Err(ScanError::MissingColumns(FEATURE_NAMES.to_vec()));
    }

    let mut rows = Vec::new();
    for (row_no, record) in reader.records().enumerate() {
        let record = record?;

        let mut features = [0.0; FEATURE_COUNT];
        for (k, idx) in feature_idx.iter().enumerate() {
            features[k] = record
                .get(*idx)
                .and_then(|s| s.parse::<f64>().ok())
                .filter(|v| v.is_finite())
                .ok_or(ScanError::NotNumeric {
                    row: row_no + 1,
                    column: FEATURE_NAMES[k],
                })?;
        }

        let columns = headers
            .iter()
            .zip(record.iter())
            .filter(|(h, _)| !OUTPUT_COLUMNS.contains(h))
            .map(|(h, cell)| (h.to_string(), cell_value(cell)))
            .collect();

        rows.push(InputRow { features, columns });
    }

    Ok(rows)
}

fn cell_value(cell: &str) -> Value {
    if let Ok(i) = cell.parse::<i64>() {
        return Value::from(i);
    }
    cell.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(cell.to_string()))
}

/// Score every row with both models, count agreement and keep the riskiest rows.
pub fn scan(rows: Vec<InputRow>, forest: &TreeEnsemble, boosted: &TreeEnsemble) -> BatchResponse {
    let mut stats = BatchStats {
        total_scanned: rows.len(),
        ..BatchStats::default()
    };

    let mut scored: Vec<ScoredRow> = rows
        .into_iter()
        .map(|row| {
            let (rf_prediction, rf_risk_score) = forest.classify(&row.features);
            let (xgb_prediction, xgb_risk_score) = boosted.classify(&row.features);

            stats.rf_flags += usize::from(rf_prediction);
            stats.xgb_flags += usize::from(xgb_prediction);
            if rf_prediction == 1 && xgb_prediction == 1 {
                stats.both_agreed += 1;
            }

            ScoredRow {
                columns: row.columns,
                rf_prediction,
                rf_risk_score,
                xgb_prediction,
                xgb_risk_score,
            }
        })
        .collect();

    // Stable: equal scores keep upload order
    scored.sort_by(|a, b| b.xgb_risk_score.total_cmp(&a.xgb_risk_score));
    scored.truncate(TOP_N);

    BatchResponse {
        stats,
        top_risky_transactions: scored,
    }
}
