//! Offline model checks against a labelled dataset.

use crate::ensemble::TreeEnsemble;
use crate::models::FeatureVector;
use crate::scanner::InputRow;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Transaction types the models were trained on.
pub const TRAINED_TYPES: [&str; 2] = ["TRANSFER", "CASH_OUT"];

pub const LABEL_COLUMN: &str = "isFraud";

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("row {row}: missing or invalid isFraud label")]
    MissingLabel { row: usize },
}

/// Keep rows of trained transaction types and pair them with their label.
/// Rows without a `type` column are all kept.
pub fn labelled_rows(rows: Vec<InputRow>) -> Result<Vec<(FeatureVector, u8)>, EvalError> {
    let mut out = Vec::with_capacity(rows.len());
    for (i, row) in rows.into_iter().enumerate() {
        if let Some(Value::String(kind)) = row.columns.get("type") {
            if !TRAINED_TYPES.contains(&kind.as_str()) {
                continue;
            }
        }
        let label = match row.columns.get(LABEL_COLUMN).and_then(Value::as_i64) {
            Some(0) => 0,
            Some(1) => 1,
            _ => return Err(EvalError::MissingLabel { row: i + 1 }),
        };
        out.push((row.features, label));
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfusionMatrix {
    pub true_negative: usize,
    pub false_positive: usize,
    pub false_negative: usize,
    pub true_positive: usize,
}

impl ConfusionMatrix {
    pub fn evaluate(model: &TreeEnsemble, rows: &[(FeatureVector, u8)]) -> Self {
        let mut cm = ConfusionMatrix::default();
        for (features, actual) in rows {
            let (predicted, _) = model.classify(features);
            match (*actual, predicted) {
                (0, 0) => cm.true_negative += 1,
                (0, _) => cm.false_positive += 1,
                (_, 0) => cm.false_negative += 1,
                _ => cm.true_positive += 1,
            }
        }
        cm
    }

    pub fn total(&self) -> usize {
        self.true_negative + self.false_positive + self.false_negative + self.true_positive
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positive + self.true_negative, self.total())
    }

    pub fn precision(&self) -> f64 {
        ratio(self.true_positive, self.true_positive + self.false_positive)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.true_positive, self.true_positive + self.false_negative)
    }
}

// Undefined ratios report as 0, matching the usual zero_division default.
fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Accuracy:  {:.2}%", self.accuracy() * 100.0)?;
        writeln!(f, "Precision: {:.2}%", self.precision() * 100.0)?;
        writeln!(f, "Recall:    {:.2}%", self.recall() * 100.0)?;
        writeln!(f, "Legit Transactions Correctly Passed: {}", self.true_negative)?;
        writeln!(f, "Legit Transactions Falsely Blocked:  {}", self.false_positive)?;
        writeln!(f, "Fraud Transactions Missed (DANGER):  {}", self.false_negative)?;
        write!(f, "Fraud Transactions Caught (SUCCESS): {}", self.true_positive)
    }
}
