use anyhow::{Context, Result};
use fraudsentry::ensemble::TreeEnsemble;
use fraudsentry::evaluation::{labelled_rows, ConfusionMatrix};
use fraudsentry::scanner::parse_csv;
use std::env;

const DEFAULT_DATASET: &str = "dataset/datasetkaggle.csv";

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let data_file = env::args().nth(1).unwrap_or_else(|| DEFAULT_DATASET.to_string());
    let rf_path = env::var("RF_MODEL_PATH").unwrap_or_else(|_| "models/fraud_model.json".to_string());
    let xgb_path = env::var("XGB_MODEL_PATH")
        .unwrap_or_else(|_| "models/fraud_model_xgboost.json".to_string());

    println!("Loading data from {} (this might take a moment)...", data_file);
    let raw = std::fs::read(&data_file)
        .with_context(|| format!("could not read dataset {}", data_file))?;
    let rows = labelled_rows(parse_csv(&raw)?)?;
    println!("Loaded {} TRANSFER/CASH_OUT rows. Testing models now...", rows.len());

    let forest = TreeEnsemble::load(&rf_path)?;
    println!("\nRANDOM FOREST RESULTS:");
    println!("{}", ConfusionMatrix::evaluate(&forest, &rows));

    let boosted = TreeEnsemble::load(&xgb_path)?;
    println!("\nXGBOOST RESULTS:");
    println!("{}", ConfusionMatrix::evaluate(&boosted, &rows));

    Ok(())
}
