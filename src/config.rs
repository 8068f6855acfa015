use dotenvy::dotenv;
use eyre::{eyre, Result};
use serde::Deserialize;
use std::{env, fmt, path::PathBuf};
use tracing::info;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Clone, Deserialize)]
pub struct Config {
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub db_path: String,
    pub host: String,
    pub port: u16,
    pub rf_model_path: PathBuf,
    pub xgb_model_path: PathBuf,
    pub report_dir: PathBuf,
    pub cors_origin: String,
    pub max_upload_bytes: usize,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("gemini_api_key", &"<redacted>")
            .field("gemini_model", &self.gemini_model)
            .field("gemini_base_url", &self.gemini_base_url)
            .field("db_path", &self.db_path)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("rf_model_path", &self.rf_model_path)
            .field("xgb_model_path", &self.xgb_model_path)
            .field("report_dir", &self.report_dir)
            .field("cors_origin", &self.cors_origin)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .finish()
    }
}

impl Config {
    /// Build a config from any key lookup; `load` feeds it the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Required: the narrative service key
        let gemini_api_key = lookup("GEMINI_API_KEY")
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| eyre!("No API key found. Set GEMINI_API_KEY in the environment or .env file."))?;

        let gemini_model =
            lookup("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string());
        let gemini_base_url =
            lookup("GEMINI_BASE_URL").unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string());

        // SQLite history file (default: fraud_history.db)
        let db_path = lookup("DATABASE_PATH")
            .or_else(|| lookup("DATABASE_URL"))
            .unwrap_or_else(|| "fraud_history.db".to_string());

        let host = lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = lookup("PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(8000);

        let rf_model_path = lookup("RF_MODEL_PATH")
            .unwrap_or_else(|| "models/fraud_model.json".to_string())
            .into();
        let xgb_model_path = lookup("XGB_MODEL_PATH")
            .unwrap_or_else(|| "models/fraud_model_xgboost.json".to_string())
            .into();
        let report_dir = lookup("REPORT_DIR").unwrap_or_else(|| ".".to_string()).into();

        let cors_origin =
            lookup("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:5173".to_string());
        let max_upload_bytes = lookup("MAX_UPLOAD_BYTES")
            .and_then(|v| v.parse().ok())
            .unwrap_or(50 * 1024 * 1024);

        Ok(Config {
            gemini_api_key,
            gemini_model,
            gemini_base_url,
            db_path,
            host,
            port,
            rf_model_path,
            xgb_model_path,
            report_dir,
            cors_origin,
            max_upload_bytes,
        })
    }
}

pub fn load() -> Result<Config> {
    dotenv().ok();

    let cfg = Config::from_lookup(|key| env::var(key).ok())?;
    info!("Loaded config: {:?}", cfg);

    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_api_key_is_fatal() {
        let err = Config::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_KEY"));

        assert!(Config::from_lookup(lookup_from(&[("GEMINI_API_KEY", "  ")])).is_err());
    }

    #[test]
    fn defaults_apply() {
        let cfg = Config::from_lookup(lookup_from(&[("GEMINI_API_KEY", "k")])).unwrap();
        assert_eq!(cfg.gemini_model, DEFAULT_GEMINI_MODEL);
        assert_eq!(cfg.db_path, "fraud_history.db");
        assert_eq!(cfg.port, 8000);
        assert_eq!(cfg.rf_model_path, PathBuf::from("models/fraud_model.json"));
        assert_eq!(cfg.cors_origin, "http://localhost:5173");
    }

    #[test]
    fn overrides_and_bad_numbers() {
        let cfg = Config::from_lookup(lookup_from(&[
            ("GEMINI_API_KEY", "k"),
            ("DATABASE_URL", "alt.db"),
            ("PORT", "not-a-port"),
            ("MAX_UPLOAD_BYTES", "1024"),
        ]))
        .unwrap();
        assert_eq!(cfg.db_path, "alt.db");
        assert_eq!(cfg.port, 8000);
        assert_eq!(cfg.max_upload_bytes, 1024);
    }

    #[test]
    fn debug_output_hides_key() {
        let cfg = Config::from_lookup(lookup_from(&[("GEMINI_API_KEY", "super-secret")])).unwrap();
        let shown = format!("{:?}", cfg);
        assert!(!shown.contains("super-secret"));
        assert!(shown.contains("<redacted>"));
    }
}
