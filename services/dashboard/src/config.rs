//! Dashboard configuration: environment plus a JSON config file

use std::path::{Path, PathBuf};
use std::time::Duration;

use analytics::{PolarityTable, RatioConfig};
use anyhow::{Context, Result};
use parser::SheetConfig;
use serde::Deserialize;
use tokio::fs;
use tracing::warn;

const DEFAULT_CONFIG_PATH: &str = "config/dashboard.json";
const DEFAULT_CACHE_TTL_SECS: u64 = 300;

#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub config_path: PathBuf,
    pub cache_ttl: Duration,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        Self {
            config_path: PathBuf::from(
                std::env::var("DASHBOARD_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string()),
            ),
            cache_ttl: Duration::from_secs(
                std::env::var("CACHE_TTL_SECS")
                    .unwrap_or_else(|_| DEFAULT_CACHE_TTL_SECS.to_string())
                    .parse()
                    .unwrap_or(DEFAULT_CACHE_TTL_SECS),
            ),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub version: String,
    pub sheet: SheetConfig,
    /// Metric name -> polarity
    pub metrics: PolarityTable,
    pub ratios: Vec<RatioConfig>,
}

impl DashboardConfig {
    /// Sheet config with every metric named by polarities and ratios
    pub fn sheet_config(&self) -> SheetConfig {
        let ratio_metrics = self
            .ratios
            .iter()
            .flat_map(|r| std::iter::once(&r.numerator).chain(r.denominator.iter()))
            .cloned();
        self.sheet
            .clone()
            .with_metrics(self.metrics.metrics().map(str::to_string))
            .with_metrics(ratio_metrics)
    }
}

/// Load the JSON config. A missing file is an error only when `required`.
pub async fn load_config(path: &Path, required: bool) -> Result<DashboardConfig> {
    if !required && !fs::try_exists(path).await.unwrap_or(false) {
        warn!(path = %path.display(), "config file not found, using defaults");
        return Ok(DashboardConfig::default());
    }

    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let config: DashboardConfig =
        serde_json::from_str(&content).context("Failed to parse dashboard config")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use analytics::Polarity;

    const JSON: &str = r#"{
        "version": "1",
        "sheet": { "identity_columns": ["Branch Name"], "placeholders": ["-", "None", "", "N/A"] },
        "metrics": { "Balance": "higher_is_better", "Pending": "lower_is_better" },
        "ratios": [
            { "name": "Collection Efficiency", "numerator": "Collection", "denominator": ["Invoice"] }
        ]
    }"#;

    #[test]
    fn test_parse_config() {
        let config: DashboardConfig = serde_json::from_str(JSON).unwrap();
        assert_eq!(config.version, "1");
        assert_eq!(config.metrics.get("pending"), Some(Polarity::LowerIsBetter));
        assert_eq!(config.ratios[0].denominator, vec!["Invoice".to_string()]);
        assert_eq!(config.sheet.placeholders.len(), 4);
        assert_eq!(config.sheet.label_separator, "_");
    }

    #[test]
    fn test_sheet_config_knows_all_metrics() {
        let config: DashboardConfig = serde_json::from_str(JSON).unwrap();
        let sheet = config.sheet_config();
        for name in ["Balance", "Pending", "Collection", "Invoice"] {
            assert_eq!(sheet.metric_name(name), Some(name));
        }
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: DashboardConfig = serde_json::from_str("{}").unwrap();
        assert!(config.metrics.is_empty());
        assert_eq!(config.sheet, SheetConfig::default());
    }

    #[tokio::test]
    async fn test_missing_optional_config_is_default() {
        let config = load_config(Path::new("does/not/exist.json"), false).await.unwrap();
        assert!(config.ratios.is_empty());
        assert!(load_config(Path::new("does/not/exist.json"), true).await.is_err());
    }
}
