use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// One dataset type to discover and convert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetTypeConfig {
    pub name: String,
    /// Path template relative to the repository root, with `{name:int}` /
    /// `{name:str}` capture fields.
    pub template: String,
    /// Destination dimensions the translated data id must cover.
    pub dimensions: Vec<String>,
    /// Legacy side-database table holding validity rows; calibration types
    /// without a table are processed with zero rows.
    #[serde(default)]
    pub table: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    pub instrument: String,
    pub collection: String,
    /// Legacy key used for the detector dimension in templates and in the
    /// side-database schema.
    #[serde(default = "default_ccd_key")]
    pub ccd_key: String,
    /// Legacy key to destination dimension renames applied by the default
    /// translator.
    #[serde(default = "default_key_map")]
    pub key_map: BTreeMap<String, String>,
    #[serde(rename = "dataset_type")]
    pub dataset_types: Vec<DatasetTypeConfig>,
}

fn default_ccd_key() -> String {
    "ccd".to_string()
}

fn default_key_map() -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    map.insert("ccd".to_string(), "detector".to_string());
    map.insert("filter".to_string(), "physical_filter".to_string());
    map
}

fn validate(cfg: &ScanConfig) -> Result<()> {
    if cfg.instrument.trim().is_empty() {
        return Err(anyhow!("invalid scan config: instrument cannot be empty"));
    }
    if cfg.collection.trim().is_empty() {
        return Err(anyhow!("invalid scan config: collection cannot be empty"));
    }
    if cfg.dataset_types.is_empty() {
        return Err(anyhow!(
            "invalid scan config: at least one [[dataset_type]] is required"
        ));
    }
    let mut seen = BTreeMap::new();
    for dt in &cfg.dataset_types {
        if dt.name.trim().is_empty() {
            return Err(anyhow!("invalid scan config: dataset type without a name"));
        }
        if dt.dimensions.is_empty() {
            return Err(anyhow!(
                "invalid scan config: dataset type {} has no dimensions",
                dt.name
            ));
        }
        if seen.insert(dt.name.clone(), ()).is_some() {
            return Err(anyhow!(
                "invalid scan config: duplicate dataset type {}",
                dt.name
            ));
        }
    }
    Ok(())
}

pub fn resolve_config_path(cli_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }
    if let Ok(custom) = env::var("STARMIG_CONFIG_PATH") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }
    None
}

pub fn load_config(path: &Path) -> Result<ScanConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let cfg: ScanConfig = toml::from_str(&raw)
        .map_err(|err| anyhow!("failed to parse scan config {}: {err}", path.display()))?;
    validate(&cfg)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
instrument = "TestCam"
collection = "calib/legacy"

[[dataset_type]]
name = "flat"
template = "flat/{calibDate:str}/{filter:str}/flat-{ccd:int}.fits"
dimensions = ["instrument", "detector", "physical_filter"]
table = "flat"

[[dataset_type]]
name = "bias"
template = "bias/{calibDate:str}/bias-{ccd:int}.fits"
dimensions = ["instrument", "detector"]
table = "bias"
"#;

    #[test]
    fn sample_config_parses_with_defaults() {
        let cfg: ScanConfig = toml::from_str(SAMPLE).expect("parse");
        validate(&cfg).expect("validate");
        assert_eq!(cfg.ccd_key, "ccd");
        assert_eq!(cfg.key_map["filter"], "physical_filter");
        assert_eq!(cfg.dataset_types.len(), 2);
    }

    #[test]
    fn duplicate_dataset_types_are_rejected() {
        let mut cfg: ScanConfig = toml::from_str(SAMPLE).expect("parse");
        let dup = cfg.dataset_types[0].clone();
        cfg.dataset_types.push(dup);
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn empty_collection_is_rejected() {
        let mut cfg: ScanConfig = toml::from_str(SAMPLE).expect("parse");
        cfg.collection = " ".to_string();
        assert!(validate(&cfg).is_err());
    }
}
