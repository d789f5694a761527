use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use record_store::StoreConfig;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct SampleConfig {
    #[serde(default)]
    pub store: StoreConfig,
    pub fixtures: HashMap<String, Vec<Value>>,
}

pub fn load_config() -> Result<SampleConfig, String> {
    let mut path = std::env::current_dir().map_err(|e| e.to_string())?;
    path.push("fixtures.json");
    read_config(&path)
}

fn read_config(path: &PathBuf) -> Result<SampleConfig, String> {
    let contents = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read fixtures.json: {e}"))?;
    serde_json::from_str(&contents).map_err(|e| format!("Invalid fixtures.json: {e}"))
}
