//! Controller binary configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub fqdn: String,
    pub lru_fqdns: Vec<String>,
    pub subarray_fqdns: Vec<String>,
    pub memo_path: String,
    pub simulation_mode: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fqdn: "mid_csp_cbf/sub_elt/controller".to_string(),
            lru_fqdns: Vec::new(),
            subarray_fqdns: Vec::new(),
            memo_path: "./var/mcs-controller-memo.json".to_string(),
            simulation_mode: true,
        }
    }
}

impl Config {
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    fqdn: Option<String>,
    lru_fqdns: Option<Vec<String>>,
    subarray_fqdns: Option<Vec<String>>,
    memo_path: Option<String>,
    simulation_mode: Option<bool>,
}

impl ConfigBuilder {
    pub fn fqdn(mut self, fqdn: impl Into<String>) -> Self {
        self.fqdn = Some(fqdn.into());
        self
    }

    pub fn lru_fqdns(mut self, fqdns: Vec<String>) -> Self {
        self.lru_fqdns = Some(fqdns);
        self
    }

    pub fn subarray_fqdns(mut self, fqdns: Vec<String>) -> Self {
        self.subarray_fqdns = Some(fqdns);
        self
    }

    pub fn memo_path(mut self, path: impl Into<String>) -> Self {
        self.memo_path = Some(path.into());
        self
    }

    pub fn simulation_mode(mut self, enabled: bool) -> Self {
        self.simulation_mode = Some(enabled);
        self
    }

    pub fn build(self) -> Config {
        let defaults = Config::default();
        Config {
            fqdn: self.fqdn.unwrap_or(defaults.fqdn),
            lru_fqdns: self.lru_fqdns.unwrap_or(defaults.lru_fqdns),
            subarray_fqdns: self.subarray_fqdns.unwrap_or(defaults.subarray_fqdns),
            memo_path: self.memo_path.unwrap_or(defaults.memo_path),
            simulation_mode: self.simulation_mode.unwrap_or(defaults.simulation_mode),
        }
    }
}
