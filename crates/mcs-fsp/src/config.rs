//! FSP binary configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub fqdn: String,
    pub fsp_id: u32,
    pub memo_path: String,
    pub simulation_mode: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fqdn: "mid_csp_cbf/fsp/01".to_string(),
            fsp_id: 1,
            memo_path: "./var/mcs-fsp-memo.json".to_string(),
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
    fsp_id: Option<u32>,
    memo_path: Option<String>,
    simulation_mode: Option<bool>,
}

impl ConfigBuilder {
    pub fn fqdn(mut self, fqdn: impl Into<String>) -> Self {
        self.fqdn = Some(fqdn.into());
        self
    }

    pub fn fsp_id(mut self, id: u32) -> Self {
        self.fsp_id = Some(id);
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
            fsp_id: self.fsp_id.unwrap_or(defaults.fsp_id),
            memo_path: self.memo_path.unwrap_or(defaults.memo_path),
            simulation_mode: self.simulation_mode.unwrap_or(defaults.simulation_mode),
        }
    }
}
