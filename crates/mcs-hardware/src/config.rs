//! TalonLRU / SlimLink binary configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub fqdn: String,
    pub outlet_a: u32,
    pub outlet_b: u32,
    pub board_target_ip: String,
    pub bitstream_path: String,
    pub device_server_list: Vec<String>,
    pub master_fqdn: String,
    pub memo_path: String,
    pub simulation_mode: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fqdn: "mid_csp_cbf/talon_lru/001".to_string(),
            outlet_a: 1,
            outlet_b: 2,
            board_target_ip: "10.0.0.1".to_string(),
            bitstream_path: "/lib/firmware/talon/default.bit".to_string(),
            device_server_list: vec!["ds-binderproxy".to_string()],
            master_fqdn: "mid_csp_cbf/sub_elt/controller".to_string(),
            memo_path: "./var/mcs-hardware-memo.json".to_string(),
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
    outlet_a: Option<u32>,
    outlet_b: Option<u32>,
    board_target_ip: Option<String>,
    bitstream_path: Option<String>,
    device_server_list: Option<Vec<String>>,
    master_fqdn: Option<String>,
    memo_path: Option<String>,
    simulation_mode: Option<bool>,
}

impl ConfigBuilder {
    pub fn fqdn(mut self, fqdn: impl Into<String>) -> Self {
        self.fqdn = Some(fqdn.into());
        self
    }

    pub fn outlets(mut self, a: u32, b: u32) -> Self {
        self.outlet_a = Some(a);
        self.outlet_b = Some(b);
        self
    }

    pub fn board_target_ip(mut self, ip: impl Into<String>) -> Self {
        self.board_target_ip = Some(ip.into());
        self
    }

    pub fn bitstream_path(mut self, path: impl Into<String>) -> Self {
        self.bitstream_path = Some(path.into());
        self
    }

    pub fn device_server_list(mut self, list: Vec<String>) -> Self {
        self.device_server_list = Some(list);
        self
    }

    pub fn master_fqdn(mut self, fqdn: impl Into<String>) -> Self {
        self.master_fqdn = Some(fqdn.into());
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
            outlet_a: self.outlet_a.unwrap_or(defaults.outlet_a),
            outlet_b: self.outlet_b.unwrap_or(defaults.outlet_b),
            board_target_ip: self.board_target_ip.unwrap_or(defaults.board_target_ip),
            bitstream_path: self.bitstream_path.unwrap_or(defaults.bitstream_path),
            device_server_list: self.device_server_list.unwrap_or(defaults.device_server_list),
            master_fqdn: self.master_fqdn.unwrap_or(defaults.master_fqdn),
            memo_path: self.memo_path.unwrap_or(defaults.memo_path),
            simulation_mode: self.simulation_mode.unwrap_or(defaults.simulation_mode),
        }
    }
}
