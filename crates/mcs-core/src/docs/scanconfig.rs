//! Scan configuration document, the payload of `ConfigureScan` (spec §6).

use crate::error::McsError;
use serde::{Deserialize, Serialize};

const VALID_INTEGRATION_FACTORS: [u32; 7] = [1, 2, 3, 4, 6, 8, 10];
const MAP_ENTRY_COUNT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FunctionMode {
    #[serde(rename = "CORR")]
    Corr,
    #[serde(rename = "PSS-BF")]
    PssBf,
    #[serde(rename = "PST-BF")]
    PstBf,
    #[serde(rename = "VLBI")]
    Vlbi,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchWindow {
    pub search_window_id: u32,
    pub search_window_tuning: u64,
}

/// One `cbf.fsp[]` element.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FspConfig {
    pub fsp_id: u32,
    pub function_mode: FunctionMode,
    pub receptor_ids: Vec<String>,
    pub frequency_slice_id: u32,
    pub zoom_factor: u32,
    pub integration_factor: u32,
    /// Exactly 20 `(channel_id, averaging_factor)` pairs, first column
    /// monotonically increasing (spec §6).
    pub channel_averaging_map: Vec<(u32, u32)>,
    /// Exactly 20 `(channel_id, link_id)` pairs, same monotonicity rule.
    pub output_link_map: Vec<(u32, u32)>,
    pub output_host: String,
    pub output_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CbfBlock {
    #[serde(default)]
    pub frequency_band_offset_stream_1: i64,
    #[serde(default)]
    pub frequency_band_offset_stream_2: i64,
    pub delay_model_subscription_point: String,
    pub jones_matrix_subscription_point: String,
    pub doppler_phase_correction_subscription_point: String,
    pub timing_beam_weights_subscription_point: String,
    #[serde(default)]
    pub search_window: Vec<SearchWindow>,
    pub fsp: Vec<FspConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommonBlock {
    pub config_id: String,
    pub frequency_band: String,
    #[serde(default)]
    pub band_5_tuning: Vec<f64>,
    pub subarray_id: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfigDocument {
    pub interface: String,
    pub common: CommonBlock,
    pub cbf: CbfBlock,
    /// Opaque to the core (spec §6).
    #[serde(default)]
    pub pointing: serde_json::Value,
}

impl ScanConfigDocument {
    pub fn parse(raw: &str) -> Result<Self, McsError> {
        let doc: Self = serde_json::from_str(raw)
            .map_err(|e| McsError::InvalidArgument(format!("ConfigureScan JSON malformed: {e}")))?;
        doc.validate()?;
        Ok(doc)
    }

    fn validate(&self) -> Result<(), McsError> {
        for fsp in &self.cbf.fsp {
            if !VALID_INTEGRATION_FACTORS.contains(&fsp.integration_factor) {
                return Err(McsError::InvalidArgument(format!(
                    "fsp[{}].integration_factor = {} not in {:?}",
                    fsp.fsp_id, fsp.integration_factor, VALID_INTEGRATION_FACTORS
                )));
            }
            validate_map(fsp.fsp_id, "channel_averaging_map", &fsp.channel_averaging_map)?;
            validate_map(fsp.fsp_id, "output_link_map", &fsp.output_link_map)?;
        }
        Ok(())
    }
}

fn validate_map(fsp_id: u32, field: &'static str, map: &[(u32, u32)]) -> Result<(), McsError> {
    if map.len() != MAP_ENTRY_COUNT {
        return Err(McsError::InvalidArgument(format!(
            "fsp[{fsp_id}].{field} has {} entries, expected {MAP_ENTRY_COUNT}",
            map.len()
        )));
    }
    if !map.windows(2).all(|w| w[0].0 < w[1].0) {
        return Err(McsError::InvalidArgument(format!(
            "fsp[{fsp_id}].{field} first column is not strictly monotonic"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn averaging_map() -> String {
        (0..20)
            .map(|i| format!("[{}, 1]", i * 4))
            .collect::<Vec<_>>()
            .join(",")
    }

    fn sample_doc(integration_factor: u32) -> String {
        format!(
            r#"{{
                "interface": "https://schema.skao.int/ska-csp-configurescan/2.0",
                "common": {{
                    "config_id": "test-config",
                    "frequency_band": "1",
                    "subarray_id": 1
                }},
                "cbf": {{
                    "delay_model_subscription_point": "low/delaymodel/1",
                    "jones_matrix_subscription_point": "low/jones/1",
                    "doppler_phase_correction_subscription_point": "low/doppler/1",
                    "timing_beam_weights_subscription_point": "low/beamweights/1",
                    "search_window": [],
                    "fsp": [{{
                        "fsp_id": 1,
                        "function_mode": "CORR",
                        "receptor_ids": ["100"],
                        "frequency_slice_id": 1,
                        "zoom_factor": 0,
                        "integration_factor": {integration_factor},
                        "channel_averaging_map": [{map}],
                        "output_link_map": [{map}],
                        "output_host": "10.0.0.1",
                        "output_port": 9000
                    }}]
                }},
                "pointing": {{}}
            }}"#,
            integration_factor = integration_factor,
            map = averaging_map()
        )
    }

    #[test]
    fn parses_valid_document() {
        let doc = ScanConfigDocument::parse(&sample_doc(1)).unwrap();
        assert_eq!(doc.cbf.fsp.len(), 1);
        assert_eq!(doc.cbf.fsp[0].function_mode, FunctionMode::Corr);
    }

    #[test]
    fn rejects_bad_integration_factor() {
        assert!(ScanConfigDocument::parse(&sample_doc(5)).is_err());
    }

    #[test]
    fn rejects_wrong_map_length() {
        let mut raw = sample_doc(1);
        raw = raw.replacen(&format!("[{}]", averaging_map()), "[[0, 1]]", 1);
        assert!(ScanConfigDocument::parse(&raw).is_err());
    }

    #[test]
    fn zero_fsp_document_is_valid() {
        let raw = r#"{
            "interface": "x",
            "common": {"config_id": "c", "frequency_band": "1", "subarray_id": 1},
            "cbf": {
                "delay_model_subscription_point": "a",
                "jones_matrix_subscription_point": "b",
                "doppler_phase_correction_subscription_point": "c",
                "timing_beam_weights_subscription_point": "d",
                "fsp": []
            }
        }"#;
        let doc = ScanConfigDocument::parse(raw).unwrap();
        assert!(doc.cbf.fsp.is_empty());
    }
}
