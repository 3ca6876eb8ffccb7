//! System-parameter document, the payload of `InitSysParam` (spec §6).

use crate::error::McsError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-dish entry: channelizer (VCC) id and the `k` sample-rate scaling
/// factor, `k ∈ [1, 2222]` per spec §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DishParameter {
    pub vcc: u32,
    pub k: u32,
}

/// The whole `InitSysParam` document: receptor-id ⇄ channelizer-id
/// mapping plus per-dish integer parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SysParamDocument {
    pub interface: String,
    pub dish_parameters: HashMap<String, DishParameter>,
}

impl SysParamDocument {
    pub fn parse(raw: &str) -> Result<Self, McsError> {
        let doc: Self = serde_json::from_str(raw)
            .map_err(|e| McsError::InvalidArgument(format!("sysParam JSON malformed: {e}")))?;
        doc.validate()?;
        Ok(doc)
    }

    /// Semantic checks only; JSON-schema-level structural validation
    /// is delegated to an external validator per spec §1 — this
    /// enforces the one numeric-range rule the core itself owns.
    fn validate(&self) -> Result<(), McsError> {
        for (receptor, params) in &self.dish_parameters {
            if !(1..=2222).contains(&params.k) {
                return Err(McsError::InvalidArgument(format!(
                    "dish_parameters[{receptor}].k = {} out of range [1, 2222]",
                    params.k
                )));
            }
        }
        Ok(())
    }

    pub fn vcc_for_receptor(&self, receptor_id: &str) -> Option<u32> {
        self.dish_parameters.get(receptor_id).map(|p| p.vcc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_doc() -> String {
        r#"{
            "interface": "https://schema.skao.int/ska-mid-cbf-initsysparam/2.0",
            "dish_parameters": {
                "100": {"vcc": 1, "k": 11},
                "101": {"vcc": 2, "k": 12}
            }
        }"#
        .to_string()
    }

    #[test]
    fn parses_valid_document() {
        let doc = SysParamDocument::parse(&sample_doc()).unwrap();
        assert_eq!(doc.vcc_for_receptor("100"), Some(1));
        assert_eq!(doc.vcc_for_receptor("999"), None);
    }

    #[test]
    fn rejects_k_out_of_range() {
        let raw = r#"{
            "interface": "x",
            "dish_parameters": {"100": {"vcc": 1, "k": 9999}}
        }"#;
        assert!(matches!(
            SysParamDocument::parse(raw),
            Err(McsError::InvalidArgument(_))
        ));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(SysParamDocument::parse("not json").is_err());
    }
}
