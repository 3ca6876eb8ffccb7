//! Frequency Slice Processor and its function-mode sub-node (spec §4.5).
//!
//! An FSP may be shared by several subarrays at once (invariant 3) but
//! all of them must agree on its function mode; the mode is set by
//! whichever subarray configures the FSP first and held until every
//! using subarray has released it. Per-subarray scan parameters live
//! on a [`FspModeNode`], one per `(fsp, subarray)` pair, dispatched by
//! the parent the way spec §9's design notes describe ("capability-set
//! polymorphism... dispatched by the FSP parent" rather than a class
//! hierarchy per function mode).

use crate::docs::{FspConfig, FunctionMode};
use crate::error::{McsError, McsResult};
use crate::fqdn::Fqdn;
use crate::health::HealthState;
use crate::lrc::{CommandId, Executor, LrcResultCode};
use crate::state::{AdminMode, ObsState, StateModel};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// Per-function-mode scan parameters, a tagged sum rather than a
/// trait-object hierarchy (spec §9).
#[derive(Debug, Clone)]
pub enum FspModeParams {
    Corr {
        frequency_slice_id: u32,
        zoom_factor: u32,
        integration_factor: u32,
        channel_averaging_map: Vec<(u32, u32)>,
        output_link_map: Vec<(u32, u32)>,
        output_host: String,
        output_port: u16,
    },
    PssBf {
        search_window_id: u32,
    },
    PstBf {
        timing_beam_weights_subscription_point: String,
    },
    Vlbi {
        frequency_slice_id: u32,
    },
}

impl FspModeParams {
    pub fn from_config(cfg: &FspConfig) -> Self {
        match cfg.function_mode {
            FunctionMode::Corr => FspModeParams::Corr {
                frequency_slice_id: cfg.frequency_slice_id,
                zoom_factor: cfg.zoom_factor,
                integration_factor: cfg.integration_factor,
                channel_averaging_map: cfg.channel_averaging_map.clone(),
                output_link_map: cfg.output_link_map.clone(),
                output_host: cfg.output_host.clone(),
                output_port: cfg.output_port,
            },
            FunctionMode::PssBf => FspModeParams::PssBf { search_window_id: 0 },
            FunctionMode::PstBf => FspModeParams::PstBf {
                timing_beam_weights_subscription_point: String::new(),
            },
            FunctionMode::Vlbi => FspModeParams::Vlbi {
                frequency_slice_id: cfg.frequency_slice_id,
            },
        }
    }
}

/// One subarray's view of an FSP: its own observation state and scan
/// parameters, independent of any other subarray sharing the parent.
pub struct FspModeNode {
    pub fqdn: Fqdn,
    pub subarray_id: u16,
    pub obs: StateModel<ObsState>,
    params: Mutex<Option<FspModeParams>>,
    pub executor: Executor,
}

impl FspModeNode {
    fn new(fqdn: Fqdn, subarray_id: u16) -> Arc<Self> {
        Arc::new(Self {
            obs: StateModel::new(fqdn.clone(), "obsState", ObsState::Idle),
            subarray_id,
            params: Mutex::new(None),
            executor: Executor::new(fqdn.clone()),
            fqdn,
        })
    }

    pub fn configure_scan(self: &Arc<Self>, params: FspModeParams) -> Result<CommandId, (LrcResultCode, String)> {
        *self.params.lock() = Some(params);
        let node = self.clone();
        self.executor.submit_tracked(
            "ConfigureScan",
            || true,
            move |_cancel| async move {
                match node
                    .obs
                    .try_transition("ConfigureScan", &[ObsState::Idle, ObsState::Ready], ObsState::Ready)
                {
                    Ok(_) => (LrcResultCode::Ok, String::new()),
                    Err(e) => (LrcResultCode::Failed, e.to_string()),
                }
            },
        )
    }

    pub fn scan(self: &Arc<Self>) -> Result<CommandId, (LrcResultCode, String)> {
        let node = self.clone();
        self.executor.submit_tracked(
            "Scan",
            || true,
            move |_cancel| async move {
                match node.obs.try_transition("Scan", &[ObsState::Ready], ObsState::Scanning) {
                    Ok(_) => (LrcResultCode::Ok, String::new()),
                    Err(e) => (LrcResultCode::NotAllowed, e.to_string()),
                }
            },
        )
    }

    pub fn end_scan(self: &Arc<Self>) -> Result<CommandId, (LrcResultCode, String)> {
        let node = self.clone();
        self.executor.submit_tracked(
            "EndScan",
            || true,
            move |_cancel| async move {
                match node.obs.try_transition("EndScan", &[ObsState::Scanning], ObsState::Ready) {
                    Ok(_) => (LrcResultCode::Ok, String::new()),
                    Err(e) => (LrcResultCode::NotAllowed, e.to_string()),
                }
            },
        )
    }

    /// Bypasses the queue entirely rather than waiting behind it (spec
    /// §4.2, §5 — `Abort` is privileged).
    pub fn abort(self: &Arc<Self>) -> Result<CommandId, (LrcResultCode, String)> {
        self.executor.request_abort();
        let node = self.clone();
        Ok(self.executor.submit_abort("Abort", move |_cancel| async move {
            node.obs.set(ObsState::Aborted);
            (LrcResultCode::Ok, String::new())
        }))
    }

    pub fn obs_reset(self: &Arc<Self>) -> Result<CommandId, (LrcResultCode, String)> {
        let node = self.clone();
        self.executor.submit_tracked(
            "ObsReset",
            || true,
            move |_cancel| async move {
                match node
                    .obs
                    .try_transition("ObsReset", &[ObsState::Aborted, ObsState::Fault], ObsState::Idle)
                {
                    Ok(_) => {
                        *node.params.lock() = None;
                        (LrcResultCode::Ok, String::new())
                    }
                    Err(e) => (LrcResultCode::NotAllowed, e.to_string()),
                }
            },
        )
    }
}

pub struct FspNode {
    pub fqdn: Fqdn,
    pub fsp_id: u32,
    pub admin: StateModel<AdminMode>,
    function_mode: Mutex<Option<FunctionMode>>,
    using_subarrays: Mutex<HashSet<u16>>,
    sub_nodes: DashMap<u16, Arc<FspModeNode>>,
}

impl FspNode {
    pub fn new(fqdn: Fqdn, fsp_id: u32) -> Arc<Self> {
        Arc::new(Self {
            admin: StateModel::new(fqdn.clone(), "adminMode", AdminMode::Offline),
            fqdn,
            fsp_id,
            function_mode: Mutex::new(None),
            using_subarrays: Mutex::new(HashSet::new()),
            sub_nodes: DashMap::new(),
        })
    }

    pub fn function_mode(&self) -> Option<FunctionMode> {
        *self.function_mode.lock()
    }

    /// Claim this FSP for `subarray_id` in `mode`. Rejected if another
    /// subarray has it open in a different mode (invariant 3).
    pub fn assign(self: &Arc<Self>, subarray_id: u16, mode: FunctionMode) -> McsResult<Arc<FspModeNode>> {
        let mut fm = self.function_mode.lock();
        match *fm {
            Some(current) if current != mode && !self.using_subarrays.lock().is_empty() => {
                return Err(McsError::ConfigurationConflict(format!(
                    "{} already running {:?}, subarray {} requested {:?}",
                    self.fqdn, current, subarray_id, mode
                )));
            }
            _ => *fm = Some(mode),
        }
        self.using_subarrays.lock().insert(subarray_id);
        let node = self
            .sub_nodes
            .entry(subarray_id)
            .or_insert_with(|| {
                FspModeNode::new(
                    Fqdn::new(self.fqdn.as_str(), "fsp_mode", &subarray_id.to_string()),
                    subarray_id,
                )
            })
            .clone();
        Ok(node)
    }

    pub fn release(&self, subarray_id: u16) {
        self.using_subarrays.lock().remove(&subarray_id);
        self.sub_nodes.remove(&subarray_id);
        if self.using_subarrays.lock().is_empty() {
            *self.function_mode.lock() = None;
        }
    }

    pub fn sub_node(&self, subarray_id: u16) -> Option<Arc<FspModeNode>> {
        self.sub_nodes.get(&subarray_id).map(|r| r.clone())
    }

    pub fn health_state(&self) -> HealthState {
        let states: Vec<HealthState> = self
            .sub_nodes
            .iter()
            .map(|e| match e.value().obs.get() {
                ObsState::Fault => HealthState::Failed,
                ObsState::Aborted => HealthState::Degraded,
                _ => HealthState::Ok,
            })
            .collect();
        HealthState::rollup(states)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corr_config(fsp_id: u32) -> FspConfig {
        FspConfig {
            fsp_id,
            function_mode: FunctionMode::Corr,
            receptor_ids: vec!["100".to_string()],
            frequency_slice_id: 1,
            zoom_factor: 0,
            integration_factor: 1,
            channel_averaging_map: (0..20).map(|i| (i * 4, 1)).collect(),
            output_link_map: (0..20).map(|i| (i * 4, 1)).collect(),
            output_host: "10.0.0.1".to_string(),
            output_port: 9000,
        }
    }

    #[test]
    fn two_subarrays_share_same_mode() {
        let fsp = FspNode::new(Fqdn::from("mid_csp_cbf/fsp/01"), 1);
        fsp.assign(1, FunctionMode::Corr).unwrap();
        fsp.assign(2, FunctionMode::Corr).unwrap();
        assert_eq!(fsp.function_mode(), Some(FunctionMode::Corr));
    }

    #[test]
    fn conflicting_mode_rejected_while_in_use() {
        let fsp = FspNode::new(Fqdn::from("mid_csp_cbf/fsp/02"), 2);
        fsp.assign(1, FunctionMode::Corr).unwrap();
        assert!(fsp.assign(2, FunctionMode::PssBf).is_err());
    }

    #[test]
    fn mode_clears_once_all_subarrays_release() {
        let fsp = FspNode::new(Fqdn::from("mid_csp_cbf/fsp/03"), 3);
        fsp.assign(1, FunctionMode::Corr).unwrap();
        fsp.release(1);
        assert_eq!(fsp.function_mode(), None);
        fsp.assign(1, FunctionMode::Vlbi).unwrap();
        assert_eq!(fsp.function_mode(), Some(FunctionMode::Vlbi));
    }

    #[tokio::test]
    async fn mode_sub_node_configure_scan_then_scan() {
        let fsp = FspNode::new(Fqdn::from("mid_csp_cbf/fsp/04"), 4);
        let sub = fsp.assign(1, FunctionMode::Corr).unwrap();
        let params = FspModeParams::from_config(&corr_config(4));
        let mut results = sub.executor.subscribe_result();
        let _ = sub.configure_scan(params);
        let event = results.recv().await.unwrap();
        assert_eq!(event.code, LrcResultCode::Ok);
        assert_eq!(sub.obs.get(), ObsState::Ready);

        let _ = sub.scan();
        let event = results.recv().await.unwrap();
        assert_eq!(event.code, LrcResultCode::Ok);
        assert_eq!(sub.obs.get(), ObsState::Scanning);
    }
}
