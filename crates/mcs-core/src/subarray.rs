//! The Subarray node: the observation-state machine and the
//! `ConfigureScan` orchestrator (spec §4.4).

use crate::docs::ScanConfigDocument;
use crate::fqdn::Fqdn;
use crate::fsp::FspModeParams;
use crate::health::HealthState;
use crate::lrc::{BlockingSet, CommandId, Executor, LrcResultCode, ABORT_DEADLINE, DEFAULT_CONFIG_TIMEOUT};
use crate::registry::Registry;
use crate::state::{AdminMode, ObsState, StateModel};
use crate::vcc::{Band, BandConfig};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

fn parse_band(raw: &str) -> Option<Band> {
    match raw {
        "1" | "2" | "1_2" => Some(Band::Band1And2),
        "3" => Some(Band::Band3),
        "4" => Some(Band::Band4),
        "5a" => Some(Band::Band5a),
        "5b" => Some(Band::Band5b),
        _ => None,
    }
}

fn vcc_fqdn(domain: &str, vcc_id: u32) -> Fqdn {
    Fqdn::new(domain, "vcc", &format!("{vcc_id:03}"))
}

fn fsp_fqdn(domain: &str, fsp_id: u32) -> Fqdn {
    Fqdn::new(domain, "fsp", &format!("{fsp_id:02}"))
}

pub struct SubarrayNode {
    pub fqdn: Fqdn,
    pub subarray_id: u16,
    pub admin: StateModel<AdminMode>,
    pub obs: StateModel<ObsState>,
    /// receptor id ⇄ VCC id, populated by `AddReceptors`.
    assigned_receptors: Mutex<HashMap<String, u32>>,
    /// FSP ids claimed by the most recent successful `ConfigureScan`.
    assigned_fsps: Mutex<Vec<u32>>,
    committed_config: Mutex<Option<ScanConfigDocument>>,
    scan_id: AtomicU64,
    /// The most recently completed scan id, rejected if repeated
    /// verbatim on the next `Scan` (spec §4.4 precondition).
    last_completed_scan_id: Mutex<Option<u64>>,
    registry: Arc<Registry>,
    pub executor: Executor,
    simulation_mode: AtomicBool,
}

impl SubarrayNode {
    pub fn new(fqdn: Fqdn, subarray_id: u16, registry: Arc<Registry>) -> Arc<Self> {
        Arc::new(Self {
            admin: StateModel::new(fqdn.clone(), "adminMode", AdminMode::Offline),
            obs: StateModel::new(fqdn.clone(), "obsState", ObsState::Empty),
            assigned_receptors: Mutex::new(HashMap::new()),
            assigned_fsps: Mutex::new(Vec::new()),
            committed_config: Mutex::new(None),
            scan_id: AtomicU64::new(0),
            last_completed_scan_id: Mutex::new(None),
            registry,
            executor: Executor::new(fqdn.clone()),
            simulation_mode: AtomicBool::new(true),
            fqdn,
        })
    }

    pub fn simulation_mode(&self) -> bool {
        self.simulation_mode.load(Ordering::SeqCst)
    }

    pub fn set_admin_mode(&self, mode: AdminMode) -> crate::error::McsResult<()> {
        self.admin.set(mode);
        Ok(())
    }

    pub fn receptor_count(&self) -> usize {
        self.assigned_receptors.lock().len()
    }

    /// `AddReceptors`: claims each receptor's VCC for this subarray
    /// (spec §4.4). Valid from `EMPTY` or `IDLE`.
    pub fn add_receptors(self: &Arc<Self>, receptor_ids: Vec<String>) -> (LrcResultCode, String) {
        let node = self.clone();
        let obs_ok = matches!(self.obs.get(), ObsState::Empty | ObsState::Idle);
        self.executor.submit(
            "AddReceptors",
            move || obs_ok,
            move |_cancel| async move {
                let Some(controller) = node.registry.controller() else {
                    return (LrcResultCode::Failed, "no controller registered".to_string());
                };
                let domain = node.fqdn.domain().to_string();
                let mut newly_assigned = Vec::new();
                for rid in &receptor_ids {
                    let Some(vcc_id) = controller.vcc_for_receptor(rid) else {
                        return (
                            LrcResultCode::Failed,
                            format!("receptor {rid} has no VCC mapping in sys param"),
                        );
                    };
                    let Some(vcc) = node.registry.vcc(&vcc_fqdn(&domain, vcc_id)) else {
                        return (LrcResultCode::Failed, format!("VCC {vcc_id} not registered"));
                    };
                    if let Err(e) = vcc.assign(node.subarray_id) {
                        for (_, prev_vcc) in &newly_assigned {
                            if let Some(v) = node.registry.vcc(&vcc_fqdn(&domain, *prev_vcc)) {
                                v.release();
                            }
                        }
                        return (LrcResultCode::Failed, e.to_string());
                    }
                    newly_assigned.push((rid.clone(), vcc_id));
                }
                {
                    let mut assigned = node.assigned_receptors.lock();
                    for (rid, vcc_id) in newly_assigned {
                        assigned.insert(rid, vcc_id);
                    }
                }
                match node
                    .obs
                    .try_transition("AddReceptors", &[ObsState::Empty, ObsState::Idle], ObsState::Idle)
                {
                    Ok(_) => (LrcResultCode::Ok, String::new()),
                    Err(e) => (LrcResultCode::Failed, e.to_string()),
                }
            },
        )
    }

    /// `RemoveReceptors`: releases the named receptors' VCCs. Falls
    /// back to `EMPTY` once none remain.
    pub fn remove_receptors(self: &Arc<Self>, receptor_ids: Vec<String>) -> (LrcResultCode, String) {
        let node = self.clone();
        let obs_ok = self.obs.get() == ObsState::Idle;
        self.executor.submit(
            "RemoveReceptors",
            move || obs_ok,
            move |_cancel| async move {
                let domain = node.fqdn.domain().to_string();
                let mut assigned = node.assigned_receptors.lock();
                for rid in &receptor_ids {
                    if let Some(vcc_id) = assigned.remove(rid) {
                        if let Some(vcc) = node.registry.vcc(&vcc_fqdn(&domain, vcc_id)) {
                            vcc.release();
                        }
                    }
                }
                let empty = assigned.is_empty();
                drop(assigned);
                if empty {
                    node.obs.set(ObsState::Empty);
                }
                (LrcResultCode::Ok, String::new())
            },
        )
    }

    pub fn remove_all_receptors(self: &Arc<Self>) -> (LrcResultCode, String) {
        let ids: Vec<String> = self.assigned_receptors.lock().keys().cloned().collect();
        self.remove_receptors(ids)
    }

    /// `ConfigureScan`: the central orchestrator (spec §4.4).
    ///
    /// 1. parse and validate the document
    /// 2. fan out `ConfigureBand` to every assigned VCC
    /// 3. fan out `ConfigureScan` to every named FSP
    /// 4. wait on the combined blocking set, bounded by
    ///    [`DEFAULT_CONFIG_TIMEOUT`]
    /// 5. forward delay-model coefficients, best effort
    /// 6. commit the configuration and move to `READY`
    /// 7. on any failure, release newly-claimed FSPs and fall back to
    ///    `FAULT`
    pub fn configure_scan(self: &Arc<Self>, raw: String) -> (LrcResultCode, String) {
        let node = self.clone();
        let obs_ok = self.obs.get() == ObsState::Idle;
        self.executor.submit(
            "ConfigureScan",
            move || obs_ok,
            move |_cancel| async move { node.run_configure_scan(&raw).await },
        )
    }

    async fn run_configure_scan(self: &Arc<Self>, raw: &str) -> (LrcResultCode, String) {
        let doc = match ScanConfigDocument::parse(raw) {
            Ok(d) => d,
            Err(e) => return (LrcResultCode::Failed, e.to_string()),
        };
        if doc.common.subarray_id != self.subarray_id {
            return (
                LrcResultCode::Failed,
                format!(
                    "document targets subarray {}, this is {}",
                    doc.common.subarray_id, self.subarray_id
                ),
            );
        }
        let Some(band) = parse_band(&doc.common.frequency_band) else {
            return (
                LrcResultCode::Failed,
                format!("unknown frequency_band {}", doc.common.frequency_band),
            );
        };

        if self
            .obs
            .try_transition("ConfigureScan", &[ObsState::Idle], ObsState::Configuring)
            .is_err()
        {
            return (LrcResultCode::NotAllowed, "not in IDLE".to_string());
        }

        let domain = self.fqdn.domain().to_string();
        let blocking = BlockingSet::new();
        let mut claimed_fsps = Vec::new();

        // Step 2: VCC band fan-out.
        let band_config = BandConfig {
            frequency_band_offset_stream_1: doc.cbf.frequency_band_offset_stream_1,
            frequency_band_offset_stream_2: doc.cbf.frequency_band_offset_stream_2,
            dish_sample_rate: 0,
            samples_per_frame: 0,
        };
        let vccs: Vec<_> = self.assigned_receptors.lock().values().copied().collect();
        let mut child_ids: Vec<CommandId> = Vec::new();
        for vcc_id in &vccs {
            let Some(vcc) = self.registry.vcc(&vcc_fqdn(&domain, *vcc_id)) else {
                self.rollback_configure_scan(&claimed_fsps).await;
                return (LrcResultCode::Failed, format!("VCC {vcc_id} not registered"));
            };
            match vcc.configure_band(band, band_config.clone()) {
                Ok(id) => {
                    blocking.insert(id.clone());
                    blocking.track(vcc.executor.subscribe_result());
                    child_ids.push(id);
                }
                Err((code, msg)) => {
                    self.rollback_configure_scan(&claimed_fsps).await;
                    return (code, msg);
                }
            }
        }

        // Step 3: FSP fan-out.
        for fsp_cfg in &doc.cbf.fsp {
            let Some(fsp) = self.registry.fsp(&fsp_fqdn(&domain, fsp_cfg.fsp_id)) else {
                self.rollback_configure_scan(&claimed_fsps).await;
                return (LrcResultCode::Failed, format!("FSP {} not registered", fsp_cfg.fsp_id));
            };
            let sub = match fsp.assign(self.subarray_id, fsp_cfg.function_mode) {
                Ok(s) => s,
                Err(e) => {
                    self.rollback_configure_scan(&claimed_fsps).await;
                    return (LrcResultCode::Failed, e.to_string());
                }
            };
            claimed_fsps.push(fsp_cfg.fsp_id);
            let params = FspModeParams::from_config(fsp_cfg);
            match sub.configure_scan(params) {
                Ok(id) => {
                    blocking.insert(id.clone());
                    blocking.track(sub.executor.subscribe_result());
                    child_ids.push(id);
                }
                Err((code, msg)) => {
                    self.rollback_configure_scan(&claimed_fsps).await;
                    return (code, msg);
                }
            }
        }

        // Step 4: wait for the whole blocking set.
        match blocking.wait(DEFAULT_CONFIG_TIMEOUT).await {
            Ok(results) => {
                if let Some(bad) = results.iter().find(|r| r.code != LrcResultCode::Ok) {
                    let detail = bad.message.clone();
                    self.rollback_configure_scan(&claimed_fsps).await;
                    return (LrcResultCode::Failed, format!("child command failed: {detail}"));
                }
            }
            Err(pending) => {
                self.rollback_configure_scan(&claimed_fsps).await;
                return (
                    LrcResultCode::Failed,
                    format!("ConfigureScan timed out waiting on {pending:?}"),
                );
            }
        }

        // Step 5: best-effort delay-model forwarding (no subscriber
        // mechanism in this process; logged for observability).
        tracing::info!(
            node = %self.fqdn,
            point = %doc.cbf.delay_model_subscription_point,
            "delay model subscription point recorded"
        );

        // Step 6: commit.
        *self.assigned_fsps.lock() = claimed_fsps;
        *self.committed_config.lock() = Some(doc);
        if self
            .obs
            .try_transition("ConfigureScan", &[ObsState::Configuring], ObsState::Ready)
            .is_err()
        {
            return (LrcResultCode::Failed, "lost CONFIGURING state mid-commit".to_string());
        }
        (LrcResultCode::Ok, "scan configured".to_string())
    }

    /// Cleanup on any `ConfigureScan` failure or timeout: release
    /// claimed FSPs and land in `FAULT` (spec §4.4 step 7, §8 S4) —
    /// not `IDLE`, since the VCC/FSP band state left behind by a
    /// partially-applied configuration is not known-good.
    async fn rollback_configure_scan(self: &Arc<Self>, claimed_fsps: &[u32]) {
        let domain = self.fqdn.domain().to_string();
        for fsp_id in claimed_fsps {
            if let Some(fsp) = self.registry.fsp(&fsp_fqdn(&domain, *fsp_id)) {
                fsp.release(self.subarray_id);
            }
        }
        self.obs.set(ObsState::Fault);
    }

    /// Pre-condition: `READY` and `scan_id` distinct from the last
    /// completed scan (spec §4.4). On any child failure the subarray
    /// faults rather than staying READY with a half-started scan.
    pub fn scan(self: &Arc<Self>, scan_id: u64) -> (LrcResultCode, String) {
        let node = self.clone();
        let repeat = self.last_completed_scan_id.lock().is_some_and(|id| id == scan_id);
        self.executor.submit(
            "Scan",
            move || !repeat,
            move |_cancel| async move {
                if node
                    .obs
                    .try_transition("Scan", &[ObsState::Ready], ObsState::Scanning)
                    .is_err()
                {
                    return (LrcResultCode::NotAllowed, "not READY".to_string());
                }
                node.scan_id.store(scan_id, Ordering::SeqCst);
                let blocking = BlockingSet::new();
                node.fan_out_leaf_scan_commands(&blocking, scan_id);
                match blocking.wait(DEFAULT_CONFIG_TIMEOUT).await {
                    Ok(results) if results.iter().all(|r| r.code == LrcResultCode::Ok) => {
                        (LrcResultCode::Ok, format!("scan {scan_id} started"))
                    }
                    Ok(_) => {
                        node.obs.set(ObsState::Fault);
                        (LrcResultCode::Failed, "one or more children failed to start scan".to_string())
                    }
                    Err(pending) => {
                        node.obs.set(ObsState::Fault);
                        (
                            LrcResultCode::Failed,
                            format!("Scan timed out waiting on {pending:?}"),
                        )
                    }
                }
            },
        )
    }

    fn fan_out_leaf_scan_commands(self: &Arc<Self>, blocking: &Arc<BlockingSet>, scan_id: u64) {
        let domain = self.fqdn.domain().to_string();
        for vcc_id in self.assigned_receptors.lock().values() {
            if let Some(vcc) = self.registry.vcc(&vcc_fqdn(&domain, *vcc_id)) {
                if let Ok(id) = vcc.scan(scan_id) {
                    blocking.insert(id);
                    blocking.track(vcc.executor.subscribe_result());
                }
            }
        }
        for fsp_id in self.assigned_fsps.lock().iter() {
            if let Some(fsp) = self.registry.fsp(&fsp_fqdn(&domain, *fsp_id)) {
                if let Some(sub) = fsp.sub_node(self.subarray_id) {
                    if let Ok(id) = sub.scan() {
                        blocking.insert(id);
                        blocking.track(sub.executor.subscribe_result());
                    }
                }
            }
        }
    }

    pub fn end_scan(self: &Arc<Self>) -> (LrcResultCode, String) {
        let node = self.clone();
        self.executor.submit(
            "EndScan",
            move || true,
            move |_cancel| async move {
                if node
                    .obs
                    .try_transition("EndScan", &[ObsState::Scanning], ObsState::Ready)
                    .is_err()
                {
                    return (LrcResultCode::NotAllowed, "not SCANNING".to_string());
                }
                *node.last_completed_scan_id.lock() = Some(node.scan_id.load(Ordering::SeqCst));
                let domain = node.fqdn.domain().to_string();
                for vcc_id in node.assigned_receptors.lock().values() {
                    if let Some(vcc) = node.registry.vcc(&vcc_fqdn(&domain, *vcc_id)) {
                        let _ = vcc.end_scan();
                    }
                }
                for fsp_id in node.assigned_fsps.lock().iter() {
                    if let Some(fsp) = node.registry.fsp(&fsp_fqdn(&domain, *fsp_id)) {
                        if let Some(sub) = fsp.sub_node(node.subarray_id) {
                            let _ = sub.end_scan();
                        }
                    }
                }
                (LrcResultCode::Ok, String::new())
            },
        )
    }

    /// `Abort`: privileged and pre-emptive (spec §4.4, §5) — cancels
    /// whatever is currently in flight before the abort body itself
    /// runs, and is bounded by [`ABORT_DEADLINE`] regardless of how
    /// many children are unresponsive.
    /// Bypasses the queue entirely rather than waiting behind it (spec
    /// §4.2, §5 — `Abort` is privileged and must return within its
    /// deadline even with a full queue).
    pub fn abort(self: &Arc<Self>) -> (LrcResultCode, String) {
        self.executor.request_abort();
        let node = self.clone();
        let id = self.executor.submit_abort("Abort", move |_cancel| async move {
            node.obs.set(ObsState::Aborting);
            let domain = node.fqdn.domain().to_string();
            let blocking = BlockingSet::new();
            // child's CommandId -> a closure that force-faults its
            // owner, so a straggler past ABORT_DEADLINE can be
            // marked FAULT (spec §4.4: children still unresponsive
            // at the deadline move to FAULT, not just the subarray).
            let mut owners: Vec<(CommandId, Box<dyn Fn() + Send>)> = Vec::new();

            for vcc_id in node.assigned_receptors.lock().values() {
                if let Some(vcc) = node.registry.vcc(&vcc_fqdn(&domain, *vcc_id)) {
                    if let Ok(id) = vcc.abort() {
                        blocking.insert(id.clone());
                        blocking.track(vcc.executor.subscribe_result());
                        let vcc = vcc.clone();
                        owners.push((id, Box::new(move || { vcc.obs.set(ObsState::Fault); })));
                    }
                }
            }
            for fsp_id in node.assigned_fsps.lock().iter() {
                if let Some(fsp) = node.registry.fsp(&fsp_fqdn(&domain, *fsp_id)) {
                    if let Some(sub) = fsp.sub_node(node.subarray_id) {
                        if let Ok(id) = sub.abort() {
                            blocking.insert(id.clone());
                            blocking.track(sub.executor.subscribe_result());
                            let sub = sub.clone();
                            owners.push((id, Box::new(move || { sub.obs.set(ObsState::Fault); })));
                        }
                    }
                }
            }

            if let Err(still_pending) = blocking.wait(ABORT_DEADLINE).await {
                for (id, force_fault) in &owners {
                    if still_pending.contains(id) {
                        force_fault();
                    }
                }
            }
            node.obs.set(ObsState::Aborted);
            (LrcResultCode::Ok, String::new())
        });
        (LrcResultCode::Started, id.to_string())
    }

    pub fn obs_reset(self: &Arc<Self>) -> (LrcResultCode, String) {
        let node = self.clone();
        self.executor.submit(
            "ObsReset",
            move || true,
            move |_cancel| async move {
                if node
                    .obs
                    .try_transition("ObsReset", &[ObsState::Aborted, ObsState::Fault], ObsState::Idle)
                    .is_err()
                {
                    return (LrcResultCode::NotAllowed, "not ABORTED/FAULT".to_string());
                }
                let domain = node.fqdn.domain().to_string();
                for fsp_id in node.assigned_fsps.lock().drain(..).collect::<Vec<_>>() {
                    if let Some(fsp) = node.registry.fsp(&fsp_fqdn(&domain, fsp_id)) {
                        fsp.release(node.subarray_id);
                    }
                }
                *node.committed_config.lock() = None;
                (LrcResultCode::Ok, String::new())
            },
        )
    }

    /// `Restart`: like `ObsReset` but also drops every receptor,
    /// returning to `EMPTY` (spec §4.4).
    pub fn restart(self: &Arc<Self>) -> (LrcResultCode, String) {
        let node = self.clone();
        self.executor.submit(
            "Restart",
            move || true,
            move |_cancel| async move {
                if node
                    .obs
                    .try_transition("Restart", &[ObsState::Aborted, ObsState::Fault], ObsState::Restarting)
                    .is_err()
                {
                    return (LrcResultCode::NotAllowed, "not ABORTED/FAULT".to_string());
                }
                let domain = node.fqdn.domain().to_string();
                for fsp_id in node.assigned_fsps.lock().drain(..).collect::<Vec<_>>() {
                    if let Some(fsp) = node.registry.fsp(&fsp_fqdn(&domain, fsp_id)) {
                        fsp.release(node.subarray_id);
                    }
                }
                for (_, vcc_id) in node.assigned_receptors.lock().drain() {
                    if let Some(vcc) = node.registry.vcc(&vcc_fqdn(&domain, vcc_id)) {
                        vcc.release();
                    }
                }
                *node.committed_config.lock() = None;
                node.obs.set(ObsState::Empty);
                (LrcResultCode::Ok, String::new())
            },
        )
    }

    pub fn health_state(&self) -> HealthState {
        match self.obs.get() {
            ObsState::Fault => HealthState::Failed,
            ObsState::Aborted | ObsState::Aborting => HealthState::Degraded,
            _ => HealthState::Ok,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docs::FunctionMode;
    use crate::fsp::FspNode;
    use crate::memo::MemoStore;
    use crate::vcc::{DishType, VccNode};
    use std::time::Duration;

    fn averaging_map() -> String {
        (0..20)
            .map(|i| format!("[{}, 1]", i * 4))
            .collect::<Vec<_>>()
            .join(",")
    }

    fn scan_config_doc(subarray_id: u16) -> String {
        format!(
            r#"{{
                "interface": "https://schema.skao.int/ska-csp-configurescan/2.0",
                "common": {{
                    "config_id": "test-config",
                    "frequency_band": "1",
                    "subarray_id": {subarray_id}
                }},
                "cbf": {{
                    "delay_model_subscription_point": "low/delaymodel/1",
                    "jones_matrix_subscription_point": "low/jones/1",
                    "doppler_phase_correction_subscription_point": "low/doppler/1",
                    "timing_beam_weights_subscription_point": "low/beamweights/1",
                    "fsp": [{{
                        "fsp_id": 1,
                        "function_mode": "CORR",
                        "receptor_ids": ["100"],
                        "frequency_slice_id": 1,
                        "zoom_factor": 0,
                        "integration_factor": 1,
                        "channel_averaging_map": [{map}],
                        "output_link_map": [{map}],
                        "output_host": "10.0.0.1",
                        "output_port": 9000
                    }}]
                }}
            }}"#,
            subarray_id = subarray_id,
            map = averaging_map()
        )
    }

    fn registry_with_one_vcc_one_fsp() -> (Arc<Registry>, Arc<SubarrayNode>) {
        let registry = Registry::new(Arc::new(MemoStore::in_memory()));
        registry.register_vcc(VccNode::new(Fqdn::from("mid_csp_cbf/vcc/001"), 1, DishType::Ska));
        registry.register_fsp(FspNode::new(Fqdn::from("mid_csp_cbf/fsp/01"), 1));
        let sa = SubarrayNode::new(Fqdn::from("mid_csp_cbf/sub_elt/subarray_01"), 1, registry.clone());
        registry.register_subarray(sa.clone());
        (registry, sa)
    }

    #[tokio::test]
    async fn add_receptors_then_configure_scan_then_scan() {
        let (registry, sa) = registry_with_one_vcc_one_fsp();
        let controller = crate::controller::ControllerNode::new(
            Fqdn::from("mid_csp_cbf/sub_elt/controller"),
            vec![],
            vec![],
            registry.clone(),
        );
        controller
            .init_sys_param(
                r#"{"interface":"x","dish_parameters":{"100":{"vcc":1,"k":11}}}"#,
            )
            .unwrap();
        registry.register_controller(controller);

        let mut results = sa.executor.subscribe_result();
        sa.add_receptors(vec!["100".to_string()]);
        let event = tokio::time::timeout(Duration::from_secs(1), results.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.code, LrcResultCode::Ok);
        assert_eq!(sa.obs.get(), ObsState::Idle);

        sa.configure_scan(scan_config_doc(1));
        let event = tokio::time::timeout(Duration::from_secs(5), results.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.code, LrcResultCode::Ok);
        assert_eq!(sa.obs.get(), ObsState::Ready);

        sa.scan(7);
        let event = tokio::time::timeout(Duration::from_secs(5), results.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.code, LrcResultCode::Ok);
        assert_eq!(sa.obs.get(), ObsState::Scanning);

        sa.end_scan();
        let event = tokio::time::timeout(Duration::from_secs(5), results.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.code, LrcResultCode::Ok);
        assert_eq!(sa.obs.get(), ObsState::Ready);
    }

    #[tokio::test]
    async fn configure_scan_wrong_subarray_id_rejected() {
        let (_registry, sa) = registry_with_one_vcc_one_fsp();
        sa.obs.set(ObsState::Idle);
        let mut results = sa.executor.subscribe_result();
        sa.configure_scan(scan_config_doc(99));
        let event = tokio::time::timeout(Duration::from_secs(1), results.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.code, LrcResultCode::Failed);
        assert_eq!(sa.obs.get(), ObsState::Idle);
    }

    #[tokio::test]
    async fn abort_from_scanning_reaches_aborted() {
        let (_registry, sa) = registry_with_one_vcc_one_fsp();
        sa.obs.set(ObsState::Scanning);
        let mut results = sa.executor.subscribe_result();
        sa.abort();
        let event = tokio::time::timeout(Duration::from_secs(2), results.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.code, LrcResultCode::Ok);
        assert_eq!(sa.obs.get(), ObsState::Aborted);
    }

    #[tokio::test]
    async fn restart_releases_receptors_and_returns_empty() {
        let (registry, sa) = registry_with_one_vcc_one_fsp();
        let vcc = registry.vcc(&Fqdn::from("mid_csp_cbf/vcc/001")).unwrap();
        vcc.assign(1).unwrap();
        sa.assigned_receptors.lock().insert("100".to_string(), 1);
        sa.obs.set(ObsState::Aborted);

        let mut results = sa.executor.subscribe_result();
        sa.restart();
        let event = tokio::time::timeout(Duration::from_secs(1), results.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.code, LrcResultCode::Ok);
        assert_eq!(sa.obs.get(), ObsState::Empty);
        assert_eq!(vcc.subarray_id(), 0);
    }

    #[tokio::test]
    async fn repeat_scan_id_rejected_after_end_scan() {
        let (_registry, sa) = registry_with_one_vcc_one_fsp();
        sa.obs.set(ObsState::Ready);
        let mut results = sa.executor.subscribe_result();

        sa.scan(7);
        let event = tokio::time::timeout(Duration::from_secs(2), results.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.code, LrcResultCode::Ok);

        sa.end_scan();
        let event = tokio::time::timeout(Duration::from_secs(2), results.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.code, LrcResultCode::Ok);
        assert_eq!(sa.obs.get(), ObsState::Ready);

        let mut results = sa.executor.subscribe_result();
        sa.scan(7);
        let event = tokio::time::timeout(Duration::from_secs(1), results.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.code, LrcResultCode::NotAllowed);
        assert_eq!(sa.obs.get(), ObsState::Ready);
    }

    #[tokio::test]
    async fn configure_scan_child_failure_faults_subarray() {
        let (registry, sa) = registry_with_one_vcc_one_fsp();
        sa.obs.set(ObsState::Idle);
        sa.assigned_receptors.lock().insert("100".to_string(), 1);
        // Put the FSP into a state where `assign` will fail: another
        // subarray holds it open in a conflicting function mode, and
        // the document below requests CORR (spec invariant 3).
        let fsp = registry.fsp(&Fqdn::from("mid_csp_cbf/fsp/01")).unwrap();
        fsp.assign(2, FunctionMode::PssBf).unwrap();

        let mut results = sa.executor.subscribe_result();
        sa.configure_scan(scan_config_doc(1));
        let event = tokio::time::timeout(Duration::from_secs(5), results.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.code, LrcResultCode::Failed);
        assert_eq!(sa.obs.get(), ObsState::Fault);
    }

    #[test]
    fn band_parsing_covers_known_codes() {
        assert_eq!(parse_band("1"), Some(Band::Band1And2));
        assert_eq!(parse_band("5a"), Some(Band::Band5a));
        assert_eq!(parse_band("nonsense"), None);
    }
}
