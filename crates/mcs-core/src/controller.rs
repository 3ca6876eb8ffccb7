//! The top-level Controller node (spec §4.3): sys-param ownership,
//! power fan-out to the LRUs, and bringing subarrays on/offline.

use crate::docs::SysParamDocument;
use crate::error::{McsError, McsResult};
use crate::fqdn::Fqdn;
use crate::health::HealthState;
use crate::lrc::{Executor, LrcResultCode, DEFAULT_ON_OFF_TIMEOUT};
use crate::registry::Registry;
use crate::state::{AdminMode, ObsState, OpState, StateModel};
use parking_lot::Mutex;
use std::sync::Arc;

pub struct ControllerNode {
    pub fqdn: Fqdn,
    pub admin: StateModel<AdminMode>,
    pub op: StateModel<OpState>,
    sys_param: Mutex<Option<SysParamDocument>>,
    lru_fqdns: Vec<Fqdn>,
    subarray_fqdns: Vec<Fqdn>,
    registry: Arc<Registry>,
    pub executor: Executor,
    /// Whether `Standby` is a distinct behaviour or an alias for `On`
    /// (spec §9 Open Question — SPEC_FULL.md/DESIGN.md record the
    /// decision: alias, behind this flag so a deployment can flip it).
    pub standby_is_alias_for_on: bool,
}

impl ControllerNode {
    pub fn new(
        fqdn: Fqdn,
        lru_fqdns: Vec<Fqdn>,
        subarray_fqdns: Vec<Fqdn>,
        registry: Arc<Registry>,
    ) -> Arc<Self> {
        let admin_initial = registry.memo.get(&fqdn).unwrap_or(AdminMode::Offline);
        Arc::new(Self {
            admin: StateModel::new(fqdn.clone(), "adminMode", admin_initial),
            op: StateModel::new(fqdn.clone(), "opState", OpState::Init),
            sys_param: Mutex::new(None),
            lru_fqdns,
            subarray_fqdns,
            registry,
            executor: Executor::new(fqdn.clone()),
            standby_is_alias_for_on: true,
            fqdn,
        })
    }

    /// `InitSysParam`: fast command, rejected unless every subarray is
    /// `EMPTY` (spec §4.3 — the receptor/VCC mapping must not move
    /// under a subarray's feet).
    pub fn init_sys_param(&self, raw: &str) -> McsResult<()> {
        let doc = SysParamDocument::parse(raw)?;
        for sa_fqdn in &self.subarray_fqdns {
            if let Some(sa) = self.registry.subarray(sa_fqdn) {
                if sa.obs.get() != ObsState::Empty {
                    return Err(McsError::ConfigurationConflict(format!(
                        "{sa_fqdn} is not EMPTY, cannot re-initialise sys param"
                    )));
                }
            }
        }
        *self.sys_param.lock() = Some(doc);
        Ok(())
    }

    pub fn vcc_for_receptor(&self, receptor_id: &str) -> Option<u32> {
        self.sys_param.lock().as_ref()?.vcc_for_receptor(receptor_id)
    }

    /// `On()`: power every LRU, provision its board, then bring every
    /// subarray's admin mode online. Tolerates partial LRU failure —
    /// succeeds if at least one LRU powers up (spec §4.3, §7 partial
    /// failure policy).
    pub fn on(self: &Arc<Self>) -> (LrcResultCode, String) {
        let node = self.clone();
        self.executor.submit(
            "On",
            || true,
            move |cancel| async move {
                let mut attempted = 0usize;
                // LRU power-on is a plain async call here rather than
                // its own submitted LRC: the Controller's `On` is
                // already the outer LRC and owns the fan-out's timeout
                // budget directly instead of through a BlockingSet.
                let fan_out = tokio::time::timeout(DEFAULT_ON_OFF_TIMEOUT, async {
                    for lru_fqdn in &node.lru_fqdns {
                        let Some(lru) = node.registry.lru(lru_fqdn) else {
                            continue;
                        };
                        attempted += 1;
                        if lru.power_on().await.is_ok() {
                            let _ = lru.provision_board().await;
                        }
                        if cancel.is_cancelled() {
                            break;
                        }
                    }
                });
                let _ = fan_out.await;

                let succeeded = node
                    .lru_fqdns
                    .iter()
                    .filter_map(|f| node.registry.lru(f))
                    .filter(|l| l.op.get() == OpState::On)
                    .count();

                for sa_fqdn in &node.subarray_fqdns {
                    if let Some(sa) = node.registry.subarray(sa_fqdn) {
                        let _ = sa.set_admin_mode(AdminMode::Online);
                    }
                }

                if attempted == 0 {
                    (LrcResultCode::Failed, "no LRUs configured".to_string())
                } else if succeeded == 0 {
                    (LrcResultCode::Failed, "all LRUs failed to power on".to_string())
                } else {
                    node.op.set(OpState::On);
                    if succeeded < attempted {
                        let failed: Vec<String> = node
                            .lru_fqdns
                            .iter()
                            .filter_map(|f| node.registry.lru(f))
                            .filter(|l| l.op.get() != OpState::On)
                            .map(|l| l.fqdn.to_string())
                            .collect();
                        (
                            LrcResultCode::Ok,
                            format!("partial: {succeeded}/{attempted} LRUs on, failed: {}", failed.join(", ")),
                        )
                    } else {
                        (LrcResultCode::Ok, format!("{succeeded}/{attempted} LRUs on"))
                    }
                }
            },
        )
    }

    /// `Standby()`: spec-flagged Open Question, implemented as an
    /// alias for `On` (see `standby_is_alias_for_on`).
    pub fn standby(self: &Arc<Self>) -> (LrcResultCode, String) {
        if self.standby_is_alias_for_on {
            self.on()
        } else {
            (LrcResultCode::NotAllowed, "Standby not implemented".to_string())
        }
    }

    /// `Off()`: best-effort abort/reset every subarray, take them
    /// offline, then power down every LRU.
    pub fn off(self: &Arc<Self>) -> (LrcResultCode, String) {
        let node = self.clone();
        self.executor.submit(
            "Off",
            || true,
            move |_cancel| async move {
                for sa_fqdn in &node.subarray_fqdns {
                    if let Some(sa) = node.registry.subarray(sa_fqdn) {
                        if sa.obs.get() != ObsState::Empty {
                            sa.abort();
                        }
                        let _ = sa.set_admin_mode(AdminMode::Offline);
                    }
                }

                let mut attempted = 0usize;
                let fan_out = tokio::time::timeout(DEFAULT_ON_OFF_TIMEOUT, async {
                    for lru_fqdn in &node.lru_fqdns {
                        let Some(lru) = node.registry.lru(lru_fqdn) else {
                            continue;
                        };
                        attempted += 1;
                        let _ = lru.power_off().await;
                    }
                });
                let _ = fan_out.await;

                let off_count = node
                    .lru_fqdns
                    .iter()
                    .filter_map(|f| node.registry.lru(f))
                    .filter(|l| l.op.get() == OpState::Off)
                    .count();

                node.op.set(OpState::Off);
                if attempted > 0 && off_count < attempted {
                    (
                        LrcResultCode::Ok,
                        format!("partial: {off_count}/{attempted} LRUs off"),
                    )
                } else {
                    (LrcResultCode::Ok, format!("{off_count}/{attempted} LRUs off"))
                }
            },
        )
    }

    pub fn health_state(&self) -> HealthState {
        let lru_health: Vec<HealthState> = self
            .lru_fqdns
            .iter()
            .filter_map(|f| self.registry.lru(f))
            .map(|l| l.health_state())
            .collect();
        HealthState::rollup(lru_health)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::LruNode;
    use crate::memo::MemoStore;
    use crate::subarray::SubarrayNode;
    use mcs_driver::{SimBoardProvisioner, SimPowerDriver};
    use std::time::Duration;

    fn sys_param_doc() -> String {
        r#"{
            "interface": "https://schema.skao.int/ska-mid-cbf-initsysparam/2.0",
            "dish_parameters": {"100": {"vcc": 1, "k": 11}}
        }"#
        .to_string()
    }

    fn build_controller() -> (Arc<ControllerNode>, Arc<Registry>) {
        let memo = Arc::new(MemoStore::in_memory());
        let registry = Registry::new(memo.clone());

        let lru_fqdn = Fqdn::from("mid_csp_cbf/talon_lru/001");
        let driver = Arc::new(SimPowerDriver::new([1, 2]));
        let board = Arc::new(SimBoardProvisioner::new());
        let lru = LruNode::new(
            lru_fqdn.clone(),
            1,
            2,
            "10.0.0.1",
            "/bits/a.bit",
            vec![],
            "mid_csp_cbf/sub_elt/controller",
            driver,
            board,
            memo.clone(),
        );
        registry.register_lru(lru);

        let sa_fqdn = Fqdn::from("mid_csp_cbf/sub_elt/subarray_01");
        let subarray = SubarrayNode::new(sa_fqdn.clone(), 1, registry.clone());
        registry.register_subarray(subarray);

        let controller = ControllerNode::new(
            Fqdn::from("mid_csp_cbf/sub_elt/controller"),
            vec![lru_fqdn],
            vec![sa_fqdn],
            registry.clone(),
        );
        registry.register_controller(controller.clone());
        (controller, registry)
    }

    #[test]
    fn init_sys_param_then_lookup() {
        let (controller, _registry) = build_controller();
        controller.init_sys_param(&sys_param_doc()).unwrap();
        assert_eq!(controller.vcc_for_receptor("100"), Some(1));
    }

    #[tokio::test]
    async fn on_powers_lru_and_brings_subarray_online() {
        let (controller, registry) = build_controller();
        let mut results = controller.executor.subscribe_result();
        controller.on();
        let event = tokio::time::timeout(Duration::from_secs(2), results.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.code, LrcResultCode::Ok);

        let sa = registry.subarray(&Fqdn::from("mid_csp_cbf/sub_elt/subarray_01")).unwrap();
        assert_eq!(sa.admin.get(), AdminMode::Online);
    }
}
