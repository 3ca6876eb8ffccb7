//! Hardware leaf nodes: TalonLRU, PowerOutlet (addressed by id, not a
//! separate node type), and SlimLink (spec §3, §4.7, §4.8).

use crate::error::{McsError, McsResult};
use crate::fqdn::Fqdn;
use crate::health::HealthState;
use crate::lrc::{Executor, LrcResultCode};
use crate::memo::MemoStore;
use crate::state::{AdminMode, OpState, StateModel};
use mcs_driver::{
    BoardProvisioner, LinkHealth, LinkHealthProbe, OutletState, PowerDriver, LINK_CONFIGURE_DEADLINE,
};
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Derive an LRU's operational state from its two outlets (spec §3
/// rule 6, refined by §4.7/S6: a disagreeing pair is a fault an
/// operator must reconcile, not a degraded-but-ON state — see
/// DESIGN.md for why this takes priority over the terser rule-6
/// restatement).
pub fn derive_lru_op_state(admin: AdminMode, a: OutletState, b: OutletState) -> OpState {
    if admin == AdminMode::Offline {
        return OpState::Disable;
    }
    match (a, b) {
        (OutletState::On, OutletState::On) => OpState::On,
        (OutletState::Off, OutletState::Off) => OpState::Off,
        (OutletState::On, OutletState::Off) | (OutletState::Off, OutletState::On) => OpState::Fault,
        _ => OpState::Unknown,
    }
}

/// A single Line-Replaceable Unit: two PDU outlets and a board to
/// provision once powered.
pub struct LruNode {
    pub fqdn: Fqdn,
    pub admin: StateModel<AdminMode>,
    pub op: StateModel<OpState>,
    pub outlet_a: u32,
    pub outlet_b: u32,
    pub board_target_ip: String,
    pub bitstream_path: String,
    pub device_server_list: Vec<String>,
    pub master_fqdn: String,
    power_driver: Arc<dyn PowerDriver>,
    board_driver: Arc<dyn BoardProvisioner>,
    pub executor: Executor,
    memo: Arc<MemoStore>,
    simulation_mode: AtomicBool,
    poll_interval: Duration,
}

impl LruNode {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        fqdn: Fqdn,
        outlet_a: u32,
        outlet_b: u32,
        board_target_ip: impl Into<String>,
        bitstream_path: impl Into<String>,
        device_server_list: Vec<String>,
        master_fqdn: impl Into<String>,
        power_driver: Arc<dyn PowerDriver>,
        board_driver: Arc<dyn BoardProvisioner>,
        memo: Arc<MemoStore>,
    ) -> Arc<Self> {
        let admin_initial = memo.get(&fqdn).unwrap_or(AdminMode::Offline);
        Arc::new(Self {
            admin: StateModel::new(fqdn.clone(), "adminMode", admin_initial),
            op: StateModel::new(fqdn.clone(), "opState", OpState::Init),
            outlet_a,
            outlet_b,
            board_target_ip: board_target_ip.into(),
            bitstream_path: bitstream_path.into(),
            device_server_list,
            master_fqdn: master_fqdn.into(),
            power_driver,
            board_driver,
            executor: Executor::new(fqdn.clone()),
            memo,
            simulation_mode: AtomicBool::new(true),
            poll_interval: Duration::from_secs(20),
            fqdn,
        })
    }

    pub fn simulation_mode(&self) -> bool {
        self.simulation_mode.load(Ordering::SeqCst)
    }

    pub fn set_simulation_mode(&self, enabled: bool) {
        self.simulation_mode.store(enabled, Ordering::SeqCst);
    }

    pub fn set_admin_mode(&self, mode: AdminMode) -> McsResult<()> {
        let from = self.admin.set(mode);
        let _ = self.memo.set(&self.fqdn, mode);
        if from != AdminMode::Online && mode == AdminMode::Online {
            tracing::info!(node = %self.fqdn, "start_communicating");
        } else if from == AdminMode::Online && mode != AdminMode::Online {
            tracing::info!(node = %self.fqdn, "stop_communicating");
        }
        self.refresh_op_state_from_admin();
        Ok(())
    }

    fn refresh_op_state_from_admin(&self) {
        if self.admin.get() == AdminMode::Offline {
            self.op.set(OpState::Disable);
        }
    }

    /// Poll both outlets once and recompute operational state (spec
    /// §4.7: polled at a fixed interval; also called once at
    /// construction time and immediately after `On`/`Off`/`Reset`).
    pub async fn poll_outlets(self: &Arc<Self>) -> McsResult<(OutletState, OutletState)> {
        let a = self.power_driver.get_outlet_state(self.outlet_a).await?;
        let b = self.power_driver.get_outlet_state(self.outlet_b).await?;
        let state = derive_lru_op_state(self.admin.get(), a, b);
        self.op.set(state);
        Ok((a, b))
    }

    /// Spawn the background poll loop (spec §4.7, default 20s).
    pub fn spawn_poll_loop(self: &Arc<Self>) {
        let node = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(node.poll_interval).await;
                if node.op.get() == OpState::Fault {
                    // A FAULT LRU ignores polling-driven updates until
                    // an operator issues Reset (spec §4.7, §8 S6).
                    continue;
                }
                let _ = node.poll_outlets().await;
            }
        });
    }

    /// `On()`: power both outlets, then poll to confirm (fast-path
    /// helper used directly by tests; the Controller submits this as
    /// part of its own `On` LRC fan-out).
    pub async fn power_on(self: &Arc<Self>) -> McsResult<()> {
        if self.op.get() == OpState::Fault {
            return Err(McsError::StateModelViolation {
                node: self.fqdn.clone(),
                command: "On",
                from: "FAULT".to_string(),
            });
        }
        self.power_driver.turn_on_outlet(self.outlet_a).await?;
        self.power_driver.turn_on_outlet(self.outlet_b).await?;
        self.poll_outlets().await?;
        Ok(())
    }

    pub async fn power_off(self: &Arc<Self>) -> McsResult<()> {
        if self.op.get() == OpState::Fault {
            return Err(McsError::StateModelViolation {
                node: self.fqdn.clone(),
                command: "Off",
                from: "FAULT".to_string(),
            });
        }
        self.power_driver.turn_off_outlet(self.outlet_a).await?;
        self.power_driver.turn_off_outlet(self.outlet_b).await?;
        self.poll_outlets().await?;
        Ok(())
    }

    pub async fn provision_board(&self) -> McsResult<()> {
        self.board_driver
            .configure_board(
                &self.board_target_ip,
                &self.bitstream_path,
                &self.device_server_list,
                &self.master_fqdn,
            )
            .await?;
        Ok(())
    }

    /// Clears a FAULT LRU once an operator has manually reconciled the
    /// outlets (spec §8 S6, SPEC_FULL.md §C).
    pub fn submit_reset(self: &Arc<Self>) -> (LrcResultCode, String) {
        let node = self.clone();
        let admin_offline = self.admin.get() == AdminMode::Offline;
        let was_fault = self.op.get() == OpState::Fault;
        self.executor.submit(
            "Reset",
            move || !admin_offline && was_fault,
            move |_cancel| async move {
                match node.poll_outlets().await {
                    Ok((a, b)) => {
                        if node.op.get() == OpState::Fault {
                            (
                                LrcResultCode::Failed,
                                format!("outlets still disagree: {a:?}/{b:?}"),
                            )
                        } else {
                            (LrcResultCode::Ok, "reconciled".to_string())
                        }
                    }
                    Err(e) => (LrcResultCode::Failed, e.to_string()),
                }
            },
        )
    }

    pub fn health_state(&self) -> HealthState {
        HealthState::from_op_state(self.op.get())
    }
}

/// Hash a raw idle control word before it goes on the wire (spec §4.8
/// — both endpoints must be pushed the same hashed word, never the
/// raw one).
fn hash_idle_word(idle_word: u64) -> u64 {
    let mut hasher = DefaultHasher::new();
    idle_word.hash(&mut hasher);
    hasher.finish()
}

/// A logical inter-board SLIM link.
pub struct SlimLinkNode {
    pub fqdn: Fqdn,
    pub admin: StateModel<AdminMode>,
    pub tx_endpoint: String,
    pub rx_endpoint: String,
    idle_control_word: Mutex<u64>,
    health: Mutex<LinkHealth>,
    probe: Arc<dyn LinkHealthProbe>,
    pub executor: Executor,
    simulation_mode: AtomicBool,
}

impl SlimLinkNode {
    pub fn new(
        fqdn: Fqdn,
        tx_endpoint: impl Into<String>,
        rx_endpoint: impl Into<String>,
        probe: Arc<dyn LinkHealthProbe>,
    ) -> Arc<Self> {
        Arc::new(Self {
            admin: StateModel::new(fqdn.clone(), "adminMode", AdminMode::Offline),
            tx_endpoint: tx_endpoint.into(),
            rx_endpoint: rx_endpoint.into(),
            idle_control_word: Mutex::new(0),
            health: Mutex::new(LinkHealth::Ok),
            probe,
            executor: Executor::new(fqdn.clone()),
            simulation_mode: AtomicBool::new(true),
            fqdn,
        })
    }

    pub fn simulation_mode(&self) -> bool {
        self.simulation_mode.load(Ordering::SeqCst)
    }

    pub fn health(&self) -> LinkHealth {
        *self.health.lock()
    }

    /// Push a hashed idle control word to both endpoints and wait for
    /// the link to settle within [`LINK_CONFIGURE_DEADLINE`] (spec §4.8).
    pub async fn configure(&self, idle_word: u64) -> McsResult<LinkHealth> {
        *self.idle_control_word.lock() = idle_word;
        let hashed = hash_idle_word(idle_word);
        let deadline = tokio::time::timeout(LINK_CONFIGURE_DEADLINE, async {
            let tx = self.probe.configure_endpoint(&self.tx_endpoint, hashed).await;
            let rx = self.probe.configure_endpoint(&self.rx_endpoint, hashed).await;
            (tx, rx)
        })
        .await;

        let health = match deadline {
            Ok((Some(tx), Some(rx))) => tx.health().worst(rx.health()),
            _ => LinkHealth::Failed,
        };
        *self.health.lock() = health;
        if health == LinkHealth::Failed {
            return Err(McsError::DriverError(format!(
                "{} did not settle within {:?}",
                self.fqdn, LINK_CONFIGURE_DEADLINE
            )));
        }
        Ok(health)
    }

    /// Ongoing BER sampling; rolls the worse of the two endpoints into
    /// `health`.
    pub async fn resample(&self) -> LinkHealth {
        let tx = self.probe.sample(&self.tx_endpoint).await;
        let rx = self.probe.sample(&self.rx_endpoint).await;
        let health = tx.health().worst(rx.health());
        *self.health.lock() = health;
        health
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcs_driver::{SimBoardProvisioner, SimLinkHealthProbe, SimPowerDriver};

    fn memo() -> Arc<MemoStore> {
        Arc::new(MemoStore::in_memory())
    }

    #[test]
    fn rule6_agreement_cases() {
        assert_eq!(
            derive_lru_op_state(AdminMode::Online, OutletState::On, OutletState::On),
            OpState::On
        );
        assert_eq!(
            derive_lru_op_state(AdminMode::Online, OutletState::Off, OutletState::Off),
            OpState::Off
        );
    }

    #[test]
    fn disagreement_is_fault_not_on() {
        assert_eq!(
            derive_lru_op_state(AdminMode::Online, OutletState::On, OutletState::Off),
            OpState::Fault
        );
    }

    #[test]
    fn offline_admin_overrides_outlets() {
        assert_eq!(
            derive_lru_op_state(AdminMode::Offline, OutletState::On, OutletState::On),
            OpState::Disable
        );
    }

    #[tokio::test]
    async fn startup_inconsistency_yields_fault() {
        let driver = Arc::new(SimPowerDriver::new([1, 2]));
        driver.set_state(1, OutletState::On);
        driver.set_state(2, OutletState::Off);
        let board = Arc::new(SimBoardProvisioner::new());
        let lru = LruNode::new(
            Fqdn::from("mid_csp_cbf/talon_lru/001"),
            1,
            2,
            "10.0.0.1",
            "/bits/a.bit",
            vec!["ds-binderproxy".to_string()],
            "mid_csp_cbf/sub_elt/controller",
            driver,
            board,
            memo(),
        );
        lru.set_admin_mode(AdminMode::Online).unwrap();
        lru.poll_outlets().await.unwrap();
        assert_eq!(lru.op.get(), OpState::Fault);

        // On() refuses while FAULT (S6: "ignores On/Off until reconciled").
        assert!(lru.power_on().await.is_err());
    }

    #[tokio::test]
    async fn reset_after_manual_reconciliation_clears_fault() {
        let driver = Arc::new(SimPowerDriver::new([1, 2]));
        driver.set_state(1, OutletState::On);
        driver.set_state(2, OutletState::Off);
        let board = Arc::new(SimBoardProvisioner::new());
        let lru = LruNode::new(
            Fqdn::from("mid_csp_cbf/talon_lru/002"),
            1,
            2,
            "10.0.0.1",
            "/bits/a.bit",
            vec!["ds-binderproxy".to_string()],
            "mid_csp_cbf/sub_elt/controller",
            driver.clone(),
            board,
            memo(),
        );
        lru.set_admin_mode(AdminMode::Online).unwrap();
        lru.poll_outlets().await.unwrap();
        assert_eq!(lru.op.get(), OpState::Fault);

        // Operator manually reconciles both outlets to ON.
        driver.set_state(2, OutletState::On);
        let mut results = lru.executor.subscribe_result();
        lru.submit_reset();
        let event = results.recv().await.unwrap();
        assert_eq!(event.code, LrcResultCode::Ok);
        assert_eq!(lru.op.get(), OpState::On);
    }

    #[tokio::test]
    async fn slim_link_configures_healthy_by_default() {
        let probe = Arc::new(SimLinkHealthProbe::new());
        let link = SlimLinkNode::new(Fqdn::from("mid_csp_cbf/slim_link/001"), "tx0", "rx0", probe);
        let health = link.configure(0xABCD).await.unwrap();
        assert_eq!(health, LinkHealth::Ok);
    }

    #[tokio::test]
    async fn slim_link_failed_endpoint_errors() {
        let probe = Arc::new(SimLinkHealthProbe::new());
        probe.mark_failed("tx0");
        let link = SlimLinkNode::new(Fqdn::from("mid_csp_cbf/slim_link/002"), "tx0", "rx0", probe);
        assert!(link.configure(0).await.is_err());
        assert_eq!(link.health(), LinkHealth::Failed);
    }
}
