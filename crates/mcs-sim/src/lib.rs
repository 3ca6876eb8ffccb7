//! In-process device tree used by both the `mcs-sim` CLI and the
//! scenario integration tests (spec §8). Every node is wired into one
//! [`Registry`] with simulated drivers throughout, so a scenario run
//! exercises the exact LRC/blocking-set/state-model code paths a real
//! deployment would.

use mcs_core::{
    ControllerNode, DishType, Fqdn, FspNode, LruNode, MemoStore, Registry, SubarrayNode, VccNode,
};
use mcs_driver::{SimBoardProvisioner, SimPowerDriver};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

pub struct Topology {
    pub registry: Arc<Registry>,
    pub controller: Arc<ControllerNode>,
    pub subarray_1: Arc<SubarrayNode>,
    pub subarray_2: Arc<SubarrayNode>,
    pub vcc_1: Arc<VccNode>,
    pub fsp_1: Arc<FspNode>,
    pub lru_a: Arc<LruNode>,
    pub lru_b: Arc<LruNode>,
    pub power_a: Arc<SimPowerDriver>,
    pub power_b: Arc<SimPowerDriver>,
}

/// Two TalonLRUs, one VCC, one FSP, two subarrays, one Controller. Big
/// enough to seed every scenario in spec §8 without the ceremony of
/// standing up the whole receptor array.
pub fn build() -> Topology {
    let memo = Arc::new(MemoStore::in_memory());
    let registry = Registry::new(memo.clone());

    let lru_a_fqdn = Fqdn::from("mid_csp_cbf/talon_lru/001");
    let power_a = Arc::new(SimPowerDriver::new([1, 2]));
    let lru_a = LruNode::new(
        lru_a_fqdn.clone(),
        1,
        2,
        "10.0.0.1",
        "/lib/firmware/talon/a.bit",
        vec!["ds-binderproxy".to_string()],
        "mid_csp_cbf/sub_elt/controller",
        power_a.clone(),
        Arc::new(SimBoardProvisioner::new()),
        memo.clone(),
    );
    lru_a.set_admin_mode(mcs_core::AdminMode::Online).unwrap();
    registry.register_lru(lru_a.clone());

    let lru_b_fqdn = Fqdn::from("mid_csp_cbf/talon_lru/002");
    let power_b = Arc::new(SimPowerDriver::new([3, 4]));
    let lru_b = LruNode::new(
        lru_b_fqdn.clone(),
        3,
        4,
        "10.0.0.2",
        "/lib/firmware/talon/b.bit",
        vec!["ds-binderproxy".to_string()],
        "mid_csp_cbf/sub_elt/controller",
        power_b.clone(),
        Arc::new(SimBoardProvisioner::new()),
        memo.clone(),
    );
    lru_b.set_admin_mode(mcs_core::AdminMode::Online).unwrap();
    registry.register_lru(lru_b.clone());

    let vcc_1 = VccNode::new(Fqdn::new("mid_csp_cbf", "vcc", "001"), 1, DishType::Ska);
    registry.register_vcc(vcc_1.clone());

    let fsp_1 = FspNode::new(Fqdn::new("mid_csp_cbf", "fsp", "01"), 1);
    registry.register_fsp(fsp_1.clone());

    let sa1_fqdn = Fqdn::from("mid_csp_cbf/sub_elt/subarray_01");
    let subarray_1 = SubarrayNode::new(sa1_fqdn.clone(), 1, registry.clone());
    registry.register_subarray(subarray_1.clone());

    let sa2_fqdn = Fqdn::from("mid_csp_cbf/sub_elt/subarray_02");
    let subarray_2 = SubarrayNode::new(sa2_fqdn.clone(), 2, registry.clone());
    registry.register_subarray(subarray_2.clone());

    let controller = ControllerNode::new(
        Fqdn::from("mid_csp_cbf/sub_elt/controller"),
        vec![lru_a_fqdn, lru_b_fqdn],
        vec![sa1_fqdn, sa2_fqdn],
        registry.clone(),
    );
    registry.register_controller(controller.clone());

    Topology {
        registry,
        controller,
        subarray_1,
        subarray_2,
        vcc_1,
        fsp_1,
        lru_a,
        lru_b,
        power_a,
        power_b,
    }
}

fn averaging_map() -> String {
    (0..20)
        .map(|i| format!("[{}, 1]", i * 4))
        .collect::<Vec<_>>()
        .join(",")
}

/// One-FSP CORR scan configuration document targeting `subarray_id`.
pub fn scan_config_doc(subarray_id: u16, fsp_id: u32) -> String {
    format!(
        r#"{{
            "interface": "https://schema.skao.int/ska-csp-configurescan/2.0",
            "common": {{
                "config_id": "sim-config",
                "frequency_band": "1",
                "subarray_id": {subarray_id}
            }},
            "cbf": {{
                "delay_model_subscription_point": "low/delaymodel/1",
                "jones_matrix_subscription_point": "low/jones/1",
                "doppler_phase_correction_subscription_point": "low/doppler/1",
                "timing_beam_weights_subscription_point": "low/beamweights/1",
                "fsp": [{{
                    "fsp_id": {fsp_id},
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
        fsp_id = fsp_id,
        map = averaging_map()
    )
}

pub fn sys_param_doc() -> &'static str {
    r#"{
        "interface": "https://schema.skao.int/ska-mid-cbf-initsysparam/2.0",
        "dish_parameters": {"100": {"vcc": 1, "k": 11}}
    }"#
}

/// Await the next event on `results` carrying `id`, skipping any event
/// the queue already delivered for a different command.
async fn recv_for(
    results: &mut broadcast::Receiver<mcs_core::lrc::LrcResultEvent>,
    timeout: Duration,
) -> mcs_core::lrc::LrcResultEvent {
    tokio::time::timeout(timeout, results.recv())
        .await
        .expect("timed out waiting for LRC result")
        .expect("result channel closed")
}

const WAIT: Duration = Duration::from_secs(65);

/// S1 — happy-path scan (spec §8).
pub async fn scenario_s1(t: &Topology) -> Result<String, String> {
    t.controller
        .init_sys_param(sys_param_doc())
        .map_err(|e| e.to_string())?;

    let mut ctrl_results = t.controller.executor.subscribe_result();
    t.controller.on();
    let ev = recv_for(&mut ctrl_results, WAIT).await;
    if ev.code != mcs_core::LrcResultCode::Ok {
        return Err(format!("On() failed: {}", ev.message));
    }

    let mut sa_results = t.subarray_1.executor.subscribe_result();
    t.subarray_1.add_receptors(vec!["100".to_string()]);
    let ev = recv_for(&mut sa_results, WAIT).await;
    if ev.code != mcs_core::LrcResultCode::Ok {
        return Err(format!("AddReceptors failed: {}", ev.message));
    }

    t.subarray_1.configure_scan(scan_config_doc(1, 1));
    let ev = recv_for(&mut sa_results, WAIT).await;
    if ev.code != mcs_core::LrcResultCode::Ok {
        return Err(format!("ConfigureScan failed: {}", ev.message));
    }

    t.subarray_1.scan(42);
    let ev = recv_for(&mut sa_results, WAIT).await;
    if ev.code != mcs_core::LrcResultCode::Ok {
        return Err(format!("Scan failed: {}", ev.message));
    }

    t.subarray_1.end_scan();
    let ev = recv_for(&mut sa_results, WAIT).await;
    if ev.code != mcs_core::LrcResultCode::Ok {
        return Err(format!("EndScan failed: {}", ev.message));
    }

    t.subarray_1.remove_all_receptors();
    let ev = recv_for(&mut sa_results, WAIT).await;
    if ev.code != mcs_core::LrcResultCode::Ok {
        return Err(format!("RemoveAllReceptors failed: {}", ev.message));
    }

    t.controller.off();
    let ev = recv_for(&mut ctrl_results, WAIT).await;
    if ev.code != mcs_core::LrcResultCode::Ok {
        return Err(format!("Off() failed: {}", ev.message));
    }

    Ok("S1 happy-path scan completed".to_string())
}

/// S2 — receptor conflict (spec §8).
pub async fn scenario_s2(t: &Topology) -> Result<String, String> {
    t.controller
        .init_sys_param(sys_param_doc())
        .map_err(|e| e.to_string())?;

    let mut sa1_results = t.subarray_1.executor.subscribe_result();
    t.subarray_1.add_receptors(vec!["100".to_string()]);
    let ev = recv_for(&mut sa1_results, WAIT).await;
    if ev.code != mcs_core::LrcResultCode::Ok {
        return Err(format!("Subarray-1 AddReceptors unexpectedly failed: {}", ev.message));
    }

    let mut sa2_results = t.subarray_2.executor.subscribe_result();
    t.subarray_2.add_receptors(vec!["100".to_string()]);
    let ev = recv_for(&mut sa2_results, WAIT).await;
    if ev.code != mcs_core::LrcResultCode::Failed {
        return Err("Subarray-2 AddReceptors should have failed with a conflict".to_string());
    }
    if t.subarray_2.obs.get() != mcs_core::ObsState::Empty {
        return Err("Subarray-2 should remain EMPTY after the rejected claim".to_string());
    }

    Ok("S2 receptor conflict rejected as expected".to_string())
}

/// S3 — mid-scan abort (spec §8).
pub async fn scenario_s3(t: &Topology) -> Result<String, String> {
    t.controller
        .init_sys_param(sys_param_doc())
        .map_err(|e| e.to_string())?;

    let mut sa_results = t.subarray_1.executor.subscribe_result();
    t.subarray_1.add_receptors(vec!["100".to_string()]);
    recv_for(&mut sa_results, WAIT).await;
    t.subarray_1.configure_scan(scan_config_doc(1, 1));
    recv_for(&mut sa_results, WAIT).await;
    t.subarray_1.scan(42);
    recv_for(&mut sa_results, WAIT).await;
    if t.subarray_1.obs.get() != mcs_core::ObsState::Scanning {
        return Err("expected SCANNING before Abort".to_string());
    }

    t.subarray_1.abort();
    let ev = recv_for(&mut sa_results, WAIT).await;
    if ev.code != mcs_core::LrcResultCode::Ok || t.subarray_1.obs.get() != mcs_core::ObsState::Aborted {
        return Err(format!("Abort did not reach ABORTED: {}", ev.message));
    }

    t.subarray_1.obs_reset();
    let ev = recv_for(&mut sa_results, WAIT).await;
    if ev.code != mcs_core::LrcResultCode::Ok || t.subarray_1.obs.get() != mcs_core::ObsState::Idle {
        return Err("ObsReset did not reach IDLE".to_string());
    }
    if t.subarray_1.receptor_count() != 1 {
        return Err("ObsReset must preserve assigned receptors".to_string());
    }

    Ok("S3 mid-scan abort recovered to IDLE with receptors preserved".to_string())
}

/// S4 — configure timeout (spec §8). Stubs VCC-1 so `ConfigureBand`
/// never gets a turn: a long-hanging command is queued ahead of it, so
/// the blocking set never drains and `ConfigureScan` times out.
pub async fn scenario_s4(t: &Topology) -> Result<String, String> {
    t.controller
        .init_sys_param(sys_param_doc())
        .map_err(|e| e.to_string())?;

    let mut sa_results = t.subarray_1.executor.subscribe_result();
    t.subarray_1.add_receptors(vec!["100".to_string()]);
    recv_for(&mut sa_results, WAIT).await;

    t.vcc_1.executor.submit(
        "Hang",
        || true,
        |_cancel| async move {
            std::future::pending::<()>().await;
            (mcs_core::LrcResultCode::Ok, String::new())
        },
    );

    t.subarray_1.configure_scan(scan_config_doc(1, 1));
    let ev = recv_for(&mut sa_results, WAIT).await;
    if ev.code != mcs_core::LrcResultCode::Failed {
        return Err(format!("expected ConfigureScan to time out, got {:?}", ev.code));
    }
    if t.subarray_1.obs.get() != mcs_core::ObsState::Fault {
        return Err("timed-out ConfigureScan must leave the subarray in FAULT".to_string());
    }
    if t.fsp_1.sub_node(1).is_some() || t.fsp_1.function_mode().is_some() {
        return Err("FSP claim must be rolled back on ConfigureScan timeout".to_string());
    }

    Ok("S4 ConfigureScan timeout correctly faulted the subarray".to_string())
}

/// S5 — partial power-on (spec §8). LRU-B's outlets are stubbed to
/// refuse, LRU-A powers normally.
pub async fn scenario_s5(t: &Topology) -> Result<String, String> {
    t.power_b.fail_next_command_for(3);
    t.power_b.fail_next_command_for(4);

    let mut results = t.controller.executor.subscribe_result();
    t.controller.on();
    let ev = recv_for(&mut results, WAIT).await;
    if ev.code != mcs_core::LrcResultCode::Ok {
        return Err(format!("On() should still succeed on partial failure: {}", ev.message));
    }
    if !ev.message.contains("talon_lru/002") {
        return Err(format!("result message should name the failed LRU: {}", ev.message));
    }
    if t.controller.op.get() != mcs_core::OpState::On {
        return Err("Controller should be operationally ON after a partial power-on".to_string());
    }

    Ok(format!("S5 partial power-on: {}", ev.message))
}

/// S6 — LRU fault detection (spec §8).
pub async fn scenario_s6(t: &Topology) -> Result<String, String> {
    t.power_a.set_state(1, mcs_driver::OutletState::On);
    t.power_a.set_state(2, mcs_driver::OutletState::Off);
    t.lru_a.poll_outlets().await.map_err(|e| e.to_string())?;
    if t.lru_a.op.get() != mcs_core::OpState::Fault {
        return Err("inconsistent outlets must drive the LRU to FAULT".to_string());
    }

    if t.lru_a.power_on().await.is_ok() {
        return Err("a FAULTed LRU must refuse On()".to_string());
    }

    t.power_a.set_state(2, mcs_driver::OutletState::On);
    let mut results = t.lru_a.executor.subscribe_result();
    t.lru_a.submit_reset();
    let ev = recv_for(&mut results, WAIT).await;
    if ev.code != mcs_core::LrcResultCode::Ok || t.lru_a.op.get() != mcs_core::OpState::On {
        return Err(format!("Reset after reconciliation should clear FAULT: {}", ev.message));
    }

    Ok("S6 LRU fault detected and cleared after manual reconciliation".to_string())
}
