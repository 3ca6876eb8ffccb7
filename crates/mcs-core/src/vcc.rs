//! Very-coarse channelizer node (spec §4.3).
//!
//! A VCC stands in for one receptor's digitized signal path. It holds
//! no function-mode state itself (that lives on the FSP side per spec
//! §4.5); its job is band selection and delay tracking.

use crate::error::{McsError, McsResult};
use crate::fqdn::Fqdn;
use crate::health::HealthState;
use crate::lrc::{CommandId, Executor, LrcResultCode};
use crate::state::{AdminMode, ObsState, StateModel};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;

/// Receptor frequency band (spec §4.3). Exactly one is active at a
/// time per invariant 4 — activating a new band must deactivate the
/// previous one first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Band {
    Band1And2,
    Band3,
    Band4,
    Band5a,
    Band5b,
}

/// The dish a receptor's VCC is wired to. Determines which bands
/// `ConfigureBand` will accept (spec §4.5 — "reject if the requested
/// band is unsupported for the configured dish type").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DishType {
    /// Full-performance SKA dish: all five bands.
    Ska,
    /// MeerKAT-extension dish: retrofitted with Band 1/2 receivers only.
    MeerKatExtension,
}

impl DishType {
    pub fn supports(&self, band: Band) -> bool {
        match self {
            DishType::Ska => true,
            DishType::MeerKatExtension => matches!(band, Band::Band1And2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandSubState {
    Active,
    Disabled,
}

#[derive(Debug, Clone)]
pub struct BandConfig {
    pub frequency_band_offset_stream_1: i64,
    pub frequency_band_offset_stream_2: i64,
    pub dish_sample_rate: u64,
    pub samples_per_frame: u32,
}

struct VccState {
    current_band: Option<Band>,
    sub_states: HashMap<Band, BandSubState>,
    config: Option<BandConfig>,
    /// Invariant 4 is enforced by this flag: a second `ConfigureBand`
    /// is rejected until the in-flight one's deactivate/activate pair
    /// has both completed.
    band_transition_in_progress: bool,
    internal_gain: Vec<f64>,
}

impl VccState {
    fn new() -> Self {
        Self {
            current_band: None,
            sub_states: HashMap::new(),
            config: None,
            band_transition_in_progress: false,
            internal_gain: Vec::new(),
        }
    }
}

pub struct VccNode {
    pub fqdn: Fqdn,
    pub vcc_id: u32,
    pub admin: StateModel<AdminMode>,
    pub obs: StateModel<ObsState>,
    pub dish_type: DishType,
    subarray_id: AtomicU16,
    state: Mutex<VccState>,
    pub executor: Executor,
    simulation_mode: AtomicBool,
}

impl VccNode {
    pub fn new(fqdn: Fqdn, vcc_id: u32, dish_type: DishType) -> Arc<Self> {
        Arc::new(Self {
            admin: StateModel::new(fqdn.clone(), "adminMode", AdminMode::Offline),
            obs: StateModel::new(fqdn.clone(), "obsState", ObsState::Idle),
            vcc_id,
            dish_type,
            subarray_id: AtomicU16::new(0),
            state: Mutex::new(VccState::new()),
            executor: Executor::new(fqdn.clone()),
            simulation_mode: AtomicBool::new(true),
            fqdn,
        })
    }

    pub fn simulation_mode(&self) -> bool {
        self.simulation_mode.load(Ordering::SeqCst)
    }

    pub fn subarray_id(&self) -> u16 {
        self.subarray_id.load(Ordering::SeqCst)
    }

    pub fn assign(&self, subarray_id: u16) -> McsResult<()> {
        if self.subarray_id() != 0 && self.subarray_id() != subarray_id {
            return Err(McsError::ConfigurationConflict(format!(
                "{} already assigned to subarray {}",
                self.fqdn,
                self.subarray_id()
            )));
        }
        self.subarray_id.store(subarray_id, Ordering::SeqCst);
        Ok(())
    }

    pub fn release(&self) {
        self.subarray_id.store(0, Ordering::SeqCst);
        self.obs.set(ObsState::Idle);
        let mut state = self.state.lock();
        *state = VccState::new();
    }

    /// `ConfigureBand`: the only command that touches band state.
    /// Rejected while a previous band change is still in flight
    /// (invariant 4), outside `IDLE`/`READY` (spec §4.3), or if the
    /// requested band is unsupported by this VCC's dish type (spec
    /// §4.5).
    pub fn configure_band(
        self: &Arc<Self>,
        band: Band,
        config: BandConfig,
    ) -> Result<CommandId, (LrcResultCode, String)> {
        if !self.dish_type.supports(band) {
            return Err((
                LrcResultCode::NotAllowed,
                format!("{band:?} unsupported for dish type {:?}", self.dish_type),
            ));
        }
        let node = self.clone();
        let already_transitioning = self.state.lock().band_transition_in_progress;
        let obs_ok = matches!(self.obs.get(), ObsState::Idle | ObsState::Ready);
        self.executor.submit_tracked(
            "ConfigureBand",
            move || !already_transitioning && obs_ok,
            move |_cancel| async move {
                {
                    let mut state = node.state.lock();
                    state.band_transition_in_progress = true;
                    if let Some(prev) = state.current_band {
                        state.sub_states.insert(prev, BandSubState::Disabled);
                    }
                    state.current_band = Some(band);
                    state.sub_states.insert(band, BandSubState::Active);
                    state.config = Some(config);
                    state.band_transition_in_progress = false;
                }
                if let Err(e) = node.obs.try_transition(
                    "ConfigureBand",
                    &[ObsState::Idle, ObsState::Ready],
                    ObsState::Ready,
                ) {
                    return (LrcResultCode::Failed, e.to_string());
                }
                (LrcResultCode::Ok, format!("band {band:?} active"))
            },
        )
    }

    pub fn current_band(&self) -> Option<Band> {
        self.state.lock().current_band
    }

    pub fn internal_gain(&self) -> Vec<f64> {
        self.state.lock().internal_gain.clone()
    }

    /// `SetInternalGain`: a fast command, not an LRC (spec §4.3 "Owns:
    /// ... internal-gain vector"), mirroring `UpdateDelayModel` — valid
    /// only once a band is configured.
    pub fn set_internal_gain(&self, gain: Vec<f64>) -> McsResult<()> {
        let mut state = self.state.lock();
        if state.current_band.is_none() {
            return Err(McsError::StateModelViolation {
                node: self.fqdn.clone(),
                command: "SetInternalGain",
                from: "no band configured".to_string(),
            });
        }
        state.internal_gain = gain;
        Ok(())
    }

    /// `UpdateDelayModel`: a fast command, not an LRC (spec §4.3)
    /// — valid only once a band is configured.
    pub fn update_delay_model(&self, _coefficients: &str) -> McsResult<()> {
        match self.obs.get() {
            ObsState::Ready | ObsState::Scanning => Ok(()),
            other => Err(McsError::StateModelViolation {
                node: self.fqdn.clone(),
                command: "UpdateDelayModel",
                from: format!("{other:?}"),
            }),
        }
    }

    pub fn scan(self: &Arc<Self>, scan_id: u64) -> Result<CommandId, (LrcResultCode, String)> {
        let node = self.clone();
        self.executor.submit_tracked(
            "Scan",
            move || true,
            move |_cancel| async move {
                match node
                    .obs
                    .try_transition("Scan", &[ObsState::Ready], ObsState::Scanning)
                {
                    Ok(_) => (LrcResultCode::Ok, format!("scanning scan_id={scan_id}")),
                    Err(e) => (LrcResultCode::NotAllowed, e.to_string()),
                }
            },
        )
    }

    pub fn end_scan(self: &Arc<Self>) -> Result<CommandId, (LrcResultCode, String)> {
        let node = self.clone();
        self.executor.submit_tracked(
            "EndScan",
            move || true,
            move |_cancel| async move {
                match node
                    .obs
                    .try_transition("EndScan", &[ObsState::Scanning], ObsState::Ready)
                {
                    Ok(_) => (LrcResultCode::Ok, String::new()),
                    Err(e) => (LrcResultCode::NotAllowed, e.to_string()),
                }
            },
        )
    }

    /// `Abort`: privileged, pre-empts whatever is in flight (spec
    /// §4.4) — bypasses the queue entirely rather than waiting behind
    /// it (spec §4.2, §5).
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
            move || true,
            move |_cancel| async move {
                match node.obs.try_transition(
                    "ObsReset",
                    &[ObsState::Aborted, ObsState::Fault],
                    ObsState::Idle,
                ) {
                    Ok(_) => {
                        let mut state = node.state.lock();
                        *state = VccState::new();
                        (LrcResultCode::Ok, String::new())
                    }
                    Err(e) => (LrcResultCode::NotAllowed, e.to_string()),
                }
            },
        )
    }

    pub fn health_state(&self) -> HealthState {
        match self.obs.get() {
            ObsState::Fault => HealthState::Failed,
            ObsState::Aborted => HealthState::Degraded,
            _ => HealthState::Ok,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sample_config() -> BandConfig {
        BandConfig {
            frequency_band_offset_stream_1: 0,
            frequency_band_offset_stream_2: 0,
            dish_sample_rate: 3_960_000_000,
            samples_per_frame: 18,
        }
    }

    #[tokio::test]
    async fn configure_band_then_scan_round_trip() {
        let vcc = VccNode::new(Fqdn::from("mid_csp_cbf/vcc/001"), 1, DishType::Ska);
        let mut results = vcc.executor.subscribe_result();
        let _ = vcc.configure_band(Band::Band1And2, sample_config());
        let event = results.recv().await.unwrap();
        assert_eq!(event.code, LrcResultCode::Ok);
        assert_eq!(vcc.obs.get(), ObsState::Ready);
        assert_eq!(vcc.current_band(), Some(Band::Band1And2));

        let _ = vcc.scan(42);
        let event = tokio::time::timeout(Duration::from_secs(1), results.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.code, LrcResultCode::Ok);
        assert_eq!(vcc.obs.get(), ObsState::Scanning);
    }

    #[tokio::test]
    async fn second_band_change_rejected_mid_transition() {
        let vcc = VccNode::new(Fqdn::from("mid_csp_cbf/vcc/002"), 2, DishType::Ska);
        vcc.state.lock().band_transition_in_progress = true;
        let mut results = vcc.executor.subscribe_result();
        let _ = vcc.configure_band(Band::Band3, sample_config());
        let event = results.recv().await.unwrap();
        assert_eq!(event.code, LrcResultCode::NotAllowed);
    }

    #[test]
    fn assign_rejects_conflicting_subarray() {
        let vcc = VccNode::new(Fqdn::from("mid_csp_cbf/vcc/003"), 3, DishType::Ska);
        vcc.assign(1).unwrap();
        assert!(vcc.assign(2).is_err());
        vcc.assign(1).unwrap();
    }

    #[test]
    fn configure_band_rejects_unsupported_dish_type() {
        let vcc = VccNode::new(Fqdn::from("mid_csp_cbf/vcc/004"), 4, DishType::MeerKatExtension);
        let err = vcc.configure_band(Band::Band5a, sample_config()).unwrap_err();
        assert_eq!(err.0, LrcResultCode::NotAllowed);
        assert_eq!(vcc.current_band(), None);

        let vcc = VccNode::new(Fqdn::from("mid_csp_cbf/vcc/005"), 5, DishType::MeerKatExtension);
        assert!(vcc.configure_band(Band::Band1And2, sample_config()).is_ok());
    }

    #[tokio::test]
    async fn set_internal_gain_requires_configured_band() {
        let vcc = VccNode::new(Fqdn::from("mid_csp_cbf/vcc/006"), 6, DishType::Ska);
        assert!(vcc.set_internal_gain(vec![1.0, 1.0]).is_err());

        let mut results = vcc.executor.subscribe_result();
        let _ = vcc.configure_band(Band::Band1And2, sample_config());
        results.recv().await.unwrap();

        vcc.set_internal_gain(vec![0.8, 0.9, 1.0]).unwrap();
        assert_eq!(vcc.internal_gain(), vec![0.8, 0.9, 1.0]);
    }
}
