//! The three state models shared by every node (spec §4.1).
//!
//! Each model is guarded by its own mutex, independent of the other
//! two, and rejected transitions leave the model unchanged and raise
//! [`crate::error::McsError::StateModelViolation`].

use crate::error::{McsError, McsResult};
use crate::fqdn::Fqdn;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Administrative mode. Writable, memorized across restarts (see
/// [`crate::memo`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdminMode {
    Offline,
    Online,
    Engineering,
    Reserved,
    NotFitted,
    Unknown,
}

/// Operational state, derived from communication status and power
/// state, not directly commanded (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpState {
    Init,
    Off,
    Standby,
    On,
    Fault,
    Disable,
    Unknown,
    Alarm,
}

/// Observation state. Observing nodes only; transitions are driven
/// exclusively by observation commands (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObsState {
    Empty,
    Resourcing,
    Idle,
    Configuring,
    Ready,
    Scanning,
    Aborting,
    Aborted,
    Resetting,
    Restarting,
    Fault,
}

/// Middleware-reported communication status, one of the two inputs to
/// [`compute_op_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommStatus {
    Disabled,
    NotEstablished,
    Established,
}

/// Driver-reported power state, the other input to [`compute_op_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    Off,
    On,
    Standby,
    Unknown,
}

/// Derive the operational state from admin mode, comm status and
/// power state per spec §4.1: `OFFLINE` admin forces `DISABLE`
/// regardless of the other two inputs (invariant 7 in spec §3).
pub fn compute_op_state(admin: AdminMode, comm: CommStatus, power: PowerState) -> OpState {
    if admin == AdminMode::Offline {
        return OpState::Disable;
    }
    match comm {
        CommStatus::Disabled | CommStatus::NotEstablished => OpState::Unknown,
        CommStatus::Established => match power {
            PowerState::Off => OpState::Off,
            PowerState::On => OpState::On,
            PowerState::Standby => OpState::Standby,
            PowerState::Unknown => OpState::Unknown,
        },
    }
}

/// A mutex-guarded state value with transition validation.
///
/// Used directly for the observation model (transitions are validated
/// against an explicit allowed-from set per command) and as a plain
/// cell for the admin/operational models (which are either freely
/// writable or purely derived).
pub struct StateModel<S> {
    node: Fqdn,
    name: &'static str,
    state: Mutex<S>,
}

impl<S: Copy + Eq + Debug> StateModel<S> {
    pub fn new(node: Fqdn, name: &'static str, initial: S) -> Self {
        Self {
            node,
            name,
            state: Mutex::new(initial),
        }
    }

    pub fn get(&self) -> S {
        *self.state.lock()
    }

    /// Unconditionally set the state, used for admin-mode writes and
    /// operational-state recomputation, which have no from-set to
    /// validate against.
    pub fn set(&self, to: S) -> S {
        let mut guard = self.state.lock();
        let from = *guard;
        *guard = to;
        if format!("{from:?}") != format!("{to:?}") {
            tracing::info!(node = %self.node, model = self.name, ?from, ?to, "state set");
        }
        from
    }

    /// Validate `current ∈ allowed_from` before moving to `to`; leaves
    /// the state untouched and returns `StateModelViolation` otherwise.
    pub fn try_transition(
        &self,
        command: &'static str,
        allowed_from: &[S],
        to: S,
    ) -> McsResult<S> {
        let mut guard = self.state.lock();
        if allowed_from.contains(&guard) {
            let from = *guard;
            *guard = to;
            tracing::info!(
                node = %self.node,
                model = self.name,
                command,
                ?from,
                to = ?to,
                "observation transition"
            );
            Ok(from)
        } else {
            Err(McsError::StateModelViolation {
                node: self.node.clone(),
                command,
                from: format!("{:?}", *guard),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_admin_forces_disable_regardless_of_power() {
        assert_eq!(
            compute_op_state(AdminMode::Offline, CommStatus::Established, PowerState::On),
            OpState::Disable
        );
    }

    #[test]
    fn established_comm_reflects_power() {
        assert_eq!(
            compute_op_state(AdminMode::Online, CommStatus::Established, PowerState::On),
            OpState::On
        );
        assert_eq!(
            compute_op_state(AdminMode::Online, CommStatus::Established, PowerState::Standby),
            OpState::Standby
        );
    }

    #[test]
    fn disabled_comm_is_unknown() {
        assert_eq!(
            compute_op_state(AdminMode::Online, CommStatus::Disabled, PowerState::On),
            OpState::Unknown
        );
    }

    #[test]
    fn try_transition_rejects_illegal_from_state_unchanged() {
        let model = StateModel::new(Fqdn::from("d/f/1"), "obsState", ObsState::Idle);
        let err = model
            .try_transition("Scan", &[ObsState::Ready], ObsState::Scanning)
            .unwrap_err();
        assert!(matches!(err, McsError::StateModelViolation { .. }));
        assert_eq!(model.get(), ObsState::Idle);
    }

    #[test]
    fn try_transition_accepts_legal_from_state() {
        let model = StateModel::new(Fqdn::from("d/f/1"), "obsState", ObsState::Ready);
        model
            .try_transition("Scan", &[ObsState::Ready], ObsState::Scanning)
            .unwrap();
        assert_eq!(model.get(), ObsState::Scanning);
    }
}
