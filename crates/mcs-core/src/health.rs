//! Health-state rollup (supplemented in SPEC_FULL.md §C).
//!
//! `healthState` is named as an attribute on every node in spec §6 but
//! its derivation is left unspecified there. Hardware leaves derive it
//! from operational state; composite nodes roll up the worst health of
//! their current children, generalizing SlimLink's documented
//! "worst wins" rule (spec §4.8) to every node kind.

use crate::state::OpState;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HealthState {
    Ok = 0,
    Degraded = 1,
    Failed = 2,
    Unknown = 3,
}

impl HealthState {
    pub fn worst(self, other: Self) -> Self {
        self.max(other)
    }

    pub fn rollup(children: impl IntoIterator<Item = HealthState>) -> HealthState {
        children
            .into_iter()
            .fold(HealthState::Ok, HealthState::worst)
    }

    pub fn from_op_state(op: OpState) -> HealthState {
        match op {
            OpState::On | OpState::Standby => HealthState::Ok,
            OpState::Fault | OpState::Alarm => HealthState::Failed,
            OpState::Off | OpState::Disable => HealthState::Ok,
            OpState::Init | OpState::Unknown => HealthState::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rollup_picks_worst() {
        let h = HealthState::rollup([HealthState::Ok, HealthState::Degraded, HealthState::Ok]);
        assert_eq!(h, HealthState::Degraded);
    }

    #[test]
    fn rollup_of_empty_is_ok() {
        assert_eq!(HealthState::rollup(std::iter::empty()), HealthState::Ok);
    }

    #[test]
    fn fault_maps_to_failed() {
        assert_eq!(HealthState::from_op_state(OpState::Fault), HealthState::Failed);
    }
}
