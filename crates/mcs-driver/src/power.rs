//! Power-switch driver: `turn_on_outlet` / `turn_off_outlet` / `get_outlet_state`.
//!
//! Spec §6 gives this driver a 4s per-call timeout budget and requires
//! calls to be serialized; both are enforced here rather than left to
//! callers, so every implementation (simulated or real) behaves the
//! same way under load.

use crate::error::{DriverError, DriverResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

/// Per-call timeout budget from spec §6.
pub const POWER_CALL_TIMEOUT: Duration = Duration::from_secs(4);

/// Observed state of a single PDU outlet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutletState {
    On,
    Off,
    Unknown,
}

/// Uniform interface to an external power distribution unit.
///
/// Calls are serialized by the driver itself (a single in-flight
/// request at a time) to match the "calls serialised" contract in
/// spec §6; callers do not need their own mutex around a `PowerDriver`.
#[async_trait]
pub trait PowerDriver: Send + Sync {
    async fn turn_on_outlet(&self, id: u32) -> DriverResult<()>;
    async fn turn_off_outlet(&self, id: u32) -> DriverResult<()>;
    async fn get_outlet_state(&self, id: u32) -> DriverResult<OutletState>;
    async fn list_outlets(&self) -> DriverResult<Vec<u32>>;
}

/// Simulator twin. Behaviourally equivalent to a real PDU driver: same
/// error classes, same timing lower bound (a small fixed latency per
/// call), so test suites exercise the identical command-engine code
/// paths a production deployment would.
pub struct SimPowerDriver {
    outlets: Mutex<HashMap<u32, OutletState>>,
    /// Outlet ids that should report `Refused` on the next on/off call,
    /// used by tests that need a driver to fail (spec §8 S5).
    fail_on_command: Mutex<Vec<u32>>,
    latency: Duration,
}

impl SimPowerDriver {
    pub fn new(outlet_ids: impl IntoIterator<Item = u32>) -> Self {
        let outlets = outlet_ids
            .into_iter()
            .map(|id| (id, OutletState::Off))
            .collect();
        Self {
            outlets: Mutex::new(outlets),
            fail_on_command: Mutex::new(Vec::new()),
            latency: Duration::from_millis(5),
        }
    }

    /// Seed an outlet's state directly, used to model pre-existing
    /// inconsistent hardware state (spec §8 S6).
    pub fn set_state(&self, id: u32, state: OutletState) {
        self.outlets.lock().insert(id, state);
    }

    /// Make the next `turn_on_outlet`/`turn_off_outlet` call for `id` fail.
    pub fn fail_next_command_for(&self, id: u32) {
        self.fail_on_command.lock().push(id);
    }

    fn should_fail(&self, id: u32) -> bool {
        let mut failing = self.fail_on_command.lock();
        if let Some(pos) = failing.iter().position(|&x| x == id) {
            failing.remove(pos);
            true
        } else {
            false
        }
    }
}

#[async_trait]
impl PowerDriver for SimPowerDriver {
    async fn turn_on_outlet(&self, id: u32) -> DriverResult<()> {
        tokio::time::sleep(self.latency).await;
        if !self.outlets.lock().contains_key(&id) {
            return Err(DriverError::UnknownOutlet(id));
        }
        if self.should_fail(id) {
            return Err(DriverError::Refused(format!("outlet {id} rejected power-on")));
        }
        self.outlets.lock().insert(id, OutletState::On);
        Ok(())
    }

    async fn turn_off_outlet(&self, id: u32) -> DriverResult<()> {
        tokio::time::sleep(self.latency).await;
        if !self.outlets.lock().contains_key(&id) {
            return Err(DriverError::UnknownOutlet(id));
        }
        if self.should_fail(id) {
            return Err(DriverError::Refused(format!("outlet {id} rejected power-off")));
        }
        self.outlets.lock().insert(id, OutletState::Off);
        Ok(())
    }

    async fn get_outlet_state(&self, id: u32) -> DriverResult<OutletState> {
        tokio::time::sleep(self.latency).await;
        self.outlets
            .lock()
            .get(&id)
            .copied()
            .ok_or(DriverError::UnknownOutlet(id))
    }

    async fn list_outlets(&self) -> DriverResult<Vec<u32>> {
        Ok(self.outlets.lock().keys().copied().collect())
    }
}

/// Production driver: talks to the PDU's HTTP control plane.
///
/// Behind the `production` feature so that the default build (CI, the
/// scenario runner, the test suite) never pulls in `reqwest`.
#[cfg(feature = "production")]
pub struct HttpPowerDriver {
    client: reqwest::Client,
    base_url: String,
}

#[cfg(feature = "production")]
impl HttpPowerDriver {
    pub fn new(base_url: impl Into<String>) -> DriverResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(POWER_CALL_TIMEOUT)
            .build()
            .map_err(|e| DriverError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[cfg(feature = "production")]
#[async_trait]
impl PowerDriver for HttpPowerDriver {
    async fn turn_on_outlet(&self, id: u32) -> DriverResult<()> {
        self.client
            .post(format!("{}/outlet/{id}/on", self.base_url))
            .send()
            .await
            .map_err(|e| DriverError::Transport(e.to_string()))?
            .error_for_status()
            .map_err(|e| DriverError::Refused(e.to_string()))?;
        Ok(())
    }

    async fn turn_off_outlet(&self, id: u32) -> DriverResult<()> {
        self.client
            .post(format!("{}/outlet/{id}/off", self.base_url))
            .send()
            .await
            .map_err(|e| DriverError::Transport(e.to_string()))?
            .error_for_status()
            .map_err(|e| DriverError::Refused(e.to_string()))?;
        Ok(())
    }

    async fn get_outlet_state(&self, id: u32) -> DriverResult<OutletState> {
        let resp = self
            .client
            .get(format!("{}/outlet/{id}", self.base_url))
            .send()
            .await
            .map_err(|e| DriverError::Transport(e.to_string()))?;
        let text = resp
            .text()
            .await
            .map_err(|e| DriverError::Transport(e.to_string()))?;
        Ok(match text.trim() {
            "on" => OutletState::On,
            "off" => OutletState::Off,
            _ => OutletState::Unknown,
        })
    }

    async fn list_outlets(&self) -> DriverResult<Vec<u32>> {
        let resp: Vec<u32> = self
            .client
            .get(format!("{}/outlets", self.base_url))
            .send()
            .await
            .map_err(|e| DriverError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| DriverError::Transport(e.to_string()))?;
        Ok(resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn simulator_reflects_seeded_state() {
        let drv = SimPowerDriver::new([1, 2]);
        drv.set_state(1, OutletState::On);
        assert_eq!(drv.get_outlet_state(1).await.unwrap(), OutletState::On);
        assert_eq!(drv.get_outlet_state(2).await.unwrap(), OutletState::Off);
    }

    #[tokio::test]
    async fn turn_on_then_off_round_trips() {
        let drv = SimPowerDriver::new([1]);
        drv.turn_on_outlet(1).await.unwrap();
        assert_eq!(drv.get_outlet_state(1).await.unwrap(), OutletState::On);
        drv.turn_off_outlet(1).await.unwrap();
        assert_eq!(drv.get_outlet_state(1).await.unwrap(), OutletState::Off);
    }

    #[tokio::test]
    async fn unknown_outlet_errors() {
        let drv = SimPowerDriver::new([1]);
        assert!(matches!(
            drv.get_outlet_state(99).await,
            Err(DriverError::UnknownOutlet(99))
        ));
    }

    #[tokio::test]
    async fn fail_next_command_injects_one_failure() {
        let drv = SimPowerDriver::new([1]);
        drv.fail_next_command_for(1);
        assert!(drv.turn_on_outlet(1).await.is_err());
        // second attempt succeeds, the injected failure was consumed
        drv.turn_on_outlet(1).await.unwrap();
    }
}
