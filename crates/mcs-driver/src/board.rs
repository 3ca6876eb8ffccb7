//! Board provisioner: bitstream upload + master boot for a LRU's board.

use crate::error::{DriverError, DriverResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::time::Duration;

/// Provisioning may take up to 60s per spec §6.
pub const PROVISION_TIMEOUT: Duration = Duration::from_secs(60);

#[async_trait]
pub trait BoardProvisioner: Send + Sync {
    async fn configure_board(
        &self,
        target_ip: &str,
        bitstream_path: &str,
        device_server_list: &[String],
        master_fqdn: &str,
    ) -> DriverResult<()>;
}

/// Simulator twin. Succeeds immediately unless `target_ip` has been
/// marked to fail via [`SimBoardProvisioner::fail_target`].
#[derive(Default)]
pub struct SimBoardProvisioner {
    failing_targets: Mutex<HashSet<String>>,
    /// Targets that never respond, used by S4 (configure timeout) to
    /// model an unresponsive board.
    hanging_targets: Mutex<HashSet<String>>,
    latency: Duration,
}

impl SimBoardProvisioner {
    pub fn new() -> Self {
        Self {
            failing_targets: Mutex::new(HashSet::new()),
            hanging_targets: Mutex::new(HashSet::new()),
            latency: Duration::from_millis(10),
        }
    }

    pub fn fail_target(&self, target_ip: impl Into<String>) {
        self.failing_targets.lock().insert(target_ip.into());
    }

    pub fn hang_target(&self, target_ip: impl Into<String>) {
        self.hanging_targets.lock().insert(target_ip.into());
    }
}

#[async_trait]
impl BoardProvisioner for SimBoardProvisioner {
    async fn configure_board(
        &self,
        target_ip: &str,
        _bitstream_path: &str,
        _device_server_list: &[String],
        _master_fqdn: &str,
    ) -> DriverResult<()> {
        if self.hanging_targets.lock().contains(target_ip) {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(self.latency).await;
        if self.failing_targets.lock().contains(target_ip) {
            return Err(DriverError::Refused(format!(
                "board at {target_ip} refused provisioning"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn succeeds_by_default() {
        let drv = SimBoardProvisioner::new();
        drv.configure_board("10.0.0.1", "/bits/a.bit", &[], "master")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn marked_target_fails() {
        let drv = SimBoardProvisioner::new();
        drv.fail_target("10.0.0.2");
        assert!(drv
            .configure_board("10.0.0.2", "/bits/a.bit", &[], "master")
            .await
            .is_err());
    }
}
