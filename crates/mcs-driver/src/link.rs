//! Link-health probe: bit-error-rate sampling and idle-word push for a
//! SLIM (lightweight inter-FPGA) link.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

/// Deadline for a SLIM link to reach block-alignment + CDR-lock +
/// matching idle words after configuration (spec §4.8).
pub const LINK_CONFIGURE_DEADLINE: Duration = Duration::from_secs(5);

/// Rolled-up link health, worst observation wins when aggregated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LinkHealth {
    Ok = 0,
    Degraded = 1,
    Failed = 2,
}

impl LinkHealth {
    pub fn worst(self, other: Self) -> Self {
        self.max(other)
    }
}

/// A single sample taken from the link's physical layer.
#[derive(Debug, Clone, Copy)]
pub struct LinkSample {
    pub block_aligned: bool,
    pub cdr_locked: bool,
    pub idle_words_match: bool,
    pub bit_error_rate: f64,
}

impl LinkSample {
    pub fn health(&self) -> LinkHealth {
        if !self.block_aligned || !self.cdr_locked || !self.idle_words_match {
            return LinkHealth::Failed;
        }
        if self.bit_error_rate > 1e-9 {
            LinkHealth::Degraded
        } else {
            LinkHealth::Ok
        }
    }
}

#[async_trait]
pub trait LinkHealthProbe: Send + Sync {
    /// Push a hashed idle control word to an endpoint and wait for the
    /// link to settle, returning the settled sample or `None` if the
    /// [`LINK_CONFIGURE_DEADLINE`] elapses first.
    async fn configure_endpoint(&self, endpoint: &str, idle_word: u64) -> Option<LinkSample>;

    /// Take an ad-hoc sample of an already-configured endpoint.
    async fn sample(&self, endpoint: &str) -> LinkSample;
}

/// Simulator twin. Endpoints default to a healthy, locked state;
/// tests mark specific endpoints as failing to exercise §8 scenarios.
pub struct SimLinkHealthProbe {
    samples: Mutex<HashMap<String, LinkSample>>,
    latency: Duration,
}

impl Default for SimLinkHealthProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SimLinkHealthProbe {
    pub fn new() -> Self {
        Self {
            samples: Mutex::new(HashMap::new()),
            latency: Duration::from_millis(5),
        }
    }

    fn healthy_sample() -> LinkSample {
        LinkSample {
            block_aligned: true,
            cdr_locked: true,
            idle_words_match: true,
            bit_error_rate: 0.0,
        }
    }

    pub fn set_sample(&self, endpoint: impl Into<String>, sample: LinkSample) {
        self.samples.lock().insert(endpoint.into(), sample);
    }

    pub fn mark_failed(&self, endpoint: impl Into<String>) {
        self.set_sample(
            endpoint,
            LinkSample {
                block_aligned: false,
                cdr_locked: false,
                idle_words_match: false,
                bit_error_rate: 1.0,
            },
        );
    }
}

#[async_trait]
impl LinkHealthProbe for SimLinkHealthProbe {
    async fn configure_endpoint(&self, endpoint: &str, _idle_word: u64) -> Option<LinkSample> {
        tokio::time::sleep(self.latency).await;
        let sample = self
            .samples
            .lock()
            .get(endpoint)
            .copied()
            .unwrap_or_else(Self::healthy_sample);
        if sample.health() == LinkHealth::Failed {
            None
        } else {
            self.samples.lock().entry(endpoint.to_string()).or_insert(sample);
            Some(sample)
        }
    }

    async fn sample(&self, endpoint: &str) -> LinkSample {
        tokio::time::sleep(self.latency).await;
        self.samples
            .lock()
            .get(endpoint)
            .copied()
            .unwrap_or_else(Self::healthy_sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worst_wins() {
        assert_eq!(LinkHealth::Ok.worst(LinkHealth::Degraded), LinkHealth::Degraded);
        assert_eq!(LinkHealth::Degraded.worst(LinkHealth::Failed), LinkHealth::Failed);
        assert_eq!(LinkHealth::Ok.worst(LinkHealth::Ok), LinkHealth::Ok);
    }

    #[tokio::test]
    async fn healthy_endpoint_configures() {
        let probe = SimLinkHealthProbe::new();
        let sample = probe.configure_endpoint("tx0", 0xDEAD_BEEF).await;
        assert!(sample.is_some());
        assert_eq!(sample.unwrap().health(), LinkHealth::Ok);
    }

    #[tokio::test]
    async fn failed_endpoint_times_out() {
        let probe = SimLinkHealthProbe::new();
        probe.mark_failed("tx1");
        assert!(probe.configure_endpoint("tx1", 0).await.is_none());
    }
}
