//! Driver adapters for the hardware the Master Control System controls.
//!
//! Spec §1 treats these as external collaborators: the power-switch
//! HTTP driver and the FPGA bitstream uploader are leaf adapters
//! consumed by the core through the narrow interfaces defined here.
//!
//! Each driver ships as a trait plus a simulator implementation
//! selected at runtime by a node's `simulationMode` attribute
//! (spec §9); a production implementation exists behind a cargo
//! feature so the default build never needs real hardware or network
//! access.
//!
//! ```text
//! PowerDriver        -- PDU outlet on/off/state           (§6)
//! BoardProvisioner    -- bitstream upload + master boot    (§6)
//! LinkHealthProbe     -- SLIM idle-word push + BER sampling (§4.8)
//! ```

pub mod board;
pub mod error;
pub mod link;
pub mod power;

pub use board::{BoardProvisioner, SimBoardProvisioner, PROVISION_TIMEOUT};
pub use error::{DriverError, DriverResult};
pub use link::{LinkHealth, LinkHealthProbe, LinkSample, SimLinkHealthProbe, LINK_CONFIGURE_DEADLINE};
pub use power::{OutletState, PowerDriver, SimPowerDriver, POWER_CALL_TIMEOUT};

#[cfg(feature = "production")]
pub use power::HttpPowerDriver;
