//! Node models and orchestration logic for the Master Control System
//! (spec §2-§5): the device tree (Controller/Subarray/VCC/FSP/LRU/
//! SlimLink), the three state models every node shares, the
//! long-running-command engine, and the in-process node registry.
//!
//! Binary crates (`mcs-controller`, `mcs-subarray`, ...) wire these
//! types up behind a CLI and a config file; `mcs-sim` assembles a
//! whole tree in one process for integration scenarios.

pub mod controller;
pub mod docs;
pub mod error;
pub mod fqdn;
pub mod fsp;
pub mod hardware;
pub mod health;
pub mod lrc;
pub mod memo;
pub mod registry;
pub mod state;
pub mod subarray;
pub mod vcc;

pub use controller::ControllerNode;
pub use error::{McsError, McsResult};
pub use fqdn::Fqdn;
pub use fsp::{FspModeNode, FspModeParams, FspNode};
pub use hardware::{LruNode, SlimLinkNode};
pub use health::HealthState;
pub use lrc::{BlockingSet, CancelToken, CommandId, Executor, LrcResultCode, LrcStatus};
pub use memo::MemoStore;
pub use registry::{Registry, Transport};
pub use state::{AdminMode, ObsState, OpState, StateModel};
pub use subarray::SubarrayNode;
pub use vcc::{Band, BandConfig, DishType, VccNode};
