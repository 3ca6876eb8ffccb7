//! JSON wire documents consumed by the core (spec §6).
//!
//! JSON-schema validation itself is an external collaborator (spec
//! §1); these types enforce only the semantic checks the core owns.

pub mod scanconfig;
pub mod sysparam;

pub use scanconfig::{CbfBlock, CommonBlock, FspConfig, FunctionMode, ScanConfigDocument, SearchWindow};
pub use sysparam::{DishParameter, SysParamDocument};
