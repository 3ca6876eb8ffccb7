//! Error type shared by every driver in this crate.

use thiserror::Error;

/// Failure returned by a driver call.
///
/// Every variant maps to the `DriverError` kind in the core error
/// taxonomy; this crate keeps its own enum so driver implementations
/// don't need to depend on `mcs-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DriverError {
    #[error("driver call to {0} timed out")]
    Timeout(&'static str),

    #[error("outlet {0} not recognized by this PDU")]
    UnknownOutlet(u32),

    #[error("hardware refused the request: {0}")]
    Refused(String),

    #[error("transport error talking to driver backend: {0}")]
    Transport(String),
}

pub type DriverResult<T> = Result<T, DriverError>;
