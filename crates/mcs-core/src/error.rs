//! Error taxonomy shared by every node kind (spec §7).

use crate::fqdn::Fqdn;
use crate::lrc::CommandId;
use thiserror::Error;

/// The seven error kinds from spec §7, with enough payload for a
/// caller to act on them without re-parsing a message string.
#[derive(Debug, Error, Clone)]
pub enum McsError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("illegal command {command} from state {from:?} on {node}")]
    StateModelViolation {
        node: Fqdn,
        command: &'static str,
        from: String,
    },

    #[error("communication with {0} lost")]
    CommunicationLost(Fqdn),

    #[error("command {command_id} on {node} timed out waiting on {pending:?}")]
    Timeout {
        node: Fqdn,
        command_id: CommandId,
        pending: Vec<CommandId>,
    },

    #[error("partial failure: {succeeded} succeeded, {failed} failed ({detail})")]
    PartialFailure {
        succeeded: usize,
        failed: usize,
        detail: String,
    },

    #[error("configuration conflict: {0}")]
    ConfigurationConflict(String),

    #[error("driver error: {0}")]
    DriverError(String),
}

pub type McsResult<T> = Result<T, McsError>;

impl From<mcs_driver::DriverError> for McsError {
    fn from(e: mcs_driver::DriverError) -> Self {
        McsError::DriverError(e.to_string())
    }
}
