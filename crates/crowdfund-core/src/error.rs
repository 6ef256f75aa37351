use serde::Serialize;
use thiserror::Error;

use crate::address::AddressParseError;
use crate::dispatcher::ActionKind;
use crate::gateway::GatewayError;
use crate::units::InvalidAmount;

/// Canonical error type of the catalog, dashboard and dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CrowdfundError {
    /// Malformed user input, detected before any remote call.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A ledger read failed.
    #[error("ledger read `{operation}` failed: {source}")]
    GatewayRead {
        operation: String,
        source: GatewayError,
    },

    /// A transaction was rejected by the ledger or by the signer.
    #[error("ledger write `{operation}` failed: {source}")]
    GatewayWrite {
        operation: String,
        source: GatewayError,
    },

    /// The current account is not authorized for the action.
    #[error("not permitted: {0}")]
    Permission(String),

    /// A previous dispatch has not settled yet.
    #[error("`{0}` is still pending")]
    Busy(ActionKind),
}

impl CrowdfundError {
    pub(crate) fn read(operation: impl Into<String>, source: GatewayError) -> Self {
        Self::GatewayRead {
            operation: operation.into(),
            source,
        }
    }

    pub(crate) fn write(operation: impl Into<String>, source: GatewayError) -> Self {
        Self::GatewayWrite {
            operation: operation.into(),
            source,
        }
    }

    /// True when a transaction was sent but its outcome is unknown, so the
    /// ledger may already reflect it.
    pub fn is_unconfirmed_write(&self) -> bool {
        matches!(
            self,
            Self::GatewayWrite {
                source: GatewayError::Unconfirmed { .. },
                ..
            }
        )
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::GatewayRead { .. } => ErrorKind::GatewayRead,
            Self::GatewayWrite { .. } => ErrorKind::GatewayWrite,
            Self::Permission(_) => ErrorKind::Permission,
            Self::Busy(_) => ErrorKind::Busy,
        }
    }
}

impl From<InvalidAmount> for CrowdfundError {
    fn from(err: InvalidAmount) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<AddressParseError> for CrowdfundError {
    fn from(err: AddressParseError) -> Self {
        Self::Validation(err.to_string())
    }
}

/// Payload-free discriminant of [`CrowdfundError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    GatewayRead,
    GatewayWrite,
    Permission,
    Busy,
}
