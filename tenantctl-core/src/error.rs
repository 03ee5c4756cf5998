//! Error taxonomy for tenancy operations

use std::time::Duration;
use thiserror::Error;

use crate::config::ConfigError;
use crate::kubernetes::{GatewayError, ObjectRef};

/// Errors returned by catalog, grant and lifecycle operations
#[derive(Debug, Error)]
pub enum TenancyError {
    /// Bad argument; nothing was sent to the cluster
    #[error("Validation error: {0}")]
    Validation(String),

    /// Target is not granted to the tenant; nothing was changed
    #[error("Target '{target}' is not granted to tenant '{tenant}'")]
    Authorization { tenant: String, target: String },

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// A deleted object was still observable when the wait ran out
    #[error("{object} still present after {after:?}")]
    ConvergenceTimeout { object: ObjectRef, after: Duration },

    #[error("{object} changed concurrently; gave up after {attempts} attempts")]
    ConflictRetriesExhausted { object: ObjectRef, attempts: u32 },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl TenancyError {
    pub fn validation(message: impl Into<String>) -> Self {
        TenancyError::Validation(message.into())
    }

    pub fn authorization(tenant: &str, target: &str) -> Self {
        TenancyError::Authorization {
            tenant: tenant.to_string(),
            target: target.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, TenancyError::Gateway(e) if e.is_not_found())
    }
}

impl From<tenantctl_common::Error> for TenancyError {
    fn from(err: tenantctl_common::Error) -> Self {
        TenancyError::Validation(err.to_string())
    }
}

/// Result type alias for tenancy operations
pub type TenancyResult<T> = std::result::Result<T, TenancyError>;
