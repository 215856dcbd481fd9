use stratus_core::{ErrorResponse, PlacementError, ProviderError};
use thiserror::Error;

/// Provisioner specific errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProvisionerError {
    #[error(transparent)]
    PlacementConflict(#[from] PlacementError),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("VM creation failed: {message}")]
    VmCreationFailed { message: String, ok_to_retry: bool },
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("Timeout: {0}")]
    Timeout(String),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl ProvisionerError {
    pub fn vm_creation_failed(message: impl Into<String>, ok_to_retry: bool) -> Self {
        ProvisionerError::VmCreationFailed {
            message: message.into(),
            ok_to_retry,
        }
    }

    /// Only VM creation failures can be flagged as safe to retry.
    pub fn ok_to_retry(&self) -> bool {
        matches!(
            self,
            ProvisionerError::VmCreationFailed {
                ok_to_retry: true,
                ..
            }
        )
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ProvisionerError::PlacementConflict(_) => "PLACEMENT_CONFLICT",
            ProvisionerError::ValidationError(_) => "VALIDATION_ERROR",
            ProvisionerError::VmCreationFailed { .. } => "VM_CREATION_FAILED",
            ProvisionerError::Provider(_) => "PROVIDER_ERROR",
            ProvisionerError::Timeout(_) => "TIMEOUT",
            ProvisionerError::ConfigurationError(_) => "CONFIGURATION_ERROR",
        }
    }
}

impl From<ProvisionerError> for ErrorResponse {
    fn from(err: ProvisionerError) -> Self {
        let code = err.error_code();
        let ok_to_retry = err.ok_to_retry();
        let message = match &err {
            ProvisionerError::PlacementConflict(conflict) => conflict.to_string(),
            ProvisionerError::ValidationError(msg)
            | ProvisionerError::Timeout(msg)
            | ProvisionerError::ConfigurationError(msg) => msg.clone(),
            ProvisionerError::VmCreationFailed { message, .. } => message.clone(),
            ProvisionerError::Provider(provider) => provider.to_string(),
        };

        ErrorResponse::new(code, message).retryable(ok_to_retry)
    }
}

pub type ProvisionerResult<T> = std::result::Result<T, ProvisionerError>;
