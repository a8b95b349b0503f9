//! Crate-level error type

use thiserror::Error;

use crate::inference::InferenceError;
use crate::models::RegistryError;
use crate::output::OutputError;
use crate::storage::StorageError;

/// Any failure a MOOSE run can end with
#[derive(Debug, Error)]
pub enum MooseError {
    #[error(transparent)]
    Output(#[from] OutputError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Inference(#[from] InferenceError),
}

pub type Result<T> = std::result::Result<T, MooseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_pass_through() {
        let err: MooseError = RegistryError::UnknownModel("clin_ct_brain".to_string()).into();
        assert_eq!(err.to_string(), "Unknown model: 'clin_ct_brain'");

        let err: MooseError = OutputError::InvalidConfiguration("bad style".to_string()).into();
        assert!(matches!(err, MooseError::Output(_)));
    }
}
