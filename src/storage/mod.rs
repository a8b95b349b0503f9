//! Persistent storage
//!
//! Locates the application data directory and persists user settings.

use std::path::PathBuf;
use thiserror::Error;

pub mod settings;

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to access data directory: {0}")]
    DataDirError(String),
    #[error("Failed to read file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to serialize/deserialize JSON: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Get the application data directory
///
/// Returns the platform-specific application data directory:
/// - Windows: `C:\Users\{user}\AppData\Roaming\QIMP\MOOSE\data`
/// - macOS: `/Users/{user}/Library/Application Support/at.ac.meduniwien.QIMP.MOOSE`
/// - Linux: `/home/{user}/.local/share/moose`
pub fn get_data_dir() -> Result<PathBuf, StorageError> {
    directories::ProjectDirs::from("at.ac.meduniwien", "QIMP", "MOOSE")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| StorageError::DataDirError("Could not determine data directory".to_string()))
}

/// Default location of the trained nnU-Net models
pub fn default_models_dir() -> PathBuf {
    get_data_dir()
        .map(|dir| dir.join("models").join("nnunet_trained_models"))
        .unwrap_or_else(|_| PathBuf::from("./models/nnunet_trained_models"))
}

/// Create the models directory if it does not exist yet
pub fn init_storage(models_dir: &std::path::Path) -> Result<(), StorageError> {
    std::fs::create_dir_all(models_dir)?;
    tracing::info!("Initialized models directory at: {}", models_dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_models_dir() {
        let dir = default_models_dir();
        assert!(dir.ends_with("models/nnunet_trained_models"));
    }

    #[test]
    fn test_init_storage_creates_nested_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let models_dir = temp_dir.path().join("models").join("nnunet_trained_models");

        init_storage(&models_dir).unwrap();
        init_storage(&models_dir).unwrap();

        assert!(models_dir.is_dir());
    }
}
