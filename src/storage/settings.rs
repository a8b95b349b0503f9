//! Settings storage
//!
//! Manages persistence of run configuration.

use crate::storage::{default_models_dir, get_data_dir, StorageError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Executable of the external nnU-Net prediction runtime
pub const DEFAULT_PREDICTOR: &str = "nnUNetv2_predict";

/// Run settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MooseSettings {
    /// Directory holding the extracted `DatasetNNN_*` model folders
    pub models_directory: PathBuf,
    /// Where session logs go; `None` means the current working directory
    pub log_directory: Option<PathBuf>,
    /// Print banners, tables and progress to the console
    pub verbose_console: bool,
    /// Write a session log file and capture nnU-Net output into it
    pub verbose_log: bool,
    /// nnU-Net prediction executable, looked up on `PATH` unless absolute
    pub predictor_executable: String,
}

impl Default for MooseSettings {
    fn default() -> Self {
        Self {
            models_directory: default_models_dir(),
            log_directory: None,
            verbose_console: true,
            verbose_log: true,
            predictor_executable: DEFAULT_PREDICTOR.to_string(),
        }
    }
}

impl MooseSettings {
    /// Validate settings values
    ///
    /// Replaces values the runtime cannot work with by their defaults
    pub fn validate(&mut self) {
        if self.models_directory.as_os_str().is_empty() {
            self.models_directory = default_models_dir();
        }

        if matches!(&self.log_directory, Some(dir) if dir.as_os_str().is_empty()) {
            self.log_directory = None;
        }

        if self.predictor_executable.trim().is_empty() {
            self.predictor_executable = DEFAULT_PREDICTOR.to_string();
        }
    }
}

/// Get the settings file path
fn get_settings_path() -> Result<PathBuf, StorageError> {
    Ok(get_data_dir()?.join("settings.json"))
}

/// Load settings from disk
///
/// Returns default settings if the file doesn't exist or is corrupted
pub fn load_settings() -> MooseSettings {
    let loaded = get_settings_path().and_then(|path| load_settings_from(&path));
    match loaded {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!("Failed to load settings, using defaults: {}", e);
            MooseSettings::default()
        }
    }
}

/// Load settings from a specific file, falling back to defaults when it is absent
pub fn load_settings_from(path: &Path) -> Result<MooseSettings, StorageError> {
    if !path.exists() {
        tracing::info!("Settings file not found, using defaults");
        return Ok(MooseSettings::default());
    }

    let json = fs::read_to_string(path)?;
    let mut settings: MooseSettings = serde_json::from_str(&json)?;

    // Validate loaded settings
    settings.validate();

    tracing::debug!("Loaded settings from {}", path.display());
    Ok(settings)
}

/// Save settings to disk
pub fn save_settings(settings: &MooseSettings) -> Result<(), StorageError> {
    save_settings_to(settings, &get_settings_path()?)
}

/// Save settings to a specific file
pub fn save_settings_to(settings: &MooseSettings, path: &Path) -> Result<(), StorageError> {
    // Ensure the parent directory exists
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(settings)?;
    fs::write(path, json)?;

    tracing::debug!("Saved settings to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = MooseSettings::default();
        assert!(settings.verbose_console);
        assert!(settings.verbose_log);
        assert_eq!(settings.log_directory, None);
        assert_eq!(settings.predictor_executable, "nnUNetv2_predict");
        assert!(settings.models_directory.ends_with("nnunet_trained_models"));
    }

    #[test]
    fn test_settings_validation() {
        let mut settings = MooseSettings {
            models_directory: PathBuf::new(),
            log_directory: Some(PathBuf::new()),
            verbose_console: false,
            verbose_log: false,
            predictor_executable: "  ".to_string(),
        };

        settings.validate();

        assert_eq!(settings.models_directory, default_models_dir());
        assert_eq!(settings.log_directory, None);
        assert_eq!(settings.predictor_executable, DEFAULT_PREDICTOR);
        assert!(!settings.verbose_console);
    }

    #[test]
    fn test_settings_persistence() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("settings.json");
        let settings = MooseSettings {
            models_directory: temp_dir.path().join("models"),
            log_directory: Some(temp_dir.path().join("logs")),
            verbose_console: false,
            verbose_log: true,
            predictor_executable: "/opt/nnunet/bin/nnUNetv2_predict".to_string(),
        };

        save_settings_to(&settings, &path).unwrap();
        let loaded = load_settings_from(&path).unwrap();

        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let loaded = load_settings_from(&temp_dir.path().join("settings.json")).unwrap();
        assert_eq!(loaded, MooseSettings::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        fs::write(&path, r#"{"verbose_log": false}"#).unwrap();

        let loaded = load_settings_from(&path).unwrap();

        assert!(!loaded.verbose_log);
        assert!(loaded.verbose_console);
        assert_eq!(loaded.predictor_executable, DEFAULT_PREDICTOR);
    }

    #[test]
    fn test_corrupted_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            load_settings_from(&path),
            Err(StorageError::JsonError(_))
        ));
    }
}
