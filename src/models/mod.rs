//! Pretrained model registry
//!
//! The registry is data, not code: a versioned JSON table embedded at build time. Adding a
//! model means adding one entry; the task number comes from the entry's `DatasetNNN_`
//! directory, so there is no second table to keep in sync.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Embedded registry table
const BUILTIN_REGISTRY: &str = include_str!("registry.json");

/// Registry format version this build understands
pub const REGISTRY_VERSION: u32 = 1;

/// nnU-Net configuration every MOOSE model is trained with
pub const NNUNET_CONFIGURATION: &str = "3d_fullres";

/// nnU-Net plans identifier every MOOSE model is trained with
pub const NNUNET_PLANS: &str = "nnUNetPlans";

static DATASET_DIRECTORY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Dataset([0-9]{3})_\S+$").expect("valid dataset pattern"));

/// Registry errors
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Unknown model: '{0}'")]
    UnknownModel(String),

    #[error("Failed to parse model registry: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Unsupported registry version {0}")]
    UnsupportedVersion(u32),

    #[error("Invalid registry entry '{name}': {reason}")]
    InvalidEntry { name: String, reason: String },
}

/// Download and training metadata of one pretrained model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Symbolic name, e.g. `clin_ct_organs`; filled from the table key
    #[serde(skip)]
    pub name: String,
    /// Where the zipped model can be downloaded
    pub url: String,
    /// Archive filename
    pub filename: String,
    /// Directory the archive extracts to (`DatasetNNN_<name>`)
    pub directory: String,
    /// nnU-Net trainer class the model was trained with
    pub trainer: String,
    /// Median voxel spacing from the model's plans, `[x, y, z]`
    pub voxel_spacing: [f64; 3],
    /// Prefix distinguishing this model's labels in multi-label output
    pub multilabel_prefix: String,
    /// "Clinical" or "Pre-clinical"
    pub imaging: String,
    pub modality: String,
    pub tissue: String,
}

impl ModelSpec {
    /// The three-digit dataset id nnU-Net uses as task number
    pub fn task_number(&self) -> &str {
        // validated when the registry is loaded
        &self.directory["Dataset".len().."Dataset".len() + 3]
    }

    /// `<models_root>/<directory>`
    pub fn model_directory(&self, models_root: &Path) -> PathBuf {
        models_root.join(&self.directory)
    }

    /// `<models_root>/<directory>/<trainer>__nnUNetPlans__3d_fullres`
    pub fn trainer_directory(&self, models_root: &Path) -> PathBuf {
        self.model_directory(models_root).join(format!(
            "{}__{}__{}",
            self.trainer, NNUNET_PLANS, NNUNET_CONFIGURATION
        ))
    }

    pub fn is_installed(&self, models_root: &Path) -> bool {
        self.model_directory(models_root).is_dir()
    }

    pub fn expected_modality(&self) -> ExpectedModality {
        ExpectedModality {
            model_name: self.name.clone(),
            imaging: self.imaging.clone(),
            modality: self.modality.clone(),
            tissue: self.tissue.clone(),
        }
    }

    fn validate(&self) -> Result<(), String> {
        if !DATASET_DIRECTORY.is_match(&self.directory) {
            return Err(format!(
                "directory '{}' does not look like DatasetNNN_<name>",
                self.directory
            ));
        }
        for (field, value) in [
            ("url", &self.url),
            ("filename", &self.filename),
            ("trainer", &self.trainer),
            ("modality", &self.modality),
        ] {
            if value.trim().is_empty() {
                return Err(format!("'{}' is empty", field));
            }
        }
        if self.voxel_spacing.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(format!(
                "voxel spacing {:?} must be positive",
                self.voxel_spacing
            ));
        }
        Ok(())
    }
}

/// What kind of image a model expects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedModality {
    pub model_name: String,
    pub imaging: String,
    pub modality: String,
    pub tissue: String,
}

#[derive(Deserialize)]
struct RegistryFile {
    version: u32,
    models: BTreeMap<String, ModelSpec>,
}

/// Lookup table of available models, ordered by name
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    version: u32,
    models: BTreeMap<String, ModelSpec>,
}

impl ModelRegistry {
    /// The registry shipped with this build
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::from_json(BUILTIN_REGISTRY)
    }

    /// Parse and validate a registry table
    pub fn from_json(json: &str) -> Result<Self, RegistryError> {
        let file: RegistryFile = serde_json::from_str(json)?;
        if file.version != REGISTRY_VERSION {
            return Err(RegistryError::UnsupportedVersion(file.version));
        }

        let mut models = file.models;
        for (name, spec) in models.iter_mut() {
            spec.name = name.clone();
            spec.validate().map_err(|reason| RegistryError::InvalidEntry {
                name: name.clone(),
                reason,
            })?;
        }

        tracing::debug!("Loaded model registry v{} with {} model(s)", file.version, models.len());
        Ok(Self {
            version: file.version,
            models,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Result<&ModelSpec, RegistryError> {
        self.models
            .get(name)
            .ok_or_else(|| RegistryError::UnknownModel(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    pub fn task_number(&self, name: &str) -> Result<&str, RegistryError> {
        Ok(self.get(name)?.task_number())
    }

    pub fn expected_modality(&self, name: &str) -> Result<ExpectedModality, RegistryError> {
        self.get(name).map(ModelSpec::expected_modality)
    }
}
