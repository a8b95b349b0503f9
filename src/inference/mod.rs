//! External nnU-Net runtime
//!
//! Segmentation itself runs in `nnUNetv2_predict`; this module only launches it.

pub mod predictor;

pub use predictor::{InferenceError, PredictorCommand, NNUNET_ENV_VARS};
