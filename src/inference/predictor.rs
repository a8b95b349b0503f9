//! `nnUNetv2_predict` launcher
//!
//! Builds the prediction command for one model and device and runs it with its output
//! routed through the session's managed redirect.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use thiserror::Error;

use crate::models::{ModelSpec, NNUNET_CONFIGURATION};
use crate::output::{OutputError, OutputManager};
use crate::system::{Backend, DeviceReport};

/// Environment variables nnU-Net reads its folders from
pub const NNUNET_ENV_VARS: [&str; 3] = ["nnUNet_results", "nnUNet_raw", "nnUNet_preprocessed"];

/// Fold used for prediction; MOOSE models are trained on all folds
const FOLD: &str = "all";

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Failed to launch predictor: {0}")]
    Launch(#[source] std::io::Error),

    #[error("Predictor exited with {0}")]
    Failed(ExitStatus),

    #[error(transparent)]
    Output(#[from] OutputError),
}

/// One prediction run of a single model
#[derive(Debug, Clone)]
pub struct PredictorCommand {
    executable: String,
    task_number: String,
    trainer: String,
    backend: Backend,
    input: PathBuf,
    output: PathBuf,
    models_root: PathBuf,
}

impl PredictorCommand {
    pub fn new(
        executable: impl Into<String>,
        model: &ModelSpec,
        device: &DeviceReport,
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        models_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            executable: executable.into(),
            task_number: model.task_number().to_string(),
            trainer: model.trainer.clone(),
            backend: device.backend,
            input: input.into(),
            output: output.into(),
            models_root: models_root.into(),
        }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn models_root(&self) -> &Path {
        &self.models_root
    }

    /// Arguments passed after the executable
    pub fn args(&self) -> Vec<OsString> {
        vec![
            "-i".into(),
            self.input.clone().into_os_string(),
            "-o".into(),
            self.output.clone().into_os_string(),
            "-d".into(),
            self.task_number.clone().into(),
            "-c".into(),
            NNUNET_CONFIGURATION.into(),
            "-f".into(),
            FOLD.into(),
            "-tr".into(),
            self.trainer.clone().into(),
            "-device".into(),
            self.backend.as_str().into(),
        ]
    }

    /// The process to spawn, with nnU-Net's folder variables pointing at the models root
    pub fn build(&self) -> Command {
        let mut command = Command::new(&self.executable);
        command.args(self.args()).stdin(Stdio::null());
        for var in NNUNET_ENV_VARS {
            command.env(var, &self.models_root);
        }
        command
    }

    /// Printable form for logs
    pub fn command_line(&self) -> String {
        let mut line = self.executable.clone();
        for arg in self.args() {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }

    /// Run the predictor to completion inside the managed-output scope
    pub fn run(&self, output: &OutputManager) -> Result<(), InferenceError> {
        let command_line = self.command_line();
        output.log_update(&format!(" Running prediction: {}", command_line));
        tracing::info!("Launching {}", command_line);

        output.with_nnunet_output(|redirect| {
            let mut command = self.build();
            redirect.attach(&mut command).map_err(InferenceError::Launch)?;

            let status = command.status().map_err(InferenceError::Launch)?;
            if status.success() {
                tracing::debug!("Predictor finished with {}", status);
                Ok(())
            } else {
                tracing::warn!("Predictor failed with {}", status);
                Err(InferenceError::Failed(status))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelRegistry;
    use crate::output::console::testing::SharedBuffer;
    use crate::output::StreamTargets;
    use tempfile::TempDir;

    fn lungs_command(executable: &str, backend: Backend, models_root: &Path) -> PredictorCommand {
        let registry = ModelRegistry::builtin().unwrap();
        let model = registry.get("clin_ct_lungs").unwrap();
        let device = DeviceReport {
            backend,
            device_count: None,
        };
        PredictorCommand::new(executable, model, &device, "in", "out", models_root)
    }

    fn quiet_manager() -> OutputManager {
        OutputManager::with_writer(SharedBuffer::default(), false, false)
    }

    #[test]
    fn test_args() {
        let command = lungs_command("nnUNetv2_predict", Backend::Cuda, Path::new("/models"));
        assert_eq!(
            command.command_line(),
            "nnUNetv2_predict -i in -o out -d 333 -c 3d_fullres -f all \
             -tr nnUNetTrainer_2000epochs_NoMirroring -device cuda"
        );
    }

    #[test]
    fn test_environment_points_at_models_root() {
        let command = lungs_command("nnUNetv2_predict", Backend::Cpu, Path::new("/models"));
        let built = command.build();

        let envs: Vec<_> = built.get_envs().collect();
        assert_eq!(envs.len(), NNUNET_ENV_VARS.len());
        for (key, value) in envs {
            assert!(NNUNET_ENV_VARS.iter().any(|var| key == *var));
            assert_eq!(value, Some(Path::new("/models").as_os_str()));
        }
        assert!(built
            .get_args()
            .collect::<Vec<_>>()
            .windows(2)
            .any(|pair| pair[0] == "-device" && pair[1] == "cpu"));
    }

    #[test]
    fn test_missing_executable_is_launch_error() {
        let manager = quiet_manager();
        let command = lungs_command("moosez-no-such-predictor", Backend::Cpu, Path::new("/models"));

        let result = command.run(&manager);

        assert!(matches!(result, Err(InferenceError::Launch(_))));
        assert_eq!(manager.stream_targets(), StreamTargets::inherit());
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_is_failure() {
        let manager = quiet_manager();
        let command = lungs_command("false", Backend::Cpu, Path::new("/models"));

        let result = command.run(&manager);

        assert!(matches!(result, Err(InferenceError::Failed(status)) if !status.success()));
        assert_eq!(manager.stream_targets(), StreamTargets::inherit());
    }

    #[cfg(unix)]
    #[test]
    fn test_predictor_output_lands_in_nnunet_log() {
        let temp_dir = TempDir::new().unwrap();
        let mut manager = OutputManager::with_writer(SharedBuffer::default(), false, true);
        manager.configure_logging(Some(temp_dir.path())).unwrap();
        let command = lungs_command("echo", Backend::Cpu, temp_dir.path());

        command.run(&manager).unwrap();

        let captured = std::fs::read_to_string(manager.nnunet_log_path().unwrap()).unwrap();
        assert!(captured.contains("-d 333"));
        let session_log = std::fs::read_to_string(manager.log_file_path().unwrap()).unwrap();
        assert!(session_log.contains("Running prediction"));
    }
}
