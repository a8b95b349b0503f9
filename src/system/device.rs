//! Compute device selection
//!
//! Picks the backend predictions run on. CUDA wins over Apple MPS, and CPU is the fallback;
//! selection never fails.

use std::env;
use std::fmt;
use std::io;
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::output::OutputManager;

/// Execution backend for inference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Cpu,
    Cuda,
    #[serde(rename = "mps")]
    AppleGpu,
}

impl Backend {
    /// Device string understood by the nnU-Net runtime
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Cpu => "cpu",
            Backend::Cuda => "cuda",
            Backend::AppleGpu => "mps",
        }
    }

    pub fn is_accelerator(&self) -> bool {
        !matches!(self, Backend::Cpu)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of device selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceReport {
    pub backend: Backend,
    /// Number of visible GPUs; only known for CUDA
    pub device_count: Option<usize>,
}

/// Capability queries against the accelerator runtime
pub trait AcceleratorRuntime {
    fn cuda_is_available(&self) -> bool;
    fn cuda_device_count(&self) -> usize;
    fn mps_is_available(&self) -> bool;
    /// Whether this binary was built with MPS support at all
    fn mps_is_built(&self) -> bool;
}

/// Receives the one status line device selection emits
pub trait StatusReporter {
    fn report(&self, line: &str);
}

impl StatusReporter for OutputManager {
    fn report(&self, line: &str) {
        self.console_update(line);
        self.log_update(line.trim());
    }
}

/// Choose the backend in priority order: CUDA, MPS, then CPU.
///
/// The two CPU outcomes are reported differently: MPS missing from the build is not the
/// same as no accelerator being present.
pub fn select_device(
    runtime: &dyn AcceleratorRuntime,
    reporter: &dyn StatusReporter,
) -> DeviceReport {
    let report = if runtime.cuda_is_available() {
        let device_count = runtime.cuda_device_count();
        reporter.report(&format!(
            " CUDA is available with {} GPU(s). Predictions will be run on GPU.",
            device_count
        ));
        DeviceReport {
            backend: Backend::Cuda,
            device_count: Some(device_count),
        }
    } else if runtime.mps_is_available() {
        reporter.report(
            " Apple MPS backend is available. Predictions will be run on Apple Silicon GPU.",
        );
        DeviceReport {
            backend: Backend::AppleGpu,
            device_count: None,
        }
    } else if !runtime.mps_is_built() {
        reporter.report(
            " MPS not available because the current build was not compiled with MPS enabled. Predictions will be run on CPU.",
        );
        DeviceReport {
            backend: Backend::Cpu,
            device_count: None,
        }
    } else {
        reporter.report(" CUDA/MPS not available. Predictions will be run on CPU.");
        DeviceReport {
            backend: Backend::Cpu,
            device_count: None,
        }
    };

    tracing::info!(
        "Selected backend {} ({:?} device(s))",
        report.backend,
        report.device_count
    );
    report
}

/// Longest time the `nvidia-smi` probe may take before it counts as no GPU
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const PROBE_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Accelerator queries against the host.
///
/// CUDA devices are counted from `nvidia-smi -L` and limited by `CUDA_VISIBLE_DEVICES`.
/// MPS is considered built for macOS targets and available on Apple silicon.
#[derive(Debug, Default)]
pub struct SystemRuntime {
    gpu_count: OnceCell<usize>,
}

impl SystemRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn probe_gpus() -> usize {
        let mut command = Command::new("nvidia-smi");
        command.arg("-L");
        let output = match output_within(command, PROBE_TIMEOUT) {
            Ok(Some(output)) if output.status.success() => output,
            Ok(Some(output)) => {
                tracing::debug!("nvidia-smi exited with {}", output.status);
                return 0;
            }
            Ok(None) => {
                tracing::warn!(
                    "nvidia-smi did not answer within {:?}, assuming no CUDA device",
                    PROBE_TIMEOUT
                );
                return 0;
            }
            Err(e) => {
                tracing::debug!("nvidia-smi not usable: {}", e);
                return 0;
            }
        };

        let detected = count_listed_gpus(&String::from_utf8_lossy(&output.stdout));
        let visible = visible_device_limit(env::var("CUDA_VISIBLE_DEVICES").ok().as_deref());
        let count = visible.map_or(detected, |limit| limit.min(detected));
        tracing::debug!("Detected {} CUDA device(s), {} visible", detected, count);
        count
    }
}

impl AcceleratorRuntime for SystemRuntime {
    fn cuda_is_available(&self) -> bool {
        self.cuda_device_count() > 0
    }

    fn cuda_device_count(&self) -> usize {
        *self.gpu_count.get_or_init(Self::probe_gpus)
    }

    fn mps_is_available(&self) -> bool {
        self.mps_is_built() && cfg!(target_arch = "aarch64")
    }

    fn mps_is_built(&self) -> bool {
        cfg!(target_os = "macos")
    }
}

/// Run `command` capturing stdout. Returns `None` and kills the child when it outlives
/// `timeout`.
fn output_within(mut command: Command, timeout: Duration) -> io::Result<Option<Output>> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()?;

    let deadline = Instant::now() + timeout;
    loop {
        if child.try_wait()?.is_some() {
            return child.wait_with_output().map(Some);
        }
        if Instant::now() >= deadline {
            if let Err(e) = child.kill() {
                tracing::debug!("Failed to kill stalled probe: {}", e);
            }
            // reap
            let _ = child.wait();
            return Ok(None);
        }
        thread::sleep(PROBE_POLL_INTERVAL);
    }
}

/// Count `GPU <n>: ...` lines in `nvidia-smi -L` output
fn count_listed_gpus(listing: &str) -> usize {
    listing
        .lines()
        .filter(|line| line.trim_start().starts_with("GPU "))
        .count()
}

/// How many devices `CUDA_VISIBLE_DEVICES` lets through, if it is set
fn visible_device_limit(value: Option<&str>) -> Option<usize> {
    let value = value?.trim();
    if value.is_empty() {
        return Some(0);
    }

    let mut count = 0;
    for entry in value.split(',').map(str::trim) {
        // devices after an invalid entry are hidden
        if entry.is_empty() || entry.starts_with('-') {
            break;
        }
        count += 1;
    }
    Some(count)
}
