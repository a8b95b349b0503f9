//! MOOSE-Z - Multi-organ objective segmentation
//!
//! Prints the banners, selects the compute device and lists the pretrained models
//! together with their install state.

use std::process::ExitCode;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use moosez::models::ModelRegistry;
use moosez::output::OutputManager;
use moosez::storage::settings::load_settings;
use moosez::system::{select_device, SystemRuntime};

const MODEL_TABLE_HEADERS: [&str; 6] = ["Model", "Imaging", "Modality", "Tissue", "Task", "Installed"];
const MODEL_TABLE_STYLES: [&str; 6] = ["bold cyan", "magenta", "green", "yellow", "dim", "bold"];

fn main() -> ExitCode {
    // Diagnostics go to stderr, the console session owns stdout
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("moosez=warn")))
        .init();

    info!("Starting MOOSE-Z v{}", env!("CARGO_PKG_VERSION"));

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> moosez::Result<()> {
    let settings = load_settings();

    let mut output = OutputManager::new(settings.verbose_console, settings.verbose_log);
    output.configure_logging(settings.log_directory.as_deref())?;

    output.display_logo();
    output.display_authors();
    output.display_doi();
    output.log_update(&format!(" MOOSE-Z v{} session started", env!("CARGO_PKG_VERSION")));

    let device = select_device(&SystemRuntime::new(), &output);

    let registry = ModelRegistry::builtin()?;
    let mut table = output.create_table(&MODEL_TABLE_HEADERS, Some(&MODEL_TABLE_STYLES[..]))?;
    for spec in registry.iter() {
        let installed = if spec.is_installed(&settings.models_directory) {
            "yes"
        } else {
            "no"
        };
        table.add_row([
            spec.name.as_str(),
            spec.imaging.as_str(),
            spec.modality.as_str(),
            spec.tissue.as_str(),
            spec.task_number(),
            installed,
        ])?;
    }
    output.console_update(" ");
    output.console_update(&table);

    output.log_update(&format!(
        " Backend: {} | models directory: {}",
        device.backend,
        settings.models_directory.display()
    ));
    Ok(())
}
