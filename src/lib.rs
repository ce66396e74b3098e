pub mod capture;
pub mod cli;
pub mod commands;
pub mod decode;
pub mod payload;
pub mod render;
pub mod scan;
pub mod settings;
pub mod utils;

#[cfg(test)]
mod mock;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use serde::Serialize;

use capture::{CameraBackend, ImageSequenceBackend, UnsupportedBackend};
use cli::{Cli, Commands, ConfigCommands};
use commands::ScanReport;
use decode::RqrrEngine;
use render::QrMatrixRenderer;
use scan::{ScanConfig, ScanController};
use settings::SettingsStore;

/// Everything a command needs: settings, the scan controller and the renderer.
pub struct AppState {
    pub settings: SettingsStore,
    pub scanner: ScanController,
    pub renderer: QrMatrixRenderer,
}

impl AppState {
    pub fn new(settings: SettingsStore, camera: Arc<dyn CameraBackend>, scan: ScanConfig) -> Self {
        let scanner = ScanController::new(camera, Arc::new(RqrrEngine::live()), scan);
        Self {
            settings,
            scanner,
            renderer: QrMatrixRenderer,
        }
    }
}

#[derive(Serialize)]
struct JsonOut<T: Serialize> {
    ok: bool,
    data: T,
}

fn print_json<T: Serialize>(data: T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(&JsonOut { ok: true, data })?
    );
    Ok(())
}

pub fn run() -> Result<()> {
    utils::init_logging();
    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(dispatch(cli))
}

async fn dispatch(cli: Cli) -> Result<()> {
    let json = cli.json;
    let settings = SettingsStore::open(cli.config)?;
    let mut scan_settings = settings.scan();

    let camera: Arc<dyn CameraBackend> = match &cli.command {
        Commands::Scan {
            frames: Some(dir),
            once,
            ..
        } => {
            let backend = ImageSequenceBackend::new(dir);
            Arc::new(if *once { backend.once() } else { backend })
        }
        _ => Arc::new(UnsupportedBackend),
    };
    if let Commands::Scan {
        interval_ms: Some(ms),
        ..
    } = &cli.command
    {
        scan_settings.frame_interval_ms = *ms;
    }
    let state = AppState::new(settings, camera, ScanConfig::from_settings(&scan_settings));

    match cli.command {
        Commands::Encode { content, output } => {
            let report = commands::encode_content(&state, content, &output)?;
            if json {
                return print_json(report);
            }
            println!("{}", report.payload);
            if let Some(file) = &report.file {
                println!("saved {}", file.display());
            }
        }
        Commands::Decode { file } => {
            let report = commands::decode_upload(&state, &file).await?;
            if json {
                return print_json(report);
            }
            println!("{}", report.payload);
            println!("type: {}", report.intent.kind());
        }
        Commands::Scan { timeout_secs, .. } => {
            let report = commands::run_scan(&state, timeout_secs.map(Duration::from_secs)).await?;
            if json {
                return print_json(report);
            }
            match report {
                ScanReport::Found(found) => {
                    println!("{}", found.payload);
                    println!("type: {}", found.intent.kind());
                }
                ScanReport::Cancelled => println!("scan cancelled"),
                ScanReport::TimedOut => anyhow::bail!("no QR code found before the timeout"),
            }
        }
        Commands::Config { command } => {
            let reset = matches!(command, ConfigCommands::Reset);
            let snapshot = commands::config_command(&state, command)?;
            if json {
                return print_json(snapshot);
            }
            if reset {
                println!("settings reset");
            }
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
    }

    Ok(())
}
