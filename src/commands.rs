use std::fs;
use std::future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

use crate::cli::{ConfigCommands, EncodeContent, OutputArgs};
use crate::decode::{decode_file, RqrrEngine};
use crate::payload::{encode, ContentIntent, Payload};
use crate::render::{ExportFormat, RenderAdapter};
use crate::scan::ScanState;
use crate::settings::UserSettings;
use crate::AppState;

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodeReport {
    pub kind: &'static str,
    pub payload: Payload,
    pub file: Option<PathBuf>,
    pub format: Option<ExportFormat>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodeReport {
    pub payload: Payload,
    pub intent: ContentIntent,
}

impl DecodeReport {
    fn new(payload: Payload) -> Self {
        let intent = ContentIntent::parse(&payload);
        Self { payload, intent }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum ScanReport {
    Found(DecodeReport),
    Cancelled,
    TimedOut,
}

pub fn encode_content(
    state: &AppState,
    content: EncodeContent,
    output: &OutputArgs,
) -> Result<EncodeReport> {
    let intent = content.into_intent();
    if let ContentIntent::WifiCredential { ssid, .. } = &intent {
        if ssid.is_empty() {
            log_warn!("encoding a Wi-Fi network with an empty SSID");
        }
    }
    let payload = encode(&intent);

    let style = output.apply(state.settings.style());
    if output.save_style {
        state.settings.update_style(style.clone())?;
    }

    let Some(out) = &output.out else {
        return Ok(EncodeReport {
            kind: intent.kind(),
            payload,
            file: None,
            format: None,
        });
    };

    let rendered = state
        .renderer
        .render(&payload, &style)
        .context("failed to render QR code")?;

    let (path, format) = if out.is_dir() {
        let format = output.format.unwrap_or(ExportFormat::Png);
        (rendered.save_in(out, format)?, format)
    } else {
        let format = output
            .format
            .or_else(|| ExportFormat::from_path(out))
            .unwrap_or(ExportFormat::Png);
        let bytes = rendered.export(format)?;
        fs::write(out, bytes).with_context(|| format!("failed to write {}", out.display()))?;
        (out.clone(), format)
    };
    log_info!("wrote {:?} code to {}", format, path.display());

    Ok(EncodeReport {
        kind: intent.kind(),
        payload,
        file: Some(path),
        format: Some(format),
    })
}

/// Decodes an uploaded image. A live scan is stopped first so the camera is
/// released before the upload is read.
pub async fn decode_upload(state: &AppState, file: &Path) -> Result<DecodeReport> {
    state.scanner.stop_scan().await;
    let payload = decode_file(file, &RqrrEngine::still())
        .with_context(|| format!("failed to decode {}", file.display()))?;
    Ok(DecodeReport::new(payload))
}

/// Runs a live scan until a code is found, Ctrl-C is pressed or `timeout` passes.
pub async fn run_scan(state: &AppState, timeout: Option<Duration>) -> Result<ScanReport> {
    let mut events = state.scanner.subscribe();

    match state.scanner.start_scan().await {
        ScanState::Scanning => {}
        ScanState::PermissionDenied => return Err(anyhow!("camera access was denied")),
        ScanState::Error(reason) => return Err(anyhow!("cannot start scan: {reason}")),
        other => return Err(anyhow!("unexpected scan state {other:?}")),
    }

    let deadline = async {
        match timeout {
            Some(timeout) => tokio::time::sleep(timeout).await,
            None => future::pending().await,
        }
    };
    tokio::pin!(deadline);

    let report = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log_info!("scan interrupted");
                break ScanReport::Cancelled;
            }
            _ = &mut deadline => {
                log_info!("scan timed out");
                break ScanReport::TimedOut;
            }
            event = events.recv() => match event {
                Ok(state) => {
                    if let Some(payload) = state.into_payload() {
                        break ScanReport::Found(DecodeReport::new(payload));
                    }
                }
                Err(RecvError::Lagged(skipped)) => log_warn!("missed {skipped} scan events"),
                Err(RecvError::Closed) => break ScanReport::Cancelled,
            },
        }
    };

    if !matches!(report, ScanReport::Found(_)) {
        state.scanner.stop_scan().await;
    }
    state.scanner.shutdown().await;
    Ok(report)
}

pub fn config_command(state: &AppState, command: ConfigCommands) -> Result<UserSettings> {
    if let ConfigCommands::Reset = command {
        state.settings.reset()?;
        log_info!("settings reset to defaults");
    }
    Ok(state.settings.snapshot())
}
