//! Bridge command - serve the UI protocol over stdio
//!
//! Each stdin line is one JSON frame: either a UI command or a host
//! notification (`host/...`). Each stdout line is one JSON frame: either a
//! UI event or an editor request (`editor/...`).

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use clap::Args;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use vigil_core::bridge::{Decoration, Diagnostic};
use vigil_core::{Bridge, EditorSurface, Severity, UiCommand, UiEvent};

use super::session::{GlobalArgs, Session};

/// Serve the UI message protocol on stdin/stdout
#[derive(Args, Debug)]
pub struct BridgeArgs {
    /// Re-analyze supported files when the host reports a save
    #[arg(long)]
    auto_analyze: bool,
}

/// Notifications from the host editor
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all_fields = "camelCase")]
enum HostCommand {
    #[serde(rename = "host/documentSaved")]
    DocumentSaved { file: PathBuf },
    #[serde(rename = "host/activeEditorChanged")]
    ActiveEditorChanged {
        #[serde(default)]
        file: Option<PathBuf>,
    },
    #[serde(rename = "host/shutdown")]
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
enum Inbound {
    Ui(UiCommand),
    Host(HostCommand),
}

/// Requests to the host editor
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all_fields = "camelCase")]
enum EditorRequest {
    #[serde(rename = "editor/setDiagnostics")]
    SetDiagnostics {
        file: PathBuf,
        diagnostics: Vec<DiagnosticFrame>,
    },
    #[serde(rename = "editor/setDecorations")]
    SetDecorations {
        file: PathBuf,
        decorations: Vec<DecorationFrame>,
    },
    #[serde(rename = "editor/openFile")]
    OpenFile { file: PathBuf, line: Option<u32> },
    #[serde(rename = "editor/openSettings")]
    OpenSettings,
    #[serde(rename = "editor/showError")]
    ShowError { message: String, offer_settings: bool },
}

/// Diagnostic with 1-indexed lines
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct DiagnosticFrame {
    start_line: u32,
    end_line: u32,
    severity: Severity,
    message: String,
    code: String,
    source: &'static str,
}

impl From<Diagnostic> for DiagnosticFrame {
    fn from(d: Diagnostic) -> Self {
        Self {
            start_line: d.range.display_start(),
            end_line: d.range.display_end(),
            severity: d.severity,
            message: d.message,
            code: d.code,
            source: d.source,
        }
    }
}

/// Decoration with a 1-indexed line
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct DecorationFrame {
    line: u32,
    severity: Severity,
    text: String,
    anomaly_id: String,
}

impl From<Decoration> for DecorationFrame {
    fn from(d: Decoration) -> Self {
        Self {
            line: d.line + 1,
            severity: d.severity,
            text: d.text,
            anomaly_id: d.anomaly_id,
        }
    }
}

/// Editor surface that forwards requests to the host as stdout frames
struct StdioSurface {
    root: PathBuf,
    frames: mpsc::UnboundedSender<String>,
    active: Mutex<Option<PathBuf>>,
}

impl StdioSurface {
    fn new(root: PathBuf, frames: mpsc::UnboundedSender<String>) -> Self {
        Self {
            root,
            frames,
            active: Mutex::new(None),
        }
    }

    fn request(&self, request: EditorRequest) {
        match serde_json::to_string(&request) {
            Ok(frame) => {
                if self.frames.send(frame).is_err() {
                    debug!("Output closed, dropping editor request");
                }
            }
            Err(e) => warn!(error = %e, "Failed to encode editor request"),
        }
    }

    fn set_active(&self, file: Option<PathBuf>) {
        *self.active.lock().unwrap_or_else(|e| e.into_inner()) = file;
    }
}

#[async_trait]
impl EditorSurface for StdioSurface {
    fn set_diagnostics(&self, file: &Path, diagnostics: Vec<Diagnostic>) {
        self.request(EditorRequest::SetDiagnostics {
            file: file.to_path_buf(),
            diagnostics: diagnostics.into_iter().map(DiagnosticFrame::from).collect(),
        });
    }

    fn set_decorations(&self, file: &Path, decorations: Vec<Decoration>) {
        self.request(EditorRequest::SetDecorations {
            file: file.to_path_buf(),
            decorations: decorations.into_iter().map(DecorationFrame::from).collect(),
        });
    }

    fn active_file(&self) -> Option<PathBuf> {
        self.active.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    async fn open_file(&self, file: &Path, line: Option<u32>) -> vigil_core::Result<()> {
        let resolved = if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.root.join(file)
        };
        if !tokio::fs::try_exists(&resolved).await.unwrap_or(false) {
            return Err(vigil_core::Error::NotFound(format!(
                "file {}",
                file.display()
            )));
        }
        self.request(EditorRequest::OpenFile {
            file: file.to_path_buf(),
            line,
        });
        Ok(())
    }

    fn open_settings(&self) {
        self.request(EditorRequest::OpenSettings);
    }

    fn show_error(&self, message: &str, offer_settings: bool) {
        self.request(EditorRequest::ShowError {
            message: message.to_string(),
            offer_settings,
        });
    }
}

impl BridgeArgs {
    /// Execute the bridge command
    pub async fn execute(&self, global: &GlobalArgs) -> anyhow::Result<()> {
        let mut config = global.config()?;
        if self.auto_analyze {
            config.analysis.auto_analyze_on_save = true;
        }
        let session = Session::with_config(global, config)?;
        let conversations = session.conversations().await?;

        let (frames_tx, mut frames_rx) = mpsc::unbounded_channel::<String>();
        let writer = tokio::spawn(async move {
            let mut stdout = tokio::io::stdout();
            while let Some(frame) = frames_rx.recv().await {
                let written = async {
                    stdout.write_all(frame.as_bytes()).await?;
                    stdout.write_all(b"\n").await?;
                    stdout.flush().await
                };
                if let Err(e) = written.await {
                    warn!(error = %e, "Failed to write frame, stopping output");
                    break;
                }
            }
        });

        let (events_tx, mut events_rx) = mpsc::unbounded_channel::<UiEvent>();
        let event_frames = frames_tx.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                match serde_json::to_string(&event) {
                    Ok(frame) => {
                        if event_frames.send(frame).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "Failed to encode UI event"),
                }
            }
        });

        let surface = Arc::new(StdioSurface::new(session.root.clone(), frames_tx));
        let bridge = Arc::new(Bridge::new(
            session.engine.clone(),
            conversations,
            surface.clone(),
            events_tx,
        ));
        info!(root = %session.root.display(), "Bridge ready");

        // Frames run in arrival order on the worker; the reader only watches
        // for shutdown.
        let (work_tx, work_rx) = mpsc::unbounded_channel::<Inbound>();
        let worker = tokio::spawn(run_worker(bridge.clone(), surface.clone(), work_rx));

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted");
                    None
                }
            };
            let Some(line) = line else {
                break;
            };
            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<Inbound>(&line) {
                Ok(Inbound::Host(HostCommand::Shutdown)) => break,
                Ok(frame) => {
                    if work_tx.send(frame).is_err() {
                        warn!("Worker stopped, closing bridge");
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "Ignoring malformed frame"),
            }
        }

        info!("Bridge shutting down");
        bridge.shutdown();
        drop(work_tx);
        worker.await?;
        drop(bridge);
        drop(surface);

        forwarder.await?;
        writer.await?;
        Ok(())
    }
}

/// Handle queued frames until the queue closes or the bridge shuts down
async fn run_worker(
    bridge: Arc<Bridge>,
    surface: Arc<StdioSurface>,
    mut frames: mpsc::UnboundedReceiver<Inbound>,
) {
    while let Some(frame) = frames.recv().await {
        if bridge.is_shut_down() {
            debug!("Bridge shut down, dropping queued frames");
            break;
        }
        match frame {
            Inbound::Ui(command) => bridge.handle(command).await,
            Inbound::Host(HostCommand::DocumentSaved { file }) => {
                bridge.document_saved(&file).await
            }
            Inbound::Host(HostCommand::ActiveEditorChanged { file }) => surface.set_active(file),
            Inbound::Host(HostCommand::Shutdown) => bridge.shutdown(),
        }
    }
}
