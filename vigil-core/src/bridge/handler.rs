//! Presentation bridge
//!
//! Owns the anomaly set shown to the user and the current selection. UI
//! commands come in through [`Bridge::handle`]; events go out on an unbounded
//! channel. Diagnostics and decorations are re-synchronized from the same
//! anomaly set after every change.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::analysis::{AnalysisEngine, ScanProgress};
use crate::anomaly::Anomaly;
use crate::conversation::{build_anomaly_context, ConversationStore};
use crate::workspace::SCAN_EXTENSIONS;
use crate::Error;

use super::messages::{views, AnomalyView, UiCommand, UiEvent};
use super::surface::{Decoration, Diagnostic, EditorSurface};

/// Anomalies and selection owned by the bridge
#[derive(Debug, Default)]
struct BridgeState {
    anomalies: Vec<Anomaly>,
    selected: Option<String>,
    /// Files that currently carry diagnostics
    marked_files: BTreeSet<PathBuf>,
}

/// Connects the UI, the editor surfaces and the core services
pub struct Bridge {
    engine: Arc<AnalysisEngine>,
    conversations: Arc<ConversationStore>,
    surface: Arc<dyn EditorSurface>,
    events: mpsc::UnboundedSender<UiEvent>,
    state: Mutex<BridgeState>,
    cancel: CancellationToken,
}

impl Bridge {
    pub fn new(
        engine: Arc<AnalysisEngine>,
        conversations: Arc<ConversationStore>,
        surface: Arc<dyn EditorSurface>,
        events: mpsc::UnboundedSender<UiEvent>,
    ) -> Self {
        Self {
            engine,
            conversations,
            surface,
            events,
            state: Mutex::new(BridgeState::default()),
            cancel: CancellationToken::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, BridgeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn post(&self, event: UiEvent) {
        if self.events.send(event).is_err() {
            debug!("UI channel closed, dropping event");
        }
    }

    /// Cancel in-flight analyses and chats
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Snapshot of the current anomaly set
    pub fn anomalies(&self) -> Vec<Anomaly> {
        self.state().anomalies.clone()
    }

    pub fn selected(&self) -> Option<String> {
        self.state().selected.clone()
    }

    fn find(&self, anomaly_id: &str) -> Option<Anomaly> {
        self.state()
            .anomalies
            .iter()
            .find(|a| a.id == anomaly_id)
            .cloned()
    }

    /// Dispatch one UI command
    pub async fn handle(&self, command: UiCommand) {
        debug!(?command, "Handling UI command");
        match command {
            UiCommand::Ready => self.send_initial_state(),
            UiCommand::AnalyzeRepository => self.analyze_repository().await,
            UiCommand::AnalyzeFile(target) => {
                match target
                    .and_then(|t| t.file)
                    .or_else(|| self.surface.active_file())
                {
                    Some(file) => self.analyze_file(&file).await,
                    None => self.post(UiEvent::AnalysisError {
                        error: "No file is open to analyze".to_string(),
                    }),
                }
            }
            UiCommand::SelectAnomaly { anomaly_id } => self.select_anomaly(&anomaly_id).await,
            UiCommand::SendMessage { content } => self.send_message(&content).await,
            UiCommand::ApplyFix { anomaly_id } => self.apply_fix(&anomaly_id).await,
            UiCommand::OpenFile { file, line } => {
                if let Err(e) = self.surface.open_file(&file, line).await {
                    self.surface.show_error(&e.to_string(), false);
                }
            }
            UiCommand::OpenSettings => self.surface.open_settings(),
        }
    }

    /// Hook for document saves; re-analyzes when auto-analysis is enabled
    pub async fn document_saved(&self, path: &Path) {
        if !self.engine.settings().auto_analyze_on_save || !self.engine.is_configured() {
            return;
        }
        let supported = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| SCAN_EXTENSIONS.iter().any(|s| s.eq_ignore_ascii_case(ext)));
        if supported {
            debug!(file = %path.display(), "Auto-analyzing saved file");
            self.analyze_file(path).await;
        }
    }

    fn send_initial_state(&self) {
        let anomalies = views(&self.state().anomalies);
        self.post(UiEvent::InitialState {
            anomalies,
            is_configured: self.engine.is_configured(),
        });
    }

    fn report_analysis_error(&self, err: &Error) {
        let error = err.to_string();
        if matches!(err, Error::NotConfigured) {
            self.surface.show_error(&error, true);
        }
        self.post(UiEvent::AnalysisError { error });
    }

    async fn analyze_repository(&self) {
        self.post(UiEvent::AnalysisStarted);

        let progress = |p: &ScanProgress| {
            self.post(UiEvent::AnalysisProgress {
                completed: p.completed,
                total: p.total,
                fraction: p.fraction(),
            })
        };
        let cancel = self.cancel.child_token();

        match self.engine.analyze_repository(&progress, &cancel).await {
            Ok(result) => {
                {
                    let mut state = self.state();
                    state.anomalies = result.anomalies.clone();
                    state.selected = None;
                }
                self.sync_surfaces();
                info!(
                    anomalies = result.anomalies.len(),
                    files = result.analyzed_files.len(),
                    "Repository results published"
                );
                self.post(UiEvent::AnalysisComplete {
                    anomalies: views(&result.anomalies),
                    analyzed_files: result.analyzed_files,
                });
            }
            Err(e) => self.report_analysis_error(&e),
        }
    }

    async fn analyze_file(&self, file: &Path) {
        self.post(UiEvent::AnalysisStarted);
        let file = self.engine.workspace().normalize(file);
        let cancel = self.cancel.child_token();

        match self.engine.analyze_file_cancellable(&file, &cancel).await {
            Ok(found) => {
                {
                    let mut state = self.state();
                    state.anomalies.retain(|a| a.file() != file);
                    state.anomalies.extend(found.iter().cloned());
                    let selection_gone = state
                        .selected
                        .as_ref()
                        .is_some_and(|id| !state.anomalies.iter().any(|a| &a.id == id));
                    if selection_gone {
                        state.selected = None;
                    }
                }
                self.sync_surfaces();
                self.post(UiEvent::AnalysisComplete {
                    anomalies: views(&found),
                    analyzed_files: vec![file],
                });
            }
            Err(e) => self.report_analysis_error(&e),
        }
    }

    async fn select_anomaly(&self, anomaly_id: &str) {
        let Some(anomaly) = self.find(anomaly_id) else {
            debug!(anomaly = %anomaly_id, "Selected anomaly not found, ignoring");
            return;
        };

        match self.conversations.start_conversation(&anomaly).await {
            Ok(conversation) => {
                let anomaly = {
                    let mut state = self.state();
                    state.selected = Some(anomaly.id.clone());
                    match state.anomalies.iter_mut().find(|a| a.id == anomaly.id) {
                        Some(current) => {
                            current.link_conversation(conversation.id());
                            current.clone()
                        }
                        None => anomaly,
                    }
                };
                self.post(UiEvent::ConversationUpdated {
                    anomaly_id: anomaly.id.clone(),
                    anomaly: AnomalyView::from(&anomaly),
                    messages: conversation.messages().to_vec(),
                });
            }
            Err(e) => self.post(UiEvent::ChatError {
                error: e.to_string(),
            }),
        }
    }

    async fn send_message(&self, content: &str) {
        let content = content.trim();
        if content.is_empty() {
            return;
        }
        let Some(anomaly) = self.selected().and_then(|id| self.find(&id)) else {
            debug!("No anomaly selected, ignoring message");
            return;
        };

        self.post(UiEvent::ChatLoading { loading: true });
        let context = build_anomaly_context(&anomaly, self.engine.workspace().as_ref()).await;
        let cancel = self.cancel.child_token();

        match self
            .conversations
            .send_message(&anomaly.id, content, &context, &cancel)
            .await
        {
            Ok(conversation) => self.post(UiEvent::ConversationUpdated {
                anomaly_id: anomaly.id.clone(),
                anomaly: AnomalyView::from(&anomaly),
                messages: conversation.messages().to_vec(),
            }),
            Err(Error::NotFound(what)) => debug!(%what, "Conversation gone, ignoring message"),
            Err(Error::NotConfigured) => {
                let error = Error::NotConfigured.to_string();
                self.surface.show_error(&error, true);
                self.post(UiEvent::ChatError { error });
            }
            Err(e) => self.post(UiEvent::ChatError {
                error: e.to_string(),
            }),
        }
        self.post(UiEvent::ChatLoading { loading: false });
    }

    async fn apply_fix(&self, anomaly_id: &str) {
        let Some(anomaly) = self.find(anomaly_id) else {
            debug!(anomaly = %anomaly_id, "Anomaly for fix not found, ignoring");
            return;
        };

        match self.produce_fix(&anomaly).await {
            Ok(true) => {
                self.sync_surfaces();
                self.post(UiEvent::AnomaliesUpdated {
                    anomalies: views(&self.anomalies()),
                });
            }
            Ok(false) => self.post(UiEvent::ChatError {
                error: format!("No safe fix was found for \"{}\"", anomaly.title),
            }),
            Err(e) => {
                if matches!(e, Error::NotConfigured) {
                    self.surface.show_error(&e.to_string(), true);
                }
                self.post(UiEvent::ChatError {
                    error: e.to_string(),
                })
            }
        }
    }

    /// Ask for a fix, write it to the document and attach it to the anomaly
    ///
    /// Returns `false` when the model proposed no edits. The file is not
    /// re-analyzed.
    async fn produce_fix(&self, anomaly: &Anomaly) -> crate::Result<bool> {
        let workspace = self.engine.workspace();
        let text = workspace.read_document(anomaly.file()).await?;
        let Some(fix) = self.engine.client().suggest_fix(anomaly, &text).await? else {
            return Ok(false);
        };

        let updated = fix.apply_to(anomaly.file(), &text);
        workspace.write_document(anomaly.file(), &updated).await?;
        info!(
            anomaly = %anomaly.id,
            file = %anomaly.file().display(),
            edits = fix.edits.len(),
            "Applied fix"
        );

        let mut state = self.state();
        match state.anomalies.iter_mut().find(|a| a.id == anomaly.id) {
            Some(current) => current.attach_fix(fix),
            None => warn!(anomaly = %anomaly.id, "Anomaly removed while fixing"),
        }
        Ok(true)
    }

    /// Push diagnostics and decorations for the current anomaly set
    fn sync_surfaces(&self) {
        let (by_file, stale) = {
            let mut state = self.state();
            let mut by_file: BTreeMap<PathBuf, Vec<&Anomaly>> = BTreeMap::new();
            for anomaly in &state.anomalies {
                by_file
                    .entry(anomaly.file().to_path_buf())
                    .or_default()
                    .push(anomaly);
            }

            let marked: BTreeSet<PathBuf> = by_file.keys().cloned().collect();
            let stale: Vec<PathBuf> = state.marked_files.difference(&marked).cloned().collect();
            let by_file: Vec<(PathBuf, Vec<Diagnostic>, Vec<Decoration>)> = by_file
                .into_iter()
                .map(|(file, anomalies)| {
                    let diagnostics = anomalies.iter().map(|a| Diagnostic::from(*a)).collect();
                    let decorations = anomalies.iter().map(|a| Decoration::from(*a)).collect();
                    (file, diagnostics, decorations)
                })
                .collect();
            state.marked_files = marked;
            (by_file, stale)
        };

        for file in stale {
            self.surface.set_diagnostics(&file, Vec::new());
            self.surface.set_decorations(&file, Vec::new());
        }
        for (file, diagnostics, decorations) in by_file {
            self.surface.set_diagnostics(&file, diagnostics);
            self.surface.set_decorations(&file, decorations);
        }
    }
}
