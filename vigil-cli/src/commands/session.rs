//! Wiring shared by every command

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use vigil_core::{
    AnalysisEngine, Anomaly, Config, ConversationStore, FsWorkspace, ModelClient, RuleSet,
    Secrets, StateStore,
};
use vigil_db::Database;

/// Flags accepted by every subcommand
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub verbose: bool,
    pub model: Option<String>,
    pub endpoint: Option<String>,
    pub workspace: PathBuf,
}

impl GlobalArgs {
    /// Configuration with env and CLI overrides applied
    pub fn config(&self) -> anyhow::Result<Config> {
        Config::load_with_overrides(self.model.clone(), self.endpoint.clone())
            .context("Failed to load configuration")
    }

    /// Canonical workspace root
    pub fn root(&self) -> anyhow::Result<PathBuf> {
        self.workspace
            .canonicalize()
            .with_context(|| format!("Workspace not found: {}", self.workspace.display()))
    }
}

/// Services built from the loaded configuration
pub struct Session {
    pub root: PathBuf,
    pub engine: Arc<AnalysisEngine>,
}

impl Session {
    pub fn open(global: &GlobalArgs) -> anyhow::Result<Self> {
        Self::with_config(global, global.config()?)
    }

    pub fn with_config(global: &GlobalArgs, config: Config) -> anyhow::Result<Self> {
        let root = global.root()?;
        let secrets = Secrets::load().context("Failed to load secrets")?;

        let client = ModelClient::from_config(config.model.clone(), secrets.api_key())?;
        let rules = RuleSet::load(&root, &config.rules).context("Failed to load review rules")?;
        let workspace = Arc::new(FsWorkspace::new(&root));

        if global.verbose {
            tracing::info!(
                model = client.model(),
                rules = rules.len(),
                root = %root.display(),
                configured = client.is_configured(),
                "Session ready"
            );
        }

        let engine = AnalysisEngine::new(client, workspace, rules, config.analysis.clone());
        Ok(Self {
            root,
            engine: Arc::new(engine),
        })
    }

    /// Open the conversation store backed by the local database
    pub async fn conversations(&self) -> anyhow::Result<Arc<ConversationStore>> {
        let db = Database::open()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to open database: {}", e))?;
        let state: Arc<dyn StateStore> = Arc::new(db);
        let store = ConversationStore::load(state, self.engine.client().clone()).await?;
        Ok(Arc::new(store))
    }

    /// Path relative to the workspace root when it lies inside it
    pub fn relative(&self, path: &Path) -> PathBuf {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| path.to_path_buf())
        };
        let absolute = absolute.canonicalize().unwrap_or(absolute);
        absolute
            .strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or(absolute)
    }

    /// Fail early with the configuration hint when no key is set
    pub fn require_configured(&self) -> anyhow::Result<()> {
        if !self.engine.is_configured() {
            return Err(vigil_core::Error::NotConfigured.into());
        }
        Ok(())
    }
}

/// Print anomalies one per line, with descriptions when verbose
pub fn print_anomalies(anomalies: &[Anomaly], verbose: bool) {
    for (index, anomaly) in anomalies.iter().enumerate() {
        println!("{:>3}. {}", index + 1, anomaly);
        if verbose {
            println!("     {}", anomaly.description);
            if let Some(suggestion) = &anomaly.suggestion {
                println!("     Suggestion: {}", suggestion);
            }
        }
    }
}
