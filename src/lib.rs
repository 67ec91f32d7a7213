pub mod classifier;
pub mod commands;
pub mod grouping;
pub mod platform;
pub mod store;
pub mod tabs;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use classifier::config::{find_config_path, load_workflow_config};
use classifier::WorkflowClient;
use grouping::GroupingService;
use platform::{ContentExtractor, NativeGroupAdapter, TabSource};
use store::{GroupStore, SqliteGroupStore};

/// Return the platform-standard data directory for TabMind.
///
/// - macOS: `~/Library/Application Support/com.tabmind.app/`
/// - Windows: `{FOLDERID_RoamingAppData}\com.tabmind.app\`
/// - Linux: `$XDG_DATA_HOME/com.tabmind.app/` (fallback `~/.local/share/...`)
///
/// Falls back to `~/.tabmind/` only if none of the above can be resolved.
pub(crate) fn data_dir() -> PathBuf {
    if let Some(dir) = dirs::data_dir() {
        return dir.join("com.tabmind.app");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tabmind")
}

/// Initialize the tracing subscriber, writing structured logs to the data directory.
///
/// On each startup:
/// 1. Rotates existing logs (tabmind.log → tabmind.log.1 → .2 → .3, keeps last 3).
/// 2. Opens a fresh tabmind.log with a line-flushing writer for crash resilience.
/// 3. Logs a startup banner with the data directory path for discoverability.
///
/// `TABMIND_LOG_FORMAT=json` switches to one JSON object per line.
pub fn init_tracing() -> anyhow::Result<PathBuf> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = data_dir();
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create {}", log_dir.display()))?;

    let log_path = log_dir.join("tabmind.log");
    rotate_log_file(&log_path, 3);

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("failed to open {}", log_path.display()))?;
    let flushing_writer = FlushingWriter::new(log_file);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tabmind=info,warn"));

    let json = std::env::var("TABMIND_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let builder = fmt::fmt()
        .with_env_filter(filter)
        .with_writer(flushing_writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false);
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        data_dir = %log_dir.display(),
        log_file = %log_path.display(),
        pid = std::process::id(),
        "=== TabMind starting ==="
    );
    Ok(log_path)
}

/// Rotate log files: `tabmind.log` → `tabmind.log.1` → `.2` → … → `.{keep}`.
///
/// Oldest file beyond `keep` is deleted. Missing files in the chain are skipped.
fn rotate_log_file(base_path: &Path, keep: u32) {
    let oldest = format!("{}.{keep}", base_path.display());
    let _ = std::fs::remove_file(&oldest);

    for i in (1..keep).rev() {
        let from = format!("{}.{i}", base_path.display());
        let to = format!("{}.{}", base_path.display(), i + 1);
        let _ = std::fs::rename(&from, &to);
    }

    if base_path.exists() {
        let to = format!("{}.1", base_path.display());
        let _ = std::fs::rename(base_path, &to);
    }
}

/// A writer that wraps `std::fs::File` and flushes after every write.
///
/// Each log line reaches the OS before the next event is formatted, so a
/// crash never loses the lines leading up to it.
#[derive(Clone)]
struct FlushingWriter {
    file: Arc<Mutex<std::fs::File>>,
}

impl FlushingWriter {
    fn new(file: std::fs::File) -> Self {
        Self {
            file: Arc::new(Mutex::new(file)),
        }
    }
}

impl std::io::Write for FlushingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        let n = std::io::Write::write(&mut *f, buf)?;
        std::io::Write::flush(&mut *f)?;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        std::io::Write::flush(&mut *f)
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for FlushingWriter {
    type Writer = FlushingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Path of the group store database, creating the data directory if needed.
fn resolve_db_path() -> anyhow::Result<PathBuf> {
    let dir = data_dir();
    std::fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
    Ok(dir.join("tabmind.db"))
}

// ─── Application State ──────────────────────────────────────────────────────

/// Everything the command layer needs, wired once at startup.
pub struct TabMind {
    grouping: GroupingService,
    store: Arc<dyn GroupStore>,
    workflow: Option<Arc<WorkflowClient>>,
    /// Token handed to the active analysis; replaced after each cancel.
    cancel: Mutex<CancellationToken>,
}

impl TabMind {
    pub fn new(
        grouping: GroupingService,
        store: Arc<dyn GroupStore>,
        workflow: Option<Arc<WorkflowClient>>,
    ) -> Self {
        Self {
            grouping,
            store,
            workflow,
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// Load `tabmind.yaml`, open the store in the data directory, and wire
    /// the host collaborators into a grouping service.
    pub fn open(
        tabs: Arc<dyn TabSource>,
        native: Arc<dyn NativeGroupAdapter>,
        extractor: Option<Arc<dyn ContentExtractor>>,
    ) -> anyhow::Result<Self> {
        let cwd = std::env::current_dir().unwrap_or_default();
        let config_path = find_config_path(&cwd).context("workflow config not found")?;
        let config = load_workflow_config(&config_path).context("failed to load workflow config")?;
        let workflow = Arc::new(WorkflowClient::from_config(config)?);

        let db_path = resolve_db_path()?;
        let store: Arc<dyn GroupStore> = Arc::new(
            SqliteGroupStore::open(&db_path.to_string_lossy())
                .with_context(|| format!("failed to open {}", db_path.display()))?,
        );

        let mut grouping = GroupingService::new(tabs, native, workflow.clone(), store.clone());
        if let Some(extractor) = extractor {
            grouping = grouping.with_content_extractor(extractor);
        }

        tracing::info!(
            config = %config_path.display(),
            db = %db_path.display(),
            content_extraction = grouping.has_content_extractor(),
            "TabMind ready"
        );
        Ok(Self::new(grouping, store, Some(workflow)))
    }

    pub fn grouping(&self) -> &GroupingService {
        &self.grouping
    }

    pub fn store(&self) -> &Arc<dyn GroupStore> {
        &self.store
    }

    pub fn workflow(&self) -> Option<&Arc<WorkflowClient>> {
        self.workflow.as_ref()
    }

    /// Token for the next analysis run.
    pub fn cancel_token(&self) -> CancellationToken {
        match self.cancel.lock() {
            Ok(token) => token.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Cancel the active analysis and arm a fresh token for the next one.
    pub fn cancel_analysis(&self) {
        let mut token = match self.cancel.lock() {
            Ok(token) => token,
            Err(poisoned) => poisoned.into_inner(),
        };
        token.cancel();
        *token = CancellationToken::new();
        tracing::info!("analysis cancellation requested");
    }

    /// Drive timed analyses until `shutdown` fires.
    pub async fn run_scheduler(&self, shutdown: CancellationToken) {
        self.grouping.run_schedule(shutdown).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotate_log_file_keeps_last_three() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("tabmind.log");

        for run in 0..5 {
            rotate_log_file(&base, 3);
            std::fs::write(&base, format!("run {run}")).unwrap();
        }

        assert_eq!(std::fs::read_to_string(&base).unwrap(), "run 4");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("tabmind.log.1")).unwrap(),
            "run 3"
        );
        assert_eq!(
            std::fs::read_to_string(dir.path().join("tabmind.log.3")).unwrap(),
            "run 1"
        );
        assert!(!dir.path().join("tabmind.log.4").exists());
    }

    #[test]
    fn test_cancel_analysis_rearms_token() {
        let (state, _) = crate::commands::testing::app();
        let first = state.cancel_token();
        state.cancel_analysis();
        assert!(first.is_cancelled());
        assert!(!state.cancel_token().is_cancelled());
    }
}
