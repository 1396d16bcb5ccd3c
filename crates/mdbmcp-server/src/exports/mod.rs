//! Background cursor→file export pipeline.
//!
//! [`ExportsManager::create_json_export`] returns a resource URI
//! immediately and streams the cursor to disk in a background task. Each
//! job makes exactly one terminal transition (`ready`, `failed`, or
//! `expired`) and emits exactly one [`ExportEvent`], which the transport
//! turns into a resource-updated notification. A periodic sweep deletes
//! expired files.

mod writer;

pub use writer::JsonArrayWriter;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use bson::Document;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use mongodb::Cursor;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use mdbmcp_core::config::UserConfig;
use mdbmcp_core::{ErrorCode, EventBus, EventReceiver, ExportEvent, LogId, Logger};

use crate::ejson::JsonExportFormat;

/// URI scheme under which exports are published as MCP resources.
pub const EXPORT_URI_SCHEME: &str = "exported-data";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportStatus {
    Running,
    Ready,
    Failed { reason: String },
    Expired,
}

#[derive(Debug, Clone)]
pub struct ExportJob {
    pub export_id: Uuid,
    pub export_name: String,
    pub export_title: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: ExportStatus,
    pub absolute_path: PathBuf,
    pub resource_uri: String,
    pub bytes_written: u64,
}

/// Outcome of reading an export resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportReadOutcome {
    /// Still streaming; the caller should retry later.
    Pending,
    Ready { content: String },
    Failed { reason: String },
    NotFound,
}

/// Parameters of [`ExportsManager::create_json_export`].
pub struct CreateJsonExport {
    pub input: Cursor<Document>,
    pub export_name: String,
    pub export_title: String,
    pub format: JsonExportFormat,
}

/// Owns all export jobs and their background tasks.
pub struct ExportsManager {
    config: Arc<UserConfig>,
    logger: Logger,
    jobs: RwLock<HashMap<String, ExportJob>>,
    events: EventBus<ExportEvent>,
    shutdown: CancellationToken,
}

impl ExportsManager {
    pub fn new(config: Arc<UserConfig>, logger: Logger) -> Arc<Self> {
        let manager = Arc::new(Self {
            config,
            logger,
            jobs: RwLock::new(HashMap::new()),
            events: EventBus::new(),
            shutdown: CancellationToken::new(),
        });
        manager.clone().spawn_cleanup_sweep();
        manager
    }

    pub fn subscribe(&self) -> EventReceiver<ExportEvent> {
        self.events.subscribe()
    }

    pub fn resource_uri(export_name: &str) -> String {
        format!("{EXPORT_URI_SCHEME}://{export_name}")
    }

    /// The export name addressed by a resource URI, when the URI uses the
    /// export scheme.
    pub fn parse_resource_uri(uri: &str) -> Option<&str> {
        uri.strip_prefix(&format!("{EXPORT_URI_SCHEME}://"))
            .filter(|name| !name.is_empty())
    }

    /// Start streaming `input` to `exports_path/export_name`.
    ///
    /// Returns `(resource_uri, absolute_path)` as soon as the job is
    /// registered; document streaming continues in the background.
    pub async fn create_json_export(
        self: &Arc<Self>,
        request: CreateJsonExport,
    ) -> Result<(String, PathBuf), ErrorCode> {
        let exports_dir = self.config.exports_path.clone();
        tokio::fs::create_dir_all(&exports_dir)
            .await
            .map_err(|e| ErrorCode::Operation(format!("Failed to create exports directory: {e}")))?;

        let absolute_path = exports_dir.join(&request.export_name);
        let resource_uri = Self::resource_uri(&request.export_name);
        let created_at = Utc::now();
        let expires_at = created_at
            + ChronoDuration::milliseconds(self.config.export_timeout_ms as i64);

        let job = ExportJob {
            export_id: Uuid::new_v4(),
            export_name: request.export_name.clone(),
            export_title: request.export_title,
            created_at,
            expires_at,
            status: ExportStatus::Running,
            absolute_path: absolute_path.clone(),
            resource_uri: resource_uri.clone(),
            bytes_written: 0,
        };

        {
            let mut jobs = self.jobs.write().await;
            if jobs
                .get(&request.export_name)
                .is_some_and(|existing| existing.status == ExportStatus::Running)
            {
                return Err(ErrorCode::Operation(format!(
                    "An export named `{}` is already running",
                    request.export_name
                )));
            }
            jobs.insert(request.export_name.clone(), job);
        }

        self.logger.info(
            LogId::EXPORT_CREATED,
            "export",
            format!("Export `{}` started", request.export_name),
        );

        let manager = self.clone();
        let name = request.export_name;
        let path = absolute_path.clone();
        let cancel = self.shutdown.child_token();
        tokio::spawn(async move {
            let writer = JsonArrayWriter::new(path, request.format);
            let result = tokio::select! {
                result = writer.stream(request.input) => result,
                () = cancel.cancelled() => Err("export cancelled by shutdown".to_string()),
            };
            manager.finish_job(&name, result).await;
        });

        Ok((resource_uri, absolute_path))
    }

    /// Record the terminal transition of a streaming task and emit its
    /// single notification event.
    async fn finish_job(&self, export_name: &str, result: Result<u64, String>) {
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.get_mut(export_name) else {
            return;
        };
        if job.status != ExportStatus::Running {
            return;
        }

        let event = match result {
            Ok(bytes_written) => {
                job.status = ExportStatus::Ready;
                job.bytes_written = bytes_written;
                ExportEvent::Ready {
                    resource_uri: job.resource_uri.clone(),
                    bytes_written,
                }
            }
            Err(reason) => {
                job.status = ExportStatus::Failed {
                    reason: reason.clone(),
                };
                ExportEvent::Failed {
                    resource_uri: job.resource_uri.clone(),
                    reason,
                }
            }
        };
        let uri = job.resource_uri.clone();
        drop(jobs);

        self.logger.info(
            LogId::EXPORT_FINISHED,
            "export",
            format!("Export `{export_name}` finished: {uri}"),
        );
        self.events.emit(event);
    }

    /// Jobs visible as MCP resources: everything not yet expired.
    pub async fn list_resources(&self) -> Vec<ExportJob> {
        let jobs = self.jobs.read().await;
        let mut list: Vec<ExportJob> = jobs
            .values()
            .filter(|job| job.status != ExportStatus::Expired)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.export_name.cmp(&b.export_name));
        list
    }

    /// Read an export by name. `Running` jobs return a pending outcome,
    /// expired or unknown names are not found.
    pub async fn read_resource(&self, export_name: &str) -> ExportReadOutcome {
        let (status, path) = {
            let jobs = self.jobs.read().await;
            match jobs.get(export_name) {
                Some(job) => (job.status.clone(), job.absolute_path.clone()),
                None => return ExportReadOutcome::NotFound,
            }
        };

        match status {
            ExportStatus::Running => ExportReadOutcome::Pending,
            ExportStatus::Expired => ExportReadOutcome::NotFound,
            ExportStatus::Failed { reason } => ExportReadOutcome::Failed { reason },
            ExportStatus::Ready => match tokio::fs::read_to_string(&path).await {
                Ok(content) => ExportReadOutcome::Ready { content },
                Err(e) => ExportReadOutcome::Failed {
                    reason: format!("Failed to read export file: {e}"),
                },
            },
        }
    }

    pub async fn get_job(&self, export_name: &str) -> Option<ExportJob> {
        self.jobs.read().await.get(export_name).cloned()
    }

    /// Periodic sweep: expire jobs past their deadline and delete their
    /// files. A job that was still `running` gets its terminal transition
    /// (and single notification) here; `ready`/`failed` jobs already made
    /// theirs and are removed silently.
    fn spawn_cleanup_sweep(self: Arc<Self>) {
        let interval = std::time::Duration::from_millis(self.config.export_cleanup_interval_ms);
        let cancel = self.shutdown.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    () = cancel.cancelled() => break,
                }
                self.sweep_expired().await;
            }
        });
    }

    async fn sweep_expired(&self) {
        let now = Utc::now();
        let mut expired_events = Vec::new();
        let mut to_delete = Vec::new();

        {
            let mut jobs = self.jobs.write().await;
            jobs.retain(|name, job| {
                if job.expires_at > now {
                    return true;
                }
                to_delete.push(job.absolute_path.clone());
                if job.status == ExportStatus::Running {
                    // Terminal transition happens here for jobs that never
                    // finished; their stream task's late completion is
                    // ignored because the entry is gone.
                    expired_events.push(ExportEvent::Expired {
                        resource_uri: job.resource_uri.clone(),
                    });
                }
                debug!(export = %name, "[Exports] Expired");
                false
            });
        }

        for path in to_delete {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("[Exports] Failed to delete {}: {e}", path.display());
                }
            }
        }
        for event in expired_events {
            self.logger.debug(
                LogId::EXPORT_CLEANUP,
                "export",
                format!("Export expired: {}", event.resource_uri()),
            );
            self.events.emit(event);
        }
    }

    /// Stop the sweep and cancel all in-flight export tasks.
    pub async fn close(&self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager_with(config: UserConfig) -> Arc<ExportsManager> {
        ExportsManager::new(Arc::new(config), Logger::disabled())
    }

    #[tokio::test]
    async fn unknown_resource_is_not_found() {
        let manager = manager_with(UserConfig::default());
        assert_eq!(
            manager.read_resource("nope.json").await,
            ExportReadOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn resource_uri_uses_export_scheme() {
        assert_eq!(
            ExportsManager::resource_uri("db.coll.abc.json"),
            "exported-data://db.coll.abc.json"
        );
    }

    #[tokio::test]
    async fn sweep_expires_running_jobs_and_emits_once() {
        let dir = tempfile::tempdir().unwrap();
        let config = UserConfig {
            exports_path: dir.path().to_path_buf(),
            export_timeout_ms: 0,
            ..UserConfig::default()
        };
        let manager = manager_with(config);
        let mut events = manager.subscribe();

        // Register a job directly; its stream task never runs.
        let path = dir.path().join("db.coll.x.json");
        std::fs::write(&path, b"[]").unwrap();
        {
            let mut jobs = manager.jobs.write().await;
            jobs.insert(
                "db.coll.x.json".to_string(),
                ExportJob {
                    export_id: Uuid::new_v4(),
                    export_name: "db.coll.x.json".to_string(),
                    export_title: "x".to_string(),
                    created_at: Utc::now(),
                    expires_at: Utc::now(),
                    status: ExportStatus::Running,
                    absolute_path: path.clone(),
                    resource_uri: ExportsManager::resource_uri("db.coll.x.json"),
                    bytes_written: 0,
                },
            );
        }

        manager.sweep_expired().await;

        assert!(matches!(
            events.try_recv(),
            Some(ExportEvent::Expired { .. })
        ));
        assert_eq!(events.try_recv(), None);
        assert!(!path.exists());
        assert_eq!(
            manager.read_resource("db.coll.x.json").await,
            ExportReadOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn ready_jobs_expire_silently() {
        let dir = tempfile::tempdir().unwrap();
        let config = UserConfig {
            exports_path: dir.path().to_path_buf(),
            ..UserConfig::default()
        };
        let manager = manager_with(config);
        let mut events = manager.subscribe();

        let path = dir.path().join("db.coll.y.json");
        std::fs::write(&path, b"[]").unwrap();
        {
            let mut jobs = manager.jobs.write().await;
            jobs.insert(
                "db.coll.y.json".to_string(),
                ExportJob {
                    export_id: Uuid::new_v4(),
                    export_name: "db.coll.y.json".to_string(),
                    export_title: "y".to_string(),
                    created_at: Utc::now() - ChronoDuration::minutes(10),
                    expires_at: Utc::now() - ChronoDuration::minutes(5),
                    status: ExportStatus::Ready,
                    absolute_path: path.clone(),
                    resource_uri: ExportsManager::resource_uri("db.coll.y.json"),
                    bytes_written: 2,
                },
            );
        }

        manager.sweep_expired().await;

        // The terminal `ready` notification already happened; expiry of a
        // finished job must not produce a second one.
        assert_eq!(events.try_recv(), None);
        assert!(!path.exists());
    }
}
