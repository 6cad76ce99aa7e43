//! Background registration queue
//!
//! Uploads only enqueue a job; a worker task drains the queue and runs each
//! registration in its own task, so a slow or failing registration never
//! affects the HTTP response that produced it. Outcomes are kept in memory
//! and exposed through `GET /api/registrations/:id` until they are pruned:
//! finished entries expire after a retention window, and only the newest
//! finished entries are kept beyond a fixed cap.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use shopify_admin::{FileRegistrar, RegistrationStep, RemoteFileRecord};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Where a registration currently stands
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RegistrationState {
    Queued,
    Running,
    Completed {
        file: RemoteFileRecord,
    },
    Failed {
        /// Missing when the job never reached the registrar
        #[serde(skip_serializing_if = "Option::is_none")]
        step: Option<RegistrationStep>,
        message: String,
    },
}

impl RegistrationState {
    fn is_finished(&self) -> bool {
        matches!(
            self,
            RegistrationState::Completed { .. } | RegistrationState::Failed { .. }
        )
    }
}

/// How long finished registrations stay visible
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusRetention {
    /// Finished entries older than this are dropped
    pub ttl: Duration,
    /// At most this many finished entries are kept
    pub max_finished: usize,
}

impl Default for StatusRetention {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60 * 60),
            max_finished: 1000,
        }
    }
}

/// Status record served to clients
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationStatus {
    pub id: Uuid,
    pub filename: String,
    #[serde(flatten)]
    pub state: RegistrationState,
    pub updated_at: DateTime<Utc>,
}

/// One composited document waiting to be registered
#[derive(Debug)]
struct RegistrationJob {
    id: Uuid,
    source: PathBuf,
    composited: PathBuf,
}

type StatusMap = Arc<RwLock<HashMap<Uuid, RegistrationStatus>>>;

/// Status table shared by the handle and the worker
#[derive(Clone)]
struct StatusStore {
    statuses: StatusMap,
    retention: StatusRetention,
}

impl StatusStore {
    fn new(retention: StatusRetention) -> Self {
        Self {
            statuses: StatusMap::default(),
            retention,
        }
    }

    async fn set_state(&self, id: Uuid, filename: Option<String>, state: RegistrationState) {
        let finished = state.is_finished();
        let mut statuses = self.statuses.write().await;
        let updated_at = Utc::now();

        match statuses.get_mut(&id) {
            Some(status) => {
                status.state = state;
                status.updated_at = updated_at;
            }
            None => {
                statuses.insert(
                    id,
                    RegistrationStatus {
                        id,
                        filename: filename.unwrap_or_default(),
                        state,
                        updated_at,
                    },
                );
            }
        }

        if finished {
            prune_finished(&mut statuses, &self.retention, updated_at);
        }
    }
}

/// Drop expired finished entries, then the oldest ones beyond the cap
///
/// Queued and running entries are never touched.
fn prune_finished(
    statuses: &mut HashMap<Uuid, RegistrationStatus>,
    retention: &StatusRetention,
    now: DateTime<Utc>,
) {
    let ttl = chrono::Duration::from_std(retention.ttl).unwrap_or(chrono::Duration::MAX);
    statuses.retain(|_, status| {
        !status.state.is_finished() || now.signed_duration_since(status.updated_at) <= ttl
    });

    let mut finished: Vec<(DateTime<Utc>, Uuid)> = statuses
        .values()
        .filter(|status| status.state.is_finished())
        .map(|status| (status.updated_at, status.id))
        .collect();

    if finished.len() > retention.max_finished {
        finished.sort();
        let excess = finished.len() - retention.max_finished;
        for (_, id) in &finished[..excess] {
            statuses.remove(id);
        }
        debug!("Pruned {} finished registrations", excess);
    }
}

/// Handle for enqueueing registrations and reading their status
#[derive(Clone)]
pub struct RegistrationQueue {
    tx: mpsc::UnboundedSender<RegistrationJob>,
    store: StatusStore,
}

impl RegistrationQueue {
    /// Spawn the worker and return a handle to it
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        registrar: FileRegistrar,
        delete_after_register: bool,
        retention: StatusRetention,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let store = StatusStore::new(retention);

        tokio::spawn(run_worker(
            rx,
            registrar,
            store.clone(),
            delete_after_register,
        ));

        Self { tx, store }
    }

    /// Queue the composited document for registration and return its ID
    pub async fn enqueue(&self, source: PathBuf, composited: PathBuf) -> Uuid {
        let id = Uuid::new_v4();
        let filename = composited
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        self.store
            .set_state(id, Some(filename.clone()), RegistrationState::Queued)
            .await;

        let job = RegistrationJob {
            id,
            source,
            composited,
        };

        if self.tx.send(job).is_err() {
            error!("Registration worker is gone, dropping {}", filename);
            self.store
                .set_state(
                    id,
                    None,
                    RegistrationState::Failed {
                        step: None,
                        message: "Registration worker is not running".to_string(),
                    },
                )
                .await;
        } else {
            info!("Queued registration {} for {}", id, filename);
        }

        id
    }

    pub async fn status(&self, id: Uuid) -> Option<RegistrationStatus> {
        self.store.statuses.read().await.get(&id).cloned()
    }
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<RegistrationJob>,
    registrar: FileRegistrar,
    store: StatusStore,
    delete_after_register: bool,
) {
    while let Some(job) = rx.recv().await {
        let registrar = registrar.clone();
        let store = store.clone();
        tokio::spawn(async move {
            process_job(job, &registrar, &store, delete_after_register).await;
        });
    }
}

async fn process_job(
    job: RegistrationJob,
    registrar: &FileRegistrar,
    store: &StatusStore,
    delete_after_register: bool,
) {
    store.set_state(job.id, None, RegistrationState::Running).await;

    match registrar.register_file(&job.composited).await {
        Ok(file) => {
            info!("Registration {} completed: {}", job.id, file.id);
            store
                .set_state(job.id, None, RegistrationState::Completed { file })
                .await;

            if delete_after_register {
                for path in [&job.source, &job.composited] {
                    if let Err(e) = tokio::fs::remove_file(path).await {
                        warn!("Failed to remove {}: {}", path.display(), e);
                    }
                }
            }
        }
        Err(e) => {
            error!("Registration {} failed: {}", job.id, e);
            store
                .set_state(
                    job.id,
                    None,
                    RegistrationState::Failed {
                        step: Some(e.step),
                        message: e.to_string(),
                    },
                )
                .await;
        }
    }
}
