//! The caching worker.
//!
//! One dispatcher with an entry point per event kind:
//!
//! - [`Worker::install`]: populate the new version's instance from the manifest
//! - [`Worker::activate`]: sweep stale instances and start serving the new one
//! - [`Worker::fetch`]: answer an intercepted request (see `intercept`)
//! - [`Worker::message`]: apply a control message
//!
//! Lifecycle: `parsed → installing → installed → activating → activated`, or
//! `installing → redundant` when the install fails. Until an activation
//! succeeds the worker keeps serving whichever instance was active before
//! (possibly none, in which case requests go straight to the network).

pub mod activate;
pub mod install;
pub mod intercept;
pub mod message;
pub mod pending;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::{Arc, PoisonError, RwLock};

use seamcache_core::{AppConfig, CacheDb, CacheInstance, ConfigError, Error, Manifest, Network, Request, Response};
use serde::Serialize;
use url::Url;

pub use activate::SweepReport;
pub use message::ControlMessage;
pub use pending::PendingWork;

/// Worker settings derived from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub origin: Url,
    pub cache_name: String,
    pub api_prefix: String,
    pub offline_page: Url,
    pub data_key: Url,
    pub size_budget: u64,
    pub skip_waiting: bool,
}

impl WorkerSettings {
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        let origin = config.origin_url()?;
        let join = |field: &str, path: &str| {
            origin
                .join(path)
                .map_err(|e| ConfigError::Invalid { field: field.into(), reason: e.to_string() })
        };

        Ok(Self {
            offline_page: join("offline_page", &config.offline_page)?,
            data_key: join("data_key", &config.data_key)?,
            cache_name: config.cache_name(),
            api_prefix: config.api_prefix.clone(),
            size_budget: config.size_budget,
            skip_waiting: config.skip_waiting,
            origin,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    Redundant,
}

/// Result of applying a control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageOutcome {
    Accepted,
    Ignored,
}

/// Snapshot reported by the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub state: WorkerState,
    pub version: String,
    pub serving: Option<String>,
    pub entries: usize,
    pub total_bytes: u64,
    pub pending: usize,
}

struct Lifecycle {
    state: WorkerState,
    /// Instance requests are answered from.
    serving: Option<CacheInstance>,
}

pub struct Worker {
    db: CacheDb,
    network: Arc<dyn Network>,
    manifest: Manifest,
    settings: WorkerSettings,
    lifecycle: RwLock<Lifecycle>,
    pending: PendingWork,
}

impl Worker {
    pub fn new(db: CacheDb, network: Arc<dyn Network>, manifest: Manifest, settings: WorkerSettings) -> Self {
        Self {
            db,
            network,
            manifest,
            settings,
            lifecycle: RwLock::new(Lifecycle { state: WorkerState::Parsed, serving: None }),
            pending: PendingWork::new(),
        }
    }

    pub fn settings(&self) -> &WorkerSettings {
        &self.settings
    }

    pub fn pending(&self) -> &PendingWork {
        &self.pending
    }

    pub fn state(&self) -> WorkerState {
        self.lifecycle.read().unwrap_or_else(PoisonError::into_inner).state
    }

    /// The instance requests are currently answered from.
    pub fn serving(&self) -> Option<CacheInstance> {
        self.lifecycle
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .serving
            .clone()
    }

    fn set_state(&self, state: WorkerState) {
        let mut lifecycle = self.lifecycle.write().unwrap_or_else(PoisonError::into_inner);
        tracing::debug!(from = ?lifecycle.state, to = ?state, "worker state change");
        lifecycle.state = state;
    }

    /// Boot sequence: resume the previously active instance, install this
    /// version, and activate it right away when `skip_waiting` is set.
    ///
    /// An install failure is not an error here: it leaves the worker
    /// redundant while the previous instance keeps serving.
    pub async fn start(&self) -> Result<WorkerState, Error> {
        self.resume().await?;

        if let Err(e) = self.install().await {
            tracing::error!(error = %e, serving = ?self.serving().map(|c| c.name().to_string()), "install failed; keeping previous cache");
            return Ok(self.state());
        }

        if self.settings.skip_waiting {
            self.activate().await?;
        } else {
            tracing::info!(instance = %self.settings.cache_name, "installed; waiting for activation");
        }

        Ok(self.state())
    }

    /// Pick up the instance recorded by the last successful activation.
    pub async fn resume(&self) -> Result<(), Error> {
        let Some(name) = self.db.active_instance().await? else {
            return Ok(());
        };

        if !self.db.has_instance(&name).await? {
            tracing::warn!(instance = %name, "recorded active cache no longer exists");
            return Ok(());
        }

        tracing::info!(instance = %name, "resuming previously active cache");
        let mut lifecycle = self.lifecycle.write().unwrap_or_else(PoisonError::into_inner);
        lifecycle.serving = Some(self.db.instance_handle(&name));
        Ok(())
    }

    /// Install event.
    ///
    /// # Errors
    ///
    /// `Error::InstallFailed` if any manifest asset could not be fetched; the
    /// worker becomes redundant and nothing is stored.
    pub async fn install(&self) -> Result<(), Error> {
        self.set_state(WorkerState::Installing);

        let result = install::run(
            &self.db,
            self.network.as_ref(),
            &self.manifest,
            &self.settings.origin,
            &self.settings.cache_name,
            self.settings.size_budget,
        )
        .await;

        match result {
            Ok(_) => {
                self.set_state(WorkerState::Installed);
                Ok(())
            }
            Err(e) => {
                self.set_state(WorkerState::Redundant);
                Err(match e {
                    Error::InstallFailed(_) => e,
                    other => Error::InstallFailed(other.to_string()),
                })
            }
        }
    }

    /// Activate event: sweep every other instance, record this version as
    /// active and claim all clients.
    ///
    /// Re-running it once activated just sweeps again.
    pub async fn activate(&self) -> Result<SweepReport, Error> {
        let previous = self.state();
        if !matches!(previous, WorkerState::Installed | WorkerState::Activated) {
            return Err(Error::InvalidInput(format!("cannot activate from state {previous:?}")));
        }

        self.set_state(WorkerState::Activating);
        let name = self.settings.cache_name.clone();

        let report = match activate::sweep(&self.db, &name).await {
            Ok(report) => report,
            Err(e) => {
                self.set_state(previous);
                return Err(e);
            }
        };

        if let Err(e) = self.db.set_active_instance(&name).await {
            self.set_state(previous);
            return Err(e);
        }

        {
            let mut lifecycle = self.lifecycle.write().unwrap_or_else(PoisonError::into_inner);
            lifecycle.serving = Some(self.db.instance_handle(&name));
            lifecycle.state = WorkerState::Activated;
        }

        tracing::info!(
            instance = %name,
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            "activated; claimed clients"
        );
        Ok(report)
    }

    /// Message event.
    ///
    /// # Errors
    ///
    /// `Error::InvalidInput` for malformed messages, `UPDATE_CACHE` without
    /// usable data, or when no cache is active yet. The cache is untouched in
    /// every error case.
    pub fn message(&self, body: &[u8]) -> Result<MessageOutcome, Error> {
        let message = ControlMessage::parse(body).inspect_err(|e| {
            tracing::warn!(error = %e, "rejected control message");
        })?;

        let data = match message {
            ControlMessage::UpdateCache(data) => data,
            ControlMessage::Unknown(kind) => {
                tracing::debug!(kind = %kind, "ignoring unknown control message");
                return Ok(MessageOutcome::Ignored);
            }
        };

        let Some(cache) = self.serving() else {
            tracing::warn!("rejected control message: no active cache");
            return Err(Error::InvalidInput("no active cache".into()));
        };

        let response = Response::json(&data)?;
        let request = Request::get(self.settings.data_key.clone());
        let budget = self.settings.size_budget;

        self.pending.wait_until(async move {
            if store_and_evict(&cache, &request, &response, budget).await {
                tracing::info!(url = %request.url, "control message stored data");
            }
        });

        Ok(MessageOutcome::Accepted)
    }

    pub async fn status(&self) -> Result<WorkerStatus, Error> {
        let serving = self.serving();
        let (entries, total_bytes) = match &serving {
            Some(cache) => {
                let entries = cache.entries().await?;
                (entries.len(), entries.iter().map(|e| e.size).sum())
            }
            None => (0, 0),
        };

        Ok(WorkerStatus {
            state: self.state(),
            version: self.settings.cache_name.clone(),
            serving: serving.map(|c| c.name().to_string()),
            entries,
            total_bytes,
            pending: self.pending.len(),
        })
    }
}

/// Write `response` under `request`, then run an eviction pass.
///
/// Failures are logged; returns whether the write happened.
pub(crate) async fn store_and_evict(cache: &CacheInstance, request: &Request, response: &Response, budget: u64) -> bool {
    if let Err(e) = cache.put(request, response).await {
        tracing::warn!(instance = cache.name(), url = %request.url, error = %e, "failed to store response");
        return false;
    }
    if let Err(e) = cache.limit_size(budget).await {
        tracing::warn!(instance = cache.name(), error = %e, "eviction pass failed");
    }
    true
}
