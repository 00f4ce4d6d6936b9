//! Bulk relocation of a dataset's files through a remote transfer service.
//!
//! The service itself is external and reached through [`TransferService`];
//! this module builds the single bulk request for a dataset, follows the
//! resulting task to a terminal state, and on success rebinds the dataset to
//! the destination. The dataset is never locked while a task is running, and
//! is left untouched unless the task succeeds.

use std::fmt;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::dataset::{Dataset, Meta};

/// Bounds applied to the configured polling interval.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);
const MAX_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Identifier of a submitted transfer task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One bulk transfer of many files between two endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub source_endpoint: String,
    pub destination_endpoint: String,
    pub destination_path: PathBuf,
    /// Absolute source paths on the source endpoint.
    pub file_list: Vec<String>,
}

/// A submitted request, alive until its task reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferTask {
    pub task_id: TaskId,
    pub request: TransferRequest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Active,
    Succeeded,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskStatus {
    pub state: TaskState,
    /// Completion in the range `0.0..=100.0`.
    pub percent: f64,
}

pub type ServiceError = Box<dyn std::error::Error + Send + Sync>;

/// A remote bulk-transfer service.
pub trait TransferService: Send + Sync {
    /// Submit a request, returning the id of the created task.
    fn submit(&self, request: &TransferRequest) -> Result<TaskId, ServiceError>;

    fn poll(&self, task_id: &TaskId) -> Result<TaskStatus, ServiceError>;

    /// Block until the task is terminal or `timeout` elapses, returning
    /// [`TaskState::Active`] on timeout.
    fn wait(&self, task_id: &TaskId, timeout: Duration) -> Result<TaskState, ServiceError>;
}

/// Discovers the transfer endpoint of the local machine.
pub trait EndpointResolver: Send + Sync {
    fn local_endpoint(&self) -> Option<String>;
}

/// A resolver which never finds a local endpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLocalEndpoint;

impl EndpointResolver for NoLocalEndpoint {
    fn local_endpoint(&self) -> Option<String> {
        None
    }
}

/// Reads the local endpoint id from an environment variable.
#[derive(Debug, Clone)]
pub struct EnvironmentEndpoint {
    variable: String,
}

impl EnvironmentEndpoint {
    pub fn new(variable: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
        }
    }
}

impl EndpointResolver for EnvironmentEndpoint {
    fn local_endpoint(&self) -> Option<String> {
        std::env::var(&self.variable).ok().filter(|v| !v.is_empty())
    }
}

/// Settings for [`TransferCoordinator`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Endpoint holding the original files.
    pub source_endpoint: String,
    /// Remote root of a dataset's files; `{key}` is replaced by the dataset
    /// metadata value of `key`.
    #[serde(default = "default_dataset_path")]
    pub dataset_path: String,
    /// Directory downloads go to when none is given.
    #[serde(default = "default_destination")]
    pub default_destination: PathBuf,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Whether the dataset document must travel with its files. When set, a
    /// dataset whose metadata has no `manifest_object_key` cannot be
    /// downloaded; otherwise only the data files are moved.
    #[serde(default = "default_manifest_object_required")]
    pub manifest_object_required: bool,
}

fn default_dataset_path() -> String {
    "/{primary_proposal_id}/{dataset_id}".into()
}

fn default_destination() -> PathBuf {
    PathBuf::from("/~/")
}

fn default_timeout_secs() -> u64 {
    1_000_000
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_manifest_object_required() -> bool {
    true
}

impl TransferConfig {
    pub fn new(source_endpoint: impl Into<String>) -> Self {
        Self {
            source_endpoint: source_endpoint.into(),
            dataset_path: default_dataset_path(),
            default_destination: default_destination(),
            timeout_secs: default_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            manifest_object_required: default_manifest_object_required(),
        }
    }

    /// Load from a JSON file; omitted fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        serde_json::from_reader(std::io::BufReader::new(file)).map_err(|e| {
            crate::Error::Config(format!("could not parse {}: {e}", path.display()))
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The polling interval, clamped to a sane range.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms).clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL)
    }
}

/// Per-call options for [`TransferCoordinator::download`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOptions {
    /// Directory to place the dataset's directory in; defaults to
    /// [`TransferConfig::default_destination`].
    pub path: Option<PathBuf>,
    /// Defaults to the local endpoint.
    pub destination_endpoint: Option<String>,
    /// Poll and report progress rather than blocking on the service.
    pub progress: bool,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            path: None,
            destination_endpoint: None,
            progress: true,
        }
    }
}

/// A progress report for a running task.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferProgress {
    pub task_id: TaskId,
    pub percent: f64,
    pub elapsed: Duration,
    pub eta: Option<Duration>,
}

impl TransferProgress {
    fn new(task_id: &TaskId, percent: f64, elapsed: Duration) -> Self {
        let percent = percent.clamp(0.0, 100.0);
        let eta = (percent > 0.0)
            .then(|| {
                Duration::try_from_secs_f64(elapsed.as_secs_f64() * (100.0 - percent) / percent)
                    .ok()
            })
            .flatten();
        Self {
            task_id: task_id.clone(),
            percent,
            elapsed,
            eta,
        }
    }
}

fn log_progress(progress: &TransferProgress) -> ControlFlow<()> {
    match progress.eta {
        Some(eta) => log::info!(
            "transfer {}: {:.1}% complete, about {}s remaining",
            progress.task_id,
            progress.percent,
            eta.as_secs()
        ),
        None => log::info!("transfer {}: {:.1}% complete", progress.task_id, progress.percent),
    }
    ControlFlow::Continue(())
}

fn meta_string(meta: &Meta, key: &str) -> crate::Result<String> {
    match meta.get(key) {
        Some(serde_json::Value::String(s)) => Ok(s.clone()),
        Some(serde_json::Value::Number(n)) => Ok(n.to_string()),
        Some(other) => Err(crate::Error::Config(format!(
            "dataset metadata {key:?} is not a string or number: {other}"
        ))),
        None => Err(crate::Error::Config(format!(
            "dataset metadata has no {key:?}"
        ))),
    }
}

/// Replace each `{key}` in `template` with the metadata value of `key`.
fn format_template(template: &str, meta: &Meta) -> crate::Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(|| {
            crate::Error::Config(format!("unclosed '{{' in dataset path {template:?}"))
        })?;
        out.push_str(&meta_string(meta, &after[..close])?);
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Moves a dataset's files with a [`TransferService`].
pub struct TransferCoordinator {
    service: Arc<dyn TransferService>,
    resolver: Arc<dyn EndpointResolver>,
    config: TransferConfig,
}

impl TransferCoordinator {
    pub fn new(
        service: Arc<dyn TransferService>,
        resolver: Arc<dyn EndpointResolver>,
        config: TransferConfig,
    ) -> Self {
        Self {
            service,
            resolver,
            config,
        }
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Build the bulk request which would move `dataset`'s files.
    pub fn plan(&self, dataset: &Dataset, options: &DownloadOptions) -> crate::Result<TransferRequest> {
        let files = dataset
            .files()
            .ok_or_else(|| crate::Error::general("dataset has no backing files to transfer"))?;

        let destination_endpoint = match &options.destination_endpoint {
            Some(e) => e.clone(),
            None => self.resolver.local_endpoint().ok_or_else(|| {
                crate::Error::EndpointResolution(
                    "no destination endpoint given and no local endpoint found".into(),
                )
            })?,
        };

        let meta = dataset.meta();
        let root = format_template(&self.config.dataset_path, meta)?;
        let root = root.trim_end_matches('/');
        let mut file_list: Vec<String> = files
            .filenames()
            .iter()
            .map(|f| format!("{root}/{f}"))
            .collect();
        if self.config.manifest_object_required {
            file_list.push(meta_string(meta, "manifest_object_key")?);
        } else if let Some(key) = meta.get("manifest_object_key").and_then(|v| v.as_str()) {
            file_list.push(key.to_string());
        }

        let destination_path = options
            .path
            .as_deref()
            .unwrap_or(self.config.default_destination.as_path())
            .join(meta_string(meta, "dataset_id")?);

        Ok(TransferRequest {
            source_endpoint: self.config.source_endpoint.clone(),
            destination_endpoint,
            destination_path,
            file_list,
        })
    }

    /// Transfer `dataset`'s files and rebind it to the destination, logging
    /// progress when requested.
    pub fn download(&self, dataset: &Dataset, options: DownloadOptions) -> crate::Result<()> {
        self.download_with_progress(dataset, options, log_progress)
    }

    /// As [`TransferCoordinator::download`], reporting progress to
    /// `on_progress`. Returning [`ControlFlow::Break`] stops local polling
    /// and fails the download; the remote task keeps running.
    ///
    /// # Errors
    /// [`Error::EndpointResolution`](crate::Error::EndpointResolution) if no
    /// destination endpoint is available, and
    /// [`Error::Transfer`](crate::Error::Transfer) if the task cannot be
    /// submitted, fails, times out or is abandoned. The dataset is unchanged
    /// on any error.
    pub fn download_with_progress(
        &self,
        dataset: &Dataset,
        options: DownloadOptions,
        on_progress: impl FnMut(&TransferProgress) -> ControlFlow<()>,
    ) -> crate::Result<()> {
        let request = self.plan(dataset, &options)?;
        let task_id = self
            .service
            .submit(&request)
            .map_err(|e| crate::Error::transfer(None, e.to_string()))?;
        log::info!(
            "submitted transfer task {task_id} of {} files to {}:{}",
            request.file_list.len(),
            request.destination_endpoint,
            request.destination_path.display()
        );
        let task = TransferTask { task_id, request };

        let outcome = if options.progress {
            self.watch(&task, on_progress)
        } else {
            self.block(&task)
        };
        if let Err(e) = outcome {
            log::warn!("{e}");
            return Err(e);
        }

        dataset.rebase(&task.request.destination_path);
        log::info!(
            "transfer task {} complete; dataset now reads from {}",
            task.task_id,
            task.request.destination_path.display()
        );
        Ok(())
    }

    fn fail(task: &TransferTask, cause: impl Into<String>) -> crate::Error {
        crate::Error::transfer(Some(task.task_id.clone()), cause)
    }

    fn block(&self, task: &TransferTask) -> crate::Result<()> {
        let timeout = self.config.timeout();
        let state = self
            .service
            .wait(&task.task_id, timeout)
            .map_err(|e| Self::fail(task, e.to_string()))?;
        match state {
            TaskState::Succeeded => Ok(()),
            TaskState::Failed(cause) => Err(Self::fail(task, cause)),
            TaskState::Active => Err(Self::fail(
                task,
                format!("task did not finish within {}s", timeout.as_secs()),
            )),
        }
    }

    fn watch(
        &self,
        task: &TransferTask,
        mut on_progress: impl FnMut(&TransferProgress) -> ControlFlow<()>,
    ) -> crate::Result<()> {
        let timeout = self.config.timeout();
        let interval = self.config.poll_interval();
        let start = Instant::now();
        loop {
            let status = self
                .service
                .poll(&task.task_id)
                .map_err(|e| Self::fail(task, e.to_string()))?;
            let elapsed = start.elapsed();
            match status.state {
                TaskState::Succeeded => {
                    let _ = on_progress(&TransferProgress::new(&task.task_id, 100.0, elapsed));
                    return Ok(());
                }
                TaskState::Failed(cause) => return Err(Self::fail(task, cause)),
                TaskState::Active => {}
            }
            let progress = TransferProgress::new(&task.task_id, status.percent, elapsed);
            if on_progress(&progress).is_break() {
                return Err(Self::fail(
                    task,
                    "progress monitoring stopped locally; the remote task was not cancelled",
                ));
            }
            if elapsed >= timeout {
                return Err(Self::fail(
                    task,
                    format!("task did not finish within {}s", timeout.as_secs()),
                ));
            }
            std::thread::sleep(interval);
        }
    }
}
