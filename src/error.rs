use crate::transfer::TaskId;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The reference grid is malformed or inconsistent.
    #[error("invalid manifest: {0}")]
    Manifest(String),
    /// A backing file could not be read.
    #[error("source {uri} is unavailable: {reason}")]
    SourceUnavailable { uri: String, reason: String },
    /// A backing file contradicts its reference.
    #[error("format mismatch in {uri}: {reason}")]
    FormatMismatch { uri: String, reason: String },
    #[error("index error: {0}")]
    Index(String),
    #[error("could not resolve a destination endpoint: {0}")]
    EndpointResolution(String),
    #[error("transfer {} failed: {cause}", describe_task(.task_id))]
    Transfer {
        task_id: Option<TaskId>,
        cause: String,
    },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("{0}")]
    General(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    #[error(transparent)]
    Wrapped(Box<dyn std::error::Error + Send + Sync>),
}

fn describe_task(task_id: &Option<TaskId>) -> String {
    match task_id {
        Some(id) => format!("task {id}"),
        None => "request (not submitted)".into(),
    }
}

impl Error {
    pub fn general(message: impl Into<String>) -> Self {
        Self::General(message.into())
    }

    pub fn wrap(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Wrapped(Box::new(error))
    }

    pub fn manifest(message: impl Into<String>) -> Self {
        Self::Manifest(message.into())
    }

    pub fn index(message: impl Into<String>) -> Self {
        Self::Index(message.into())
    }

    pub fn source_unavailable(uri: impl Into<String>, reason: impl ToString) -> Self {
        Self::SourceUnavailable {
            uri: uri.into(),
            reason: reason.to_string(),
        }
    }

    pub fn format_mismatch(uri: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::FormatMismatch {
            uri: uri.into(),
            reason: reason.into(),
        }
    }

    pub fn transfer(task_id: Option<TaskId>, cause: impl Into<String>) -> Self {
        Self::Transfer {
            task_id,
            cause: cause.into(),
        }
    }
}
