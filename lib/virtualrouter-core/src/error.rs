use thiserror::Error;

pub type Result<T> = std::result::Result<T, ControllerError>;

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("invalid resource key: {0}")]
    InvalidKey(String),

    #[error("{0}: deployment name must be specified")]
    MissingDeploymentName(String),

    #[error("Resource {0:?} already exists and is not managed by VirtualRouter")]
    ResourceExists(String),

    #[error("object {0} has no uid")]
    MissingUid(String),

    #[error("Kubernetes error: {0}")]
    KubernetesError(#[from] kube::error::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("invalid controller configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to wait for caches to sync")]
    CacheSync,

    #[error("worker panicked: {0}")]
    WorkerPanicked(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ControllerError {
    /// Whether requeueing the key can make progress on this error.
    ///
    /// Terminal errors describe the current revision of the object; only a
    /// new watch event will change the outcome.
    pub fn is_retryable(&self) -> bool {
        match self {
            ControllerError::InvalidKey(_)
            | ControllerError::MissingDeploymentName(_)
            | ControllerError::MissingUid(_)
            | ControllerError::InvalidConfig(_) => false,
            ControllerError::ResourceExists(_)
            | ControllerError::KubernetesError(_)
            | ControllerError::SerializationError(_)
            | ControllerError::CacheSync
            | ControllerError::WorkerPanicked(_)
            | ControllerError::Internal(_) => true,
        }
    }

    /// True for an API 409 raised by optimistic concurrency on write
    pub fn is_conflict(&self) -> bool {
        matches!(self, ControllerError::KubernetesError(e) if api_code(e) == Some(409))
    }
}

fn api_code(err: &kube::Error) -> Option<u16> {
    match err {
        kube::Error::Api(response) => Some(response.code),
        _ => None,
    }
}
