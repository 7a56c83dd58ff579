//! Error types for chaos-rs

use thiserror::Error;

/// Errors that can occur when talking to the cluster, the registry or kubectl
#[derive(Error, Debug)]
pub enum ChaosError {
    /// Configuration file not found
    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    /// Failed to parse configuration
    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    ConfigInvalid(String),

    /// Account not found in config
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Stored access token is past its expiry
    #[error("Access token for {0} has expired, log in again")]
    TokenExpired(String),

    /// No home directory found
    #[error("Could not determine home directory")]
    NoHomeDirectory,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to build a Kubernetes client
    #[error("Failed to create K8s client: {0}")]
    ClientCreate(String),

    /// Object does not exist in the cluster
    #[error("{kind} \"{name}\" not found")]
    NotFound { kind: &'static str, name: String },

    /// Object already exists (cluster or registry)
    #[error("{kind} \"{name}\" already exists")]
    AlreadyExists { kind: &'static str, name: String },

    /// Any other Kubernetes API failure
    #[error("K8s API error: {0}")]
    Kube(#[from] kube::Error),

    /// Pod watch stream failure
    #[error("Watch error: {0}")]
    Watch(String),

    /// HTTP transport error talking to the registry
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Credentials rejected by the control plane
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Registry answered with GraphQL errors
    #[error("Registry error: {0}")]
    Registry(String),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// kubectl invocation failed
    #[error("kubectl failed: {0}")]
    Kubectl(String),
}

impl ChaosError {
    /// Whether the error means the object is absent, as opposed to a
    /// transient or authorization failure.
    pub fn is_not_found(&self) -> bool {
        match self {
            ChaosError::NotFound { .. } => true,
            ChaosError::Kube(kube::Error::Api(ae)) => ae.code == 404,
            _ => false,
        }
    }

    /// Whether the error reports a create conflict.
    pub fn is_already_exists(&self) -> bool {
        match self {
            ChaosError::AlreadyExists { .. } => true,
            ChaosError::Kube(kube::Error::Api(ae)) => ae.code == 409,
            _ => false,
        }
    }

    /// Whether the credentials were rejected.
    pub fn is_unauthorized(&self) -> bool {
        match self {
            ChaosError::Unauthorized(_) | ChaosError::TokenExpired(_) => true,
            ChaosError::Kube(kube::Error::Api(ae)) => ae.code == 401,
            ChaosError::Kube(kube::Error::Auth(_)) => true,
            ChaosError::Http(e) => e.status() == Some(reqwest::StatusCode::UNAUTHORIZED),
            _ => false,
        }
    }

    /// Whether the remote end could not be reached at all.
    pub fn is_unreachable(&self) -> bool {
        use std::io::ErrorKind;
        match self {
            ChaosError::Http(e) => e.is_connect() || e.is_timeout(),
            ChaosError::Kube(kube::Error::HyperError(_) | kube::Error::Service(_)) => true,
            ChaosError::Io(e) => matches!(
                e.kind(),
                ErrorKind::ConnectionRefused
                    | ErrorKind::ConnectionReset
                    | ErrorKind::TimedOut
                    | ErrorKind::NotConnected
            ),
            _ => false,
        }
    }

    /// Classify a kube error for a named object, turning 404/409 into the
    /// typed variants.
    pub fn from_kube(err: kube::Error, kind: &'static str, name: &str) -> Self {
        match err {
            kube::Error::Api(ae) if ae.code == 404 => ChaosError::NotFound {
                kind,
                name: name.to_string(),
            },
            kube::Error::Api(ae) if ae.code == 409 => ChaosError::AlreadyExists {
                kind,
                name: name.to_string(),
            },
            other => ChaosError::Kube(other),
        }
    }
}
