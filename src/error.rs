use std::fmt;

use thiserror::Error;

use crate::adoption::ObjectKey;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChildKind {
    ServiceAccount,
    Role,
    RoleBinding,
    Pod,
    Service,
}

impl fmt::Display for ChildKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChildKind::ServiceAccount => "service account",
            ChildKind::Role => "role",
            ChildKind::RoleBinding => "rolebinding",
            ChildKind::Pod => "pod",
            ChildKind::Service => "service",
        })
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("cache closed before its initial sync: {0}")]
    CacheSync(#[from] kube::runtime::reflector::store::WriterDropped),

    #[error("unable to get configmap {namespace}/{name} from cache")]
    ContentSourceMissing { namespace: String, name: String },

    #[error("error ensuring {kind}: {name}: {source}")]
    Ensure {
        kind: ChildKind,
        name: String,
        #[source]
        source: Box<Error>,
    },

    #[error("error updating status of catalog source {name}: {source}")]
    StatusUpdate {
        name: String,
        #[source]
        source: Box<Error>,
    },

    #[error("invalid component label key {key}: {reason}")]
    InvalidLabelKey { key: String, reason: String },

    #[error("failed to adopt {} component(s) of {parent}", .failures.len())]
    Adoption {
        parent: String,
        failures: Vec<AdoptionFailure>,
    },
}

#[derive(Debug)]
pub struct AdoptionFailure {
    pub object: ObjectKey,
    pub error: Error,
}

impl Error {
    pub(crate) fn ensuring(kind: ChildKind, name: impl Into<String>) -> impl FnOnce(Error) -> Error {
        let name = name.into();
        move |source| Error::Ensure {
            kind,
            name,
            source: Box::new(source),
        }
    }

    /// The innermost error, looking through reconcile-step wrappers.
    pub fn root(&self) -> &Error {
        match self {
            Error::Ensure { source, .. } | Error::StatusUpdate { source, .. } => source.root(),
            other => other,
        }
    }

    fn api_status(&self) -> Option<(u16, &str)> {
        match self.root() {
            Error::Kube(kube::Error::Api(response)) => {
                Some((response.code, response.reason.as_str()))
            }
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.api_status(), Some((404, _)))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self.api_status(), Some((409, "AlreadyExists")))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self.api_status(), Some((409, reason)) if reason != "AlreadyExists")
    }

    /// Failures another pass is expected to resolve without backing off.
    pub fn is_transient(&self) -> bool {
        self.is_conflict() || self.is_already_exists()
    }

    /// Failures no retry can fix until the object itself changes.
    pub fn is_permanent(&self) -> bool {
        matches!(self.root(), Error::InvalidLabelKey { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
