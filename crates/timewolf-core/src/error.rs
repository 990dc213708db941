//! Error taxonomy shared by modules, the runner and the pipeline.
//!
//! A module stage never throws: it returns a [`ModuleError`] carrying an
//! explicit [`ErrorKind`] and a [`Fatality`]. Escalation decisions are made
//! from those two values and the stage alone.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Message surfaced for permission-class (HTTP 403) transport failures.
pub const PERMISSION_DENIED_MESSAGE: &str =
    "403 response. Do you have appropriate permissions on the project?";

/// What went wrong, independent of where it happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorKind {
    /// Invalid or insufficient module configuration.
    Configuration,
    /// A targeted external resource does not exist.
    ResourceNotFound,
    /// A write-side external operation failed.
    ResourceCreation,
    /// The caller lacks permission on the external system.
    Permission,
    /// Transport failure with an unclassified status code.
    Transport { status: u16 },
    /// Too many items of a stage failed.
    AggregateFailure,
    /// A per-item call overran the configured timeout.
    Timeout,
    /// Anything else, including a panicking worker.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Configuration => write!(f, "configuration error"),
            ErrorKind::ResourceNotFound => write!(f, "resource not found"),
            ErrorKind::ResourceCreation => write!(f, "resource creation error"),
            ErrorKind::Permission => write!(f, "permission error"),
            ErrorKind::Transport { status } => write!(f, "transport error ({})", status),
            ErrorKind::AggregateFailure => write!(f, "aggregate failure"),
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::Internal => write!(f, "internal error"),
        }
    }
}

/// How far an error is allowed to travel.
///
/// `Default` leaves the decision to the stage: single-threaded stages abort
/// the run, Process fails only the item. `Fatal` always aborts the run;
/// `Soft` confines the error to the module or item that raised it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fatality {
    #[default]
    Default,
    Fatal,
    Soft,
}

/// Error returned by any module lifecycle stage.
#[derive(Error, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct ModuleError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default)]
    pub fatality: Fatality,
}

pub type ModuleResult<T> = std::result::Result<T, ModuleError>;

impl ModuleError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            fatality: Fatality::Default,
        }
    }

    /// Configuration errors are always fatal.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message).fatal()
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ResourceNotFound, message)
    }

    pub fn creation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ResourceCreation, message)
    }

    pub fn permission(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Permission, message)
    }

    /// Aggregate failures are fatal even when raised from Process; a module
    /// may soften them.
    pub fn aggregate(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AggregateFailure, message).fatal()
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Marks this error as run-aborting, whatever the stage.
    pub fn fatal(mut self) -> Self {
        self.fatality = Fatality::Fatal;
        self
    }

    /// Confines this error to the module (or item) that raised it.
    pub fn non_fatal(mut self) -> Self {
        self.fatality = Fatality::Soft;
        self
    }

    pub fn is_fatal(&self) -> bool {
        self.fatality == Fatality::Fatal
    }

    pub fn is_soft(&self) -> bool {
        self.fatality == Fatality::Soft
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_configuration(&self) -> bool {
        self.kind == ErrorKind::Configuration
    }
}

/// Failure reported by an external-system client, keyed by a status code.
///
/// `raw` is the client's own rendering of the failure and is surfaced
/// verbatim when the status is not one of the known classes.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[error("{raw}")]
pub struct TransportError {
    pub status: u16,
    pub raw: String,
}

impl TransportError {
    pub fn new(status: u16, raw: impl Into<String>) -> Self {
        Self {
            status,
            raw: raw.into(),
        }
    }

    /// Buckets the failure into the error taxonomy. The result keeps the
    /// default fatality, so the stage it surfaces in decides its reach.
    pub fn classify(&self) -> ModuleError {
        match self.status {
            403 => ModuleError::permission(PERMISSION_DENIED_MESSAGE),
            404 => ModuleError::not_found(self.raw.clone()),
            status => ModuleError::new(ErrorKind::Transport { status }, self.raw.clone()),
        }
    }
}

impl From<TransportError> for ModuleError {
    fn from(err: TransportError) -> Self {
        err.classify()
    }
}

/// Failures while decoding or registering attribute containers.
#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("unknown container type: {0}")]
    UnknownType(String),

    #[error("container type already registered: {0}")]
    DuplicateType(String),

    #[error("invalid {tag} container: {source}")]
    Decode {
        tag: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed container envelope: {0}")]
    Envelope(String),

    #[error("table row has {got} values, expected {expected}")]
    RowWidth { expected: usize, got: usize },
}

impl ContainerError {
    pub fn decode(tag: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Decode {
            tag: tag.into(),
            source,
        }
    }
}

impl From<ContainerError> for ModuleError {
    fn from(err: ContainerError) -> Self {
        ModuleError::configuration(err.to_string())
    }
}
