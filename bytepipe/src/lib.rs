#![deny(missing_docs)]
#![deny(unused_doc_comments)]

//! This crate contains the main implementations for the bytepipe library. A pipeline moves bytes
//! from a single source, through an ordered list of filters, into a single sink. Sources, filters
//! and sinks are looked up by name in a registry and constructed from a declarative config file,
//! so a run is wired entirely from configuration. Data is streamed through the chain and never
//! fully buffered in memory.

use crate::registry::StageKind;
use std::fmt;
use std::io;

/// Concrete source, filter and sink implementations.
pub mod adapter;
/// Loading and parsing of the pipeline configuration.
pub mod config;
/// The main pipeline: chain construction from a config, and the copy loop driving it.
pub mod pipeline;
/// The name to constructor registry for all stage kinds.
pub mod registry;
/// Bounded blocking relay used to bridge push style producers to pull style consumers.
pub mod relay;
/// The contract implemented by every pipeline stage.
pub mod stage;

/// Global result type for pipeline operations
pub type PipeResult<T> = Result<T, PipeError>;

/// An error originating in a pipeline or one of its stages
#[derive(Debug)]
pub struct PipeError {
    kind: PipeErrorKind,
    internal: InternalError,
}

impl fmt::Display for PipeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.internal {
            InternalError::None => write!(f, "error during {}", self.kind),
            ref internal => write!(f, "error during {}: {}", self.kind, internal),
        }
    }
}

impl std::error::Error for PipeError {
    fn cause(&self) -> Option<&dyn std::error::Error> {
        match self.internal {
            InternalError::Io(ref e) => Some(e),
            InternalError::Other(ref e) => Some(e.as_ref()),
            InternalError::Msg(_) | InternalError::None => None,
        }
    }
}

impl PipeError {
    /// Create a new PipeError from an IO error.
    pub fn new_io(kind: PipeErrorKind, e: io::Error) -> Self {
        PipeError {
            kind,
            internal: InternalError::Io(e),
        }
    }

    /// Create a new PipeError from any kind, with the underlying error included.
    pub fn new(kind: PipeErrorKind, internal: Box<dyn std::error::Error + Send>) -> Self {
        PipeError {
            kind,
            internal: InternalError::Other(internal),
        }
    }

    /// Create a new PipeError carrying only a message describing the failure.
    pub fn new_msg(kind: PipeErrorKind, msg: String) -> Self {
        PipeError {
            kind,
            internal: InternalError::Msg(msg),
        }
    }

    /// Create a new PipeError for a missing or invalid per-stage configuration key.
    pub fn parameter(key: &str) -> Self {
        PipeError {
            kind: PipeErrorKind::Parameter(key.to_string()),
            internal: InternalError::None,
        }
    }

    /// The location in the pipeline lifecycle where this error occurred.
    pub fn kind(&self) -> &PipeErrorKind {
        &self.kind
    }
}

/// Wrapper error for the PipeError
#[derive(Debug)]
enum InternalError {
    Io(io::Error),
    Other(Box<dyn std::error::Error + Send>),
    Msg(String),
    None,
}

impl fmt::Display for InternalError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            InternalError::Io(e) => write!(f, "{}", e),
            InternalError::Other(e) => write!(f, "{}", e),
            InternalError::Msg(msg) => write!(f, "{}", msg),
            InternalError::None => Ok(()),
        }
    }
}

/// Information about where in the pipeline lifecycle the error occurred.
#[derive(Debug)]
pub enum PipeErrorKind {
    /// An error while loading or parsing the pipeline configuration file.
    Config,
    /// A required per-stage configuration key is missing or empty.
    Parameter(String),
    /// A stage type name for which no constructor is registered.
    UnknownStage(StageKind, String),
    /// An error while constructing a stage from its configuration.
    Construct(StageKind, String),
    /// An error while attaching a filter to its upstream.
    Link(String),
    /// A filter was read before being linked to an upstream.
    NotConnected,
    /// An error while moving bytes through the chain.
    Stream,
    /// An error while flushing buffered output to the sink.
    Flush,
    /// An error while closing the sink.
    Close,
}

impl fmt::Display for PipeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PipeErrorKind::Config => write!(f, "loading configuration"),
            PipeErrorKind::Parameter(key) => write!(f, "reading stage config key \"{}\"", key),
            PipeErrorKind::UnknownStage(kind, name) => {
                write!(f, "resolving unknown {} type \"{}\"", kind, name)
            }
            PipeErrorKind::Construct(kind, name) => {
                write!(f, "constructing {} \"{}\"", kind, name)
            }
            PipeErrorKind::Link(name) => write!(f, "linking filter \"{}\"", name),
            PipeErrorKind::NotConnected => write!(f, "reading unlinked filter"),
            PipeErrorKind::Stream => write!(f, "piping data"),
            PipeErrorKind::Flush => write!(f, "flushing data"),
            PipeErrorKind::Close => write!(f, "closing pipeline"),
        }
    }
}

impl From<crate::config::ConfigError> for PipeError {
    fn from(e: crate::config::ConfigError) -> Self {
        PipeError {
            kind: PipeErrorKind::Config,
            internal: InternalError::Other(Box::new(e)),
        }
    }
}

impl From<serde_json::Error> for PipeError {
    fn from(e: serde_json::Error) -> Self {
        PipeError {
            kind: PipeErrorKind::Config,
            internal: InternalError::Other(Box::new(e)),
        }
    }
}
