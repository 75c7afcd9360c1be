//! # Error Taxonomy
//!
//! Three layers of failure, kept apart so callers can tell "never reached the
//! store" from "the round trip failed" from "the reply had the wrong shape":
//!
//! - `ClientError`: transport and protocol failures.
//! - `PipelineError`: append validation, connection acquisition, execution,
//!   and result coercion.
//! - `ConfigError`: loading named connection settings.

use std::collections::HashMap;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for transport-level calls.
pub type ClientResult<T> = Result<T, ClientError>;

/// Result type for pipeline and coercion calls.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors surfaced by the transport.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network or IO failure while reading/writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// RESP2 framing or parse error.
    #[error("protocol error")]
    Protocol,
    /// Server returned an error reply where a command had to succeed.
    #[error("server error: {}", String::from_utf8_lossy(.message))]
    Server { message: Vec<u8> },
    /// Response type did not match the expected command response.
    #[error("unexpected response")]
    UnexpectedResponse,
    /// Address could not be parsed into a socket address.
    #[error("invalid address: {addr}")]
    InvalidAddress { addr: String },
    /// No connection is configured under the requested name.
    #[error("unknown connection: {name}")]
    UnknownConnection { name: String },
}

/// Errors surfaced by the pipeline and the result coercers.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Caller input rejected before any store interaction.
    #[error("[{op}] invalid input: {reason}")]
    Validation { op: &'static str, reason: &'static str },
    /// Pipeline was never bound to a connection.
    #[error("[{op}] pipeline is uninitialized")]
    Uninitialized { op: &'static str },
    /// Batch was already sent; a new pipeline is required.
    #[error("[{op}] pipeline already executed")]
    AlreadyExecuted { op: &'static str },
    /// Connection provider could not hand back a live connection.
    #[error("cannot get connection `{name}`")]
    Connection {
        name: String,
        #[source]
        source: ClientError,
    },
    /// Round trip for the batch failed.
    #[error("error executing {commands} pipelined commands")]
    Execution {
        commands: usize,
        #[source]
        source: ClientError,
    },
    /// Coercion input had the wrong shape or could not be parsed.
    #[error("[{coercer}] invalid type result: expected {expected}, found {found}")]
    TypeMismatch {
        coercer: &'static str,
        expected: &'static str,
        found: String,
    },
    /// Coercion succeeded partially.
    #[error(transparent)]
    MissingField(MissingFields),
}

impl PipelineError {
    /// Returns the partial result when this is a missing-field error.
    pub fn partial(&self) -> Option<&HashMap<String, String>> {
        match self {
            PipelineError::MissingField(missing) => Some(missing.partial()),
            _ => None,
        }
    }
}

/// Partial-success payload: the fields that were absent plus everything that
/// was present.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("field is missing in cache: [{}]", .missing.join(", "))]
pub struct MissingFields {
    missing: Vec<String>,
    partial: HashMap<String, String>,
}

impl MissingFields {
    pub fn new(missing: Vec<String>, partial: HashMap<String, String>) -> Self {
        MissingFields { missing, partial }
    }

    /// Names of every missing field, in request order.
    pub fn missing(&self) -> &[String] {
        &self.missing
    }

    /// Present fields; still usable by the caller.
    pub fn partial(&self) -> &HashMap<String, String> {
        &self.partial
    }

    pub fn into_partial(self) -> HashMap<String, String> {
        self.partial
    }
}

/// Errors raised while loading connection configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
    /// Default connection name does not match any configured connection.
    #[error("default connection `{name}` is not configured")]
    UnknownDefault { name: String },
}
