//! Error types for node orchestration
//!
//! Construction problems surface as [`ConfigError`], a single failed shim
//! invocation as [`AttemptError`], and everything a caller of a node sees as
//! [`NodeError`].

use thiserror::Error;

/// Errors raised while building a node or fleet configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required option was not supplied.
    #[error("missing required option `{0}`")]
    MissingField(&'static str),

    /// An option was supplied with the wrong JSON type.
    #[error("option `{field}` must be {expected}")]
    InvalidType {
        field: &'static str,
        expected: &'static str,
    },

    /// An option has the right type but an unusable value.
    #[error("option `{field}` is invalid: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    /// Two nodes in a fleet share a name.
    #[error("node name `{0}` is used more than once")]
    DuplicateName(String),

    /// Two nodes in a fleet share a listen port.
    #[error("port {port} is used by both `{first}` and `{second}`")]
    DuplicatePort {
        port: u16,
        first: String,
        second: String,
    },

    /// A shim variable has neither a value nor a default.
    #[error("shim variable {0} is unset and has no default")]
    MissingShimVariable(&'static str),

    /// Reading or writing a configuration file failed.
    #[error("failed to access {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A configuration file is not valid JSON.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Why one shim attempt did not produce a result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttemptError {
    /// The process manager or shim exited unsuccessfully.
    #[error("exited with status {code:?}: {stderr}")]
    ExitStatus { code: Option<i32>, stderr: String },

    /// Nothing on stdout but the shim complained on stderr, usually while lnd starts.
    #[error("connection problem: {0}")]
    Connection(String),

    /// Neither stdout nor stderr carried anything.
    #[error("no response from the process")]
    NoResponse,

    /// The process could not be spawned at all.
    #[error("failed to run command: {0}")]
    Spawn(String),

    /// Stdout was not a JSON record.
    #[error("failed to parse output: {0}")]
    Parse(String),
}

/// Errors surfaced by node operations.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The command string is empty, so there is nothing to send to the shim.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// The process manager refused to launch the node for a reason other than a name conflict.
    #[error("failed to launch node `{node}`: {reason}")]
    LaunchFailed { node: String, reason: String },

    /// Every exec attempt failed; `last` is the final attempt's reason.
    #[error("`{command}` failed after {attempts} attempts: {last}")]
    RpcExhausted {
        command: String,
        attempts: u32,
        #[source]
        last: AttemptError,
    },

    /// A read kept returning an empty or unusable result.
    #[error("`{command}` returned no usable result after {attempts} attempts")]
    EmptyResultExhausted { command: String, attempts: u32 },

    #[error("invalid public key `{key}`: {reason}")]
    InvalidPubkey { key: String, reason: String },

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// The node has not completed a successful launch yet.
    #[error("node `{0}` has no identity public key yet")]
    MissingIdentity(String),

    #[error("unexpected response to `{command}`: {reason}")]
    UnexpectedResponse { command: String, reason: String },

    #[error("operation on node `{0}` was cancelled")]
    Cancelled(String),
}

/// Result alias for node operations.
pub type NodeResult<T> = Result<T, NodeError>;
