use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

/// A non-fatal finding attached to a block. These accumulate during
/// validation, type propagation and simulation and travel next to results
/// rather than aborting the run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Diagnostic {
    /// Wire-format id of the block the finding is about, when there is one.
    pub block: Option<String>,
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn error(block: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            block: Some(block.into()),
            severity: Severity::Error,
            message: message.into(),
        }
    }

    pub fn warning(block: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            block: Some(block.into()),
            severity: Severity::Warning,
            message: message.into(),
        }
    }

    pub fn model_error(message: impl Into<String>) -> Self {
        Self {
            block: None,
            severity: Severity::Error,
            message: message.into(),
        }
    }
}

/// A rejected block parameter, with the field it concerns.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("parameter `{field}`: {message}")]
pub struct ParameterError {
    pub field: String,
    pub message: String,
}

impl ParameterError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Fatal, pre-run model problems. Anything recoverable is a [`Diagnostic`]
/// instead.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model has no sheets")]
    Empty,
    #[error("duplicate block id `{0}`")]
    DuplicateBlockId(String),
    #[error("duplicate block name `{name}` (blocks `{first}` and `{second}`)")]
    DuplicateBlockName {
        name: String,
        first: String,
        second: String,
    },
    #[error("wire references unknown block `{0}`")]
    UnknownBlock(String),
    #[error("wire from `{from_block}` targets port {port} of `{target}`, which is out of range")]
    PortOutOfRange {
        from_block: String,
        target: String,
        port: i32,
    },
    #[error("input port {port} of `{target}` is driven by both `{first}` and `{second}`")]
    InputAlreadyConnected {
        target: String,
        port: i32,
        first: String,
        second: String,
    },
    #[error("block `{0}` is connected to itself")]
    SelfConnection(String),
    #[error("block `{block}` ({kind}): {source}")]
    BadParameters {
        block: String,
        kind: String,
        source: ParameterError,
    },
    #[error("enable port of `{target}` must carry a scalar bool, got {found}")]
    BadEnableType { target: String, found: String },
    #[error("simulation settings: {0}")]
    BadSettings(String),
}
