use thiserror::Error;

/// Malformed HL7 input: no MSH, truncated segment. Recoverable per message.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("message has no MSH segment")]
    MissingMsh,
    #[error("segment {0} is empty")]
    EmptySegment(String),
}

/// Unknown MSH-9 event type. Handled by falling back to the minimal bundle.
#[derive(Debug, Error)]
pub enum MappingError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),
    #[error("missing required field {field} in segment {segment}")]
    MissingField { segment: String, field: usize },
}

/// Missing SAM, unknown mnemonic at dispatch, unreadable config file.
/// Fatal at process start.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse YAML in {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("failed to parse CSV in {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
    #[error("profile '{0}' references unknown SAM mnemonic '{1}'")]
    UnknownSam(String, String),
    #[error("missing profile.name in {0}")]
    MissingProfileName(String),
    #[error(transparent)]
    Settings(#[from] config::ConfigError),
}

/// Isolated to a single (step, resource, value) triple; surfaces as SKIP.
#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("path walk failed for '{0}'")]
    PathWalk(String),
}

/// HTTP failures from the FHIR client. Never retried by the core.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("server returned status {status}: {body}")]
    Status { status: u16, body: String },
}

/// Top-level pipeline error composing every component error.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Mapping(#[from] MappingError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
