use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("intent '{name}' is already registered")]
    DuplicateIntent { name: String },

    #[error("failed reading intent dataset {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid intent dataset line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("intent dataset {path} produced zero intents")]
    Empty { path: String },
}

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classifier backend '{backend}' unavailable: {reason}")]
    Unavailable { backend: String, reason: String },
}

#[derive(Debug, Error)]
pub enum AnonymizeError {
    #[error("entity detector '{detector}' unavailable: {reason}")]
    DetectionUnavailable { detector: String, reason: String },

    #[error("detector '{detector}' returned span {start}..{end} outside the text or off a char boundary")]
    InvalidSpan {
        detector: String,
        start: usize,
        end: usize,
    },
}
