use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },

    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Envelope type {0} cannot carry message content")]
    NotContent(String),

    #[error("Missing field: {0}")]
    MissingField(&'static str),
}
