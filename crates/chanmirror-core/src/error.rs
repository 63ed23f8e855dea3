use thiserror::Error;

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing required configuration: {}", .0.join(", "))]
    MissingConfig(Vec<String>),

    #[error("Failed to read attachment '{filename}': {reason}")]
    AttachmentRead { filename: String, reason: String },
}

pub type Result<T> = std::result::Result<T, MirrorError>;
