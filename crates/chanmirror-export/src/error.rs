use thiserror::Error;

/// Errors that stop an export run.
///
/// Rate limits, 503s and upload failures are handled where they happen and
/// never show up here.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The webhook answered with a status that retrying will not fix.
    #[error("Webhook error {status}: {body}")]
    FatalDelivery { status: u16, body: String },

    /// Every attempt got a 429 or 503.
    #[error("Webhook still answering {status} after {attempts} attempts")]
    RetriesExhausted { status: u16, attempts: u32 },

    #[error("Webhook request failed after {attempts} attempts: {source}")]
    Network {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    #[error("Message source error: {0}")]
    Source(String),

    #[error("Progress file error: {0}")]
    Progress(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Export cancelled")]
    Cancelled,
}

impl ExportError {
    /// True for the errors that come out of the delivery client.
    pub fn is_delivery(&self) -> bool {
        matches!(
            self,
            ExportError::FatalDelivery { .. }
                | ExportError::RetriesExhausted { .. }
                | ExportError::Network { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ExportError>;
