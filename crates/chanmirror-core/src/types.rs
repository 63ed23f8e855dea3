use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Who wrote a message, as it should appear when re-posted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub id: u64,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

/// One message observed in the source channel. Never mutated after it is read.
#[derive(Debug, Clone)]
pub struct Message {
    /// Source-assigned, strictly increasing within a channel.
    pub id: u64,
    pub author: Author,
    /// Mention-escaped text content.
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub attachments: Vec<Attachment>,
}

/// Produces the raw bytes of an attachment.
///
/// The pipeline calls [`read`](AttachmentReader::read) at most once per
/// attachment, and not at all when the declared size is over every limit.
#[async_trait]
pub trait AttachmentReader: Send + Sync {
    async fn read(&self) -> crate::Result<Vec<u8>>;
}

/// A file attached to a [`Message`].
#[derive(Clone)]
pub struct Attachment {
    pub filename: String,
    /// Declared size in bytes, as reported by the source.
    pub size: u64,
    reader: Arc<dyn AttachmentReader>,
}

impl Attachment {
    pub fn new(filename: impl Into<String>, size: u64, reader: Arc<dyn AttachmentReader>) -> Self {
        Self {
            filename: filename.into(),
            size,
            reader,
        }
    }

    /// An attachment whose content is already in memory.
    pub fn from_bytes(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        let size = bytes.len() as u64;
        Self::new(filename, size, Arc::new(InMemory(bytes)))
    }

    pub async fn read(&self) -> crate::Result<Vec<u8>> {
        self.reader.read().await
    }

    /// Size in MiB, for log lines.
    pub fn size_mib(&self) -> f64 {
        self.size as f64 / (1024.0 * 1024.0)
    }
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("filename", &self.filename)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

struct InMemory(Vec<u8>);

#[async_trait]
impl AttachmentReader for InMemory {
    async fn read(&self) -> crate::Result<Vec<u8>> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_attachment_reports_its_length() {
        let att = Attachment::from_bytes("a.txt", b"hello".to_vec());
        assert_eq!(att.size, 5);
        assert_eq!(att.read().await.unwrap(), b"hello");
    }

    #[test]
    fn size_mib_is_fractional() {
        let att = Attachment::new("big.bin", 3 * 1024 * 1024 / 2, Arc::new(InMemory(Vec::new())));
        assert!((att.size_mib() - 1.5).abs() < f64::EPSILON);
    }
}
