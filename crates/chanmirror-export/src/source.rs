use async_trait::async_trait;
use chanmirror_core::Message;

use crate::error::Result;

/// Ordered history of the channel being mirrored.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// The next page of messages with an id strictly greater than `after`
    /// (from the very first message when `None`), sorted oldest first.
    ///
    /// An empty page means the history is exhausted.
    async fn fetch_after(&self, after: Option<u64>) -> Result<Vec<Message>>;
}

/// A fixed, already-fetched history served in pages.
pub struct MemorySource {
    messages: Vec<Message>,
    page_size: usize,
}

impl MemorySource {
    pub fn new(mut messages: Vec<Message>, page_size: usize) -> Self {
        messages.sort_by_key(|m| m.id);
        Self {
            messages,
            page_size: page_size.max(1),
        }
    }
}

#[async_trait]
impl MessageSource for MemorySource {
    async fn fetch_after(&self, after: Option<u64>) -> Result<Vec<Message>> {
        let floor = after.unwrap_or(0);
        Ok(self
            .messages
            .iter()
            .filter(|m| m.id > floor)
            .take(self.page_size)
            .cloned()
            .collect())
    }
}
