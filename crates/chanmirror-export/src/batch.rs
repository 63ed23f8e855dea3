//! Groups the ordered message feed into per-author batches.

use chanmirror_core::{Attachment, Author, Message};
use chrono::TimeDelta;

/// A run of consecutive messages from one author, each within the gap
/// threshold of the one before it. Never empty.
#[derive(Debug, Clone)]
pub struct Batch {
    messages: Vec<Message>,
}

impl Batch {
    fn open(first: Message) -> Self {
        Self {
            messages: vec![first],
        }
    }

    pub fn author(&self) -> &Author {
        &self.messages[0].author
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> &Message {
        &self.messages[self.messages.len() - 1]
    }

    pub fn last_id(&self) -> u64 {
        self.last().id
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Every attachment of the batch with the message that carried it,
    /// in message order.
    pub fn attachments(&self) -> impl Iterator<Item = (&Attachment, &Message)> {
        self.messages
            .iter()
            .flat_map(|m| m.attachments.iter().map(move |a| (a, m)))
    }

    fn accepts(&self, msg: &Message, gap: TimeDelta) -> bool {
        let last = self.last();
        last.author.id == msg.author.id && msg.created_at - last.created_at <= gap
    }
}

/// Incremental batcher. Feed it messages oldest-first; it hands back a batch
/// each time one closes.
#[derive(Debug)]
pub struct Batcher {
    gap: TimeDelta,
    current: Option<Batch>,
}

impl Batcher {
    pub fn new(gap: TimeDelta) -> Self {
        Self { gap, current: None }
    }

    /// Add `msg`. Returns the previous batch if `msg` closed it.
    pub fn push(&mut self, msg: Message) -> Option<Batch> {
        if let Some(batch) = self.current.as_mut() {
            if batch.accepts(&msg, self.gap) {
                batch.messages.push(msg);
                return None;
            }
        }
        self.current.replace(Batch::open(msg))
    }

    /// Close whatever is buffered. Call once the feed is exhausted.
    pub fn finish(&mut self) -> Option<Batch> {
        self.current.take()
    }
}

/// Split a whole message sequence into batches.
#[cfg(test)]
pub(crate) fn partition(messages: impl IntoIterator<Item = Message>, gap: TimeDelta) -> Vec<Batch> {
    let mut batcher = Batcher::new(gap);
    let mut batches: Vec<Batch> = messages
        .into_iter()
        .filter_map(|m| batcher.push(m))
        .collect();
    batches.extend(batcher.finish());
    batches
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    pub(crate) fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    pub(crate) fn author(id: u64) -> Author {
        Author {
            id,
            display_name: format!("user-{id}"),
            avatar_url: Some(format!("https://cdn.example/avatars/{id}.png")),
        }
    }

    pub(crate) fn msg(id: u64, author_id: u64, offset_secs: i64, content: &str) -> Message {
        Message {
            id,
            author: author(author_id),
            content: content.to_string(),
            created_at: t0() + TimeDelta::seconds(offset_secs),
            attachments: Vec::new(),
        }
    }

    fn gap() -> TimeDelta {
        TimeDelta::seconds(300)
    }

    fn ids(batch: &Batch) -> Vec<u64> {
        batch.messages().iter().map(|m| m.id).collect()
    }

    #[test]
    fn same_author_within_gap_is_one_batch() {
        let batches = partition(
            vec![
                msg(1, 7, 0, "a"),
                msg(2, 7, 10, "b"),
                msg(3, 7, 20, "c"),
                msg(4, 8, 30, "d"),
            ],
            gap(),
        );
        assert_eq!(batches.len(), 2);
        assert_eq!(ids(&batches[0]), vec![1, 2, 3]);
        assert_eq!(ids(&batches[1]), vec![4]);
        assert_eq!(batches[1].author().id, 8);
    }

    #[test]
    fn gap_exactly_at_threshold_stays_in_batch() {
        let batches = partition(vec![msg(1, 7, 0, "a"), msg(2, 7, 300, "b")], gap());
        assert_eq!(batches.len(), 1);
    }

    #[test]
    fn gap_over_threshold_splits() {
        let batches = partition(vec![msg(1, 7, 0, "a"), msg(2, 7, 301, "b")], gap());
        assert_eq!(batches.len(), 2);
    }

    #[test]
    fn gap_is_measured_from_previous_message_not_first() {
        // 0 → 250 → 500: each step is within 300s even though the span is not.
        let batches = partition(
            vec![msg(1, 7, 0, "a"), msg(2, 7, 250, "b"), msg(3, 7, 500, "c")],
            gap(),
        );
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].last_id(), 3);
    }

    #[test]
    fn alternating_authors_never_merge() {
        let batches = partition(
            vec![msg(1, 1, 0, "a"), msg(2, 2, 1, "b"), msg(3, 1, 2, "c")],
            gap(),
        );
        assert_eq!(batches.iter().map(Batch::len).collect::<Vec<_>>(), vec![1, 1, 1]);
    }

    #[test]
    fn partition_preserves_every_message_in_order() {
        let feed: Vec<Message> = (0..50)
            .map(|i| msg(i + 1, i % 3 / 2, (i as i64) * 97, "x"))
            .collect();
        let batches = partition(feed.clone(), gap());
        let flattened: Vec<u64> = batches.iter().flat_map(ids).collect();
        assert_eq!(flattened, feed.iter().map(|m| m.id).collect::<Vec<_>>());
        for b in &batches {
            assert!(!b.is_empty());
            for pair in b.messages().windows(2) {
                assert_eq!(pair[0].author.id, pair[1].author.id);
                assert!(pair[1].created_at - pair[0].created_at <= gap());
            }
        }
    }

    #[test]
    fn empty_feed_yields_nothing() {
        assert!(partition(Vec::new(), gap()).is_empty());
        assert!(Batcher::new(gap()).finish().is_none());
    }

    #[test]
    fn attachments_follow_message_order() {
        let mut first = msg(1, 7, 0, "");
        first.attachments = vec![
            Attachment::from_bytes("a.png", vec![1]),
            Attachment::from_bytes("b.png", vec![2]),
        ];
        let mut second = msg(2, 7, 5, "");
        second.attachments = vec![Attachment::from_bytes("c.png", vec![3])];

        let batches = partition(vec![first, second], gap());
        let names: Vec<(&str, u64)> = batches[0]
            .attachments()
            .map(|(a, m)| (a.filename.as_str(), m.id))
            .collect();
        assert_eq!(names, vec![("a.png", 1), ("b.png", 1), ("c.png", 2)]);
    }
}
