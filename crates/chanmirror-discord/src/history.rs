//! Channel history as a [`MessageSource`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chanmirror_core::{Attachment, AttachmentReader, Author, Message, MirrorError};
use chanmirror_export::{ExportError, MessageSource};
use chrono::{DateTime, Utc};
use serenity::builder::GetMessages;
use serenity::cache::Cache;
use serenity::http::Http;
use serenity::model::channel::{Attachment as DiscordAttachment, Message as DiscordMessage};
use serenity::model::guild::Member;
use serenity::model::id::{ChannelId, GuildId, MessageId, UserId};
use serenity::model::Timestamp;
use serenity::utils::{content_safe, ContentSafeOptions};
use tracing::debug;

/// Per-guild identity of an author. REST history pages carry no member
/// object, so this is fetched once per author and kept.
#[derive(Debug, Clone, Default, PartialEq)]
struct GuildProfile {
    nick: Option<String>,
    avatar_url: Option<String>,
}

impl From<Member> for GuildProfile {
    fn from(member: Member) -> Self {
        Self {
            avatar_url: member.avatar_url(),
            nick: member.nick,
        }
    }
}

/// Pages through a channel oldest-first using `after=<id>`.
pub struct DiscordHistory {
    http: Arc<Http>,
    channel: ChannelId,
    guild: GuildId,
    page_size: u8,
    downloader: reqwest::Client,
    /// Empty; user mentions are resolved from each message's own mention list.
    cache: Arc<Cache>,
    /// `None` records a lookup that failed (author left the guild, webhook user).
    profiles: Mutex<HashMap<UserId, Option<GuildProfile>>>,
}

impl DiscordHistory {
    pub fn new(
        http: Arc<Http>,
        channel: ChannelId,
        guild: GuildId,
        page_size: u8,
        downloader: reqwest::Client,
    ) -> Self {
        Self {
            http,
            channel,
            guild,
            page_size: page_size.clamp(1, 100),
            downloader,
            cache: Arc::new(Cache::new()),
            profiles: Mutex::new(HashMap::new()),
        }
    }

    async fn convert(&self, msg: DiscordMessage) -> chanmirror_export::Result<Message> {
        let created_at = created_at(&msg.timestamp).ok_or_else(|| {
            ExportError::Source(format!(
                "message {} has an unreadable timestamp {}",
                msg.id, msg.timestamp
            ))
        })?;
        let profile = self.profile(msg.author.id).await.unwrap_or_default();
        let content = clean_content(&self.cache, &msg);
        let author = Author {
            id: msg.author.id.get(),
            display_name: display_name(
                profile.nick.as_deref(),
                msg.author.global_name.as_deref(),
                &msg.author.name,
            ),
            avatar_url: Some(profile.avatar_url.unwrap_or_else(|| msg.author.face())),
        };
        let attachments = msg
            .attachments
            .into_iter()
            .map(|a| self.attachment(a))
            .collect();

        Ok(Message {
            id: msg.id.get(),
            author,
            content,
            created_at,
            attachments,
        })
    }

    /// Guild nickname and avatar for `user`, fetched on first sight.
    async fn profile(&self, user: UserId) -> Option<GuildProfile> {
        let cached = self.profiles_lock().get(&user).cloned();
        if let Some(known) = cached {
            return known;
        }

        let fetched = match self.guild.member(self.http.as_ref(), user).await {
            Ok(member) => Some(GuildProfile::from(member)),
            Err(e) => {
                debug!(user = %user, error = %e, "Discord: no guild member, using account name");
                None
            }
        };
        self.profiles_lock().insert(user, fetched.clone());
        fetched
    }

    fn profiles_lock(&self) -> std::sync::MutexGuard<'_, HashMap<UserId, Option<GuildProfile>>> {
        self.profiles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn attachment(&self, att: DiscordAttachment) -> Attachment {
        let size = u64::from(att.size);
        let filename = att.filename.clone();
        let reader = CdnFile {
            http: self.downloader.clone(),
            url: att.url,
            filename: att.filename,
        };
        Attachment::new(filename, size, Arc::new(reader))
    }
}

#[async_trait]
impl MessageSource for DiscordHistory {
    async fn fetch_after(&self, after: Option<u64>) -> chanmirror_export::Result<Vec<Message>> {
        // Snowflakes are never below 1, so `after=1` starts at the first message.
        let after = MessageId::new(after.unwrap_or(1).max(1));
        let mut page = self
            .channel
            .messages(&self.http, GetMessages::new().after(after).limit(self.page_size))
            .await
            .map_err(|e| ExportError::Source(e.to_string()))?;

        page.sort_by_key(|m| m.id);
        debug!(channel = %self.channel, after = %after, count = page.len(), "Discord: history page");
        let mut messages = Vec::with_capacity(page.len());
        for msg in page {
            messages.push(self.convert(msg).await?);
        }
        Ok(messages)
    }
}

/// Full-precision creation time. Discord stamps carry milliseconds, and the
/// batching gap is compared against them.
fn created_at(timestamp: &Timestamp) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&timestamp.to_string())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Guild nickname, then global display name, then username.
fn display_name(nick: Option<&str>, global_name: Option<&str>, username: &str) -> String {
    nick.or(global_name).unwrap_or(username).to_string()
}

/// Message text with user mentions and @everyone/@here defused.
fn clean_content(cache: &Arc<Cache>, msg: &DiscordMessage) -> String {
    let options = ContentSafeOptions::default()
        .clean_role(false)
        .clean_channel(false)
        .show_discriminator(false);
    content_safe(cache, &msg.content, &options, &msg.mentions)
}

/// Attachment bytes fetched lazily from the CDN.
struct CdnFile {
    http: reqwest::Client,
    url: String,
    filename: String,
}

#[async_trait]
impl AttachmentReader for CdnFile {
    async fn read(&self) -> chanmirror_core::Result<Vec<u8>> {
        let fail = |e: reqwest::Error| MirrorError::AttachmentRead {
            filename: self.filename.clone(),
            reason: e.to_string(),
        };
        let resp = self
            .http
            .get(&self.url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(fail)?;
        let bytes = resp.bytes().await.map_err(fail)?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chanmirror_export::Batcher;
    use chrono::{TimeDelta, Timelike};

    fn stamp(raw: &str) -> Timestamp {
        serde_json::from_value(serde_json::Value::String(raw.to_string())).unwrap()
    }

    fn message(id: u64, at: DateTime<Utc>) -> Message {
        Message {
            id,
            author: Author {
                id: 7,
                display_name: "ana".into(),
                avatar_url: None,
            },
            content: format!("m{id}"),
            created_at: at,
            attachments: Vec::new(),
        }
    }

    #[test]
    fn created_at_keeps_milliseconds() {
        let at = created_at(&stamp("2024-03-01T12:00:00.100Z")).unwrap();
        assert_eq!(at.timestamp(), 1_709_294_400);
        assert_eq!(at.nanosecond(), 100_000_000);
    }

    #[test]
    fn gap_just_over_five_minutes_splits_the_batch() {
        let first = created_at(&stamp("2024-03-01T12:00:00.100Z")).unwrap();
        let second = created_at(&stamp("2024-03-01T12:05:00.900Z")).unwrap();
        assert_eq!(second - first, TimeDelta::milliseconds(300_800));

        let mut batcher = Batcher::new(TimeDelta::seconds(300));
        assert!(batcher.push(message(1, first)).is_none());
        let flushed = batcher.push(message(2, second)).expect("gap exceeded");
        assert_eq!(flushed.last_id(), 1);
        assert_eq!(batcher.finish().unwrap().last_id(), 2);
    }

    #[test]
    fn display_name_prefers_nick_then_global_then_username() {
        assert_eq!(display_name(Some("Nick"), Some("Global"), "user"), "Nick");
        assert_eq!(display_name(None, Some("Global"), "user"), "Global");
        assert_eq!(display_name(None, None, "user"), "user");
    }
}
