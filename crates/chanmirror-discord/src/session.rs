use std::sync::Arc;

use chanmirror_core::config::DiscordConfig;
use serenity::http::Http;
use serenity::model::channel::{Channel, GuildChannel};
use serenity::model::id::ChannelId;
use tracing::info;

use crate::error::DiscordError;
use crate::history::DiscordHistory;

/// An authenticated REST session.
///
/// Only the HTTP API is used; no gateway connection is opened, so there are
/// no event callbacks to wait for.
pub struct DiscordSession {
    http: Arc<Http>,
}

impl DiscordSession {
    /// Validate the token by fetching the bot's own user.
    pub async fn connect(config: &DiscordConfig) -> Result<Self, DiscordError> {
        let http = Arc::new(Http::new(&config.bot_token));
        let me = http.get_current_user().await?;
        info!(bot = %me.name, id = %me.id, "Discord: authenticated");
        Ok(Self { http })
    }

    pub fn http(&self) -> &Arc<Http> {
        &self.http
    }

    /// Resolve `raw` to a guild text channel the bot can see, logging its name.
    pub async fn text_channel(&self, raw: u64, role: &str) -> Result<GuildChannel, DiscordError> {
        let id = channel_id(raw)?;
        match id.to_channel(&self.http).await? {
            Channel::Guild(channel) => {
                info!(role, channel = %channel.name, guild = %channel.guild_id, id = raw, "Discord: channel resolved");
                Ok(channel)
            }
            _ => Err(DiscordError::NotTextChannel(raw)),
        }
    }

    /// History feed for `channel`. Attachments are downloaded with `downloader`;
    /// author nicknames come from `channel`'s guild.
    pub fn history(
        &self,
        channel: &GuildChannel,
        page_size: u8,
        downloader: reqwest::Client,
    ) -> DiscordHistory {
        DiscordHistory::new(
            Arc::clone(&self.http),
            channel.id,
            channel.guild_id,
            page_size,
            downloader,
        )
    }
}

pub fn channel_id(raw: u64) -> Result<ChannelId, DiscordError> {
    if raw == 0 {
        return Err(DiscordError::InvalidChannel(raw));
    }
    Ok(ChannelId::new(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_channel_id_is_rejected() {
        assert!(matches!(channel_id(0), Err(DiscordError::InvalidChannel(0))));
        assert_eq!(channel_id(42).unwrap().get(), 42);
    }
}
