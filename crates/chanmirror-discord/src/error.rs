/// Errors produced by the Discord adapter.
#[derive(Debug, thiserror::Error)]
pub enum DiscordError {
    #[error("serenity error: {0}")]
    Serenity(#[from] serenity::Error),

    #[error("invalid channel id: {0}")]
    InvalidChannel(u64),

    #[error("channel {0} is not a guild text channel")]
    NotTextChannel(u64),
}
