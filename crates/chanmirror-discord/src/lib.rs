//! Discord side of the mirror: REST session, channel history and the
//! outbound webhook.

pub mod error;
pub mod history;
pub mod session;
pub mod webhook;

pub use error::DiscordError;
pub use history::DiscordHistory;
pub use session::DiscordSession;
