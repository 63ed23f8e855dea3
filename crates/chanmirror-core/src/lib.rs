//! `chanmirror-core` — configuration, shared errors and the message model
//! consumed by the export pipeline.

pub mod config;
pub mod error;
pub mod types;

pub use config::MirrorConfig;
pub use error::{MirrorError, Result};
pub use types::{Attachment, AttachmentReader, Author, Message};
