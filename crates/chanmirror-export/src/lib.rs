//! `chanmirror-export` — replays a channel's history into a webhook.
//!
//! # Flow
//!
//! ```text
//! MessageSource ─▶ Batcher ─┬─▶ chunk ───────────▶ DeliveryClient ─▶ webhook
//!                            └─▶ AttachmentRouter ─┬─▶ DeliveryClient
//!                                                  └─▶ FileHost (oversized files)
//! batch done ─▶ ProgressTracker::save(last id)
//! ```
//!
//! Every request is awaited before the next is issued, so the target channel
//! receives messages in source order. Progress is saved only after a whole
//! batch (text and attachments) is done; an interrupted batch is re-sent on
//! the next run.

pub mod attach;
pub mod batch;
pub mod chunk;
pub mod delivery;
pub mod error;
pub mod host;
pub mod pipeline;
pub mod progress;
pub mod source;

pub use attach::AttachmentRouter;
pub use batch::{Batch, Batcher};
pub use delivery::{DeliveryClient, DeliveryPayload, PayloadBody, Persona, RetryPolicy};
pub use error::{ExportError, Result};
pub use host::FileHost;
pub use pipeline::{ExportOutcome, ExportSummary, Exporter};
pub use progress::ProgressTracker;
pub use source::{MemorySource, MessageSource};
