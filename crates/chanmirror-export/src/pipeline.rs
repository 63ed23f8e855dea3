//! The export loop: feed → batches → deliveries → checkpoint.

use chanmirror_core::config::ExportConfig;
use chrono::TimeDelta;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::attach::AttachmentRouter;
use crate::batch::{Batch, Batcher};
use crate::chunk::text_bodies;
use crate::delivery::{DeliveryClient, DeliveryPayload, Persona};
use crate::error::{ExportError, Result};
use crate::progress::ProgressTracker;
use crate::source::MessageSource;

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    /// Checkpoint the run started after.
    pub resumed_from: Option<u64>,
    pub batches: usize,
    pub messages: usize,
    pub attachments: usize,
    /// Last checkpoint written by this run.
    pub last_saved: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    /// The feed was exhausted and every batch delivered.
    Finished(ExportSummary),
    /// Shutdown was requested; the batch in progress was not checkpointed.
    Interrupted(ExportSummary),
}

impl ExportOutcome {
    pub fn summary(&self) -> &ExportSummary {
        match self {
            ExportOutcome::Finished(s) | ExportOutcome::Interrupted(s) => s,
        }
    }
}

pub struct Exporter<S> {
    source: S,
    delivery: DeliveryClient,
    attachments: AttachmentRouter,
    progress: ProgressTracker,
    gap: TimeDelta,
    content_limit: usize,
    cancel: CancellationToken,
}

impl<S: MessageSource> Exporter<S> {
    pub fn new(
        source: S,
        delivery: DeliveryClient,
        attachments: AttachmentRouter,
        progress: ProgressTracker,
        config: &ExportConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            delivery,
            attachments,
            progress,
            gap: config.group_gap(),
            content_limit: config.content_limit,
            cancel,
        }
    }

    /// Export everything after the saved checkpoint.
    ///
    /// Returns an error only for delivery, source, or checkpoint-write
    /// failures; the checkpoint then still points at the last completed batch.
    pub async fn run(&self) -> Result<ExportOutcome> {
        let resumed_from = self.progress.load();
        match resumed_from {
            Some(id) => info!(after = id, progress = %self.progress.path().display(), "resuming export"),
            None => info!(progress = %self.progress.path().display(), "starting export from the first message"),
        }

        let mut summary = ExportSummary {
            resumed_from,
            ..ExportSummary::default()
        };

        match self.drive(resumed_from, &mut summary).await {
            Ok(()) => {
                info!(
                    batches = summary.batches,
                    messages = summary.messages,
                    "export finished"
                );
                Ok(ExportOutcome::Finished(summary))
            }
            Err(ExportError::Cancelled) => {
                info!(
                    batches = summary.batches,
                    last_saved = ?summary.last_saved,
                    "export interrupted"
                );
                Ok(ExportOutcome::Interrupted(summary))
            }
            Err(e) => Err(e),
        }
    }

    async fn drive(&self, resumed_from: Option<u64>, summary: &mut ExportSummary) -> Result<()> {
        let mut batcher = Batcher::new(self.gap);
        let mut cursor = resumed_from;

        loop {
            if self.cancel.is_cancelled() {
                return Err(ExportError::Cancelled);
            }
            let page = self.source.fetch_after(cursor).await?;
            let Some(last) = page.last() else {
                break;
            };
            cursor = Some(last.id);
            debug!(count = page.len(), through = last.id, "fetched history page");

            for message in page {
                if let Some(batch) = batcher.push(message) {
                    self.complete(&batch, summary).await?;
                }
            }
        }

        if let Some(batch) = batcher.finish() {
            self.complete(&batch, summary).await?;
        }
        Ok(())
    }

    /// Deliver one batch, then checkpoint it.
    async fn complete(&self, batch: &Batch, summary: &mut ExportSummary) -> Result<()> {
        self.export_batch(batch).await?;
        self.progress.save(batch.last_id())?;

        summary.batches += 1;
        summary.messages += batch.len();
        summary.attachments += batch.attachments().count();
        summary.last_saved = Some(batch.last_id());
        info!(
            author = %batch.author().display_name,
            messages = batch.len(),
            last_id = batch.last_id(),
            "batch exported"
        );
        Ok(())
    }

    async fn export_batch(&self, batch: &Batch) -> Result<()> {
        let persona = Persona::from(batch.author());

        for body in text_bodies(batch.messages(), self.content_limit) {
            self.delivery
                .deliver(&DeliveryPayload::new(&persona, body))
                .await?;
        }
        self.attachments
            .send_batch(&self.delivery, &persona, batch)
            .await?;
        Ok(())
    }
}
