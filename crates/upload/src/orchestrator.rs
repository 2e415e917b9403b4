//! Upload orchestrator.
//!
//! Runs preflight, the byte transfer (resumable or direct) and the finalize
//! step, and persists the resulting record. One cancellation token covers
//! the whole upload; it is propagated into the active session. Once an
//! upload ends, a cancelled token is replaced so the next upload starts
//! clean.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use mediavault_protocol::{DEFAULT_MIME_TYPE, DeleteResponse, FinalizeRecord, UploadMetadata, mime_type_for_path};
use mediavault_transfer::{ChunkSource, preflight};
use mediavault_transport::HttpTransport;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::direct::direct_upload;
use crate::error::UploadError;
use crate::finalize::{delete, finalize};
use crate::records::RecordStore;
use crate::session::ResumableUploadSession;
use crate::types::{OrchestratorConfig, ProgressFn, SessionOutcome, UploadOutcome, UploadStrategy};

/// How a resumable session begins.
enum SessionStart<'a> {
    /// New upload with its creation context.
    Create(BTreeMap<String, String>),
    /// Existing upload location.
    Resume(&'a str),
}

pub struct UploadOrchestrator {
    transport: HttpTransport,
    config: OrchestratorConfig,
    records: Option<Arc<RecordStore>>,
    cancel: Mutex<CancellationToken>,
}

impl UploadOrchestrator {
    /// Creates an orchestrator. Without a record store, results are only
    /// returned, not persisted.
    pub fn new(
        transport: HttpTransport,
        config: OrchestratorConfig,
        records: Option<Arc<RecordStore>>,
    ) -> Self {
        Self {
            transport,
            config,
            records,
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// Returns the token that cancels the upload in progress, or the next
    /// one if none is running. It stays valid until that upload ends.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.lock().unwrap().clone()
    }

    /// Cancels the upload in progress.
    pub fn cancel(&self) {
        self.cancel.lock().unwrap().cancel();
    }

    /// Installs a fresh token if the last one was used.
    fn rearm(&self) {
        let mut cancel = self.cancel.lock().unwrap();
        if cancel.is_cancelled() {
            *cancel = CancellationToken::new();
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Uploads `source` and registers it with `metadata`.
    ///
    /// Preflight failures are returned before any request is made.
    /// Cancellation yields [`UploadOutcome::Cancelled`]; finalize is never
    /// sent once the byte transfer was cancelled.
    pub async fn upload(
        &self,
        source: ChunkSource,
        metadata: &UploadMetadata,
        on_progress: Option<ProgressFn>,
    ) -> Result<UploadOutcome, UploadError> {
        self.upload_from(source, None, metadata, on_progress).await
    }

    /// Continues a resumable upload interrupted after creation.
    ///
    /// `location` is the value exposed by the session state of the first
    /// attempt.
    pub async fn resume(
        &self,
        source: ChunkSource,
        location: &str,
        metadata: &UploadMetadata,
        on_progress: Option<ProgressFn>,
    ) -> Result<UploadOutcome, UploadError> {
        self.upload_from(source, Some(location), metadata, on_progress)
            .await
    }

    async fn upload_from(
        &self,
        source: ChunkSource,
        location: Option<&str>,
        metadata: &UploadMetadata,
        on_progress: Option<ProgressFn>,
    ) -> Result<UploadOutcome, UploadError> {
        let cancel = self.cancel_token();
        let result = self
            .run_upload(source, location, metadata, on_progress, &cancel)
            .await;
        self.rearm();
        result
    }

    async fn run_upload(
        &self,
        source: ChunkSource,
        location: Option<&str>,
        metadata: &UploadMetadata,
        on_progress: Option<ProgressFn>,
        cancel: &CancellationToken,
    ) -> Result<UploadOutcome, UploadError> {
        preflight(metadata, source.total_size(), self.config.max_upload_size)?;

        if cancel.is_cancelled() {
            return Ok(UploadOutcome::Cancelled);
        }

        let file_name = source.file_name().unwrap_or("upload").to_string();
        let mime_type = mime_type_for_path(&file_name).unwrap_or(DEFAULT_MIME_TYPE);
        info!(
            file = %file_name,
            size = source.total_size(),
            strategy = ?self.config.strategy,
            "starting upload"
        );

        let result = match (self.config.strategy, location) {
            (UploadStrategy::DirectMultipart, None) => {
                direct_upload(
                    &self.transport,
                    source,
                    &file_name,
                    mime_type,
                    metadata,
                    on_progress,
                    cancel,
                )
                .await
            }
            (UploadStrategy::DirectMultipart, Some(_)) | (UploadStrategy::Resumable, _) => {
                let start = match location {
                    Some(location) => SessionStart::Resume(location),
                    None => SessionStart::Create(metadata.context_headers(&file_name, mime_type)),
                };
                self.upload_resumable(source, start, metadata, on_progress, cancel)
                    .await
            }
        };

        match &result {
            Ok(outcome) => self.log_outcome(&file_name, outcome),
            Err(e) => error!(file = %file_name, error = %e, "upload failed"),
        }
        let outcome = result?;

        if let UploadOutcome::Stored(record) = &outcome {
            self.persist(record);
        }
        Ok(outcome)
    }

    async fn upload_resumable(
        &self,
        source: ChunkSource,
        start: SessionStart<'_>,
        metadata: &UploadMetadata,
        on_progress: Option<ProgressFn>,
        cancel: &CancellationToken,
    ) -> Result<UploadOutcome, UploadError> {
        let session = ResumableUploadSession::new(
            self.transport.clone(),
            self.config.session.clone(),
            cancel.child_token(),
        );

        let result = match start {
            SessionStart::Resume(location) => session.resume(source, location, on_progress).await,
            SessionStart::Create(context) => session.start(source, &context, on_progress).await,
        };
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                let state = session.state();
                if let Some(location) = state.location {
                    warn!(
                        location = %location,
                        acked = state.bytes_acked,
                        total = state.total_bytes,
                        "transfer interrupted, resumable from location"
                    );
                }
                return Err(e);
            }
        };

        let upload_id = match outcome {
            SessionOutcome::Completed { upload_id } => upload_id,
            SessionOutcome::Cancelled => return Ok(UploadOutcome::Cancelled),
        };
        // A cancel that lost the race to the last chunk still wins over finalize.
        if cancel.is_cancelled() {
            debug!(upload_id = %upload_id, "cancelled after transfer, skipping finalize");
            return Ok(UploadOutcome::Cancelled);
        }

        let record = finalize(&self.transport, &upload_id, metadata).await?;
        Ok(UploadOutcome::from_record(record))
    }

    fn log_outcome(&self, file_name: &str, outcome: &UploadOutcome) {
        match outcome {
            UploadOutcome::Stored(r) => {
                info!(file = %file_name, record_id = %r.id, "upload stored");
            }
            UploadOutcome::Merged(r) => {
                info!(file = %file_name, record_id = %r.id, checksum = %r.checksum_sha256, "content already archived, merged");
            }
            UploadOutcome::Cancelled => info!(file = %file_name, "upload cancelled"),
        }
    }

    /// Failing to write the local store does not fail an upload the server
    /// already accepted.
    fn persist(&self, record: &FinalizeRecord) {
        let Some(store) = &self.records else {
            return;
        };
        if let Err(e) = store.add(&self.transport.host_key(), record.clone()) {
            warn!(record_id = %record.id, error = %e, "failed to persist record");
        }
    }

    /// Deletes a stored record and drops it from the local store.
    pub async fn delete(&self, record: &FinalizeRecord) -> Result<DeleteResponse, UploadError> {
        let response = delete(&self.transport, &record.id, &record.delete_token).await?;
        if let Some(store) = &self.records {
            store.remove(&self.transport.host_key(), &record.id)?;
        }
        Ok(response)
    }
}
