//! Resumable upload session.
//!
//! Drives the create-then-patch protocol for one source: a creation request
//! declares the length and context metadata, then bounded chunks are sent
//! one at a time against the returned location until the server has
//! acknowledged every byte. The send loop runs on its own task; its result,
//! a cancellation, or an error is delivered through a [`CompletionLatch`],
//! so the caller observes exactly one terminal result.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use mediavault_protocol::constants::{
    HEADER_TUS_RESUMABLE, HEADER_UPLOAD_LENGTH, HEADER_UPLOAD_METADATA, HEADER_UPLOAD_OFFSET,
    OFFSET_OCTET_STREAM, TUS_VERSION,
};
use mediavault_protocol::{ErrorBody, encode_upload_metadata};
use mediavault_transfer::{SeekableSource, read_chunk};
use mediavault_transport::header::{CONTENT_TYPE, LOCATION};
use mediavault_transport::{HttpTransport, Method, StatusCode, Url};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::UploadError;
use crate::latch::CompletionLatch;
use crate::types::{ProgressFn, SessionConfig, SessionOutcome, SessionStatus, UploadSessionState};

/// How the send loop finds its starting point.
enum Entry {
    Create { metadata: String },
    Resume { location: String },
}

/// One resumable upload against one server.
pub struct ResumableUploadSession {
    transport: HttpTransport,
    config: SessionConfig,
    state: Arc<Mutex<UploadSessionState>>,
    cancel: CancellationToken,
}

impl ResumableUploadSession {
    /// Creates a session. Cancelling `cancel` (or calling
    /// [`cancel`](Self::cancel)) aborts the session.
    pub fn new(transport: HttpTransport, config: SessionConfig, cancel: CancellationToken) -> Self {
        Self {
            transport,
            config,
            state: Arc::new(Mutex::new(UploadSessionState::new(0))),
            cancel,
        }
    }

    /// Returns a snapshot of the session state.
    pub fn state(&self) -> UploadSessionState {
        self.state.lock().unwrap().clone()
    }

    /// Aborts the in-flight chunk and stops the session.
    ///
    /// The pending [`start`](Self::start) or [`resume`](Self::resume) call
    /// still returns, with [`SessionOutcome::Cancelled`].
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns the session's cancellation token.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Creates a new upload for `source` and sends it in full.
    ///
    /// `context` travels with the creation request as `Upload-Metadata`.
    pub async fn start<S>(
        &self,
        source: S,
        context: &BTreeMap<String, String>,
        progress: Option<ProgressFn>,
    ) -> Result<SessionOutcome, UploadError>
    where
        S: SeekableSource + 'static,
    {
        let entry = Entry::Create {
            metadata: encode_upload_metadata(context),
        };
        self.run(source, entry, progress).await
    }

    /// Continues an interrupted upload at `location` from the offset the
    /// server reports.
    pub async fn resume<S>(
        &self,
        source: S,
        location: &str,
        progress: Option<ProgressFn>,
    ) -> Result<SessionOutcome, UploadError>
    where
        S: SeekableSource + 'static,
    {
        let entry = Entry::Resume {
            location: location.to_string(),
        };
        self.run(source, entry, progress).await
    }

    async fn run<S>(
        &self,
        source: S,
        entry: Entry,
        progress: Option<ProgressFn>,
    ) -> Result<SessionOutcome, UploadError>
    where
        S: SeekableSource + 'static,
    {
        *self.state.lock().unwrap() = UploadSessionState::new(source.content_length());

        let (latch, rx) = CompletionLatch::new();
        let latch = Arc::new(latch);

        let send_loop = SendLoop {
            transport: self.transport.clone(),
            config: self.config.clone(),
            state: Arc::clone(&self.state),
            cancel: self.cancel.clone(),
            progress,
        };
        let task = tokio::spawn({
            let latch = Arc::clone(&latch);
            async move {
                let result = send_loop.drive(source, entry).await;
                latch.complete(result);
            }
        });

        let watcher = tokio::spawn({
            let latch = Arc::clone(&latch);
            let cancel = self.cancel.clone();
            async move {
                cancel.cancelled().await;
                if latch.complete(Ok(SessionOutcome::Cancelled)) {
                    debug!("session cancelled by caller");
                }
            }
        });

        let result = rx
            .await
            .map_err(|_| UploadError::Task("send loop ended without a result".into()));
        watcher.abort();
        // The loop observes the token and releases the source before exiting.
        if let Err(e) = task.await {
            warn!(error = %e, "send loop task failed");
        }

        let result = result?;
        let status = match &result {
            Ok(SessionOutcome::Completed { .. }) => SessionStatus::Completed,
            Ok(SessionOutcome::Cancelled) => SessionStatus::Cancelled,
            Err(e) => SessionStatus::Failed(e.to_string()),
        };
        self.state.lock().unwrap().status = status;
        result
    }
}

/// Everything the spawned send loop owns.
struct SendLoop {
    transport: HttpTransport,
    config: SessionConfig,
    state: Arc<Mutex<UploadSessionState>>,
    cancel: CancellationToken,
    progress: Option<ProgressFn>,
}

impl SendLoop {
    async fn drive<S>(self, source: S, entry: Entry) -> Result<SessionOutcome, UploadError>
    where
        S: SeekableSource + 'static,
    {
        let mut slot = Some(source);
        let result = self.transfer(&mut slot, entry).await;
        if let Some(mut source) = slot.take() {
            source.close();
        }
        result
    }

    async fn transfer<S>(
        &self,
        slot: &mut Option<S>,
        entry: Entry,
    ) -> Result<SessionOutcome, UploadError>
    where
        S: SeekableSource + 'static,
    {
        let total = slot.as_ref().map_or(0, |s| s.content_length());

        let (location, mut offset) = match entry {
            Entry::Create { metadata } => {
                let Some(location) = self.create(total, &metadata).await? else {
                    return Ok(SessionOutcome::Cancelled);
                };
                (location, 0)
            }
            Entry::Resume { location } => {
                let location = self.transport.resolve(&location)?;
                let Some(offset) = self.probe(&location, total).await? else {
                    return Ok(SessionOutcome::Cancelled);
                };
                (location, offset)
            }
        };

        let upload_id = upload_id_from(&location)?;
        {
            let mut state = self.state.lock().unwrap();
            state.upload_id = Some(upload_id.clone());
            state.location = Some(location.to_string());
            state.bytes_acked = offset;
            state.status = SessionStatus::Uploading;
        }
        info!(upload_id = %upload_id, offset, total, "upload session established");

        prepare(slot, offset).await?;

        // Nothing left to send (empty source, or a resume of a finished
        // transfer): report the final position once.
        if offset == total {
            self.report(offset, total);
        }

        let chunk_size = self.config.chunk_size.max(1);
        while offset < total {
            if self.cancel.is_cancelled() {
                return Ok(SessionOutcome::Cancelled);
            }

            let want = chunk_size.min((total - offset) as usize);
            let chunk = read_next(slot, want).await?;
            if chunk.len() != want {
                return Err(UploadError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("source ended at {} of {total} bytes", offset + chunk.len() as u64),
                )));
            }
            let sent = chunk.len() as u64;

            let Some(acked) = self.patch(&location, offset, chunk).await? else {
                debug!(upload_id = %upload_id, offset, "in-flight chunk aborted");
                return Ok(SessionOutcome::Cancelled);
            };

            if acked <= offset || acked > total {
                return Err(UploadError::InvalidResponse(format!(
                    "server acknowledged offset {acked} after sending {sent} bytes at {offset}"
                )));
            }
            if acked != offset + sent {
                // Partial acknowledgment: rewind to what the server holds.
                debug!(upload_id = %upload_id, acked, expected = offset + sent, "partial chunk acknowledged");
                reposition(slot, acked).await?;
            }

            offset = acked;
            self.state.lock().unwrap().bytes_acked = offset;
            self.report(offset, total);
        }

        info!(upload_id = %upload_id, total, "all bytes acknowledged");
        Ok(SessionOutcome::Completed { upload_id })
    }

    fn report(&self, done: u64, total: u64) {
        if let Some(cb) = &self.progress {
            cb(done, total);
        }
    }

    /// Sends the creation request. `None` means cancelled.
    async fn create(&self, total: u64, metadata: &str) -> Result<Option<Url>, UploadError> {
        let url = self.transport.endpoint(&self.config.tus_path)?;
        let mut request = self
            .transport
            .control_request(Method::POST, url)
            .header(HEADER_TUS_RESUMABLE, TUS_VERSION)
            .header(HEADER_UPLOAD_LENGTH, total);
        if !metadata.is_empty() {
            request = request.header(HEADER_UPLOAD_METADATA, metadata);
        }

        let resp = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ok(None),
            r = request.send() => r?,
        };

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }
        let location = resp
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| UploadError::InvalidResponse("creation response has no Location".into()))?;
        Ok(Some(self.transport.resolve(location)?))
    }

    /// Asks the server how many bytes it holds. `None` means cancelled.
    async fn probe(&self, location: &Url, total: u64) -> Result<Option<u64>, UploadError> {
        let request = self
            .transport
            .control_request(Method::HEAD, location.clone())
            .header(HEADER_TUS_RESUMABLE, TUS_VERSION);

        let resp = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ok(None),
            r = request.send() => r?,
        };

        let status = resp.status();
        if !status.is_success() {
            return Err(status_error(status, ""));
        }
        let offset = header_u64(resp.headers(), HEADER_UPLOAD_OFFSET)?;
        if let Ok(length) = header_u64(resp.headers(), HEADER_UPLOAD_LENGTH)
            && length != total
        {
            return Err(UploadError::InvalidResponse(format!(
                "server expects {length} bytes but the source has {total}"
            )));
        }
        if offset > total {
            return Err(UploadError::InvalidResponse(format!(
                "server offset {offset} beyond source length {total}"
            )));
        }
        debug!(location = %location, offset, "resuming upload");
        Ok(Some(offset))
    }

    /// Sends one chunk, returning the acknowledged offset. `None` means the
    /// in-flight request was aborted by cancellation.
    ///
    /// A success reply must carry the new `Upload-Offset`; without it nothing
    /// is known to be stored.
    async fn patch(&self, location: &Url, offset: u64, chunk: Vec<u8>) -> Result<Option<u64>, UploadError> {
        let request = self
            .transport
            .request(Method::PATCH, location.clone())
            .header(HEADER_TUS_RESUMABLE, TUS_VERSION)
            .header(HEADER_UPLOAD_OFFSET, offset)
            .header(CONTENT_TYPE, OFFSET_OCTET_STREAM)
            .body(chunk);

        let resp = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ok(None),
            r = request.send() => r?,
        };

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }
        header_u64(resp.headers(), HEADER_UPLOAD_OFFSET).map(Some)
    }
}

/// Maps a non-success status on the upload channel.
fn status_error(status: StatusCode, body: &str) -> UploadError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            UploadError::PermissionDenied(ErrorBody::message_from(body))
        }
        StatusCode::PAYLOAD_TOO_LARGE => UploadError::PayloadTooLarge,
        _ => UploadError::Protocol {
            status: status.as_u16(),
            message: ErrorBody::message_from(body),
        },
    }
}

fn header_u64(headers: &mediavault_transport::header::HeaderMap, name: &str) -> Result<u64, UploadError> {
    let value = headers
        .get(name)
        .ok_or_else(|| UploadError::InvalidResponse(format!("missing {name} header")))?;
    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| UploadError::InvalidResponse(format!("malformed {name} header")))
}

/// The upload id is the final non-empty path segment of the location.
fn upload_id_from(location: &Url) -> Result<String, UploadError> {
    location
        .path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
        .map(str::to_string)
        .ok_or_else(|| UploadError::InvalidResponse(format!("no upload id in {location}")))
}

/// Seeks to `offset` and opens the source on the blocking pool.
async fn prepare<S: SeekableSource + 'static>(slot: &mut Option<S>, offset: u64) -> Result<(), UploadError> {
    with_source(slot, move |s| {
        s.seek_to(offset)?;
        s.open()
    })
    .await
}

async fn reposition<S: SeekableSource + 'static>(slot: &mut Option<S>, offset: u64) -> Result<(), UploadError> {
    with_source(slot, move |s| s.seek_to(offset)).await
}

async fn read_next<S: SeekableSource + 'static>(slot: &mut Option<S>, max: usize) -> Result<Vec<u8>, UploadError> {
    with_source(slot, move |s| read_chunk(s, max)).await
}

/// Runs blocking file work with the source moved onto the blocking pool and back.
async fn with_source<S, T, F>(slot: &mut Option<S>, f: F) -> Result<T, UploadError>
where
    S: SeekableSource + 'static,
    T: Send + 'static,
    F: FnOnce(&mut S) -> std::io::Result<T> + Send + 'static,
{
    let mut source = slot
        .take()
        .ok_or_else(|| UploadError::Task("upload source unavailable".into()))?;
    let (source, result) = tokio::task::spawn_blocking(move || {
        let result = f(&mut source);
        (source, result)
    })
    .await?;
    *slot = Some(source);
    Ok(result?)
}
