//! Direct multipart upload: file and metadata in one streamed POST.
//!
//! The body is produced by a [`MultipartBodyStream`] pulled on demand, so
//! memory use is one buffer regardless of file size. The framing length is
//! known up front and sent as `Content-Length`.

use mediavault_protocol::UploadMetadata;
use mediavault_protocol::constants::{DIRECT_UPLOAD_PATH, FILE_FIELD_NAME};
use mediavault_transfer::{
    ByteSource, FilePart, MultipartBodyStream, STREAM_BUFFER_SIZE, into_body_stream,
};
use mediavault_transport::header::{CONTENT_LENGTH, CONTENT_TYPE};
use mediavault_transport::{HttpTransport, Method};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::UploadError;
use crate::finalize::interpret_finalize_response;
use crate::types::{ProgressFn, UploadOutcome};

/// Uploads `source` with its metadata in a single multipart request.
///
/// Progress reports body bytes handed to the transport against the full
/// body length. Cancelling drops the in-flight request and the source.
pub async fn direct_upload<S>(
    transport: &HttpTransport,
    source: S,
    file_name: &str,
    mime_type: &str,
    metadata: &UploadMetadata,
    progress: Option<ProgressFn>,
    cancel: &CancellationToken,
) -> Result<UploadOutcome, UploadError>
where
    S: ByteSource + 'static,
{
    let url = transport.endpoint(DIRECT_UPLOAD_PATH)?;
    let body = MultipartBodyStream::with_generated_boundary(
        &metadata.form_fields(),
        FilePart {
            field_name: FILE_FIELD_NAME.to_string(),
            file_name: file_name.to_string(),
            mime_type: mime_type.to_string(),
            source,
        },
    );
    let content_length = body.content_length();
    let content_type = body.content_type();
    debug!(file = file_name, content_length, "starting direct upload");

    let stream = into_body_stream(body, STREAM_BUFFER_SIZE, progress);
    let request = transport
        .request(Method::POST, url)
        .header(CONTENT_TYPE, content_type)
        .header(CONTENT_LENGTH, content_length)
        .body(reqwest::Body::wrap_stream(stream));

    let resp = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            debug!(file = file_name, "direct upload cancelled");
            return Ok(UploadOutcome::Cancelled);
        }
        r = request.send() => r?,
    };

    let status = resp.status();
    let text = resp.text().await?;
    let record = interpret_finalize_response(status, &text)?;
    info!(file = file_name, record_id = %record.id, "direct upload stored");
    Ok(UploadOutcome::from_record(record))
}
