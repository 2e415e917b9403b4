use std::time::Duration;

/// Finalize endpoint: registers a completed byte transfer as a record.
pub const FINALIZE_PATH: &str = "/api/uploads/finalize";

/// Delete endpoint: removes a record given its delete token.
pub const DELETE_PATH: &str = "/api/delete";

/// Direct multipart upload endpoint (single streamed POST).
pub const DIRECT_UPLOAD_PATH: &str = "/api/upload";

/// Default creation endpoint of the resumable upload protocol.
pub const DEFAULT_TUS_PATH: &str = "/api/uploads/tus/";

/// Resumable protocol version sent with every request.
pub const TUS_VERSION: &str = "1.0.0";

/// Header carrying the protocol version.
pub const HEADER_TUS_RESUMABLE: &str = "Tus-Resumable";

/// Header declaring the total upload length on creation.
pub const HEADER_UPLOAD_LENGTH: &str = "Upload-Length";

/// Header carrying the current byte offset.
pub const HEADER_UPLOAD_OFFSET: &str = "Upload-Offset";

/// Header carrying base64-encoded key/value metadata on creation.
pub const HEADER_UPLOAD_METADATA: &str = "Upload-Metadata";

/// Content type required for chunk bodies.
pub const OFFSET_OCTET_STREAM: &str = "application/offset+octet-stream";

/// Default chunk size: 5 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 5 * 1024 * 1024;

/// Default client-side upload limit: 10 GiB.
pub const DEFAULT_MAX_UPLOAD_SIZE: u64 = 10 * 1024 * 1024 * 1024;

/// Connect and per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Whole-resource timeout.
///
/// Large chunks on slow uplinks and long playback streams both need a
/// generous ceiling; a stalled connection is still caught by the
/// per-request timeout.
pub const DEFAULT_RESOURCE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Multipart field name of the file part on the direct upload path.
pub const FILE_FIELD_NAME: &str = "file";
