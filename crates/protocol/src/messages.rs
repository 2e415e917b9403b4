use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

use crate::types::UploadMetadata;

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

/// Registers a completed byte transfer against structured metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizeRequest {
    pub upload_id: String,
    pub event_date: NaiveDate,
    pub org_name: String,
    pub event_type: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participants: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl FinalizeRequest {
    /// Builds the request for `upload_id` from caller metadata.
    pub fn new(upload_id: impl Into<String>, metadata: &UploadMetadata) -> Self {
        Self {
            upload_id: upload_id.into(),
            event_date: metadata.event_date,
            org_name: metadata.org_name.clone(),
            event_type: metadata.event_type.clone(),
            label: metadata.label.clone(),
            participants: non_empty(&metadata.participants),
            keywords: non_empty(&metadata.keywords),
            location: non_empty(&metadata.location),
            rating: metadata.rating,
            notes: non_empty(&metadata.notes),
        }
    }
}

fn non_empty(v: &Option<String>) -> Option<String> {
    v.as_ref().filter(|s| !s.is_empty()).cloned()
}

/// Deletes a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub file_id: String,
    pub delete_token: String,
}

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

/// Record returned by a successful finalize (or direct upload).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizeRecord {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub file_name: String,
    #[serde(default)]
    pub file_type: String,
    #[serde(default)]
    pub mime_type: String,
    pub size_bytes: u64,
    pub checksum_sha256: String,
    #[serde(default)]
    pub event_date: String,
    #[serde(default)]
    pub org_name: String,
    #[serde(default)]
    pub event_type: String,
    #[serde(default)]
    pub label: String,
    /// Empty when the server merged this upload into an existing record.
    #[serde(default, deserialize_with = "empty_if_null")]
    pub delete_token: String,
}

impl FinalizeRecord {
    /// Whether the server detected byte-identical content and merged it.
    pub fn is_duplicate(&self) -> bool {
        self.delete_token.is_empty()
    }
}

/// Body of a `409 Conflict` finalize response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DuplicateConflict {
    #[serde(default)]
    pub error: String,
    #[serde(default, alias = "id", deserialize_with = "optional_string_or_number")]
    pub existing_id: Option<String>,
    #[serde(default)]
    pub checksum_sha256: Option<String>,
}

/// Response of the delete endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub success: bool,
    #[serde(default)]
    pub deleted_count: u32,
    #[serde(default)]
    pub error_count: u32,
}

/// Generic error body some endpoints attach to 4xx/5xx responses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default, alias = "message")]
    pub error: String,
}

impl ErrorBody {
    /// Extracts a readable message from a raw body, falling back to the body itself.
    pub fn message_from(body: &str) -> String {
        match serde_json::from_str::<ErrorBody>(body) {
            Ok(parsed) if !parsed.error.is_empty() => parsed.error,
            _ => body.trim().to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Lenient field decoders
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Int(i64),
    Uint(u64),
}

impl From<StringOrNumber> for String {
    fn from(v: StringOrNumber) -> Self {
        match v {
            StringOrNumber::String(s) => s,
            StringOrNumber::Int(n) => n.to_string(),
            StringOrNumber::Uint(n) => n.to_string(),
        }
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    StringOrNumber::deserialize(d).map(Into::into)
}

fn optional_string_or_number<'de, D: Deserializer<'de>>(
    d: D,
) -> Result<Option<String>, D::Error> {
    Ok(Option::<StringOrNumber>::deserialize(d)?.map(Into::into))
}

fn empty_if_null<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}
