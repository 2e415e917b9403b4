use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Errors from metadata encoding and validation.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("rating out of range: {0}")]
    InvalidRating(u8),

    #[error("malformed metadata pair: {0}")]
    MalformedPair(String),

    #[error("metadata value is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("metadata value is not UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Structured description of a recording, supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadMetadata {
    /// Serialized as `yyyy-MM-dd`.
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

/// Highest accepted star rating.
pub const MAX_RATING: u8 = 5;

impl UploadMetadata {
    /// Creates metadata with the mandatory fields only.
    pub fn new(
        event_date: NaiveDate,
        org_name: impl Into<String>,
        event_type: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            event_date,
            org_name: org_name.into(),
            event_type: event_type.into(),
            label: label.into(),
            participants: None,
            keywords: None,
            location: None,
            rating: None,
            notes: None,
        }
    }

    /// Checks mandatory fields. Whitespace-only values count as missing.
    pub fn validate(&self) -> Result<(), MetadataError> {
        if self.label.trim().is_empty() {
            return Err(MetadataError::MissingField("label"));
        }
        if self.org_name.trim().is_empty() {
            return Err(MetadataError::MissingField("org_name"));
        }
        if self.event_type.trim().is_empty() {
            return Err(MetadataError::MissingField("event_type"));
        }
        if let Some(rating) = self.rating
            && rating > MAX_RATING
        {
            return Err(MetadataError::InvalidRating(rating));
        }
        Ok(())
    }

    /// Builds the opaque context map sent with the upload creation request.
    ///
    /// Optional fields are only present when set and non-empty.
    pub fn context_headers(&self, file_name: &str, mime_type: &str) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert("filename".to_string(), file_name.to_string());
        map.insert("filetype".to_string(), mime_type.to_string());
        map.insert(
            "event_date".to_string(),
            self.event_date.format("%Y-%m-%d").to_string(),
        );
        map.insert("org_name".to_string(), self.org_name.clone());
        map.insert("event_type".to_string(), self.event_type.clone());
        map.insert("label".to_string(), self.label.clone());

        let optional = [
            ("participants", &self.participants),
            ("keywords", &self.keywords),
            ("location", &self.location),
            ("notes", &self.notes),
        ];
        for (key, value) in optional {
            if let Some(v) = value
                && !v.is_empty()
            {
                map.insert(key.to_string(), v.clone());
            }
        }
        if let Some(rating) = self.rating {
            map.insert("rating".to_string(), rating.to_string());
        }
        map
    }
}

impl UploadMetadata {
    /// Ordered form fields for the direct multipart path.
    pub fn form_fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![
            (
                "event_date".to_string(),
                self.event_date.format("%Y-%m-%d").to_string(),
            ),
            ("org_name".to_string(), self.org_name.clone()),
            ("event_type".to_string(), self.event_type.clone()),
            ("label".to_string(), self.label.clone()),
        ];
        for (key, value) in [
            ("participants", &self.participants),
            ("keywords", &self.keywords),
            ("location", &self.location),
        ] {
            if let Some(v) = value
                && !v.is_empty()
            {
                fields.push((key.to_string(), v.clone()));
            }
        }
        if let Some(rating) = self.rating {
            fields.push(("rating".to_string(), rating.to_string()));
        }
        if let Some(notes) = &self.notes
            && !notes.is_empty()
        {
            fields.push(("notes".to_string(), notes.clone()));
        }
        fields
    }
}

/// Encodes a metadata map as an `Upload-Metadata` header value.
///
/// Format: comma-separated `key base64(value)` pairs. Keys must not contain
/// spaces or commas; such keys are skipped.
pub fn encode_upload_metadata(map: &BTreeMap<String, String>) -> String {
    map.iter()
        .filter(|(k, _)| !k.is_empty() && !k.contains([' ', ',']))
        .map(|(k, v)| {
            if v.is_empty() {
                k.clone()
            } else {
                format!("{k} {}", STANDARD.encode(v.as_bytes()))
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Decodes an `Upload-Metadata` header value back into a map.
pub fn decode_upload_metadata(header: &str) -> Result<BTreeMap<String, String>, MetadataError> {
    let mut map = BTreeMap::new();
    for pair in header.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let mut parts = pair.splitn(2, ' ');
        let key = parts
            .next()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| MetadataError::MalformedPair(pair.to_string()))?;
        let value = match parts.next() {
            Some(encoded) => String::from_utf8(STANDARD.decode(encoded.trim())?)?,
            None => String::new(),
        };
        map.insert(key.to_string(), value);
    }
    Ok(map)
}
