//! Streaming `multipart/form-data` body.
//!
//! The framing around the file part is fully determined by the field list
//! and the file part's metadata, so the body length is known up front and
//! the transport can send `Content-Length` before the first byte.

use std::io;

use tracing::warn;

use crate::source::ByteSource;

/// Position of a [`MultipartBodyStream`] within the body.
///
/// Transitions only move forward: `Header → FileContent → Footer →
/// Complete`, or to `Failed` from any non-terminal phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Header,
    FileContent,
    Footer,
    Complete,
    Failed,
}

/// Descriptor of the single file part.
pub struct FilePart<S> {
    pub field_name: String,
    pub file_name: String,
    pub mime_type: String,
    pub source: S,
}

/// Generates a boundary that will not collide with typical payloads.
pub fn generate_boundary() -> String {
    format!("MediaVaultBoundary-{}", uuid::Uuid::new_v4().simple())
}

/// Pull-based multipart body: header, file bytes, footer.
pub struct MultipartBodyStream<S> {
    boundary: String,
    header: Vec<u8>,
    footer: Vec<u8>,
    file_name: String,
    source: S,
    phase: Phase,
    /// Offset within the current in-memory segment (header or footer).
    segment_offset: usize,
    file_bytes_read: u64,
    content_length: u64,
}

impl<S: ByteSource> MultipartBodyStream<S> {
    /// Builds the framing for `fields` (sent in order) followed by `part`.
    pub fn new(boundary: impl Into<String>, fields: &[(String, String)], part: FilePart<S>) -> Self {
        let boundary = boundary.into();

        let mut header = String::new();
        for (name, value) in fields {
            header.push_str(&format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                escape_quoted(name),
                field_value(value, &boundary)
            ));
        }
        header.push_str(&format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
            escape_quoted(&part.field_name),
            escape_quoted(&part.file_name),
            part.mime_type.replace(['\r', '\n'], "")
        ));
        let footer = format!("\r\n--{boundary}--\r\n").into_bytes();
        let header = header.into_bytes();

        let content_length =
            header.len() as u64 + part.source.content_length() + footer.len() as u64;

        Self {
            boundary,
            header,
            footer,
            file_name: part.file_name,
            source: part.source,
            phase: Phase::Header,
            segment_offset: 0,
            file_bytes_read: 0,
            content_length,
        }
    }

    /// Same as [`new`](Self::new) with a freshly generated boundary.
    pub fn with_generated_boundary(fields: &[(String, String)], part: FilePart<S>) -> Self {
        Self::new(generate_boundary(), fields, part)
    }

    /// Value for the request's `Content-Type` header.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn fail(&mut self, err: io::Error) -> io::Error {
        warn!(file = %self.file_name, error = %err, "multipart body failed while reading file");
        self.phase = Phase::Failed;
        self.source.close();
        err
    }
}

impl<S: ByteSource> ByteSource for MultipartBodyStream<S> {
    fn open(&mut self) -> io::Result<()> {
        self.source.open()
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut written = 0;
        while written < buf.len() {
            match self.phase {
                Phase::Header => {
                    written += copy_segment(&self.header, &mut self.segment_offset, &mut buf[written..]);
                    if self.segment_offset == self.header.len() {
                        self.phase = Phase::FileContent;
                        self.segment_offset = 0;
                    }
                }
                Phase::FileContent => match self.source.read(&mut buf[written..]) {
                    Ok(0) => {
                        let expected = self.source.content_length();
                        if self.file_bytes_read != expected {
                            let err = io::Error::new(
                                io::ErrorKind::UnexpectedEof,
                                format!(
                                    "file part ended after {} of {expected} bytes",
                                    self.file_bytes_read
                                ),
                            );
                            return Err(self.fail(err));
                        }
                        self.phase = Phase::Footer;
                    }
                    Ok(n) => {
                        written += n;
                        self.file_bytes_read += n as u64;
                    }
                    Err(e) => return Err(self.fail(e)),
                },
                Phase::Footer => {
                    written += copy_segment(&self.footer, &mut self.segment_offset, &mut buf[written..]);
                    if self.segment_offset == self.footer.len() {
                        self.phase = Phase::Complete;
                        self.segment_offset = 0;
                    }
                }
                Phase::Complete => break,
                Phase::Failed => {
                    return Err(io::Error::other("multipart body is in a failed state"));
                }
            }
        }
        Ok(written)
    }

    fn close(&mut self) {
        self.source.close();
    }

    fn content_length(&self) -> u64 {
        self.content_length
    }
}

/// Copies as much of `segment[*offset..]` as fits into `out`.
fn copy_segment(segment: &[u8], offset: &mut usize, out: &mut [u8]) -> usize {
    let rest = &segment[*offset..];
    let n = rest.len().min(out.len());
    out[..n].copy_from_slice(&rest[..n]);
    *offset += n;
    n
}

/// Percent-escapes characters that would break a quoted header parameter.
fn escape_quoted(value: &str) -> String {
    value
        .replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

/// Makes a form value safe to embed in the body.
///
/// Carriage returns are dropped so the value cannot contain a CRLF, and any
/// occurrence of the boundary has its leading dashes escaped. Newlines are
/// kept so multi-line notes survive as LF-separated text.
fn field_value(value: &str, boundary: &str) -> String {
    let value = value.replace('\r', "");
    if boundary.is_empty() {
        return value;
    }
    value.replace(&format!("--{boundary}"), &format!("%2D%2D{boundary}"))
}
