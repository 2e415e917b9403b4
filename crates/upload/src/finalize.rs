//! Finalize and delete calls, and the shared response interpretation.

use mediavault_protocol::constants::{DELETE_PATH, FINALIZE_PATH};
use mediavault_protocol::{
    DeleteRequest, DeleteResponse, DuplicateConflict, ErrorBody, FinalizeRecord, FinalizeRequest,
    UploadMetadata,
};
use mediavault_transport::{HttpTransport, Method, StatusCode};
use tracing::{debug, info, warn};

use crate::error::UploadError;

/// Registers a completed byte transfer as a record.
pub async fn finalize(
    transport: &HttpTransport,
    upload_id: &str,
    metadata: &UploadMetadata,
) -> Result<FinalizeRecord, UploadError> {
    let url = transport.endpoint(FINALIZE_PATH)?;
    let request = FinalizeRequest::new(upload_id, metadata);

    debug!(upload_id, "finalizing upload");
    let resp = transport
        .control_request(Method::POST, url)
        .json(&request)
        .send()
        .await?;
    let status = resp.status();
    let body = resp.text().await?;

    let record = interpret_finalize_response(status, &body)?;
    info!(
        upload_id,
        record_id = %record.id,
        duplicate = record.is_duplicate(),
        "upload finalized"
    );
    Ok(record)
}

/// Maps a finalize (or direct upload) response to a record or a domain error.
///
/// - 2xx: the body is a [`FinalizeRecord`]
/// - 401/403: permission error
/// - 409: duplicate content, carrying the existing record when the server names it
/// - 413: payload too large
/// - anything else: bad request with the body surfaced for diagnostics
pub fn interpret_finalize_response(
    status: StatusCode,
    body: &str,
) -> Result<FinalizeRecord, UploadError> {
    if status.is_success() {
        return Ok(serde_json::from_str(body)?);
    }

    warn!(status = status.as_u16(), "finalize rejected");
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(UploadError::PermissionDenied(ErrorBody::message_from(body)))
        }
        StatusCode::CONFLICT => {
            let conflict: DuplicateConflict = serde_json::from_str(body).unwrap_or_default();
            Err(UploadError::DuplicateContent {
                existing_id: conflict.existing_id,
                checksum: conflict.checksum_sha256,
            })
        }
        StatusCode::PAYLOAD_TOO_LARGE => Err(UploadError::PayloadTooLarge),
        _ => Err(UploadError::BadRequest {
            status: status.as_u16(),
            body: ErrorBody::message_from(body),
        }),
    }
}

/// Deletes a record with its delete token.
///
/// A `403` means the token is invalid or stale.
pub async fn delete(
    transport: &HttpTransport,
    record_id: &str,
    delete_token: &str,
) -> Result<DeleteResponse, UploadError> {
    if delete_token.is_empty() {
        return Err(UploadError::NotDeletable(record_id.to_string()));
    }

    let url = transport.endpoint(DELETE_PATH)?;
    let request = DeleteRequest {
        file_id: record_id.to_string(),
        delete_token: delete_token.to_string(),
    };

    let resp = transport
        .control_request(Method::POST, url)
        .json(&request)
        .send()
        .await?;
    let status = resp.status();
    let body = resp.text().await?;

    match status {
        StatusCode::FORBIDDEN => Err(UploadError::InvalidDeleteToken),
        StatusCode::UNAUTHORIZED => {
            Err(UploadError::PermissionDenied(ErrorBody::message_from(&body)))
        }
        s if s.is_success() => {
            let response: DeleteResponse = serde_json::from_str(&body)?;
            if !response.success {
                return Err(UploadError::DeleteFailed(format!(
                    "server reported {} error(s)",
                    response.error_count
                )));
            }
            info!(record_id, "record deleted");
            Ok(response)
        }
        s => Err(UploadError::BadRequest {
            status: s.as_u16(),
            body: ErrorBody::message_from(&body),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_server::{MockServer, Reply};
    use mediavault_protocol::NaiveDate;
    use mediavault_transport::{Credentials, TransportConfig};
    use serde_json::json;

    fn record_json(token: &str) -> serde_json::Value {
        json!({
            "id": 42,
            "file_name": "recital.m4a",
            "file_type": "audio",
            "mime_type": "audio/mp4",
            "size_bytes": 10,
            "checksum_sha256": "9f86d0",
            "event_date": "2024-03-09",
            "org_name": "Choir Society",
            "event_type": "concert",
            "label": "Spring recital",
            "delete_token": token,
        })
    }

    fn transport(base: &str) -> HttpTransport {
        HttpTransport::new(TransportConfig::new(base).with_credentials(Credentials::new("u", "p")))
            .unwrap()
    }

    fn metadata() -> UploadMetadata {
        UploadMetadata::new(
            NaiveDate::from_ymd_opt(2024, 3, 9).unwrap(),
            "Choir Society",
            "concert",
            "Spring recital",
        )
    }

    #[test]
    fn success_decodes_record() {
        let body = record_json("tok-1").to_string();
        let record = interpret_finalize_response(StatusCode::CREATED, &body).unwrap();
        assert_eq!(record.id, "42");
        assert_eq!(record.delete_token, "tok-1");
        assert!(!record.is_duplicate());
    }

    #[test]
    fn success_with_empty_token_is_duplicate() {
        let body = record_json("").to_string();
        let record = interpret_finalize_response(StatusCode::OK, &body).unwrap();
        assert!(record.is_duplicate());
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(
            interpret_finalize_response(StatusCode::UNAUTHORIZED, ""),
            Err(UploadError::PermissionDenied(_))
        ));
        assert!(matches!(
            interpret_finalize_response(StatusCode::FORBIDDEN, r#"{"error":"nope"}"#),
            Err(UploadError::PermissionDenied(m)) if m == "nope"
        ));
        assert!(matches!(
            interpret_finalize_response(StatusCode::PAYLOAD_TOO_LARGE, ""),
            Err(UploadError::PayloadTooLarge)
        ));
        assert!(matches!(
            interpret_finalize_response(StatusCode::BAD_REQUEST, r#"{"error":"label required"}"#),
            Err(UploadError::BadRequest { status: 400, body }) if body == "label required"
        ));
        assert!(matches!(
            interpret_finalize_response(StatusCode::INTERNAL_SERVER_ERROR, "oops"),
            Err(UploadError::BadRequest { status: 500, body }) if body == "oops"
        ));
    }

    #[test]
    fn conflict_carries_existing_record() {
        let body = r#"{"error":"duplicate","existing_id":17,"checksum_sha256":"abc"}"#;
        match interpret_finalize_response(StatusCode::CONFLICT, body) {
            Err(UploadError::DuplicateContent {
                existing_id,
                checksum,
            }) => {
                assert_eq!(existing_id.as_deref(), Some("17"));
                assert_eq!(checksum.as_deref(), Some("abc"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn malformed_success_body_is_an_error() {
        assert!(matches!(
            interpret_finalize_response(StatusCode::OK, "<html>"),
            Err(UploadError::Json(_))
        ));
    }

    #[tokio::test]
    async fn finalize_posts_upload_id_and_metadata() {
        let server = MockServer::start(|_| Reply::new(201).json(record_json("tok"))).await;
        let t = transport(&server.base_url);

        let record = finalize(&t, "abc123", &metadata()).await.unwrap();
        assert_eq!(record.delete_token, "tok");

        let reqs = server.requests();
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].method, "POST");
        assert_eq!(reqs[0].path, FINALIZE_PATH);
        let sent: serde_json::Value = serde_json::from_slice(&reqs[0].body).unwrap();
        assert_eq!(sent["upload_id"], "abc123");
        assert_eq!(sent["event_date"], "2024-03-09");
        assert_eq!(sent["label"], "Spring recital");
        assert!(sent.get("notes").is_none());
        assert!(reqs[0].header("authorization").unwrap().starts_with("Basic "));
    }

    #[tokio::test]
    async fn delete_succeeds_and_rejects_stale_token() {
        let server = MockServer::start(|req| {
            let sent: serde_json::Value = serde_json::from_slice(&req.body).unwrap();
            if sent["delete_token"] == "good" {
                Reply::new(200).json(json!({"success": true, "deleted_count": 1, "error_count": 0}))
            } else {
                Reply::new(403).json(json!({"error": "invalid token"}))
            }
        })
        .await;
        let t = transport(&server.base_url);

        let resp = delete(&t, "42", "good").await.unwrap();
        assert_eq!(resp.deleted_count, 1);
        assert!(matches!(
            delete(&t, "42", "stale").await,
            Err(UploadError::InvalidDeleteToken)
        ));

        let first: serde_json::Value = serde_json::from_slice(&server.requests()[0].body).unwrap();
        assert_eq!(first["file_id"], "42");
    }

    #[tokio::test]
    async fn delete_without_token_makes_no_request() {
        let server = MockServer::start(|_| Reply::new(200)).await;
        let t = transport(&server.base_url);
        assert!(matches!(
            delete(&t, "42", "").await,
            Err(UploadError::NotDeletable(_))
        ));
        assert!(server.requests().is_empty());
    }
}
