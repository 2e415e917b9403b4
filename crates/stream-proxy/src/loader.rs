//! Streaming proxy loader.
//!
//! Each player request becomes one GET task against the real origin. The
//! task streams body chunks into the request's sink as they arrive and
//! finishes the request through the registry, which guarantees a single
//! finish per request whichever of completion, failure or cancellation
//! gets there first.

use std::sync::Arc;

use futures_util::StreamExt;
use mediavault_transport::header::RANGE;
use mediavault_transport::{HttpTransport, Method, StatusCode, Url};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::content::ContentInfo;
use crate::error::ProxyError;
use crate::range::range_header;
use crate::registry::{Delivery, ProxyRequestState, Registry, RequestId};
use crate::sink::LoadingRequest;
use crate::url::SchemeMapping;

/// Relays player requests for synthetic URLs to the real origin.
///
/// Requires a Tokio runtime: every request runs on a spawned task.
pub struct StreamingProxyLoader {
    transport: HttpTransport,
    mapping: SchemeMapping,
    registry: Arc<Registry>,
}

impl StreamingProxyLoader {
    /// `transport` carries credentials and the certificate trust policy.
    pub fn new(transport: HttpTransport, mapping: SchemeMapping) -> Self {
        Self {
            transport,
            mapping,
            registry: Arc::new(Registry::default()),
        }
    }

    pub fn mapping(&self) -> &SchemeMapping {
        &self.mapping
    }

    /// Starts serving `request`. The sink is finished exactly once.
    pub fn start_loading(&self, request: LoadingRequest) -> RequestId {
        let (id, cancel) = self.registry.register(&request);

        let target = self
            .mapping
            .to_upstream(&request.url)
            .and_then(|url| range_header(request.offset, request.length).map(|range| (url, range)));
        let (url, range) = match target {
            Ok(target) => target,
            Err(e) => {
                warn!(request_id = id, url = %request.url, error = %e, "cannot build upstream request");
                self.registry.finish(id, Err(e));
                return id;
            }
        };

        debug!(
            request_id = id,
            url = %url,
            offset = request.offset,
            length = request.length,
            "loading range"
        );

        let fetch = Fetch {
            transport: self.transport.clone(),
            registry: Arc::clone(&self.registry),
            id,
            url,
            range,
            offset: request.offset,
        };
        tokio::spawn(async move {
            if let Some(result) = fetch.run(&cancel).await {
                fetch.registry.finish(fetch.id, result);
            }
        });
        id
    }

    /// Cancels a request on behalf of the player.
    ///
    /// The network task is stopped and the request finishes without error.
    /// Returns `false` if it had already finished.
    pub fn cancel_request(&self, id: RequestId) -> bool {
        let cancelled = self.registry.finish(id, Ok(()));
        if cancelled {
            info!(request_id = id, "request cancelled by player");
        }
        cancelled
    }

    /// Cancels every outstanding request.
    pub fn cancel_all(&self) {
        for id in self.registry.ids() {
            self.cancel_request(id);
        }
    }

    /// Requests that have not finished yet.
    pub fn active_requests(&self) -> Vec<ProxyRequestState> {
        self.registry.active()
    }
}

impl Drop for StreamingProxyLoader {
    /// Requests still pending are cut short: they fail rather than look
    /// complete to the player.
    fn drop(&mut self) {
        for id in self.registry.ids() {
            if self.registry.finish(id, Err(ProxyError::Shutdown)) {
                debug!(request_id = id, "request aborted by loader shutdown");
            }
        }
    }
}

/// One upstream GET feeding one player request.
struct Fetch {
    transport: HttpTransport,
    registry: Arc<Registry>,
    id: RequestId,
    url: Url,
    range: String,
    offset: u64,
}

impl Fetch {
    /// Streams the response. Returns the finish result, or `None` when the
    /// request was already finished elsewhere (cancelled).
    async fn run(&self, cancel: &CancellationToken) -> Option<Result<(), ProxyError>> {
        let request = self
            .transport
            .request(Method::GET, self.url.clone())
            .header(RANGE, self.range.as_str());

        let resp = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            r = request.send() => match r {
                Ok(resp) => resp,
                Err(e) => {
                    warn!(request_id = self.id, error = %e, "upstream request failed");
                    return Some(Err(e.into()));
                }
            },
        };

        let status = resp.status();
        if !status.is_success() {
            warn!(request_id = self.id, status = status.as_u16(), "upstream rejected range request");
            return Some(Err(ProxyError::Upstream(status.as_u16())));
        }

        let mut info = ContentInfo::from_headers(resp.headers(), self.url.path());
        // A 200 to a ranged request carries the whole resource from byte 0.
        let mut skip = if status == StatusCode::OK && self.offset > 0 {
            info.byte_range_supported = false;
            self.offset
        } else {
            0
        };
        self.registry.set_content_info(self.id, info);

        let mut body = resp.bytes_stream();
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                next = body.next() => next,
            };

            let mut chunk = match next {
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => {
                    warn!(request_id = self.id, error = %e, "upstream stream failed");
                    return Some(Err(e.into()));
                }
                None => {
                    debug!(request_id = self.id, "upstream reached end of body");
                    return Some(Ok(()));
                }
            };

            if skip > 0 {
                let dropped = skip.min(chunk.len() as u64);
                let _ = chunk.split_to(dropped as usize);
                skip -= dropped;
                if chunk.is_empty() {
                    continue;
                }
            }

            match self.registry.deliver(self.id, chunk) {
                Delivery::Continue => {}
                Delivery::Satisfied => {
                    debug!(request_id = self.id, "requested range delivered");
                    return Some(Ok(()));
                }
                Delivery::Closed => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::LoadingRequestSink;
    use bytes::Bytes;
    use mediavault_transport::{Credentials, TransportConfig};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::Notify;

    const RESOURCE_LEN: usize = 1000;

    fn resource() -> Vec<u8> {
        (0..RESOURCE_LEN).map(|i| (i % 256) as u8).collect()
    }

    #[derive(Default)]
    struct TestSink {
        info: Mutex<Vec<ContentInfo>>,
        data: Mutex<Vec<u8>>,
        finishes: Mutex<Vec<Option<String>>>,
        done: Notify,
    }

    impl LoadingRequestSink for TestSink {
        fn set_content_info(&self, info: ContentInfo) {
            self.info.lock().unwrap().push(info);
        }
        fn respond_with_data(&self, data: Bytes) {
            self.data.lock().unwrap().extend_from_slice(&data);
        }
        fn finish_loading(&self) {
            self.finishes.lock().unwrap().push(None);
            self.done.notify_one();
        }
        fn finish_with_error(&self, error: ProxyError) {
            self.finishes.lock().unwrap().push(Some(error.to_string()));
            self.done.notify_one();
        }
    }

    impl TestSink {
        async fn wait(&self) {
            tokio::time::timeout(Duration::from_secs(5), self.done.notified())
                .await
                .expect("request never finished");
        }
    }

    #[derive(Clone, Copy)]
    enum Upstream {
        /// Honors `Range` with 206 and advertises byte ranges.
        Ranged,
        /// Ignores `Range` and sends the whole resource with 200.
        Whole,
        /// Sends headers, then stalls before the body.
        Stall,
        NotFound,
    }

    /// Serves the test resource; records request heads.
    async fn upstream(mode: Upstream) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let heads = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&heads);

        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let log = Arc::clone(&log);
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 8192];
                    let n = stream.read(&mut buf).await.unwrap_or(0);
                    let head = String::from_utf8_lossy(&buf[..n]).to_string();
                    log.lock().unwrap().push(head.clone());

                    let data = resource();
                    let range = head
                        .lines()
                        .find_map(|l| {
                            let (k, v) = l.split_once(':')?;
                            k.eq_ignore_ascii_case("range").then(|| v.trim().to_string())
                        })
                        .and_then(|v| {
                            let spec = v.strip_prefix("bytes=")?;
                            let (start, end) = spec.split_once('-')?;
                            let start: usize = start.parse().ok()?;
                            let end: usize = if end.is_empty() {
                                RESOURCE_LEN - 1
                            } else {
                                end.parse::<usize>().ok()?.min(RESOURCE_LEN - 1)
                            };
                            Some((start, end))
                        });

                    let (head_out, body) = match mode {
                        Upstream::NotFound => (
                            "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string(),
                            Vec::new(),
                        ),
                        Upstream::Whole => (
                            format!(
                                "HTTP/1.1 200 OK\r\nContent-Type: video/mp4\r\nContent-Length: {RESOURCE_LEN}\r\nConnection: close\r\n\r\n"
                            ),
                            data,
                        ),
                        Upstream::Ranged | Upstream::Stall => {
                            let (start, end) = range.unwrap_or((0, RESOURCE_LEN - 1));
                            (
                                format!(
                                    "HTTP/1.1 206 Partial Content\r\nContent-Type: video/mp4\r\nAccept-Ranges: bytes\r\nContent-Range: bytes {start}-{end}/{RESOURCE_LEN}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                                    end - start + 1
                                ),
                                data[start..=end].to_vec(),
                            )
                        }
                    };

                    if stream.write_all(head_out.as_bytes()).await.is_err() {
                        return;
                    }
                    if matches!(mode, Upstream::Stall) {
                        tokio::time::sleep(Duration::from_secs(30)).await;
                    }
                    // Several writes so the client sees more than one chunk.
                    for piece in body.chunks(64) {
                        if stream.write_all(piece).await.is_err() {
                            return;
                        }
                        let _ = stream.flush().await;
                    }
                    let _ = stream.shutdown().await;
                });
            }
        });

        (format!("127.0.0.1:{port}"), heads)
    }

    fn loader() -> StreamingProxyLoader {
        let transport = HttpTransport::new(
            TransportConfig::new("http://127.0.0.1").with_credentials(Credentials::new("user", "pass")),
        )
        .unwrap();
        StreamingProxyLoader::new(transport, SchemeMapping::new("proxy", "http"))
    }

    fn request(authority: &str, offset: u64, length: u64, sink: &Arc<TestSink>) -> LoadingRequest {
        LoadingRequest::new(
            format!("proxy://{authority}/media/talk.mp4?v=1"),
            offset,
            length,
            sink.clone(),
        )
    }

    #[tokio::test]
    async fn bounded_range_delivers_exact_bytes() {
        let (authority, heads) = upstream(Upstream::Ranged).await;
        let loader = loader();
        let sink = Arc::new(TestSink::default());

        loader.start_loading(request(&authority, 100, 100, &sink));
        sink.wait().await;

        assert_eq!(*sink.data.lock().unwrap(), resource()[100..200].to_vec());
        let info = sink.info.lock().unwrap();
        assert_eq!(info.len(), 1);
        assert_eq!(info[0].content_length, 1000);
        assert!(info[0].byte_range_supported);
        assert_eq!(info[0].content_type, "video/mp4");
        assert_eq!(*sink.finishes.lock().unwrap(), vec![None]);
        assert!(loader.active_requests().is_empty());

        let head = heads.lock().unwrap()[0].to_lowercase();
        assert!(head.starts_with("get /media/talk.mp4?v=1 "));
        assert!(head.contains("range: bytes=100-199"));
        assert!(head.contains("authorization: basic dxnlcjpwyxnz"));
    }

    #[tokio::test]
    async fn open_ended_range_finishes_at_eof() {
        let (authority, _) = upstream(Upstream::Ranged).await;
        let loader = loader();
        let sink = Arc::new(TestSink::default());

        loader.start_loading(request(&authority, 900, 0, &sink));
        sink.wait().await;

        assert_eq!(*sink.data.lock().unwrap(), resource()[900..].to_vec());
        assert_eq!(*sink.finishes.lock().unwrap(), vec![None]);
    }

    #[tokio::test]
    async fn whole_body_reply_is_offset_locally() {
        let (authority, _) = upstream(Upstream::Whole).await;
        let loader = loader();
        let sink = Arc::new(TestSink::default());

        loader.start_loading(request(&authority, 100, 100, &sink));
        sink.wait().await;

        assert_eq!(*sink.data.lock().unwrap(), resource()[100..200].to_vec());
        let info = sink.info.lock().unwrap();
        assert_eq!(info[0].content_length, 1000);
        assert!(!info[0].byte_range_supported);
    }

    #[tokio::test]
    async fn upstream_error_fails_request() {
        let (authority, _) = upstream(Upstream::NotFound).await;
        let loader = loader();
        let sink = Arc::new(TestSink::default());

        loader.start_loading(request(&authority, 0, 10, &sink));
        sink.wait().await;

        let finishes = sink.finishes.lock().unwrap();
        assert_eq!(finishes.len(), 1);
        assert!(finishes[0].as_deref().unwrap().contains("404"));
        assert!(sink.data.lock().unwrap().is_empty());
        assert!(sink.info.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn player_cancel_finishes_without_error() {
        let (authority, _) = upstream(Upstream::Stall).await;
        let loader = loader();
        let sink = Arc::new(TestSink::default());

        let id = loader.start_loading(request(&authority, 0, 0, &sink));
        // Wait until headers arrived and content info went out.
        for _ in 0..200 {
            if !sink.info.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(loader.active_requests().len(), 1);

        assert!(loader.cancel_request(id));
        assert!(!loader.cancel_request(id));

        assert_eq!(*sink.finishes.lock().unwrap(), vec![None]);
        assert!(loader.active_requests().is_empty());
    }

    #[tokio::test]
    async fn concurrent_requests_are_independent() {
        let (authority, _) = upstream(Upstream::Ranged).await;
        let loader = loader();
        let first = Arc::new(TestSink::default());
        let second = Arc::new(TestSink::default());

        let a = loader.start_loading(request(&authority, 0, 10, &first));
        let b = loader.start_loading(request(&authority, 500, 20, &second));
        assert_ne!(a, b);
        first.wait().await;
        second.wait().await;

        assert_eq!(*first.data.lock().unwrap(), resource()[0..10].to_vec());
        assert_eq!(*second.data.lock().unwrap(), resource()[500..520].to_vec());
    }

    #[tokio::test]
    async fn bad_scheme_fails_immediately() {
        let loader = loader();
        let sink = Arc::new(TestSink::default());
        loader.start_loading(LoadingRequest::new("ftp://h/x.mp4", 0, 0, sink.clone()));

        let finishes = sink.finishes.lock().unwrap();
        assert_eq!(finishes.len(), 1);
        assert!(finishes[0].is_some());
        assert!(loader.active_requests().is_empty());
    }

    /// Player that cancels its request from inside the first data callback.
    #[derive(Default)]
    struct CancellingSink {
        seen: TestSink,
        target: Mutex<Option<(Arc<StreamingProxyLoader>, RequestId)>>,
    }

    impl LoadingRequestSink for CancellingSink {
        fn set_content_info(&self, info: ContentInfo) {
            self.seen.set_content_info(info);
        }
        fn respond_with_data(&self, data: Bytes) {
            self.seen.respond_with_data(data);
            let target = self.target.lock().unwrap().take();
            if let Some((loader, id)) = target {
                assert!(loader.cancel_request(id));
                assert!(loader.active_requests().is_empty());
            }
        }
        fn finish_loading(&self) {
            self.seen.finish_loading();
        }
        fn finish_with_error(&self, error: ProxyError) {
            self.seen.finish_with_error(error);
        }
    }

    #[tokio::test]
    async fn player_may_cancel_from_inside_a_callback() {
        let (authority, _) = upstream(Upstream::Ranged).await;
        let loader = Arc::new(loader());
        let sink = Arc::new(CancellingSink::default());

        let id = loader.start_loading(LoadingRequest::new(
            format!("proxy://{authority}/media/talk.mp4"),
            0,
            0,
            sink.clone(),
        ));
        // The fetch task has not run yet on this single-threaded runtime.
        *sink.target.lock().unwrap() = Some((Arc::clone(&loader), id));
        sink.seen.wait().await;

        assert_eq!(*sink.seen.finishes.lock().unwrap(), vec![None]);
        let data = sink.seen.data.lock().unwrap().clone();
        assert!(!data.is_empty());
        assert!(resource().starts_with(&data));
        assert!(loader.active_requests().is_empty());
        assert!(!loader.cancel_request(id));
    }

    #[tokio::test]
    async fn dropping_the_loader_fails_pending_requests() {
        let (authority, _) = upstream(Upstream::Stall).await;
        let loader = loader();
        let sink = Arc::new(TestSink::default());

        loader.start_loading(request(&authority, 0, 0, &sink));
        for _ in 0..200 {
            if !sink.info.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        drop(loader);

        let finishes = sink.finishes.lock().unwrap();
        assert_eq!(finishes.len(), 1);
        assert!(finishes[0].as_deref().unwrap().contains("shut down"));
    }

    #[tokio::test]
    async fn overflowing_range_fails_without_request() {
        let (authority, heads) = upstream(Upstream::Ranged).await;
        let loader = loader();
        let sink = Arc::new(TestSink::default());

        loader.start_loading(request(&authority, u64::MAX, 2, &sink));

        let finishes = sink.finishes.lock().unwrap();
        assert_eq!(finishes.len(), 1);
        assert!(finishes[0].as_deref().unwrap().contains("range out of bounds"));
        assert!(heads.lock().unwrap().is_empty());
        assert!(loader.active_requests().is_empty());
    }
}
