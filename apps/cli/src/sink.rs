//! File-backed player sink for `mediavault fetch`.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use bytes::Bytes;
use mediavault_stream_proxy::{ContentInfo, LoadingRequestSink, ProxyError};
use mediavault_upload::CompletionLatch;
use tokio::sync::oneshot;

/// Writes delivered bytes to a file and reports completion once.
pub struct FileSink {
    file: Mutex<File>,
    info: Mutex<Option<ContentInfo>>,
    written: Mutex<u64>,
    write_error: Mutex<Option<std::io::Error>>,
    done: CompletionLatch<Result<(), ProxyError>>,
}

impl FileSink {
    pub fn create(path: &Path) -> std::io::Result<(Self, oneshot::Receiver<Result<(), ProxyError>>)> {
        let file = File::create(path)?;
        let (done, rx) = CompletionLatch::new();
        let sink = Self {
            file: Mutex::new(file),
            info: Mutex::new(None),
            written: Mutex::new(0),
            write_error: Mutex::new(None),
            done,
        };
        Ok((sink, rx))
    }

    pub fn content_info(&self) -> Option<ContentInfo> {
        self.info.lock().unwrap().clone()
    }

    pub fn bytes_written(&self) -> u64 {
        *self.written.lock().unwrap()
    }

    /// First local write failure, if any.
    pub fn take_write_error(&self) -> Option<std::io::Error> {
        self.write_error.lock().unwrap().take()
    }
}

impl LoadingRequestSink for FileSink {
    fn set_content_info(&self, info: ContentInfo) {
        *self.info.lock().unwrap() = Some(info);
    }

    fn respond_with_data(&self, data: Bytes) {
        let mut error = self.write_error.lock().unwrap();
        if error.is_some() {
            return;
        }
        match self.file.lock().unwrap().write_all(&data) {
            Ok(()) => *self.written.lock().unwrap() += data.len() as u64,
            Err(e) => *error = Some(e),
        }
    }

    fn finish_loading(&self) {
        let _ = self.file.lock().unwrap().flush();
        self.done.complete(Ok(()));
    }

    fn finish_with_error(&self, error: ProxyError) {
        self.done.complete(Err(error));
    }
}
