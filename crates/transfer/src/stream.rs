use std::io;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::Stream;
use futures_util::stream;

use crate::source::ByteSource;

/// Callback receiving `(bytes_pulled, total_bytes)` as a body is consumed.
pub type BodyProgress = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Adapts a [`ByteSource`] into an async stream of buffers.
///
/// Each pull reads up to `buf_size` bytes on the blocking pool. The source
/// is opened on the first pull and closed when it is exhausted, fails, or
/// the stream is dropped.
pub fn into_body_stream<S>(
    source: S,
    buf_size: usize,
    progress: Option<BodyProgress>,
) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static
where
    S: ByteSource + 'static,
{
    let total = source.content_length();
    let state = PullState {
        source: Some(source),
        opened: false,
        pulled: 0,
    };

    stream::unfold(state, move |mut state| {
        let progress = progress.clone();
        async move {
            let mut source = state.source.take()?;
            let opened = state.opened;

            let joined = tokio::task::spawn_blocking(move || {
                let result = if opened {
                    Ok(())
                } else {
                    source.open()
                };
                let result = result.and_then(|()| {
                    let mut buf = vec![0u8; buf_size];
                    let n = source.read(&mut buf)?;
                    buf.truncate(n);
                    Ok(buf)
                });
                (source, result)
            })
            .await;

            match joined {
                Err(e) => Some((Err(io::Error::other(e)), state)),
                Ok((mut source, Ok(buf))) if buf.is_empty() => {
                    source.close();
                    None
                }
                Ok((source, Ok(buf))) => {
                    state.pulled += buf.len() as u64;
                    if let Some(cb) = &progress {
                        cb(state.pulled, total);
                    }
                    state.source = Some(source);
                    state.opened = true;
                    Some((Ok(Bytes::from(buf)), state))
                }
                Ok((mut source, Err(e))) => {
                    source.close();
                    Some((Err(e), state))
                }
            }
        }
    })
}

struct PullState<S> {
    source: Option<S>,
    opened: bool,
    pulled: u64,
}
