//! Registry of in-flight player requests.
//!
//! The id → request map is only changed under the registry mutex, so
//! registration and removal have one ordering point. Each request has its
//! own lock around its state, so delivering bytes to one request never
//! waits on another.
//!
//! Sink callbacks run with no lock held, so a player may call back into the
//! loader (typically to cancel) from inside a callback. A finish that
//! arrives while a callback is running is parked on the slot and delivered
//! by the caller of that callback once it returns.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::content::ContentInfo;
use crate::error::ProxyError;
use crate::sink::{LoadingRequest, LoadingRequestSink};

pub type RequestId = u64;

/// Progress of one intercepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRequestState {
    pub request_id: RequestId,
    pub requested_offset: u64,
    /// 0 means open-ended.
    pub requested_length: u64,
    pub bytes_delivered: u64,
    pub finished: bool,
}

/// What happened to a delivered chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    /// More bytes are wanted.
    Continue,
    /// A bounded request now has every byte it asked for.
    Satisfied,
    /// The request has finished; nothing more will be delivered.
    Closed,
}

struct Slot {
    state: Mutex<SlotState>,
    sink: Arc<dyn LoadingRequestSink>,
    cancel: CancellationToken,
}

struct SlotState {
    request: ProxyRequestState,
    info_sent: bool,
    /// A data or info callback is running.
    in_callback: bool,
    /// Finish requested while `in_callback` was set.
    parked_finish: Option<Result<(), ProxyError>>,
}

impl Slot {
    /// Runs a data/info callback with no lock held, then delivers a finish
    /// parked meanwhile. Returns `true` if the request finished.
    fn callback(&self, call: impl FnOnce(&dyn LoadingRequestSink)) -> bool {
        call(&*self.sink);
        let parked = {
            let mut state = self.state.lock().unwrap();
            state.in_callback = false;
            state.parked_finish.take()
        };
        match parked {
            Some(result) => {
                notify_finish(&*self.sink, result);
                true
            }
            None => false,
        }
    }
}

fn notify_finish(sink: &dyn LoadingRequestSink, result: Result<(), ProxyError>) {
    match result {
        Ok(()) => sink.finish_loading(),
        Err(e) => sink.finish_with_error(e),
    }
}

#[derive(Default)]
struct Inner {
    next_id: RequestId,
    slots: HashMap<RequestId, Arc<Slot>>,
}

#[derive(Default)]
pub(crate) struct Registry {
    inner: Mutex<Inner>,
}

impl Registry {
    /// Adds a request and returns its id and the token for its network task.
    pub(crate) fn register(&self, request: &LoadingRequest) -> (RequestId, CancellationToken) {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let id = inner.next_id;
        let cancel = CancellationToken::new();
        let slot = Slot {
            state: Mutex::new(SlotState {
                request: ProxyRequestState {
                    request_id: id,
                    requested_offset: request.offset,
                    requested_length: request.length,
                    bytes_delivered: 0,
                    finished: false,
                },
                info_sent: false,
                in_callback: false,
                parked_finish: None,
            }),
            sink: Arc::clone(&request.sink),
            cancel: cancel.clone(),
        };
        inner.slots.insert(id, Arc::new(slot));
        (id, cancel)
    }

    fn slot(&self, id: RequestId) -> Option<Arc<Slot>> {
        self.inner.lock().unwrap().slots.get(&id).cloned()
    }

    /// Passes content information to the sink the first time only.
    pub(crate) fn set_content_info(&self, id: RequestId, info: ContentInfo) -> bool {
        let Some(slot) = self.slot(id) else {
            return false;
        };
        {
            let mut state = slot.state.lock().unwrap();
            if state.request.finished || state.info_sent {
                return false;
            }
            state.info_sent = true;
            state.in_callback = true;
        }
        slot.callback(|sink| sink.set_content_info(info));
        true
    }

    /// Forwards a body chunk, trimmed to what a bounded request still wants.
    ///
    /// Called from the request's single network task only.
    pub(crate) fn deliver(&self, id: RequestId, mut data: Bytes) -> Delivery {
        let Some(slot) = self.slot(id) else {
            return Delivery::Closed;
        };
        let outcome = {
            let mut state = slot.state.lock().unwrap();
            let request = &mut state.request;
            if request.finished {
                return Delivery::Closed;
            }
            if request.requested_length > 0 {
                let remaining = request.requested_length - request.bytes_delivered;
                if data.len() as u64 > remaining {
                    data.truncate(remaining as usize);
                }
            }
            request.bytes_delivered += data.len() as u64;
            let outcome = if request.requested_length > 0
                && request.bytes_delivered >= request.requested_length
            {
                Delivery::Satisfied
            } else {
                Delivery::Continue
            };
            if data.is_empty() {
                return outcome;
            }
            state.in_callback = true;
            outcome
        };

        if slot.callback(|sink| sink.respond_with_data(data)) {
            Delivery::Closed
        } else {
            outcome
        }
    }

    /// Finishes a request exactly once, then drops it from the registry.
    ///
    /// Returns `false` if it had already finished. When a callback is
    /// running for the request, the sink is notified as soon as it returns.
    pub(crate) fn finish(&self, id: RequestId, result: Result<(), ProxyError>) -> bool {
        let Some(slot) = self.slot(id) else {
            return false;
        };
        let notify_now = {
            let mut state = slot.state.lock().unwrap();
            if state.request.finished {
                return false;
            }
            state.request.finished = true;
            if state.in_callback {
                state.parked_finish = Some(result);
                None
            } else {
                Some(result)
            }
        };
        slot.cancel.cancel();
        self.inner.lock().unwrap().slots.remove(&id);
        if let Some(result) = notify_now {
            notify_finish(&*slot.sink, result);
        }
        true
    }

    /// Snapshot of unfinished requests, ordered by id.
    pub(crate) fn active(&self) -> Vec<ProxyRequestState> {
        let slots: Vec<Arc<Slot>> = self.inner.lock().unwrap().slots.values().cloned().collect();
        let mut states: Vec<ProxyRequestState> = slots
            .iter()
            .map(|s| s.state.lock().unwrap().request.clone())
            .filter(|r| !r.finished)
            .collect();
        states.sort_by_key(|r| r.request_id);
        states
    }

    pub(crate) fn ids(&self) -> Vec<RequestId> {
        self.inner.lock().unwrap().slots.keys().copied().collect()
    }
}
