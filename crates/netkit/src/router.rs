//! Session event router
//!
//! The transport reports events by [`TaskId`]; the router owns the map
//! from live task ids to the request handling them and forwards each event
//! to the right one. The map is guarded by a single mutex that is held only
//! to look up, insert or remove an entry. Each request sits behind its own
//! lock, so handler code (including caller middleware) runs with the map
//! unlocked and may call back into the facade.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, trace, warn};

use crate::descriptor::ResponseHead;
use crate::error::TransportError;
use crate::request::TaskHandler;
use crate::transport::{DispositionSender, ResponseDisposition, SessionDelegate, TaskId};

/// One registered request. Emptied when the request completes.
type Slot = Arc<Mutex<Option<Box<dyn TaskHandler>>>>;

/// Maps live task ids to the requests waiting on them
#[derive(Default)]
pub(crate) struct SessionRouter {
    requests: Mutex<HashMap<TaskId, Slot>>,
    invalidated: AtomicBool,
}

impl SessionRouter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Associate `task` with `handler`.
    ///
    /// Hands `handler` back when the id is already taken or the router has
    /// been invalidated. A taken id means the transport handed out a live
    /// id twice; the existing request keeps it.
    pub(crate) fn register(
        &self,
        task: TaskId,
        handler: Box<dyn TaskHandler>,
    ) -> Result<(), Box<dyn TaskHandler>> {
        if self.invalidated.load(Ordering::Acquire) {
            warn!(task = %task, "registration after invalidation refused");
            return Err(handler);
        }

        let mut requests = self.requests.lock();
        if requests.contains_key(&task) {
            error!(task = %task, "task id registered twice, keeping the existing request");
            return Err(handler);
        }
        requests.insert(task, Arc::new(Mutex::new(Some(handler))));
        trace!(task = %task, pending = requests.len(), "task registered");
        Ok(())
    }

    pub(crate) fn len(&self) -> usize {
        self.requests.lock().len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, task: TaskId) -> bool {
        self.requests.lock().contains_key(&task)
    }

    /// Drop every pending request without completing it and refuse new
    /// registrations
    pub(crate) fn invalidate(&self) {
        self.invalidated.store(true, Ordering::Release);
        let abandoned = std::mem::take(&mut *self.requests.lock());
        if !abandoned.is_empty() {
            trace!(abandoned = abandoned.len(), "router invalidated");
        }
    }

    fn slot(&self, task: TaskId) -> Option<Slot> {
        self.requests.lock().get(&task).map(Arc::clone)
    }
}

impl SessionDelegate for SessionRouter {
    fn did_receive_response(&self, task: TaskId, head: ResponseHead, disposition: DispositionSender) {
        let decision = self.slot(task).and_then(|slot| {
            slot.lock()
                .as_mut()
                .map(|handler| handler.did_receive_response(head))
        });

        let decision = decision.unwrap_or_else(|| {
            warn!(task = %task, "response for unknown task, cancelling");
            ResponseDisposition::Cancel
        });
        // The worker may have given up waiting
        let _ = disposition.send(decision);
    }

    fn did_receive_data(&self, task: TaskId, data: Bytes) {
        let Some(slot) = self.slot(task) else {
            warn!(task = %task, bytes = data.len(), "data for unknown task dropped");
            return;
        };
        if let Some(handler) = slot.lock().as_mut() {
            handler.did_receive_data(data);
        }
    }

    fn did_complete(&self, task: TaskId, error: Option<TransportError>) {
        let slot = self.requests.lock().remove(&task);
        let handler = slot.and_then(|slot| slot.lock().take());
        match handler {
            Some(handler) => handler.did_complete(error),
            None => warn!(task = %task, "completion for unknown task dropped"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use std::sync::Arc;
    use tokio::sync::oneshot;
    use url::Url;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Seen {
        heads: Vec<StatusCode>,
        data: Vec<u8>,
        completed: Option<bool>,
    }

    /// Records events into shared state so the test can inspect them
    struct Recorder {
        seen: Arc<parking_lot::Mutex<Seen>>,
        disposition: ResponseDisposition,
    }

    impl TaskHandler for Recorder {
        fn did_receive_response(&mut self, head: ResponseHead) -> ResponseDisposition {
            self.seen.lock().heads.push(head.status);
            self.disposition
        }

        fn did_receive_data(&mut self, data: Bytes) {
            self.seen.lock().data.extend_from_slice(&data);
        }

        fn did_complete(self: Box<Self>, error: Option<TransportError>) {
            self.seen.lock().completed = Some(error.is_none());
        }
    }

    fn recorder() -> (Box<Recorder>, Arc<parking_lot::Mutex<Seen>>) {
        let seen = Arc::new(parking_lot::Mutex::new(Seen::default()));
        (
            Box::new(Recorder {
                seen: Arc::clone(&seen),
                disposition: ResponseDisposition::Allow,
            }),
            seen,
        )
    }

    fn head(status: StatusCode) -> ResponseHead {
        ResponseHead::new(status, Url::parse("https://x/").expect("valid"))
    }

    fn respond(router: &SessionRouter, task: TaskId, status: StatusCode) -> ResponseDisposition {
        let (tx, mut rx) = oneshot::channel();
        router.did_receive_response(task, head(status), tx);
        rx.try_recv().expect("disposition answered synchronously")
    }

    #[test]
    fn test_events_reach_the_registered_request() {
        let router = SessionRouter::new();
        let (a, seen_a) = recorder();
        let (b, seen_b) = recorder();
        assert!(router.register(TaskId::new(1), a).is_ok());
        assert!(router.register(TaskId::new(2), b).is_ok());

        assert_eq!(respond(&router, TaskId::new(1), StatusCode::OK), ResponseDisposition::Allow);
        respond(&router, TaskId::new(2), StatusCode::NOT_FOUND);
        router.did_receive_data(TaskId::new(2), Bytes::from_static(b"bb"));
        router.did_receive_data(TaskId::new(1), Bytes::from_static(b"a1"));
        router.did_receive_data(TaskId::new(1), Bytes::from_static(b"a2"));
        router.did_complete(TaskId::new(1), None);

        assert_eq!(
            *seen_a.lock(),
            Seen {
                heads: vec![StatusCode::OK],
                data: b"a1a2".to_vec(),
                completed: Some(true),
            }
        );
        assert_eq!(seen_b.lock().data, b"bb".to_vec());
        assert_eq!(seen_b.lock().completed, None);
        assert!(!router.contains(TaskId::new(1)));
        assert!(router.contains(TaskId::new(2)));
        assert_eq!(router.len(), 1);
    }

    #[test]
    fn test_duplicate_registration_keeps_first() {
        let router = SessionRouter::new();
        let (first, seen_first) = recorder();
        let (second, seen_second) = recorder();

        assert!(router.register(TaskId::new(9), first).is_ok());
        let refused = router
            .register(TaskId::new(9), second)
            .err()
            .expect("second registration refused");

        router.did_complete(TaskId::new(9), None);
        assert_eq!(seen_first.lock().completed, Some(true));
        assert_eq!(seen_second.lock().completed, None);

        // The caller still owns the refused request and can fail it
        refused.did_complete(Some(TransportError::Other("duplicate".to_string())));
        assert_eq!(seen_second.lock().completed, Some(false));
        assert!(router.is_empty());
    }

    #[test]
    fn test_unknown_task_events_are_ignored() {
        let router = SessionRouter::new();
        assert_eq!(
            respond(&router, TaskId::new(5), StatusCode::OK),
            ResponseDisposition::Cancel
        );
        router.did_receive_data(TaskId::new(5), Bytes::from_static(b"x"));
        router.did_complete(TaskId::new(5), None);
        assert!(router.is_empty());
    }

    #[test]
    fn test_reused_id_is_not_misattributed() {
        let router = SessionRouter::new();
        let (old, seen_old) = recorder();
        assert!(router.register(TaskId::new(1), old).is_ok());
        router.did_complete(TaskId::new(1), Some(TransportError::Cancelled));

        let (new, seen_new) = recorder();
        assert!(router.register(TaskId::new(1), new).is_ok());
        router.did_receive_data(TaskId::new(1), Bytes::from_static(b"fresh"));
        router.did_complete(TaskId::new(1), None);

        assert_eq!(seen_old.lock().completed, Some(false));
        assert!(seen_old.lock().data.is_empty());
        assert_eq!(seen_new.lock().data, b"fresh".to_vec());
        assert_eq!(seen_new.lock().completed, Some(true));
    }

    #[test]
    fn test_invalidate_abandons_pending_requests() {
        let router = SessionRouter::new();
        let (pending, seen) = recorder();
        assert!(router.register(TaskId::new(3), pending).is_ok());

        router.invalidate();
        assert!(router.is_empty());
        router.did_complete(TaskId::new(3), None);
        assert_eq!(seen.lock().completed, None);

        let (late, _) = recorder();
        assert!(router.register(TaskId::new(4), late).is_err());
    }

    #[test]
    fn test_concurrent_events_for_many_tasks() {
        let router = Arc::new(SessionRouter::new());
        let mut seen = Vec::new();
        for i in 0..32 {
            let (handler, state) = recorder();
            assert!(router.register(TaskId::new(i), handler).is_ok());
            seen.push(state);
        }

        let threads: Vec<_> = (0..32)
            .map(|i| {
                let router = Arc::clone(&router);
                std::thread::spawn(move || {
                    let task = TaskId::new(i);
                    respond(&router, task, StatusCode::OK);
                    for _ in 0..10 {
                        router.did_receive_data(task, Bytes::copy_from_slice(&[i as u8]));
                    }
                    router.did_complete(task, None);
                })
            })
            .collect();
        for thread in threads {
            thread.join().expect("no panic");
        }

        assert!(router.is_empty());
        for (i, state) in seen.iter().enumerate() {
            let state = state.lock();
            assert_eq!(state.data, vec![i as u8; 10]);
            assert_eq!(state.completed, Some(true));
        }
    }

    /// Calls back into the router from inside its own event handlers
    struct Reentrant {
        router: std::sync::Weak<SessionRouter>,
        pending_seen: Arc<parking_lot::Mutex<Vec<usize>>>,
    }

    impl Reentrant {
        fn record(&self) {
            if let Some(router) = self.router.upgrade() {
                self.pending_seen.lock().push(router.len());
            }
        }
    }

    impl TaskHandler for Reentrant {
        fn did_receive_response(&mut self, _head: ResponseHead) -> ResponseDisposition {
            self.record();
            ResponseDisposition::Allow
        }

        fn did_receive_data(&mut self, _data: Bytes) {
            self.record();
        }

        fn did_complete(self: Box<Self>, _error: Option<TransportError>) {
            self.record();
        }
    }

    #[test]
    fn test_handlers_run_with_the_map_unlocked() {
        let router = Arc::new(SessionRouter::new());
        let pending_seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let handler = Box::new(Reentrant {
            router: Arc::downgrade(&router),
            pending_seen: Arc::clone(&pending_seen),
        });
        assert!(router.register(TaskId::new(1), handler).is_ok());

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        let worker = Arc::clone(&router);
        std::thread::spawn(move || {
            respond(&worker, TaskId::new(1), StatusCode::OK);
            worker.did_receive_data(TaskId::new(1), Bytes::from_static(b"x"));
            worker.did_complete(TaskId::new(1), None);
            let _ = done_tx.send(());
        });

        done_rx
            .recv_timeout(std::time::Duration::from_secs(3))
            .expect("events should not block on the router lock");
        assert_eq!(*pending_seen.lock(), vec![1, 1, 0]);
    }
}
