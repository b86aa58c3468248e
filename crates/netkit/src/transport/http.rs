//! reqwest-backed transport
//!
//! Each resumed task runs as one tokio task on a runtime owned by the
//! transport. Delegate events are emitted from those worker threads.

use dashmap::DashMap;
use parking_lot::Mutex;
use reqwest::Client;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::runtime::{Handle, Runtime};
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use super::{ResponseDisposition, SessionDelegate, TaskId, Transport, ensure_crypto_provider};
use crate::config::NetworkConfig;
use crate::descriptor::{RequestDescriptor, ResponseHead};
use crate::error::{SetupError, TransportError};

enum TaskSlot {
    /// Created but not yet resumed
    Suspended {
        request: RequestDescriptor,
        delegate: Arc<dyn SessionDelegate>,
    },
    /// Worker spawned; sending on `cancel` stops it
    Running { cancel: oneshot::Sender<()> },
}

/// Production [`Transport`] on top of a shared `reqwest::Client`
pub struct ReqwestTransport {
    client: Client,
    runtime: Mutex<Option<Runtime>>,
    handle: Handle,
    next_id: AtomicU64,
    tasks: Arc<DashMap<TaskId, TaskSlot>>,
    invalidated: AtomicBool,
}

impl ReqwestTransport {
    /// Build the HTTP client and worker runtime from `config`
    pub fn new(config: &NetworkConfig) -> Result<Self, SetupError> {
        ensure_crypto_provider();

        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .pool_idle_timeout(Some(config.pool_idle_timeout))
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .gzip(config.enable_compression)
            .brotli(config.enable_compression)
            .deflate(config.enable_compression)
            .tcp_nodelay(true)
            .user_agent(config.user_agent.as_str())
            .build()?;

        Self::with_client(client, config.worker_threads)
    }

    /// Use an existing client; `worker_threads` sizes the runtime that
    /// drives it
    pub fn with_client(client: Client, worker_threads: usize) -> Result<Self, SetupError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(worker_threads.max(1))
            .thread_name("netkit-transport")
            .enable_all()
            .build()?;
        let handle = runtime.handle().clone();

        Ok(Self {
            client,
            runtime: Mutex::new(Some(runtime)),
            handle,
            next_id: AtomicU64::new(0),
            tasks: Arc::new(DashMap::new()),
            invalidated: AtomicBool::new(false),
        })
    }

    /// Tasks created or running and not yet completed
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }
}

impl Transport for ReqwestTransport {
    fn create_task(
        &self,
        request: RequestDescriptor,
        delegate: Arc<dyn SessionDelegate>,
    ) -> Result<TaskId, TransportError> {
        if self.invalidated.load(Ordering::Acquire) {
            return Err(TransportError::Invalidated);
        }

        let id = TaskId::new(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.tasks
            .insert(id, TaskSlot::Suspended { request, delegate });
        trace!(task = %id, "task created");
        Ok(id)
    }

    fn resume(&self, task: TaskId) {
        if self.invalidated.load(Ordering::Acquire) {
            return;
        }
        let Some(mut slot) = self.tasks.get_mut(&task) else {
            debug!(task = %task, "resume of unknown task ignored");
            return;
        };

        let (cancel_tx, cancel_rx) = oneshot::channel();
        match std::mem::replace(&mut *slot, TaskSlot::Running { cancel: cancel_tx }) {
            TaskSlot::Suspended { request, delegate } => {
                drop(slot);
                let client = self.client.clone();
                let tasks = Arc::clone(&self.tasks);
                self.handle.spawn(run_task(task, client, request, delegate, cancel_rx, tasks));
            }
            running @ TaskSlot::Running { .. } => {
                *slot = running;
            }
        }
    }

    fn discard(&self, task: TaskId) {
        let removed = self
            .tasks
            .remove_if(&task, |_, slot| matches!(slot, TaskSlot::Suspended { .. }));
        if removed.is_some() {
            debug!(task = %task, "suspended task discarded");
        }
    }

    fn cancel(&self, task: TaskId) {
        match self.tasks.remove(&task) {
            Some((_, TaskSlot::Running { cancel })) => {
                debug!(task = %task, "cancelling task");
                // The worker may have finished in the meantime
                let _ = cancel.send(());
            }
            Some((_, TaskSlot::Suspended { delegate, .. })) => {
                debug!(task = %task, "cancelling task before it started");
                self.handle.spawn(async move {
                    delegate.did_complete(task, Some(TransportError::Cancelled));
                });
            }
            None => trace!(task = %task, "cancel of unknown task ignored"),
        }
    }

    fn invalidate_and_cancel(&self) {
        if self.invalidated.swap(true, Ordering::AcqRel) {
            return;
        }
        let abandoned = self.tasks.len();
        // Dropping the cancel senders makes every worker exit silently
        self.tasks.clear();
        if let Some(runtime) = self.runtime.lock().take() {
            runtime.shutdown_background();
        }
        debug!(abandoned, "transport invalidated");
    }
}

impl Drop for ReqwestTransport {
    fn drop(&mut self) {
        self.invalidate_and_cancel();
    }
}

async fn run_task(
    id: TaskId,
    client: Client,
    request: RequestDescriptor,
    delegate: Arc<dyn SessionDelegate>,
    mut cancel_rx: oneshot::Receiver<()>,
    tasks: Arc<DashMap<TaskId, TaskSlot>>,
) {
    let outcome = tokio::select! {
        biased;
        signal = &mut cancel_rx => match signal {
            Ok(()) => Some(Err(TransportError::Cancelled)),
            // Sender dropped without a signal: the transport was invalidated
            Err(_) => None,
        },
        result = drive(id, &client, &request, delegate.as_ref()) => Some(result),
    };

    tasks.remove(&id);

    match outcome {
        Some(Ok(())) => {
            trace!(task = %id, "task finished");
            delegate.did_complete(id, None);
        }
        Some(Err(error)) => {
            if !error.is_cancelled() {
                warn!(task = %id, url = %request.url, error = %error, "request failed");
            }
            delegate.did_complete(id, Some(error));
        }
        None => trace!(task = %id, "task abandoned"),
    }
}

async fn drive(
    id: TaskId,
    client: &Client,
    request: &RequestDescriptor,
    delegate: &dyn SessionDelegate,
) -> Result<(), TransportError> {
    let outbound = request.to_reqwest(client)?;
    debug!(task = %id, method = %request.method, url = %request.url, "sending request");

    let mut response = client.execute(outbound).await?;
    debug!(task = %id, status = %response.status(), "response received");

    let (disposition_tx, disposition_rx) = oneshot::channel();
    delegate.did_receive_response(id, ResponseHead::from_reqwest(&response), disposition_tx);
    match disposition_rx.await {
        Ok(ResponseDisposition::Allow) => {}
        Ok(ResponseDisposition::Cancel) | Err(_) => return Err(TransportError::Cancelled),
    }

    while let Some(chunk) = response.chunk().await? {
        trace!(task = %id, bytes = chunk.len(), "chunk received");
        delegate.did_receive_data(id, chunk);
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::descriptor::HttpMethod;
    use crate::router::SessionRouter;

    fn transport() -> ReqwestTransport {
        ReqwestTransport::new(&NetworkConfig::default().without_cache()).expect("transport builds")
    }

    fn descriptor() -> RequestDescriptor {
        RequestDescriptor::parse(HttpMethod::Get, "http://127.0.0.1:9/unused").expect("valid")
    }

    #[test]
    fn test_discard_drops_suspended_task() {
        let transport = transport();
        let router = Arc::new(SessionRouter::new());

        let task = transport
            .create_task(descriptor(), router.clone())
            .expect("task created");
        assert_eq!(transport.task_count(), 1);

        transport.discard(task);
        assert_eq!(transport.task_count(), 0);

        // Nothing left to resume or cancel
        transport.resume(task);
        transport.cancel(task);
        assert_eq!(transport.task_count(), 0);
    }

    #[test]
    fn test_invalidated_transport_refuses_tasks() {
        let transport = transport();
        let router = Arc::new(SessionRouter::new());
        transport
            .create_task(descriptor(), router.clone())
            .expect("task created");

        transport.invalidate_and_cancel();
        assert_eq!(transport.task_count(), 0);
        assert!(matches!(
            transport.create_task(descriptor(), router),
            Err(TransportError::Invalidated)
        ));
    }
}
