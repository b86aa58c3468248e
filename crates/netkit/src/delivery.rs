//! Callback delivery contexts
//!
//! Every request callback runs on a [`DeliveryContext`]. The default is
//! [`MainQueue`], one dedicated thread that runs jobs strictly in
//! submission order, so callers never see two callbacks at once and never
//! see one on a transport worker.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};
use tokio::sync::mpsc;
use tracing::{debug, error};

/// A unit of work submitted to a delivery context
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Serial executor that callbacks are delivered on
pub trait DeliveryContext: Send + Sync {
    /// Queue `job`. Jobs submitted from one thread run in submission order.
    fn deliver(&self, job: Job);

    /// True when called from the context's own thread
    fn is_current(&self) -> bool;
}

/// Single named thread that drains a FIFO of jobs
pub struct MainQueue {
    sender: mpsc::UnboundedSender<Job>,
    thread_id: ThreadId,
}

static SHARED: OnceLock<Arc<MainQueue>> = OnceLock::new();

impl MainQueue {
    pub const THREAD_NAME: &'static str = "netkit-main";

    pub fn new() -> std::io::Result<Self> {
        Self::with_name(Self::THREAD_NAME)
    }

    pub fn with_name(name: &str) -> std::io::Result<Self> {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                while let Some(job) = receiver.blocking_recv() {
                    // A panicking callback must not take the queue down
                    if catch_unwind(AssertUnwindSafe(job)).is_err() {
                        error!("delivery job panicked");
                    }
                }
                debug!("delivery queue closed");
            })?;

        Ok(Self {
            sender,
            thread_id: handle.thread().id(),
        })
    }

    /// Process-wide queue, started on first use
    #[allow(clippy::expect_used)] // No way to recover if the OS refuses one thread at startup
    pub fn shared() -> Arc<Self> {
        Arc::clone(SHARED.get_or_init(|| {
            Arc::new(Self::new().expect("failed to spawn the netkit delivery thread"))
        }))
    }
}

impl DeliveryContext for MainQueue {
    fn deliver(&self, job: Job) {
        if self.sender.send(job).is_err() {
            error!("delivery queue is closed, dropping callback");
        }
    }

    fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }
}

impl std::fmt::Debug for MainQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MainQueue")
            .field("thread_id", &self.thread_id)
            .finish_non_exhaustive()
    }
}


#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;

    #[test]
    fn test_jobs_run_in_order_on_one_thread() {
        let queue = MainQueue::with_name("netkit-test-main").expect("spawn");
        let (tx, rx) = std_mpsc::channel();

        for i in 0..50 {
            let tx = tx.clone();
            queue.deliver(Box::new(move || {
                let name = thread::current().name().map(str::to_string);
                tx.send((i, name)).expect("receiver alive");
            }));
        }

        for expected in 0..50 {
            let (i, name) = rx
                .recv_timeout(Duration::from_secs(5))
                .expect("job should run");
            assert_eq!(i, expected);
            assert_eq!(name.as_deref(), Some("netkit-test-main"));
        }
    }

    #[test]
    fn test_is_current() {
        let queue = Arc::new(MainQueue::with_name("netkit-test-current").expect("spawn"));
        assert!(!queue.is_current());

        let (tx, rx) = std_mpsc::channel();
        let inner = Arc::clone(&queue);
        queue.deliver(Box::new(move || {
            tx.send(inner.is_current()).expect("receiver alive");
        }));
        assert!(rx.recv_timeout(Duration::from_secs(5)).expect("job should run"));
    }

    #[test]
    fn test_panicking_job_does_not_stop_queue() {
        let queue = MainQueue::with_name("netkit-test-panic").expect("spawn");
        let (tx, rx) = std_mpsc::channel();

        queue.deliver(Box::new(|| panic!("boom")));
        queue.deliver(Box::new(move || tx.send(()).expect("receiver alive")));

        rx.recv_timeout(Duration::from_secs(5))
            .expect("second job should still run");
    }

    #[test]
    fn test_shared_is_a_singleton() {
        assert!(Arc::ptr_eq(&MainQueue::shared(), &MainQueue::shared()));
    }
}
