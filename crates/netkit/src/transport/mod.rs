//! Transport abstraction
//!
//! A [`Transport`] executes HTTP exchanges and reports progress for each one
//! as a stream of events addressed to a [`SessionDelegate`]. The transport
//! knows nothing about parsing, caching or callbacks; it only moves bytes.
//!
//! Task lifecycle:
//!
//! 1. [`Transport::create_task`] allocates a [`TaskId`] without starting
//!    any I/O, so the caller can register the id before events can arrive.
//! 2. [`Transport::resume`] starts the exchange.
//! 3. The delegate sees at most one `did_receive_response`, any number of
//!    `did_receive_data`, then exactly one `did_complete`, unless the whole
//!    transport is invalidated first.

use bytes::Bytes;
use std::fmt;
use std::sync::{Arc, Once};
use tokio::sync::oneshot;

use crate::descriptor::{RequestDescriptor, ResponseHead};
use crate::error::TransportError;

mod http;

pub use http::ReqwestTransport;

/// Transport-assigned identifier of one in-flight exchange.
///
/// Unique among live tasks only; a transport may hand out the same value
/// again once the earlier task has completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Whether the transport should keep reading after a response head
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseDisposition {
    Allow,
    Cancel,
}

/// Continuation for a response head. Dropping it unsent counts as
/// [`ResponseDisposition::Cancel`].
pub type DispositionSender = oneshot::Sender<ResponseDisposition>;

/// Receiver of per-task transport events
pub trait SessionDelegate: Send + Sync {
    fn did_receive_response(&self, task: TaskId, head: ResponseHead, disposition: DispositionSender);

    fn did_receive_data(&self, task: TaskId, data: Bytes);

    /// `None` means the exchange finished normally
    fn did_complete(&self, task: TaskId, error: Option<TransportError>);
}

/// Executes HTTP exchanges on behalf of the request layer
pub trait Transport: Send + Sync {
    /// Allocate a suspended task. Fails with [`TransportError::Invalidated`]
    /// after [`invalidate_and_cancel`](Self::invalidate_and_cancel).
    fn create_task(
        &self,
        request: RequestDescriptor,
        delegate: Arc<dyn SessionDelegate>,
    ) -> Result<TaskId, TransportError>;

    /// Start a task created by [`create_task`](Self::create_task). Unknown
    /// ids are ignored.
    fn resume(&self, task: TaskId);

    /// Drop a task that was created but never resumed, without any
    /// delegate event. Running or unknown ids are ignored.
    fn discard(&self, task: TaskId);

    /// Ask a task to stop. Returns immediately; the task's delegate later
    /// sees `did_complete` with [`TransportError::Cancelled`]. Unknown or
    /// finished ids are ignored.
    fn cancel(&self, task: TaskId);

    /// Abandon every task without further delegate events and refuse new
    /// ones.
    fn invalidate_and_cancel(&self);
}

/// Install the ring rustls provider once per process
pub(crate) fn ensure_crypto_provider() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        // Fails only if another provider is already installed, which is fine
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
