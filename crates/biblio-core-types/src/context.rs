//! Call context: correlation plus cooperative cancellation
//!
//! Every store and repository call takes a `&Context`. Clones share the
//! same cancellation flag, so a context handed to a worker thread can be
//! cancelled from the caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::correlation::{RequestId, TraceId};

/// Why a context stopped accepting work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// `cancel()` was called on this context or one of its clones
    Cancelled,
    /// The deadline passed
    DeadlineExceeded,
}

/// Context carried through operation boundaries
#[derive(Debug, Clone)]
pub struct Context {
    pub request_id: RequestId,
    pub trace_id: Option<TraceId>,
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Context {
    /// Create a context with a fresh RequestId, no deadline
    pub fn new() -> Self {
        Self {
            request_id: RequestId::new(),
            trace_id: None,
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: None,
        }
    }

    /// Create a context with an existing RequestId
    pub fn with_request_id(request_id: RequestId) -> Self {
        Self {
            request_id,
            ..Self::new()
        }
    }

    /// Add a TraceId to the context
    pub fn with_trace_id(mut self, trace_id: TraceId) -> Self {
        self.trace_id = Some(trace_id);
        self
    }

    /// Derive a context that additionally expires after `timeout`.
    ///
    /// The derived context shares the cancellation flag with `self`; an
    /// earlier existing deadline is kept.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        };
        Self {
            request_id: self.request_id.clone(),
            trace_id: self.trace_id.clone(),
            cancelled: Arc::clone(&self.cancelled),
            deadline: Some(deadline),
        }
    }

    /// Cancel this context and every clone of it
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` when there is no deadline
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Returns why the context stopped, or `None` while it is still live
    pub fn interrupted(&self) -> Option<Interrupt> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Some(Interrupt::Cancelled);
        }
        match self.deadline {
            Some(d) if Instant::now() >= d => Some(Interrupt::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.interrupted().is_some()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
