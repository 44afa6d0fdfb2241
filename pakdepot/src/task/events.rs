//! Task event types and the subscription registry.
//!
//! Subscribers register boxed callbacks before `start()`. Events are
//! delivered under the task lock, in transition order, from whichever
//! execution context performed the transition: download-phase events fire
//! from the network I/O context, extract/finalize events from the worker
//! context. Handlers must therefore be fast, must not block, and must not
//! call back into the task that is notifying them.

use super::error::InstallError;
use super::state::InstallState;

/// Final outcome of an install task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The package was installed successfully.
    Installed,
    /// The user cancelled the task.
    Cancelled,
    /// A phase failed.
    Failed,
}

/// A state machine transition, delivered before any side effect of the
/// new state begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    /// State the task left.
    pub from: InstallState,
    /// State the task entered.
    pub to: InstallState,
}

/// A progress update within a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    /// Phase the progress belongs to.
    pub state: InstallState,
    /// Progress percentage in [0, 100], monotonic within the phase.
    pub percent: u8,
}

/// The one completion event a task ever delivers.
#[derive(Debug, Clone)]
pub struct CompletionEvent {
    /// Success/cancellation/failure indicator.
    pub outcome: InstallOutcome,
    /// The terminal state that was reached.
    pub state: InstallState,
    /// The stored error; present if and only if the outcome is `Failed`.
    pub error: Option<InstallError>,
}

/// Handler for state transitions.
pub type StateChangeHandler = Box<dyn Fn(&StateChange) + Send + Sync>;

/// Handler for progress updates.
pub type ProgressHandler = Box<dyn Fn(&ProgressEvent) + Send + Sync>;

/// Handler for the completion event.
pub type CompletionHandler = Box<dyn Fn(&CompletionEvent) + Send + Sync>;

/// Callback lists guarded by the same lock as the task state.
#[derive(Default)]
pub(crate) struct Subscribers {
    state: Vec<StateChangeHandler>,
    progress: Vec<ProgressHandler>,
    completion: Vec<CompletionHandler>,
}

impl Subscribers {
    pub(crate) fn add_state(&mut self, handler: StateChangeHandler) {
        self.state.push(handler);
    }

    pub(crate) fn add_progress(&mut self, handler: ProgressHandler) {
        self.progress.push(handler);
    }

    pub(crate) fn add_completion(&mut self, handler: CompletionHandler) {
        self.completion.push(handler);
    }

    pub(crate) fn notify_state(&self, event: &StateChange) {
        for handler in &self.state {
            handler(event);
        }
    }

    pub(crate) fn notify_progress(&self, event: &ProgressEvent) {
        for handler in &self.progress {
            handler(event);
        }
    }

    pub(crate) fn notify_completion(&self, event: &CompletionEvent) {
        for handler in &self.completion {
            handler(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_subscribers_fan_out_in_registration_order() {
        let mut subscribers = Subscribers::default();
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        for tag in ["first", "second"] {
            let order = Arc::clone(&order);
            subscribers.add_state(Box::new(move |_| order.lock().push(tag)));
        }

        subscribers.notify_state(&StateChange {
            from: InstallState::None,
            to: InstallState::Downloading,
        });
        assert_eq!(*order.lock(), vec!["first", "second"]);
    }

    #[test]
    fn test_progress_and_completion_notifications() {
        let mut subscribers = Subscribers::default();
        let progress_calls = Arc::new(AtomicUsize::new(0));
        let completion_calls = Arc::new(AtomicUsize::new(0));

        let calls = Arc::clone(&progress_calls);
        subscribers.add_progress(Box::new(move |event| {
            assert_eq!(event.percent, 40);
            calls.fetch_add(1, Ordering::SeqCst);
        }));

        let calls = Arc::clone(&completion_calls);
        subscribers.add_completion(Box::new(move |event| {
            assert_eq!(event.outcome, InstallOutcome::Cancelled);
            assert!(event.error.is_none());
            calls.fetch_add(1, Ordering::SeqCst);
        }));

        subscribers.notify_progress(&ProgressEvent {
            state: InstallState::Downloading,
            percent: 40,
        });
        subscribers.notify_completion(&CompletionEvent {
            outcome: InstallOutcome::Cancelled,
            state: InstallState::Cancelled,
            error: None,
        });

        assert_eq!(progress_calls.load(Ordering::SeqCst), 1);
        assert_eq!(completion_calls.load(Ordering::SeqCst), 1);
    }
}
