//! Shared dispatch plumbing: handler ids, subscriptions and isolated invocation.

use crate::errors::MessagingError;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

/// Error returned by a failing handler
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result returned by every handler
pub type HandlerResult = Result<(), HandlerError>;

/// Identity of a registered handler (closures cannot be compared)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl HandlerId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        HandlerId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler#{}", self.0)
    }
}

/// Handle returned by every `on`/`subscribe` style call.
///
/// Dropping the handle keeps the handler registered; call
/// [`Subscription::unsubscribe`] to remove it.
pub struct Subscription {
    id: HandlerId,
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Build a subscription from its id and the closure that removes it
    pub fn new(id: HandlerId, cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            id,
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// Remove the handler. Safe to call after the owning bus was dropped.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// Outcome of one emit/publish pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    /// Handlers that completed successfully
    pub delivered: usize,

    /// Handlers that returned an error or panicked
    pub failed: usize,
}

impl DispatchReport {
    pub fn total(&self) -> usize {
        self.delivered + self.failed
    }

    pub(crate) fn record(&mut self, ok: bool) {
        if ok {
            self.delivered += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// Run one handler, folding both a returned error and a panic into
/// [`MessagingError::HandlerFailed`]
pub(crate) fn run_handler<F>(handler: F) -> Result<(), MessagingError>
where
    F: FnOnce() -> HandlerResult,
{
    match catch_unwind(AssertUnwindSafe(handler)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(MessagingError::HandlerFailed(err.to_string())),
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(MessagingError::HandlerFailed(format!("panicked: {}", reason)))
        }
    }
}

/// Run one handler, converting errors and panics into a logged `false`
pub(crate) fn invoke_isolated<F>(target: &str, id: HandlerId, handler: F) -> bool
where
    F: FnOnce() -> HandlerResult,
{
    match run_handler(handler) {
        Ok(()) => true,
        Err(err) => {
            warn!(target_name = %target, handler = %id, error = %err, "Handler failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    #[test]
    fn test_handler_ids_are_unique() {
        let a = HandlerId::next();
        let b = HandlerId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn test_invoke_isolated_catches_error_and_panic() {
        let id = HandlerId::next();
        assert!(invoke_isolated("ok", id, || Ok(())));
        assert!(!invoke_isolated("err", id, || Err("boom".into())));
        assert!(!invoke_isolated("panic", id, || panic!("kaboom")));
    }

    #[test]
    fn test_run_handler_reports_handler_failed() {
        assert_eq!(run_handler(|| Ok(())), Ok(()));
        assert_eq!(
            run_handler(|| Err("boom".into())),
            Err(MessagingError::HandlerFailed("boom".to_string()))
        );
        assert_eq!(
            run_handler(|| panic!("kaboom")),
            Err(MessagingError::HandlerFailed("panicked: kaboom".to_string()))
        );
    }

    #[test]
    fn test_subscription_runs_cancel_once() {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();
        let sub = Subscription::new(HandlerId::next(), move || {
            flag.store(true, Ordering::SeqCst);
        });

        sub.unsubscribe();
        assert!(cancelled.load(Ordering::SeqCst));
    }
}
