//! Handle returned by every `on` / `subscribe` style registration

use std::fmt;

type Cancel = Box<dyn FnOnce() + Send + Sync>;

/// Registration handle for a listener, subscriber or update handler
///
/// Dropping the handle leaves the listener registered. Call
/// [`Subscription::unsubscribe`] to remove it.
#[must_use = "dropping a Subscription keeps the listener registered; call unsubscribe() to remove it"]
pub struct Subscription {
    cancel: Option<Cancel>,
}

impl Subscription {
    pub(crate) fn new<F>(cancel: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A handle that does nothing when unsubscribed
    ///
    /// Returned when a registration was a no-op (e.g. the listener was already present).
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    /// Remove the listener this handle was created for
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
