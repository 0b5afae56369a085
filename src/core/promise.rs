//! Settable-once promise.
//!
//! A [`Promise`] is written exactly once and read many times. Readers can
//! either check without blocking ([`Promise::get`], [`Promise::is_set`]) or,
//! with the `tokio-runtime` feature, wait for the value ([`Promise::wait`]).
//!
//! The poller uses one promise per stage to hold the task registration handle
//! supplied by the task execution service, which may arrive after polling has
//! started.

use std::fmt;
use std::sync::OnceLock;

/// A value that is set once and then shared by all readers.
pub struct Promise<T> {
    value: OnceLock<T>,
    #[cfg(feature = "tokio-runtime")]
    notify: tokio::sync::Notify,
}

impl<T> Promise<T> {
    /// Create an unset promise.
    pub fn new() -> Self {
        Self {
            value: OnceLock::new(),
            #[cfg(feature = "tokio-runtime")]
            notify: tokio::sync::Notify::new(),
        }
    }

    /// Set the value. Returns the rejected value if the promise was already set.
    pub fn set(&self, value: T) -> Result<(), T> {
        self.value.set(value)?;
        #[cfg(feature = "tokio-runtime")]
        self.notify.notify_waiters();
        Ok(())
    }

    /// Whether a value has been set.
    pub fn is_set(&self) -> bool {
        self.value.get().is_some()
    }

    /// The value, if set. Never blocks.
    pub fn get(&self) -> Option<&T> {
        self.value.get()
    }

    /// Wait until the value is set.
    #[cfg(feature = "tokio-runtime")]
    pub async fn wait(&self) -> &T {
        loop {
            let notified = self.notify.notified();
            if let Some(value) = self.value.get() {
                return value;
            }
            notified.await;
        }
    }
}

impl<T> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("is_set", &self.is_set())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_promise_reads_none() {
        let p: Promise<u32> = Promise::new();
        assert!(!p.is_set());
        assert!(p.get().is_none());
    }

    #[test]
    fn second_set_is_rejected() {
        let p = Promise::new();
        assert!(p.set(1).is_ok());
        assert_eq!(p.set(2), Err(2));
        assert_eq!(p.get(), Some(&1));
    }

    #[cfg(feature = "tokio-runtime")]
    #[tokio::test]
    async fn wait_returns_once_set() {
        let p = std::sync::Arc::new(Promise::new());
        let setter = std::sync::Arc::clone(&p);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            let _ = setter.set("ready");
        });
        assert_eq!(*p.wait().await, "ready");
        handle.await.unwrap();
    }
}
