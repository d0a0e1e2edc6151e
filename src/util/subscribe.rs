use std::fmt;

pub type Unsubscribe = Box<dyn FnOnce() + Send + 'static>;

/// Handle returned when a listener is attached.
///
/// The teardown closure runs at most once: on [`ListenerRegistration::remove`]
/// or when the handle is dropped, whichever happens first.
pub struct ListenerRegistration {
    unsubscribe: Option<Unsubscribe>,
}

impl ListenerRegistration {
    pub fn new<F>(unsubscribe: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// A registration with nothing to tear down.
    pub fn noop() -> Self {
        Self { unsubscribe: None }
    }

    pub fn remove(mut self) {
        self.detach();
    }

    pub fn is_active(&self) -> bool {
        self.unsubscribe.is_some()
    }

    fn detach(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl Drop for ListenerRegistration {
    fn drop(&mut self) {
        self.detach();
    }
}

impl fmt::Debug for ListenerRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistration")
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TeardownCounter;

    #[test]
    fn remove_runs_teardown_once() {
        let counter = TeardownCounter::new();
        let registration = counter.registration();
        assert!(registration.is_active());
        registration.remove();
        assert_eq!(counter.count(), 1);
    }

    #[test]
    fn drop_runs_teardown() {
        let counter = TeardownCounter::new();
        {
            let _registration = counter.registration();
        }
        assert_eq!(counter.count(), 1);
    }

    #[test]
    fn noop_registration_is_inactive() {
        assert!(!ListenerRegistration::noop().is_active());
    }
}
