//! Test utilities shared across crate-level unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::util::subscribe::ListenerRegistration;

/// Counts teardown calls; shared between a registration and the test asserting on it.
#[derive(Clone, Debug, Default)]
pub struct TeardownCounter {
    count: Arc<AtomicUsize>,
}

impl TeardownCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registration(&self) -> ListenerRegistration {
        let count = Arc::clone(&self.count);
        ListenerRegistration::new(move || {
            count.fetch_add(1, Ordering::SeqCst);
        })
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

