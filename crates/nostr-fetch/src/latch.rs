//! One-shot value/error handoff, awaitable by multiple consumers (C2).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

/// A one-shot cell. `resolve`/`reject` are no-ops after the first call;
/// every [`LatchHandle`] clone observes the same outcome.
pub struct Latch<T> {
    tx: Arc<watch::Sender<Option<Result<T, String>>>>,
    resolved: Arc<AtomicBool>,
}

impl<T> Clone for Latch<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            resolved: self.resolved.clone(),
        }
    }
}

pub struct LatchHandle<T> {
    rx: watch::Receiver<Option<Result<T, String>>>,
}

impl<T> Clone for LatchHandle<T> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
        }
    }
}

impl<T: Clone> Latch<T> {
    pub fn new() -> (Self, LatchHandle<T>) {
        let (tx, rx) = watch::channel(None);
        (
            Self {
                tx: Arc::new(tx),
                resolved: Arc::new(AtomicBool::new(false)),
            },
            LatchHandle { rx },
        )
    }

    pub fn resolve(&self, value: T) {
        self.settle(Ok(value));
    }

    pub fn reject(&self, err: impl Into<String>) {
        self.settle(Err(err.into()));
    }

    fn settle(&self, outcome: Result<T, String>) {
        if self
            .resolved
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let _ = self.tx.send(Some(outcome));
        }
    }
}

impl<T: Clone> LatchHandle<T> {
    /// Suspends until the latch is resolved or rejected.
    pub async fn wait(mut self) -> Result<T, String> {
        loop {
            if let Some(outcome) = self.rx.borrow_and_update().clone() {
                return outcome;
            }
            if self.rx.changed().await.is_err() {
                return Err("latch dropped without a resolution".to_string());
            }
        }
    }
}
