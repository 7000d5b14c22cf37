//! Delivery of host memory-pressure signals to the caches that should react to them.
//!
//! The host side is a [MemoryPressureSource]: whoever builds a cache registers it there and unregisters it when tearing
//! it down.  Nothing is subscribed implicitly and nothing is unsubscribed on drop.
//!
//! [MemoryPressureNotifier] is the in-process implementation.  A platform hook, or the
//! [SystemMemoryMonitor](crate::SystemMemoryMonitor), calls [MemoryPressureNotifier::notify] once per warning.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Something that releases memory when the host asks it to.
pub trait MemoryPressureListener: Send + Sync {
    fn on_memory_pressure(&self);
}

/// Handle returned by [MemoryPressureSource::register], used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub trait MemoryPressureSource {
    /// Start delivering warnings to `listener`.
    fn register(&self, listener: Arc<dyn MemoryPressureListener>) -> SubscriptionId;

    /// Stop delivering warnings for a subscription.  Returns false if it was not registered.
    fn unregister(&self, id: SubscriptionId) -> bool;
}

#[derive(Default)]
pub struct MemoryPressureNotifier {
    listeners: Mutex<Vec<(SubscriptionId, Arc<dyn MemoryPressureListener>)>>,
    next_id: AtomicU64,
}

impl MemoryPressureNotifier {
    pub fn new() -> MemoryPressureNotifier {
        Default::default()
    }

    fn listeners(
        &self,
    ) -> std::sync::MutexGuard<'_, Vec<(SubscriptionId, Arc<dyn MemoryPressureListener>)>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver one warning to every registered listener, returning how many were told.
    ///
    /// Listeners run outside the registry lock, so they may register or unregister from inside the callback.
    pub fn notify(&self) -> usize {
        let snapshot = self
            .listeners()
            .iter()
            .map(|(_, l)| l.clone())
            .collect::<Vec<_>>();
        tracing::debug!(listeners = snapshot.len(), "Delivering memory pressure warning");
        for l in &snapshot {
            l.on_memory_pressure();
        }
        snapshot.len()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners().len()
    }
}

impl MemoryPressureSource for MemoryPressureNotifier {
    fn register(&self, listener: Arc<dyn MemoryPressureListener>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners().push((id, listener));
        id
    }

    fn unregister(&self, id: SubscriptionId) -> bool {
        let mut guard = self.listeners();
        let before = guard.len();
        guard.retain(|(i, _)| *i != id);
        guard.len() != before
    }
}

impl std::fmt::Debug for MemoryPressureNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPressureNotifier")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
