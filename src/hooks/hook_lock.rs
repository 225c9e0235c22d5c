use triomphe::Arc;

/// Append-only list that hands out cheap, stable snapshots.
///
/// Readers clone the inner `Arc` and iterate without holding the lock, so a
/// hook may register another hook while it runs. Writers copy the list if a
/// snapshot is still alive, which keeps every snapshot unchanged.
pub(crate) struct HookLock<T: 'static + Send + Sync>(spin::RwLock<Arc<Vec<T>>>);

impl<T: 'static + Send + Sync + Clone> HookLock<T> {
    #[must_use]
    pub(crate) fn new(items: Vec<T>) -> Self {
        Self(spin::RwLock::new(Arc::new(items)))
    }

    #[inline]
    pub(crate) fn snapshot(&self) -> Arc<Vec<T>> {
        self.0.read().clone()
    }

    pub(crate) fn push(&self, item: T) {
        let mut guard = self.0.write();
        Arc::make_mut(&mut guard).push(item);
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.0.read().len()
    }
}
