use std::sync::{Arc, RwLock};

/// Compiled form of a pattern list, keyed by the identity of the list it was
/// built from. A config generation that swaps the list for a new `Arc`
/// invalidates the entry; cloning a config keeps it.
pub(crate) struct CompiledCache<S, C> {
    slot: RwLock<Option<(Arc<[S]>, Arc<[C]>)>>,
}

impl<S, C> Default for CompiledCache<S, C> {
    fn default() -> Self {
        Self {
            slot: RwLock::new(None),
        }
    }
}

impl<S, C> CompiledCache<S, C> {
    pub(crate) fn get_or_compile<F>(&self, source: &Arc<[S]>, compile: F) -> Arc<[C]>
    where
        F: Fn(&S) -> C,
    {
        if let Ok(slot) = self.slot.read() {
            if let Some((cached_source, compiled)) = slot.as_ref() {
                if Arc::ptr_eq(cached_source, source) {
                    return Arc::clone(compiled);
                }
            }
        }
        let compiled: Arc<[C]> = source.iter().map(compile).collect();
        // A poisoned slot only costs a recompilation next time.
        if let Ok(mut slot) = self.slot.write() {
            *slot = Some((Arc::clone(source), Arc::clone(&compiled)));
        }
        compiled
    }
}
