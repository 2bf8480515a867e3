//! Shared handle to the current catalog index.
//!
//! Readers clone an `Arc<Index>` snapshot and score against it without
//! holding any lock. A rebuild constructs a whole new `Index` elsewhere and
//! swaps it in under the write lock, so a reader sees either the old index
//! or the new one, never a partially built one.

use std::sync::Arc;

use parking_lot::{RwLock, RwLockUpgradableReadGuard};

use crate::index::Index;

#[derive(Default)]
pub struct IndexHandle {
    /// `None` until an index has been loaded or built in this process.
    current: RwLock<Option<Arc<Index>>>,
}

impl IndexHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current index, if one is resident.
    pub fn snapshot(&self) -> Option<Arc<Index>> {
        self.current.read().clone()
    }

    pub fn is_resident(&self) -> bool {
        self.current.read().is_some()
    }

    /// Replace the resident index wholesale.
    pub fn publish(&self, index: Index) -> Arc<Index> {
        let index = Arc::new(index);
        *self.current.write() = Some(index.clone());
        index
    }

    /// Return the resident index, or run `init` once to obtain one.
    ///
    /// Concurrent callers do not run `init` twice: the upgradable lock admits
    /// plain readers but only one initializer. If `init` yields `None` nothing
    /// is stored and `None` is returned.
    pub fn get_or_init_with<F>(&self, init: F) -> Option<Arc<Index>>
    where
        F: FnOnce() -> Option<Index>,
    {
        if let Some(index) = self.snapshot() {
            return Some(index);
        }

        let guard = self.current.upgradable_read();
        if let Some(index) = guard.as_ref() {
            return Some(index.clone());
        }

        let index = Arc::new(init()?);
        let mut guard = RwLockUpgradableReadGuard::upgrade(guard);
        *guard = Some(index.clone());
        Some(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::DescriptorSet;
    use crate::index::ClassEntry;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn index_with(ids: &[&str]) -> Index {
        Index::from_entries(ids.iter().map(|id| {
            let set = DescriptorSet::from_rows(1, 32, vec![0u8; 32]).unwrap();
            ClassEntry::new(id.to_string(), vec![set], vec![format!("{}/0.png", id)]).unwrap()
        }))
    }

    #[test]
    fn test_publish_replaces_wholesale() {
        let handle = IndexHandle::new();
        assert!(!handle.is_resident());

        handle.publish(index_with(&["A", "B"]));
        let before = handle.snapshot().unwrap();

        handle.publish(index_with(&["C"]));
        let after = handle.snapshot().unwrap();

        // earlier snapshots stay valid and unchanged
        assert_eq!(before.len(), 2);
        assert_eq!(after.len(), 1);
        assert!(after.get("C").is_some());
    }

    #[test]
    fn test_init_runs_once_and_none_is_not_stored() {
        let handle = IndexHandle::new();
        assert!(handle.get_or_init_with(|| None).is_none());
        assert!(!handle.is_resident());

        let calls = AtomicUsize::new(0);
        let a = handle.get_or_init_with(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            Some(index_with(&["A"]))
        });
        let b = handle.get_or_init_with(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            Some(index_with(&["B"]))
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
    }

    #[test]
    fn test_readers_only_see_complete_indexes() {
        let handle = Arc::new(IndexHandle::new());
        handle.publish(index_with(&["A", "B"]));

        let writer = {
            let handle = handle.clone();
            thread::spawn(move || {
                for i in 0..200 {
                    if i % 2 == 0 {
                        handle.publish(index_with(&["C", "D", "E"]));
                    } else {
                        handle.publish(index_with(&["A", "B"]));
                    }
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let handle = handle.clone();
                thread::spawn(move || {
                    for _ in 0..500 {
                        let snap = handle.snapshot().unwrap();
                        assert!(snap.len() == 2 || snap.len() == 3);
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
    }
}
