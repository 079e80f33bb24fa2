use std::borrow::Borrow;
use std::collections::BTreeSet;

use parking_lot::RwLock;

/// A concurrent ordered index over entries of type `T`: the data structure behind the
/// memtable (`lsmkv`'s `memtable` module stores arena-backed internal keys here).
///
/// Readers take a shared lock (any number of readers may proceed concurrently with each
/// other) and writers take an exclusive lock for the duration of a single insert, matching the
/// memtable's "concurrent-read-safe, single-writer-safe" contract without requiring unsafe,
/// hand-rolled lock-free pointer chasing.
#[derive(Debug, Default)]
pub struct OrderedSet<T: Ord + Send> {
    inner: RwLock<BTreeSet<T>>,
}

impl<T: Ord + Send + Clone> OrderedSet<T> {
    #[must_use]
    pub fn new() -> Self {
        Self { inner: RwLock::new(BTreeSet::new()) }
    }

    /// Inserts `entry`. Returns `false` without modifying the set if an equal entry is already
    /// present (duplicate user-visible entries should never occur in practice, because every
    /// entry embeds a unique, monotone sequence number as part of its sort key).
    pub fn insert(&self, entry: T) -> bool {
        self.inner.write().insert(entry)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Returns the first entry whose key is greater than or equal to `target`, under `T`'s `Ord`.
    #[must_use]
    pub fn seek<Q>(&self, target: &Q) -> Option<T>
    where
        T: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        use std::ops::Bound;
        self.inner.read().range((Bound::Included(target), Bound::Unbounded)).next().cloned()
    }

    /// Returns the first entry strictly greater than `target`, under `T`'s `Ord`. Used to
    /// continue a scan past an entry already yielded by [`seek`](Self::seek).
    #[must_use]
    pub fn seek_after<Q>(&self, target: &Q) -> Option<T>
    where
        T: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        use std::ops::Bound;
        self.inner.read().range((Bound::Excluded(target), Bound::Unbounded)).next().cloned()
    }

    /// Snapshots the current contents into a `Vec`, in ascending order.
    ///
    /// A `Vec` snapshot (rather than a live iterator borrowing the lock) is used because the
    /// memtable's callers — the merging iterator and `Get` — need to interleave this index's
    /// entries with several other sources while the writer may still be inserting.
    #[must_use]
    pub fn snapshot(&self) -> Vec<T> {
        self.inner.read().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_iterate_in_order() {
        let set: OrderedSet<i32> = OrderedSet::new();
        for v in [5, 1, 4, 2, 3] {
            assert!(set.insert(v));
        }
        assert!(!set.insert(3));
        assert_eq!(set.snapshot(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn seek_finds_lower_bound() {
        let set: OrderedSet<i32> = OrderedSet::new();
        for v in [10, 20, 30] {
            set.insert(v);
        }
        assert_eq!(set.seek(&15), Some(20));
        assert_eq!(set.seek(&30), Some(30));
        assert_eq!(set.seek(&31), None);
    }
}
