use std::sync::atomic::{AtomicUsize, Ordering};

use bumpalo::Bump;
use parking_lot::Mutex;

/// A bump allocator for memtable entries and iterator scratch space.
///
/// All allocations made through an `Arena` live exactly as long as the `Arena` itself; there is
/// no way to free a single allocation early. This matches the memtable's lifecycle: entries are
/// only ever freed in bulk, by dropping the memtable (and its `Arena`) once the memtable has been
/// flushed and no reader holds it.
///
/// Concurrent callers may allocate at the same time; an internal mutex serializes the bump-pointer
/// update, but the returned byte slices may be read by any number of threads afterwards without
/// further synchronization, since nothing ever mutates allocated bytes once `allocate` returns.
#[derive(Debug, Default)]
pub struct Arena {
    bump: Mutex<Bump>,
    bytes_allocated: AtomicUsize,
}

impl Arena {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates `len` bytes, runs `init` over them, and returns a stable reference to the
    /// initialized bytes.
    ///
    /// # Panics
    /// Panics if `init` does not fully initialize semantics the caller depends on; the bytes
    /// start zeroed, so a partial `init` merely leaves zero bytes rather than causing UB.
    pub fn allocate_with(&self, len: usize, init: impl FnOnce(&mut [u8])) -> &[u8] {
        let bump = self.bump.lock();
        let slice: &mut [u8] = bump.alloc_slice_fill_copy(len, 0_u8);
        init(slice);
        self.bytes_allocated.fetch_add(len, Ordering::Relaxed);

        // SAFETY: `Bump` never moves or frees an individual allocation; the chunk backing
        // `slice` stays alive until the whole `Arena` (and its `Bump`) is dropped, and the
        // borrow checker ties this return value's lifetime to `&self`, so no caller can hold
        // this slice past the `Arena`'s own lifetime. Dropping the `MutexGuard` at the end of
        // this function does not invalidate `slice`'s backing memory.
        unsafe { std::slice::from_raw_parts(slice.as_ptr(), slice.len()) }
    }

    pub fn allocate_copy(&self, data: &[u8]) -> &[u8] {
        self.allocate_with(data.len(), |dst| dst.copy_from_slice(data))
    }

    /// Total bytes handed out by this arena so far. Used by the memtable's `should_flush`
    /// heuristic (see `MemTable::approximate_memory_usage`).
    #[must_use]
    pub fn memory_usage(&self) -> usize {
        self.bytes_allocated.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocations_are_independently_addressable() {
        let arena = Arena::new();
        let a = arena.allocate_copy(b"hello");
        let b = arena.allocate_copy(b"world");
        assert_eq!(a, b"hello");
        assert_eq!(b, b"world");
        assert_eq!(arena.memory_usage(), 10);
    }

    #[test]
    fn many_allocations_survive_chunk_growth() {
        let arena = Arena::new();
        let mut refs = Vec::new();
        for i in 0..10_000_u32 {
            let bytes = i.to_le_bytes();
            refs.push(arena.allocate_copy(&bytes));
        }
        for (i, r) in refs.iter().enumerate() {
            assert_eq!(*r, (i as u32).to_le_bytes());
        }
    }
}
