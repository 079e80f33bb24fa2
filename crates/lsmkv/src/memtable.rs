//! The in-memory mutable table: an arena for accounting, and a concurrent
//! ordered index of entries keyed by internal key.
//!
//! The index ([`lsmkv_skiplist::OrderedSet`]) requires `T: Ord`, so — unlike the table layer,
//! which is generic over any [`Comparator`](lsmkv_sstable::Comparator) — the memtable hardcodes
//! bytewise user-key order directly into [`MemEntry`]'s `Ord` impl (comparing the user-key
//! prefix, then sequence/type descending). A database opened with a non-bytewise comparator
//! would need a different memtable backing; out of scope here (see DESIGN.md).

use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use lsmkv_skiplist::{Arena, OrderedSet};

use crate::key::{
    append_internal_key, extract_user_key, make_internal_key, split_internal_key, ValueType,
    VALUE_TYPE_FOR_SEEK,
};
use crate::merge::MergeOperator;

/// One entry in the memtable index: a full internal key plus its (possibly empty) value.
/// `Ord`/`Eq` only ever consider `internal_key`, so two entries with equal internal keys are
/// indistinguishable to the index — this cannot happen across distinct writes, since every
/// internal key embeds a unique sequence number.
#[derive(Debug, Clone)]
pub struct MemEntry {
    pub internal_key: Vec<u8>,
    pub value: Vec<u8>,
}

impl MemEntry {
    fn user_key(&self) -> &[u8] {
        extract_user_key(&self.internal_key)
    }

    fn seq_and_type(&self) -> (u64, u8) {
        let (_, seq, t) = split_internal_key(&self.internal_key);
        (seq, t)
    }
}

impl PartialEq for MemEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for MemEntry {}

impl PartialOrd for MemEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MemEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.user_key().cmp(other.user_key()) {
            Ordering::Equal => other.seq_and_type().cmp(&self.seq_and_type()),
            order => order,
        }
    }
}

/// The outcome of a memtable lookup.
#[derive(Debug)]
pub enum LookupResult {
    Found(Vec<u8>),
    Deleted,
    /// The user key was not present in this memtable at all.
    NotFound,
    /// A run of `Merge` operands was found with no terminating `Value`/`Deletion` in this
    /// memtable; the caller must continue the search (older memtable, then the file tree) and
    /// fold these operands (oldest to newest, as returned here) on top of whatever is found
    /// there.
    MergeInProgress(Vec<Vec<u8>>),
    /// A run of `Merge` operands terminated by a `Value` or `Deletion` within this same
    /// memtable. `operands` is oldest-to-newest; `base` is the terminating value, or `None` on
    /// a `Deletion`.
    MergeWithBase { operands: Vec<Vec<u8>>, base: Option<Vec<u8>> },
}

#[derive(Debug)]
pub struct MemTable {
    arena: Arena,
    index: OrderedSet<MemEntry>,
    first_sequence: AtomicU64,
    has_first_sequence: std::sync::atomic::AtomicBool,
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MemTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            arena: Arena::new(),
            index: OrderedSet::new(),
            first_sequence: AtomicU64::new(0),
            has_first_sequence: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Inserts `(seq, value_type, user_key, value)`, using an arena-backed entry
    /// layout for accounting purposes (the arena copy is not the copy actually indexed — see
    /// module docs — but its byte count still drives `approximate_memory_usage`).
    pub fn add(&self, seq: u64, value_type: ValueType, user_key: &[u8], value: &[u8]) {
        if !self.has_first_sequence.swap(true, AtomicOrdering::AcqRel) {
            self.first_sequence.store(seq, AtomicOrdering::Release);
        }

        let mut internal_key = Vec::with_capacity(user_key.len() + 8);
        append_internal_key(&mut internal_key, user_key, seq, value_type as u8);
        self.arena.allocate_copy(&internal_key);
        self.arena.allocate_copy(value);

        self.index.insert(MemEntry { internal_key, value: value.to_vec() });
    }

    /// Looks up `user_key` as of `snapshot_seq`.
    #[must_use]
    pub fn get(&self, user_key: &[u8], snapshot_seq: u64) -> LookupResult {
        let seek_key = make_internal_key(user_key, snapshot_seq, VALUE_TYPE_FOR_SEEK);
        let seek_entry = MemEntry { internal_key: seek_key, value: Vec::new() };

        let mut operands = Vec::new();
        let mut cursor = self.index.seek(&seek_entry);
        loop {
            let Some(entry) = cursor else {
                break;
            };
            if entry.user_key() != user_key {
                break;
            }
            let (_, value_type) = entry.seq_and_type();
            match ValueType::from_tag(value_type) {
                Some(ValueType::Value) => {
                    if operands.is_empty() {
                        return LookupResult::Found(entry.value);
                    }
                    operands.reverse();
                    return LookupResult::MergeWithBase { operands, base: Some(entry.value) };
                }
                Some(ValueType::Deletion) => {
                    if operands.is_empty() {
                        return LookupResult::Deleted;
                    }
                    operands.reverse();
                    return LookupResult::MergeWithBase { operands, base: None };
                }
                Some(ValueType::Merge) => {
                    operands.push(entry.value.clone());
                    cursor = self.index.seek_after(&entry);
                }
                None => break,
            }
        }

        if operands.is_empty() {
            LookupResult::NotFound
        } else {
            // Collected newest-first (the index walks a user key in descending-sequence
            // order); callers fold oldest-to-newest.
            operands.reverse();
            LookupResult::MergeInProgress(operands)
        }
    }

    /// Snapshot of every entry in ascending internal-key order, for the merging iterator.
    #[must_use]
    pub fn snapshot(&self) -> Vec<MemEntry> {
        self.index.snapshot()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    #[must_use]
    pub fn first_sequence(&self) -> Option<u64> {
        self.has_first_sequence
            .load(AtomicOrdering::Acquire)
            .then(|| self.first_sequence.load(AtomicOrdering::Acquire))
    }

    /// Arena bytes handed out plus a per-entry index overhead estimate.
    #[must_use]
    pub fn approximate_memory_usage(&self) -> usize {
        self.arena.memory_usage() + self.index.len() * 48
    }

    #[must_use]
    pub fn should_flush(&self, write_buffer_size: usize) -> bool {
        self.approximate_memory_usage() >= write_buffer_size
    }
}

/// Folds a run of merge operands found in the memtable, oldest-to-newest, on top of whatever
/// `base` resolves to further down the read path.
#[must_use]
pub fn fold_merge(
    operator: Option<&dyn MergeOperator>,
    key: &[u8],
    base: Option<&[u8]>,
    operands: &[Vec<u8>],
) -> Option<Vec<u8>> {
    operator.map(|op| op.full_merge(key, base, operands))
}
