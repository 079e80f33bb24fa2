//! An immutable snapshot of which sorted files make up each level.
//!
//! A precomputed prefix-search structure for narrowing which L+1
//! files a key at level L may touch is not implemented: `Get` and `GetOverlappingInputs` below
//! do a direct binary search per level instead. This trades a constant factor at very high file
//! counts for a much smaller amount of code; see DESIGN.md.

use std::cmp::Ordering;
use std::sync::Arc;

use lsmkv_sstable::Comparator;

use crate::key::{extract_user_key, InternalKeyComparator};
use crate::options::{CompactionTunables, NUM_LEVELS};
use crate::version_edit::FileMetaData;

#[derive(Debug)]
pub struct Version {
    pub files: [Vec<Arc<FileMetaData>>; NUM_LEVELS],
}

impl Version {
    #[must_use]
    pub fn empty() -> Self {
        Self { files: std::array::from_fn(|_| Vec::new()) }
    }

    /// Builds the next version by applying `new_files`/`deleted_files` to `self`'s file lists.
    #[must_use]
    pub fn apply(
        &self,
        comparator: &InternalKeyComparator,
        deleted: &[(usize, u64)],
        added: &[(usize, FileMetaData)],
    ) -> Self {
        let mut files = self.files.clone();
        for (level, number) in deleted {
            files[*level].retain(|f| f.number != *number);
        }
        for (level, meta) in added {
            files[*level].push(Arc::new(meta.clone()));
        }
        for level_files in &mut files {
            level_files.sort_by(|a, b| comparator.user_comparator.cmp(&a.smallest, &b.smallest));
        }
        Self { files }
    }

    /// Whether `user_key` could be contained in a file whose range is `[smallest, largest]`
    /// (both internal keys).
    fn file_may_contain(ucmp: &dyn Comparator, file: &FileMetaData, user_key: &[u8]) -> bool {
        ucmp.cmp(user_key, extract_user_key(&file.smallest)) != Ordering::Less
            && ucmp.cmp(user_key, extract_user_key(&file.largest)) != Ordering::Greater
    }

    /// Returns, in the order they should be probed, the files that might contain `user_key`:
    /// L0 newest-first (by largest_seqno), then at most one file per level `>= 1`.
    #[must_use]
    pub fn files_for_get(
        &self,
        comparator: &InternalKeyComparator,
        user_key: &[u8],
    ) -> Vec<Arc<FileMetaData>> {
        let ucmp = comparator.user_comparator.as_ref();
        let mut candidates = Vec::new();

        let mut l0: Vec<&Arc<FileMetaData>> = self.files[0]
            .iter()
            .filter(|f| Self::file_may_contain(ucmp, f, user_key))
            .collect();
        l0.sort_by(|a, b| b.largest_seqno.cmp(&a.largest_seqno));
        candidates.extend(l0.into_iter().cloned());

        for level_files in &self.files[1..] {
            // Levels >= 1 are disjoint and sorted by `smallest`; `partition_point` finds the
            // first file whose range could still extend to or past `user_key`.
            let idx = level_files
                .partition_point(|f| ucmp.cmp(extract_user_key(&f.largest), user_key) == Ordering::Less);
            if let Some(file) = level_files.get(idx) {
                if Self::file_may_contain(ucmp, file, user_key) {
                    candidates.push(Arc::clone(file));
                }
            }
        }
        candidates
    }

    /// Score driving compaction priority: for L0, file count over the trigger; for L >= 1, total
    /// byte size over the level's budget.
    #[must_use]
    pub fn compaction_score(&self, tunables: &CompactionTunables) -> [f64; NUM_LEVELS] {
        let mut scores = [0.0; NUM_LEVELS];
        scores[0] = self.files[0].len() as f64 / tunables.l0_compaction_trigger as f64;
        let mut level_bytes_budget = tunables.max_bytes_for_level_base;
        for level in 1..NUM_LEVELS {
            let total: u64 = self.files[level].iter().map(|f| f.file_size).sum();
            scores[level] = total as f64 / level_bytes_budget;
            level_bytes_budget *= tunables.max_bytes_multiplier;
        }
        scores
    }

    /// The highest-scoring level, if any level is over budget.
    #[must_use]
    pub fn level_needing_compaction(&self, tunables: &CompactionTunables) -> Option<usize> {
        let scores = self.compaction_score(tunables);
        scores
            .iter()
            .enumerate()
            .filter(|(_, &score)| score >= 1.0)
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(Ordering::Equal))
            .map(|(level, _)| level)
    }

    /// Picks the lowest level (up to `MAX_LEVEL_FOR_MEMTABLE_OUTPUT`) a freshly flushed file
    /// with range `[smallest, largest]` can be pushed to without overlapping any existing file
    /// there or at the level below it.
    #[must_use]
    pub fn pick_level_for_memtable_output(
        &self,
        comparator: &InternalKeyComparator,
        smallest: &[u8],
        largest: &[u8],
    ) -> usize {
        if self.overlaps_level(comparator, 0, smallest, largest) {
            return 0;
        }
        let mut level = 0;
        while level < crate::options::MAX_LEVEL_FOR_MEMTABLE_OUTPUT {
            if self.overlaps_level(comparator, level + 1, smallest, largest) {
                break;
            }
            level += 1;
        }
        level
    }

    fn overlaps_level(
        &self,
        comparator: &InternalKeyComparator,
        level: usize,
        smallest: &[u8],
        largest: &[u8],
    ) -> bool {
        let ucmp = comparator.user_comparator.as_ref();
        self.files[level].iter().any(|f| {
            ucmp.cmp(extract_user_key(smallest), extract_user_key(&f.largest)) != Ordering::Greater
                && ucmp.cmp(extract_user_key(largest), extract_user_key(&f.smallest))
                    != Ordering::Less
        })
    }

    /// Every file at `level` whose user-key range intersects `[begin, end]`.
    #[must_use]
    pub fn get_overlapping_inputs(
        &self,
        comparator: &InternalKeyComparator,
        level: usize,
        begin: &[u8],
        end: &[u8],
    ) -> Vec<Arc<FileMetaData>> {
        let ucmp = comparator.user_comparator.as_ref();
        self.files[level]
            .iter()
            .filter(|f| {
                ucmp.cmp(begin, extract_user_key(&f.largest)) != Ordering::Greater
                    && ucmp.cmp(end, extract_user_key(&f.smallest)) != Ordering::Less
            })
            .cloned()
            .collect()
    }
}
