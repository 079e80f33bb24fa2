//! Helpers for opening a sorted file by number and reading back every entry it holds.
//!
//! Tables are opened fresh for each access rather than kept in a shared cache: a bounded
//! table cache (backing both `Version::Get` and compaction input iteration) is not reproduced
//! here. For the single-column-family, foreground-
//! compaction scope this engine targets, the extra `open` per access is a straightforward,
//! documented simplification rather than a correctness gap (see DESIGN.md).

use std::sync::Arc;

use lsmkv_sstable::{Block, CompressorList, FilterPolicy, Table};

use crate::error::Result;
use crate::filename::{FileName, FileNumber};
use crate::key::{wrap_filter_policy, InternalKeyComparator};

/// Opens the table for `file_number`. `filter_policy` is the user's policy; it is wrapped in
/// [`crate::key::InternalKeyFilterPolicy`] here so filter blocks are always built and probed
/// against user keys, never the full internal key.
pub fn open_table<'a>(
    env: &dyn lsmkv_vfs::Env,
    dir: &std::path::Path,
    comparator: &'a InternalKeyComparator,
    compressors: &'a CompressorList,
    filter_policy: Option<Arc<dyn FilterPolicy>>,
    file_number: u64,
) -> Result<Table<'a>> {
    let path = dir.join(FileName::Table { file_number: FileNumber(file_number) }.file_name());
    let size = env.size_of(&path)?;
    let file = env.open_random_access(&path)?;
    Ok(Table::open(file, size, comparator, compressors, wrap_filter_policy(filter_policy))?)
}

/// Decodes every (internal key, value) entry stored in `table`, in ascending order.
pub fn read_all_entries(
    table: &Table<'_>,
    comparator: &InternalKeyComparator,
) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
    let mut entries = Vec::new();
    for block_data in table.iter_data_blocks()? {
        let block = Block::new(&block_data)?;
        let mut iter = block.iter(comparator);
        iter.seek_to_first()?;
        while iter.valid() {
            let key = iter.key().expect("valid iterator has a key").to_vec();
            let value = iter.value().expect("valid iterator has a value").to_vec();
            entries.push((key, value));
            iter.advance()?;
        }
    }
    Ok(entries)
}
