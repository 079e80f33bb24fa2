//! The filter block: one [`FilterPolicy`] filter per 2 KiB of data-block bytes, so that a
//! `Get` touching a single data block only has to test that block's slice of the filter.

use std::sync::Arc;

use crate::coding::{get_fixed32, put_fixed32, BadEncoding};
use crate::filter::FilterPolicy;

/// `2^BASE_LG` bytes of data blocks share one filter.
const FILTER_BASE_LG: u8 = 11;

/// Accumulates keys across data blocks and periodically flushes a filter covering them.
pub struct FilterBlockBuilder {
    policy: Arc<dyn FilterPolicy>,
    keys: Vec<u8>,
    key_offsets: Vec<usize>,
    result: Vec<u8>,
    filter_offsets: Vec<u32>,
}

impl FilterBlockBuilder {
    #[must_use]
    pub fn new(policy: Arc<dyn FilterPolicy>) -> Self {
        Self { policy, keys: Vec::new(), key_offsets: Vec::new(), result: Vec::new(), filter_offsets: Vec::new() }
    }

    /// Must be called with the key about to be written to the current data block, before that
    /// block is finished.
    pub fn add_key(&mut self, key: &[u8]) {
        self.key_offsets.push(self.keys.len());
        self.keys.extend_from_slice(key);
    }

    /// Notifies the builder of the data block boundary at `block_offset`, flushing filters for
    /// every `2^FILTER_BASE_LG`-sized window up to and including it.
    pub fn start_block(&mut self, block_offset: u64) {
        let filter_index = block_offset >> FILTER_BASE_LG;
        while (filter_index as usize) > self.filter_offsets.len() {
            self.generate_filter();
        }
    }

    fn generate_filter(&mut self) {
        self.filter_offsets.push(self.result.len() as u32);
        if self.key_offsets.is_empty() {
            return;
        }
        self.key_offsets.push(self.keys.len());
        let keys: Vec<&[u8]> = self
            .key_offsets
            .windows(2)
            .map(|w| &self.keys[w[0]..w[1]])
            .collect();
        let filter = self.policy.create_filter(&keys);
        self.result.extend_from_slice(&filter);
        self.keys.clear();
        self.key_offsets.clear();
    }

    /// Flushes any pending filter and serializes the complete filter block.
    #[must_use]
    pub fn finish(mut self) -> Vec<u8> {
        if !self.key_offsets.is_empty() {
            self.generate_filter();
        }
        let array_offset = self.result.len() as u32;
        for &offset in &self.filter_offsets {
            put_fixed32(&mut self.result, offset);
        }
        put_fixed32(&mut self.result, array_offset);
        self.result.push(FILTER_BASE_LG);
        self.result
    }
}

#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
#[error("corrupt filter block")]
pub struct FilterBlockCorruption;

impl From<BadEncoding> for FilterBlockCorruption {
    fn from(_: BadEncoding) -> Self {
        Self
    }
}

/// A read-only view over a finished filter block.
pub struct FilterBlockReader<'a> {
    policy: Arc<dyn FilterPolicy>,
    data: &'a [u8],
    offsets_start: usize,
    num_filters: usize,
    base_lg: u8,
}

impl<'a> FilterBlockReader<'a> {
    pub fn new(policy: Arc<dyn FilterPolicy>, data: &'a [u8]) -> Result<Self, FilterBlockCorruption> {
        if data.len() < 5 {
            return Err(FilterBlockCorruption);
        }
        let base_lg = data[data.len() - 1];
        let mut tail = &data[data.len() - 5..data.len() - 1];
        let offsets_start = get_fixed32(&mut tail)? as usize;
        if offsets_start > data.len() - 5 {
            return Err(FilterBlockCorruption);
        }
        let num_filters = (data.len() - 5 - offsets_start) / 4;
        Ok(Self { policy, data, offsets_start, num_filters, base_lg })
    }

    /// Tests whether `key` may be present in the data block starting at `block_offset`.
    #[must_use]
    pub fn key_may_match(&self, block_offset: u64, key: &[u8]) -> bool {
        let index = (block_offset >> self.base_lg) as usize;
        if index >= self.num_filters {
            return true;
        }
        let Ok(start) = self.filter_offset(index) else { return true };
        let Ok(limit) = self.filter_offset(index + 1) else { return true };
        let Some(filter) = self.data.get(start..limit) else { return true };
        if filter.is_empty() {
            return true;
        }
        self.policy.key_may_match(key, filter)
    }

    fn filter_offset(&self, index: usize) -> Result<usize, FilterBlockCorruption> {
        if index == self.num_filters {
            return Ok(self.offsets_start);
        }
        let at = self.offsets_start + 4 * index;
        let mut slice = self.data.get(at..at + 4).ok_or(FilterBlockCorruption)?;
        Ok(get_fixed32(&mut slice)? as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::BloomFilterPolicy;

    #[test]
    fn finds_keys_in_their_own_block_window() {
        let policy: Arc<dyn FilterPolicy> = Arc::new(BloomFilterPolicy::default());
        let mut builder = FilterBlockBuilder::new(Arc::clone(&policy));

        builder.start_block(0);
        builder.add_key(b"block0-key-a");
        builder.add_key(b"block0-key-b");

        builder.start_block(1 << FILTER_BASE_LG);
        builder.add_key(b"block1-key-a");

        let data = builder.finish();
        let reader = FilterBlockReader::new(policy, &data).unwrap();

        assert!(reader.key_may_match(0, b"block0-key-a"));
        assert!(reader.key_may_match(1 << FILTER_BASE_LG, b"block1-key-a"));
    }

    #[test]
    fn out_of_range_block_offset_defaults_to_maybe() {
        let policy: Arc<dyn FilterPolicy> = Arc::new(BloomFilterPolicy::default());
        let mut builder = FilterBlockBuilder::new(Arc::clone(&policy));
        builder.start_block(0);
        builder.add_key(b"only-key");
        let data = builder.finish();
        let reader = FilterBlockReader::new(policy, &data).unwrap();
        assert!(reader.key_may_match(1_000_000, b"anything"));
    }
}
