//! The data block format: a prefix-compressed stream of entries, periodically "restarted" with
//! a full key, plus a trailing array of restart offsets used for binary search.

use crate::coding::{
    common_prefix_len, get_fixed32, get_varint32, put_fixed32, put_varint32, BadEncoding,
};
use crate::comparator::Comparator;

/// Builds one data or index block. Entries must be added in ascending key order (per the
/// `Comparator` that will eventually read the block back); this is not validated here, since
/// validating it would require the builder to carry a `Comparator` for no other purpose.
#[derive(Debug)]
pub struct BlockBuilder {
    buffer: Vec<u8>,
    restarts: Vec<u32>,
    restart_interval: usize,
    counter: usize,
    last_key: Vec<u8>,
    num_entries: usize,
}

impl BlockBuilder {
    /// # Panics
    /// Panics if `restart_interval == 0`.
    #[must_use]
    pub fn new(restart_interval: usize) -> Self {
        assert!(restart_interval > 0, "restart_interval must be at least 1");
        Self {
            buffer: Vec::new(),
            restarts: vec![0],
            restart_interval,
            counter: 0,
            last_key: Vec::new(),
            num_entries: 0,
        }
    }

    #[must_use]
    pub fn num_entries(&self) -> usize {
        self.num_entries
    }

    #[must_use]
    pub fn current_size_estimate(&self) -> usize {
        self.buffer.len() + self.restarts.len() * 4 + 4
    }

    #[must_use]
    pub fn last_key(&self) -> &[u8] {
        &self.last_key
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.restarts.clear();
        self.restarts.push(0);
        self.counter = 0;
        self.last_key.clear();
        self.num_entries = 0;
    }

    /// # Panics
    /// Panics (in debug builds) if `key` does not come strictly after the last added key.
    pub fn add(&mut self, key: &[u8], value: &[u8]) {
        debug_assert!(
            self.num_entries == 0 || key > self.last_key.as_slice(),
            "keys must be added to a block in strictly ascending order",
        );

        let shared = if self.counter < self.restart_interval {
            common_prefix_len(&self.last_key, key)
        } else {
            self.restarts.push(self.buffer.len() as u32);
            self.counter = 0;
            0
        };
        let non_shared = key.len() - shared;

        put_varint32(&mut self.buffer, shared as u32);
        put_varint32(&mut self.buffer, non_shared as u32);
        put_varint32(&mut self.buffer, value.len() as u32);
        self.buffer.extend_from_slice(&key[shared..]);
        self.buffer.extend_from_slice(value);

        self.last_key.truncate(shared);
        self.last_key.extend_from_slice(&key[shared..]);
        self.counter += 1;
        self.num_entries += 1;
    }

    /// Finishes the block, appending the restart array and its count, and consumes the builder.
    #[must_use]
    pub fn finish(mut self) -> Vec<u8> {
        for &restart in &self.restarts {
            put_fixed32(&mut self.buffer, restart);
        }
        put_fixed32(&mut self.buffer, self.restarts.len() as u32);
        self.buffer
    }
}

/// A read-only view over one finished block's contents (not including the outer compression
/// trailer, which is stripped by the table reader before constructing this).
#[derive(Debug, Clone, Copy)]
pub struct Block<'a> {
    data: &'a [u8],
    restart_array_offset: usize,
    num_restarts: u32,
}

#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
#[error("corrupt block")]
pub struct BlockCorruption;

impl From<BadEncoding> for BlockCorruption {
    fn from(_: BadEncoding) -> Self {
        Self
    }
}

impl<'a> Block<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self, BlockCorruption> {
        if data.len() < 4 {
            return Err(BlockCorruption);
        }
        let num_restarts = u32::from_le_bytes(data[data.len() - 4..].try_into().unwrap());
        let restart_array_offset = data
            .len()
            .checked_sub(4 + 4 * num_restarts as usize)
            .ok_or(BlockCorruption)?;
        Ok(Self { data, restart_array_offset, num_restarts })
    }

    fn restart_point(&self, index: u32) -> Result<u32, BlockCorruption> {
        let offset = self.restart_array_offset + 4 * index as usize;
        let mut slice = self.data.get(offset..offset + 4).ok_or(BlockCorruption)?;
        get_fixed32(&mut slice).map_err(Into::into)
    }

    /// Decodes one entry at `offset`, returning `(shared, non_shared_key, value, next_offset)`.
    fn decode_entry(&self, offset: usize) -> Result<DecodedEntry<'a>, BlockCorruption> {
        let mut input = self.data.get(offset..self.restart_array_offset).ok_or(BlockCorruption)?;
        let shared = get_varint32(&mut input)? as usize;
        let non_shared = get_varint32(&mut input)? as usize;
        let value_len = get_varint32(&mut input)? as usize;
        let key_delta = input.get(..non_shared).ok_or(BlockCorruption)?;
        let value = input.get(non_shared..non_shared + value_len).ok_or(BlockCorruption)?;
        let next_offset = self.restart_array_offset - input.len() + non_shared + value_len;
        Ok(DecodedEntry { shared, key_delta, value, next_offset })
    }

    /// An iterator starting before the first entry.
    #[must_use]
    pub fn iter<'c, C: Comparator + ?Sized>(&self, cmp: &'c C) -> BlockIter<'a, 'c, C> {
        BlockIter { block: *self, cmp, state: IterState::Invalid, key: Vec::new() }
    }
}

struct DecodedEntry<'a> {
    shared: usize,
    key_delta: &'a [u8],
    value: &'a [u8],
    next_offset: usize,
}

#[derive(Debug, Clone, Copy)]
enum IterState {
    Invalid,
    Valid { offset: usize, next_offset: usize },
}

/// Iterates over a [`Block`]'s entries. `Seek` binary-searches the restart array; `Next`/`Prev`
/// walk linearly from there.
pub struct BlockIter<'a, 'c, C> {
    block: Block<'a>,
    cmp: &'c C,
    state: IterState,
    key: Vec<u8>,
}

impl<'a, 'c, C: Comparator + ?Sized> BlockIter<'a, 'c, C> {
    #[must_use]
    pub fn valid(&self) -> bool {
        matches!(self.state, IterState::Valid { .. })
    }

    #[must_use]
    pub fn key(&self) -> Option<&[u8]> {
        self.valid().then_some(self.key.as_slice())
    }

    #[must_use]
    pub fn value(&self) -> Option<&'a [u8]> {
        let IterState::Valid { offset, .. } = self.state else { return None };
        self.block.decode_entry(offset).ok().map(|e| e.value)
    }

    pub fn seek_to_first(&mut self) -> Result<(), BlockCorruption> {
        self.seek_to_restart(0)?;
        self.scan_forward_while(|_| false)
    }

    pub fn seek_to_last(&mut self) -> Result<(), BlockCorruption> {
        if self.block.num_restarts == 0 {
            self.state = IterState::Invalid;
            return Ok(());
        }
        self.seek_to_restart(self.block.num_restarts - 1)?;
        // Walk to the last entry before the restart array.
        loop {
            let IterState::Valid { next_offset, .. } = self.state else { break };
            if next_offset >= self.block.restart_array_offset {
                break;
            }
            self.step_to(next_offset)?;
        }
        Ok(())
    }

    /// Positions the iterator at the first entry whose key is `>= target`.
    pub fn seek(&mut self, target: &[u8]) -> Result<(), BlockCorruption> {
        let (mut lo, mut hi) = (0_u32, self.block.num_restarts.saturating_sub(1));
        while lo < hi {
            let mid = lo + (hi - lo + 1) / 2;
            let offset = self.block.restart_point(mid)?;
            let entry = self.block.decode_entry(offset as usize)?;
            // Restart entries always have `shared == 0`, so `key_delta` is the full key.
            if self.cmp.cmp(entry.key_delta, target) == std::cmp::Ordering::Less {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }
        self.seek_to_restart(lo)?;
        self.scan_forward_while(|key| self.cmp.cmp(key, target) == std::cmp::Ordering::Less)
    }

    fn seek_to_restart(&mut self, index: u32) -> Result<(), BlockCorruption> {
        let offset = self.block.restart_point(index)?;
        self.key.clear();
        self.state = IterState::Invalid;
        self.step_to(offset as usize)
    }

    fn scan_forward_while(&mut self, mut pred: impl FnMut(&[u8]) -> bool) -> Result<(), BlockCorruption> {
        loop {
            let IterState::Valid { next_offset, .. } = self.state else { return Ok(()) };
            if !pred(&self.key) {
                return Ok(());
            }
            if next_offset >= self.block.restart_array_offset {
                self.state = IterState::Invalid;
                return Ok(());
            }
            self.step_to(next_offset)?;
        }
    }

    fn step_to(&mut self, offset: usize) -> Result<(), BlockCorruption> {
        if offset >= self.block.restart_array_offset {
            self.state = IterState::Invalid;
            return Ok(());
        }
        let entry = self.block.decode_entry(offset)?;
        if entry.shared > self.key.len() {
            return Err(BlockCorruption);
        }
        self.key.truncate(entry.shared);
        self.key.extend_from_slice(entry.key_delta);
        self.state = IterState::Valid { offset, next_offset: entry.next_offset };
        Ok(())
    }

    pub fn advance(&mut self) -> Result<(), BlockCorruption> {
        let IterState::Valid { next_offset, .. } = self.state else { return Ok(()) };
        self.step_to(next_offset)
    }

    /// Moves to the entry immediately preceding the current one: scans backward to the
    /// preceding restart point, then forward until the next entry's end equals the current
    /// offset.
    pub fn prev(&mut self) -> Result<(), BlockCorruption> {
        let IterState::Valid { offset: current_offset, .. } = self.state else { return Ok(()) };

        // Binary search for the restart point at or before `current_offset`.
        let (mut lo, mut hi) = (0_u32, self.block.num_restarts.saturating_sub(1));
        while lo < hi {
            let mid = lo + (hi - lo + 1) / 2;
            if self.block.restart_point(mid)? as usize <= current_offset {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }
        self.seek_to_restart(lo)?;

        loop {
            let IterState::Valid { next_offset, .. } = self.state else { return Err(BlockCorruption) };
            if next_offset == current_offset {
                return Ok(());
            }
            if next_offset > current_offset {
                return Err(BlockCorruption);
            }
            self.step_to(next_offset)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::BytewiseComparator;

    fn build(entries: &[(&[u8], &[u8])], restart_interval: usize) -> Vec<u8> {
        let mut builder = BlockBuilder::new(restart_interval);
        for (k, v) in entries {
            builder.add(k, v);
        }
        builder.finish()
    }

    #[test]
    fn iterates_entries_in_order() {
        let entries: &[(&[u8], &[u8])] =
            &[(b"alpha", b"1"), (b"alphabet", b"2"), (b"beta", b"3"), (b"gamma", b"4")];
        let data = build(entries, 2);
        let block = Block::new(&data).unwrap();
        let cmp = BytewiseComparator;
        let mut iter = block.iter(&cmp);
        iter.seek_to_first().unwrap();
        for (k, v) in entries {
            assert_eq!(iter.key(), Some(*k));
            assert_eq!(iter.value(), Some(*v));
            iter.advance().unwrap();
        }
        assert!(!iter.valid());
    }

    #[test]
    fn seek_lands_on_first_ge() {
        let entries: &[(&[u8], &[u8])] =
            &[(b"alpha", b"1"), (b"beta", b"2"), (b"delta", b"3"), (b"gamma", b"4")];
        let data = build(entries, 2);
        let block = Block::new(&data).unwrap();
        let cmp = BytewiseComparator;
        let mut iter = block.iter(&cmp);

        iter.seek(b"charlie").unwrap();
        assert_eq!(iter.key(), Some(&b"delta"[..]));

        iter.seek(b"gamma").unwrap();
        assert_eq!(iter.key(), Some(&b"gamma"[..]));

        iter.seek(b"zulu").unwrap();
        assert!(!iter.valid());
    }

    #[test]
    fn prev_walks_backward() {
        let entries: &[(&[u8], &[u8])] =
            &[(b"a", b"1"), (b"b", b"2"), (b"c", b"3"), (b"d", b"4"), (b"e", b"5")];
        let data = build(entries, 2);
        let block = Block::new(&data).unwrap();
        let cmp = BytewiseComparator;
        let mut iter = block.iter(&cmp);
        iter.seek_to_last().unwrap();
        let mut seen = Vec::new();
        while iter.valid() {
            seen.push(iter.key().unwrap().to_vec());
            iter.prev().unwrap();
        }
        seen.reverse();
        assert_eq!(seen, entries.iter().map(|(k, _)| k.to_vec()).collect::<Vec<_>>());
    }
}
