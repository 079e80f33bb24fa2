//! A packed sequence of put/delete/merge operations, replayable against a memtable.
//!
//! Wire format: `sequence:fixed64 · count:fixed32 · records*`, where each record is a tag byte
//! (`1` = put, `0` = delete, `2` = merge) followed by a length-prefixed key and, for put/merge, a
//! length-prefixed value. The sequence field is a placeholder written as zero until the batch is
//! about to be applied, at which point the write path patches it in place via [`set_sequence`].
//!
//! [`set_sequence`]: WriteBatch::set_sequence

use lsmkv_sstable::coding::{
    get_fixed32, get_fixed64, get_length_prefixed_slice, put_fixed32, put_fixed64,
    put_length_prefixed_slice,
};

use crate::error::{Error, Result};
use crate::key::ValueType;
use crate::memtable::MemTable;

/// Bytes occupied by the header (`sequence` + `count`) before the first record.
const HEADER_LEN: usize = 8 + 4;

#[derive(Debug, Clone)]
pub struct WriteBatch {
    buffer: Vec<u8>,
    count: u32,
}

impl Default for WriteBatch {
    fn default() -> Self {
        Self::new()
    }
}

impl WriteBatch {
    #[must_use]
    pub fn new() -> Self {
        let mut buffer = Vec::with_capacity(HEADER_LEN);
        put_fixed64(&mut buffer, 0);
        put_fixed32(&mut buffer, 0);
        Self { buffer, count: 0 }
    }

    pub fn put(&mut self, key: &[u8], value: &[u8]) {
        self.buffer.push(ValueType::Value as u8);
        put_length_prefixed_slice(&mut self.buffer, key);
        put_length_prefixed_slice(&mut self.buffer, value);
        self.count += 1;
        self.patch_count();
    }

    pub fn delete(&mut self, key: &[u8]) {
        self.buffer.push(ValueType::Deletion as u8);
        put_length_prefixed_slice(&mut self.buffer, key);
        self.count += 1;
        self.patch_count();
    }

    pub fn merge(&mut self, key: &[u8], operand: &[u8]) {
        self.buffer.push(ValueType::Merge as u8);
        put_length_prefixed_slice(&mut self.buffer, key);
        put_length_prefixed_slice(&mut self.buffer, operand);
        self.count += 1;
        self.patch_count();
    }

    /// Number of put/delete/merge records in this batch — the number of sequence numbers it
    /// will consume.
    #[must_use]
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Exact size of the packed buffer, used for write-queue coalescing size caps.
    #[must_use]
    pub fn byte_size(&self) -> usize {
        self.buffer.len()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        put_fixed64(&mut self.buffer, 0);
        put_fixed32(&mut self.buffer, 0);
        self.count = 0;
    }

    /// Appends every record of `other` onto `self`, for writer-queue leader coalescing.
    pub fn append(&mut self, other: &WriteBatch) {
        self.buffer.extend_from_slice(&other.buffer[HEADER_LEN..]);
        self.count += other.count;
        self.patch_count();
    }

    fn patch_count(&mut self) {
        self.buffer[8..12].copy_from_slice(&self.count.to_le_bytes());
    }

    /// Overwrites the header's sequence field; called once by the write path immediately
    /// before `insert_into` assigns `sequence + i` to the i-th record.
    pub fn set_sequence(&mut self, sequence: u64) {
        self.buffer[0..8].copy_from_slice(&sequence.to_le_bytes());
    }

    #[must_use]
    pub fn sequence(&self) -> u64 {
        u64::from_le_bytes(self.buffer[0..8].try_into().expect("8-byte header"))
    }

    /// Replays every record into `memtable`, assigning `sequence() + i` (0-indexed) to the
    /// i-th record in encounter order.
    pub fn insert_into(&self, memtable: &MemTable) -> Result<()> {
        let base_sequence = self.sequence();
        let mut input = &self.buffer[HEADER_LEN..];
        let mut index = 0_u64;
        while !input.is_empty() {
            let tag = input[0];
            input = &input[1..];
            let value_type = ValueType::from_tag(tag)
                .ok_or_else(|| Error::Corruption(format!("unknown write batch tag {tag}")))?;
            let key = get_length_prefixed_slice(&mut input)
                .map_err(|_| Error::Corruption("truncated write batch key".into()))?;
            let seq = base_sequence + index;
            match value_type {
                ValueType::Deletion => {
                    memtable.add(seq, ValueType::Deletion, key, &[]);
                }
                ValueType::Value | ValueType::Merge => {
                    let value = get_length_prefixed_slice(&mut input)
                        .map_err(|_| Error::Corruption("truncated write batch value".into()))?;
                    memtable.add(seq, value_type, key, value);
                }
            }
            index += 1;
        }
        Ok(())
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Reconstructs a batch from a raw WAL/manifest record, as read back during recovery.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::Corruption("write batch shorter than its header".into()));
        }
        let mut header = &bytes[..HEADER_LEN];
        get_fixed64(&mut header).map_err(|_| Error::Corruption("bad write batch header".into()))?;
        let count = get_fixed32(&mut header)
            .map_err(|_| Error::Corruption("bad write batch header".into()))?;
        Ok(Self { buffer: bytes.to_vec(), count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_count_and_round_trips_bytes() {
        let mut batch = WriteBatch::new();
        batch.put(b"a", b"1");
        batch.delete(b"b");
        batch.merge(b"c", b"op");
        assert_eq!(batch.count(), 3);

        let restored = WriteBatch::from_bytes(batch.as_bytes()).unwrap();
        assert_eq!(restored.count(), 3);
    }

    #[test]
    fn append_combines_batches_for_leader_coalescing() {
        let mut a = WriteBatch::new();
        a.put(b"a", b"1");
        let mut b = WriteBatch::new();
        b.put(b"b", b"2");
        a.append(&b);
        assert_eq!(a.count(), 2);
        let _ = &mut b;
    }
}
