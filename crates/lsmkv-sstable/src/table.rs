//! The sorted table (SST) format itself: footer, block handles, and the builder/reader pair
//! that turn a stream of sorted entries into an immutable file and back.

use std::sync::Arc;

use lsmkv_vfs::RandomAccessFile;
use thiserror::Error;

use crate::block::{Block, BlockBuilder, BlockCorruption};
use crate::coding::{
    crc32c, get_fixed64, get_varint64, put_fixed64, put_varint64, BadEncoding,
};
use crate::comparator::Comparator;
use crate::compressors::{CompressionError, CompressionId, CompressorList};
use crate::filter::FilterPolicy;
use crate::filter_block::{FilterBlockBuilder, FilterBlockCorruption, FilterBlockReader};

/// One byte for the compression id, four for the (unmasked) CRC-32C checksum.
pub const BLOCK_TRAILER_LEN: usize = 5;

/// Prefix placed before a filter policy's name as the key of its metaindex block entry.
pub const FILTER_META_PREFIX: &[u8] = b"filter.";

#[derive(Debug, Error)]
pub enum TableError {
    #[error("I/O error reading table: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt table: {0}")]
    Corruption(&'static str),
    #[error("corrupt table block")]
    Block(#[from] BlockCorruption),
    #[error("corrupt table filter block")]
    FilterBlock(#[from] FilterBlockCorruption),
    #[error(transparent)]
    Compression(#[from] CompressionError),
}

impl From<BadEncoding> for TableError {
    fn from(_: BadEncoding) -> Self {
        Self::Corruption("truncated encoding")
    }
}

/// The offset and size (post-compression, excluding the trailer) of a block within a table.
#[derive(Debug, Clone, Copy)]
pub struct BlockHandle {
    pub offset: u64,
    pub size: u64,
}

impl BlockHandle {
    /// Two varint64's, each up to 10 bytes.
    pub const MAX_ENCODED_LENGTH: usize = 20;

    pub fn encode_to(self, out: &mut Vec<u8>) {
        put_varint64(out, self.offset);
        put_varint64(out, self.size);
    }

    pub fn decode_from(input: &mut &[u8]) -> Result<Self, BadEncoding> {
        let offset = get_varint64(input)?;
        let size = get_varint64(input)?;
        Ok(Self { offset, size })
    }
}

/// The fixed-length trailer at the end of every table file, pointing at the metaindex and index
/// blocks.
#[derive(Debug, Clone, Copy)]
pub struct Footer {
    pub metaindex: BlockHandle,
    pub index: BlockHandle,
}

impl Footer {
    pub const ENCODED_LENGTH: usize = 2 * BlockHandle::MAX_ENCODED_LENGTH + 8;
    pub const MAGIC: u64 = 0xdb47_7524_8b80_fb57;

    pub fn encode_to(&self, out: &mut Vec<u8>) {
        let start = out.len();
        self.metaindex.encode_to(out);
        self.index.encode_to(out);
        out.resize(start + Self::ENCODED_LENGTH - 8, 0);
        put_fixed64(out, Self::MAGIC);
    }

    pub fn decode_from(data: &[u8]) -> Result<Self, TableError> {
        if data.len() != Self::ENCODED_LENGTH {
            return Err(TableError::Corruption("footer has the wrong length"));
        }
        let mut magic_slice = &data[Self::ENCODED_LENGTH - 8..];
        if get_fixed64(&mut magic_slice)? != Self::MAGIC {
            return Err(TableError::Corruption("not a table file (bad magic)"));
        }
        let mut input = &data[..Self::ENCODED_LENGTH - 8];
        let metaindex = BlockHandle::decode_from(&mut input)?;
        let index = BlockHandle::decode_from(&mut input)?;
        Ok(Self { metaindex, index })
    }
}

/// Builds one table file from entries added in ascending key order.
pub struct TableBuilder<'a, W> {
    file: W,
    comparator: &'a dyn Comparator,
    compressors: &'a CompressorList,
    compression: CompressionId,
    block_size: usize,

    restart_interval: usize,
    offset: u64,
    num_entries: usize,
    last_key: Vec<u8>,

    data_block: BlockBuilder,
    index_block: BlockBuilder,
    filter_block: Option<FilterBlockBuilder>,
    filter_policy_name: Option<&'static str>,

    pending_index_entry: bool,
    pending_handle: Option<BlockHandle>,
}

impl<'a, W: lsmkv_vfs::WritableFile> TableBuilder<'a, W> {
    #[must_use]
    pub fn new(
        file: W,
        comparator: &'a dyn Comparator,
        compressors: &'a CompressorList,
        compression: CompressionId,
        block_size: usize,
        restart_interval: usize,
        filter_policy: Option<Arc<dyn FilterPolicy>>,
    ) -> Self {
        let filter_policy_name = filter_policy.as_ref().map(|p| p.name());
        Self {
            file,
            comparator,
            compressors,
            compression,
            block_size,
            restart_interval,
            offset: 0,
            num_entries: 0,
            last_key: Vec::new(),
            data_block: BlockBuilder::new(restart_interval),
            index_block: BlockBuilder::new(restart_interval),
            filter_block: filter_policy.map(FilterBlockBuilder::new),
            filter_policy_name,
            pending_index_entry: false,
            pending_handle: None,
        }
    }

    #[must_use]
    pub fn num_entries(&self) -> usize {
        self.num_entries
    }

    #[must_use]
    pub fn file_size(&self) -> u64 {
        self.offset
    }

    /// `key` must compare strictly greater than every previously-added key.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<(), TableError> {
        debug_assert!(self.num_entries == 0 || key > self.last_key.as_slice());

        if self.pending_index_entry {
            debug_assert_eq!(self.data_block.num_entries(), 0);
            let mut separator = Vec::new();
            self.comparator.find_shortest_separator(&self.last_key, key, &mut separator);
            let mut handle_encoding = Vec::new();
            self.pending_handle.expect("pending_index_entry implies a pending handle").encode_to(&mut handle_encoding);
            self.index_block.add(&separator, &handle_encoding);
            self.pending_index_entry = false;
        }

        if let Some(filter_block) = &mut self.filter_block {
            filter_block.add_key(key);
        }

        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.num_entries += 1;
        self.data_block.add(key, value);

        if self.data_block.current_size_estimate() >= self.block_size {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TableError> {
        debug_assert!(!self.pending_index_entry);
        if self.data_block.num_entries() == 0 {
            return Ok(());
        }
        let finished = std::mem::replace(&mut self.data_block, BlockBuilder::new(self.restart_interval));
        let handle = self.write_block(finished.finish())?;
        self.pending_handle = Some(handle);
        self.pending_index_entry = true;
        self.file.flush()?;
        if let Some(filter_block) = &mut self.filter_block {
            filter_block.start_block(self.offset);
        }
        Ok(())
    }

    fn write_block(&mut self, contents: Vec<u8>) -> Result<BlockHandle, TableError> {
        let compressor = self
            .compressors
            .get(self.compression)
            .ok_or(TableError::Corruption("requested compressor is not registered"))?;
        let compressed = compressor.compress(&contents)?;

        let mut digest_input = compressed.clone();
        digest_input.push(self.compression.tag());
        let checksum = crc32c(&digest_input);

        self.file.write_all(&compressed)?;
        self.file.write_all(&[self.compression.tag()])?;
        self.file.write_all(&checksum.to_le_bytes())?;

        let handle = BlockHandle { offset: self.offset, size: compressed.len() as u64 };
        self.offset += compressed.len() as u64 + BLOCK_TRAILER_LEN as u64;
        Ok(handle)
    }

    /// Finishes the table, writing the filter, metaindex, index blocks, and footer.
    pub fn finish(mut self) -> Result<u64, TableError> {
        self.flush()?;

        let filter_handle = if let (Some(filter_block), Some(name)) =
            (self.filter_block.take(), self.filter_policy_name)
        {
            let data = filter_block.finish();
            let handle = self.write_block(data)?;
            Some((name, handle))
        } else {
            None
        };

        let mut metaindex_block = BlockBuilder::new(16);
        if let Some((name, handle)) = filter_handle {
            let mut key = Vec::new();
            key.extend_from_slice(FILTER_META_PREFIX);
            key.extend_from_slice(name.as_bytes());
            let mut encoded = Vec::new();
            handle.encode_to(&mut encoded);
            metaindex_block.add(&key, &encoded);
        }
        let metaindex_handle = self.write_block(metaindex_block.finish())?;

        if self.pending_index_entry {
            let mut successor = Vec::new();
            self.comparator.find_short_successor(&self.last_key, &mut successor);
            let mut handle_encoding = Vec::new();
            self.pending_handle.expect("pending index entry implies a pending handle").encode_to(&mut handle_encoding);
            self.index_block.add(&successor, &handle_encoding);
            self.pending_index_entry = false;
        }
        let index_handle = self.write_block(std::mem::replace(&mut self.index_block, BlockBuilder::new(1)).finish())?;

        let footer = Footer { metaindex: metaindex_handle, index: index_handle };
        let mut footer_bytes = Vec::with_capacity(Footer::ENCODED_LENGTH);
        footer.encode_to(&mut footer_bytes);
        self.file.write_all(&footer_bytes)?;
        self.offset += footer_bytes.len() as u64;

        self.file.flush()?;
        self.file.sync_data()?;
        Ok(self.offset)
    }
}

/// A handle onto an open, immutable table file.
pub struct Table<'a> {
    file: Box<dyn RandomAccessFile>,
    comparator: &'a dyn Comparator,
    compressors: &'a CompressorList,
    index_block: Vec<u8>,
    filter_policy: Option<Arc<dyn FilterPolicy>>,
    filter_block: Option<Vec<u8>>,
}

impl<'a> Table<'a> {
    pub fn open(
        file: Box<dyn RandomAccessFile>,
        file_size: u64,
        comparator: &'a dyn Comparator,
        compressors: &'a CompressorList,
        filter_policy: Option<Arc<dyn FilterPolicy>>,
    ) -> Result<Self, TableError> {
        if file_size < Footer::ENCODED_LENGTH as u64 {
            return Err(TableError::Corruption("file is smaller than a table footer"));
        }
        let mut footer_buf = vec![0_u8; Footer::ENCODED_LENGTH];
        file.read_exact_at(file_size - Footer::ENCODED_LENGTH as u64, &mut footer_buf)?;
        let footer = Footer::decode_from(&footer_buf)?;

        let index_block = read_block(&*file, footer.index, compressors)?;
        let metaindex_block = read_block(&*file, footer.metaindex, compressors)?;

        let filter_block = if let Some(policy) = &filter_policy {
            let mut key = Vec::new();
            key.extend_from_slice(FILTER_META_PREFIX);
            key.extend_from_slice(policy.name().as_bytes());
            find_in_metaindex(&metaindex_block, &key)?
                .map(|handle| read_block(&*file, handle, compressors))
                .transpose()?
        } else {
            None
        };

        Ok(Self { file, comparator, compressors, index_block, filter_policy, filter_block })
    }

    /// Looks up `key` (the exact, fully-qualified key used when the table was built), returning
    /// its value if present.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, TableError> {
        let index = Block::new(&self.index_block)?;
        let mut index_iter = index.iter(self.comparator);
        index_iter.seek(key)?;
        if !index_iter.valid() {
            return Ok(None);
        }
        let mut handle_bytes = index_iter.value().expect("seek found a valid entry");
        let data_handle = BlockHandle::decode_from(&mut handle_bytes)?;

        if let (Some(policy), Some(filter_data)) = (&self.filter_policy, &self.filter_block) {
            let reader = FilterBlockReader::new(Arc::clone(policy), filter_data)?;
            if !reader.key_may_match(data_handle.offset, key) {
                return Ok(None);
            }
        }

        let data = read_block(&*self.file, data_handle, self.compressors)?;
        let block = Block::new(&data)?;
        let mut iter = block.iter(self.comparator);
        iter.seek(key)?;
        if iter.valid() && iter.key() == Some(key) {
            Ok(iter.value().map(<[u8]>::to_vec))
        } else {
            Ok(None)
        }
    }

    /// Finds the first entry whose key is `>=` `key` under this table's comparator, and returns
    /// every entry from there through the end of that one data block, verbatim — not just the
    /// first match. Used by versioned lookups, where the seek target embeds a sequence number
    /// that generally does not equal any stored key's, and a run of versions for the same
    /// logical key (e.g. a chain of merge operands) may need to be walked past the first hit.
    /// Does not cross into the next data block: a run that straddles a block boundary is only
    /// partially returned (see DESIGN.md).
    pub fn seek_block_tail(&self, key: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, TableError> {
        let index = Block::new(&self.index_block)?;
        let mut index_iter = index.iter(self.comparator);
        index_iter.seek(key)?;
        if !index_iter.valid() {
            return Ok(Vec::new());
        }
        let mut handle_bytes = index_iter.value().expect("seek found a valid entry");
        let data_handle = BlockHandle::decode_from(&mut handle_bytes)?;

        if let (Some(policy), Some(filter_data)) = (&self.filter_policy, &self.filter_block) {
            let reader = FilterBlockReader::new(Arc::clone(policy), filter_data)?;
            if !reader.key_may_match(data_handle.offset, key) {
                return Ok(Vec::new());
            }
        }

        let data = read_block(&*self.file, data_handle, self.compressors)?;
        let block = Block::new(&data)?;
        let mut iter = block.iter(self.comparator);
        iter.seek(key)?;
        let mut out = Vec::new();
        while iter.valid() {
            out.push((
                iter.key().expect("valid iterator has a key").to_vec(),
                iter.value().expect("valid iterator has a value").to_vec(),
            ));
            iter.advance()?;
        }
        Ok(out)
    }

    /// Returns the decompressed contents of every data block referenced by the index, in
    /// ascending order; used by full-table scans (compaction inputs, iterators).
    pub fn iter_data_blocks(&self) -> Result<Vec<Vec<u8>>, TableError> {
        let index = Block::new(&self.index_block)?;
        let mut iter = index.iter(self.comparator);
        iter.seek_to_first()?;
        let mut blocks = Vec::new();
        while iter.valid() {
            let mut handle_bytes = iter.value().expect("iterator is valid");
            let handle = BlockHandle::decode_from(&mut handle_bytes)?;
            blocks.push(read_block(&*self.file, handle, self.compressors)?);
            iter.advance()?;
        }
        Ok(blocks)
    }
}

fn read_block(
    file: &dyn RandomAccessFile,
    handle: BlockHandle,
    compressors: &CompressorList,
) -> Result<Vec<u8>, TableError> {
    let mut buf = vec![0_u8; handle.size as usize + BLOCK_TRAILER_LEN];
    file.read_exact_at(handle.offset, &mut buf)?;

    let (compressed, trailer) = buf.split_at(handle.size as usize);
    let compression_id = CompressionId::from_tag(trailer[0])?;
    let stored_checksum = u32::from_le_bytes(trailer[1..5].try_into().unwrap());

    let mut digest_input = compressed.to_vec();
    digest_input.push(trailer[0]);
    if crc32c(&digest_input) != stored_checksum {
        return Err(TableError::Corruption("block checksum mismatch"));
    }

    let compressor = compressors
        .get(compression_id)
        .ok_or(TableError::Corruption("block uses an unregistered compressor"))?;
    Ok(compressor.decompress(compressed)?)
}

fn find_in_metaindex(metaindex: &[u8], key: &[u8]) -> Result<Option<BlockHandle>, TableError> {
    use crate::comparator::BytewiseComparator;
    let block = Block::new(metaindex)?;
    let cmp = BytewiseComparator;
    let mut iter = block.iter(&cmp);
    iter.seek(key)?;
    if iter.valid() && iter.key() == Some(key) {
        let mut handle_bytes = iter.value().expect("iterator is valid");
        Ok(Some(BlockHandle::decode_from(&mut handle_bytes)?))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::BytewiseComparator;
    use crate::filter::BloomFilterPolicy;
    use lsmkv_vfs::{Env, StdFs};
    use tempfile::tempdir;

    #[test]
    fn round_trips_entries_with_bloom_filter() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("000123.sst");
        let env = StdFs;

        let cmp = BytewiseComparator;
        let compressors = CompressorList::default();
        let policy: Arc<dyn FilterPolicy> = Arc::new(BloomFilterPolicy::default());

        let entries: Vec<(&[u8], &[u8])> = vec![
            (b"alpha", b"1"),
            (b"beta", b"2"),
            (b"gamma", b"3"),
            (b"delta", b"4"),
        ];
        let mut sorted = entries.clone();
        sorted.sort_by(|a, b| a.0.cmp(b.0));

        {
            let file = env.open_writable(&path).unwrap();
            let mut builder = TableBuilder::new(
                file,
                &cmp,
                &compressors,
                CompressionId::None,
                64,
                2,
                Some(Arc::clone(&policy)),
            );
            for (k, v) in &sorted {
                builder.add(k, v).unwrap();
            }
            builder.finish().unwrap();
        }

        let size = env.size_of(&path).unwrap();
        let file = env.open_random_access(&path).unwrap();
        let table = Table::open(file, size, &cmp, &compressors, Some(policy)).unwrap();

        for (k, v) in &sorted {
            assert_eq!(table.get(k).unwrap().as_deref(), Some(*v));
        }
        assert_eq!(table.get(b"zzz_missing").unwrap(), None);
    }
}
