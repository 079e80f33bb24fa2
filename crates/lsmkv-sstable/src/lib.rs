//! Sorted table (SST) format: blocks, filters, comparators, and the footer-delimited file
//! layout.

pub mod block;
pub mod coding;
pub mod comparator;
pub mod compressors;
pub mod filter;
pub mod filter_block;
pub mod table;

pub use block::{Block, BlockBuilder, BlockCorruption, BlockIter};
pub use coding::BadEncoding;
pub use comparator::{BytewiseComparator, Comparator};
pub use compressors::{CompressionId, Compressor, CompressorList, NoneCompressor};
pub use filter::{BloomFilterPolicy, FilterPolicy, NoFilterPolicy};
pub use filter_block::{FilterBlockBuilder, FilterBlockReader};
pub use table::{BlockHandle, Footer, Table, TableBuilder, TableError, BLOCK_TRAILER_LEN};

#[cfg(feature = "snappy-compressor")]
pub use compressors::SnappyCompressor;
#[cfg(feature = "zstd-compressor")]
pub use compressors::ZstdCompressor;
