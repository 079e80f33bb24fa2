//! An embedded, ordered LSM-tree key-value storage engine.
//!
//! Reads and writes go through [`Database`]; [`Options`] configures the comparator, merge
//! operator, filter policy, compression, and the Leveled-compaction tunables. Single column
//! family, one `Database` per directory, synchronous foreground flush and compaction — see
//! `DESIGN.md` for the scope this engine does and does not cover relative to a full
//! multi-threaded LSM implementation.

mod compaction;
mod db;
mod error;
mod filename;
mod key;
mod memtable;
mod merge;
mod options;
mod tables;
mod version;
mod version_edit;
mod version_set;
mod write_batch;
mod write_log;

pub use db::{Database, Iter, Snapshot};
pub use error::{Error, Result};
pub use key::ValueType;
pub use merge::{MergeOperator, StringAppendOperator};
pub use options::{CompactionTunables, Options, ReadOptions, WriteOptions};
pub use write_batch::WriteBatch;

pub use lsmkv_sstable::{BytewiseComparator, Comparator, CompressionId, FilterPolicy};
