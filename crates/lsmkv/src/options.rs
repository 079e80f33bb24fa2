//! Database configuration: comparator, merge operator, filter policy, buffer sizing, and
//! compaction tunables.

use std::sync::Arc;

use lsmkv_sstable::{BytewiseComparator, CompressionId, Comparator, FilterPolicy};

use crate::merge::MergeOperator;

/// Maximum number of levels.
pub const NUM_LEVELS: usize = 7;
/// The highest level a level-0 flush output may be pushed down to directly.
pub const MAX_LEVEL_FOR_MEMTABLE_OUTPUT: usize = 2;

/// Compaction and write-path tunables.
#[derive(Debug, Clone)]
pub struct CompactionTunables {
    pub l0_compaction_trigger: usize,
    pub l0_slowdown_trigger: usize,
    pub l0_stop_trigger: usize,
    pub max_bytes_for_level_base: f64,
    pub max_bytes_multiplier: f64,
    pub expanded_compaction_size_factor: u64,
    pub max_output_file_size: u64,
}

impl Default for CompactionTunables {
    fn default() -> Self {
        Self {
            l0_compaction_trigger: 4,
            l0_slowdown_trigger: 8,
            l0_stop_trigger: 12,
            max_bytes_for_level_base: (1_u64 << 20) as f64 * 10.0,
            max_bytes_multiplier: 10.0,
            expanded_compaction_size_factor: 25,
            max_output_file_size: 2 * (1 << 20),
        }
    }
}

/// Options covering comparator, merge operator, filter policy, buffer sizing, and the
/// compaction tunables above.
///
/// Column families, compaction filters, prefix extractors, and non-Leveled compaction policies
/// are out of scope for this single-column-family engine (see DESIGN.md); the corresponding
/// fields are omitted rather than stubbed, since nothing in `lsmkv` would read them.
#[derive(Clone)]
pub struct Options {
    pub comparator: Arc<dyn Comparator>,
    pub merge_operator: Option<Arc<dyn MergeOperator>>,
    pub filter_policy: Option<Arc<dyn FilterPolicy>>,
    pub compression: CompressionId,

    pub write_buffer_size: usize,
    pub block_size: usize,
    pub block_restart_interval: usize,
    pub max_open_files: usize,

    pub create_if_missing: bool,
    pub error_if_exists: bool,
    pub paranoid_checks: bool,
    pub sync_writes: bool,

    /// Bytes at which the manifest is rolled over to a fresh `MANIFEST-<n>` file.
    pub manifest_size_limit: u64,

    pub compaction: CompactionTunables,
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("comparator", &self.comparator.name())
            .field("merge_operator", &self.merge_operator.is_some())
            .field("filter_policy", &self.filter_policy.as_ref().map(|p| p.name()))
            .field("compression", &self.compression)
            .field("write_buffer_size", &self.write_buffer_size)
            .field("block_size", &self.block_size)
            .field("block_restart_interval", &self.block_restart_interval)
            .field("max_open_files", &self.max_open_files)
            .field("create_if_missing", &self.create_if_missing)
            .field("error_if_exists", &self.error_if_exists)
            .field("paranoid_checks", &self.paranoid_checks)
            .field("sync_writes", &self.sync_writes)
            .field("manifest_size_limit", &self.manifest_size_limit)
            .field("compaction", &self.compaction)
            .finish()
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            comparator: Arc::new(BytewiseComparator),
            merge_operator: None,
            filter_policy: None,
            compression: CompressionId::None,
            write_buffer_size: 4 * (1 << 20),
            block_size: 4 * 1024,
            block_restart_interval: 16,
            max_open_files: 1000,
            create_if_missing: false,
            error_if_exists: false,
            paranoid_checks: false,
            sync_writes: false,
            manifest_size_limit: 1 << 20,
            compaction: CompactionTunables::default(),
        }
    }
}

/// Per-call read options: the snapshot to read at (`None` means "as of the most recent write").
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOptions {
    pub snapshot: Option<crate::db::Snapshot>,
    pub verify_checksums: bool,
}

/// Per-call write options.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    pub sync: bool,
}
