//! Picks compaction inputs and runs them into new sorted files.
//!
//! Only the Leveled policy is implemented; Universal, FIFO, and Manual compaction are out of
//! scope for this engine (see DESIGN.md). The runner also does not track "grandparent" (output
//! level + 2) overlap to bound output file size — outputs are only
//! split on `max_output_file_size`. Inputs are fully materialized into memory before being
//! merged rather than streamed through a lazy k-way merging iterator; acceptable for the file
//! sizes this engine's test and scenario scope produces, not for many-gigabyte compactions.

use std::sync::Arc;

use lsmkv_sstable::{Comparator, CompressorList, FilterPolicy, TableBuilder};

use crate::error::Result;
use crate::key::{extract_user_key, split_internal_key, wrap_filter_policy, InternalKeyComparator, ValueType};
use crate::memtable::fold_merge;
use crate::merge::MergeOperator;
use crate::options::{CompactionTunables, Options};
use crate::tables::{open_table, read_all_entries};
use crate::version::Version;
use crate::version_edit::{FileMetaData, VersionEdit};

pub struct CompactionJob {
    pub level: usize,
    pub output_level: usize,
    pub inputs_at_level: Vec<u64>,
    pub inputs_at_output_level: Vec<u64>,
}

/// Picks the next Leveled compaction to run, if any level is over its budget.
#[must_use]
pub fn pick_compaction(version: &Version, comparator: &InternalKeyComparator, tunables: &CompactionTunables) -> Option<CompactionJob> {
    let level = version.level_needing_compaction(tunables)?;
    let output_level = level + 1;

    if level == 0 {
        let inputs_at_level: Vec<u64> = version.files[0].iter().map(|f| f.number).collect();
        let (begin, end) = user_key_range(&version.files[0])?;
        let inputs_at_output_level = version
            .get_overlapping_inputs(comparator, output_level, &begin, &end)
            .iter()
            .map(|f| f.number)
            .collect();
        return Some(CompactionJob { level, output_level, inputs_at_level, inputs_at_output_level });
    }

    // Pick the file whose range starts earliest among those not already covered; a real
    // round-robin "compaction pointer" per level is not tracked (scope reduction).
    let file = version.files[level].first()?;
    let inputs_at_output_level: Vec<u64> = version
        .get_overlapping_inputs(comparator, output_level, &file.smallest, &file.largest)
        .iter()
        .map(|f| f.number)
        .collect();
    Some(CompactionJob {
        level,
        output_level,
        inputs_at_level: vec![file.number],
        inputs_at_output_level,
    })
}

fn user_key_range(files: &[Arc<FileMetaData>]) -> Option<(Vec<u8>, Vec<u8>)> {
    let smallest = files.iter().map(|f| f.smallest.clone()).min()?;
    let largest = files.iter().map(|f| f.largest.clone()).max()?;
    Some((smallest, largest))
}

/// Runs `job`, producing the `VersionEdit` that deletes its inputs and adds its outputs.
pub fn run_compaction(
    job: &CompactionJob,
    env: &dyn lsmkv_vfs::Env,
    dir: &std::path::Path,
    options: &Options,
    comparator: &InternalKeyComparator,
    compressors: &CompressorList,
    filter_policy: Option<Arc<dyn FilterPolicy>>,
    earliest_active_snapshot: u64,
    bottommost: bool,
    next_file_number: &mut impl FnMut() -> u64,
) -> Result<VersionEdit> {
    let mut entries = Vec::new();
    for &number in job.inputs_at_level.iter().chain(job.inputs_at_output_level.iter()) {
        let table = open_table(env, dir, comparator, compressors, filter_policy.clone(), number)?;
        entries.extend(read_all_entries(&table, comparator)?);
    }
    entries.sort_by(|a, b| comparator.cmp(&a.0, &b.0));

    let kept = fold_entries(
        &entries,
        comparator,
        options.merge_operator.as_deref(),
        earliest_active_snapshot,
        bottommost,
    );

    let mut edit = VersionEdit::new();
    for &number in &job.inputs_at_level {
        edit.delete_file(job.level, number);
    }
    for &number in &job.inputs_at_output_level {
        edit.delete_file(job.output_level, number);
    }

    let mut chunk_start = 0;
    while chunk_start < kept.len() {
        let file_number = next_file_number();
        let path = dir.join(
            crate::filename::FileName::Table { file_number: crate::filename::FileNumber(file_number) }
                .file_name(),
        );
        let file = env.open_writable(&path)?;
        let mut builder = TableBuilder::new(
            file,
            comparator,
            compressors,
            options.compression,
            options.block_size,
            options.block_restart_interval,
            wrap_filter_policy(filter_policy.clone()),
        );

        let mut smallest = None;
        let mut largest = None;
        let mut smallest_seqno = u64::MAX;
        let mut largest_seqno = 0;
        let mut i = chunk_start;
        while i < kept.len() {
            let (key, value) = &kept[i];
            builder.add(key, value)?;
            if smallest.is_none() {
                smallest = Some(key.clone());
            }
            largest = Some(key.clone());
            let (_, seq, _) = split_internal_key(key);
            smallest_seqno = smallest_seqno.min(seq);
            largest_seqno = largest_seqno.max(seq);
            i += 1;
            if builder.file_size() as usize >= options.compaction.max_output_file_size as usize
            {
                break;
            }
        }
        let file_size = builder.finish()?;
        edit.add_file(
            job.output_level,
            FileMetaData {
                number: file_number,
                file_size,
                smallest: smallest.expect("at least one entry per chunk"),
                largest: largest.expect("at least one entry per chunk"),
                smallest_seqno,
                largest_seqno,
            },
        );
        chunk_start = i;
    }

    Ok(edit)
}

/// Applies compaction rules 2, 4, 5, 6, 7 to a fully sorted run of
/// `(internal_key, value)` pairs.
fn fold_entries(
    entries: &[(Vec<u8>, Vec<u8>)],
    comparator: &InternalKeyComparator,
    merge_operator: Option<&dyn MergeOperator>,
    earliest_active_snapshot: u64,
    bottommost: bool,
) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut out = Vec::new();
    let mut i = 0;
    let mut current_user_key: Option<Vec<u8>> = None;
    let mut kept_visible_newer = false;
    let mut kept_one_at_or_below_snapshot = false;

    while i < entries.len() {
        let (key, value) = &entries[i];
        let user_key = extract_user_key(key).to_vec();
        let (_, seq, value_type_tag) = split_internal_key(key);
        let Some(value_type) = ValueType::from_tag(value_type_tag) else {
            // Unparseable entry; preserve it verbatim rather than guess at its meaning.
            out.push((key.clone(), value.clone()));
            i += 1;
            continue;
        };

        if current_user_key.as_deref() != Some(user_key.as_slice()) {
            current_user_key = Some(user_key.clone());
            kept_visible_newer = false;
            kept_one_at_or_below_snapshot = false;
        }

        if seq > earliest_active_snapshot {
            kept_visible_newer = true;
        } else if kept_one_at_or_below_snapshot {
            // A later (higher-sequence) version already covers every snapshot at or below
            // `earliest_active_snapshot`; this older version is unreachable.
            i += 1;
            continue;
        } else {
            kept_one_at_or_below_snapshot = true;
        }
        let _ = kept_visible_newer;

        match value_type {
            ValueType::Merge => {
                // If this run starts above the watermark, the first entry at or below it is the
                // version `earliest_active_snapshot` must still be able to read on its own; stop
                // before consuming it rather than folding it into a newer, still-live snapshot's
                // result.
                let stop_at_snapshot_boundary = seq > earliest_active_snapshot;
                let mut operands = vec![value.clone()];
                let mut j = i + 1;
                let mut base: Option<Vec<u8>> = None;
                let mut base_tag = None;
                while j < entries.len() {
                    let (next_key, next_value) = &entries[j];
                    if extract_user_key(next_key) != user_key.as_slice() {
                        break;
                    }
                    let (_, next_seq, next_tag) = split_internal_key(next_key);
                    if stop_at_snapshot_boundary && next_seq <= earliest_active_snapshot {
                        break;
                    }
                    match ValueType::from_tag(next_tag) {
                        Some(ValueType::Merge) => {
                            operands.push(next_value.clone());
                            j += 1;
                        }
                        Some(other) => {
                            base = Some(next_value.clone());
                            base_tag = Some(other);
                            j += 1;
                            break;
                        }
                        None => break,
                    }
                }
                // Collected newest-first (the run walks in descending-sequence order);
                // `full_merge` folds oldest-to-newest.
                operands.reverse();
                let merged = fold_merge(
                    merge_operator,
                    &user_key,
                    if base_tag == Some(ValueType::Deletion) { None } else { base.as_deref() },
                    &operands,
                )
                .unwrap_or_else(|| operands.last().cloned().unwrap_or_default());
                let mut out_key = key.clone();
                if base_tag == Some(ValueType::Value) {
                    // The chain resolved against a real value; it's no longer a pending
                    // operand and must not be mistaken for one by a later reader or compaction.
                    rewrite_value_type(&mut out_key, ValueType::Value);
                }
                maybe_zero_sequence(&mut out_key, seq, earliest_active_snapshot, bottommost);
                out.push((out_key, merged));
                i = j;
            }
            ValueType::Deletion => {
                if bottommost && seq <= earliest_active_snapshot {
                    // Bottommost level: nothing below can still reference this user key.
                    i += 1;
                } else {
                    let mut out_key = key.clone();
                    maybe_zero_sequence(&mut out_key, seq, earliest_active_snapshot, bottommost);
                    out.push((out_key, value.clone()));
                    i += 1;
                }
            }
            ValueType::Value => {
                let mut out_key = key.clone();
                maybe_zero_sequence(&mut out_key, seq, earliest_active_snapshot, bottommost);
                out.push((out_key, value.clone()));
                i += 1;
            }
        }
    }

    out.sort_by(|a, b| comparator.cmp(&a.0, &b.0));
    out
}

/// Overwrites `key`'s trailing type tag in place, keeping its sequence number.
fn rewrite_value_type(key: &mut [u8], value_type: ValueType) {
    let len = key.len();
    let (_, seq, _) = split_internal_key(key);
    let repacked = crate::key::pack_seq_and_type(seq, value_type as u8);
    key[len - 8..].copy_from_slice(&repacked.to_le_bytes());
}

fn maybe_zero_sequence(key: &mut [u8], seq: u64, earliest_active_snapshot: u64, bottommost: bool) {
    if bottommost && seq < earliest_active_snapshot {
        let len = key.len();
        let (_, _, value_type) = split_internal_key(key);
        let repacked = crate::key::pack_seq_and_type(0, value_type);
        key[len - 8..].copy_from_slice(&repacked.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::make_internal_key;
    use lsmkv_sstable::BytewiseComparator;

    fn ikc() -> InternalKeyComparator {
        InternalKeyComparator::new(Arc::new(BytewiseComparator))
    }

    #[test]
    fn drops_superseded_versions_below_the_snapshot_watermark() {
        let c = ikc();
        let entries = vec![
            (make_internal_key(b"k", 5, ValueType::Value as u8), b"newest".to_vec()),
            (make_internal_key(b"k", 3, ValueType::Value as u8), b"middle".to_vec()),
            (make_internal_key(b"k", 1, ValueType::Value as u8), b"oldest".to_vec()),
        ];
        let kept = fold_entries(&entries, &c, None, 4, false);
        // seq 5 survives (newer than the snapshot); seq 3 is the single version covering
        // everything at or below the watermark; seq 1 is unreachable.
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn elides_tombstones_at_the_bottommost_level() {
        let c = ikc();
        let entries =
            vec![(make_internal_key(b"k", 1, ValueType::Deletion as u8), Vec::new())];
        let kept = fold_entries(&entries, &c, None, 10, true);
        assert!(kept.is_empty());
    }

    #[test]
    fn a_merge_chain_resolved_against_a_value_is_retagged_as_a_value() {
        use crate::merge::StringAppendOperator;

        let c = ikc();
        let entries = vec![
            (make_internal_key(b"k", 3, ValueType::Merge as u8), b"c".to_vec()),
            (make_internal_key(b"k", 2, ValueType::Merge as u8), b"b".to_vec()),
            (make_internal_key(b"k", 1, ValueType::Value as u8), b"a".to_vec()),
        ];
        let op = StringAppendOperator;
        let kept = fold_entries(&entries, &c, Some(&op), 0, true);
        assert_eq!(kept.len(), 1);
        let (key, value) = &kept[0];
        let (_, _, value_type) = split_internal_key(key);
        assert_eq!(value_type, ValueType::Value as u8, "resolved chain must no longer read as a pending merge");
        assert_eq!(value, b"a,b,c");
    }

    #[test]
    fn a_merge_run_stops_at_a_live_snapshot_boundary() {
        use crate::merge::StringAppendOperator;

        let c = ikc();
        // Put("k","a") @1, snapshot taken at seq 1, then Merge("k","b") @2.
        let entries = vec![
            (make_internal_key(b"k", 2, ValueType::Merge as u8), b"b".to_vec()),
            (make_internal_key(b"k", 1, ValueType::Value as u8), b"a".to_vec()),
        ];
        let op = StringAppendOperator;
        let kept = fold_entries(&entries, &c, Some(&op), 1, false);
        // The seq-1 entry must survive on its own so the seq-1 snapshot still reads "a".
        assert_eq!(kept.len(), 2);
        let seq1 = kept.iter().find(|(k, _)| split_internal_key(k).1 == 1).expect("seq 1 kept");
        assert_eq!(seq1.1, b"a");
        let seq2 = kept.iter().find(|(k, _)| split_internal_key(k).1 == 2).expect("seq 2 kept");
        let (_, _, seq2_type) = split_internal_key(&seq2.0);
        assert_eq!(seq2_type, ValueType::Merge as u8, "unresolved operand stays tagged as a merge");
    }
}
