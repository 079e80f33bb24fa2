//! A `VersionEdit` is the atomic unit of change applied to a [`Version`](crate::version::Version):
//! files added by a flush or compaction, files made obsolete, and the bookkeeping counters that
//! accompany them. It is serialized as a tagged varint stream so the manifest can
//! append edits without rewriting the whole version.
//!
//! Column-family fields named alongside this structure in the original design are out of scope:
//! this engine manages exactly one column family per open database (see DESIGN.md).

use lsmkv_sstable::coding::{
    get_length_prefixed_slice, get_varint32, get_varint64, put_length_prefixed_slice,
    put_varint32, put_varint64,
};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetaData {
    pub number: u64,
    pub file_size: u64,
    pub smallest: Vec<u8>,
    pub largest: Vec<u8>,
    pub smallest_seqno: u64,
    pub largest_seqno: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionEdit {
    pub comparator_name: Option<String>,
    pub log_number: Option<u64>,
    pub prev_log_number: Option<u64>,
    pub next_file_number: Option<u64>,
    pub last_sequence: Option<u64>,
    pub deleted_files: Vec<(usize, u64)>,
    pub new_files: Vec<(usize, FileMetaData)>,
}

// Tag values are arbitrary but stable once a database has been created with them, so they
// must never be renumbered.
mod tag {
    pub const COMPARATOR: u32 = 1;
    pub const LOG_NUMBER: u32 = 2;
    pub const NEXT_FILE_NUMBER: u32 = 3;
    pub const LAST_SEQUENCE: u32 = 4;
    pub const PREV_LOG_NUMBER: u32 = 9;
    pub const DELETED_FILE: u32 = 6;
    pub const NEW_FILE: u32 = 7;
}

impl VersionEdit {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_comparator_name(&mut self, name: impl Into<String>) {
        self.comparator_name = Some(name.into());
    }

    pub fn set_log_number(&mut self, n: u64) {
        self.log_number = Some(n);
    }

    pub fn set_prev_log_number(&mut self, n: u64) {
        self.prev_log_number = Some(n);
    }

    pub fn set_next_file_number(&mut self, n: u64) {
        self.next_file_number = Some(n);
    }

    pub fn set_last_sequence(&mut self, n: u64) {
        self.last_sequence = Some(n);
    }

    pub fn delete_file(&mut self, level: usize, number: u64) {
        self.deleted_files.push((level, number));
    }

    pub fn add_file(&mut self, level: usize, meta: FileMetaData) {
        self.new_files.push((level, meta));
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        if let Some(name) = &self.comparator_name {
            put_varint32(&mut out, tag::COMPARATOR);
            put_length_prefixed_slice(&mut out, name.as_bytes());
        }
        if let Some(n) = self.log_number {
            put_varint32(&mut out, tag::LOG_NUMBER);
            put_varint64(&mut out, n);
        }
        if let Some(n) = self.prev_log_number {
            put_varint32(&mut out, tag::PREV_LOG_NUMBER);
            put_varint64(&mut out, n);
        }
        if let Some(n) = self.next_file_number {
            put_varint32(&mut out, tag::NEXT_FILE_NUMBER);
            put_varint64(&mut out, n);
        }
        if let Some(n) = self.last_sequence {
            put_varint32(&mut out, tag::LAST_SEQUENCE);
            put_varint64(&mut out, n);
        }
        for (level, number) in &self.deleted_files {
            put_varint32(&mut out, tag::DELETED_FILE);
            put_varint32(&mut out, *level as u32);
            put_varint64(&mut out, *number);
        }
        for (level, meta) in &self.new_files {
            put_varint32(&mut out, tag::NEW_FILE);
            put_varint32(&mut out, *level as u32);
            put_varint64(&mut out, meta.number);
            put_varint64(&mut out, meta.file_size);
            put_length_prefixed_slice(&mut out, &meta.smallest);
            put_length_prefixed_slice(&mut out, &meta.largest);
            put_varint64(&mut out, meta.smallest_seqno);
            put_varint64(&mut out, meta.largest_seqno);
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut edit = Self::new();
        let mut input = bytes;
        let corrupt = |what: &str| Error::Corruption(format!("version edit: {what}"));

        while !input.is_empty() {
            let tag = get_varint32(&mut input).map_err(|_| corrupt("truncated tag"))?;
            match tag {
                tag::COMPARATOR => {
                    let name = get_length_prefixed_slice(&mut input)
                        .map_err(|_| corrupt("truncated comparator name"))?;
                    edit.comparator_name = Some(
                        String::from_utf8(name.to_vec())
                            .map_err(|_| corrupt("comparator name is not utf-8"))?,
                    );
                }
                tag::LOG_NUMBER => {
                    edit.log_number =
                        Some(get_varint64(&mut input).map_err(|_| corrupt("log_number"))?);
                }
                tag::PREV_LOG_NUMBER => {
                    edit.prev_log_number =
                        Some(get_varint64(&mut input).map_err(|_| corrupt("prev_log_number"))?);
                }
                tag::NEXT_FILE_NUMBER => {
                    edit.next_file_number =
                        Some(get_varint64(&mut input).map_err(|_| corrupt("next_file_number"))?);
                }
                tag::LAST_SEQUENCE => {
                    edit.last_sequence =
                        Some(get_varint64(&mut input).map_err(|_| corrupt("last_sequence"))?);
                }
                tag::DELETED_FILE => {
                    let level = get_varint32(&mut input).map_err(|_| corrupt("deleted level"))?;
                    let number =
                        get_varint64(&mut input).map_err(|_| corrupt("deleted number"))?;
                    edit.deleted_files.push((level as usize, number));
                }
                tag::NEW_FILE => {
                    let level = get_varint32(&mut input).map_err(|_| corrupt("new file level"))?;
                    let number = get_varint64(&mut input).map_err(|_| corrupt("new file number"))?;
                    let file_size =
                        get_varint64(&mut input).map_err(|_| corrupt("new file size"))?;
                    let smallest = get_length_prefixed_slice(&mut input)
                        .map_err(|_| corrupt("new file smallest key"))?
                        .to_vec();
                    let largest = get_length_prefixed_slice(&mut input)
                        .map_err(|_| corrupt("new file largest key"))?
                        .to_vec();
                    let smallest_seqno =
                        get_varint64(&mut input).map_err(|_| corrupt("smallest_seqno"))?;
                    let largest_seqno =
                        get_varint64(&mut input).map_err(|_| corrupt("largest_seqno"))?;
                    edit.new_files.push((
                        level as usize,
                        FileMetaData {
                            number,
                            file_size,
                            smallest,
                            largest,
                            smallest_seqno,
                            largest_seqno,
                        },
                    ));
                }
                other => return Err(corrupt(&format!("unknown tag {other}"))),
            }
        }
        Ok(edit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_mixed_edit() {
        let mut edit = VersionEdit::new();
        edit.set_comparator_name("bytewise");
        edit.set_log_number(7);
        edit.set_next_file_number(8);
        edit.set_last_sequence(100);
        edit.delete_file(0, 3);
        edit.add_file(
            1,
            FileMetaData {
                number: 9,
                file_size: 4096,
                smallest: b"a".to_vec(),
                largest: b"z".to_vec(),
                smallest_seqno: 10,
                largest_seqno: 20,
            },
        );

        let decoded = VersionEdit::decode(&edit.encode()).unwrap();
        assert_eq!(decoded, edit);
    }

    #[test]
    fn rejects_an_unknown_tag() {
        let mut bytes = Vec::new();
        put_varint32(&mut bytes, 255);
        assert!(VersionEdit::decode(&bytes).is_err());
    }
}
