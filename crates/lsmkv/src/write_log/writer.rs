//! The write-ahead log writer: buffers a logical record into the current 32 KiB block, starting
//! a new block and splitting as needed.

use lsmkv_sstable::coding::{crc32c, mask_crc};
use lsmkv_vfs::WritableFile;
use thiserror::Error;

use super::{RecordType, HEADER_SIZE, WRITE_LOG_BLOCK_SIZE};

/// Writing to the log file failed. This is treated as fatal and non-retryable: the caller does
/// not know how many bytes of a partially-written record actually reached the file.
#[derive(Debug, Error)]
#[error("failed to write to log file: {0}")]
pub struct LogWriteError(#[from] pub std::io::Error);

/// Checksum covers `type_byte || fragment`, matching what the reader verifies against.
fn record_checksum(record_type: RecordType, fragment: &[u8]) -> u32 {
    let mut buf = Vec::with_capacity(1 + fragment.len());
    buf.push(u8::from(record_type));
    buf.extend_from_slice(fragment);
    crc32c(&buf)
}

pub struct WriteLogWriter<File> {
    log_file: File,
    /// Bytes left in the current physical block before it must roll over.
    remaining_space: usize,
}

impl<File: WritableFile> WriteLogWriter<File> {
    #[must_use]
    pub fn new_empty(log_file: File) -> Self {
        Self { log_file, remaining_space: WRITE_LOG_BLOCK_SIZE }
    }

    /// Resumes writing at `offset` within an existing log file (used when appending a manifest
    /// that the writer does not own exclusively from its start).
    #[must_use]
    pub fn new_with_offset(log_file: File, offset: u64) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let used = (offset as usize) % WRITE_LOG_BLOCK_SIZE;
        Self { log_file, remaining_space: WRITE_LOG_BLOCK_SIZE - used }
    }

    pub fn sync_log_data(&mut self) -> std::io::Result<()> {
        self.log_file.sync_data()
    }

    /// Appends `record` as one or more physical records, flushing the file afterward
    /// regardless of success or failure.
    pub fn add_record(&mut self, record: &[u8]) -> Result<(), LogWriteError> {
        let result = self.inner_add_record(record);
        // Best-effort: flush whatever was written even if a later write in the same call failed.
        let _ = self.log_file.flush();
        result
    }

    fn inner_add_record(&mut self, record: &[u8]) -> Result<(), LogWriteError> {
        let mut remaining = record;
        let mut first_fragment = true;

        // Permit zero-length records: the loop below runs at least once even if `record` is
        // empty, emitting a single empty `Full` record.
        loop {
            if self.remaining_space < HEADER_SIZE {
                if self.remaining_space > 0 {
                    let padding = vec![0_u8; self.remaining_space];
                    self.log_file.write_all(&padding)?;
                }
                self.remaining_space = WRITE_LOG_BLOCK_SIZE;
            }

            let available_for_fragment = self.remaining_space - HEADER_SIZE;
            let fragment_len = remaining.len().min(available_for_fragment);
            let last_fragment = fragment_len == remaining.len();
            let record_type = RecordType::for_fragment(first_fragment, last_fragment);

            let fragment = &remaining[..fragment_len];
            let masked = mask_crc(record_checksum(record_type, fragment));

            self.log_file.write_all(&masked.to_le_bytes())?;
            #[allow(clippy::cast_possible_truncation)]
            self.log_file.write_all(&(fragment_len as u16).to_le_bytes())?;
            self.log_file.write_all(&[u8::from(record_type)])?;
            self.log_file.write_all(fragment)?;

            self.remaining_space -= HEADER_SIZE + fragment_len;
            remaining = &remaining[fragment_len..];
            first_fragment = false;

            if last_fragment {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::write_log::reader::WriteLogReader;
    use lsmkv_vfs::{Env, MemoryFs};

    #[test]
    fn round_trips_a_small_record() {
        let fs = MemoryFs::new();
        let path = std::path::Path::new("/000001.log");
        {
            let file = fs.open_writable(path).unwrap();
            let mut writer = WriteLogWriter::new_empty(file);
            writer.add_record(b"hello world").unwrap();
            writer.add_record(b"second record").unwrap();
        }
        let file = fs.open_sequential(path).unwrap();
        let mut reader = WriteLogReader::new(file, |_bytes_dropped, _err| {
            panic!("no corruption expected in this test");
        });
        assert_eq!(reader.read_record().unwrap().0, b"hello world");
        assert_eq!(reader.read_record().unwrap().0, b"second record");
        assert!(reader.read_record().is_none());
    }

    #[test]
    fn splits_a_record_spanning_two_blocks() {
        let fs = MemoryFs::new();
        let path = std::path::Path::new("/000002.log");
        let big_record = vec![0x42_u8; WRITE_LOG_BLOCK_SIZE + 1024];
        {
            let file = fs.open_writable(path).unwrap();
            let mut writer = WriteLogWriter::new_empty(file);
            writer.add_record(&big_record).unwrap();
        }
        let file = fs.open_sequential(path).unwrap();
        let mut reader = WriteLogReader::new(file, |_bytes_dropped, _err| {
            panic!("no corruption expected in this test");
        });
        let (got, _offset) = reader.read_record().unwrap();
        assert_eq!(got, big_record.as_slice());
    }
}
