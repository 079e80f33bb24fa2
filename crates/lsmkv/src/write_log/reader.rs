//! The write-ahead log reader: reassembles fragmented physical records into logical records,
//! resynchronizing at the next block boundary whenever it finds corruption.
//!
//! Every failure mode here is non-fatal: a corrupted or truncated record is dropped and recovery
//! continues with whatever records remain. The caller learns about drops through the
//! `error_handler` callback.

use std::io::Read;

use lsmkv_sstable::coding::{crc32c, unmask_crc};
use thiserror::Error;

use super::{RecordType, HEADER_SIZE, WRITE_LOG_BLOCK_SIZE};

/// A non-fatal defect found while reassembling the log. Every variant means some number of
/// bytes were dropped; the read continues at the next block boundary.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LogReadError {
    #[error("checksum mismatch in physical record")]
    ChecksumMismatch,
    #[error("physical record length field points past the end of its block")]
    BadRecordLength,
    #[error("record type byte {0} is not a recognized record type")]
    UnknownRecordType(u8),
    #[error("First record type found while a fragmented record was already in progress")]
    PartialRecordDiscarded,
    #[error("Middle/Last record type found with no preceding First")]
    MissingStartOfFragment,
    #[error("trailing bytes at end of file did not form a complete physical record")]
    TruncatedTrailer,
}

/// Called once per discarded run of bytes: `(bytes_dropped, reason)`.
pub trait ErrorHandler {
    fn handle(&mut self, bytes_dropped: usize, error: LogReadError);
}

impl<F: FnMut(usize, LogReadError)> ErrorHandler for F {
    fn handle(&mut self, bytes_dropped: usize, error: LogReadError) {
        self(bytes_dropped, error)
    }
}

pub struct WriteLogReader<'a, File> {
    log_file: File,
    error_handler: Box<dyn ErrorHandler + 'a>,
    /// Buffered bytes of the current physical block not yet consumed.
    block_buffer: Vec<u8>,
    offset_in_block: usize,
    /// Byte offset, within the whole file, of the start of `block_buffer`.
    block_start_offset: u64,
    eof: bool,
    /// Accumulates fragments of a record currently in progress (`First` seen, `Last` pending).
    record_buffer: Vec<u8>,
    fragmented: bool,
    /// File offset at which the in-progress logical record's first fragment began.
    record_start_offset: u64,
}

impl<'a, File: Read> WriteLogReader<'a, File> {
    pub fn new(log_file: File, error_handler: impl ErrorHandler + 'a) -> Self {
        Self {
            log_file,
            error_handler: Box::new(error_handler),
            block_buffer: Vec::new(),
            offset_in_block: 0,
            block_start_offset: 0,
            eof: false,
            record_buffer: Vec::new(),
            fragmented: false,
            record_start_offset: 0,
        }
    }

    /// Returns the next logical record and the file offset its first physical fragment started
    /// at, or `None` once the file is exhausted.
    pub fn read_record(&mut self) -> Option<(Vec<u8>, u64)> {
        loop {
            match self.read_physical_record() {
                Some((record_type, payload, fragment_offset)) => {
                    match record_type {
                        RecordType::Full => {
                            if self.fragmented {
                                self.report(LogReadError::PartialRecordDiscarded);
                                self.record_buffer.clear();
                                self.fragmented = false;
                            }
                            return Some((payload, fragment_offset));
                        }
                        RecordType::First => {
                            if self.fragmented {
                                self.report(LogReadError::PartialRecordDiscarded);
                                self.record_buffer.clear();
                            }
                            self.record_buffer = payload;
                            self.fragmented = true;
                            self.record_start_offset = fragment_offset;
                        }
                        RecordType::Middle => {
                            if !self.fragmented {
                                self.report(LogReadError::MissingStartOfFragment);
                                continue;
                            }
                            self.record_buffer.extend_from_slice(&payload);
                        }
                        RecordType::Last => {
                            if !self.fragmented {
                                self.report(LogReadError::MissingStartOfFragment);
                                continue;
                            }
                            self.record_buffer.extend_from_slice(&payload);
                            self.fragmented = false;
                            return Some((
                                std::mem::take(&mut self.record_buffer),
                                self.record_start_offset,
                            ));
                        }
                        RecordType::Zero => {
                            // Padding written when a block couldn't fit another header; skip.
                        }
                    }
                }
                None => return None,
            }
        }
    }

    fn report(&mut self, error: LogReadError) {
        let dropped = self.record_buffer.len();
        self.error_handler.handle(dropped, error);
    }

    /// Reads exactly one physical record, refilling `block_buffer` from the underlying file as
    /// needed and resynchronizing to the next block on any corruption.
    fn read_physical_record(&mut self) -> Option<(RecordType, Vec<u8>, u64)> {
        loop {
            if self.block_buffer.len() - self.offset_in_block < HEADER_SIZE {
                if !self.fill_block_until_eof() {
                    return None;
                }
                continue;
            }

            let header_offset = self.offset_in_block;
            let header = &self.block_buffer[header_offset..header_offset + HEADER_SIZE];
            let masked_checksum = u32::from_le_bytes(header[0..4].try_into().unwrap());
            let length = u16::from_le_bytes(header[4..6].try_into().unwrap()) as usize;
            let type_byte = header[6];

            let record_start = header_offset + HEADER_SIZE;
            if self.block_buffer.len() - record_start < length {
                // Length field claims more bytes than remain in this block: corrupt length,
                // or (for the very last block) a write that was torn off mid-record.
                let remaining_in_block = self.block_buffer.len() - header_offset;
                self.offset_in_block = self.block_buffer.len();
                if self.eof {
                    self.report_if_nonzero(remaining_in_block, LogReadError::TruncatedTrailer);
                } else {
                    self.report_if_nonzero(remaining_in_block, LogReadError::BadRecordLength);
                }
                self.abandon_fragment_in_progress();
                continue;
            }

            let Ok(record_type) = RecordType::try_from(type_byte) else {
                self.offset_in_block = record_start + length;
                self.report_if_nonzero(
                    HEADER_SIZE + length,
                    LogReadError::UnknownRecordType(type_byte),
                );
                self.abandon_fragment_in_progress();
                continue;
            };

            let payload = &self.block_buffer[record_start..record_start + length];
            let mut checked = Vec::with_capacity(1 + payload.len());
            checked.push(type_byte);
            checked.extend_from_slice(payload);
            let computed = crc32c(&checked);
            if computed != unmask_crc(masked_checksum) {
                self.offset_in_block = record_start + length;
                self.report_if_nonzero(HEADER_SIZE + length, LogReadError::ChecksumMismatch);
                self.abandon_fragment_in_progress();
                continue;
            }

            let fragment_offset = self.block_start_offset + header_offset as u64;
            self.offset_in_block = record_start + length;
            return Some((record_type, payload.to_vec(), fragment_offset));
        }
    }

    fn report_if_nonzero(&mut self, bytes: usize, error: LogReadError) {
        if bytes > 0 {
            self.error_handler.handle(bytes, error);
        }
    }

    /// Any corruption at the physical-record level invalidates whatever fragmented logical
    /// record was being reassembled; there is no way to know if the missing middle belonged to
    /// it.
    fn abandon_fragment_in_progress(&mut self) {
        self.fragmented = false;
        self.record_buffer.clear();
    }

    /// Loads the next 32 KiB (or fewer, at EOF) into `block_buffer`. Returns `false` once there
    /// is nothing left to read at all.
    fn fill_block_until_eof(&mut self) -> bool {
        if self.eof {
            return false;
        }
        self.block_start_offset += self.block_buffer.len() as u64;
        self.block_buffer.clear();
        self.offset_in_block = 0;

        let mut buf = vec![0_u8; WRITE_LOG_BLOCK_SIZE];
        let mut filled = 0;
        loop {
            match self.log_file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
            if filled == buf.len() {
                break;
            }
        }
        buf.truncate(filled);
        if filled < WRITE_LOG_BLOCK_SIZE {
            self.eof = true;
        }
        self.block_buffer = buf;
        !self.block_buffer.is_empty() || !self.eof
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::write_log::writer::WriteLogWriter;
    use lsmkv_vfs::{Env, MemoryFs};

    #[test]
    fn resyncs_past_a_corrupted_block() {
        let fs = MemoryFs::new();
        let path = std::path::Path::new("/000003.log");
        {
            let file = fs.open_writable(path).unwrap();
            let mut writer = WriteLogWriter::new_empty(file);
            writer.add_record(b"first").unwrap();
            writer.add_record(b"second").unwrap();
        }

        // Flip a bit in the first record's payload so its checksum no longer matches.
        let corrupted = {
            let mut file = fs.open_sequential(path).unwrap();
            let mut bytes = Vec::new();
            file.read_to_end(&mut bytes).unwrap();
            bytes[HEADER_SIZE] ^= 0xff;
            bytes
        };
        fs.delete_file(path).unwrap();
        {
            use lsmkv_vfs::WritableFile;
            let mut file = fs.open_writable(path).unwrap();
            file.write_all(&corrupted).unwrap();
        }

        let mut drops = Vec::new();
        let file = fs.open_sequential(path).unwrap();
        let mut reader = WriteLogReader::new(file, |n, e| drops.push((n, e)));
        let (record, _) = reader.read_record().unwrap();
        assert_eq!(record, b"second");
        assert!(!drops.is_empty());
    }
}
