//! Names of the files a database directory may contain: sorted tables, write-ahead log
//! segments, the manifest, and the small set of fixed-name control files.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FileNumber(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileName {
    /// A memtable's write-ahead log segment, `NNNNNN.log`.
    Log { file_number: FileNumber },
    /// A sorted table, `NNNNNN.sst`.
    Table { file_number: FileNumber },
    /// A manifest log, `MANIFEST-NNNNNN`.
    Manifest { file_number: FileNumber },
    /// A table or manifest being written, renamed into place once complete, `NNNNNN.dbtmp`.
    Temp { file_number: FileNumber },
    /// The advisory lock file, `LOCK`.
    Lock,
    /// Points at the current manifest, `CURRENT`.
    Current,
}

impl FileName {
    /// Parses a bare file name (no directory components) into its meaning, or `None` if it is
    /// not a file this engine recognizes.
    #[must_use]
    pub fn parse(file_name: &Path) -> Option<Self> {
        let file_name = file_name.to_str()?;
        let &first_byte = file_name.as_bytes().first()?;
        if first_byte == b'+' {
            return None;
        }

        if let Some(digits) = file_name.strip_suffix(".sst") {
            Some(Self::Table { file_number: parse_file_number(digits)? })
        } else if let Some(digits) = file_name.strip_suffix(".log") {
            Some(Self::Log { file_number: parse_file_number(digits)? })
        } else if let Some(digits) = file_name.strip_suffix(".dbtmp") {
            Some(Self::Temp { file_number: parse_file_number(digits)? })
        } else if let Some(digits) = file_name.strip_prefix("MANIFEST-") {
            Some(Self::Manifest { file_number: parse_file_number(digits)? })
        } else {
            match file_name {
                "LOCK" => Some(Self::Lock),
                "CURRENT" => Some(Self::Current),
                _ => None,
            }
        }
    }

    #[must_use]
    pub fn file_name(self) -> PathBuf {
        match self {
            Self::Log { file_number } => format!("{:06}.log", file_number.0).into(),
            Self::Table { file_number } => format!("{:06}.sst", file_number.0).into(),
            Self::Manifest { file_number } => format!("MANIFEST-{:06}", file_number.0).into(),
            Self::Temp { file_number } => format!("{:06}.dbtmp", file_number.0).into(),
            Self::Lock => Path::new("LOCK").to_owned(),
            Self::Current => Path::new("CURRENT").to_owned(),
        }
    }
}

fn parse_file_number(digits: &str) -> Option<FileNumber> {
    let &first_byte = digits.as_bytes().first()?;
    if first_byte == b'+' {
        return None;
    }
    Some(FileNumber(digits.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_variant() {
        for file_number in [FileNumber(0), FileNumber(7), FileNumber(123_456)] {
            for name in [
                FileName::Log { file_number },
                FileName::Table { file_number },
                FileName::Manifest { file_number },
                FileName::Temp { file_number },
            ] {
                let rendered = name.file_name();
                assert_eq!(FileName::parse(&rendered), Some(name));
            }
        }
        assert_eq!(FileName::parse(Path::new("LOCK")), Some(FileName::Lock));
        assert_eq!(FileName::parse(Path::new("CURRENT")), Some(FileName::Current));
    }

    #[test]
    fn rejects_a_leading_plus_sign() {
        assert_eq!(FileName::parse(Path::new("+3.sst")), None);
        assert_eq!(FileName::parse(Path::new("MANIFEST-+3")), None);
    }

    #[test]
    fn rejects_unrecognized_names() {
        assert_eq!(FileName::parse(Path::new("README.md")), None);
    }
}
