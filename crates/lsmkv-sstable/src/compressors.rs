//! Block compression: each stored block is tagged with a one-byte compressor id so that
//! different tables can mix compressors freely.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompressionError {
    #[error("unknown block compression id {0}")]
    UnknownId(u8),
    #[error("block failed to (de)compress: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionId {
    None,
    Snappy,
    Zstd,
}

impl CompressionId {
    #[must_use]
    pub fn tag(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Snappy => 1,
            Self::Zstd => 2,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self, CompressionError> {
        match tag {
            0 => Ok(Self::None),
            1 => Ok(Self::Snappy),
            2 => Ok(Self::Zstd),
            other => Err(CompressionError::UnknownId(other)),
        }
    }
}

/// Compresses and decompresses block bodies for one [`CompressionId`].
pub trait Compressor: Send + Sync + std::fmt::Debug {
    fn id(&self) -> CompressionId;
    fn compress(&self, source: &[u8]) -> Result<Vec<u8>, CompressionError>;
    fn decompress(&self, source: &[u8]) -> Result<Vec<u8>, CompressionError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoneCompressor;

impl Compressor for NoneCompressor {
    fn id(&self) -> CompressionId {
        CompressionId::None
    }

    fn compress(&self, source: &[u8]) -> Result<Vec<u8>, CompressionError> {
        Ok(source.to_vec())
    }

    fn decompress(&self, source: &[u8]) -> Result<Vec<u8>, CompressionError> {
        Ok(source.to_vec())
    }
}

#[cfg(feature = "snappy-compressor")]
#[derive(Debug, Default, Clone, Copy)]
pub struct SnappyCompressor;

#[cfg(feature = "snappy-compressor")]
impl Compressor for SnappyCompressor {
    fn id(&self) -> CompressionId {
        CompressionId::Snappy
    }

    fn compress(&self, source: &[u8]) -> Result<Vec<u8>, CompressionError> {
        let mut out = vec![0_u8; snap::raw::max_compress_len(source.len())];
        let len = snap::raw::Encoder::new()
            .compress(source, &mut out)
            .map_err(|e| CompressionError::Failed(e.to_string()))?;
        out.truncate(len);
        Ok(out)
    }

    fn decompress(&self, source: &[u8]) -> Result<Vec<u8>, CompressionError> {
        let decompressed_len = snap::raw::decompress_len(source)
            .map_err(|e| CompressionError::Failed(e.to_string()))?;
        let mut out = vec![0_u8; decompressed_len];
        snap::raw::Decoder::new()
            .decompress(source, &mut out)
            .map_err(|e| CompressionError::Failed(e.to_string()))?;
        Ok(out)
    }
}

#[cfg(feature = "zstd-compressor")]
#[derive(Debug, Clone, Copy)]
pub struct ZstdCompressor {
    pub level: i32,
}

#[cfg(feature = "zstd-compressor")]
impl Default for ZstdCompressor {
    fn default() -> Self {
        Self { level: zstd::DEFAULT_COMPRESSION_LEVEL }
    }
}

#[cfg(feature = "zstd-compressor")]
impl Compressor for ZstdCompressor {
    fn id(&self) -> CompressionId {
        CompressionId::Zstd
    }

    fn compress(&self, source: &[u8]) -> Result<Vec<u8>, CompressionError> {
        zstd::stream::encode_all(source, self.level).map_err(|e| CompressionError::Failed(e.to_string()))
    }

    fn decompress(&self, source: &[u8]) -> Result<Vec<u8>, CompressionError> {
        zstd::stream::decode_all(source).map_err(|e| CompressionError::Failed(e.to_string()))
    }
}

/// A small registry mapping [`CompressionId`] to the [`Compressor`] that handles it, used by the
/// table reader to decompress whichever compressor a block was written with.
#[derive(Debug, Default)]
pub struct CompressorList {
    none: NoneCompressor,
    #[cfg(feature = "snappy-compressor")]
    snappy: SnappyCompressor,
    #[cfg(feature = "zstd-compressor")]
    zstd: ZstdCompressor,
}

impl CompressorList {
    #[must_use]
    pub fn get(&self, id: CompressionId) -> Option<&dyn Compressor> {
        match id {
            CompressionId::None => Some(&self.none),
            #[cfg(feature = "snappy-compressor")]
            CompressionId::Snappy => Some(&self.snappy),
            #[cfg(not(feature = "snappy-compressor"))]
            CompressionId::Snappy => None,
            #[cfg(feature = "zstd-compressor")]
            CompressionId::Zstd => Some(&self.zstd),
            #[cfg(not(feature = "zstd-compressor"))]
            CompressionId::Zstd => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_compressor_round_trips() {
        let c = NoneCompressor;
        let data = b"hello world, this is not actually compressed";
        assert_eq!(c.decompress(&c.compress(data).unwrap()).unwrap(), data);
    }

    #[cfg(feature = "snappy-compressor")]
    #[test]
    fn snappy_compressor_round_trips() {
        let c = SnappyCompressor;
        let data = b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
        assert_eq!(c.decompress(&c.compress(data).unwrap()).unwrap(), data);
    }

    #[cfg(feature = "zstd-compressor")]
    #[test]
    fn zstd_compressor_round_trips() {
        let c = ZstdCompressor::default();
        let data = b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
        assert_eq!(c.decompress(&c.compress(data).unwrap()).unwrap(), data);
    }

    #[test]
    fn list_resolves_registered_compressors() {
        let list = CompressorList::default();
        assert!(list.get(CompressionId::None).is_some());
    }
}
