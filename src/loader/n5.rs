//! Uncompressed N5 blocks.

use std::path::Path;

use bytes::Bytes;

use super::{Loader, LoaderPlugin, as_mismatch, check_against_reference};
use crate::chunk::ChunkData;
use crate::reference::ChunkReference;
use crate::storage::ReferenceStore;

inventory::submit! {
    LoaderPlugin::new("n5-block", &N5BlockLoader)
}

#[derive(Debug, Clone)]
pub(crate) struct N5BlockHeader {
    pub(crate) mode: N5BlockMode,
    /// Column-major.
    pub(crate) shape: Vec<u32>,
}

#[derive(Debug, Clone, Copy)]
#[repr(u16)]
pub(crate) enum N5BlockMode {
    Default = 0,
    #[allow(unused)]
    VarLen { num_el: u32 } = 1,
    Object = 2,
}

fn read_u16(bytes: &[u8], offset: usize) -> crate::Result<u16> {
    bytes
        .get(offset..offset + 2)
        .and_then(|b| b.try_into().ok())
        .map(u16::from_be_bytes)
        .ok_or_else(|| crate::Error::general("N5 block header is truncated"))
}

fn read_u32(bytes: &[u8], offset: usize) -> crate::Result<u32> {
    bytes
        .get(offset..offset + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_be_bytes)
        .ok_or_else(|| crate::Error::general("N5 block header is truncated"))
}

impl N5BlockHeader {
    pub(crate) fn from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        let mut offset: usize = 0;

        let mode_num = read_u16(bytes, offset)?;
        offset += 2;
        let ndim = read_u16(bytes, offset)?;
        offset += 2;
        let mut shape = Vec::with_capacity(ndim as usize);
        for _ in 0..ndim {
            shape.push(read_u32(bytes, offset)?);
            offset += 4;
        }

        let mode = match mode_num {
            0 => N5BlockMode::Default,
            1 => N5BlockMode::VarLen {
                num_el: read_u32(bytes, offset)?,
            },
            2 => N5BlockMode::Object,
            n => return Err(crate::Error::general(format!("invalid N5 block mode {n}"))),
        };
        Ok(N5BlockHeader { mode, shape })
    }

    pub(crate) fn data_offset(&self) -> usize {
        size_of::<u16>()  // mode discriminator
            + size_of::<u16>() // ndim
            + self.shape.len() * size_of::<u32>()  // shape
            + match self.mode {
                N5BlockMode::VarLen { .. } => size_of::<u32>(),
                _ => 0,
            }
    }

    /// Row-major shape.
    pub(crate) fn array_shape(&self) -> Vec<u64> {
        self.shape.iter().rev().map(|&n| n as u64).collect()
    }
}

/// Loader for raw (uncompressed) default-mode N5 blocks; the reference
/// target is the byte offset of the block header within the file.
#[derive(Debug, Clone, Copy, Default)]
pub struct N5BlockLoader;

impl Loader for N5BlockLoader {
    fn read(&self, reference: &ChunkReference, basepath: &Path) -> crate::Result<ChunkData> {
        let store = ReferenceStore::open(basepath)?;
        let file = store.object(reference.uri())?;
        let mismatch = |e| as_mismatch(reference.uri(), e);

        let start = reference.target();
        let prefix = file.read(start, 4).map_err(mismatch)?;
        let mode = read_u16(&prefix, 0).map_err(mismatch)?;
        let ndim = u64::from(read_u16(&prefix, 2).map_err(mismatch)?);
        let header_len = 4 + ndim * 4 + if mode == 1 { 4 } else { 0 };
        let header = file
            .read(start, header_len)
            .and_then(|b| N5BlockHeader::from_bytes(&b))
            .map_err(mismatch)?;
        if !matches!(header.mode, N5BlockMode::Default) {
            return Err(mismatch(crate::Error::general(format!(
                "unsupported N5 block mode: {:?}",
                header.mode
            ))));
        }

        let shape = header.array_shape();
        let data_type = reference.data_type();
        check_against_reference(reference, &shape, data_type)?;

        let len = shape
            .iter()
            .try_fold(data_type.size() as u64, |acc, &n| acc.checked_mul(n))
            .ok_or_else(|| mismatch(crate::Error::general("block size overflows")))?;
        let payload = file
            .read(start + header.data_offset() as u64, len)
            .map_err(mismatch)?;
        ChunkData::new(
            shape,
            data_type,
            Bytes::from(data_type.big_endian_to_native(&payload)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::DataType;

    fn encode_block(shape_col_major: &[u32], payload_be: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&0u16.to_be_bytes());
        out.extend_from_slice(&(shape_col_major.len() as u16).to_be_bytes());
        for n in shape_col_major {
            out.extend_from_slice(&n.to_be_bytes());
        }
        out.extend_from_slice(payload_be);
        out
    }

    #[test]
    fn parses_varlen_header() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1u16.to_be_bytes());
        bytes.extend_from_slice(&1u16.to_be_bytes());
        bytes.extend_from_slice(&5u32.to_be_bytes());
        bytes.extend_from_slice(&9u32.to_be_bytes());
        let header = N5BlockHeader::from_bytes(&bytes).unwrap();
        assert!(matches!(header.mode, N5BlockMode::VarLen { num_el: 9 }));
        assert_eq!(header.data_offset(), 12);
        assert!(N5BlockHeader::from_bytes(&bytes[..6]).is_err());
    }

    #[test]
    fn reads_block_at_offset() {
        let mut payload = Vec::new();
        for v in [1u16, 2, 3, 4, 5, 6] {
            payload.extend_from_slice(&v.to_be_bytes());
        }
        // 3 columns, 2 rows
        let mut file = vec![0xff; 16];
        file.extend(encode_block(&[3, 2], &payload));

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("0"), &file).unwrap();

        let r = ChunkReference::new("0", 16, DataType::Uint16, vec![2, 3]);
        let data = N5BlockLoader.read(&r, dir.path()).unwrap();
        assert_eq!(data.shape(), &[2, 3]);
        assert_eq!(data.to_vec::<u16>().unwrap(), vec![1, 2, 3, 4, 5, 6]);

        let wrong = ChunkReference::new("0", 16, DataType::Uint16, vec![3, 2]);
        assert!(matches!(
            N5BlockLoader.read(&wrong, dir.path()),
            Err(crate::Error::FormatMismatch { .. })
        ));
    }

    #[test]
    fn short_files_are_a_mismatch() {
        let block = encode_block(&[4, 4], &[0; 10]);
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("0"), &block).unwrap();

        let short_payload = ChunkReference::new("0", 0, DataType::Uint8, vec![4, 4]);
        assert!(matches!(
            N5BlockLoader.read(&short_payload, dir.path()),
            Err(crate::Error::FormatMismatch { .. })
        ));
        let past_end = ChunkReference::new("0", 1_000, DataType::Uint8, vec![4, 4]);
        assert!(matches!(
            N5BlockLoader.read(&past_end, dir.path()),
            Err(crate::Error::FormatMismatch { .. })
        ));
    }
}
