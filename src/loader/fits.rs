//! Uncompressed FITS image HDUs.
//!
//! Only what is needed to locate and decode an image HDU is implemented:
//! header cards are scanned for `SIMPLE`/`XTENSION`, `BITPIX`, `NAXISn`,
//! `PCOUNT` and `GCOUNT`. Scaling keywords (`BZERO`/`BSCALE`) are not applied.

use std::path::Path;

use bytes::Bytes;
use zarrs::storage::ReadableStorageTraits;

use super::{Loader, LoaderPlugin, as_mismatch, check_against_reference};
use crate::chunk::ChunkData;
use crate::dtype::DataType;
use crate::reference::ChunkReference;
use crate::storage::{ReferenceStore, StoredObject};

inventory::submit! {
    LoaderPlugin::new("fits", &FitsLoader)
}

const BLOCK: u64 = 2880;
const CARD: usize = 80;

/// Loader for image HDUs of FITS files; the reference target is the HDU index.
///
/// Only the header blocks of the HDUs up to the target and the target's data
/// unit are read.
#[derive(Debug, Clone, Copy, Default)]
pub struct FitsLoader;

impl Loader for FitsLoader {
    fn read(&self, reference: &ChunkReference, basepath: &Path) -> crate::Result<ChunkData> {
        let store = ReferenceStore::open(basepath)?;
        let file = store.object(reference.uri())?;
        let mismatch = |e| as_mismatch(reference.uri(), e);

        let hdu = find_hdu(&file, reference.target()).map_err(mismatch)?;
        let data_type = DataType::from_bitpix(hdu.header.bitpix).map_err(mismatch)?;
        let shape = hdu.header.shape();
        check_against_reference(reference, &shape, data_type)?;

        let data = file.read(hdu.data_offset, hdu.data_len).map_err(mismatch)?;
        let native = data_type.big_endian_to_native(&data);
        ChunkData::new(shape, data_type, Bytes::from(native))
    }
}

/// The structural keywords of one HDU header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FitsHeader {
    /// `XTENSION` value; `None` for the primary HDU.
    pub xtension: Option<String>,
    pub bitpix: i64,
    /// `NAXIS1..NAXISn`, fastest-varying first.
    pub axes: Vec<u64>,
    pub pcount: u64,
    pub gcount: u64,
}

impl FitsHeader {
    /// Row-major array shape (the reverse of the `NAXISn` order).
    pub fn shape(&self) -> Vec<u64> {
        self.axes.iter().rev().copied().collect()
    }

    pub fn is_image(&self) -> bool {
        match &self.xtension {
            None => true,
            Some(x) => x == "IMAGE",
        }
    }

    /// Unpadded size of the data unit in bytes.
    fn data_len(&self) -> crate::Result<u64> {
        if self.axes.is_empty() {
            return Ok(0);
        }
        self.axes
            .iter()
            .try_fold(1u64, |acc, &n| acc.checked_mul(n))
            .and_then(|n| n.checked_add(self.pcount))
            .and_then(|n| n.checked_mul(self.gcount))
            .and_then(|n| n.checked_mul(self.bitpix.unsigned_abs() / 8))
            .ok_or_else(|| {
                crate::Error::general(format!(
                    "data unit size overflows: axes {:?}, PCOUNT {}, GCOUNT {}",
                    self.axes, self.pcount, self.gcount
                ))
            })
    }
}

#[derive(Debug)]
struct Hdu {
    header: FitsHeader,
    data_offset: u64,
    data_len: u64,
}

fn padded(len: u64) -> crate::Result<u64> {
    len.checked_next_multiple_of(BLOCK)
        .ok_or_else(|| crate::Error::general(format!("length {len} overflows when padded")))
}

fn card_value(card: &str) -> Option<&str> {
    if card.get(8..10) != Some("= ") {
        return None;
    }
    let raw = card.get(10..)?.trim_start();
    if let Some(rest) = raw.strip_prefix('\'') {
        return rest.find('\'').map(|end| rest[..end].trim_end());
    }
    Some(raw.split('/').next().unwrap_or_default().trim())
}

fn parse_int(keyword: &str, value: Option<&str>) -> crate::Result<i64> {
    value
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| crate::Error::general(format!("keyword {keyword} has no integer value")))
}

fn parse_count(keyword: &str, value: Option<&str>) -> crate::Result<u64> {
    let n = parse_int(keyword, value)?;
    u64::try_from(n)
        .map_err(|_| crate::Error::general(format!("keyword {keyword} is negative: {n}")))
}

/// Parse the header starting at `offset`, returning it with its padded length.
fn parse_header<R: ReadableStorageTraits>(
    file: &StoredObject<'_, R>,
    offset: u64,
) -> crate::Result<(FitsHeader, u64)> {
    let mut xtension = None;
    let mut bitpix = None;
    let mut naxis = None;
    let mut axes: Vec<(usize, u64)> = Vec::new();
    let mut pcount = 0;
    let mut gcount = 1;

    let mut block_start = offset;
    'blocks: loop {
        if file.size().saturating_sub(block_start) < BLOCK {
            return Err(crate::Error::general("header has no END card"));
        }
        let block = file.read(block_start, BLOCK)?;
        if !block.is_ascii() {
            return Err(crate::Error::general("header is not ASCII"));
        }
        let block = std::str::from_utf8(&block).map_err(crate::Error::wrap)?;

        for i in 0..BLOCK as usize / CARD {
            let card = &block[i * CARD..(i + 1) * CARD];
            let keyword = card[..8].trim_end();
            if block_start == offset
                && i == 0
                && keyword != "SIMPLE"
                && keyword != "XTENSION"
            {
                return Err(crate::Error::general(format!(
                    "HDU starts with {keyword:?}, not SIMPLE or XTENSION"
                )));
            }
            let value = card_value(card);
            match keyword {
                "END" => break 'blocks,
                "XTENSION" => xtension = value.map(str::to_string),
                "BITPIX" => bitpix = Some(parse_int(keyword, value)?),
                "NAXIS" => naxis = Some(parse_count(keyword, value)?),
                "PCOUNT" => pcount = parse_count(keyword, value)?,
                "GCOUNT" => gcount = parse_count(keyword, value)?,
                k => {
                    if let Some(n) = k.strip_prefix("NAXIS").and_then(|n| n.parse::<usize>().ok()) {
                        axes.push((n, parse_count(k, value)?));
                    }
                }
            }
        }
        block_start += BLOCK;
    }

    let bitpix = bitpix.ok_or_else(|| crate::Error::general("header has no BITPIX"))?;
    let naxis = naxis.ok_or_else(|| crate::Error::general("header has no NAXIS"))?;
    axes.sort_by_key(|(n, _)| *n);
    if axes.len() as u64 != naxis || axes.iter().enumerate().any(|(i, (n, _))| *n != i + 1) {
        return Err(crate::Error::general(format!(
            "NAXIS is {naxis} but found axes {:?}",
            axes.iter().map(|(n, _)| n).collect::<Vec<_>>()
        )));
    }

    let header = FitsHeader {
        xtension,
        bitpix,
        axes: axes.into_iter().map(|(_, len)| len).collect(),
        pcount,
        gcount,
    };
    Ok((header, block_start + BLOCK - offset))
}

/// Locate image HDU `index` (0 is the primary HDU).
fn find_hdu<R: ReadableStorageTraits>(
    file: &StoredObject<'_, R>,
    index: u64,
) -> crate::Result<Hdu> {
    let overflow = || crate::Error::general("HDU offsets overflow");
    let mut offset = 0;
    let mut current = 0;
    loop {
        if offset >= file.size() {
            return Err(crate::Error::general(format!(
                "file has only {current} HDUs, HDU {index} requested"
            )));
        }
        let (header, header_len) = parse_header(file, offset)?;
        let data_offset = offset.checked_add(header_len).ok_or_else(overflow)?;
        let data_len = header.data_len()?;
        if current == index {
            if !header.is_image() {
                return Err(crate::Error::general(format!(
                    "HDU {index} is a {} extension, not an image",
                    header.xtension.as_deref().unwrap_or_default()
                )));
            }
            return Ok(Hdu {
                header,
                data_offset,
                data_len,
            });
        }
        offset = data_offset
            .checked_add(padded(data_len)?)
            .ok_or_else(overflow)?;
        current += 1;
    }
}

/// Read the header of HDU `hdu` from a FITS file on disk.
pub fn read_header(path: &Path, hdu: u64) -> crate::Result<FitsHeader> {
    let uri = path.display().to_string();
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| crate::Error::source_unavailable(&uri, "not a UTF-8 file name"))?;
    let directory = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let store = ReferenceStore::open(directory)?;
    let file = store.object(name)?;
    find_hdu(&file, hdu)
        .map(|h| h.header)
        .map_err(|e| as_mismatch(&uri, e))
}

fn push_card(out: &mut Vec<u8>, keyword: &str, value: &str) {
    let card = format!("{keyword:<8}= {value:>20}");
    out.extend_from_slice(format!("{card:<80}").as_bytes());
}

/// Encode `data` as a single-HDU FITS file.
///
/// # Errors
/// Fails if the data type has no FITS `BITPIX` equivalent.
pub fn encode_image(data: &ChunkData) -> crate::Result<Vec<u8>> {
    let bitpix = data.data_type().bitpix().ok_or_else(|| {
        crate::Error::general(format!("FITS cannot store {} data", data.data_type()))
    })?;
    let mut out = Vec::new();
    push_card(&mut out, "SIMPLE", "T");
    push_card(&mut out, "BITPIX", &bitpix.to_string());
    push_card(&mut out, "NAXIS", &data.shape().len().to_string());
    for (i, len) in data.shape().iter().rev().enumerate() {
        push_card(&mut out, &format!("NAXIS{}", i + 1), &len.to_string());
    }
    out.extend_from_slice(format!("{:<80}", "END").as_bytes());
    out.resize(out.len().next_multiple_of(BLOCK as usize), b' ');

    out.extend(data.data_type().native_to_big_endian(data.bytes()));
    out.resize(out.len().next_multiple_of(BLOCK as usize), 0);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, data: &ChunkData) {
        std::fs::write(dir.join(name), encode_image(data).unwrap()).unwrap();
    }

    #[test]
    fn encoded_image_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let values: Vec<f32> = (0..6).map(|i| i as f32 * 0.5).collect();
        let data = ChunkData::from_elements(vec![2, 3], &values).unwrap();
        write(dir.path(), "img.fits", &data);

        let header = read_header(&dir.path().join("img.fits"), 0).unwrap();
        assert_eq!(header.axes, vec![3, 2]);
        assert_eq!(header.shape(), vec![2, 3]);

        let r = ChunkReference::new("img.fits", 0, DataType::Float32, vec![2, 3]);
        let read = FitsLoader.read(&r, dir.path()).unwrap();
        assert_eq!(read, data);
    }

    #[test]
    fn mismatched_reference_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let data = ChunkData::from_elements(vec![2, 2], &[1i16, 2, 3, 4]).unwrap();
        write(dir.path(), "img.fits", &data);

        let wrong_type = ChunkReference::new("img.fits", 0, DataType::Float32, vec![2, 2]);
        assert!(matches!(
            FitsLoader.read(&wrong_type, dir.path()),
            Err(crate::Error::FormatMismatch { .. })
        ));
        let wrong_shape = ChunkReference::new("img.fits", 0, DataType::Int16, vec![4]);
        assert!(matches!(
            FitsLoader.read(&wrong_shape, dir.path()),
            Err(crate::Error::FormatMismatch { .. })
        ));
        let wrong_hdu = ChunkReference::new("img.fits", 1, DataType::Int16, vec![2, 2]);
        assert!(matches!(
            FitsLoader.read(&wrong_hdu, dir.path()),
            Err(crate::Error::FormatMismatch { .. })
        ));
    }

    #[test]
    fn missing_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let r = ChunkReference::new("gone.fits", 0, DataType::Int16, vec![2, 2]);
        assert!(matches!(
            FitsLoader.read(&r, dir.path()),
            Err(crate::Error::SourceUnavailable { .. })
        ));
    }

    fn header(cards: &[(&str, &str)]) -> Vec<u8> {
        let mut out = Vec::new();
        for (keyword, value) in cards {
            push_card(&mut out, keyword, value);
        }
        out.extend_from_slice(format!("{:<80}", "END").as_bytes());
        out.resize(out.len().next_multiple_of(BLOCK as usize), b' ');
        out
    }

    fn read_raw(bytes: &[u8], reference: &ChunkReference) -> crate::Result<ChunkData> {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(reference.uri()), bytes).unwrap();
        FitsLoader.read(reference, dir.path())
    }

    #[test]
    fn reads_image_extension() {
        let mut bytes = header(&[("SIMPLE", "T"), ("BITPIX", "8"), ("NAXIS", "0"), ("EXTEND", "T")]);
        bytes.extend(header(&[
            ("XTENSION", "'IMAGE   '"),
            ("BITPIX", "16"),
            ("NAXIS", "1"),
            ("NAXIS1", "3"),
            ("PCOUNT", "0"),
            ("GCOUNT", "1"),
        ]));
        for v in [7i16, -1, 300] {
            bytes.extend_from_slice(&v.to_be_bytes());
        }
        bytes.resize(bytes.len().next_multiple_of(BLOCK as usize), 0);

        let r = ChunkReference::new("ext.fits", 1, DataType::Int16, vec![3]);
        let read = read_raw(&bytes, &r).unwrap();
        assert_eq!(read.to_vec::<i16>().unwrap(), vec![7, -1, 300]);
    }

    #[test]
    fn oversized_preceding_hdu_is_a_mismatch() {
        let huge = i64::MAX.to_string();
        let bytes = header(&[
            ("SIMPLE", "T"),
            ("BITPIX", "-64"),
            ("NAXIS", "2"),
            ("NAXIS1", huge.as_str()),
            ("NAXIS2", huge.as_str()),
        ]);
        let next = ChunkReference::new("big.fits", 1, DataType::Int16, vec![3]);
        assert!(matches!(
            read_raw(&bytes, &next),
            Err(crate::Error::FormatMismatch { .. })
        ));
        let first = ChunkReference::new("big.fits", 0, DataType::Float64, vec![3]);
        assert!(matches!(
            read_raw(&bytes, &first),
            Err(crate::Error::FormatMismatch { .. })
        ));
    }

    #[test]
    fn negative_counts_are_a_mismatch() {
        let r = ChunkReference::new("neg.fits", 0, DataType::Int16, vec![2]);
        for (keyword, value) in [("NAXIS1", "-2"), ("GCOUNT", "-1"), ("PCOUNT", "-4")] {
            let mut cards = vec![("SIMPLE", "T"), ("BITPIX", "16"), ("NAXIS", "1")];
            if keyword == "NAXIS1" {
                cards.push((keyword, value));
            } else {
                cards.extend([("NAXIS1", "2"), (keyword, value)]);
            }
            assert!(matches!(
                read_raw(&header(&cards), &r),
                Err(crate::Error::FormatMismatch { .. })
            ));
        }
    }

    #[test]
    fn truncated_data_is_a_mismatch() {
        let data = ChunkData::from_elements(vec![40, 40], &vec![1i32; 1600]).unwrap();
        let mut bytes = encode_image(&data).unwrap();
        bytes.truncate(BLOCK as usize * 2);
        let r = ChunkReference::new("cut.fits", 0, DataType::Int32, vec![40, 40]);
        assert!(matches!(
            read_raw(&bytes, &r),
            Err(crate::Error::FormatMismatch { .. })
        ));

        let no_end = &encode_image(&data).unwrap()[..CARD * 4];
        assert!(matches!(
            read_raw(no_end, &r),
            Err(crate::Error::FormatMismatch { .. })
        ));
    }
}
