use std::fmt;

use serde::{Deserialize, Serialize};

/// Numeric element type shared by every chunk of an array.
///
/// Serialized with the same names N5 uses (`"uint8"`, `"float32"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Uint8,
    Int8,
    Uint16,
    Int16,
    Uint32,
    Int32,
    Uint64,
    Int64,
    Float32,
    Float64,
}

impl DataType {
    /// Size of one element in bytes.
    pub const fn size(&self) -> usize {
        match self {
            DataType::Uint8 | DataType::Int8 => 1,
            DataType::Uint16 | DataType::Int16 => 2,
            DataType::Uint32 | DataType::Int32 | DataType::Float32 => 4,
            DataType::Uint64 | DataType::Int64 | DataType::Float64 => 8,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            DataType::Uint8 => "uint8",
            DataType::Int8 => "int8",
            DataType::Uint16 => "uint16",
            DataType::Int16 => "int16",
            DataType::Uint32 => "uint32",
            DataType::Int32 => "int32",
            DataType::Uint64 => "uint64",
            DataType::Int64 => "int64",
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
        }
    }

    /// Map a FITS `BITPIX` value to a data type.
    pub fn from_bitpix(bitpix: i64) -> crate::Result<Self> {
        let dt = match bitpix {
            8 => DataType::Uint8,
            16 => DataType::Int16,
            32 => DataType::Int32,
            64 => DataType::Int64,
            -32 => DataType::Float32,
            -64 => DataType::Float64,
            n => return Err(crate::Error::general(format!("invalid BITPIX {n}"))),
        };
        Ok(dt)
    }

    /// The FITS `BITPIX` value for this type, if FITS can store it directly.
    pub fn bitpix(&self) -> Option<i64> {
        match self {
            DataType::Uint8 => Some(8),
            DataType::Int16 => Some(16),
            DataType::Int32 => Some(32),
            DataType::Int64 => Some(64),
            DataType::Float32 => Some(-32),
            DataType::Float64 => Some(-64),
            _ => None,
        }
    }

    /// Convert big-endian element bytes to native order.
    pub(crate) fn big_endian_to_native(&self, bytes: &[u8]) -> Vec<u8> {
        let size = self.size();
        if size == 1 || cfg!(target_endian = "big") {
            return bytes.to_vec();
        }
        let mut out = Vec::with_capacity(bytes.len());
        for el in bytes.chunks_exact(size) {
            out.extend(el.iter().rev());
        }
        out
    }

    /// Convert native element bytes to big-endian order.
    pub(crate) fn native_to_big_endian(&self, bytes: &[u8]) -> Vec<u8> {
        // byte swapping is its own inverse
        self.big_endian_to_native(bytes)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A Rust scalar type which can be stored in a chunk.
pub trait Element: Copy + Send + Sync + 'static {
    const DATA_TYPE: DataType;

    fn from_ne_slice(bytes: &[u8]) -> Self;

    fn extend_ne_bytes(&self, out: &mut Vec<u8>);
}

macro_rules! impl_element {
    ($t:ty, $dt:ident) => {
        impl Element for $t {
            const DATA_TYPE: DataType = DataType::$dt;

            fn from_ne_slice(bytes: &[u8]) -> Self {
                let mut buf = [0u8; size_of::<$t>()];
                buf.copy_from_slice(bytes);
                <$t>::from_ne_bytes(buf)
            }

            fn extend_ne_bytes(&self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_ne_bytes());
            }
        }
    };
}

impl_element!(u8, Uint8);
impl_element!(i8, Int8);
impl_element!(u16, Uint16);
impl_element!(i16, Int16);
impl_element!(u32, Uint32);
impl_element!(i32, Int32);
impl_element!(u64, Uint64);
impl_element!(i64, Int64);
impl_element!(f32, Float32);
impl_element!(f64, Float64);
