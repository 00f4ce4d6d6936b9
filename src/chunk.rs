use std::fmt;

use bytes::Bytes;

use crate::dtype::{DataType, Element};
use crate::index::{AxisSelection, select_linear, selected_shape};

/// A materialised block of array data: a row-major buffer of native-endian
/// elements.
#[derive(Clone, PartialEq, Eq)]
pub struct ChunkData {
    shape: Vec<u64>,
    data_type: DataType,
    bytes: Bytes,
}

impl fmt::Debug for ChunkData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkData")
            .field("shape", &self.shape)
            .field("data_type", &self.data_type)
            .field("n_bytes", &self.bytes.len())
            .finish()
    }
}

impl ChunkData {
    /// Wrap native-endian bytes.
    ///
    /// Fails if the byte length does not match the shape and type.
    pub fn new(shape: Vec<u64>, data_type: DataType, bytes: Bytes) -> crate::Result<Self> {
        let expected = shape
            .iter()
            .try_fold(data_type.size() as u64, |acc, &n| acc.checked_mul(n));
        if expected != Some(bytes.len() as u64) {
            return Err(crate::Error::general(format!(
                "{} bytes do not hold shape {shape:?} of {data_type}",
                bytes.len()
            )));
        }
        Ok(Self {
            shape,
            data_type,
            bytes,
        })
    }

    pub fn from_elements<T: Element>(shape: Vec<u64>, elements: &[T]) -> crate::Result<Self> {
        let mut bytes = Vec::with_capacity(elements.len() * T::DATA_TYPE.size());
        for el in elements {
            el.extend_ne_bytes(&mut bytes);
        }
        Self::new(shape, T::DATA_TYPE, Bytes::from(bytes))
    }

    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn num_elements(&self) -> u64 {
        self.shape.iter().product()
    }

    /// Copy the elements out as `T`, which must match the data type.
    pub fn to_vec<T: Element>(&self) -> crate::Result<Vec<T>> {
        if T::DATA_TYPE != self.data_type {
            return Err(crate::Error::general(format!(
                "cannot read {} data as {}",
                self.data_type,
                T::DATA_TYPE
            )));
        }
        Ok(self
            .bytes
            .chunks_exact(self.data_type.size())
            .map(T::from_ne_slice)
            .collect())
    }

    /// Extract the elements picked out by one selection per axis.
    pub fn extract(&self, selections: &[AxisSelection]) -> crate::Result<Self> {
        if selections.len() != self.shape.len() {
            return Err(crate::Error::index(format!(
                "{} selections given for a chunk with {} dimensions",
                selections.len(),
                self.shape.len()
            )));
        }
        for (axis, (sel, &extent)) in selections.iter().zip(&self.shape).enumerate() {
            let last = match sel {
                AxisSelection::Index(i) => Some(*i),
                AxisSelection::Range { len: 0, .. } => None,
                AxisSelection::Range { start, step, len } => Some(start + (len - 1) * step),
            };
            if last.is_some_and(|l| l >= extent) {
                return Err(crate::Error::index(format!(
                    "selection {sel:?} exceeds axis {axis} of chunk with size {extent}"
                )));
            }
        }
        if selections
            .iter()
            .zip(&self.shape)
            .all(|(sel, &extent)| sel.is_full(extent))
        {
            return Ok(self.clone());
        }

        let size = self.data_type.size();
        let indices = select_linear(&self.shape, selections);
        let mut out = Vec::with_capacity(indices.len() * size);
        for idx in indices {
            out.extend_from_slice(&self.bytes[idx * size..(idx + 1) * size]);
        }
        Self::new(selected_shape(selections), self.data_type, Bytes::from(out))
    }

    /// Stack chunks of identical shape along new leading axes of `grid_shape`.
    pub(crate) fn stack(
        grid_shape: &[u64],
        chunk_shape: &[u64],
        data_type: DataType,
        chunks: Vec<ChunkData>,
    ) -> crate::Result<Self> {
        let mut out = Vec::with_capacity(chunks.iter().map(|c| c.bytes.len()).sum());
        for chunk in chunks {
            if chunk.shape != chunk_shape || chunk.data_type != data_type {
                return Err(crate::Error::general(format!(
                    "cannot stack chunk of shape {:?} and type {} into chunks of shape {chunk_shape:?} and type {data_type}",
                    chunk.shape, chunk.data_type
                )));
            }
            out.extend_from_slice(&chunk.bytes);
        }
        let shape = grid_shape.iter().chain(chunk_shape).copied().collect();
        Self::new(shape, data_type, Bytes::from(out))
    }
}
