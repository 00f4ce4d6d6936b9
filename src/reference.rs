use serde::{Deserialize, Serialize};

use crate::dtype::DataType;

/// Immutable description of one backing file's contribution to an array.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkReference {
    /// Path of the file relative to the array's base path.
    uri: String,
    /// Locator within the file, interpreted by the loader
    /// (an HDU index for FITS, a byte offset for N5 blocks).
    target: u64,
    data_type: DataType,
    /// Row-major shape of the data held by the file.
    shape: Vec<u64>,
}

impl ChunkReference {
    pub fn new(uri: impl Into<String>, target: u64, data_type: DataType, shape: Vec<u64>) -> Self {
        Self {
            uri: uri.into(),
            target,
            data_type,
            shape,
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn target(&self) -> u64 {
        self.target
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn shape(&self) -> &[u64] {
        &self.shape
    }
}
