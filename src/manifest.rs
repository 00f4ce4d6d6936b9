use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    dtype::DataType, grid::ChunkGrid, loader::LoaderId, reference::ChunkReference,
};

/// A value shared by every reference, or one value per reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T: Clone + PartialEq> OneOrMany<T> {
    /// Collapse to [`OneOrMany::One`] when every value is equal.
    pub fn collapse(mut values: Vec<T>) -> Self {
        let all_equal = values
            .first()
            .is_some_and(|first| values.iter().all(|v| v == first));
        if all_equal {
            Self::One(values.swap_remove(0))
        } else {
            Self::Many(values)
        }
    }

    fn expand(&self, n: usize, field: &str) -> crate::Result<Vec<T>> {
        match self {
            Self::One(v) => Ok(vec![v.clone(); n]),
            Self::Many(vs) if vs.len() == n => Ok(vs.clone()),
            Self::Many(vs) => Err(crate::Error::manifest(format!(
                "{field} has {} entries for {n} file URIs",
                vs.len()
            ))),
        }
    }
}

/// The persisted description of a reference grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Relative URIs, one per grid cell, in row-major order.
    pub fileuris: Vec<String>,
    /// Per-reference locator within each file.
    pub target: OneOrMany<u64>,
    pub datatype: OneOrMany<DataType>,
    /// Shape of the grid of files.
    pub shape: Vec<u64>,
    /// Shape of the data within each file.
    pub chunk_shape: OneOrMany<Vec<u64>>,
    /// Name of the registered loader for the files.
    #[serde(default = "default_loader")]
    pub loader: String,
}

fn default_loader() -> String {
    LoaderId::default().name().to_string()
}

impl Manifest {
    /// Describe `grid`, to be read with `loader`.
    pub fn from_grid(grid: &ChunkGrid, loader: LoaderId) -> Self {
        let refs = grid.references();
        Self {
            fileuris: refs.iter().map(|r| r.uri().to_string()).collect(),
            target: OneOrMany::collapse(refs.iter().map(|r| r.target()).collect()),
            datatype: OneOrMany::One(grid.data_type()),
            shape: grid.shape().to_vec(),
            chunk_shape: OneOrMany::One(grid.chunk_shape().to_vec()),
            loader: loader.name().to_string(),
        }
    }

    /// The loader named by this manifest.
    pub fn loader_id(&self) -> crate::Result<LoaderId> {
        LoaderId::from_name(&self.loader)
            .ok_or_else(|| crate::Error::manifest(format!("unknown loader {:?}", self.loader)))
    }

    /// Rebuild the reference grid, validating its consistency.
    pub fn to_grid(&self) -> crate::Result<ChunkGrid> {
        let n = self.fileuris.len();
        let targets = self.target.expand(n, "target")?;
        let datatypes = self.datatype.expand(n, "datatype")?;
        let chunk_shapes = self.chunk_shape.expand(n, "chunk_shape")?;

        let references = self
            .fileuris
            .iter()
            .zip(targets)
            .zip(datatypes)
            .zip(chunk_shapes)
            .map(|(((uri, target), dt), shape)| ChunkReference::new(uri.clone(), target, dt, shape))
            .collect();
        ChunkGrid::new(self.shape.clone(), references)
    }
}

impl TryFrom<&Manifest> for ChunkGrid {
    type Error = crate::Error;

    fn try_from(value: &Manifest) -> Result<Self, Self::Error> {
        value.to_grid()
    }
}

/// A dataset as persisted next to its files: free-form metadata plus the
/// manifest of its data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetDocument {
    #[serde(default)]
    pub meta: serde_json::Map<String, serde_json::Value>,
    pub data: Manifest,
}

impl DatasetDocument {
    pub fn read(path: &Path) -> crate::Result<Self> {
        let file = std::fs::File::open(path)?;
        serde_json::from_reader(std::io::BufReader::new(file)).map_err(|e| {
            crate::Error::manifest(format!("{} is not a valid dataset document: {e}", path.display()))
        })
    }

    pub fn write(&self, path: &Path) -> crate::Result<()> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), self)?;
        Ok(())
    }
}
