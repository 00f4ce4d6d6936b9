use std::collections::HashSet;
use std::sync::Arc;

use crate::dtype::DataType;
use crate::index::{AxisSelection, select_linear, selected_shape};
use crate::reference::ChunkReference;

/// Number of cells in a grid of `shape`.
///
/// # Errors
/// Returns [`Error::Manifest`](crate::Error::Manifest) if the count overflows.
pub fn num_cells(shape: &[u64]) -> crate::Result<u64> {
    shape
        .iter()
        .try_fold(1u64, |acc, &n| acc.checked_mul(n))
        .ok_or_else(|| crate::Error::manifest(format!("grid shape {shape:?} has too many cells")))
}

/// A row-major n-dimensional arrangement of [`ChunkReference`]s.
///
/// Every reference has the same data type and shape, so a grid of shape
/// `G` describes an array of shape `G ++ chunk_shape`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkGrid {
    shape: Vec<u64>,
    chunk_shape: Vec<u64>,
    data_type: DataType,
    references: Vec<Arc<ChunkReference>>,
}

impl ChunkGrid {
    /// Build a grid of `shape` from references in row-major order.
    ///
    /// # Errors
    /// Returns [`Error::Manifest`](crate::Error::Manifest) if the number of
    /// references does not fill the grid, the grid is empty, or the
    /// references disagree on data type or shape.
    pub fn new(shape: Vec<u64>, references: Vec<ChunkReference>) -> crate::Result<Self> {
        let n_cells = num_cells(&shape)?;
        if n_cells != references.len() as u64 {
            return Err(crate::Error::manifest(format!(
                "grid of shape {shape:?} needs {n_cells} references, got {}",
                references.len()
            )));
        }
        let Some(first) = references.first() else {
            return Err(crate::Error::manifest("grid contains no references"));
        };
        let data_type = first.data_type();
        let chunk_shape = first.shape().to_vec();

        for r in &references {
            if r.data_type() != data_type {
                return Err(crate::Error::manifest(format!(
                    "not all references share a data type: {} is {}, expected {data_type}",
                    r.uri(),
                    r.data_type()
                )));
            }
            if r.shape() != chunk_shape {
                return Err(crate::Error::manifest(format!(
                    "not all references share a shape: {} is {:?}, expected {chunk_shape:?}",
                    r.uri(),
                    r.shape()
                )));
            }
        }

        Ok(Self {
            shape,
            chunk_shape,
            data_type,
            references: references.into_iter().map(Arc::new).collect(),
        })
    }

    /// Grid shape (not including per-chunk axes).
    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    pub fn chunk_shape(&self) -> &[u64] {
        &self.chunk_shape
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Shape of the full logical array, grid axes outermost.
    pub fn array_shape(&self) -> Vec<u64> {
        self.shape.iter().chain(&self.chunk_shape).copied().collect()
    }

    pub fn references(&self) -> &[Arc<ChunkReference>] {
        &self.references
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }

    /// Relative URIs of the referenced files in flattening order, each once.
    pub fn filenames(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.references
            .iter()
            .filter(|r| seen.insert(r.uri()))
            .map(|r| r.uri().to_string())
            .collect()
    }

    /// Narrow the grid with one normalised selection per grid axis.
    pub fn select(&self, selections: &[AxisSelection]) -> crate::Result<Self> {
        if selections.len() != self.shape.len() {
            return Err(crate::Error::index(format!(
                "{} selections given for a grid with {} dimensions",
                selections.len(),
                self.shape.len()
            )));
        }
        let references = select_linear(&self.shape, selections)
            .into_iter()
            .map(|i| self.references[i].clone())
            .collect();
        Ok(Self {
            shape: selected_shape(selections),
            chunk_shape: self.chunk_shape.clone(),
            data_type: self.data_type,
            references,
        })
    }
}
