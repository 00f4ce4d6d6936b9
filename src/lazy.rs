//! Lazily evaluated arrays assembled from independent chunk nodes.
//!
//! A [`LazyArray`] is a flat graph of [`ChunkNode`]s keyed by their grid
//! coordinate. Grid axes are outermost; each node contributes exactly one
//! position along every grid axis and its whole (possibly sub-selected)
//! chunk along the remaining axes. Nodes are pure: computing one depends only
//! on its reference, base path and loader, so nodes may be evaluated in any
//! order, concurrently, and repeatedly.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;

use crate::chunk::ChunkData;
use crate::dtype::DataType;
use crate::grid::ChunkGrid;
use crate::index::{AxisSelection, IndexItem, normalize, select_linear, selected_shape};
use crate::loader::LoaderId;
use crate::reference::ChunkReference;

#[derive(Debug, Clone)]
enum ChunkSource {
    External {
        reference: Arc<ChunkReference>,
        basepath: Arc<PathBuf>,
        loader: LoaderId,
    },
    Memory(ChunkData),
}

/// One independently computable chunk.
#[derive(Debug, Clone)]
pub struct ChunkNode {
    key: Vec<u64>,
    source: ChunkSource,
}

impl ChunkNode {
    /// Grid coordinate of this chunk.
    pub fn key(&self) -> &[u64] {
        &self.key
    }

    /// The file reference, if the chunk is backed by a file.
    pub fn reference(&self) -> Option<&ChunkReference> {
        match &self.source {
            ChunkSource::External { reference, .. } => Some(reference.as_ref()),
            ChunkSource::Memory(_) => None,
        }
    }

    pub fn basepath(&self) -> Option<&Path> {
        match &self.source {
            ChunkSource::External { basepath, .. } => Some(basepath.as_path()),
            ChunkSource::Memory(_) => None,
        }
    }

    /// Read the whole chunk.
    pub fn compute(&self) -> crate::Result<ChunkData> {
        match &self.source {
            ChunkSource::External {
                reference,
                basepath,
                loader,
            } => {
                log::trace!(
                    "reading chunk {:?} from {} with {loader} loader",
                    self.key,
                    reference.uri()
                );
                loader.loader()?.read(reference, basepath)
            }
            ChunkSource::Memory(data) => Ok(data.clone()),
        }
    }

    fn rebased(&self, new_basepath: &Arc<PathBuf>) -> Self {
        let source = match &self.source {
            ChunkSource::External {
                reference, loader, ..
            } => ChunkSource::External {
                reference: reference.clone(),
                basepath: new_basepath.clone(),
                loader: *loader,
            },
            memory => memory.clone(),
        };
        Self {
            key: self.key.clone(),
            source,
        }
    }
}

fn unravel(mut linear: u64, shape: &[u64]) -> Vec<u64> {
    let mut coords = vec![0; shape.len()];
    for (c, &s) in coords.iter_mut().zip(shape).rev() {
        *c = linear % s;
        linear /= s;
    }
    coords
}

/// An array whose data is only read when computed.
#[derive(Debug, Clone)]
pub struct LazyArray {
    data_type: DataType,
    grid_shape: Vec<u64>,
    /// Native shape of every chunk.
    chunk_shape: Vec<u64>,
    /// Selection applied to each chunk, one per native chunk axis.
    inner: Vec<AxisSelection>,
    nodes: Vec<ChunkNode>,
}

impl LazyArray {
    /// One node per grid cell, reading through `loader` relative to `basepath`.
    pub(crate) fn from_grid(grid: &ChunkGrid, basepath: Arc<PathBuf>, loader: LoaderId) -> Self {
        let nodes = grid
            .references()
            .iter()
            .enumerate()
            .map(|(i, reference)| ChunkNode {
                key: unravel(i as u64, grid.shape()),
                source: ChunkSource::External {
                    reference: reference.clone(),
                    basepath: basepath.clone(),
                    loader,
                },
            })
            .collect();
        Self {
            data_type: grid.data_type(),
            grid_shape: grid.shape().to_vec(),
            chunk_shape: grid.chunk_shape().to_vec(),
            inner: grid
                .chunk_shape()
                .iter()
                .map(|&n| AxisSelection::full(n))
                .collect(),
            nodes,
        }
    }

    /// A single-chunk array over in-memory data.
    pub fn from_data(data: ChunkData) -> Self {
        Self {
            data_type: data.data_type(),
            grid_shape: Vec::new(),
            chunk_shape: data.shape().to_vec(),
            inner: data.shape().iter().map(|&n| AxisSelection::full(n)).collect(),
            nodes: vec![ChunkNode {
                key: Vec::new(),
                source: ChunkSource::Memory(data),
            }],
        }
    }

    pub fn shape(&self) -> Vec<u64> {
        self.grid_shape
            .iter()
            .copied()
            .chain(selected_shape(&self.inner))
            .collect()
    }

    pub fn ndim(&self) -> usize {
        self.grid_shape.len() + self.inner.iter().filter(|s| s.keeps_axis()).count()
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn grid_shape(&self) -> &[u64] {
        &self.grid_shape
    }

    /// Shape of each chunk as it appears in this array.
    pub fn chunk_shape(&self) -> Vec<u64> {
        selected_shape(&self.inner)
    }

    pub fn chunks(&self) -> &[ChunkNode] {
        &self.nodes
    }

    pub fn num_chunks(&self) -> usize {
        self.nodes.len()
    }

    fn node(&self, key: &[u64]) -> crate::Result<&ChunkNode> {
        if key.len() != self.grid_shape.len()
            || key.iter().zip(&self.grid_shape).any(|(k, s)| k >= s)
        {
            return Err(crate::Error::index(format!(
                "chunk key {key:?} is outside grid of shape {:?}",
                self.grid_shape
            )));
        }
        let linear = key
            .iter()
            .zip(&self.grid_shape)
            .fold(0u64, |acc, (k, s)| acc * s + k);
        Ok(&self.nodes[linear as usize])
    }

    /// Compute the chunk at grid coordinate `key`, as it appears in this array.
    pub fn compute_chunk(&self, key: &[u64]) -> crate::Result<ChunkData> {
        self.node(key)?.compute()?.extract(&self.inner)
    }

    /// Compute the whole array, evaluating chunks in parallel.
    pub fn compute(&self) -> crate::Result<ChunkData> {
        let chunks = self
            .nodes
            .par_iter()
            .map(|node| node.compute()?.extract(&self.inner))
            .collect::<crate::Result<Vec<_>>>()?;
        ChunkData::stack(
            &self.grid_shape,
            &self.chunk_shape(),
            self.data_type,
            chunks,
        )
    }

    /// Index the array.
    pub fn slice(&self, items: &[IndexItem]) -> crate::Result<Self> {
        self.select(&normalize(items, &self.shape())?)
    }

    /// Apply one normalised selection per axis of [`LazyArray::shape`].
    pub fn select(&self, selections: &[AxisSelection]) -> crate::Result<Self> {
        if selections.len() != self.ndim() {
            return Err(crate::Error::index(format!(
                "{} selections given for an array with {} dimensions",
                selections.len(),
                self.ndim()
            )));
        }
        let (grid_sel, chunk_sel) = selections.split_at(self.grid_shape.len());
        let grid_shape = selected_shape(grid_sel);

        let nodes = select_linear(&self.grid_shape, grid_sel)
            .into_iter()
            .enumerate()
            .map(|(i, old)| ChunkNode {
                key: unravel(i as u64, &grid_shape),
                source: self.nodes[old].source.clone(),
            })
            .collect();

        let mut chunk_sel = chunk_sel.iter();
        let inner = self
            .inner
            .iter()
            .map(|current| {
                if current.keeps_axis() {
                    let next = chunk_sel
                        .next()
                        .ok_or_else(|| crate::Error::index("too few chunk selections"))?;
                    current
                        .compose(next)
                        .ok_or_else(|| crate::Error::index("cannot index a dropped axis"))
                } else {
                    Ok(*current)
                }
            })
            .collect::<crate::Result<Vec<_>>>()?;

        Ok(Self {
            data_type: self.data_type,
            grid_shape,
            chunk_shape: self.chunk_shape.clone(),
            inner,
            nodes,
        })
    }

    /// The same array with every file-backed chunk read relative to
    /// `basepath`.
    pub(crate) fn rebase(&self, basepath: &Path) -> Self {
        let basepath = Arc::new(basepath.to_path_buf());
        Self {
            nodes: self.nodes.iter().map(|n| n.rebased(&basepath)).collect(),
            ..self.clone()
        }
    }
}

impl fmt::Display for LazyArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LazyArray<shape={:?}, dtype={}, chunks={}, chunk_shape={:?}>",
            self.shape(),
            self.data_type,
            self.nodes.len(),
            self.chunk_shape()
        )
    }
}
