use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::grid::ChunkGrid;
use crate::index::AxisSelection;
use crate::lazy::LazyArray;
use crate::loader::LoaderId;
use crate::manifest::Manifest;

/// A grid of file references together with the lazy array they back.
///
/// Containers are immutable; narrowing or relocating one produces a new
/// container sharing the same references.
#[derive(Debug, Clone)]
pub struct ExternalArrayContainer {
    grid: Arc<ChunkGrid>,
    basepath: Arc<PathBuf>,
    loader: LoaderId,
    array: LazyArray,
}

impl ExternalArrayContainer {
    /// Build the lazy array for `grid`. No file is opened.
    ///
    /// # Errors
    /// Returns [`Error::Manifest`](crate::Error::Manifest) if `loader` is not
    /// registered or describes any reference differently from the grid.
    pub fn new(
        grid: ChunkGrid,
        loader: LoaderId,
        basepath: impl Into<PathBuf>,
    ) -> crate::Result<Self> {
        let imp = loader.loader().map_err(|e| crate::Error::manifest(e.to_string()))?;
        for reference in grid.references() {
            let (shape, data_type) = imp.describe(reference);
            if shape != grid.chunk_shape() || data_type != grid.data_type() {
                return Err(crate::Error::manifest(format!(
                    "{loader} loader describes {} as {shape:?} {data_type}, grid expects {:?} {}",
                    reference.uri(),
                    grid.chunk_shape(),
                    grid.data_type()
                )));
            }
        }
        Ok(Self::new_unchecked(
            Arc::new(grid),
            loader,
            Arc::new(basepath.into()),
        ))
    }

    fn new_unchecked(grid: Arc<ChunkGrid>, loader: LoaderId, basepath: Arc<PathBuf>) -> Self {
        let array = LazyArray::from_grid(&grid, basepath.clone(), loader);
        log::debug!(
            "built lazy array of shape {:?} over {} files in {}",
            array.shape(),
            grid.len(),
            basepath.display()
        );
        Self {
            grid,
            basepath,
            loader,
            array,
        }
    }

    /// Build from a manifest, with files relative to `basepath`.
    pub fn from_manifest(manifest: &Manifest, basepath: impl Into<PathBuf>) -> crate::Result<Self> {
        Self::new(manifest.to_grid()?, manifest.loader_id()?, basepath)
    }

    /// The lazy array of shape `grid_shape ++ chunk_shape`.
    pub fn array(&self) -> &LazyArray {
        &self.array
    }

    /// The raw reference grid.
    pub fn reference_array(&self) -> &ChunkGrid {
        &self.grid
    }

    pub fn basepath(&self) -> &Path {
        &self.basepath
    }

    pub fn loader(&self) -> LoaderId {
        self.loader
    }

    /// The same references and loader, resolved against a new base path.
    pub fn rebase(&self, basepath: impl Into<PathBuf>) -> Self {
        Self::new_unchecked(self.grid.clone(), self.loader, Arc::new(basepath.into()))
    }

    /// The same references and base path, read with a different loader.
    pub fn with_loader(&self, loader: LoaderId) -> crate::Result<Self> {
        Self::new(ChunkGrid::clone(&self.grid), loader, self.basepath.to_path_buf())
    }

    /// Narrow the grid with one selection per grid axis.
    pub fn select_grid(&self, selections: &[AxisSelection]) -> crate::Result<Self> {
        let grid = self.grid.select(selections)?;
        Ok(Self::new_unchecked(
            Arc::new(grid),
            self.loader,
            self.basepath.clone(),
        ))
    }

    pub fn to_manifest(&self) -> Manifest {
        Manifest::from_grid(&self.grid, self.loader)
    }
}
