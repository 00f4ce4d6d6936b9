use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::container::ExternalArrayContainer;
use crate::index::{AxisSelection, IndexItem, normalize};
use crate::loader::LoaderId;
use crate::manifest::Manifest;

/// File-centric view of an [`ExternalArrayContainer`].
///
/// Indexing a file manager narrows its reference grid the same way indexing
/// the array it backs narrows the data, so the two can be kept in step.
#[derive(Debug, Clone)]
pub struct FileManager {
    container: Arc<ExternalArrayContainer>,
}

impl FileManager {
    pub fn new(container: ExternalArrayContainer) -> Self {
        Self {
            container: Arc::new(container),
        }
    }

    pub fn from_manifest(manifest: &Manifest, basepath: impl Into<PathBuf>) -> crate::Result<Self> {
        ExternalArrayContainer::from_manifest(manifest, basepath).map(Self::new)
    }

    pub fn container(&self) -> &ExternalArrayContainer {
        &self.container
    }

    /// Relative paths of the referenced files, each listed once.
    pub fn filenames(&self) -> Vec<String> {
        self.container.reference_array().filenames()
    }

    /// Directory all filenames are relative to.
    pub fn basepath(&self) -> &Path {
        self.container.basepath()
    }

    pub fn loader(&self) -> LoaderId {
        self.container.loader()
    }

    /// Number of leading array axes spanned by the reference grid.
    pub fn grid_ndim(&self) -> usize {
        self.container.reference_array().shape().len()
    }

    /// Narrow the files to those backing `items`, given in the axis order of
    /// the full array.
    ///
    /// Indices on the per-file axes are bounds-checked but never change which
    /// files are referenced.
    pub fn slice(&self, items: &[IndexItem]) -> crate::Result<Self> {
        let selections = normalize(items, &self.container.array().shape())?;
        self.select_grid(&selections[..self.grid_ndim()])
    }

    /// Narrow the files with one normalised selection per grid axis.
    pub fn select_grid(&self, selections: &[AxisSelection]) -> crate::Result<Self> {
        self.container.select_grid(selections).map(Self::new)
    }

    /// The same files, relocated under `basepath`.
    pub fn rebase(&self, basepath: impl Into<PathBuf>) -> Self {
        Self::new(self.container.rebase(basepath))
    }

    pub fn to_manifest(&self) -> Manifest {
        self.container.to_manifest()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::DataType;
    use crate::grid::ChunkGrid;
    use crate::index::Slice;
    use crate::reference::ChunkReference;

    fn manager(grid_shape: Vec<u64>) -> FileManager {
        let n: u64 = grid_shape.iter().product();
        let refs = (0..n)
            .map(|i| ChunkReference::new(format!("{i:02}.fits"), 0, DataType::Float32, vec![4, 6]))
            .collect();
        let grid = ChunkGrid::new(grid_shape, refs).unwrap();
        FileManager::new(ExternalArrayContainer::new(grid, LoaderId::FITS, "/data").unwrap())
    }

    #[test]
    fn integer_selects_one_file() {
        let fm = manager(vec![10]);
        assert_eq!(fm.filenames().len(), 10);
        let one = fm.slice(&[3.into()]).unwrap();
        assert_eq!(one.filenames(), vec!["03.fits"]);
        assert_eq!(one.grid_ndim(), 0);
        assert_eq!(one.basepath(), Path::new("/data"));
    }

    #[test]
    fn range_selects_files_in_order() {
        let fm = manager(vec![10]);
        assert_eq!(
            fm.slice(&[(2..5).into()]).unwrap().filenames(),
            vec!["02.fits", "03.fits", "04.fits"]
        );
        let stepped = Slice::new(None, None, Some(4));
        assert_eq!(
            fm.slice(&[stepped.into()]).unwrap().filenames(),
            vec!["00.fits", "04.fits", "08.fits"]
        );
    }

    #[test]
    fn per_file_axes_do_not_change_files() {
        let fm = manager(vec![10]);
        let sliced = fm.slice(&[IndexItem::Ellipsis, 5.into()]).unwrap();
        assert_eq!(sliced.filenames().len(), 10);
        let sliced = fm.slice(&[(..).into(), 1.into(), (0..2).into()]).unwrap();
        assert_eq!(sliced.filenames().len(), 10);
    }

    #[test]
    fn per_file_axes_are_bounds_checked() {
        let fm = manager(vec![10]);
        assert!(matches!(
            fm.slice(&[IndexItem::Ellipsis, 6.into()]),
            Err(crate::Error::Index(_))
        ));
        assert!(matches!(
            fm.slice(&[0.into(), 0.into(), 0.into(), 0.into()]),
            Err(crate::Error::Index(_))
        ));
    }

    #[test]
    fn two_dimensional_grid() {
        let fm = manager(vec![3, 4]);
        assert_eq!(fm.slice(&[1.into()]).unwrap().filenames().len(), 4);
        assert_eq!(fm.slice(&[(..).into(), 2.into()]).unwrap().filenames(), vec![
            "02.fits", "06.fits", "10.fits"
        ]);
        let single = fm.slice(&[2.into(), 3.into()]).unwrap();
        assert_eq!(single.filenames(), vec!["11.fits"]);
    }

    #[test]
    fn slicing_leaves_original_untouched() {
        let fm = manager(vec![10]);
        let _ = fm.slice(&[0.into()]).unwrap();
        assert_eq!(fm.filenames().len(), 10);
    }
}
