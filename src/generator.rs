//! Build manifests from existing FITS files.

use std::path::{Component, Path, PathBuf};

use crate::dataset::Meta;
use crate::dtype::DataType;
use crate::grid::{ChunkGrid, num_cells};
use crate::loader::{LoaderId, fits};
use crate::manifest::{DatasetDocument, Manifest};
use crate::reference::ChunkReference;

fn relative_uri(path: &Path, relative_to: Option<&Path>) -> crate::Result<String> {
    let rel = match relative_to {
        Some(base) => path.strip_prefix(base).map_err(|_| {
            crate::Error::manifest(format!(
                "{} is not inside {}",
                path.display(),
                base.display()
            ))
        })?,
        None => path,
    };
    let parts = rel
        .components()
        .map(|c| match c {
            Component::Normal(part) => part.to_str().ok_or_else(|| {
                crate::Error::manifest(format!("{} is not valid UTF-8", path.display()))
            }),
            _ => Err(crate::Error::manifest(format!(
                "{} is not a plain relative path",
                rel.display()
            ))),
        })
        .collect::<crate::Result<Vec<_>>>()?;
    Ok(parts.join("/"))
}

/// Reference HDU `hdu` of each file, arranged row-major into `grid_shape`.
///
/// Headers are read to find each file's shape and type; all must agree.
/// With `relative_to`, URIs are made relative to that directory.
pub fn references_from_files(
    files: &[PathBuf],
    grid_shape: Vec<u64>,
    hdu: u64,
    relative_to: Option<&Path>,
) -> crate::Result<ChunkGrid> {
    if files.len() as u64 != num_cells(&grid_shape)? {
        return Err(crate::Error::manifest(format!(
            "{} files supplied for grid shape {grid_shape:?}",
            files.len()
        )));
    }
    let references = files
        .iter()
        .map(|path| {
            let header = fits::read_header(path, hdu)?;
            let data_type = DataType::from_bitpix(header.bitpix)
                .map_err(|e| crate::Error::manifest(format!("{}: {e}", path.display())))?;
            Ok(ChunkReference::new(
                relative_uri(path, relative_to)?,
                hdu,
                data_type,
                header.shape(),
            ))
        })
        .collect::<crate::Result<Vec<_>>>()?;
    ChunkGrid::new(grid_shape, references)
}

/// Write a dataset document named `document_name` into `directory`,
/// describing every `.fits` file there (sorted by name) as a 1-D grid.
pub fn dataset_from_fits(
    directory: &Path,
    document_name: &str,
    meta: Meta,
    hdu: u64,
) -> crate::Result<PathBuf> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(directory)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|e| e == "fits") {
            files.push(path);
        }
    }
    if files.is_empty() {
        return Err(crate::Error::manifest(format!(
            "no FITS files found in {}",
            directory.display()
        )));
    }
    files.sort();

    let grid = references_from_files(&files, vec![files.len() as u64], hdu, Some(directory))?;
    let document = DatasetDocument {
        meta,
        data: Manifest::from_grid(&grid, LoaderId::FITS),
    };
    let path = directory.join(document_name);
    document.write(&path)?;
    log::debug!("wrote manifest of {} files to {}", grid.len(), path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkData;

    fn write_image(path: &Path, shape: Vec<u64>, value: f64) {
        let n: u64 = shape.iter().product();
        let data = ChunkData::from_elements(shape, &vec![value; n as usize]).unwrap();
        std::fs::write(path, fits::encode_image(&data).unwrap()).unwrap();
    }

    #[test]
    fn relative_uris_use_forward_slashes() {
        let uri = relative_uri(Path::new("/a/b/c/d.fits"), Some(Path::new("/a/b"))).unwrap();
        assert_eq!(uri, "c/d.fits");
        assert!(relative_uri(Path::new("/x/d.fits"), Some(Path::new("/a"))).is_err());
        assert!(relative_uri(Path::new("/x/d.fits"), None).is_err());
        assert_eq!(relative_uri(Path::new("x/d.fits"), None).unwrap(), "x/d.fits");
    }

    #[test]
    fn heterogeneous_files_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.fits");
        let b = dir.path().join("b.fits");
        write_image(&a, vec![2, 2], 1.0);
        write_image(&b, vec![2, 3], 1.0);
        assert!(matches!(
            references_from_files(&[a, b], vec![2], 0, Some(dir.path())),
            Err(crate::Error::Manifest(_))
        ));
    }

    #[test]
    fn writes_document_for_directory() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["c.fits", "a.fits", "b.fits"] {
            write_image(&dir.path().join(name), vec![3, 2], 0.5);
        }
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let path = dataset_from_fits(dir.path(), "dataset.json", Meta::new(), 0).unwrap();
        let doc = DatasetDocument::read(&path).unwrap();
        assert_eq!(doc.data.fileuris, vec!["a.fits", "b.fits", "c.fits"]);
        assert_eq!(doc.data.shape, vec![3]);
        let grid = doc.data.to_grid().unwrap();
        assert_eq!(grid.array_shape(), vec![3, 3, 2]);
        assert_eq!(grid.data_type(), DataType::Float64);
    }
}
