use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::chunk::ChunkData;
use crate::file_manager::FileManager;
use crate::index::{IndexItem, normalize};
use crate::lazy::LazyArray;
use crate::manifest::DatasetDocument;
use crate::transfer::{DownloadOptions, TransferCoordinator};

pub type Meta = serde_json::Map<String, serde_json::Value>;

/// One generation of a dataset's data: the lazy array and the files backing
/// it, always replaced together.
#[derive(Debug, Clone)]
pub struct DatasetState {
    array: LazyArray,
    files: Option<FileManager>,
}

impl DatasetState {
    pub fn array(&self) -> &LazyArray {
        &self.array
    }

    pub fn files(&self) -> Option<&FileManager> {
        self.files.as_ref()
    }

    fn rebased(&self, basepath: &Path) -> Self {
        Self {
            array: self.array.rebase(basepath),
            files: self.files.as_ref().map(|fm| fm.rebase(basepath)),
        }
    }
}

/// An n-dimensional dataset, optionally backed by external files.
pub struct Dataset {
    state: RwLock<Arc<DatasetState>>,
    meta: Meta,
}

impl Dataset {
    fn from_state(state: DatasetState, meta: Meta) -> Self {
        Self {
            state: RwLock::new(Arc::new(state)),
            meta,
        }
    }

    /// A dataset over in-memory data, with no backing files.
    pub fn from_data(data: ChunkData, meta: Meta) -> Self {
        Self::from_state(
            DatasetState {
                array: LazyArray::from_data(data),
                files: None,
            },
            meta,
        )
    }

    /// A dataset over the files of `files`.
    pub fn from_file_manager(files: FileManager, meta: Meta) -> Self {
        Self::from_state(
            DatasetState {
                array: files.container().array().clone(),
                files: Some(files),
            },
            meta,
        )
    }

    /// Build from a dataset document whose files live under `basepath`.
    pub fn from_document(document: DatasetDocument, basepath: impl Into<PathBuf>) -> crate::Result<Self> {
        let files = FileManager::from_manifest(&document.data, basepath)?;
        Ok(Self::from_file_manager(files, document.meta))
    }

    /// Read a dataset document; referenced files are resolved relative to
    /// the document's directory.
    pub fn from_manifest_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let document = DatasetDocument::read(path)?;
        let basepath = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Self::from_document(document, basepath)
    }

    /// Load the dataset from a directory holding exactly one `.json` dataset
    /// document and the files it references.
    pub fn from_directory(directory: impl AsRef<Path>) -> crate::Result<Self> {
        let directory = directory.as_ref();
        if !directory.is_dir() {
            return Err(crate::Error::general(format!(
                "{} is not a directory",
                directory.display()
            )));
        }
        let mut documents = Vec::new();
        for entry in std::fs::read_dir(directory)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|e| e == "json") {
                documents.push(path);
            }
        }
        match documents.as_slice() {
            [] => Err(crate::Error::manifest(format!(
                "no dataset document found in {}",
                directory.display()
            ))),
            [one] => Self::from_manifest_file(one),
            many => Err(crate::Error::manifest(format!(
                "{} dataset documents found in {}, expected one",
                many.len(),
                directory.display()
            ))),
        }
    }

    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    /// The current array and files as a matched pair.
    pub fn snapshot(&self) -> Arc<DatasetState> {
        self.state.read().clone()
    }

    pub fn array(&self) -> LazyArray {
        self.snapshot().array.clone()
    }

    /// The files backing this dataset; `None` for in-memory data.
    pub fn files(&self) -> Option<FileManager> {
        self.snapshot().files.clone()
    }

    pub fn shape(&self) -> Vec<u64> {
        self.snapshot().array.shape()
    }

    /// Relative names of the backing files; empty for in-memory data.
    pub fn filenames(&self) -> Vec<String> {
        self.snapshot()
            .files
            .as_ref()
            .map(FileManager::filenames)
            .unwrap_or_default()
    }

    /// Index the dataset, narrowing its array and files together.
    pub fn index(&self, items: &[IndexItem]) -> crate::Result<Self> {
        let state = self.snapshot();
        let selections = normalize(items, &state.array.shape())?;
        let array = state.array.select(&selections)?;
        let files = state
            .files
            .as_ref()
            .map(|fm| fm.select_grid(&selections[..fm.grid_ndim()]))
            .transpose()?;
        Ok(Self::from_state(
            DatasetState { array, files },
            self.meta.clone(),
        ))
    }

    /// Persist metadata and file references as a dataset document.
    pub fn write_manifest(&self, path: impl AsRef<Path>) -> crate::Result<()> {
        let files = self
            .files()
            .ok_or_else(|| crate::Error::general("dataset has no backing files to describe"))?;
        DatasetDocument {
            meta: self.meta.clone(),
            data: files.to_manifest(),
        }
        .write(path.as_ref())
    }

    /// Transfer the backing files and rebind the dataset to their new
    /// location. See [`TransferCoordinator::download`].
    pub fn download(
        &self,
        coordinator: &TransferCoordinator,
        options: DownloadOptions,
    ) -> crate::Result<()> {
        coordinator.download(self, options)
    }

    /// Swap in a generation whose files live under `basepath`.
    pub(crate) fn rebase(&self, basepath: &Path) {
        let mut guard = self.state.write();
        let next = guard.rebased(basepath);
        *guard = Arc::new(next);
    }
}

impl Clone for Dataset {
    fn clone(&self) -> Self {
        Self {
            state: RwLock::new(self.snapshot()),
            meta: self.meta.clone(),
        }
    }
}

impl fmt::Debug for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.snapshot();
        f.debug_struct("Dataset")
            .field("array", &state.array)
            .field("files", &state.files)
            .field("meta", &self.meta)
            .finish()
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.snapshot();
        write!(f, "Dataset<{}", state.array)?;
        if let Some(files) = &state.files {
            write!(
                f,
                ", files={} in {}",
                files.filenames().len(),
                files.basepath().display()
            )?;
        }
        f.write_str(">")
    }
}
