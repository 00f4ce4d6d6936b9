//! Pluggable readers turning one [`ChunkReference`] into chunk data.
//!
//! Each file format implements [`Loader`] and registers a static instance
//! with [`inventory::submit!`]; arrays store only the [`LoaderId`] tag and
//! look the implementation up when a chunk is computed.
//!
//! ```ignore
//! struct MyLoader;
//! impl Loader for MyLoader { ... }
//! inventory::submit! { LoaderPlugin::new("my-format", &MyLoader) }
//! ```

pub mod fits;
pub mod n5;

use std::fmt;
use std::path::Path;

use crate::chunk::ChunkData;
use crate::dtype::DataType;
use crate::reference::ChunkReference;

pub use fits::FitsLoader;
pub use n5::N5BlockLoader;

/// Reads chunks of one file format.
pub trait Loader: Send + Sync {
    /// Shape and data type of the chunk behind `reference`, from the
    /// reference alone.
    fn describe(&self, reference: &ChunkReference) -> (Vec<u64>, DataType) {
        (reference.shape().to_vec(), reference.data_type())
    }

    /// Read the chunk behind `reference`, resolving its URI against
    /// `basepath`.
    ///
    /// # Errors
    /// [`Error::SourceUnavailable`](crate::Error::SourceUnavailable) if the
    /// file cannot be read, [`Error::FormatMismatch`](crate::Error::FormatMismatch)
    /// if its contents contradict the reference.
    fn read(&self, reference: &ChunkReference, basepath: &Path) -> crate::Result<ChunkData>;
}

/// Registry entry for a [`Loader`].
pub struct LoaderPlugin {
    name: &'static str,
    loader: &'static dyn Loader,
}

impl LoaderPlugin {
    pub const fn new(name: &'static str, loader: &'static dyn Loader) -> Self {
        Self { name, loader }
    }
}

inventory::collect!(LoaderPlugin);

/// Tag selecting a registered [`Loader`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoaderId(&'static str);

impl LoaderId {
    pub const FITS: Self = Self("fits");
    pub const N5_BLOCK: Self = Self("n5-block");

    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// Find a registered loader by name.
    pub fn from_name(name: &str) -> Option<Self> {
        inventory::iter::<LoaderPlugin>
            .into_iter()
            .find(|p| p.name == name)
            .map(|p| Self(p.name))
    }

    pub fn name(&self) -> &'static str {
        self.0
    }

    /// The registered implementation.
    pub fn loader(&self) -> crate::Result<&'static dyn Loader> {
        inventory::iter::<LoaderPlugin>
            .into_iter()
            .find(|p| p.name == self.0)
            .map(|p| p.loader)
            .ok_or_else(|| crate::Error::general(format!("no loader registered as {:?}", self.0)))
    }
}

impl Default for LoaderId {
    fn default() -> Self {
        Self::FITS
    }
}

impl fmt::Debug for LoaderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LoaderId({})", self.0)
    }
}

impl fmt::Display for LoaderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Structural problems found while parsing a file are reported as format
/// mismatches of `uri`; store failures pass through.
pub(crate) fn as_mismatch(uri: &str, error: crate::Error) -> crate::Error {
    match error {
        crate::Error::General(reason) => crate::Error::format_mismatch(uri, reason),
        other => other,
    }
}

/// Check a chunk's actual shape and type against its reference.
pub(crate) fn check_against_reference(
    reference: &ChunkReference,
    shape: &[u64],
    data_type: DataType,
) -> crate::Result<()> {
    if data_type != reference.data_type() {
        return Err(crate::Error::format_mismatch(
            reference.uri(),
            format!(
                "file holds {data_type} data, reference declares {}",
                reference.data_type()
            ),
        ));
    }
    if shape != reference.shape() {
        return Err(crate::Error::format_mismatch(
            reference.uri(),
            format!(
                "file holds shape {shape:?}, reference declares {:?}",
                reference.shape()
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_loaders_are_registered() {
        assert_eq!(LoaderId::from_name("fits"), Some(LoaderId::FITS));
        assert_eq!(LoaderId::from_name("n5-block"), Some(LoaderId::N5_BLOCK));
        assert_eq!(LoaderId::from_name("hdf5"), None);
        assert!(LoaderId::FITS.loader().is_ok());
        assert!(LoaderId::new("hdf5").loader().is_err());
    }

    #[test]
    fn describe_uses_reference_only() {
        let r = ChunkReference::new("missing.fits", 0, DataType::Float64, vec![3, 2]);
        let (shape, dt) = LoaderId::FITS.loader().unwrap().describe(&r);
        assert_eq!(shape, vec![3, 2]);
        assert_eq!(dt, DataType::Float64);
    }
}
