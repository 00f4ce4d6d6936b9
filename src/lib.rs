//! Lazy n-dimensional arrays whose chunks live in many external files.
//!
//! A [`Manifest`](manifest::Manifest) describes a grid of file references;
//! an [`ExternalArrayContainer`](container::ExternalArrayContainer) turns it
//! into a [`LazyArray`](lazy::LazyArray) without opening any file; a
//! [`FileManager`](file_manager::FileManager) keeps the referenced files in
//! step with indexing of the [`Dataset`](dataset::Dataset) it backs; and a
//! [`TransferCoordinator`](transfer::TransferCoordinator) relocates the files
//! and rebinds the dataset.

pub mod chunk;
pub mod container;
pub mod dataset;
pub mod dtype;
mod error;
pub mod file_manager;
pub mod generator;
pub mod grid;
pub mod index;
pub mod lazy;
pub mod loader;
pub mod manifest;
pub mod reference;
pub mod storage;
pub mod transfer;

pub use zarrs;

pub use error::{Error, Result};
