#![allow(dead_code)]

use std::path::Path;

use tempfile::TempDir;
use zarrs_striped::{chunk::ChunkData, dataset::Meta, generator, loader::fits};

pub const N_FILES: usize = 11;
pub const SIDE: u64 = 128;
pub const DOCUMENT: &str = "eit.json";

pub fn init_logging() {
    env_logger::try_init().ok();
}

/// Value stored at `(y, x)` of file `i`.
pub fn pixel(i: usize, y: u64, x: u64) -> i16 {
    (i as i16) * 1000 + ((y * 7 + x) % 997) as i16
}

pub fn image(i: usize) -> ChunkData {
    let values: Vec<i16> = (0..SIDE)
        .flat_map(|y| (0..SIDE).map(move |x| pixel(i, y, x)))
        .collect();
    ChunkData::from_elements(vec![SIDE, SIDE], &values).expect("valid image")
}

pub fn filename(i: usize) -> String {
    format!("eit_{i:02}.fits")
}

pub fn meta() -> Meta {
    serde_json::from_value(serde_json::json!({
        "dataset_id": "ABCDE",
        "primary_proposal_id": "pid_1_2",
        "manifest_object_key": format!("pid_1_2/ABCDE/{DOCUMENT}"),
    }))
    .expect("valid meta")
}

pub fn write_images(dir: &Path) {
    for i in 0..N_FILES {
        let bytes = fits::encode_image(&image(i)).expect("encodable");
        std::fs::write(dir.join(filename(i)), bytes).expect("write image");
    }
}

/// A directory of 11 (128, 128) FITS images plus their dataset document.
pub fn eit_directory() -> TempDir {
    init_logging();
    let dir = tempfile::tempdir().expect("tempdir");
    write_images(dir.path());
    generator::dataset_from_fits(dir.path(), DOCUMENT, meta(), 0).expect("write document");
    dir
}
