//! Filesystem repository for trained model artefacts.
//!
//! Each model lives in `<work_dir>/models/<name>/` as the plain artefact file
//! plus `model.zip`, a bundle holding the same file for consumers that expect
//! an archive.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::common::error::{ChurnError, ChurnResult};

use super::artifact::{self, MODEL_FILE_NAME};
use super::domain::{ArtifactLocation, BoostedModel, ModelRepo, StoredModel};

pub const BUNDLE_FILE_NAME: &str = "model.zip";

/// Bundles are tiny; anything larger is not ours.
const MAX_ENTRY_BYTES: u64 = 256 * 1024 * 1024;
const MAX_ENTRIES: usize = 64;

/// Persist model artefacts on the local filesystem.
pub struct FsModelRepo {
    root: PathBuf,
}

impl FsModelRepo {
    pub fn new(work_dir: &Path) -> Self {
        Self {
            root: work_dir.join("models"),
        }
    }

    pub fn model_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn bundle_path(&self, name: &str) -> PathBuf {
        self.model_dir(name).join(BUNDLE_FILE_NAME)
    }
}

fn zip_err(path: &Path, err: zip::result::ZipError) -> ChurnError {
    ChurnError::model_load(format!("{}: {err}", path.display()))
}

/// Write `bytes` as the only entry of a zip bundle.
pub fn write_bundle(bundle: &Path, bytes: &[u8]) -> ChurnResult<()> {
    let file = File::create(bundle).map_err(|source| ChurnError::io(bundle, source))?;
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    zip.start_file(MODEL_FILE_NAME, options)
        .map_err(|err| zip_err(bundle, err))?;
    zip.write_all(bytes)
        .map_err(|source| ChurnError::io(bundle, source))?;
    zip.finish().map_err(|err| zip_err(bundle, err))?;
    Ok(())
}

/// Extract a bundle into `dest`, refusing entries that escape it.
///
/// Returns the files written by this archive; anything already in `dest`
/// is left alone and not reported.
pub fn extract_bundle(bundle: &Path, dest: &Path) -> ChurnResult<Vec<PathBuf>> {
    let file = File::open(bundle).map_err(|source| ChurnError::io(bundle, source))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|err| zip_err(bundle, err))?;
    if archive.len() > MAX_ENTRIES {
        return Err(ChurnError::model_load(format!(
            "bundle has {} entries, limit is {MAX_ENTRIES}",
            archive.len()
        )));
    }
    fs::create_dir_all(dest).map_err(|source| ChurnError::io(dest, source))?;
    let mut written = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|err| zip_err(bundle, err))?;
        if entry.size() > MAX_ENTRY_BYTES {
            return Err(ChurnError::model_load(format!(
                "bundle entry {:?} is too large",
                entry.name()
            )));
        }
        let Some(relative) = entry.enclosed_name() else {
            return Err(ChurnError::model_load(format!(
                "bundle entry {:?} escapes the extraction directory",
                entry.name()
            )));
        };
        let outpath = dest.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&outpath).map_err(|source| ChurnError::io(&outpath, source))?;
            continue;
        }
        if let Some(parent) = outpath.parent() {
            fs::create_dir_all(parent).map_err(|source| ChurnError::io(parent, source))?;
        }
        let mut buf = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut buf)
            .map_err(|source| ChurnError::io(bundle, source))?;
        fs::write(&outpath, buf).map_err(|source| ChurnError::io(&outpath, source))?;
        written.push(outpath);
    }
    Ok(written)
}

/// Resolve a location to the bytes of exactly one model file.
pub fn read_artifact(location: &ArtifactLocation) -> ChurnResult<Vec<u8>> {
    let path = match location {
        ArtifactLocation::File(path) => path.clone(),
        ArtifactLocation::Directory(dir) => artifact::locate_artifact(dir)?,
        ArtifactLocation::Bundle {
            archive,
            extract_to,
        } => {
            let extracted = extract_bundle(archive, extract_to)?;
            artifact::select_artifact(extracted, archive)?
        }
    };
    fs::read(&path).map_err(|source| match source.kind() {
        std::io::ErrorKind::NotFound => {
            ChurnError::model_load(format!("model file {} not found", path.display()))
        }
        _ => ChurnError::io(&path, source),
    })
}

impl ModelRepo for FsModelRepo {
    fn put_model(&self, name: &str, model: &BoostedModel) -> ChurnResult<StoredModel> {
        let dir = self.model_dir(name);
        fs::create_dir_all(&dir).map_err(|source| ChurnError::io(&dir, source))?;
        let bytes = artifact::encode(model)?;

        let artifact_path = dir.join(MODEL_FILE_NAME);
        fs::write(&artifact_path, &bytes).map_err(|source| ChurnError::io(&artifact_path, source))?;
        let bundle = self.bundle_path(name);
        write_bundle(&bundle, &bytes)?;

        tracing::info!(
            artifact = %artifact_path.display(),
            bundle = %bundle.display(),
            bytes = bytes.len(),
            trees = model.trees.len(),
            "model stored"
        );
        Ok(StoredModel {
            artifact: artifact_path,
            bundle,
        })
    }

    fn get_model(&self, location: &ArtifactLocation) -> ChurnResult<BoostedModel> {
        artifact::decode(&read_artifact(location)?)
    }
}
