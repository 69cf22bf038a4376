//! Filesystem-backed repository for dataset splits.
//!
//! Layout under the root:
//! `train/train.csv`, `validation/validation.csv`, `test/test.csv` and
//! `split.json`. CSV files carry a header row with the label first.

use std::fs;
use std::path::{Path, PathBuf};

use crate::common::config::DataCfg;
use crate::common::error::{ChurnError, ChurnResult};
use crate::common::time;

use super::domain::{DataRepo, Dataset, Split, SplitManifest, SplitPart};
use super::service;

const MANIFEST_FILE: &str = "split.json";

/// Filesystem repository rooted at `<work_dir>/data`.
pub struct FsDataRepo {
    root: PathBuf,
}

impl FsDataRepo {
    pub fn new(work_dir: &Path) -> Self {
        Self {
            root: work_dir.join("data"),
        }
    }

    pub fn part_path(&self, part: SplitPart) -> PathBuf {
        self.root
            .join(part.as_str())
            .join(format!("{}.csv", part.as_str()))
    }

    fn staging_path(&self, part: SplitPart) -> PathBuf {
        self.part_path(part).with_extension("csv.tmp")
    }

    fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    pub fn manifest(&self) -> ChurnResult<SplitManifest> {
        let path = self.manifest_path();
        let bytes = fs::read(&path).map_err(|source| ChurnError::io(&path, source))?;
        serde_json::from_slice(&bytes)
            .map_err(|err| ChurnError::input(format!("{}: {err}", path.display())))
    }
}

/// Write a labeled dataset as CSV with the label in the first column.
pub fn write_dataset(path: &Path, dataset: &Dataset) -> ChurnResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| ChurnError::io(parent, source))?;
    }
    let to_io = |err: csv::Error| ChurnError::io(path, err.into());
    let mut writer = csv::Writer::from_path(path).map_err(to_io)?;

    let mut header = Vec::with_capacity(dataset.schema().len() + 1);
    header.push(dataset.label_name().to_string());
    header.extend(dataset.schema().names());
    writer.write_record(&header).map_err(to_io)?;

    for (row, label) in dataset.rows().iter().zip(dataset.labels()) {
        let mut record = Vec::with_capacity(row.len() + 1);
        record.push(label.to_string());
        record.extend(row.iter().map(|v| v.to_string()));
        writer.write_record(&record).map_err(to_io)?;
    }
    writer
        .flush()
        .map_err(|source| ChurnError::io(path, source))
}

impl DataRepo for FsDataRepo {
    fn put_split(&self, split: &Split) -> ChurnResult<SplitManifest> {
        // Without a manifest nothing is read back, so drop the old one before
        // any part changes on disk.
        let path = self.manifest_path();
        match fs::remove_file(&path) {
            Ok(()) => tracing::debug!(path = %path.display(), "previous split manifest removed"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(ChurnError::io(&path, source)),
        }

        for part in SplitPart::ALL {
            write_dataset(&self.staging_path(part), split.part(part))?;
        }
        for part in SplitPart::ALL {
            let (from, to) = (self.staging_path(part), self.part_path(part));
            fs::rename(&from, &to).map_err(|source| ChurnError::io(&to, source))?;
        }

        let manifest = SplitManifest {
            label: split.train.label_name().to_string(),
            features: split.train.schema().names(),
            train_rows: split.train.len(),
            validation_rows: split.validation.len(),
            test_rows: split.test.len(),
            created_ms: time::now_ms(),
        };
        let json = serde_json::to_vec_pretty(&manifest)
            .map_err(|err| ChurnError::input(format!("serialise split manifest: {err}")))?;
        fs::write(&path, json).map_err(|source| ChurnError::io(&path, source))?;
        tracing::info!(root = %self.root.display(), "split persisted");
        Ok(manifest)
    }

    fn get_part(&self, part: SplitPart) -> ChurnResult<Dataset> {
        let manifest = self.manifest()?;
        let cfg = DataCfg {
            label: manifest.label.clone(),
            ..DataCfg::default()
        };
        let dataset = service::load_dataset(&self.part_path(part), &cfg)?;

        let expected = manifest.rows(part);
        if dataset.len() != expected {
            return Err(ChurnError::input(format!(
                "{} split has {} rows, manifest records {expected}",
                part.as_str(),
                dataset.len()
            )));
        }
        if dataset.schema().names() != manifest.features {
            return Err(ChurnError::input(format!(
                "{} split columns differ from the manifest",
                part.as_str()
            )));
        }
        Ok(dataset)
    }
}
