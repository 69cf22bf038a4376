//! Service layer: CSV ingest and the stratified splitter.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::common::config::DataCfg;
use crate::common::error::{ChurnError, ChurnResult};

use super::domain::{Dataset, FeatureTable, Schema, Split, SplitCfg};

/// Parsed CSV before the label is separated from the features.
struct RawTable {
    columns: Vec<String>,
    records: Vec<csv::StringRecord>,
}

fn read_raw<R: Read>(reader: R, cfg: &DataCfg) -> ChurnResult<RawTable> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(cfg.has_header)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let columns = match &cfg.columns {
        Some(columns) => columns.clone(),
        None => csv_reader
            .headers()
            .map_err(|err| ChurnError::input(format!("cannot read header row: {err}")))?
            .iter()
            .map(str::to_string)
            .collect(),
    };

    let mut records = Vec::new();
    for (idx, record) in csv_reader.records().enumerate() {
        let record =
            record.map_err(|err| ChurnError::input(format!("row {}: {err}", idx + 1)))?;
        if record.len() != columns.len() {
            return Err(ChurnError::input(format!(
                "row {} has {} fields, expected {}",
                idx + 1,
                record.len(),
                columns.len()
            )));
        }
        records.push(record);
    }
    Ok(RawTable { columns, records })
}

fn parse_number(raw: &str, row: usize, column: &str) -> ChurnResult<f64> {
    raw.parse::<f64>().map_err(|_| {
        ChurnError::input(format!(
            "row {row}, column {column:?}: {raw:?} is not numeric"
        ))
    })
}

fn parse_label(raw: &str, row: usize, column: &str) -> ChurnResult<u8> {
    let value = raw.parse::<f64>().ok();
    match value {
        Some(v) if v == 0.0 => Ok(0),
        Some(v) if v == 1.0 => Ok(1),
        _ => Err(ChurnError::input(format!(
            "row {row}, label {column:?}: {raw:?} is not binary"
        ))),
    }
}

/// Feature column indices after removing the label and dropped columns.
fn feature_columns(columns: &[String], cfg: &DataCfg) -> Vec<usize> {
    for dropped in &cfg.drop_columns {
        if !columns.contains(dropped) {
            tracing::warn!(column = %dropped, "drop column not present in input");
        }
    }
    columns
        .iter()
        .enumerate()
        .filter(|(_, name)| **name != cfg.label && !cfg.drop_columns.contains(name))
        .map(|(idx, _)| idx)
        .collect()
}

fn build_table(raw: &RawTable, feature_idx: &[usize]) -> ChurnResult<FeatureTable> {
    let schema = Schema::numeric(feature_idx.iter().map(|&i| raw.columns[i].clone()))?;
    let mut rows = Vec::with_capacity(raw.records.len());
    for (row_idx, record) in raw.records.iter().enumerate() {
        let mut row = Vec::with_capacity(feature_idx.len());
        for &col in feature_idx {
            row.push(parse_number(&record[col], row_idx + 1, &raw.columns[col])?);
        }
        rows.push(row);
    }
    FeatureTable::new(schema, rows)
}

/// Read a labeled dataset from any CSV source.
pub fn read_dataset<R: Read>(reader: R, cfg: &DataCfg) -> ChurnResult<Dataset> {
    let raw = read_raw(reader, cfg)?;
    let label_idx = raw
        .columns
        .iter()
        .position(|c| *c == cfg.label)
        .ok_or_else(|| {
            ChurnError::input(format!("label column {:?} not found in input", cfg.label))
        })?;

    let table = build_table(&raw, &feature_columns(&raw.columns, cfg))?;
    let labels = raw
        .records
        .iter()
        .enumerate()
        .map(|(idx, record)| parse_label(&record[label_idx], idx + 1, &cfg.label))
        .collect::<ChurnResult<Vec<_>>>()?;
    Dataset::new(table, cfg.label.clone(), labels)
}

/// Read features only; a label column, if present, is ignored.
pub fn read_features<R: Read>(reader: R, cfg: &DataCfg) -> ChurnResult<FeatureTable> {
    let raw = read_raw(reader, cfg)?;
    build_table(&raw, &feature_columns(&raw.columns, cfg))
}

fn open(path: &Path) -> ChurnResult<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| ChurnError::io(path, source))
}

/// Ingest a labeled CSV file.
pub fn load_dataset(path: &Path, cfg: &DataCfg) -> ChurnResult<Dataset> {
    let dataset = read_dataset(open(path)?, cfg)?;
    tracing::info!(
        path = %path.display(),
        rows = dataset.len(),
        features = dataset.schema().len(),
        positive_rate = dataset.positive_rate(),
        "dataset loaded"
    );
    Ok(dataset)
}

pub fn load_features(path: &Path, cfg: &DataCfg) -> ChurnResult<FeatureTable> {
    read_features(open(path)?, cfg)
}

/// Assign `ceil(n * holdout_fraction)` rows to the held-out side, keeping
/// each class's share. Returns `(kept, held_out)` index lists.
fn stratified_indices(
    labels: &[u8],
    holdout_fraction: f64,
    seed: u64,
) -> ChurnResult<(Vec<usize>, Vec<usize>)> {
    let n = labels.len();
    if n < 2 {
        return Err(ChurnError::input(format!(
            "cannot split {n} rows into two non-empty parts"
        )));
    }
    let n_holdout = ((n as f64 * holdout_fraction) - 1e-9).ceil().max(1.0) as usize;
    let n_holdout = n_holdout.min(n - 1);

    let mut by_class: [Vec<usize>; 2] = [Vec::new(), Vec::new()];
    for (idx, &y) in labels.iter().enumerate() {
        by_class[y as usize].push(idx);
    }
    for (class, members) in by_class.iter().enumerate() {
        if members.len() == 1 {
            return Err(ChurnError::input(format!(
                "class {class} has a single row; stratification needs at least 2"
            )));
        }
    }

    // Largest-remainder allocation so per-class counts sum to n_holdout.
    let mut alloc = [0usize; 2];
    let mut remainders = [(0.0f64, 0usize); 2];
    for class in 0..2 {
        let exact = n_holdout as f64 * by_class[class].len() as f64 / n as f64;
        alloc[class] = exact.floor() as usize;
        remainders[class] = (exact - exact.floor(), class);
    }
    let mut left = n_holdout - alloc.iter().sum::<usize>();
    remainders.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
    for &(_, class) in &remainders {
        if left == 0 {
            break;
        }
        if alloc[class] < by_class[class].len() {
            alloc[class] += 1;
            left -= 1;
        }
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut kept = Vec::with_capacity(n - n_holdout);
    let mut held_out = Vec::with_capacity(n_holdout);
    for class in 0..2 {
        let mut members = by_class[class].clone();
        members.shuffle(&mut rng);
        let (out, keep) = members.split_at(alloc[class]);
        held_out.extend_from_slice(out);
        kept.extend_from_slice(keep);
    }
    kept.shuffle(&mut rng);
    held_out.shuffle(&mut rng);
    Ok((kept, held_out))
}

/// Split into `(kept, held_out)` with the label's class ratio preserved.
pub fn stratified_split(
    dataset: &Dataset,
    holdout_fraction: f64,
    seed: u64,
) -> ChurnResult<(Dataset, Dataset)> {
    let (kept, held_out) = stratified_indices(dataset.labels(), holdout_fraction, seed)?;
    Ok((dataset.subset(&kept), dataset.subset(&held_out)))
}

/// Two-stage split: train vs held-out, then held-out into validation/test.
pub fn split_dataset(dataset: &Dataset, cfg: &SplitCfg) -> ChurnResult<Split> {
    cfg.validate()?;
    let (train, held_out) = stratified_split(dataset, 1.0 - cfg.train_fraction, cfg.seed)?;
    let (validation, test) = stratified_split(&held_out, 1.0 - cfg.validation_share, cfg.seed)?;
    tracing::info!(
        train = train.len(),
        validation = validation.len(),
        test = test.len(),
        seed = cfg.seed,
        "dataset split"
    );
    Ok(Split {
        train,
        validation,
        test,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic(n: usize, positive_every: usize) -> Dataset {
        let schema = Schema::numeric(["f0", "f1"]).unwrap();
        let rows = (0..n).map(|i| vec![i as f64, (i % 7) as f64]).collect();
        let labels = (0..n)
            .map(|i| u8::from(i % positive_every == 0))
            .collect();
        Dataset::new(FeatureTable::new(schema, rows).unwrap(), "label", labels).unwrap()
    }

    fn sorted_rows(parts: &[&Dataset]) -> Vec<Vec<f64>> {
        let mut rows: Vec<Vec<f64>> = parts.iter().flat_map(|d| d.rows().to_vec()).collect();
        rows.sort_by(|a, b| a.partial_cmp(b).unwrap());
        rows
    }

    #[test]
    fn reads_header_csv_and_drops_columns() {
        let csv = "id,a,label,b\n1,0.5,1,2\n2,1.5,0,3\n";
        let cfg = DataCfg {
            drop_columns: vec!["id".into()],
            ..DataCfg::default()
        };
        let ds = read_dataset(csv.as_bytes(), &cfg).unwrap();
        assert_eq!(ds.schema().names(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(ds.labels(), &[1, 0]);
        assert_eq!(ds.rows()[1], vec![1.5, 3.0]);
    }

    #[test]
    fn reads_headerless_csv_with_external_columns() {
        let cfg = DataCfg {
            has_header: false,
            columns: Some(vec!["Exited".into(), "x".into()]),
            label: "Exited".into(),
            ..DataCfg::default()
        };
        let ds = read_dataset("1,3.0\n0,4.0\n".as_bytes(), &cfg).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.label_name(), "Exited");
    }

    #[test]
    fn missing_label_is_input_error() {
        let err = read_dataset("a,b\n1,2\n".as_bytes(), &DataCfg::default()).unwrap_err();
        assert!(matches!(err, ChurnError::Input(_)));
    }

    #[test]
    fn non_binary_label_is_input_error() {
        let err = read_dataset("a,label\n1,2\n".as_bytes(), &DataCfg::default()).unwrap_err();
        assert!(matches!(err, ChurnError::Input(msg) if msg.contains("not binary")));
    }

    #[test]
    fn non_numeric_feature_is_input_error() {
        let err =
            read_dataset("a,label\nFrance,1\n".as_bytes(), &DataCfg::default()).unwrap_err();
        assert!(matches!(err, ChurnError::Input(msg) if msg.contains("France")));
    }

    #[test]
    fn short_row_is_input_error() {
        let err = read_dataset("a,b,label\n1,1\n".as_bytes(), &DataCfg::default()).unwrap_err();
        assert!(matches!(err, ChurnError::Input(_)));
    }

    #[test]
    fn features_ignore_label_column() {
        let table = read_features("a,label\n1,0\n2,1\n".as_bytes(), &DataCfg::default()).unwrap();
        assert_eq!(table.schema().names(), vec!["a".to_string()]);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn split_sizes_are_60_20_20() {
        let ds = synthetic(1000, 5);
        let split = split_dataset(&ds, &SplitCfg::default()).unwrap();
        assert_eq!(split.train.len(), 600);
        assert_eq!(split.validation.len(), 200);
        assert_eq!(split.test.len(), 200);
    }

    #[test]
    fn split_is_a_partition() {
        let ds = synthetic(317, 4);
        let split = split_dataset(&ds, &SplitCfg::default()).unwrap();
        assert_eq!(
            sorted_rows(&[&split.train, &split.validation, &split.test]),
            sorted_rows(&[&ds])
        );
    }

    #[test]
    fn split_preserves_class_ratio() {
        let ds = synthetic(1000, 5);
        let split = split_dataset(&ds, &SplitCfg::default()).unwrap();
        for part in [&split.train, &split.validation, &split.test] {
            assert!((part.positive_rate() - ds.positive_rate()).abs() < 0.05);
        }
    }

    #[test]
    fn split_is_deterministic_per_seed() {
        let ds = synthetic(250, 3);
        let cfg = SplitCfg::default();
        let a = split_dataset(&ds, &cfg).unwrap();
        let b = split_dataset(&ds, &cfg).unwrap();
        assert_eq!(a.train, b.train);
        assert_eq!(a.validation, b.validation);
        assert_eq!(a.test, b.test);

        let other = split_dataset(&ds, &SplitCfg { seed: 7, ..cfg }).unwrap();
        assert_ne!(a.train, other.train);
    }

    #[test]
    fn singleton_class_cannot_be_stratified() {
        let schema = Schema::numeric(["f"]).unwrap();
        let rows = (0..10).map(|i| vec![i as f64]).collect();
        let mut labels = vec![0u8; 10];
        labels[3] = 1;
        let ds = Dataset::new(FeatureTable::new(schema, rows).unwrap(), "label", labels).unwrap();
        assert!(matches!(
            split_dataset(&ds, &SplitCfg::default()),
            Err(ChurnError::Input(_))
        ));
    }
}
