//! Core dataset definitions and contracts.
//!
//! A [`Schema`] is checked once when a table is built; later stages rely on
//! the invariants instead of re-deriving column lists.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::common::error::{ChurnError, ChurnResult};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Numeric,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
}

/// Ordered list of named feature fields.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<FieldSpec>", into = "Vec<FieldSpec>")]
pub struct Schema {
    fields: Vec<FieldSpec>,
}

impl Schema {
    pub fn new(fields: Vec<FieldSpec>) -> ChurnResult<Self> {
        if fields.is_empty() {
            return Err(ChurnError::input("schema has no feature columns"));
        }
        let mut seen = HashSet::with_capacity(fields.len());
        for field in &fields {
            if field.name.trim().is_empty() {
                return Err(ChurnError::input("schema contains an empty column name"));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(ChurnError::input(format!(
                    "duplicate column name {:?}",
                    field.name
                )));
            }
        }
        Ok(Self { fields })
    }

    /// Build an all-numeric schema from column names.
    pub fn numeric<I, S>(names: I) -> ChurnResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            names
                .into_iter()
                .map(|name| FieldSpec {
                    name: name.into(),
                    kind: FieldKind::Numeric,
                })
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Map every `expected` column to its index in this schema.
    ///
    /// Order may differ; missing and extra columns are both mismatches.
    pub fn align_to(&self, expected: &[String]) -> Result<Vec<usize>, SchemaMismatch> {
        let missing: Vec<String> = expected
            .iter()
            .filter(|name| self.index_of(name).is_none())
            .cloned()
            .collect();
        let extra: Vec<String> = self
            .fields
            .iter()
            .filter(|f| !expected.contains(&f.name))
            .map(|f| f.name.clone())
            .collect();
        if !missing.is_empty() || !extra.is_empty() {
            return Err(SchemaMismatch { missing, extra });
        }
        Ok(expected
            .iter()
            .filter_map(|name| self.index_of(name))
            .collect())
    }
}

impl TryFrom<Vec<FieldSpec>> for Schema {
    type Error = ChurnError;

    fn try_from(fields: Vec<FieldSpec>) -> Result<Self, Self::Error> {
        Schema::new(fields)
    }
}

impl From<Schema> for Vec<FieldSpec> {
    fn from(schema: Schema) -> Self {
        schema.fields
    }
}

/// Column-set difference between a table and what a model expects.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SchemaMismatch {
    pub missing: Vec<String>,
    pub extra: Vec<String>,
}

impl fmt::Display for SchemaMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "missing columns {:?}, unexpected columns {:?}",
            self.missing, self.extra
        )
    }
}

/// Row-major numeric matrix with its schema.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureTable {
    schema: Schema,
    rows: Vec<Vec<f64>>,
}

impl FeatureTable {
    pub fn new(schema: Schema, rows: Vec<Vec<f64>>) -> ChurnResult<Self> {
        let width = schema.len();
        if let Some((idx, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != width) {
            return Err(ChurnError::input(format!(
                "row {idx} has {} values, schema has {width} columns",
                row.len()
            )));
        }
        Ok(Self { schema, rows })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows reordered so column `j` is `expected[j]`.
    pub fn aligned_rows(&self, expected: &[String]) -> Result<Vec<Vec<f64>>, SchemaMismatch> {
        let order = self.schema.align_to(expected)?;
        if order.iter().enumerate().all(|(j, &src)| j == src) {
            return Ok(self.rows.clone());
        }
        Ok(self
            .rows
            .iter()
            .map(|row| order.iter().map(|&src| row[src]).collect())
            .collect())
    }

    fn select(&self, indices: &[usize]) -> Self {
        Self {
            schema: self.schema.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }
}

/// Feature table plus a binary label per row.
#[derive(Clone, Debug, PartialEq)]
pub struct Dataset {
    table: FeatureTable,
    label: String,
    labels: Vec<u8>,
}

impl Dataset {
    pub fn new(table: FeatureTable, label: impl Into<String>, labels: Vec<u8>) -> ChurnResult<Self> {
        let label = label.into();
        if table.schema().index_of(&label).is_some() {
            return Err(ChurnError::input(format!(
                "label column {label:?} is also listed as a feature"
            )));
        }
        if labels.len() != table.len() {
            return Err(ChurnError::input(format!(
                "{} labels for {} rows",
                labels.len(),
                table.len()
            )));
        }
        if let Some(bad) = labels.iter().find(|&&y| y > 1) {
            return Err(ChurnError::input(format!(
                "label {label:?} is not binary: found {bad}"
            )));
        }
        Ok(Self {
            table,
            label,
            labels,
        })
    }

    pub fn table(&self) -> &FeatureTable {
        &self.table
    }

    pub fn schema(&self) -> &Schema {
        self.table.schema()
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        self.table.rows()
    }

    pub fn label_name(&self) -> &str {
        &self.label
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn positives(&self) -> usize {
        self.labels.iter().filter(|&&y| y == 1).count()
    }

    /// Fraction of rows labelled 1; 0.0 for an empty dataset.
    pub fn positive_rate(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.positives() as f64 / self.len() as f64
        }
    }

    /// New dataset holding the given rows in the given order.
    pub fn subset(&self, indices: &[usize]) -> Self {
        Self {
            table: self.table.select(indices),
            label: self.label.clone(),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum SplitPart {
    Train,
    Validation,
    Test,
}

impl SplitPart {
    pub const ALL: [SplitPart; 3] = [SplitPart::Train, SplitPart::Validation, SplitPart::Test];

    pub fn as_str(&self) -> &'static str {
        match self {
            SplitPart::Train => "train",
            SplitPart::Validation => "validation",
            SplitPart::Test => "test",
        }
    }
}

/// Three disjoint subsets of one source dataset.
#[derive(Clone, Debug)]
pub struct Split {
    pub train: Dataset,
    pub validation: Dataset,
    pub test: Dataset,
}

impl Split {
    pub fn part(&self, part: SplitPart) -> &Dataset {
        match part {
            SplitPart::Train => &self.train,
            SplitPart::Validation => &self.validation,
            SplitPart::Test => &self.test,
        }
    }
}

/// Splitter settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitCfg {
    pub seed: u64,
    /// Share of the source kept for training; the rest is held out.
    pub train_fraction: f64,
    /// Share of the held-out rows assigned to validation; the rest is test.
    pub validation_share: f64,
}

impl Default for SplitCfg {
    fn default() -> Self {
        Self {
            seed: 42,
            train_fraction: 0.6,
            validation_share: 0.5,
        }
    }
}

impl SplitCfg {
    pub fn validate(&self) -> ChurnResult<()> {
        for (key, value) in [
            ("split.train_fraction", self.train_fraction),
            ("split.validation_share", self.validation_share),
        ] {
            if !(value > 0.0 && value < 1.0) {
                return Err(ChurnError::config(format!(
                    "{key} must be in (0, 1), got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Row counts and column list recorded next to persisted splits.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SplitManifest {
    pub label: String,
    pub features: Vec<String>,
    pub train_rows: usize,
    pub validation_rows: usize,
    pub test_rows: usize,
    pub created_ms: u64,
}

impl SplitManifest {
    pub fn rows(&self, part: SplitPart) -> usize {
        match part {
            SplitPart::Train => self.train_rows,
            SplitPart::Validation => self.validation_rows,
            SplitPart::Test => self.test_rows,
        }
    }
}

/// Repository contract for split persistence.
pub trait DataRepo {
    fn put_split(&self, split: &Split) -> ChurnResult<SplitManifest>;
    fn get_part(&self, part: SplitPart) -> ChurnResult<Dataset>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> FeatureTable {
        let schema = Schema::numeric(["a", "b"]).unwrap();
        FeatureTable::new(schema, vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]]).unwrap()
    }

    #[test]
    fn schema_rejects_duplicates_and_empty() {
        assert!(Schema::numeric(["a", "a"]).is_err());
        assert!(Schema::numeric(Vec::<String>::new()).is_err());
    }

    #[test]
    fn table_rejects_ragged_rows() {
        let schema = Schema::numeric(["a", "b"]).unwrap();
        let err = FeatureTable::new(schema, vec![vec![1.0, 2.0], vec![3.0]]).unwrap_err();
        assert!(matches!(err, ChurnError::Input(_)));
    }

    #[test]
    fn dataset_rejects_non_binary_labels_and_label_as_feature() {
        assert!(Dataset::new(table(), "y", vec![0, 1, 2]).is_err());
        assert!(Dataset::new(table(), "a", vec![0, 1, 1]).is_err());
        assert!(Dataset::new(table(), "y", vec![0, 1]).is_err());
    }

    #[test]
    fn alignment_reorders_by_name() {
        let t = table();
        let rows = t.aligned_rows(&["b".to_string(), "a".to_string()]).unwrap();
        assert_eq!(rows[0], vec![2.0, 1.0]);
    }

    #[test]
    fn alignment_reports_missing_and_extra() {
        let mismatch = table()
            .schema()
            .align_to(&["a".to_string(), "c".to_string()])
            .unwrap_err();
        assert_eq!(mismatch.missing, vec!["c".to_string()]);
        assert_eq!(mismatch.extra, vec!["b".to_string()]);
    }

    #[test]
    fn subset_keeps_labels_aligned() {
        let ds = Dataset::new(table(), "y", vec![0, 1, 1]).unwrap();
        let sub = ds.subset(&[2, 0]);
        assert_eq!(sub.rows()[0], vec![5.0, 6.0]);
        assert_eq!(sub.labels(), &[1, 0]);
        assert!((ds.positive_rate() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn schema_serde_validates() {
        let json = r#"[{"name":"a","kind":"numeric"},{"name":"a","kind":"numeric"}]"#;
        assert!(serde_json::from_str::<Schema>(json).is_err());
    }
}
