//! Serialized model envelope and the artefact locator.
//!
//! The envelope wraps the model JSON with a format tag, a version and a
//! fingerprint of the model body so truncated or edited files fail to load
//! instead of scoring silently.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::common::error::{ChurnError, ChurnResult};
use crate::common::ids;
use crate::common::time;

use super::domain::BoostedModel;

pub const FORMAT_NAME: &str = "churn-gbt";
pub const FORMAT_VERSION: u32 = 1;
/// File name the locator looks for first.
pub const MODEL_FILE_NAME: &str = "churn-model";
/// Extensions accepted when no exactly named file exists.
pub const MODEL_EXTENSIONS: [&str; 2] = ["json", "bst"];

/// The checksum covers the model text exactly as written, so it never
/// depends on how floats survive a parse.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    format: String,
    format_version: u32,
    checksum: String,
    trained_at_ms: u64,
    model: Box<RawValue>,
}

/// Serialize a model to artefact bytes.
pub fn encode(model: &BoostedModel) -> ChurnResult<Vec<u8>> {
    let serialise_err = |err: serde_json::Error| ChurnError::training(format!("serialise model: {err}"));
    let body = serde_json::to_string(model).map_err(serialise_err)?;
    let envelope = Envelope {
        format: FORMAT_NAME.to_string(),
        format_version: FORMAT_VERSION,
        checksum: ids::fingerprint(body.as_bytes()),
        trained_at_ms: time::now_ms(),
        model: RawValue::from_string(body).map_err(serialise_err)?,
    };
    serde_json::to_vec(&envelope).map_err(serialise_err)
}

/// Deserialize and verify artefact bytes.
pub fn decode(bytes: &[u8]) -> ChurnResult<BoostedModel> {
    let envelope: Envelope = serde_json::from_slice(bytes)
        .map_err(|err| ChurnError::model_load(format!("artefact is not a model: {err}")))?;
    if envelope.format != FORMAT_NAME {
        return Err(ChurnError::model_load(format!(
            "unknown artefact format {:?}",
            envelope.format
        )));
    }
    if envelope.format_version != FORMAT_VERSION {
        return Err(ChurnError::model_load(format!(
            "unsupported artefact version {}",
            envelope.format_version
        )));
    }
    let body = envelope.model.get();
    let checksum = ids::fingerprint(body.as_bytes());
    if checksum != envelope.checksum {
        return Err(ChurnError::model_load(format!(
            "checksum mismatch: recorded {}, computed {checksum}",
            envelope.checksum
        )));
    }
    let model: BoostedModel = serde_json::from_str(body)
        .map_err(|err| ChurnError::model_load(format!("model body: {err}")))?;
    model.validate()?;
    Ok(model)
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> ChurnResult<()> {
    let entries = fs::read_dir(dir).map_err(|source| ChurnError::io(dir, source))?;
    for entry in entries {
        let path = entry.map_err(|source| ChurnError::io(dir, source))?.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

/// Find the single model file under `dir`.
pub fn locate_artifact(dir: &Path) -> ChurnResult<PathBuf> {
    let mut files = Vec::new();
    collect_files(dir, &mut files)?;
    select_artifact(files, dir)
}

/// Pick the model file among `files`; `origin` only names them in errors.
///
/// Search order: files named exactly [`MODEL_FILE_NAME`], then files with an
/// extension from [`MODEL_EXTENSIONS`]. The first tier with candidates must
/// hold exactly one.
pub fn select_artifact(mut files: Vec<PathBuf>, origin: &Path) -> ChurnResult<PathBuf> {
    files.sort();

    let exact: Vec<&PathBuf> = files
        .iter()
        .filter(|p| p.file_name().is_some_and(|n| n == MODEL_FILE_NAME))
        .collect();
    let by_extension: Vec<&PathBuf> = files
        .iter()
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| MODEL_EXTENSIONS.contains(&e))
        })
        .collect();

    for tier in [exact, by_extension] {
        match tier.as_slice() {
            [] => continue,
            [only] => {
                tracing::debug!(path = %only.display(), "model artefact located");
                return Ok((*only).clone());
            }
            many => {
                return Err(ChurnError::model_load(format!(
                    "{} candidate model files in {}: {:?}",
                    many.len(),
                    origin.display(),
                    many
                )))
            }
        }
    }
    Err(ChurnError::model_load(format!(
        "no model file in {}",
        origin.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::domain::{Objective, Tree, TreeNode};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use tempfile::tempdir;

    fn model() -> BoostedModel {
        BoostedModel {
            objective: Objective::BinaryLogistic,
            base_score: 0.5,
            learning_rate: 0.2,
            max_depth: 5,
            label: "label".into(),
            feature_names: vec!["tenure".into()],
            trees: vec![Tree {
                nodes: vec![TreeNode::Leaf {
                    value: 0.1234567890123,
                    cover: 97.42447372584027,
                }],
            }],
        }
    }

    /// Many leaf-only trees with arbitrary doubles.
    fn noisy_model(seed: u64) -> BoostedModel {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut m = model();
        m.trees = (0..200)
            .map(|_| Tree {
                nodes: vec![TreeNode::Leaf {
                    value: rng.random::<f64>() * 2.0 - 1.0,
                    cover: rng.random::<f64>() * 500.0,
                }],
            })
            .collect();
        m
    }

    #[test]
    fn encode_decode_preserves_model() {
        let bytes = encode(&model()).unwrap();
        assert_eq!(decode(&bytes).unwrap(), model());
    }

    #[test]
    fn arbitrary_doubles_survive_encode_decode() {
        for seed in 0..20 {
            let m = noisy_model(seed);
            let decoded = decode(&encode(&m).unwrap()).unwrap();
            assert_eq!(decoded, m, "seed {seed}");
        }
    }

    #[test]
    fn tampered_body_fails_checksum() {
        let text = String::from_utf8(encode(&model()).unwrap()).unwrap();
        assert!(text.contains("0.1234567890123"));
        let tampered = text.replace("0.1234567890123", "0.2234567890123");
        let err = decode(tampered.as_bytes()).unwrap_err();
        assert!(matches!(err, ChurnError::ModelLoad(msg) if msg.contains("checksum")));
    }

    #[test]
    fn unparsable_body_is_reported_as_model_load_only() {
        let body = r#"{"trees":1}"#;
        let text = format!(
            r#"{{"format":"{FORMAT_NAME}","format_version":{FORMAT_VERSION},"checksum":"{}","trained_at_ms":0,"model":{body}}}"#,
            ids::fingerprint(body.as_bytes())
        );
        let err = decode(text.as_bytes()).unwrap_err();
        assert!(matches!(&err, ChurnError::ModelLoad(msg) if msg.starts_with("model body")));
        assert!(!err.to_string().contains("training"));
    }

    #[test]
    fn garbage_is_model_load_error() {
        assert!(matches!(decode(b"\x00\x01"), Err(ChurnError::ModelLoad(_))));
    }

    #[test]
    fn structurally_invalid_model_is_rejected() {
        let mut bad = model();
        bad.trees[0].nodes = vec![TreeNode::Split {
            feature: 3,
            threshold: 0.0,
            left: 1,
            right: 2,
            gain: 1.0,
            cover: 1.0,
        }];
        let bytes = encode(&bad).unwrap();
        assert!(matches!(decode(&bytes), Err(ChurnError::ModelLoad(_))));
    }

    #[test]
    fn locator_prefers_exact_name() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join(MODEL_FILE_NAME), b"{}").unwrap();
        fs::write(dir.path().join("other.json"), b"{}").unwrap();
        let found = locate_artifact(dir.path()).unwrap();
        assert!(found.ends_with(Path::new("nested").join(MODEL_FILE_NAME)));
    }

    #[test]
    fn locator_falls_back_to_extension() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("model.bst"), b"{}").unwrap();
        fs::write(dir.path().join("README.txt"), b"").unwrap();
        assert!(locate_artifact(dir.path()).unwrap().ends_with("model.bst"));
    }

    #[test]
    fn locator_rejects_ambiguous_and_empty() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            locate_artifact(dir.path()),
            Err(ChurnError::ModelLoad(_))
        ));
        fs::write(dir.path().join("a.json"), b"{}").unwrap();
        fs::write(dir.path().join("b.json"), b"{}").unwrap();
        assert!(matches!(
            locate_artifact(dir.path()),
            Err(ChurnError::ModelLoad(msg)) if msg.contains("2 candidate")
        ));
    }
}
