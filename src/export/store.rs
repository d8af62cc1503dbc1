//! On-disk model store
//!
//! Binary files wrap the bincode-encoded pipeline in an envelope carrying
//! magic bytes, a format version, the metadata and an FNV-1a checksum of the
//! payload. JSON files hold the metadata and the pipeline side by side.

use crate::error::{BakeoffError, Result};
use crate::optimizer::ParamSet;
use crate::registry::{ModelKind, Pipeline};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File format of a persisted model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SerializationFormat {
    /// bincode envelope, `.bin`
    Binary,
    /// Pretty-printed JSON, `.json`
    Json,
}

impl SerializationFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            SerializationFormat::Binary => "bin",
            SerializationFormat::Json => "json",
        }
    }

    /// Format implied by a file name's extension
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("bin") => Ok(SerializationFormat::Binary),
            Some("json") => Ok(SerializationFormat::Json),
            _ => Err(BakeoffError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// Description stored alongside every persisted model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub model_name: String,
    pub model_kind: ModelKind,
    pub version: String,
    pub trained_at: DateTime<Utc>,
    pub feature_names: Vec<String>,
    pub target_names: Vec<String>,
    /// Best hyperparameters, rendered as text
    pub hyperparameters: BTreeMap<String, String>,
    pub metrics: BTreeMap<String, f64>,
}

impl ModelMetadata {
    pub fn new(kind: ModelKind, version: impl Into<String>) -> Self {
        Self {
            model_name: kind.display_name().to_string(),
            model_kind: kind,
            version: version.into(),
            trained_at: Utc::now(),
            feature_names: Vec::new(),
            target_names: Vec::new(),
            hyperparameters: BTreeMap::new(),
            metrics: BTreeMap::new(),
        }
    }

    pub fn with_features(mut self, features: Vec<String>) -> Self {
        self.feature_names = features;
        self
    }

    pub fn with_targets(mut self, targets: Vec<String>) -> Self {
        self.target_names = targets;
        self
    }

    pub fn with_params(mut self, params: &ParamSet) -> Self {
        self.hyperparameters = params
            .iter()
            .map(|(k, v)| (k.clone(), v.to_string()))
            .collect();
        self
    }

    /// Record a metric; non-finite values are not stored
    pub fn add_metric(mut self, key: impl Into<String>, value: f64) -> Self {
        if value.is_finite() {
            self.metrics.insert(key.into(), value);
        }
        self
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SerializedModel {
    magic: [u8; 4],
    format_version: u32,
    metadata: ModelMetadata,
    model_data: Vec<u8>,
    checksum: u64,
}

impl SerializedModel {
    const MAGIC: [u8; 4] = [b'B', b'K', b'O', b'F'];
    const VERSION: u32 = 1;

    fn new(metadata: ModelMetadata, model_data: Vec<u8>) -> Self {
        let checksum = fnv1a(&model_data);
        Self {
            magic: Self::MAGIC,
            format_version: Self::VERSION,
            metadata,
            model_data,
            checksum,
        }
    }

    fn verify(&self) -> Result<()> {
        if self.magic != Self::MAGIC {
            return Err(BakeoffError::SerializationError(
                "Not a model file (bad magic bytes)".to_string(),
            ));
        }
        if self.format_version > Self::VERSION {
            return Err(BakeoffError::SerializationError(format!(
                "Unsupported format version {} (newest known is {})",
                self.format_version,
                Self::VERSION
            )));
        }
        if fnv1a(&self.model_data) != self.checksum {
            return Err(BakeoffError::SerializationError(
                "Checksum verification failed - file may be corrupted".to_string(),
            ));
        }
        Ok(())
    }
}

fn fnv1a(data: &[u8]) -> u64 {
    const FNV_OFFSET: u64 = 14695981039346656037;
    const FNV_PRIME: u64 = 1099511628211;

    let mut hash = FNV_OFFSET;
    for byte in data {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

#[derive(Serialize)]
struct JsonModelRef<'a> {
    metadata: &'a ModelMetadata,
    model: &'a Pipeline,
}

#[derive(Deserialize)]
struct JsonModel {
    metadata: ModelMetadata,
    model: Pipeline,
}

/// Directory of persisted models
#[derive(Debug, Clone)]
pub struct ModelStore {
    dir: PathBuf,
    formats: Vec<SerializationFormat>,
}

impl ModelStore {
    pub fn new(dir: impl Into<PathBuf>, formats: Vec<SerializationFormat>) -> Self {
        Self {
            dir: dir.into(),
            formats,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn formats(&self) -> &[SerializationFormat] {
        &self.formats
    }

    /// Write `model` once per configured format; returns the files written
    pub fn save(&self, stem: &str, model: &Pipeline, metadata: &ModelMetadata) -> Result<Vec<PathBuf>> {
        if self.formats.is_empty() {
            debug!(stem, "No output formats enabled; model not saved");
            return Ok(Vec::new());
        }
        fs::create_dir_all(&self.dir)?;

        let mut written = Vec::with_capacity(self.formats.len());
        for format in &self.formats {
            let path = self.dir.join(format!("{}.{}", stem, format.extension()));
            let mut writer = BufWriter::new(File::create(&path)?);

            match format {
                SerializationFormat::Binary => {
                    let envelope = SerializedModel::new(metadata.clone(), bincode::serialize(model)?);
                    bincode::serialize_into(&mut writer, &envelope)?;
                }
                SerializationFormat::Json => {
                    let doc = JsonModelRef { metadata, model };
                    serde_json::to_writer_pretty(&mut writer, &doc)?;
                }
            }
            writer.flush()?;

            info!(path = %path.display(), "Saved model");
            written.push(path);
        }
        Ok(written)
    }

    /// Load a model by file name (relative to the store) or path
    pub fn load(&self, file_name: impl AsRef<Path>) -> Result<(Pipeline, ModelMetadata)> {
        let path = self.resolve(file_name.as_ref());
        let format = SerializationFormat::from_path(&path)?;
        let mut reader = BufReader::new(File::open(&path)?);

        let loaded = match format {
            SerializationFormat::Binary => {
                let mut bytes = Vec::new();
                reader.read_to_end(&mut bytes)?;
                let envelope: SerializedModel = bincode::deserialize(&bytes)?;
                envelope.verify()?;
                let model: Pipeline = bincode::deserialize(&envelope.model_data)?;
                (model, envelope.metadata)
            }
            SerializationFormat::Json => {
                let doc: JsonModel = serde_json::from_reader(reader)?;
                (doc.model, doc.metadata)
            }
        };

        debug!(path = %path.display(), model = %loaded.1.model_name, "Loaded model");
        Ok(loaded)
    }

    /// Model files in the store, sorted by name
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut files: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && SerializationFormat::from_path(p).is_ok())
            .filter(|p| p.file_name().map_or(true, |n| n != "results.json"))
            .collect();
        files.sort();
        Ok(files)
    }

    fn resolve(&self, file_name: &Path) -> PathBuf {
        if file_name.is_absolute() || file_name.exists() {
            file_name.to_path_buf()
        } else {
            self.dir.join(file_name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::ParameterValue;
    use ndarray::{array, Array1, Array2};

    fn fitted_tree() -> (Pipeline, Array2<f64>, Array1<f64>) {
        let x = array![[0.0, 0.0], [0.1, 0.2], [1.0, 1.0], [0.9, 1.1], [0.2, 0.1], [1.1, 0.9]];
        let y = array![0.0, 0.0, 1.0, 1.0, 0.0, 1.0];
        let mut pipeline = Pipeline::new(ModelKind::DecisionTree);
        pipeline.fit(&x, &y).unwrap();
        (pipeline, x, y)
    }

    #[test]
    fn test_fnv1a_known_values() {
        assert_eq!(fnv1a(b""), 14695981039346656037);
        assert_eq!(fnv1a(b"a"), 0xaf63dc4c8601ec8c);
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            SerializationFormat::from_path(Path::new("m.bin")).unwrap(),
            SerializationFormat::Binary
        );
        assert_eq!(
            SerializationFormat::from_path(Path::new("m.json")).unwrap(),
            SerializationFormat::Json
        );
        assert!(matches!(
            SerializationFormat::from_path(Path::new("m.pkl")),
            Err(BakeoffError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_save_and_load_both_formats() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(
            dir.path().join("models"),
            vec![SerializationFormat::Binary, SerializationFormat::Json],
        );
        let (pipeline, x, y) = fitted_tree();
        let params = ParamSet::new().with("classifier__max_depth", ParameterValue::Null);
        let metadata = ModelMetadata::new(ModelKind::DecisionTree, "v1")
            .with_params(&params)
            .add_metric("test_accuracy", 1.0)
            .add_metric("ignored", f64::NAN);

        let written = store.save("Decision_Tree_v1", &pipeline, &metadata).unwrap();
        assert_eq!(written.len(), 2);
        assert!(written.iter().all(|p| p.exists()));

        for name in ["Decision_Tree_v1.bin", "Decision_Tree_v1.json"] {
            let (loaded, meta) = store.load(name).unwrap();
            assert_eq!(meta, metadata);
            assert_eq!(meta.hyperparameters["classifier__max_depth"], "None");
            assert!(!meta.metrics.contains_key("ignored"));
            assert_eq!(loaded.predict(&x).unwrap(), pipeline.predict(&x).unwrap());
            assert_eq!(loaded.score(&x, &y).unwrap(), 1.0);
        }
        assert_eq!(store.list().unwrap().len(), 2);
    }

    #[test]
    fn test_no_formats_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path().join("none"), vec![]);
        let (pipeline, _, _) = fitted_tree();
        let metadata = ModelMetadata::new(ModelKind::DecisionTree, "v1");
        assert!(store.save("x", &pipeline, &metadata).unwrap().is_empty());
        assert!(!dir.path().join("none").exists());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path(), vec![SerializationFormat::Binary]);
        assert!(matches!(store.load("missing.bin"), Err(BakeoffError::IoError(_))));
    }

    #[test]
    fn test_corrupted_payload_fails_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path(), vec![SerializationFormat::Binary]);
        let (pipeline, _, _) = fitted_tree();
        let metadata = ModelMetadata::new(ModelKind::DecisionTree, "v1");
        let path = store.save("tree", &pipeline, &metadata).unwrap().remove(0);

        // The checksum is the last 8 bytes of the envelope
        let mut bytes = fs::read(&path).unwrap();
        let n = bytes.len();
        bytes[n - 1] ^= 0xFF;
        fs::write(&path, &bytes).unwrap();

        assert!(matches!(
            store.load("tree.bin"),
            Err(BakeoffError::SerializationError(_))
        ));
    }

    #[test]
    fn test_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path(), vec![SerializationFormat::Binary]);
        let (pipeline, _, _) = fitted_tree();
        let metadata = ModelMetadata::new(ModelKind::DecisionTree, "v1");
        let path = store.save("tree", &pipeline, &metadata).unwrap().remove(0);

        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();
        assert!(matches!(
            store.load("tree.bin"),
            Err(BakeoffError::SerializationError(_))
        ));
    }

    #[test]
    fn test_bad_magic() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path(), vec![SerializationFormat::Binary]);
        let (pipeline, _, _) = fitted_tree();
        let metadata = ModelMetadata::new(ModelKind::DecisionTree, "v1");
        let path = store.save("tree", &pipeline, &metadata).unwrap().remove(0);

        let mut bytes = fs::read(&path).unwrap();
        bytes[0] = b'X';
        fs::write(&path, &bytes).unwrap();
        assert!(matches!(
            store.load("tree.bin"),
            Err(BakeoffError::SerializationError(_))
        ));
    }
}
