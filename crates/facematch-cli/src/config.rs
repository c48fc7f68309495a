use clap::ValueEnum;
use facematch_core::provider::DEFAULT_MIN_CONFIDENCE;
use facematch_core::DEFAULT_MATCH_THRESHOLD;
use std::path::PathBuf;

/// Which provider a comparison pass runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProviderKind {
    /// Local SCRFD + ArcFace models.
    Embedded,
    /// Hosted generative model.
    Remote,
}

impl ProviderKind {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "embedded" | "local" => Some(Self::Embedded),
            "remote" | "gemini" => Some(Self::Remote),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Sqlite,
    Memory,
}

/// CLI configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub provider: ProviderKind,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Minimum detection score for the embedded provider.
    pub min_confidence: f32,
    /// Similarity percentage a local score must exceed to count as a match
    /// (`FACEMATCH_MATCH_THRESHOLD`, default 40).
    ///
    /// ArcFace descriptors are unit length, so similarity is
    /// `(1 - sqrt(2 - 2cos)) * 100` and 40 means cosine similarity above 0.82.
    /// Genuine pairs of the same person commonly land at a cosine of 0.4 to
    /// 0.7 (similarity 0 to 23), so calibrate this on known pairs before
    /// trusting a `NO MATCH` from the embedded provider.
    pub match_threshold: f64,
    pub remote_model: String,
    pub remote_endpoint: String,
    pub api_key: Option<String>,
    pub store: StoreKind,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
}

impl Config {
    /// Load configuration from `FACEMATCH_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                let home = var("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("facematch");

        let provider = match var("FACEMATCH_PROVIDER") {
            Some(v) => ProviderKind::parse(&v).unwrap_or_else(|| {
                tracing::warn!(value = %v, "unknown FACEMATCH_PROVIDER, using embedded");
                ProviderKind::Embedded
            }),
            None => ProviderKind::Embedded,
        };

        let store = match var("FACEMATCH_STORE").as_deref() {
            Some("memory") => StoreKind::Memory,
            _ => StoreKind::Sqlite,
        };

        Self {
            provider,
            model_dir: var("FACEMATCH_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("models")),
            min_confidence: parse_or(var("FACEMATCH_MIN_CONFIDENCE"), DEFAULT_MIN_CONFIDENCE),
            match_threshold: parse_or(var("FACEMATCH_MATCH_THRESHOLD"), DEFAULT_MATCH_THRESHOLD),
            remote_model: var("FACEMATCH_REMOTE_MODEL")
                .unwrap_or_else(|| facematch_remote::DEFAULT_MODEL.to_string()),
            remote_endpoint: var("FACEMATCH_ENDPOINT")
                .unwrap_or_else(|| facematch_remote::DEFAULT_ENDPOINT.to_string()),
            api_key: var("FACEMATCH_API_KEY")
                .or_else(|| var("API_KEY"))
                .filter(|k| !k.trim().is_empty()),
            store,
            db_path: var("FACEMATCH_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("cases.db")),
        }
    }

    /// Path to the SCRFD detection model.
    pub fn detector_model_path(&self) -> String {
        self.model_dir
            .join(facematch_vision::DETECTOR_MODEL)
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the ArcFace recognition model.
    pub fn recognizer_model_path(&self) -> String {
        self.model_dir
            .join(facematch_vision::RECOGNIZER_MODEL)
            .to_string_lossy()
            .into_owned()
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}
