use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The document parsed as JSON but is not a feature collection.
    #[error("{path}: {message}")]
    GeoJson { path: PathBuf, message: String },

    #[error("{path}: corrupt point table: {message}")]
    CorruptTable { path: PathBuf, message: String },

    #[error("required table '{name}' is missing or empty ({path})")]
    MissingTable { name: String, path: PathBuf },

    #[error("clustering produced {distinct} distinct label(s); expected 2")]
    DegenerateClusters { distinct: usize },

    #[error("no training points available")]
    EmptyTrainingSet,

    #[error("model artifact expects columns {found:?}, but features are {expected:?}")]
    ArtifactMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("model artifact not found in {0}")]
    MissingModel(PathBuf),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}
